//! Indexer configuration and state types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::IndexerError;
use crate::types::is_address;

/// Configuration for an indexer instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Cursor key. There is one cursor per deployment.
    pub id: String,
    /// Invoice router contract address.
    pub router_address: String,
    /// Savings/lock vault contract address. `None` = don't index vault events.
    pub vault_address: Option<String>,
    /// Explicit first block, used only when no cursor has been persisted.
    pub start_block: Option<u64>,
    /// Without a persisted cursor or `start_block`, start this many blocks
    /// behind the head instead of from genesis.
    pub lookback_blocks: u64,
    /// Maximum number of blocks per `eth_getLogs` call (inclusive span).
    pub max_range: u64,
    /// Blocks to stay behind the head. 0 follows the tip.
    pub confirmation_depth: u64,
    /// Sleep between polls when caught up, and after a failed iteration (ms).
    pub poll_interval_ms: u64,
    /// Upper bound on one fetch or apply phase (ms). `None` = unbounded.
    pub iteration_timeout_ms: Option<u64>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            router_address: String::new(),
            vault_address: None,
            start_block: None,
            lookback_blocks: 2_000,
            max_range: 10,
            confirmation_depth: 0,
            poll_interval_ms: 1_500,
            iteration_timeout_ms: Some(30_000),
        }
    }
}

impl IndexerConfig {
    /// Check the configuration before the loop starts.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.id.trim().is_empty() {
            return Err(IndexerError::Config("indexer id must not be empty".into()));
        }
        if self.router_address.is_empty() {
            return Err(IndexerError::Config("router address is required".into()));
        }
        if !is_address(&self.router_address) {
            return Err(IndexerError::Config(format!(
                "router address '{}' is not a 0x-prefixed 20-byte hex address",
                self.router_address
            )));
        }
        if let Some(vault) = &self.vault_address {
            if !is_address(vault) {
                return Err(IndexerError::Config(format!(
                    "vault address '{vault}' is not a 0x-prefixed 20-byte hex address"
                )));
            }
        }
        if self.max_range == 0 {
            return Err(IndexerError::Config("max_range must be at least 1".into()));
        }
        if self.iteration_timeout_ms == Some(0) {
            return Err(IndexerError::Config("iteration timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn iteration_timeout(&self) -> Option<Duration> {
        self.iteration_timeout_ms.map(Duration::from_millis)
    }

    /// Where to start when nothing has been persisted yet.
    pub fn seed_block(&self, head: u64) -> u64 {
        self.start_block
            .unwrap_or_else(|| head.saturating_sub(self.lookback_blocks))
    }
}

/// Runtime state of the index loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Caught up with the head (or not yet started); waiting for new blocks.
    Idle,
    /// A window has been computed and its logs are being fetched or applied.
    Scanning,
    /// Shut down.
    Stopped,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scanning => write!(f, "scanning"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
