//! Fluent builder API for creating invoice indexers.
//!
//! # Example
//!
//! ```rust,no_run
//! use invoiceindex_evm::IndexerBuilder;
//!
//! let config = IndexerBuilder::new()
//!     .router("0x5FbDB2315678afecb367f032d93F642f64180aa3")
//!     .vault("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512")
//!     .start_block(100)
//!     .max_range(10)
//!     .build_config();
//! ```

use std::sync::Arc;

use invoiceindex_core::cursor::CursorStore;
use invoiceindex_core::error::IndexerError;
use invoiceindex_core::handler::HandlerRegistry;
use invoiceindex_core::indexer::IndexerConfig;
use invoiceindex_core::store::ProjectionStore;
use invoiceindex_storage::memory::InMemoryStorage;

use crate::events::default_registry;
use crate::fetcher::LogSource;
use crate::index_loop::IndexLoop;

/// Fluent builder for `IndexerConfig` and [`IndexLoop`].
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
    handlers: Option<HandlerRegistry>,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: IndexerConfig) -> Self {
        Self {
            config,
            handlers: None,
        }
    }

    /// Set the indexer ID (the cursor key).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set the invoice router address.
    pub fn router(mut self, address: impl Into<String>) -> Self {
        self.config.router_address = address.into();
        self
    }

    /// Also index the savings/lock vault at `address`.
    pub fn vault(mut self, address: impl Into<String>) -> Self {
        self.config.vault_address = Some(address.into());
        self
    }

    /// First block to scan when no cursor has been persisted.
    pub fn start_block(mut self, block: u64) -> Self {
        self.config.start_block = Some(block);
        self
    }

    pub fn lookback_blocks(mut self, blocks: u64) -> Self {
        self.config.lookback_blocks = blocks;
        self
    }

    /// Set the maximum number of blocks per `eth_getLogs` call.
    pub fn max_range(mut self, blocks: u64) -> Self {
        self.config.max_range = blocks;
        self
    }

    /// Set confirmation depth (blocks behind head before processing).
    pub fn confirmation_depth(mut self, depth: u64) -> Self {
        self.config.confirmation_depth = depth;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Bound each fetch and apply phase. `None` disables the bound.
    pub fn iteration_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.config.iteration_timeout_ms = ms;
        self
    }

    /// Replace the default router/vault handler table.
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Build the `IndexerConfig`.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Validate the configuration and build an index loop over `source` and `store`.
    pub fn build<L, S>(self, source: L, store: Arc<S>) -> Result<IndexLoop<L, S>, IndexerError>
    where
        L: LogSource,
        S: CursorStore + ProjectionStore + 'static,
    {
        self.config.validate()?;
        let handlers = self
            .handlers
            .unwrap_or_else(|| default_registry(&self.config));
        Ok(IndexLoop::new(self.config, source, store, handlers))
    }

    /// Build an index loop backed by a fresh in-memory store.
    pub fn build_in_memory<L: LogSource>(self, source: L) -> Result<IndexLoop<L, InMemoryStorage>, IndexerError> {
        self.build(source, Arc::new(InMemoryStorage::new()))
    }
}
