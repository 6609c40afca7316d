//! Error types for the invoiceindex pipeline.

use thiserror::Error;

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cursor regression: current next_block {current}, attempted {requested}")]
    CursorRegression { current: u64, requested: u64 },

    #[error("Iteration timed out after {ms}ms")]
    Timeout { ms: u64 },
}

impl IndexerError {
    /// Returns `true` if retrying the same window later may succeed.
    ///
    /// Configuration errors and cursor regressions are programming or
    /// deployment mistakes; everything else is worth another attempt.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::CursorRegression { .. })
    }
}

/// Errors raised while turning a raw log into a domain event.
///
/// These are always scoped to a single log: the reconciler skips the log and
/// keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing topic {index} for event '{event}'")]
    MissingTopic { event: String, index: usize },

    #[error("invalid hex in {field}: {reason}")]
    InvalidHex { field: String, reason: String },

    #[error("ABI decode failed for '{event}': {reason}")]
    Abi { event: String, reason: String },

    #[error("value of '{field}' does not fit into {target}")]
    Overflow { field: String, target: String },
}
