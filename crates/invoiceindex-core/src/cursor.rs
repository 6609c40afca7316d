//! Cursor persistence: the indexer's durable position in the chain.
//!
//! The cursor is a single `next_block` value: one past the highest block whose
//! logs have been fully reconciled into the store. On restart the indexer
//! resumes from it instead of re-indexing from the start height.
//!
//! The in-memory copy held by [`CursorManager`] only moves after the store has
//! confirmed the write, so a failed save can never make the loop believe it is
//! further along than the store says.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::IndexerError;

/// Durable storage for the indexing cursor.
///
/// Implementations include `MemoryCursorStore` (here), and `InMemoryStorage`,
/// `SqliteStorage` and `PostgresStorage` in `invoiceindex-storage`.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Load the persisted `next_block` for `key`. Absence is `Ok(None)`.
    async fn load_cursor(&self, key: &str) -> Result<Option<u64>, IndexerError>;

    /// Upsert `next_block` for `key`. Must be durable once it returns `Ok`.
    async fn save_cursor(&self, key: &str, next_block: u64) -> Result<(), IndexerError>;
}

/// Reads and writes the cursor for one indexer, guarding monotonicity.
pub struct CursorManager {
    store: Arc<dyn CursorStore>,
    key: String,
    current: Option<u64>,
}

impl CursorManager {
    pub fn new(store: Arc<dyn CursorStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            current: None,
        }
    }

    /// The cursor key (one per deployment).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The last cursor value loaded or confirmed by this manager.
    pub fn current(&self) -> Option<u64> {
        self.current
    }

    /// Load the persisted cursor without falling back to a default.
    pub async fn load(&mut self) -> Result<Option<u64>, IndexerError> {
        let loaded = self.store.load_cursor(&self.key).await?;
        if loaded.is_some() {
            self.current = loaded;
        }
        Ok(loaded)
    }

    /// Return the persisted `next_block`, or `default_start` if none exists yet.
    pub async fn get_cursor(&mut self, default_start: u64) -> Result<u64, IndexerError> {
        Ok(self.load().await?.unwrap_or(default_start))
    }

    /// Persist `next_block = block`.
    ///
    /// The in-memory cursor is updated only after the store confirms. Moving
    /// the cursor backwards is rejected.
    pub async fn set_cursor(&mut self, block: u64) -> Result<(), IndexerError> {
        if let Some(current) = self.current {
            if block < current {
                return Err(IndexerError::CursorRegression {
                    current,
                    requested: block,
                });
            }
        }
        self.store.save_cursor(&self.key, block).await?;
        self.current = Some(block);
        tracing::debug!(key = %self.key, next_block = block, "cursor saved");
        Ok(())
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory cursor store for tests and ephemeral indexers.
#[derive(Default)]
pub struct MemoryCursorStore {
    data: Mutex<HashMap<String, u64>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load_cursor(&self, key: &str) -> Result<Option<u64>, IndexerError> {
        let data = self
            .data
            .lock()
            .map_err(|_| IndexerError::Storage("cursor lock poisoned".into()))?;
        Ok(data.get(key).copied())
    }

    async fn save_cursor(&self, key: &str, next_block: u64) -> Result<(), IndexerError> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| IndexerError::Storage("cursor lock poisoned".into()))?;
        data.insert(key.to_string(), next_block);
        Ok(())
    }
}
