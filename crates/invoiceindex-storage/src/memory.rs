//! In-memory storage backend.
//!
//! Keeps invoice rows, vault rows and cursors in RAM.
//! Useful for testing and short-lived indexers that don't need persistence.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use invoiceindex_core::cursor::CursorStore;
use invoiceindex_core::error::IndexerError;
use invoiceindex_core::event::{InvoiceCreated, InvoicePaid, InvoiceRow, LogMeta, VaultEvent, VaultRow};
use invoiceindex_core::store::ProjectionStore;

/// In-memory indexer storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    cursors: Mutex<HashMap<String, u64>>,
    invoices: Mutex<BTreeMap<String, InvoiceRow>>,
    vault: Mutex<BTreeMap<(u64, u64, String), VaultRow>>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, IndexerError> {
    m.lock()
        .map_err(|_| IndexerError::Storage("in-memory store lock poisoned".into()))
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of invoice rows.
    pub fn invoice_count(&self) -> usize {
        self.invoices.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Number of vault rows.
    pub fn vault_event_count(&self) -> usize {
        self.vault.lock().map(|m| m.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CursorStore for InMemoryStorage {
    async fn load_cursor(&self, key: &str) -> Result<Option<u64>, IndexerError> {
        Ok(lock(&self.cursors)?.get(key).copied())
    }

    async fn save_cursor(&self, key: &str, next_block: u64) -> Result<(), IndexerError> {
        lock(&self.cursors)?.insert(key.to_string(), next_block);
        Ok(())
    }
}

#[async_trait]
impl ProjectionStore for InMemoryStorage {
    async fn upsert_invoice_created(&self, event: &InvoiceCreated, meta: &LogMeta) -> Result<(), IndexerError> {
        lock(&self.invoices)?
            .entry(event.invoice_id.clone())
            .or_insert_with(|| InvoiceRow::empty(&event.invoice_id))
            .merge_created(event, meta, Utc::now());
        Ok(())
    }

    async fn upsert_invoice_paid(&self, event: &InvoicePaid, meta: &LogMeta) -> Result<(), IndexerError> {
        lock(&self.invoices)?
            .entry(event.invoice_id.clone())
            .or_insert_with(|| InvoiceRow::empty(&event.invoice_id))
            .merge_paid(event, meta, Utc::now());
        Ok(())
    }

    async fn record_vault_event(&self, event: &VaultEvent, meta: &LogMeta) -> Result<(), IndexerError> {
        // Ordered by position; the tx hash completes the (tx_hash, log_index) key.
        let key = (meta.block_number, meta.log_index, meta.tx_hash.clone());
        lock(&self.vault)?
            .entry(key)
            .or_insert_with(|| VaultRow::new(event, meta, Utc::now()));
        Ok(())
    }

    async fn invoice(&self, invoice_id: &str) -> Result<Option<InvoiceRow>, IndexerError> {
        Ok(lock(&self.invoices)?.get(invoice_id).cloned())
    }

    async fn invoices(&self) -> Result<Vec<InvoiceRow>, IndexerError> {
        Ok(lock(&self.invoices)?.values().cloned().collect())
    }

    async fn vault_events(&self) -> Result<Vec<VaultRow>, IndexerError> {
        Ok(lock(&self.vault)?.values().cloned().collect())
    }
}
