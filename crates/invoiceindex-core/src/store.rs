//! The projection store the reconciler writes domain events into.

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::event::{InvoiceCreated, InvoicePaid, InvoiceRow, LogMeta, VaultEvent, VaultRow};

/// Relational projection of router and vault events.
///
/// Every write must be idempotent: re-applying an event that was already
/// applied leaves the store unchanged and does not error. That is what makes
/// re-scanning a window after a crash safe.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Insert the invoice if absent. If a row already exists, only creation
    /// columns that are still empty are filled; paid columns are never touched.
    async fn upsert_invoice_created(
        &self,
        event: &InvoiceCreated,
        meta: &LogMeta,
    ) -> Result<(), IndexerError>;

    /// Mark the invoice paid, inserting a row if none exists. `paid_at` keeps
    /// the time of the first application.
    async fn upsert_invoice_paid(&self, event: &InvoicePaid, meta: &LogMeta) -> Result<(), IndexerError>;

    /// Record a vault event keyed by `(tx_hash, log_index)`; duplicates are ignored.
    async fn record_vault_event(&self, event: &VaultEvent, meta: &LogMeta) -> Result<(), IndexerError>;

    /// Fetch one invoice row by id.
    async fn invoice(&self, invoice_id: &str) -> Result<Option<InvoiceRow>, IndexerError>;

    /// All invoice rows, ordered by id.
    async fn invoices(&self) -> Result<Vec<InvoiceRow>, IndexerError>;

    /// All vault rows, ordered by block and log index.
    async fn vault_events(&self) -> Result<Vec<VaultRow>, IndexerError>;
}
