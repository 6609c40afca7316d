//! invoiceindex-core: foundation for the invoice router log indexer.
//!
//! # Architecture
//!
//! ```text
//! IndexerBuilder → IndexLoop
//!                      ├── LogSource        (eth_blockNumber / eth_getLogs)
//!                      ├── next_window      (bounded scan ranges)
//!                      ├── Reconciler       (decode + ordered idempotent apply)
//!                      │     └── HandlerRegistry (topic0 → handler)
//!                      ├── CursorManager    (durable next_block)
//!                      └── ProjectionStore  (memory / SQLite / Postgres)
//! ```

pub mod cursor;
pub mod error;
pub mod event;
pub mod handler;
pub mod indexer;
pub mod scanner;
pub mod store;
pub mod types;

pub use cursor::{CursorManager, CursorStore, MemoryCursorStore};
pub use error::{DecodeError, IndexerError};
pub use event::{
    DecodedEvent, DomainEvent, InvoiceCreated, InvoicePaid, InvoiceRow, LogMeta, VaultEvent,
    VaultEventKind, VaultRow,
};
pub use handler::{EventHandler, HandlerRegistry, ReconcileStats, Reconciler};
pub use indexer::{IndexerConfig, IndexerState};
pub use scanner::{next_window, ScanWindow};
pub use store::ProjectionStore;
pub use types::{LogFilter, LogPosition, RawLog};
