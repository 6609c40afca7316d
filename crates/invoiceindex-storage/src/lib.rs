//! invoiceindex-storage: projection and cursor backends for invoiceindex.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, no persistence)
//! - `sqlite`: SQLite via `sqlx` (embedded, single-file persistence)
//! - `postgres`: PostgreSQL via `sqlx` (production deployments)
//!
//! Every backend implements both `CursorStore` and `ProjectionStore`.

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStorage;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
fn storage_err(e: sqlx::Error) -> invoiceindex_core::error::IndexerError {
    invoiceindex_core::error::IndexerError::Storage(e.to_string())
}

/// SQL integers are signed; block numbers and timestamps must fit.
#[cfg(any(feature = "sqlite", feature = "postgres"))]
fn to_i64(field: &str, v: u64) -> Result<i64, invoiceindex_core::error::IndexerError> {
    i64::try_from(v).map_err(|_| {
        invoiceindex_core::error::IndexerError::Storage(format!("{field} {v} exceeds i64 range"))
    })
}

/// Inverse of [`to_i64`]. A negative value means the row is corrupt.
#[cfg(any(feature = "sqlite", feature = "postgres"))]
fn to_u64(field: &str, v: i64) -> Result<u64, invoiceindex_core::error::IndexerError> {
    u64::try_from(v).map_err(|_| {
        invoiceindex_core::error::IndexerError::Storage(format!("{field} {v} is negative"))
    })
}
