//! SQLite storage backend for invoiceindex.
//!
//! Persists the invoice projection, vault events and the indexer cursor to a
//! single SQLite file. Uses `sqlx` with WAL mode for concurrent read
//! performance.
//!
//! # Usage
//! ```rust,no_run
//! use invoiceindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./invoices.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use invoiceindex_core::cursor::CursorStore;
use invoiceindex_core::error::IndexerError;
use invoiceindex_core::event::{
    InvoiceCreated, InvoicePaid, InvoiceRow, LogMeta, VaultEvent, VaultEventKind, VaultRow,
};
use invoiceindex_core::store::ProjectionStore;

use crate::{storage_err, to_i64, to_u64};

/// SQLite-backed projection and cursor storage.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./invoices.db"`) or a full
    /// SQLite URL (`"sqlite:./invoices.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Every connection to `:memory:` is a separate database, so the pool is
    /// pinned to one connection that is never recycled. All data is lost when
    /// the storage is dropped.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS invoices (
                invoice_id    TEXT    PRIMARY KEY,
                merchant_id   TEXT,
                token         TEXT,
                amount        TEXT,
                expiry        INTEGER,
                paid          INTEGER NOT NULL DEFAULT 0,
                payer         TEXT,
                paid_amount   TEXT,
                fee           TEXT,
                created_tx    TEXT,
                created_block INTEGER,
                paid_tx       TEXT,
                paid_block    INTEGER,
                created_at    TEXT,
                paid_at       TEXT
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vault_events (
                tx_hash      TEXT    NOT NULL,
                log_index    INTEGER NOT NULL,
                kind         TEXT    NOT NULL,
                user_address TEXT    NOT NULL,
                token        TEXT    NOT NULL,
                amount       TEXT    NOT NULL,
                block_number INTEGER NOT NULL,
                indexed_at   TEXT    NOT NULL,
                PRIMARY KEY (tx_hash, log_index)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vault_events_block ON vault_events (block_number, log_index);",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS indexer_state (
                id         TEXT    PRIMARY KEY,
                next_block INTEGER NOT NULL,
                updated_at TEXT    NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

fn invoice_from_row(row: &SqliteRow) -> Result<InvoiceRow, IndexerError> {
    Ok(InvoiceRow {
        invoice_id: row.try_get("invoice_id").map_err(storage_err)?,
        merchant_id: row.try_get("merchant_id").map_err(storage_err)?,
        token: row.try_get("token").map_err(storage_err)?,
        amount: row.try_get("amount").map_err(storage_err)?,
        expiry: row
            .try_get::<Option<i64>, _>("expiry")
            .map_err(storage_err)?
            .map(|v| to_u64("expiry", v))
            .transpose()?,
        paid: row.try_get("paid").map_err(storage_err)?,
        payer: row.try_get("payer").map_err(storage_err)?,
        paid_amount: row.try_get("paid_amount").map_err(storage_err)?,
        fee: row.try_get("fee").map_err(storage_err)?,
        created_tx: row.try_get("created_tx").map_err(storage_err)?,
        created_block: row
            .try_get::<Option<i64>, _>("created_block")
            .map_err(storage_err)?
            .map(|v| to_u64("created_block", v))
            .transpose()?,
        paid_tx: row.try_get("paid_tx").map_err(storage_err)?,
        paid_block: row
            .try_get::<Option<i64>, _>("paid_block")
            .map_err(storage_err)?
            .map(|v| to_u64("paid_block", v))
            .transpose()?,
        created_at: row.try_get::<Option<DateTime<Utc>>, _>("created_at").map_err(storage_err)?,
        paid_at: row.try_get::<Option<DateTime<Utc>>, _>("paid_at").map_err(storage_err)?,
    })
}

fn vault_from_row(row: &SqliteRow) -> Result<VaultRow, IndexerError> {
    let kind: String = row.try_get("kind").map_err(storage_err)?;
    Ok(VaultRow {
        tx_hash: row.try_get("tx_hash").map_err(storage_err)?,
        log_index: to_u64("log_index", row.try_get("log_index").map_err(storage_err)?)?,
        kind: VaultEventKind::parse(&kind)
            .ok_or_else(|| IndexerError::Storage(format!("unknown vault event kind '{kind}'")))?,
        user: row.try_get("user_address").map_err(storage_err)?,
        token: row.try_get("token").map_err(storage_err)?,
        amount: row.try_get("amount").map_err(storage_err)?,
        block_number: to_u64("block_number", row.try_get("block_number").map_err(storage_err)?)?,
        indexed_at: row.try_get("indexed_at").map_err(storage_err)?,
    })
}

// ─── ProjectionStore impl ────────────────────────────────────────────────────

#[async_trait]
impl ProjectionStore for SqliteStorage {
    async fn upsert_invoice_created(&self, event: &InvoiceCreated, meta: &LogMeta) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO invoices
                (invoice_id, merchant_id, token, amount, expiry, paid, created_tx, created_block, created_at)
             VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)
             ON CONFLICT (invoice_id) DO UPDATE SET
                merchant_id   = COALESCE(invoices.merchant_id, excluded.merchant_id),
                token         = COALESCE(invoices.token, excluded.token),
                amount        = COALESCE(invoices.amount, excluded.amount),
                expiry        = COALESCE(invoices.expiry, excluded.expiry),
                created_tx    = COALESCE(invoices.created_tx, excluded.created_tx),
                created_block = COALESCE(invoices.created_block, excluded.created_block),
                created_at    = COALESCE(invoices.created_at, excluded.created_at)",
        )
        .bind(&event.invoice_id)
        .bind(&event.merchant_id)
        .bind(&event.token)
        .bind(&event.amount)
        .bind(to_i64("expiry", event.expiry)?)
        .bind(&meta.tx_hash)
        .bind(to_i64("block_number", meta.block_number)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(invoice_id = %event.invoice_id, block = meta.block_number, "invoice created upserted");
        Ok(())
    }

    async fn upsert_invoice_paid(&self, event: &InvoicePaid, meta: &LogMeta) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO invoices
                (invoice_id, paid, payer, paid_amount, fee, paid_tx, paid_block, paid_at)
             VALUES (?, 1, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (invoice_id) DO UPDATE SET
                paid        = 1,
                payer       = excluded.payer,
                paid_amount = excluded.paid_amount,
                fee         = excluded.fee,
                paid_tx     = excluded.paid_tx,
                paid_block  = excluded.paid_block,
                paid_at     = COALESCE(invoices.paid_at, excluded.paid_at)",
        )
        .bind(&event.invoice_id)
        .bind(&event.payer)
        .bind(&event.amount)
        .bind(&event.fee)
        .bind(&meta.tx_hash)
        .bind(to_i64("block_number", meta.block_number)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(invoice_id = %event.invoice_id, block = meta.block_number, "invoice marked paid");
        Ok(())
    }

    async fn record_vault_event(&self, event: &VaultEvent, meta: &LogMeta) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO vault_events
                (tx_hash, log_index, kind, user_address, token, amount, block_number, indexed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (tx_hash, log_index) DO NOTHING",
        )
        .bind(&meta.tx_hash)
        .bind(to_i64("log_index", meta.log_index)?)
        .bind(event.kind.as_str())
        .bind(&event.user)
        .bind(&event.token)
        .bind(&event.amount)
        .bind(to_i64("block_number", meta.block_number)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(kind = %event.kind, block = meta.block_number, "vault event recorded");
        Ok(())
    }

    async fn invoice(&self, invoice_id: &str) -> Result<Option<InvoiceRow>, IndexerError> {
        let row = sqlx::query("SELECT * FROM invoices WHERE invoice_id = ?")
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.as_ref().map(invoice_from_row).transpose()
    }

    async fn invoices(&self) -> Result<Vec<InvoiceRow>, IndexerError> {
        let rows = sqlx::query("SELECT * FROM invoices ORDER BY invoice_id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(invoice_from_row).collect()
    }

    async fn vault_events(&self) -> Result<Vec<VaultRow>, IndexerError> {
        let rows = sqlx::query("SELECT * FROM vault_events ORDER BY block_number, log_index")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(vault_from_row).collect()
    }
}

// ─── CursorStore impl ────────────────────────────────────────────────────────

#[async_trait]
impl CursorStore for SqliteStorage {
    async fn load_cursor(&self, key: &str) -> Result<Option<u64>, IndexerError> {
        let row = sqlx::query("SELECT next_block FROM indexer_state WHERE id = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.map(|r| to_u64("next_block", r.try_get("next_block").map_err(storage_err)?))
            .transpose()
    }

    async fn save_cursor(&self, key: &str, next_block: u64) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO indexer_state (id, next_block, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                next_block = excluded.next_block,
                updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(to_i64("next_block", next_block)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(key, next_block, "cursor saved");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
