//! Shared fixtures: a scripted chain and raw-log builders.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use invoiceindex_core::cursor::CursorStore;
use invoiceindex_core::error::IndexerError;
use invoiceindex_core::event::{InvoiceCreated, InvoicePaid, InvoiceRow, LogMeta, VaultEvent, VaultEventKind, VaultRow};
use invoiceindex_core::store::ProjectionStore;
use invoiceindex_core::types::{LogFilter, RawLog};
use invoiceindex_evm::abi;
use invoiceindex_evm::fetcher::LogSource;
use invoiceindex_storage::InMemoryStorage;

pub const ROUTER: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
pub const VAULT: &str = "0xe7f1725e7734ce288f8367e1bb143e90bb3f0512";
pub const USDC: &str = "a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
pub const PAYER: &str = "70997970c51812dc3a010c7d01b50e0d17dc79c8";

// ─── Mock chain ───────────────────────────────────────────────────────────────

/// An in-memory chain with a movable head. Records every `eth_getLogs` range.
#[derive(Default)]
pub struct MockChain {
    head: AtomicU64,
    logs: Mutex<Vec<RawLog>>,
    requests: Mutex<Vec<(u64, u64)>>,
    failing: AtomicBool,
}

impl MockChain {
    pub fn new(head: u64) -> Arc<Self> {
        let chain = Self::default();
        chain.head.store(head, Ordering::SeqCst);
        Arc::new(chain)
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn push(&self, log: RawLog) {
        self.logs.lock().unwrap().push(log);
    }

    /// Make every RPC call fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Distinct `(from, to)` ranges requested, in request order.
    pub fn requested_ranges(&self) -> Vec<(u64, u64)> {
        let mut ranges = self.requests.lock().unwrap().clone();
        ranges.dedup();
        ranges
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl LogSource for MockChain {
    async fn get_block_number(&self) -> Result<u64, IndexerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(IndexerError::Rpc("connection refused".into()));
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_logs(&self, filter: &LogFilter, from: u64, to: u64) -> Result<Vec<RawLog>, IndexerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(IndexerError::Rpc("connection refused".into()));
        }
        self.requests.lock().unwrap().push((from, to));
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| filter.matches(l) && l.block_number >= from && l.block_number <= to)
            .cloned()
            .collect())
    }
}

// ─── Storage with an injectable cursor failure ────────────────────────────────

/// In-memory storage whose next cursor save fails when armed. Projection
/// writes still succeed, which models a crash between apply and cursor save.
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: InMemoryStorage,
    fail_next_cursor_save: AtomicBool,
}

impl FlakyStorage {
    pub fn arm(&self) {
        self.fail_next_cursor_save.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CursorStore for FlakyStorage {
    async fn load_cursor(&self, key: &str) -> Result<Option<u64>, IndexerError> {
        self.inner.load_cursor(key).await
    }

    async fn save_cursor(&self, key: &str, next_block: u64) -> Result<(), IndexerError> {
        if self.fail_next_cursor_save.swap(false, Ordering::SeqCst) {
            return Err(IndexerError::Storage("disk full".into()));
        }
        self.inner.save_cursor(key, next_block).await
    }
}

#[async_trait]
impl ProjectionStore for FlakyStorage {
    async fn upsert_invoice_created(&self, e: &InvoiceCreated, m: &LogMeta) -> Result<(), IndexerError> {
        self.inner.upsert_invoice_created(e, m).await
    }
    async fn upsert_invoice_paid(&self, e: &InvoicePaid, m: &LogMeta) -> Result<(), IndexerError> {
        self.inner.upsert_invoice_paid(e, m).await
    }
    async fn record_vault_event(&self, e: &VaultEvent, m: &LogMeta) -> Result<(), IndexerError> {
        self.inner.record_vault_event(e, m).await
    }
    async fn invoice(&self, id: &str) -> Result<Option<InvoiceRow>, IndexerError> {
        self.inner.invoice(id).await
    }
    async fn invoices(&self) -> Result<Vec<InvoiceRow>, IndexerError> {
        self.inner.invoices().await
    }
    async fn vault_events(&self) -> Result<Vec<VaultRow>, IndexerError> {
        self.inner.vault_events().await
    }
}

// ─── Chain whose eth_getLogs never answers ────────────────────────────────────

/// Reports a fixed head but hangs forever on `get_logs`. Counts the calls.
pub struct HangingChain {
    head: u64,
    get_logs_calls: AtomicU64,
}

impl HangingChain {
    pub fn new(head: u64) -> Arc<Self> {
        Arc::new(Self {
            head,
            get_logs_calls: AtomicU64::new(0),
        })
    }

    pub fn calls(&self) -> u64 {
        self.get_logs_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSource for HangingChain {
    async fn get_block_number(&self) -> Result<u64, IndexerError> {
        Ok(self.head)
    }

    async fn get_logs(&self, _filter: &LogFilter, _from: u64, _to: u64) -> Result<Vec<RawLog>, IndexerError> {
        self.get_logs_calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

// ─── Storage whose cursor save can be held open ───────────────────────────────

/// When armed, the next `save_cursor` signals `entered` and then waits for
/// `release` before writing.
#[derive(Default)]
pub struct GatedStorage {
    pub inner: InMemoryStorage,
    armed: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedStorage {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CursorStore for GatedStorage {
    async fn load_cursor(&self, key: &str) -> Result<Option<u64>, IndexerError> {
        self.inner.load_cursor(key).await
    }

    async fn save_cursor(&self, key: &str, next_block: u64) -> Result<(), IndexerError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.save_cursor(key, next_block).await
    }
}

#[async_trait]
impl ProjectionStore for GatedStorage {
    async fn upsert_invoice_created(&self, e: &InvoiceCreated, m: &LogMeta) -> Result<(), IndexerError> {
        self.inner.upsert_invoice_created(e, m).await
    }
    async fn upsert_invoice_paid(&self, e: &InvoicePaid, m: &LogMeta) -> Result<(), IndexerError> {
        self.inner.upsert_invoice_paid(e, m).await
    }
    async fn record_vault_event(&self, e: &VaultEvent, m: &LogMeta) -> Result<(), IndexerError> {
        self.inner.record_vault_event(e, m).await
    }
    async fn invoice(&self, id: &str) -> Result<Option<InvoiceRow>, IndexerError> {
        self.inner.invoice(id).await
    }
    async fn invoices(&self) -> Result<Vec<InvoiceRow>, IndexerError> {
        self.inner.invoices().await
    }
    async fn vault_events(&self) -> Result<Vec<VaultRow>, IndexerError> {
        self.inner.vault_events().await
    }
}

// ─── Log builders ─────────────────────────────────────────────────────────────

/// Left-pad a hex value to one 32-byte word (no `0x`).
pub fn word(hex_value: &str) -> String {
    format!("{:0>64}", hex_value)
}

pub fn topic(hex_value: &str) -> String {
    format!("0x{}", word(hex_value))
}

pub fn invoice_id(n: u8) -> String {
    topic(&format!("{n:02x}"))
}

fn raw(address: &str, topics: Vec<String>, data: String, block: u64, index: u64) -> RawLog {
    RawLog {
        address: address.into(),
        topics,
        data,
        block_number: block,
        tx_hash: format!("0x{block:062x}{index:02x}"),
        log_index: index,
        block_hash: Some(format!("0x{block:064x}")),
        removed: None,
    }
}

pub fn invoice_created(block: u64, index: u64, id: u8, amount: u64) -> RawLog {
    raw(
        ROUTER,
        vec![
            abi::keccak256_signature(abi::INVOICE_CREATED_SIGNATURE),
            invoice_id(id),
            topic("01"),
        ],
        format!("0x{}{}{}", word(USDC), word(&format!("{amount:x}")), word("6553f100")),
        block,
        index,
    )
}

pub fn invoice_paid(block: u64, index: u64, id: u8, amount: u64, fee: u64) -> RawLog {
    raw(
        ROUTER,
        vec![
            abi::keccak256_signature(abi::INVOICE_PAID_SIGNATURE),
            invoice_id(id),
            topic(PAYER),
        ],
        format!("0x{}{}", word(&format!("{amount:x}")), word(&format!("{fee:x}"))),
        block,
        index,
    )
}

pub fn vault_log(kind: VaultEventKind, block: u64, index: u64, amount: u64) -> RawLog {
    raw(
        VAULT,
        vec![
            abi::keccak256_signature(&abi::vault_signature(kind)),
            topic(PAYER),
            topic(USDC),
        ],
        format!("0x{}", word(&format!("{amount:x}"))),
        block,
        index,
    )
}

/// Rows with wall-clock columns cleared, for comparing two runs.
pub fn without_timestamps(rows: Vec<InvoiceRow>) -> Vec<InvoiceRow> {
    rows.into_iter()
        .map(|mut r| {
            r.created_at = None;
            r.paid_at = None;
            r
        })
        .collect()
}
