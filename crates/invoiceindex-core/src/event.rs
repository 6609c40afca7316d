//! Domain events decoded from router/vault logs, and the rows they project to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LogPosition, RawLog};

// ─── Events ───────────────────────────────────────────────────────────────────

/// Emitted by the invoice router when a merchant invoice is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    /// `bytes32` invoice id (`0x…`, lowercase).
    pub invoice_id: String,
    /// `bytes32` merchant id (`0x…`, lowercase).
    pub merchant_id: String,
    /// ERC-20 token the invoice is denominated in.
    pub token: String,
    /// Amount in token base units (decimal string of a `uint256`).
    pub amount: String,
    /// Unix expiry timestamp (seconds).
    pub expiry: u64,
}

/// Emitted by the invoice router when an invoice is settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePaid {
    pub invoice_id: String,
    pub payer: String,
    /// Amount paid in token base units (decimal string).
    pub amount: String,
    /// Router fee in token base units (decimal string).
    pub fee: String,
}

/// The kinds of savings/lock vault activity the indexer records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VaultEventKind {
    Deposit,
    Withdraw,
    Locked,
    Claimed,
}

impl VaultEventKind {
    pub const ALL: [VaultEventKind; 4] = [Self::Deposit, Self::Withdraw, Self::Locked, Self::Claimed];

    /// The Solidity event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Deposit => "Deposit",
            Self::Withdraw => "Withdraw",
            Self::Locked => "Locked",
            Self::Claimed => "Claimed",
        }
    }

    /// Column value used by the SQL backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
            Self::Locked => "locked",
            Self::Claimed => "claimed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for VaultEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted by the vault on deposit/withdraw/lock/claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEvent {
    pub kind: VaultEventKind,
    pub user: String,
    pub token: String,
    pub amount: String,
}

/// A typed event decoded from one raw log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    InvoiceCreated(InvoiceCreated),
    InvoicePaid(InvoicePaid),
    Vault(VaultEvent),
}

impl DomainEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvoiceCreated(_) => "InvoiceCreated",
            Self::InvoicePaid(_) => "InvoicePaid",
            Self::Vault(v) => v.kind.event_name(),
        }
    }

    /// The business key this event upserts on, if it has one.
    pub fn invoice_id(&self) -> Option<&str> {
        match self {
            Self::InvoiceCreated(e) => Some(&e.invoice_id),
            Self::InvoicePaid(e) => Some(&e.invoice_id),
            Self::Vault(_) => None,
        }
    }
}

/// Where in the chain a log came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMeta {
    pub address: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub log_index: u64,
}

impl LogMeta {
    pub fn position(&self) -> LogPosition {
        LogPosition {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }
}

impl From<&RawLog> for LogMeta {
    fn from(log: &RawLog) -> Self {
        Self {
            address: log.address.to_ascii_lowercase(),
            tx_hash: log.tx_hash.to_ascii_lowercase(),
            block_number: log.block_number,
            log_index: log.log_index,
        }
    }
}

/// A domain event together with the log it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub meta: LogMeta,
    pub event: DomainEvent,
}

// ─── Rows ─────────────────────────────────────────────────────────────────────

/// Projection of on-chain invoice state.
///
/// Creation columns are optional: a paid event whose creation was never
/// scanned still produces a row, and a later creation event fills them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRow {
    pub invoice_id: String,
    pub merchant_id: Option<String>,
    pub token: Option<String>,
    pub amount: Option<String>,
    pub expiry: Option<u64>,
    pub paid: bool,
    pub payer: Option<String>,
    pub paid_amount: Option<String>,
    pub fee: Option<String>,
    pub created_tx: Option<String>,
    pub created_block: Option<u64>,
    pub paid_tx: Option<String>,
    pub paid_block: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl InvoiceRow {
    /// An empty, unpaid row for `invoice_id`.
    pub fn empty(invoice_id: impl Into<String>) -> Self {
        Self {
            invoice_id: invoice_id.into(),
            merchant_id: None,
            token: None,
            amount: None,
            expiry: None,
            paid: false,
            payer: None,
            paid_amount: None,
            fee: None,
            created_tx: None,
            created_block: None,
            paid_tx: None,
            paid_block: None,
            created_at: None,
            paid_at: None,
        }
    }

    /// Fill creation columns that are still empty. Paid columns are untouched.
    pub fn merge_created(&mut self, ev: &InvoiceCreated, meta: &LogMeta, now: DateTime<Utc>) {
        self.merchant_id.get_or_insert_with(|| ev.merchant_id.clone());
        self.token.get_or_insert_with(|| ev.token.clone());
        self.amount.get_or_insert_with(|| ev.amount.clone());
        self.expiry.get_or_insert(ev.expiry);
        self.created_tx.get_or_insert_with(|| meta.tx_hash.clone());
        self.created_block.get_or_insert(meta.block_number);
        self.created_at.get_or_insert(now);
    }

    /// Mark the row paid. `paid_at` keeps its first value so that replays
    /// leave the row unchanged.
    pub fn merge_paid(&mut self, ev: &InvoicePaid, meta: &LogMeta, now: DateTime<Utc>) {
        self.paid = true;
        self.payer = Some(ev.payer.clone());
        self.paid_amount = Some(ev.amount.clone());
        self.fee = Some(ev.fee.clone());
        self.paid_tx = Some(meta.tx_hash.clone());
        self.paid_block = Some(meta.block_number);
        self.paid_at.get_or_insert(now);
    }
}

/// One recorded vault event, keyed by its log position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRow {
    pub tx_hash: String,
    pub log_index: u64,
    pub kind: VaultEventKind,
    pub user: String,
    pub token: String,
    pub amount: String,
    pub block_number: u64,
    pub indexed_at: DateTime<Utc>,
}

impl VaultRow {
    pub fn new(ev: &VaultEvent, meta: &LogMeta, now: DateTime<Utc>) -> Self {
        Self {
            tx_hash: meta.tx_hash.clone(),
            log_index: meta.log_index,
            kind: ev.kind,
            user: ev.user.clone(),
            token: ev.token.clone(),
            amount: ev.amount.clone(),
            block_number: meta.block_number,
            indexed_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(block: u64, tx: &str) -> LogMeta {
        LogMeta {
            address: "0xrouter".into(),
            tx_hash: tx.into(),
            block_number: block,
            log_index: 0,
        }
    }

    fn created() -> InvoiceCreated {
        InvoiceCreated {
            invoice_id: "0xaa".into(),
            merchant_id: "0x01".into(),
            token: "0xusdc".into(),
            amount: "5000000".into(),
            expiry: 1_700_000_000,
        }
    }

    fn paid() -> InvoicePaid {
        InvoicePaid {
            invoice_id: "0xaa".into(),
            payer: "0xbb".into(),
            amount: "5000000".into(),
            fee: "5000".into(),
        }
    }

    #[test]
    fn created_then_paid() {
        let now = Utc::now();
        let mut row = InvoiceRow::empty("0xaa");
        row.merge_created(&created(), &meta(105, "0xc1"), now);
        row.merge_paid(&paid(), &meta(132, "0xp1"), now);
        assert!(row.paid);
        assert_eq!(row.amount.as_deref(), Some("5000000"));
        assert_eq!(row.payer.as_deref(), Some("0xbb"));
        assert_eq!(row.created_block, Some(105));
        assert_eq!(row.paid_block, Some(132));
    }

    #[test]
    fn late_created_keeps_paid_state() {
        let now = Utc::now();
        let mut row = InvoiceRow::empty("0xaa");
        row.merge_paid(&paid(), &meta(132, "0xp1"), now);
        row.merge_created(&created(), &meta(105, "0xc1"), now);
        assert!(row.paid);
        assert_eq!(row.merchant_id.as_deref(), Some("0x01"));
        assert_eq!(row.paid_tx.as_deref(), Some("0xp1"));
    }

    #[test]
    fn replaying_paid_is_a_noop() {
        let t0 = Utc::now();
        let mut row = InvoiceRow::empty("0xaa");
        row.merge_created(&created(), &meta(105, "0xc1"), t0);
        row.merge_paid(&paid(), &meta(132, "0xp1"), t0);
        let snapshot = row.clone();
        row.merge_paid(&paid(), &meta(132, "0xp1"), t0 + chrono::Duration::seconds(60));
        row.merge_created(&created(), &meta(105, "0xc1"), t0 + chrono::Duration::seconds(60));
        assert_eq!(row, snapshot);
    }

    #[test]
    fn vault_kind_roundtrip() {
        for kind in VaultEventKind::ALL {
            assert_eq!(VaultEventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(VaultEventKind::parse("stake"), None);
    }
}
