//! Shared types for the indexing pipeline.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

// ─── RawLog ───────────────────────────────────────────────────────────────────

/// A raw EVM log as returned by `eth_getLogs`.
///
/// Quantities arrive hex-encoded on the wire and are parsed on
/// deserialization, so a malformed RPC response fails the whole fetch instead
/// of producing logs at block 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber", with = "hex_quantity")]
    pub block_number: u64,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "logIndex", with = "hex_quantity")]
    pub log_index: u64,
    #[serde(rename = "blockHash", default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<bool>,
}

impl RawLog {
    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }

    /// The event signature hash (`topics[0]`), if any.
    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }

    /// Position of the log in the chain, used for ordering within a window.
    pub fn position(&self) -> LogPosition {
        LogPosition {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }

    /// Decode the `data` field into bytes.
    pub fn data_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        decode_hex("data", &self.data)
    }
}

/// `(block_number, log_index)`, the canonical order logs are applied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u64,
}

// ─── LogFilter ────────────────────────────────────────────────────────────────

/// One `eth_getLogs` filter: a contract address plus a single event topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Contract address emitting the event (`0x…`).
    pub address: String,
    /// Event signature hash (`topics[0]`).
    pub topic0: String,
}

impl LogFilter {
    pub fn new(address: impl Into<String>, topic0: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            topic0: topic0.into(),
        }
    }

    /// Returns `true` if `log` was emitted by this address with this topic.
    pub fn matches(&self, log: &RawLog) -> bool {
        log.address.eq_ignore_ascii_case(&self.address)
            && log
                .topic0()
                .is_some_and(|t| t.eq_ignore_ascii_case(&self.topic0))
    }
}

// ─── Hex helpers ──────────────────────────────────────────────────────────────

/// Parse a hex quantity (`0x1a`, with or without prefix) into a `u64`.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}

/// Format a `u64` as a JSON-RPC hex quantity.
pub fn to_hex_quantity(n: u64) -> String {
    format!("0x{n:x}")
}

/// Decode a `0x…` hex string into bytes. `"0x"` decodes to an empty vector.
pub fn decode_hex(field: &str, s: &str) -> Result<Vec<u8>, DecodeError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|e| DecodeError::InvalidHex {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

/// Returns `true` if `s` looks like a 20-byte `0x…` address.
pub fn is_address(s: &str) -> bool {
    s.strip_prefix("0x")
        .is_some_and(|h| h.len() == 40 && h.chars().all(|c| c.is_ascii_hexdigit()))
}

mod hex_quantity {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(n: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::to_hex_quantity(*n))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_hex_u64(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid hex quantity '{raw}'")))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
