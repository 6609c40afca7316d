//! Event signatures and ABI helpers for router and vault logs.
//!
//! `topics[0]` of an EVM log is the keccak256 hash of the event's canonical
//! signature. Indexed parameters follow in `topics[1..]`, each one 32-byte
//! word. Non-indexed parameters are ABI-encoded as a tuple in `data`.

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::U256;
use tiny_keccak::{Hasher, Keccak};

use invoiceindex_core::error::DecodeError;
use invoiceindex_core::event::VaultEventKind;
use invoiceindex_core::types::{decode_hex, RawLog};

/// `InvoiceCreated(bytes32 indexed invoiceId, bytes32 indexed merchantId, address token, uint256 amount, uint64 expiry)`
pub const INVOICE_CREATED_SIGNATURE: &str = "InvoiceCreated(bytes32,bytes32,address,uint256,uint64)";

/// `InvoicePaid(bytes32 indexed invoiceId, address indexed payer, uint256 amount, uint256 fee)`
pub const INVOICE_PAID_SIGNATURE: &str = "InvoicePaid(bytes32,address,uint256,uint256)";

/// Vault events share one shape:
/// `<Name>(address indexed user, address indexed token, uint256 amount)`.
pub fn vault_signature(kind: VaultEventKind) -> String {
    format!("{}(address,address,uint256)", kind.event_name())
}

/// keccak256 of a canonical event signature, as lowercase `0x…` hex.
pub fn keccak256_signature(signature: &str) -> String {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut output);
    format!("0x{}", hex::encode(output))
}

fn topic_word(log: &RawLog, index: usize, event: &str) -> Result<Vec<u8>, DecodeError> {
    let topic = log.topics.get(index).ok_or_else(|| DecodeError::MissingTopic {
        event: event.to_string(),
        index,
    })?;
    let bytes = decode_hex("topic", topic)?;
    if bytes.len() != 32 {
        return Err(DecodeError::InvalidHex {
            field: format!("topics[{index}]"),
            reason: format!("expected 32 bytes, got {}", bytes.len()),
        });
    }
    Ok(bytes)
}

/// An indexed `bytes32` parameter, as lowercase `0x…` hex.
pub fn topic_bytes32(log: &RawLog, index: usize, event: &str) -> Result<String, DecodeError> {
    let word = topic_word(log, index, event)?;
    Ok(format!("0x{}", hex::encode(word)))
}

/// An indexed `address` parameter, as lowercase `0x…` hex.
pub fn topic_address(log: &RawLog, index: usize, event: &str) -> Result<String, DecodeError> {
    let word = topic_word(log, index, event)?;
    let value = DynSolType::Address
        .abi_decode(&word)
        .map_err(|e| DecodeError::Abi {
            event: event.to_string(),
            reason: format!("topic {index}: {e}"),
        })?;
    as_address(&value, event)
}

/// Decode the log's `data` payload as a tuple of `types`.
pub fn decode_data(log: &RawLog, event: &str, types: Vec<DynSolType>) -> Result<Vec<DynSolValue>, DecodeError> {
    let expected = types.len();
    let data = log.data_bytes()?;
    let decoded = DynSolType::Tuple(types)
        .abi_decode(&data)
        .map_err(|e| DecodeError::Abi {
            event: event.to_string(),
            reason: e.to_string(),
        })?;

    let values = match decoded {
        DynSolValue::Tuple(values) => values,
        other => vec![other],
    };
    if values.len() != expected {
        return Err(DecodeError::Abi {
            event: event.to_string(),
            reason: format!("expected {expected} data fields, got {}", values.len()),
        });
    }
    Ok(values)
}

pub fn as_address(value: &DynSolValue, field: &str) -> Result<String, DecodeError> {
    match value {
        DynSolValue::Address(a) => Ok(format!("{a:#x}")),
        other => Err(mismatch(field, "address", other)),
    }
}

fn as_u256(value: &DynSolValue, field: &str) -> Result<U256, DecodeError> {
    match value {
        DynSolValue::Uint(u, _) => Ok(*u),
        other => Err(mismatch(field, "uint", other)),
    }
}

/// A `uint*` value as a decimal string. `uint256` amounts do not fit native ints.
pub fn as_decimal(value: &DynSolValue, field: &str) -> Result<String, DecodeError> {
    Ok(as_u256(value, field)?.to_string())
}

pub fn as_u64(value: &DynSolValue, field: &str) -> Result<u64, DecodeError> {
    let u = as_u256(value, field)?;
    u64::try_from(u).map_err(|_| DecodeError::Overflow {
        field: field.to_string(),
        target: "u64".into(),
    })
}

fn mismatch(field: &str, expected: &str, got: &DynSolValue) -> DecodeError {
    DecodeError::Abi {
        event: field.to_string(),
        reason: format!("expected {expected}, got {got:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(hex_value: &str) -> String {
        format!("{:0>64}", hex_value)
    }

    fn log_with(topics: Vec<String>, data: String) -> RawLog {
        RawLog {
            address: "0x0000000000000000000000000000000000000001".into(),
            topics,
            data,
            block_number: 1,
            tx_hash: "0x01".into(),
            log_index: 0,
            block_hash: None,
            removed: None,
        }
    }

    #[test]
    fn erc20_transfer_topic() {
        assert_eq!(
            keccak256_signature("Transfer(address,address,uint256)"),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn vault_signatures() {
        assert_eq!(
            vault_signature(VaultEventKind::Deposit),
            "Deposit(address,address,uint256)"
        );
        assert_eq!(
            vault_signature(VaultEventKind::Claimed),
            "Claimed(address,address,uint256)"
        );
    }

    #[test]
    fn decodes_indexed_address_lowercase() {
        let log = log_with(
            vec![
                format!("0x{}", word("1")),
                format!("0x{}", word("AbCdEf0000000000000000000000000000000001")),
            ],
            "0x".into(),
        );
        assert_eq!(
            topic_address(&log, 1, "Test").unwrap(),
            "0xabcdef0000000000000000000000000000000001"
        );
    }

    #[test]
    fn missing_topic_is_reported() {
        let log = log_with(vec![format!("0x{}", word("1"))], "0x".into());
        assert_eq!(
            topic_bytes32(&log, 2, "InvoicePaid").unwrap_err(),
            DecodeError::MissingTopic {
                event: "InvoicePaid".into(),
                index: 2
            }
        );
    }

    #[test]
    fn short_topic_is_rejected() {
        let log = log_with(vec!["0x01".into(), "0xdead".into()], "0x".into());
        assert!(matches!(
            topic_bytes32(&log, 1, "Test"),
            Err(DecodeError::InvalidHex { .. })
        ));
    }

    #[test]
    fn decodes_data_tuple() {
        let data = format!(
            "0x{}{}",
            word("de0b6b3a7640000"), // 1e18
            word("ffffffffffffffff")
        );
        let log = log_with(vec![], data);
        let values = decode_data(&log, "Test", vec![DynSolType::Uint(256), DynSolType::Uint(64)]).unwrap();
        assert_eq!(as_decimal(&values[0], "amount").unwrap(), "1000000000000000000");
        assert_eq!(as_u64(&values[1], "expiry").unwrap(), u64::MAX);
    }

    #[test]
    fn truncated_data_fails() {
        let log = log_with(vec![], format!("0x{}", word("1")));
        let err = decode_data(&log, "Test", vec![DynSolType::Uint(256), DynSolType::Uint(256)]).unwrap_err();
        assert!(matches!(err, DecodeError::Abi { .. }));
    }

    #[test]
    fn u64_overflow_is_reported() {
        let value = DynSolValue::Uint(U256::from(u64::MAX) + U256::from(1u8), 256);
        assert!(matches!(as_u64(&value, "expiry"), Err(DecodeError::Overflow { .. })));
    }
}
