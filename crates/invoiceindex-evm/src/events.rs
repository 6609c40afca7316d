//! Handlers for the invoice router and vault events.

use alloy_core::dyn_abi::DynSolType;
use std::sync::Arc;

use invoiceindex_core::error::DecodeError;
use invoiceindex_core::event::{DomainEvent, InvoiceCreated, InvoicePaid, VaultEvent, VaultEventKind};
use invoiceindex_core::handler::{EventHandler, HandlerRegistry};
use invoiceindex_core::indexer::IndexerConfig;
use invoiceindex_core::types::RawLog;

use crate::abi;

/// `InvoiceCreated` on the router.
pub struct InvoiceCreatedHandler {
    address: String,
    topic0: String,
}

impl InvoiceCreatedHandler {
    pub fn new(router: &str) -> Self {
        Self {
            address: router.to_ascii_lowercase(),
            topic0: abi::keccak256_signature(abi::INVOICE_CREATED_SIGNATURE),
        }
    }
}

impl EventHandler for InvoiceCreatedHandler {
    fn name(&self) -> &str {
        "InvoiceCreated"
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn topic0(&self) -> &str {
        &self.topic0
    }

    fn decode(&self, log: &RawLog) -> Result<DomainEvent, DecodeError> {
        let name = self.name();
        let invoice_id = abi::topic_bytes32(log, 1, name)?;
        let merchant_id = abi::topic_bytes32(log, 2, name)?;
        let data = abi::decode_data(
            log,
            name,
            vec![DynSolType::Address, DynSolType::Uint(256), DynSolType::Uint(64)],
        )?;

        Ok(DomainEvent::InvoiceCreated(InvoiceCreated {
            invoice_id,
            merchant_id,
            token: abi::as_address(&data[0], "token")?,
            amount: abi::as_decimal(&data[1], "amount")?,
            expiry: abi::as_u64(&data[2], "expiry")?,
        }))
    }
}

/// `InvoicePaid` on the router.
pub struct InvoicePaidHandler {
    address: String,
    topic0: String,
}

impl InvoicePaidHandler {
    pub fn new(router: &str) -> Self {
        Self {
            address: router.to_ascii_lowercase(),
            topic0: abi::keccak256_signature(abi::INVOICE_PAID_SIGNATURE),
        }
    }
}

impl EventHandler for InvoicePaidHandler {
    fn name(&self) -> &str {
        "InvoicePaid"
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn topic0(&self) -> &str {
        &self.topic0
    }

    fn decode(&self, log: &RawLog) -> Result<DomainEvent, DecodeError> {
        let name = self.name();
        let invoice_id = abi::topic_bytes32(log, 1, name)?;
        let payer = abi::topic_address(log, 2, name)?;
        let data = abi::decode_data(log, name, vec![DynSolType::Uint(256), DynSolType::Uint(256)])?;

        Ok(DomainEvent::InvoicePaid(InvoicePaid {
            invoice_id,
            payer,
            amount: abi::as_decimal(&data[0], "amount")?,
            fee: abi::as_decimal(&data[1], "fee")?,
        }))
    }
}

/// One of the vault's `Deposit` / `Withdraw` / `Locked` / `Claimed` events.
pub struct VaultEventHandler {
    kind: VaultEventKind,
    address: String,
    topic0: String,
}

impl VaultEventHandler {
    pub fn new(vault: &str, kind: VaultEventKind) -> Self {
        Self {
            kind,
            address: vault.to_ascii_lowercase(),
            topic0: abi::keccak256_signature(&abi::vault_signature(kind)),
        }
    }
}

impl EventHandler for VaultEventHandler {
    fn name(&self) -> &str {
        self.kind.event_name()
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn topic0(&self) -> &str {
        &self.topic0
    }

    fn decode(&self, log: &RawLog) -> Result<DomainEvent, DecodeError> {
        let name = self.name();
        let user = abi::topic_address(log, 1, name)?;
        let token = abi::topic_address(log, 2, name)?;
        let data = abi::decode_data(log, name, vec![DynSolType::Uint(256)])?;

        Ok(DomainEvent::Vault(VaultEvent {
            kind: self.kind,
            user,
            token,
            amount: abi::as_decimal(&data[0], "amount")?,
        }))
    }
}

/// The handler table for a deployment: router events always, vault events
/// only when a vault address is configured.
pub fn default_registry(config: &IndexerConfig) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(InvoiceCreatedHandler::new(&config.router_address)));
    registry.register(Arc::new(InvoicePaidHandler::new(&config.router_address)));
    if let Some(vault) = &config.vault_address {
        for kind in VaultEventKind::ALL {
            registry.register(Arc::new(VaultEventHandler::new(vault, kind)));
        }
    }
    registry
}
