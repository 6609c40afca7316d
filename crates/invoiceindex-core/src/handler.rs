//! Event handler table and the window reconciler.
//!
//! Each handler owns one `(contract address, topic0)` pair: it knows how to
//! decode a raw log into a [`DomainEvent`] and how to apply that event to the
//! [`ProjectionStore`]. Supporting a new event type means registering a new
//! handler; the loop and reconciler do not change.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DecodeError, IndexerError};
use crate::event::{DecodedEvent, DomainEvent, LogMeta};
use crate::store::ProjectionStore;
use crate::types::{LogFilter, RawLog};

/// Decodes and applies one event type.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Event name (e.g. `"InvoiceCreated"`).
    fn name(&self) -> &str;

    /// Contract address the event is emitted by (lowercase `0x…`).
    fn address(&self) -> &str;

    /// Event signature hash (lowercase `0x…`).
    fn topic0(&self) -> &str;

    /// Decode a raw log into a domain event.
    fn decode(&self, log: &RawLog) -> Result<DomainEvent, DecodeError>;

    /// Apply a decoded event to the store.
    async fn apply(&self, event: &DecodedEvent, store: &dyn ProjectionStore) -> Result<(), IndexerError> {
        match &event.event {
            DomainEvent::InvoiceCreated(e) => store.upsert_invoice_created(e, &event.meta).await,
            DomainEvent::InvoicePaid(e) => store.upsert_invoice_paid(e, &event.meta).await,
            DomainEvent::Vault(e) => store.record_vault_event(e, &event.meta).await,
        }
    }
}

/// Registry of handlers keyed by `(address, topic0)`.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<(String, String), Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A later registration for the same pair replaces
    /// the earlier one.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        let key = (
            handler.address().to_ascii_lowercase(),
            handler.topic0().to_ascii_lowercase(),
        );
        self.handlers.insert(key, handler);
    }

    /// Look up the handler for a log's emitter and topic0.
    pub fn get(&self, address: &str, topic0: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers
            .get(&(address.to_ascii_lowercase(), topic0.to_ascii_lowercase()))
    }

    /// One `eth_getLogs` filter per registered handler, in a stable order.
    pub fn filters(&self) -> Vec<LogFilter> {
        let mut filters: Vec<LogFilter> = self
            .handlers
            .keys()
            .map(|(address, topic0)| LogFilter::new(address.clone(), topic0.clone()))
            .collect();
        filters.sort_by(|a, b| (&a.address, &a.topic0).cmp(&(&b.address, &b.topic0)));
        filters
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ─── Reconciler ───────────────────────────────────────────────────────────────

/// Outcome of reconciling one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Events decoded and written to the store.
    pub applied: usize,
    /// Logs skipped (removed, duplicate, unknown topic, or undecodable).
    pub skipped: usize,
}

/// Applies a window's logs to the store in chain order.
pub struct Reconciler {
    registry: HandlerRegistry,
}

impl Reconciler {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Decode and apply `logs` in ascending `(block_number, log_index)` order.
    ///
    /// A log that fails to decode is skipped. A store error aborts the batch;
    /// the caller must not advance its cursor in that case.
    pub async fn reconcile(
        &self,
        mut logs: Vec<RawLog>,
        store: &dyn ProjectionStore,
    ) -> Result<ReconcileStats, IndexerError> {
        let mut stats = ReconcileStats::default();
        let total = logs.len();

        logs.retain(|log| !log.is_removed());
        logs.sort_by_key(RawLog::position);
        logs.dedup_by_key(|log| log.position());
        stats.skipped += total - logs.len();

        for log in &logs {
            let Some(topic0) = log.topic0() else {
                stats.skipped += 1;
                continue;
            };
            let Some(handler) = self.registry.get(&log.address, topic0) else {
                tracing::debug!(address = %log.address, topic0, "no handler for log, skipping");
                stats.skipped += 1;
                continue;
            };

            let event = match handler.decode(log) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(
                        event = handler.name(),
                        tx = %log.tx_hash,
                        block = log.block_number,
                        log_index = log.log_index,
                        error = %e,
                        "skipping undecodable log"
                    );
                    stats.skipped += 1;
                    continue;
                }
            };

            let decoded = DecodedEvent {
                meta: LogMeta::from(log),
                event,
            };
            handler.apply(&decoded, store).await?;
            tracing::debug!(
                event = decoded.event.name(),
                invoice_id = decoded.event.invoice_id().unwrap_or("-"),
                block = decoded.meta.block_number,
                log_index = decoded.meta.log_index,
                "event applied"
            );
            stats.applied += 1;
        }

        Ok(stats)
    }
}
