//! The index loop: polls the head, scans a bounded window and commits it.
//!
//! One iteration:
//!   1. Read the head and derive the confirmed head.
//!   2. Load the cursor (seeding it on first run).
//!   3. Compute the next window `[cursor, min(cursor + max_range - 1, head)]`.
//!   4. Fetch every registered filter's logs for the window.
//!   5. Reconcile the logs into the projection store in chain order.
//!   6. Persist `cursor = window.to + 1`.
//!
//! Steps 1–4 are the *poll* phase and may be interrupted by shutdown. Steps
//! 5–6 are the *commit* phase, which shutdown never interrupts. The cursor
//! only moves after every projection write of its window succeeded.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use invoiceindex_core::cursor::{CursorManager, CursorStore};
use invoiceindex_core::error::IndexerError;
use invoiceindex_core::handler::{HandlerRegistry, ReconcileStats, Reconciler};
use invoiceindex_core::indexer::{IndexerConfig, IndexerState};
use invoiceindex_core::scanner::{confirmed_head, next_window, ScanWindow};
use invoiceindex_core::store::ProjectionStore;
use invoiceindex_core::types::RawLog;

use crate::fetcher::{fetch_window, LogSource};

/// A fetched window waiting to be committed.
#[derive(Debug, Clone)]
pub struct PendingWindow {
    pub window: ScanWindow,
    pub head: u64,
    pub logs: Vec<RawLog>,
}

/// Result of one [`IndexLoop::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing to scan: the cursor is past the confirmed head.
    Idle { cursor: u64, head: u64 },
    /// A window was applied and the cursor moved to `window.to + 1`.
    Scanned { window: ScanWindow, stats: ReconcileStats },
}

/// Drives one deployment's indexer.
pub struct IndexLoop<L, S> {
    config: IndexerConfig,
    source: L,
    store: Arc<S>,
    reconciler: Reconciler,
    cursor: CursorManager,
    state: IndexerState,
}

impl<L, S> IndexLoop<L, S>
where
    L: LogSource,
    S: CursorStore + ProjectionStore + 'static,
{
    pub fn new(config: IndexerConfig, source: L, store: Arc<S>, handlers: HandlerRegistry) -> Self {
        let cursor = CursorManager::new(store.clone() as Arc<dyn CursorStore>, config.id.clone());
        Self {
            reconciler: Reconciler::new(handlers),
            cursor,
            source,
            store,
            state: IndexerState::Idle,
            config,
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The last cursor value loaded or committed.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor.current()
    }

    /// Load the persisted cursor, or seed and persist one on first run.
    async fn ensure_cursor(&mut self, head: u64) -> Result<u64, IndexerError> {
        if let Some(cursor) = self.cursor.current() {
            return Ok(cursor);
        }
        if let Some(cursor) = self.cursor.load().await? {
            tracing::info!(indexer = %self.config.id, next_block = cursor, "resuming from cursor");
            return Ok(cursor);
        }
        let seed = self.config.seed_block(head);
        self.cursor.set_cursor(seed).await?;
        tracing::info!(indexer = %self.config.id, next_block = seed, head, "no cursor found, seeded");
        Ok(seed)
    }

    /// Poll phase: compute the next window and fetch its logs.
    ///
    /// Returns `None` when caught up. Nothing is written except the initial
    /// cursor seed.
    pub async fn poll(&mut self) -> Result<Option<PendingWindow>, IndexerError> {
        let (_, pending) = self.poll_at_head().await?;
        Ok(pending)
    }

    async fn poll_at_head(&mut self) -> Result<(u64, Option<PendingWindow>), IndexerError> {
        let head = self.source.get_block_number().await?;
        let cursor = self.ensure_cursor(head).await?;

        let window = confirmed_head(head, self.config.confirmation_depth)
            .and_then(|target| next_window(cursor, target, self.config.max_range));
        let Some(window) = window else {
            self.state = IndexerState::Idle;
            tracing::trace!(cursor, head, "caught up");
            return Ok((head, None));
        };

        self.state = IndexerState::Scanning;
        let filters = self.reconciler.registry().filters();
        let logs = fetch_window(&self.source, &filters, window).await?;
        tracing::debug!(%window, head, logs = logs.len(), "window fetched");
        Ok((head, Some(PendingWindow { window, head, logs })))
    }

    /// Commit phase: apply the window's logs, then advance the cursor.
    ///
    /// If any projection write fails the cursor is left where it was and the
    /// same window is scanned again on the next iteration.
    pub async fn commit(&mut self, pending: PendingWindow) -> Result<ReconcileStats, IndexerError> {
        let PendingWindow { window, head, logs } = pending;
        let stats = self.reconciler.reconcile(logs, self.store.as_ref()).await?;
        self.cursor.set_cursor(window.next_cursor()).await?;
        tracing::info!(
            from = window.from,
            to = window.to,
            head,
            applied = stats.applied,
            skipped = stats.skipped,
            next_block = window.next_cursor(),
            "window indexed"
        );
        Ok(stats)
    }

    /// Run one poll + commit.
    pub async fn step(&mut self) -> Result<StepOutcome, IndexerError> {
        match self.poll_at_head().await? {
            (head, None) => Ok(StepOutcome::Idle {
                cursor: self.cursor.current().unwrap_or_default(),
                head,
            }),
            (_, Some(pending)) => {
                let window = pending.window;
                let stats = self.commit(pending).await?;
                Ok(StepOutcome::Scanned { window, stats })
            }
        }
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// Transient errors are logged and the iteration is retried after
    /// `poll_interval`. Non-transient errors (bad configuration, a cursor
    /// regression) stop the loop and are returned.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), IndexerError> {
        self.config.validate()?;
        let poll_interval = self.config.poll_interval();
        let limit = self.config.iteration_timeout();

        tracing::info!(
            indexer = %self.config.id,
            router = %self.config.router_address,
            vault = self.config.vault_address.as_deref().unwrap_or("-"),
            handlers = self.reconciler.registry().len(),
            max_range = self.config.max_range,
            "index loop starting"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let polled = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                polled = bounded(limit, self.poll()) => polled,
            };

            let result = match polled {
                Ok(Some(pending)) => bounded(limit, self.commit(pending)).await.map(Some),
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            };

            match result {
                // Still behind the head: scan the next window right away.
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        error = %e,
                        next_block = self.cursor.current(),
                        "iteration failed, will retry"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "index loop stopping on fatal error");
                    self.state = IndexerState::Stopped;
                    return Err(e);
                }
            }

            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        self.state = IndexerState::Stopped;
        tracing::info!(indexer = %self.config.id, next_block = self.cursor.current(), "index loop stopped");
        Ok(())
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn bounded<T, F>(limit: Option<Duration>, fut: F) -> Result<T, IndexerError>
where
    F: Future<Output = Result<T, IndexerError>>,
{
    match limit {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| IndexerError::Timeout {
                ms: limit.as_millis() as u64,
            })?,
    }
}
