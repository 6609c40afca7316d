//! Range scanner: picks the next bounded block window to fetch.
//!
//! RPC providers cap the block span of a single `eth_getLogs` call. The
//! scanner always asks for the widest span the cap allows, so a backlog of
//! `head - cursor` blocks drains in `ceil((head - cursor + 1) / max_range)`
//! calls.

use serde::{Deserialize, Serialize};

/// An inclusive block range `[from, to]` scanned in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWindow {
    pub from: u64,
    pub to: u64,
}

impl ScanWindow {
    /// Number of blocks covered (always ≥ 1).
    pub fn len(&self) -> u64 {
        (self.to - self.from).saturating_add(1)
    }

    /// The cursor value after this window is fully applied.
    pub fn next_cursor(&self) -> u64 {
        self.to.saturating_add(1)
    }
}

impl std::fmt::Display for ScanWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Compute the next window for `cursor` given the chain `head`.
///
/// Returns `None` when the indexer is caught up (`cursor > head`).
/// A `max_range` of 0 is treated as 1.
pub fn next_window(cursor: u64, head: u64, max_range: u64) -> Option<ScanWindow> {
    if cursor > head {
        return None;
    }
    let span = max_range.max(1) - 1;
    Some(ScanWindow {
        from: cursor,
        to: cursor.saturating_add(span).min(head),
    })
}

/// The head the scanner may advance to when `confirmation_depth` blocks are
/// kept back from the tip. `None` while the chain is shorter than the depth.
pub fn confirmed_head(head: u64, confirmation_depth: u64) -> Option<u64> {
    head.checked_sub(confirmation_depth)
}
