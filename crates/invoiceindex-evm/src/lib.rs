//! invoiceindex-evm: router/vault event decoding, JSON-RPC log source and index loop.

pub mod abi;
pub mod builder;
pub mod events;
pub mod fetcher;
pub mod index_loop;
pub mod rpc;

pub use builder::IndexerBuilder;
pub use events::{default_registry, InvoiceCreatedHandler, InvoicePaidHandler, VaultEventHandler};
pub use fetcher::{fetch_window, LogSource};
pub use index_loop::{IndexLoop, PendingWindow, StepOutcome};
pub use rpc::{HttpClientConfig, HttpLogSource, RetryConfig};
