//! invoiceindex CLI: run the indexer and inspect its state.
//!
//! Usage:
//! ```bash
//! invoiceindex run --rpc-url http://localhost:8545 --router 0x5fbd...0aa3
//! invoiceindex status --database-url sqlite:./invoices.db
//! invoiceindex info
//! ```
//!
//! Every flag can also come from the environment (or a `.env` file).

mod logging;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

use invoiceindex_core::cursor::CursorStore;
use invoiceindex_core::event::VaultEventKind;
use invoiceindex_core::indexer::IndexerConfig;
use invoiceindex_core::store::ProjectionStore;
use invoiceindex_evm::abi;
use invoiceindex_evm::{HttpLogSource, IndexerBuilder};
use invoiceindex_storage::postgres::PostgresStorage;
use invoiceindex_storage::sqlite::SqliteStorage;
use invoiceindex_storage::InMemoryStorage;

use crate::logging::{init_tracing, LogConfig};

#[derive(Debug, Parser)]
#[command(name = "invoiceindex", version, about = "Invoice router and vault log indexer")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Emit JSON structured logs
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    /// Log filter used when RUST_LOG is unset, e.g. `info,invoiceindex_evm=debug`
    #[arg(long, env = "LOG_LEVEL", global = true, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index router (and vault) events until interrupted
    Run(RunArgs),
    /// Print the persisted cursor and projection row counts
    Status(StoreArgs),
    /// Print defaults and the event topics being indexed
    Info,
}

#[derive(Debug, Args)]
struct StoreArgs {
    /// postgres://…, sqlite:…, a file path, or `memory`
    #[arg(long, env = "DATABASE_URL", default_value = "invoiceindex.db")]
    database_url: String,

    /// Cursor key
    #[arg(long, env = "INDEXER_ID", default_value = "default")]
    id: String,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// JSON-RPC endpoint
    #[arg(long, env = "RPC_URL")]
    rpc_url: String,

    /// Invoice router address
    #[arg(long, env = "ROUTER")]
    router: String,

    /// Vault address; vault events are skipped when unset
    #[arg(long, env = "VAULT")]
    vault: Option<String>,

    /// First block when no cursor is persisted
    #[arg(long, env = "START_BLOCK")]
    start_block: Option<u64>,

    /// Blocks behind the head to start from when neither a cursor nor a start block exists
    #[arg(long, env = "LOOKBACK_BLOCKS", default_value_t = 2_000)]
    lookback_blocks: u64,

    /// Maximum blocks per eth_getLogs call
    #[arg(long, env = "MAX_RANGE", default_value_t = 10)]
    max_range: u64,

    /// Blocks to stay behind the head
    #[arg(long, env = "CONFIRMATIONS", default_value_t = 0)]
    confirmations: u64,

    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 1_500)]
    poll_interval_ms: u64,

    /// Per-phase timeout; 0 disables it
    #[arg(long, env = "ITERATION_TIMEOUT_MS", default_value_t = 30_000)]
    iteration_timeout_ms: u64,
}

impl RunArgs {
    fn config(&self) -> IndexerConfig {
        let mut builder = IndexerBuilder::new()
            .id(self.store.id.clone())
            .router(self.router.clone())
            .lookback_blocks(self.lookback_blocks)
            .max_range(self.max_range)
            .confirmation_depth(self.confirmations)
            .poll_interval_ms(self.poll_interval_ms)
            .iteration_timeout_ms((self.iteration_timeout_ms > 0).then_some(self.iteration_timeout_ms));
        if let Some(vault) = &self.vault {
            builder = builder.vault(vault.clone());
        }
        if let Some(block) = self.start_block {
            builder = builder.start_block(block);
        }
        builder.build_config()
    }
}

// ─── Storage selection ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum BackendKind {
    Memory,
    Sqlite(String),
    Postgres(String),
}

impl BackendKind {
    fn parse(database_url: &str) -> Result<Self> {
        let url = database_url.trim();
        if url.is_empty() {
            bail!("DATABASE_URL is empty");
        }
        Ok(if url.eq_ignore_ascii_case("memory") {
            Self::Memory
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Self::Postgres(url.to_string())
        } else {
            Self::Sqlite(url.to_string())
        })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite(_) => "sqlite",
            Self::Postgres(_) => "postgres",
        }
    }
}

enum Backend {
    Memory(Arc<InMemoryStorage>),
    Sqlite(Arc<SqliteStorage>),
    Postgres(Arc<PostgresStorage>),
}

impl Backend {
    async fn open(kind: &BackendKind) -> Result<Self> {
        Ok(match kind {
            BackendKind::Memory => Self::Memory(Arc::new(InMemoryStorage::new())),
            BackendKind::Sqlite(path) => Self::Sqlite(Arc::new(
                SqliteStorage::open(path)
                    .await
                    .with_context(|| format!("opening sqlite database {path}"))?,
            )),
            BackendKind::Postgres(url) => Self::Postgres(Arc::new(
                PostgresStorage::connect(url)
                    .await
                    .context("connecting to postgres")?,
            )),
        })
    }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&LogConfig {
        level: cli.log_level.clone(),
        json: cli.log_json,
    });

    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Status(args) => cmd_status(args).await,
        Command::Info => {
            cmd_info();
            Ok(())
        }
    }
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = args.config();
    config.validate().context("invalid indexer configuration")?;

    let kind = BackendKind::parse(&args.store.database_url)?;
    let source = HttpLogSource::default_for(args.rpc_url.clone()).context("building RPC client")?;
    info!(rpc = %source.url(), storage = kind.name(), "invoiceindex starting");

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing current window");
        }
        let _ = tx.send(true);
    });

    match Backend::open(&kind).await? {
        Backend::Memory(store) => index(config, source, store, rx).await,
        Backend::Sqlite(store) => index(config, source, store, rx).await,
        Backend::Postgres(store) => index(config, source, store, rx).await,
    }
}

async fn index<S>(
    config: IndexerConfig,
    source: HttpLogSource,
    store: Arc<S>,
    shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    S: CursorStore + ProjectionStore + 'static,
{
    let mut indexer = IndexerBuilder::from_config(config).build(source, store)?;
    indexer.run(shutdown).await.context("index loop stopped")?;
    info!(cursor = ?indexer.cursor(), "invoiceindex stopped");
    Ok(())
}

async fn cmd_status(args: StoreArgs) -> Result<()> {
    let kind = BackendKind::parse(&args.database_url)?;
    let report = match Backend::open(&kind).await? {
        Backend::Memory(store) => status(store.as_ref(), &args.id).await?,
        Backend::Sqlite(store) => status(store.as_ref(), &args.id).await?,
        Backend::Postgres(store) => status(store.as_ref(), &args.id).await?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn status<S>(store: &S, id: &str) -> Result<serde_json::Value>
where
    S: CursorStore + ProjectionStore,
{
    let next_block = store.load_cursor(id).await?;
    let invoices = store.invoices().await?;
    let paid = invoices.iter().filter(|r| r.paid).count();
    let vault_events = store.vault_events().await?.len();
    Ok(json!({
        "indexer": id,
        "next_block": next_block,
        "invoices": invoices.len(),
        "invoices_paid": paid,
        "vault_events": vault_events,
    }))
}

fn cmd_info() {
    let defaults = IndexerConfig::default();
    println!("invoiceindex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default lookback: {} blocks", defaults.lookback_blocks);
    println!("  Default max range: {} blocks/call", defaults.max_range);
    println!("  Default confirmation depth: {} blocks", defaults.confirmation_depth);
    println!("  Default poll interval: {} ms", defaults.poll_interval_ms);
    if let Some(ms) = defaults.iteration_timeout_ms {
        println!("  Default iteration timeout: {ms} ms");
    }
    println!("  Storage backends: memory, SQLite, Postgres");
    println!("  Topics:");
    let mut signatures = vec![
        abi::INVOICE_CREATED_SIGNATURE.to_string(),
        abi::INVOICE_PAID_SIGNATURE.to_string(),
    ];
    signatures.extend(VaultEventKind::ALL.iter().map(|k| abi::vault_signature(*k)));
    for signature in signatures {
        println!("    {:<48} {}", signature, abi::keccak256_signature(&signature));
    }
}
