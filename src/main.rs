use clap::Parser;
use miette::{IntoDiagnostic, Result};
use paygate::application::engine::TradeEngine;
use paygate::application::resolver::ConfigResolver;
use paygate::domain::merchant::MerchantConfig;
use paygate::domain::ports::OrderRepositoryBox;
use paygate::infrastructure::env::EnvCredentialSource;
use paygate::infrastructure::in_memory::{InMemoryConfigStore, InMemoryOrderStore};
use paygate::infrastructure::sandbox::SandboxChannel;
use paygate::interfaces::csv::ledger_writer::LedgerWriter;
use paygate::interfaces::csv::request_reader::RequestReader;
use paygate::interfaces::csv::response_writer::ResponseWriter;
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input gateway requests CSV file
    input: PathBuf,

    /// Merchant configuration JSON file (an array of merchant configs)
    #[arg(long)]
    merchants: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Write the resulting order ledger as CSV to this file
    #[arg(long)]
    ledger: Option<PathBuf>,
}

fn open_order_store(db_path: Option<PathBuf>) -> Result<OrderRepositoryBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = paygate::infrastructure::rocksdb::RocksDBOrderStore::open(path)
                .into_diagnostic()?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            tracing::warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Box::new(InMemoryOrderStore::new()))
        }
        None => Ok(Box::new(InMemoryOrderStore::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();

    let merchants: Vec<MerchantConfig> =
        serde_json::from_reader(File::open(&cli.merchants).into_diagnostic()?).into_diagnostic()?;
    let store_ids: Vec<String> = merchants.iter().map(|m| m.store_id.clone()).collect();
    info!(merchants = store_ids.len(), "merchant configuration loaded");

    let resolver = ConfigResolver::new(
        Box::new(InMemoryConfigStore::from_configs(merchants)),
        Box::new(EnvCredentialSource),
    );
    let engine = TradeEngine::new(
        open_order_store(cli.db_path)?,
        resolver,
        SandboxChannel::channel_set(),
    );

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = RequestReader::new(file);
    let stdout = io::stdout();
    let mut writer = ResponseWriter::new(stdout.lock());
    for (row, request) in reader.requests().enumerate() {
        match request {
            Ok(request) => {
                let op = request.op();
                let store_id = request.store_id().to_string();
                let response = engine.handle(request).await;
                writer.write(op, &store_id, &response).into_diagnostic()?;
            }
            Err(e) => {
                error!(row = row + 1, "Error reading request: {e}");
            }
        }
    }
    writer.flush().into_diagnostic()?;

    if let Some(path) = cli.ledger {
        let mut orders = Vec::new();
        for store_id in &store_ids {
            orders.extend(engine.ledger(store_id).await.into_diagnostic()?);
        }
        let mut ledger = LedgerWriter::new(File::create(path).into_diagnostic()?);
        ledger.write_orders(&orders).into_diagnostic()?;
    }

    Ok(())
}
