use clap::Parser;
use dealflow::config::AppConfig;
use dealflow::domain::payload::TransportPayload;
use dealflow::domain::ports::{ClockRef, KeyValueStoreRef};
use dealflow::infrastructure::clock::SystemClock;
use dealflow::infrastructure::console::ConsoleTransport;
use dealflow::infrastructure::in_memory::InMemoryStore;
use dealflow::interfaces::csv::deal_writer::DealWriter;
use dealflow::interfaces::jsonl::update_reader::UpdateReader;
use dealflow::logging;
use dealflow::system::System;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input file of raw updates, one JSON object per line
    input: PathBuf,

    /// YAML configuration file (optional). Defaults apply otherwise.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Keep the expiry sweep running this long after the input is replayed
    #[arg(long, default_value_t = 0)]
    drain_ms: u64,
}

fn open_store(config: &AppConfig) -> Result<KeyValueStoreRef> {
    match &config.store.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = dealflow::infrastructure::rocksdb::RocksDBStore::open(path).into_diagnostic()?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(path) => miette::bail!(
            "{} requires a build with the storage-rocksdb feature",
            path.display()
        ),
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path).into_diagnostic()?,
        None => AppConfig::default(),
    };
    if let Some(db_path) = cli.db_path {
        config.store.db_path = Some(db_path);
    }
    let log_guard = logging::init(&config.log);

    let store = open_store(&config)?;
    let transport = ConsoleTransport::new();
    let clock: ClockRef = Arc::new(SystemClock);
    let system = System::build(&config, store, Arc::new(transport.clone()), clock)
        .await
        .into_diagnostic()?;

    // Inbound messages exist in the chat before the bot touches them.
    let file = File::open(&cli.input).into_diagnostic()?;
    let mut payloads: Vec<TransportPayload> = Vec::new();
    for payload in UpdateReader::new(file).payloads() {
        match payload {
            Ok(payload) => {
                if let Some(message) = payload.message() {
                    transport
                        .observe(message.chat_id, message.message_id, message.text())
                        .await;
                }
                payloads.push(payload);
            }
            Err(err) => error!(error = %err, "Error reading update"),
        }
    }

    system
        .sweeper
        .start(Duration::from_millis(config.timing.tick_interval_ms));
    let summary = system.router.run(payloads).await;
    info!(
        handled = summary.handled,
        dropped = summary.dropped,
        failed = summary.failed,
        "Input replayed"
    );

    if cli.drain_ms > 0 {
        tokio::time::sleep(Duration::from_millis(cli.drain_ms)).await;
    }
    system.sweeper.stop();

    let deals = system.deals.all().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = DealWriter::new(stdout.lock());
    writer.write_deals(&deals).into_diagnostic()?;

    log_guard.flush();
    Ok(())
}
