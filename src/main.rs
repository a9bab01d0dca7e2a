use clap::Parser;
use miette::{IntoDiagnostic, Result};
use serde_json::json;
use stagetrack::application::service::TrackingService;
use stagetrack::domain::ports::{
    NotifierBox, PaymentDirectoryBox, ShipmentStoreBox, StageStoreBox,
};
use stagetrack::infrastructure::in_memory::{
    InMemoryDirectory, InMemoryShipmentStore, InMemoryStageStore, LogNotifier,
};
use stagetrack::interfaces::json::{CommandReader, DirectoryConfig, execute};
use std::fs::File;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input command stream, one JSON object per line
    input: PathBuf,

    /// Payment directory config (crypto destinations and fiat platforms)
    #[arg(long)]
    directory: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn directory(cli: &Cli) -> Result<PaymentDirectoryBox> {
    let config = match &cli.directory {
        Some(path) => {
            let file = File::open(path).into_diagnostic()?;
            serde_json::from_reader::<_, DirectoryConfig>(file).into_diagnostic()?
        }
        None => DirectoryConfig::default(),
    };
    Ok(Box::new(InMemoryDirectory::new(config.crypto, config.fiat)))
}

fn stores(cli: &Cli) -> Result<(ShipmentStoreBox, StageStoreBox)> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = &cli.db_path {
        let store = stagetrack::infrastructure::rocksdb::RocksDbStore::open(db_path)
            .into_diagnostic()?;
        return Ok((Box::new(store.clone()), Box::new(store)));
    }
    let _ = cli;
    Ok((
        Box::new(InMemoryShipmentStore::new()),
        Box::new(InMemoryStageStore::new()),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let (shipments, stages) = stores(&cli)?;
    let notifier: NotifierBox = Box::new(LogNotifier);
    let service = TrackingService::new(shipments, stages, directory(&cli)?, notifier);

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for command in reader.commands() {
        let outcome = match command {
            Ok(command) => execute(&service, command).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(value) => println!("{value}"),
            Err(e) => {
                // Structured error per failed command; processing continues.
                eprintln!("{}", json!({ "kind": e.kind(), "message": e.to_string() }));
            }
        }
    }

    Ok(())
}
