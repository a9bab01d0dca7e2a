use serde_json::Value;
use stagetrack::application::service::TrackingService;
use stagetrack::domain::payment::{CryptoDestination, FiatPlatform};
use stagetrack::infrastructure::in_memory::{
    InMemoryDirectory, InMemoryShipmentStore, InMemoryStageStore, LogNotifier,
};
use std::io::Write;
use std::path::Path;

/// A service over fresh in-memory stores with one crypto destination and
/// one fiat platform registered.
pub fn service() -> TrackingService {
    let directory = InMemoryDirectory::new(
        vec![CryptoDestination {
            currency: "BTC".to_string(),
            address: "bc1qtestaddress".to_string(),
            label: Some("main wallet".to_string()),
        }],
        vec![FiatPlatform {
            name: "cashapp".to_string(),
            base_url: "https://cash.example/pay".to_string(),
            message_template: "Paying {amount} for status {statusId}".to_string(),
        }],
    );
    TrackingService::new(
        Box::new(InMemoryShipmentStore::new()),
        Box::new(InMemoryStageStore::new()),
        Box::new(directory),
        Box::new(LogNotifier),
    )
}

/// Writes one JSON object per line.
pub fn write_jsonl(path: &Path, commands: &[Value]) {
    let mut file = std::fs::File::create(path).unwrap();
    for command in commands {
        writeln!(file, "{command}").unwrap();
    }
}
