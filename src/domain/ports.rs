use super::payment::{CryptoDestination, FiatPlatform};
use super::shipment::Shipment;
use super::stage::Stage;
use crate::error::Result;
use async_trait::async_trait;

/// A mutation applied inside the store's per-record critical section. The
/// store commits the record only when the closure returns `Ok`.
pub type StageMutation = Box<dyn FnOnce(&mut Stage) -> Result<()> + Send>;

#[async_trait]
pub trait ShipmentStore: Send + Sync {
    async fn insert(&self, shipment: Shipment) -> Result<Shipment>;
    async fn get(&self, id: u64) -> Result<Option<Shipment>>;
    async fn find_by_tracking_code(&self, code: &str) -> Result<Option<Shipment>>;
}

#[async_trait]
pub trait StageStore: Send + Sync {
    /// Persists a new stage, assigning its id. Ids are monotonically
    /// increasing so they double as the insertion-order tie-break.
    async fn insert(&self, stage: Stage) -> Result<Stage>;
    async fn get(&self, id: u64) -> Result<Option<Stage>>;
    /// All stages of one shipment, ascending by `occurred_at`, ties by id.
    async fn for_shipment(&self, shipment_id: u64) -> Result<Vec<Stage>>;
    /// Runs `mutation` against the stage as a single-writer critical
    /// section: no other writer can interleave between the read, the
    /// validation inside the closure, and the write-back. On `Err` the
    /// stored record is untouched.
    async fn update(&self, id: u64, mutation: StageMutation) -> Result<Stage>;
    /// Removes the stage and, with it, its receipts.
    async fn remove(&self, id: u64) -> Result<()>;
}

/// Admin-configured payment reference data (pure reads).
#[async_trait]
pub trait PaymentDirectory: Send + Sync {
    async fn crypto_destinations(&self) -> Result<Vec<CryptoDestination>>;
    async fn fiat_platforms(&self) -> Result<Vec<FiatPlatform>>;
}

/// Events worth telling the owning admin about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    ReceiptSubmitted { stage_id: u64, stage_title: String },
}

/// Fire-and-forget outbound notification. Callers log failures and move on;
/// a delivery error never fails the surrounding operation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, admin_email: &str, event: Notification) -> Result<()>;
}

pub type ShipmentStoreBox = Box<dyn ShipmentStore>;
pub type StageStoreBox = Box<dyn StageStore>;
pub type PaymentDirectoryBox = Box<dyn PaymentDirectory>;
pub type NotifierBox = Box<dyn Notifier>;
