use crate::domain::payment::{CryptoDestination, FiatPlatform};
use crate::domain::ports::{
    Notification, Notifier, PaymentDirectory, ShipmentStore, StageMutation, StageStore,
};
use crate::domain::shipment::Shipment;
use crate::domain::stage::Stage;
use crate::error::{Result, TrackError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::info;

/// A thread-safe in-memory shipment store.
///
/// Uses `Arc<RwLock<HashMap>>` for shared concurrent access. Ideal for
/// testing or running the CLI without a database.
#[derive(Default, Clone)]
pub struct InMemoryShipmentStore {
    shipments: Arc<RwLock<HashMap<u64, Shipment>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryShipmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShipmentStore for InMemoryShipmentStore {
    async fn insert(&self, mut shipment: Shipment) -> Result<Shipment> {
        let mut shipments = self.shipments.write().await;
        if shipments
            .values()
            .any(|s| s.tracking_code == shipment.tracking_code)
        {
            return Err(TrackError::ValidationError(format!(
                "tracking code {} is already in use",
                shipment.tracking_code
            )));
        }
        shipment.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        shipments.insert(shipment.id, shipment.clone());
        Ok(shipment)
    }

    async fn get(&self, id: u64) -> Result<Option<Shipment>> {
        let shipments = self.shipments.read().await;
        Ok(shipments.get(&id).cloned())
    }

    async fn find_by_tracking_code(&self, code: &str) -> Result<Option<Shipment>> {
        let shipments = self.shipments.read().await;
        Ok(shipments.values().find(|s| s.tracking_code == code).cloned())
    }
}

/// A thread-safe in-memory stage store.
///
/// `update` holds the write lock across the whole mutation, which gives the
/// per-record critical section the transition operations rely on.
#[derive(Default, Clone)]
pub struct InMemoryStageStore {
    stages: Arc<RwLock<HashMap<u64, Stage>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryStageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StageStore for InMemoryStageStore {
    async fn insert(&self, mut stage: Stage) -> Result<Stage> {
        let mut stages = self.stages.write().await;
        stage.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        stages.insert(stage.id, stage.clone());
        Ok(stage)
    }

    async fn get(&self, id: u64) -> Result<Option<Stage>> {
        let stages = self.stages.read().await;
        Ok(stages.get(&id).cloned())
    }

    async fn for_shipment(&self, shipment_id: u64) -> Result<Vec<Stage>> {
        let stages = self.stages.read().await;
        let mut list: Vec<Stage> = stages
            .values()
            .filter(|s| s.shipment_id == shipment_id)
            .cloned()
            .collect();
        list.sort_by_key(|s| (s.occurred_at, s.id));
        Ok(list)
    }

    async fn update(&self, id: u64, mutation: StageMutation) -> Result<Stage> {
        let mut stages = self.stages.write().await;
        let stored = stages.get(&id).ok_or(TrackError::NotFound("stage"))?;

        // Mutate a copy; the stored record changes only when the closure
        // succeeds, so a failed validation writes nothing.
        let mut candidate = stored.clone();
        mutation(&mut candidate)?;
        stages.insert(id, candidate.clone());
        Ok(candidate)
    }

    async fn remove(&self, id: u64) -> Result<()> {
        let mut stages = self.stages.write().await;
        stages
            .remove(&id)
            .map(|_| ())
            .ok_or(TrackError::NotFound("stage"))
    }
}

/// Payment reference data held in memory; configured once at startup.
#[derive(Default, Clone)]
pub struct InMemoryDirectory {
    crypto: Vec<CryptoDestination>,
    fiat: Vec<FiatPlatform>,
}

impl InMemoryDirectory {
    pub fn new(crypto: Vec<CryptoDestination>, fiat: Vec<FiatPlatform>) -> Self {
        Self { crypto, fiat }
    }
}

#[async_trait]
impl PaymentDirectory for InMemoryDirectory {
    async fn crypto_destinations(&self) -> Result<Vec<CryptoDestination>> {
        Ok(self.crypto.clone())
    }

    async fn fiat_platforms(&self) -> Result<Vec<FiatPlatform>> {
        Ok(self.fiat.clone())
    }
}

/// Notifier that only logs. Stands in for real email delivery, which lives
/// outside this crate.
#[derive(Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, admin_email: &str, event: Notification) -> Result<()> {
        info!(admin_email, ?event, "notification sent");
        Ok(())
    }
}
