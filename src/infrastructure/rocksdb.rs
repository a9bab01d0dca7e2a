use crate::domain::ports::{ShipmentStore, StageMutation, StageStore};
use crate::domain::shipment::Shipment;
use crate::domain::stage::Stage;
use crate::error::{Result, TrackError};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for shipment records.
pub const CF_SHIPMENTS: &str = "shipments";
/// Column Family for stage records.
pub const CF_STAGES: &str = "stages";
/// Column Family for id sequences.
pub const CF_META: &str = "meta";

const SHIPMENT_SEQ: &[u8] = b"shipment_seq";
const STAGE_SEQ: &[u8] = b"stage_seq";

/// A persistent store backed by RocksDB, JSON-encoded values keyed by
/// big-endian ids.
///
/// Writes that must be read-validate-write atomic (`update`, id assignment)
/// are serialized through a single mutex; RocksDB itself only guarantees
/// atomicity per put. `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path, ensuring
    /// the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_SHIPMENTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_STAGES, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, path, cfs)
            .map_err(|e| TrackError::InternalError(Box::new(e)))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            TrackError::InternalError(format!("column family {name} not found").into())
        })
    }

    fn put<T: Serialize>(&self, cf: &str, id: u64, value: &T) -> Result<()> {
        let handle = self.cf(cf)?;
        let bytes = serde_json::to_vec(value)?;
        self.db
            .put_cf(handle, id.to_be_bytes(), bytes)
            .map_err(|e| TrackError::InternalError(Box::new(e)))
    }

    fn fetch<T: DeserializeOwned>(&self, cf: &str, id: u64) -> Result<Option<T>> {
        let handle = self.cf(cf)?;
        let result = self
            .db
            .get_cf(handle, id.to_be_bytes())
            .map_err(|e| TrackError::InternalError(Box::new(e)))?;
        match result {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let handle = self.cf(cf)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(handle, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(|e| TrackError::InternalError(Box::new(e)))?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    /// Increments and persists the named sequence. Callers must hold the
    /// write lock.
    fn next_id(&self, seq_key: &[u8]) -> Result<u64> {
        let handle = self.cf(CF_META)?;
        let current = self
            .db
            .get_cf(handle, seq_key)
            .map_err(|e| TrackError::InternalError(Box::new(e)))?
            .map(|bytes| {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    TrackError::InternalError("corrupt id sequence".into())
                })?;
                Ok::<u64, TrackError>(u64::from_be_bytes(arr))
            })
            .transpose()?
            .unwrap_or(0);
        let next = current + 1;
        self.db
            .put_cf(handle, seq_key, next.to_be_bytes())
            .map_err(|e| TrackError::InternalError(Box::new(e)))?;
        Ok(next)
    }
}

#[async_trait]
impl ShipmentStore for RocksDbStore {
    async fn insert(&self, mut shipment: Shipment) -> Result<Shipment> {
        let _guard = self.write_lock.lock().await;
        let existing: Vec<Shipment> = self.scan(CF_SHIPMENTS)?;
        if existing
            .iter()
            .any(|s| s.tracking_code == shipment.tracking_code)
        {
            return Err(TrackError::ValidationError(format!(
                "tracking code {} is already in use",
                shipment.tracking_code
            )));
        }
        shipment.id = self.next_id(SHIPMENT_SEQ)?;
        self.put(CF_SHIPMENTS, shipment.id, &shipment)?;
        Ok(shipment)
    }

    async fn get(&self, id: u64) -> Result<Option<Shipment>> {
        self.fetch(CF_SHIPMENTS, id)
    }

    async fn find_by_tracking_code(&self, code: &str) -> Result<Option<Shipment>> {
        let shipments: Vec<Shipment> = self.scan(CF_SHIPMENTS)?;
        Ok(shipments.into_iter().find(|s| s.tracking_code == code))
    }
}

#[async_trait]
impl StageStore for RocksDbStore {
    async fn insert(&self, mut stage: Stage) -> Result<Stage> {
        let _guard = self.write_lock.lock().await;
        stage.id = self.next_id(STAGE_SEQ)?;
        self.put(CF_STAGES, stage.id, &stage)?;
        Ok(stage)
    }

    async fn get(&self, id: u64) -> Result<Option<Stage>> {
        self.fetch(CF_STAGES, id)
    }

    async fn for_shipment(&self, shipment_id: u64) -> Result<Vec<Stage>> {
        let stages: Vec<Stage> = self.scan(CF_STAGES)?;
        let mut list: Vec<Stage> = stages
            .into_iter()
            .filter(|s| s.shipment_id == shipment_id)
            .collect();
        list.sort_by_key(|s| (s.occurred_at, s.id));
        Ok(list)
    }

    async fn update(&self, id: u64, mutation: StageMutation) -> Result<Stage> {
        // The mutex makes read-validate-write a per-record critical section.
        let _guard = self.write_lock.lock().await;
        let mut stage: Stage = self
            .fetch(CF_STAGES, id)?
            .ok_or(TrackError::NotFound("stage"))?;
        mutation(&mut stage)?;
        self.put(CF_STAGES, id, &stage)?;
        Ok(stage)
    }

    async fn remove(&self, id: u64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.fetch::<Stage>(CF_STAGES, id)?.is_none() {
            return Err(TrackError::NotFound("stage"));
        }
        let handle = self.cf(CF_STAGES)?;
        self.db
            .delete_cf(handle, id.to_be_bytes())
            .map_err(|e| TrackError::InternalError(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stage::NewStage;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn shipment(code: &str) -> Shipment {
        Shipment {
            id: 0,
            admin_id: 1,
            admin_email: "admin@example.com".to_string(),
            tracking_code: code.to_string(),
            description: String::new(),
        }
    }

    fn stage() -> Stage {
        Stage::new(NewStage {
            shipment_id: 1,
            title: "Customs".to_string(),
            carrier_note: String::new(),
            occurred_at: Utc::now(),
            requires_fee: true,
            fee_amount: Some(dec!(50)),
            percentage_note: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_column_families() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).expect("failed to open RocksDB");
        assert!(store.db.cf_handle(CF_SHIPMENTS).is_some());
        assert!(store.db.cf_handle(CF_STAGES).is_some());
        assert!(store.db.cf_handle(CF_META).is_some());
    }

    #[tokio::test]
    async fn test_shipment_round_trip() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let stored = ShipmentStore::insert(&store, shipment("TRK-1")).await.unwrap();
        let fetched = ShipmentStore::get(&store, stored.id).await.unwrap().unwrap();
        assert_eq!(fetched, stored);

        let by_code = store.find_by_tracking_code("TRK-1").await.unwrap().unwrap();
        assert_eq!(by_code, stored);
    }

    #[tokio::test]
    async fn test_stage_update_persists_transition() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let stored = StageStore::insert(&store, stage()).await.unwrap();
        let updated = store
            .update(
                stored.id,
                Box::new(|s| {
                    s.submit_receipt(crate::domain::stage::Receipt {
                        content_type: "image/png".to_string(),
                        bytes: vec![1],
                        submitted_at: Utc::now(),
                    })
                }),
            )
            .await
            .unwrap();
        assert_eq!(updated.receipts().len(), 1);

        let fetched = StageStore::get(&store, stored.id).await.unwrap().unwrap();
        assert_eq!(fetched, updated);
    }

    #[tokio::test]
    async fn test_ids_survive_reopen() {
        let dir = tempdir().unwrap();
        let first_id = {
            let store = RocksDbStore::open(dir.path()).unwrap();
            StageStore::insert(&store, stage()).await.unwrap().id
        };
        let store = RocksDbStore::open(dir.path()).unwrap();
        let second = StageStore::insert(&store, stage()).await.unwrap();
        assert!(second.id > first_id);
        assert!(StageStore::get(&store, first_id).await.unwrap().is_some());
    }
}
