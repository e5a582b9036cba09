use std::{
    collections::HashMap,
    io,
    path::PathBuf,
    sync::Mutex,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tidecast::{BroadcastConfig, BroadcastId, DeviceRecord, SensorCalibration, Store, StoreError};
use tracing::trace;

/// Everything the control core persists, in one JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StoreData {
    broadcasts: HashMap<BroadcastId, BroadcastConfig>,
    devices: Vec<DeviceRecord>,
    sensors: Vec<SensorEntry>,
    variables: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SensorEntry {
    mac: u64,
    #[serde(flatten)]
    calibration: SensorCalibration,
}

/// File-backed datastore. All reads are served from the in-memory cache;
/// every mutation rewrites the whole document. Transactionality comes
/// from the cache lock: mutations are applied under it, so concurrent
/// per-broadcast tasks never interleave read-modify-write cycles.
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let data = match std::fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)?,
            Ok(_) => StoreData::default(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => return Err(e.into()),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn add_device(&self, device: DeviceRecord) {
        let mut data = self.data.lock().expect("Shouldnt be poisoned");
        data.devices.retain(|d| d.mac != device.mac);
        data.devices.push(device);
    }

    pub fn add_sensor(&self, mac: u64, calibration: SensorCalibration) {
        self.data
            .lock()
            .expect("Shouldnt be poisoned")
            .sensors
            .push(SensorEntry { mac, calibration });
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let serialized = {
            let data = self.data.lock().expect("Shouldnt be poisoned");
            serde_json::to_vec_pretty(&*data).map_err(anyhow::Error::from)?
        };
        trace!(path = ?self.path, "storing json");
        tokio::fs::write(&self.path, serialized)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn broadcast(&self, id: BroadcastId) -> Result<Option<BroadcastConfig>, StoreError> {
        Ok(self
            .data
            .lock()
            .expect("Shouldnt be poisoned")
            .broadcasts
            .get(&id)
            .cloned())
    }

    async fn list_broadcasts(&self) -> Result<Vec<BroadcastConfig>, StoreError> {
        Ok(self
            .data
            .lock()
            .expect("Shouldnt be poisoned")
            .broadcasts
            .values()
            .cloned()
            .collect())
    }

    async fn save_broadcast(&self, config: &BroadcastConfig) -> Result<(), StoreError> {
        self.data
            .lock()
            .expect("Shouldnt be poisoned")
            .broadcasts
            .insert(config.id, config.clone());
        self.persist().await
    }

    async fn update_broadcast(
        &self,
        id: BroadcastId,
        mutate: Box<dyn for<'a> FnOnce(&'a mut BroadcastConfig) + Send + 'static>,
    ) -> Result<(), StoreError> {
        {
            let mut data = self.data.lock().expect("Shouldnt be poisoned");
            let config = data
                .broadcasts
                .get_mut(&id)
                .ok_or(StoreError::BroadcastNotFound(id))?;
            mutate(config);
        }
        self.persist().await
    }

    async fn device(&self, mac: u64) -> Result<Option<DeviceRecord>, StoreError> {
        Ok(self
            .data
            .lock()
            .expect("Shouldnt be poisoned")
            .devices
            .iter()
            .find(|d| d.mac == mac)
            .cloned())
    }

    async fn sensor(&self, mac: u64, pin: &str) -> Result<Option<SensorCalibration>, StoreError> {
        Ok(self
            .data
            .lock()
            .expect("Shouldnt be poisoned")
            .sensors
            .iter()
            .find(|s| s.mac == mac && s.calibration.pin == pin)
            .map(|s| s.calibration.clone()))
    }

    async fn variable(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .data
            .lock()
            .expect("Shouldnt be poisoned")
            .variables
            .get(name)
            .cloned())
    }

    async fn set_variable(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.data
            .lock()
            .expect("Shouldnt be poisoned")
            .variables
            .insert(name.to_string(), value.to_string());
        self.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidecast::BroadcastKind;

    #[tokio::test]
    async fn broadcasts_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let config = BroadcastConfig::mock(BroadcastKind::Direct);
        let id = config.id;

        let store = JsonFileStore::open(&path).unwrap();
        store.save_broadcast(&config).await.unwrap();
        store
            .update_broadcast(id, Box::new(|c| c.hardware_state = "hardwareOn".into()))
            .await
            .unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        let loaded = reopened.broadcast(id).await.unwrap().unwrap();
        assert_eq!("hardwareOn", loaded.hardware_state);
        assert_eq!(config.name, loaded.name);
    }

    #[tokio::test]
    async fn updating_an_unknown_broadcast_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("store.json")).unwrap();
        let missing = store
            .update_broadcast(BroadcastId::new_v4(), Box::new(|_| {}))
            .await;
        assert!(matches!(missing, Err(StoreError::BroadcastNotFound(_))));
    }

    #[tokio::test]
    async fn variables_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("store.json")).unwrap();
        store.set_variable("mock.broadcastLink", "http://y").await.unwrap();
        assert_eq!(
            Some("http://y".to_string()),
            store.variable("mock.broadcastLink").await.unwrap()
        );
    }
}
