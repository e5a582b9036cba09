use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{BroadcastConfig, BroadcastId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("broadcast {0} not found")]
    BroadcastNotFound(BroadcastId),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A monitored device as recorded by the telemetry ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceRecord {
    pub mac: u64,
    pub monitor_period_seconds: i64,
    pub last_reported: DateTime<Utc>,
}

impl Default for DeviceRecord {
    fn default() -> Self {
        Self {
            mac: 0,
            monitor_period_seconds: 60,
            last_reported: DateTime::UNIX_EPOCH,
        }
    }
}

impl DeviceRecord {
    /// A device is up if it reported within twice its monitor period.
    pub fn is_up(&self, now: DateTime<Utc>) -> bool {
        now - self.last_reported <= Duration::seconds(2 * self.monitor_period_seconds)
    }
}

/// Calibration of one analog sensor pin, used to turn raw controller
/// readings into volts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SensorCalibration {
    pub pin: String,
    pub scale: f64,
    pub offset: f64,
}

impl Default for SensorCalibration {
    fn default() -> Self {
        Self {
            pin: "A0".into(),
            scale: 1.0,
            offset: 0.0,
        }
    }
}

impl SensorCalibration {
    pub fn apply(&self, raw: f64) -> f64 {
        raw * self.scale + self.offset
    }
}

/// The datastore, reduced to the entities the control core touches.
///
/// `update_broadcast` is the transactional read-modify-write used for
/// every state-name change; plain `save_broadcast` is reserved for the
/// tick driver's final write.
#[async_trait]
pub trait Store: Send + Sync {
    async fn broadcast(&self, id: BroadcastId) -> Result<Option<BroadcastConfig>, StoreError>;

    async fn list_broadcasts(&self) -> Result<Vec<BroadcastConfig>, StoreError>;

    async fn save_broadcast(&self, config: &BroadcastConfig) -> Result<(), StoreError>;

    async fn update_broadcast(
        &self,
        id: BroadcastId,
        mutate: Box<dyn for<'a> FnOnce(&'a mut BroadcastConfig) + Send + 'static>,
    ) -> Result<(), StoreError>;

    async fn device(&self, mac: u64) -> Result<Option<DeviceRecord>, StoreError>;

    async fn sensor(&self, mac: u64, pin: &str) -> Result<Option<SensorCalibration>, StoreError>;

    async fn variable(&self, name: &str) -> Result<Option<String>, StoreError>;

    async fn set_variable(&self, name: &str, value: &str) -> Result<(), StoreError>;
}
