use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use tidecast::{BroadcastConfig, HardwareManager, Store};
use tracing::info;

/// Pin carrying the battery voltage on the power controller.
const VOLTAGE_PIN: &str = "A0";

/// Hardware manager speaking through the datastore: telemetry is whatever
/// the devices last pushed, and actuation means setting the named
/// variables the devices poll.
pub struct StoreHardwareManager {
    store: Arc<dyn Store>,
}

impl StoreHardwareManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn scaled_reading(&self, controller_mac: u64, variable: &str) -> anyhow::Result<f64> {
        let raw = self
            .store
            .variable(variable)
            .await?
            .ok_or_else(|| anyhow!("no reading stored under '{variable}'"))?
            .parse::<f64>()
            .with_context(|| format!("reading under '{variable}' is not a number"))?;
        let calibration = self
            .store
            .sensor(controller_mac, VOLTAGE_PIN)
            .await?
            .ok_or_else(|| anyhow!("no calibration for controller {controller_mac} pin {VOLTAGE_PIN}"))?;
        Ok(calibration.apply(raw))
    }

    async fn set(&self, mac: u64, suffix: &str, value: &str) -> anyhow::Result<()> {
        info!(mac, suffix, value, "setting device variable");
        self.store
            .set_variable(&format!("{mac}.{suffix}"), value)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl HardwareManager for StoreHardwareManager {
    async fn voltage(&self, controller_mac: u64) -> anyhow::Result<f64> {
        self.scaled_reading(controller_mac, &format!("{controller_mac}.{VOLTAGE_PIN}"))
            .await
    }

    async fn alarm_voltage(&self, controller_mac: u64) -> anyhow::Result<f64> {
        self.scaled_reading(controller_mac, &format!("{controller_mac}.alarmVoltage"))
            .await
    }

    async fn is_up(&self, mac: u64) -> anyhow::Result<bool> {
        let device = self
            .store
            .device(mac)
            .await?
            .ok_or_else(|| anyhow!("unknown device {mac}"))?;
        Ok(device.is_up(Utc::now()))
    }

    async fn start(&self, config: &BroadcastConfig) -> anyhow::Result<()> {
        self.set(config.camera_mac, "power", "on").await
    }

    async fn shutdown(&self, config: &BroadcastConfig) -> anyhow::Result<()> {
        self.set(config.camera_mac, "shutdown", "true").await
    }

    async fn stop(&self, config: &BroadcastConfig) -> anyhow::Result<()> {
        self.set(config.camera_mac, "power", "off").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tidecast::{
        testing::TestStore, BroadcastKind, DeviceRecord, SensorCalibration,
    };

    fn store_with_controller() -> Arc<TestStore> {
        let store = Arc::new(TestStore::default());
        store.insert_sensor(
            7,
            SensorCalibration {
                pin: VOLTAGE_PIN.into(),
                scale: 0.1,
                offset: 0.0,
            },
        );
        store
    }

    #[tokio::test]
    async fn voltage_is_scaled_by_the_calibration() {
        let store = store_with_controller();
        store.set_variable("7.A0", "250").await.unwrap();
        let manager = StoreHardwareManager::new(store);
        assert_eq!(25.0, manager.voltage(7).await.unwrap());
    }

    #[tokio::test]
    async fn missing_reading_is_an_error() {
        let manager = StoreHardwareManager::new(store_with_controller());
        assert!(manager.voltage(7).await.is_err());
    }

    #[tokio::test]
    async fn liveness_uses_the_device_monitor_period() {
        let store = Arc::new(TestStore::default());
        store.insert_device(DeviceRecord {
            mac: 9,
            monitor_period_seconds: 60,
            last_reported: Utc::now() - Duration::seconds(30),
        });
        let manager = StoreHardwareManager::new(store.clone());
        assert!(manager.is_up(9).await.unwrap());

        store.insert_device(DeviceRecord {
            mac: 9,
            monitor_period_seconds: 60,
            last_reported: Utc::now() - Duration::seconds(300),
        });
        assert!(!manager.is_up(9).await.unwrap());
    }

    #[tokio::test]
    async fn power_control_goes_through_variables() {
        let store = Arc::new(TestStore::default());
        let manager = StoreHardwareManager::new(store.clone());
        let config = BroadcastConfig::mock(BroadcastKind::Direct);
        let mac = config.camera_mac;

        manager.start(&config).await.unwrap();
        assert_eq!(
            Some("on".to_string()),
            store.variable(&format!("{mac}.power")).await.unwrap()
        );

        manager.shutdown(&config).await.unwrap();
        assert_eq!(
            Some("true".to_string()),
            store.variable(&format!("{mac}.shutdown")).await.unwrap()
        );

        manager.stop(&config).await.unwrap();
        assert_eq!(
            Some("off".to_string()),
            store.variable(&format!("{mac}.power")).await.unwrap()
        );
    }
}
