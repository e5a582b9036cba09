use async_trait::async_trait;

use crate::{bus::Publisher, config::BroadcastConfig, event::Event};

/// The physical camera/controller stack as the hardware machine sees it.
///
/// Voltage and liveness come from the telemetry the devices push to the
/// store; start/shutdown/stop actuate power. None of these calls is
/// idempotent with respect to the real world, but all are retriable.
#[async_trait]
pub trait HardwareManager: Send + Sync {
    /// Latest battery reading of the controller.
    async fn voltage(&self, controller_mac: u64) -> anyhow::Result<f64>;

    /// Alarm threshold configured on the controller (pin `A0`, scaled by
    /// the sensor's calibration).
    async fn alarm_voltage(&self, controller_mac: u64) -> anyhow::Result<f64>;

    /// Whether the device last reported within twice its monitor period.
    async fn is_up(&self, mac: u64) -> anyhow::Result<bool>;

    /// Power the camera on.
    async fn start(&self, config: &BroadcastConfig) -> anyhow::Result<()>;

    /// Ask the camera to stop gracefully.
    async fn shutdown(&self, config: &BroadcastConfig) -> anyhow::Result<()>;

    /// Cut power.
    async fn stop(&self, config: &BroadcastConfig) -> anyhow::Result<()>;

    /// Publishes `event` iff the device's liveness matches `expected`.
    async fn publish_event_if_status(
        &self,
        publisher: &Publisher,
        event: Event,
        expected: bool,
        mac: u64,
    ) -> anyhow::Result<()> {
        if self.is_up(mac).await? == expected {
            publisher.publish(event);
        }
        Ok(())
    }
}
