//! In-memory collaborator doubles for machine and orchestrator tests.
//!
//! Everything is deterministic: fixed instants come from
//! [`test_instant`], and every double records the calls it served so
//! tests can assert on side effects.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    bus::{Publisher, Subscriber},
    camera::HardwareManager,
    config::{BroadcastConfig, BroadcastId},
    context::BroadcastContext,
    event::Event,
    forward::ForwardingService,
    notify::{NotificationKind, Notifier},
    orchestrator::Orchestrator,
    platform::{BroadcastManager, BroadcastStatus, PlatformIds, StreamHealth},
    registry::{register_states, StateRegistry},
    store::{DeviceRecord, SensorCalibration, Store, StoreError},
    webhook::WebhookClient,
};

/// Fixed wall clock used as "now" in tests.
pub fn test_instant() -> DateTime<Utc> {
    "2026-03-01T12:00:00Z".parse().expect("valid instant")
}

#[derive(Clone, Default)]
pub struct RecordedEvents(Arc<Mutex<Vec<&'static str>>>);

impl RecordedEvents {
    pub fn push(&self, name: &'static str) {
        self.0.lock().expect("Shouldnt be poisoned").push(name);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.lock().expect("Shouldnt be poisoned").clone()
    }
}

/// Subscriber that only records delivery order.
pub struct EventRecorder(pub RecordedEvents);

#[async_trait]
impl Subscriber for EventRecorder {
    async fn handle(&mut self, event: &Event, _ctx: &BroadcastContext) -> anyhow::Result<()> {
        self.0.push(event.name());
        Ok(())
    }
}

#[derive(Default)]
pub struct TestHardware {
    voltage: Mutex<f64>,
    alarm_voltage: Mutex<f64>,
    up: Mutex<HashMap<u64, bool>>,
    calls: Mutex<Vec<String>>,
}

impl TestHardware {
    fn record(&self, call: &str) {
        self.calls
            .lock()
            .expect("Shouldnt be poisoned")
            .push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("Shouldnt be poisoned").clone()
    }

    pub fn set_voltage(&self, volts: f64) {
        *self.voltage.lock().expect("Shouldnt be poisoned") = volts;
    }

    pub fn set_alarm_voltage(&self, volts: f64) {
        *self.alarm_voltage.lock().expect("Shouldnt be poisoned") = volts;
    }

    pub fn set_up(&self, mac: u64, up: bool) {
        self.up.lock().expect("Shouldnt be poisoned").insert(mac, up);
    }
}

#[async_trait]
impl HardwareManager for TestHardware {
    async fn voltage(&self, _controller_mac: u64) -> anyhow::Result<f64> {
        Ok(*self.voltage.lock().expect("Shouldnt be poisoned"))
    }

    async fn alarm_voltage(&self, _controller_mac: u64) -> anyhow::Result<f64> {
        Ok(*self.alarm_voltage.lock().expect("Shouldnt be poisoned"))
    }

    async fn is_up(&self, mac: u64) -> anyhow::Result<bool> {
        Ok(*self
            .up
            .lock()
            .expect("Shouldnt be poisoned")
            .get(&mac)
            .unwrap_or(&false))
    }

    async fn start(&self, _config: &BroadcastConfig) -> anyhow::Result<()> {
        self.record("start");
        Ok(())
    }

    async fn shutdown(&self, _config: &BroadcastConfig) -> anyhow::Result<()> {
        self.record("shutdown");
        Ok(())
    }

    async fn stop(&self, _config: &BroadcastConfig) -> anyhow::Result<()> {
        self.record("stop");
        Ok(())
    }
}

pub struct TestManager {
    status: Mutex<BroadcastStatus>,
    health: Mutex<StreamHealth>,
    calls: Mutex<Vec<String>>,
}

impl Default for TestManager {
    fn default() -> Self {
        Self {
            status: Mutex::new(BroadcastStatus::Live),
            health: Mutex::new(StreamHealth::Good),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl TestManager {
    fn record(&self, call: String) {
        self.calls.lock().expect("Shouldnt be poisoned").push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("Shouldnt be poisoned").clone()
    }

    pub fn set_status(&self, status: BroadcastStatus) {
        *self.status.lock().expect("Shouldnt be poisoned") = status;
    }

    pub fn set_health(&self, health: StreamHealth) {
        *self.health.lock().expect("Shouldnt be poisoned") = health;
    }
}

#[async_trait]
impl BroadcastManager for TestManager {
    async fn create_broadcast(&self, _config: &BroadcastConfig) -> anyhow::Result<PlatformIds> {
        self.record("createBroadcast".into());
        Ok(PlatformIds {
            broadcast_id: "B1".into(),
            stream_id: "S1".into(),
            chat_id: "C1".into(),
        })
    }

    async fn transition_status(
        &self,
        broadcast_id: &str,
        status: BroadcastStatus,
    ) -> anyhow::Result<()> {
        self.record(format!("transitionStatus:{broadcast_id}:{}", status.as_str()));
        Ok(())
    }

    async fn broadcast_status(&self, _broadcast_id: &str) -> anyhow::Result<BroadcastStatus> {
        Ok(*self.status.lock().expect("Shouldnt be poisoned"))
    }

    async fn complete_broadcast(&self, _config: &BroadcastConfig) -> anyhow::Result<()> {
        self.record("completeBroadcast".into());
        Ok(())
    }

    async fn post_chat_message(&self, chat_id: &str, message: &str) -> anyhow::Result<()> {
        self.record(format!("postChat:{chat_id}:{message}"));
        Ok(())
    }

    async fn save_link(&self, variable: &str, broadcast_id: &str) -> anyhow::Result<()> {
        self.record(format!("saveLink:{variable}:{broadcast_id}"));
        Ok(())
    }

    async fn rtmp_key(&self, _stream_title: &str) -> anyhow::Result<String> {
        self.record("rtmpKey".into());
        Ok("test-rtmp-key".into())
    }

    async fn stream_health(&self, _stream_id: &str) -> anyhow::Result<StreamHealth> {
        Ok(*self.health.lock().expect("Shouldnt be poisoned"))
    }
}

#[derive(Default)]
pub struct TestForwarder {
    calls: Mutex<Vec<String>>,
}

impl TestForwarder {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("Shouldnt be poisoned").clone()
    }
}

#[async_trait]
impl ForwardingService for TestForwarder {
    async fn stream(&self, _config: &BroadcastConfig) -> anyhow::Result<()> {
        self.calls
            .lock()
            .expect("Shouldnt be poisoned")
            .push("stream".into());
        Ok(())
    }

    async fn slate(&self, _config: &BroadcastConfig) -> anyhow::Result<()> {
        self.calls
            .lock()
            .expect("Shouldnt be poisoned")
            .push("slate".into());
        Ok(())
    }
}

#[derive(Default)]
pub struct TestNotifier {
    messages: Mutex<Vec<(NotificationKind, String)>>,
}

impl TestNotifier {
    pub fn messages(&self) -> Vec<(NotificationKind, String)> {
        self.messages.lock().expect("Shouldnt be poisoned").clone()
    }
}

#[async_trait]
impl Notifier for TestNotifier {
    async fn notify(
        &self,
        _site_key: i64,
        kind: NotificationKind,
        message: &str,
    ) -> anyhow::Result<()> {
        self.messages
            .lock()
            .expect("Shouldnt be poisoned")
            .push((kind, message.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct TestWebhooks {
    calls: Mutex<Vec<String>>,
}

impl TestWebhooks {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("Shouldnt be poisoned").clone()
    }
}

#[async_trait]
impl WebhookClient for TestWebhooks {
    async fn notify_live(&self, _config: &BroadcastConfig) -> anyhow::Result<()> {
        self.calls
            .lock()
            .expect("Shouldnt be poisoned")
            .push("notifyLive".into());
        Ok(())
    }

    async fn register_capture(&self, _config: &BroadcastConfig) -> anyhow::Result<()> {
        self.calls
            .lock()
            .expect("Shouldnt be poisoned")
            .push("registerCapture".into());
        Ok(())
    }
}

#[derive(Default)]
pub struct TestStore {
    broadcasts: Mutex<HashMap<BroadcastId, BroadcastConfig>>,
    devices: Mutex<HashMap<u64, DeviceRecord>>,
    sensors: Mutex<HashMap<(u64, String), SensorCalibration>>,
    variables: Mutex<HashMap<String, String>>,
}

impl TestStore {
    pub fn insert(&self, config: BroadcastConfig) {
        self.broadcasts
            .lock()
            .expect("Shouldnt be poisoned")
            .insert(config.id, config);
    }

    pub fn insert_device(&self, device: DeviceRecord) {
        self.devices
            .lock()
            .expect("Shouldnt be poisoned")
            .insert(device.mac, device);
    }

    pub fn insert_sensor(&self, mac: u64, sensor: SensorCalibration) {
        self.sensors
            .lock()
            .expect("Shouldnt be poisoned")
            .insert((mac, sensor.pin.clone()), sensor);
    }
}

#[async_trait]
impl Store for TestStore {
    async fn broadcast(&self, id: BroadcastId) -> Result<Option<BroadcastConfig>, StoreError> {
        Ok(self
            .broadcasts
            .lock()
            .expect("Shouldnt be poisoned")
            .get(&id)
            .cloned())
    }

    async fn list_broadcasts(&self) -> Result<Vec<BroadcastConfig>, StoreError> {
        Ok(self
            .broadcasts
            .lock()
            .expect("Shouldnt be poisoned")
            .values()
            .cloned()
            .collect())
    }

    async fn save_broadcast(&self, config: &BroadcastConfig) -> Result<(), StoreError> {
        self.insert(config.clone());
        Ok(())
    }

    async fn update_broadcast(
        &self,
        id: BroadcastId,
        mutate: Box<dyn for<'a> FnOnce(&'a mut BroadcastConfig) + Send + 'static>,
    ) -> Result<(), StoreError> {
        let mut broadcasts = self.broadcasts.lock().expect("Shouldnt be poisoned");
        let config = broadcasts
            .get_mut(&id)
            .ok_or(StoreError::BroadcastNotFound(id))?;
        mutate(config);
        Ok(())
    }

    async fn device(&self, mac: u64) -> Result<Option<DeviceRecord>, StoreError> {
        Ok(self
            .devices
            .lock()
            .expect("Shouldnt be poisoned")
            .get(&mac)
            .cloned())
    }

    async fn sensor(&self, mac: u64, pin: &str) -> Result<Option<SensorCalibration>, StoreError> {
        Ok(self
            .sensors
            .lock()
            .expect("Shouldnt be poisoned")
            .get(&(mac, pin.to_string()))
            .cloned())
    }

    async fn variable(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .variables
            .lock()
            .expect("Shouldnt be poisoned")
            .get(name)
            .cloned())
    }

    async fn set_variable(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.variables
            .lock()
            .expect("Shouldnt be poisoned")
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}

/// Bundle of all doubles, with sensible defaults: the battery is healthy,
/// no device is reporting, the platform answers every call.
pub struct TestCollaborators {
    pub hardware: Arc<TestHardware>,
    pub manager: Arc<TestManager>,
    pub forwarder: Arc<TestForwarder>,
    pub notifier: Arc<TestNotifier>,
    pub store: Arc<TestStore>,
    pub webhooks: Arc<TestWebhooks>,
}

impl Default for TestCollaborators {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCollaborators {
    pub fn new() -> Self {
        let hardware = Arc::new(TestHardware::default());
        hardware.set_voltage(26.0);
        hardware.set_alarm_voltage(18.0);
        Self {
            hardware,
            manager: Arc::new(TestManager::default()),
            forwarder: Arc::new(TestForwarder::default()),
            notifier: Arc::new(TestNotifier::default()),
            store: Arc::new(TestStore::default()),
            webhooks: Arc::new(TestWebhooks::default()),
        }
    }

    /// Context over `config` at the fixed test instant. The record is
    /// seeded into the store so transition persistence succeeds.
    pub fn context(&self, config: BroadcastConfig, publisher: Publisher) -> BroadcastContext {
        self.store.insert(config.clone());
        BroadcastContext::new(
            config,
            publisher,
            test_instant(),
            self.hardware.clone(),
            self.manager.clone(),
            self.forwarder.clone(),
            self.notifier.clone(),
            self.store.clone(),
            self.webhooks.clone(),
        )
    }
}

/// A broadcast, its doubles and an orchestrator, wired like the runtime
/// wires production. `tick` returns the delivery order the recorder saw.
pub struct TestRig {
    pub collaborators: TestCollaborators,
    pub id: BroadcastId,
    orchestrator: Orchestrator,
}

impl TestRig {
    pub fn new(config: BroadcastConfig) -> Self {
        let collaborators = TestCollaborators::new();
        let id = config.id;
        collaborators.store.insert(config);
        let mut registry = StateRegistry::new();
        register_states(&mut registry);
        let orchestrator = Orchestrator::new(
            Arc::new(registry),
            collaborators.store.clone(),
            collaborators.hardware.clone(),
            collaborators.manager.clone(),
            collaborators.forwarder.clone(),
            collaborators.notifier.clone(),
            collaborators.webhooks.clone(),
        );
        Self {
            collaborators,
            id,
            orchestrator,
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<&'static str> {
        let recorded = RecordedEvents::default();
        self.orchestrator
            .tick_with(self.id, now, vec![Box::new(EventRecorder(recorded.clone()))])
            .await
            .expect("tick succeeds");
        recorded.names()
    }

    /// The record as persisted after the last tick.
    pub async fn config(&self) -> BroadcastConfig {
        self.collaborators
            .store
            .broadcast(self.id)
            .await
            .expect("store reachable")
            .expect("broadcast exists")
    }
}
