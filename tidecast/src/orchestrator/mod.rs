use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    broadcast::BroadcastMachine,
    bus::EventBus,
    camera::HardwareManager,
    config::BroadcastId,
    context::BroadcastContext,
    event::Event,
    forward::ForwardingService,
    hardware::HardwareMachine,
    hooks::EventHooks,
    notify::Notifier,
    platform::BroadcastManager,
    registry::StateRegistry,
    store::{Store, StoreError},
    webhook::WebhookClient,
};


/// The tick driver. Owns the collaborator handles and injects time into
/// one broadcast at a time; everything else is reactive.
///
/// Ticks are sequential per broadcast and share nothing in memory: the
/// machines are rebuilt from the persisted pair at every tick and a fresh
/// bus is drained to fixed point before the record is written back.
pub struct Orchestrator {
    registry: Arc<StateRegistry>,
    store: Arc<dyn Store>,
    hardware: Arc<dyn HardwareManager>,
    manager: Arc<dyn BroadcastManager>,
    forwarder: Arc<dyn ForwardingService>,
    notifier: Arc<dyn Notifier>,
    webhooks: Arc<dyn WebhookClient>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<StateRegistry>,
        store: Arc<dyn Store>,
        hardware: Arc<dyn HardwareManager>,
        manager: Arc<dyn BroadcastManager>,
        forwarder: Arc<dyn ForwardingService>,
        notifier: Arc<dyn Notifier>,
        webhooks: Arc<dyn WebhookClient>,
    ) -> Self {
        Self {
            registry,
            store,
            hardware,
            manager,
            forwarder,
            notifier,
            webhooks,
        }
    }

    pub async fn tick(&self, id: BroadcastId, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.tick_inner(id, now, Vec::new()).await
    }

    /// Like [`Orchestrator::tick`], with extra subscribers appended behind
    /// the hooks. Used by tests to observe delivery order.
    #[cfg(any(test, feature = "unstable"))]
    pub async fn tick_with(
        &self,
        id: BroadcastId,
        now: DateTime<Utc>,
        extra: Vec<Box<dyn crate::bus::Subscriber>>,
    ) -> anyhow::Result<()> {
        self.tick_inner(id, now, extra).await
    }

    async fn tick_inner(
        &self,
        id: BroadcastId,
        now: DateTime<Utc>,
        extra: Vec<Box<dyn crate::bus::Subscriber>>,
    ) -> anyhow::Result<()> {
        let mut config = self
            .store
            .broadcast(id)
            .await?
            .ok_or(StoreError::BroadcastNotFound(id))?;
        if !config.enabled {
            debug!(broadcast = config.name.as_str(), "disabled, skipping tick");
            return Ok(());
        }
        if config.sanitize() {
            debug!(broadcast = config.name.as_str(), "sanitized configuration");
            self.store.save_broadcast(&config).await?;
        }

        let hardware_machine = HardwareMachine::restore(&self.registry, &config);
        let broadcast_machine = BroadcastMachine::restore(&self.registry, &config);
        debug!(
            broadcast = config.name.as_str(),
            hardware_state = hardware_machine.state_name(),
            broadcast_state = broadcast_machine.state_name(),
            "tick"
        );

        let mut bus = EventBus::new();
        let ctx = BroadcastContext::new(
            config,
            bus.publisher(),
            now,
            self.hardware.clone(),
            self.manager.clone(),
            self.forwarder.clone(),
            self.notifier.clone(),
            self.store.clone(),
            self.webhooks.clone(),
        );
        bus.subscribe(hardware_machine);
        bus.subscribe(broadcast_machine);
        bus.subscribe(EventHooks);
        for subscriber in extra {
            bus.subscribe(subscriber);
        }

        bus.publish(Event::Time(now), &ctx).await?;
        bus.close();

        let config = ctx.config();
        self.store.save_broadcast(&config).await?;
        Ok(())
    }
}
