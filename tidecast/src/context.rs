use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    bus::Publisher,
    camera::HardwareManager,
    config::BroadcastConfig,
    forward::ForwardingService,
    notify::{NotificationKind, Notifier},
    platform::BroadcastManager,
    store::{Store, StoreError},
    webhook::WebhookClient,
};

/// Everything a state needs to act: the shared configuration record, the
/// publisher of the tick's bus, the tick instant, and the collaborator
/// seams. Built fresh for every tick and shared by reference with both
/// machines and the hooks.
pub struct BroadcastContext {
    config: Arc<Mutex<BroadcastConfig>>,
    pub publisher: Publisher,
    /// Wall clock instant this tick was injected with.
    pub now: DateTime<Utc>,
    pub hardware: Arc<dyn HardwareManager>,
    pub manager: Arc<dyn BroadcastManager>,
    pub forwarder: Arc<dyn ForwardingService>,
    pub notifier: Arc<dyn Notifier>,
    pub store: Arc<dyn Store>,
    pub webhooks: Arc<dyn WebhookClient>,
}

impl BroadcastContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BroadcastConfig,
        publisher: Publisher,
        now: DateTime<Utc>,
        hardware: Arc<dyn HardwareManager>,
        manager: Arc<dyn BroadcastManager>,
        forwarder: Arc<dyn ForwardingService>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn Store>,
        webhooks: Arc<dyn WebhookClient>,
    ) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
            publisher,
            now,
            hardware,
            manager,
            forwarder,
            notifier,
            store,
            webhooks,
        }
    }

    /// Snapshot of the configuration record as of this moment in the tick.
    pub fn config(&self) -> BroadcastConfig {
        self.config.lock().expect("Shouldnt be poisoned").clone()
    }

    pub fn update_config<R>(&self, mutate: impl FnOnce(&mut BroadcastConfig) -> R) -> R {
        mutate(&mut self.config.lock().expect("Shouldnt be poisoned"))
    }

    /// Persists a state transition: updates the in-memory record and writes
    /// the `(name, snapshot)` pair through the store transactionally, so a
    /// crash mid-transition restarts in the new logical state.
    pub async fn persist_states(
        &self,
        hardware: Option<(&'static str, serde_json::Value)>,
        broadcast: Option<(&'static str, serde_json::Value)>,
    ) -> Result<(), StoreError> {
        fn apply(
            config: &mut BroadcastConfig,
            hardware: &Option<(&'static str, serde_json::Value)>,
            broadcast: &Option<(&'static str, serde_json::Value)>,
        ) {
            if let Some((name, data)) = hardware {
                config.hardware_state = name.to_string();
                config.hardware_state_data = data.clone();
            }
            if let Some((name, data)) = broadcast {
                config.broadcast_state = name.to_string();
                config.broadcast_state_data = data.clone();
            }
            config.in_failure = config.hardware_state == "hardwareFailure"
                || config.broadcast_state.ends_with("Failure");
        }

        let id = self.update_config(|c| {
            apply(c, &hardware, &broadcast);
            c.id
        });
        self.store
            .update_broadcast(id, Box::new(move |c| apply(c, &hardware, &broadcast)))
            .await
    }

    /// Persists mutations that are not state transitions (platform ids,
    /// RTMP key) into both the in-memory record and the store.
    pub async fn persist_config_update(
        &self,
        mutate: impl Fn(&mut BroadcastConfig) + Clone + Send + 'static,
    ) -> Result<(), StoreError> {
        let id = self.update_config(|c| {
            mutate(c);
            c.id
        });
        self.store.update_broadcast(id, Box::new(mutate)).await
    }

    /// Notifies the operator unless the broadcast suppresses this kind.
    /// Never fails the tick; delivery problems are logged.
    pub async fn notify(&self, kind: NotificationKind, message: &str) {
        let (site_key, mask, name) = {
            let config = self.config.lock().expect("Shouldnt be poisoned");
            (
                config.site_key,
                config.notify_suppress_rules,
                config.name.clone(),
            )
        };
        if kind.suppressed_by(mask) {
            debug!(kind = kind.as_str(), message, "notification suppressed");
            return;
        }
        if let Err(e) = self
            .notifier
            .notify(site_key, kind, &format!("{name}: {message}"))
            .await
        {
            warn!(kind = kind.as_str(), error = %e, "notification failed");
        }
    }
}
