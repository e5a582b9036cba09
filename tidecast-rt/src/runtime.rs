use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use futures::future::join_all;
use tidecast::{register_states, Orchestrator, StateRegistry, Store};
use tokio::runtime::Builder;
use tracing::{error, info};

use crate::{
    hardware::StoreHardwareManager,
    notifier::select_notifier,
    settings::RuntimeConfig,
    store::JsonFileStore,
    tokens::select_token_store,
    vidforward::HttpForwardingService,
    webhook::WebhookSender,
    youtube::YouTubeBroadcastManager,
};

const DEFAULT_TICK_SECONDS: u64 = 60;

/// Wires the control core to its production collaborators and ticks every
/// enabled broadcast until ctrl-c.
pub struct Runtime {
    root: PathBuf,
}

impl Runtime {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn run(self) -> anyhow::Result<()> {
        let runtime = Builder::new_multi_thread().enable_all().build()?;
        runtime.block_on(self.run_inner())
    }

    async fn run_inner(self) -> anyhow::Result<()> {
        let config = RuntimeConfig::new(&self.root)?;
        let _guard = crate::tracing::init(&config);
        info!(root = ?config.root, "starting broadcast control");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let store: Arc<dyn Store> =
            Arc::new(JsonFileStore::open(config.resolve_relative("data/store.json"))?);
        let tokens: Arc<_> = select_token_store(&config, client.clone()).into();
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(registry()),
            store.clone(),
            Arc::new(StoreHardwareManager::new(store.clone())),
            Arc::new(YouTubeBroadcastManager::new(
                client.clone(),
                tokens,
                store.clone(),
            )),
            Arc::new(HttpForwardingService::new(client.clone())),
            select_notifier(&config, client.clone()).into(),
            Arc::new(WebhookSender::from_config(client, &config)),
        ));

        let period = config
            .get::<u64>("tick.periodSeconds")
            .unwrap_or(DEFAULT_TICK_SECONDS);
        let mut interval = tokio::time::interval(Duration::from_secs(period));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                    return Ok(());
                }
                _ = interval.tick() => {
                    tick_all(&orchestrator, &store).await;
                }
            }
        }
    }
}

/// One round: every enabled broadcast ticks once, independently. A failed
/// tick only affects its own broadcast; the next round re-evaluates from
/// the persisted state.
async fn tick_all(orchestrator: &Arc<Orchestrator>, store: &Arc<dyn Store>) {
    let broadcasts = match store.list_broadcasts().await {
        Ok(broadcasts) => broadcasts,
        Err(e) => {
            error!(error = %e, "cannot list broadcasts");
            return;
        }
    };
    let now = Utc::now();
    let ticks = broadcasts
        .into_iter()
        .filter(|b| b.enabled)
        .map(|b| {
            let orchestrator = orchestrator.clone();
            async move {
                if let Err(e) = orchestrator.tick(b.id, now).await {
                    error!(broadcast = b.name.as_str(), error = %e, "tick failed");
                }
            }
        });
    join_all(ticks).await;
}

fn registry() -> StateRegistry {
    let mut registry = StateRegistry::new();
    register_states(&mut registry);
    registry
}
