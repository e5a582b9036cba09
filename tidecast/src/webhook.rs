use async_trait::async_trait;

use crate::config::BroadcastConfig;

/// Outbound webhooks fired by the side-effect hooks.
///
/// `notify_live` fires when a direct broadcast reaches its live state;
/// `register_capture` registers the finished stream with the OpenFish
/// annotation service when the broadcast opted in.
#[async_trait]
pub trait WebhookClient: Send + Sync {
    async fn notify_live(&self, config: &BroadcastConfig) -> anyhow::Result<()>;

    async fn register_capture(&self, config: &BroadcastConfig) -> anyhow::Result<()>;
}
