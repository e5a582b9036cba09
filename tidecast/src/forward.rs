use async_trait::async_trait;

use crate::config::BroadcastConfig;

/// The vidforward proxy that keeps the platform stream alive across
/// source outages. Used by the vidforward kinds only.
#[async_trait]
pub trait ForwardingService: Send + Sync {
    /// Forward the camera source to the platform ingest.
    async fn stream(&self, config: &BroadcastConfig) -> anyhow::Result<()>;

    /// Serve the static slate instead of the live source.
    async fn slate(&self, config: &BroadcastConfig) -> anyhow::Result<()>;
}
