use async_trait::async_trait;

use crate::config::BroadcastConfig;

/// Lifecycle status of a platform broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastStatus {
    Created,
    Ready,
    Testing,
    Live,
    Complete,
    Revoked,
}

impl BroadcastStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastStatus::Created => "created",
            BroadcastStatus::Ready => "ready",
            BroadcastStatus::Testing => "testing",
            BroadcastStatus::Live => "live",
            BroadcastStatus::Complete => "complete",
            BroadcastStatus::Revoked => "revoked",
        }
    }
}

/// Ingestion health as reported for a platform stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamHealth {
    Good,
    Ok,
    Bad,
    NoData,
}

impl StreamHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, StreamHealth::Good | StreamHealth::Ok)
    }
}

/// Ids minted when a broadcast and its bound stream are created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformIds {
    pub broadcast_id: String,
    pub stream_id: String,
    pub chat_id: String,
}

pub fn watch_url(broadcast_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={broadcast_id}")
}

/// The external video platform, reduced to the calls the machines make.
///
/// Every call must be idempotent under retry: a crash between an external
/// call and the persisted transition is recovered by retrying on the next
/// tick.
#[async_trait]
pub trait BroadcastManager: Send + Sync {
    /// Creates broadcast + stream, binds them and sets category and
    /// description.
    async fn create_broadcast(&self, config: &BroadcastConfig) -> anyhow::Result<PlatformIds>;

    /// Drives the broadcast to `status`, passing through the intermediate
    /// statuses with bounded retry.
    async fn transition_status(
        &self,
        broadcast_id: &str,
        status: BroadcastStatus,
    ) -> anyhow::Result<()>;

    async fn broadcast_status(&self, broadcast_id: &str) -> anyhow::Result<BroadcastStatus>;

    /// Completes the broadcast and applies the configured post-live
    /// privacy.
    async fn complete_broadcast(&self, config: &BroadcastConfig) -> anyhow::Result<()>;

    async fn post_chat_message(&self, chat_id: &str, message: &str) -> anyhow::Result<()>;

    /// Saves the public watch link into the named store variable.
    async fn save_link(&self, variable: &str, broadcast_id: &str) -> anyhow::Result<()>;

    /// RTMP ingestion key, looked up by stream title.
    async fn rtmp_key(&self, stream_title: &str) -> anyhow::Result<String>;

    async fn stream_health(&self, stream_id: &str) -> anyhow::Result<StreamHealth>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_url_embeds_the_broadcast_id() {
        assert_eq!("https://www.youtube.com/watch?v=abc123", watch_url("abc123"));
    }

    #[test]
    fn health_partition() {
        assert!(StreamHealth::Good.is_healthy());
        assert!(StreamHealth::Ok.is_healthy());
        assert!(!StreamHealth::Bad.is_healthy());
        assert!(!StreamHealth::NoData.is_healthy());
    }
}
