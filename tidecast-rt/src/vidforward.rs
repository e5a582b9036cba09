use anyhow::bail;
use async_trait::async_trait;
use serde_json::json;
use tidecast::{BroadcastConfig, ForwardingService};
use tracing::debug;

/// RTMP ingest endpoint for a given stream key.
fn ingest_url(rtmp_key: &str) -> String {
    format!("rtmp://a.rtmp.youtube.com/live2/{rtmp_key}")
}

/// Control client for the vidforward proxy. `stream` points the proxy's
/// output at the platform ingest; `slate` swaps in the static fallback.
/// Both are idempotent on the proxy side.
pub struct HttpForwardingService {
    client: reqwest::Client,
}

impl HttpForwardingService {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn control(&self, config: &BroadcastConfig, mode: &str) -> anyhow::Result<()> {
        if config.forwarding_host.is_empty() {
            bail!("no forwarding host configured");
        }
        let url = format!("http://{}/{}", config.forwarding_host, mode);
        debug!(url = url.as_str(), "vidforward control");
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "name": config.name,
                "mac": config.camera_mac,
                "urls": [ingest_url(&config.rtmp_key)],
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("vidforward answered {}", response.status());
        }
        Ok(())
    }
}

#[async_trait]
impl ForwardingService for HttpForwardingService {
    async fn stream(&self, config: &BroadcastConfig) -> anyhow::Result<()> {
        self.control(config, "stream").await
    }

    async fn slate(&self, config: &BroadcastConfig) -> anyhow::Result<()> {
        self.control(config, "slate").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidecast::BroadcastKind;

    #[test]
    fn ingest_url_embeds_the_key() {
        assert_eq!("rtmp://a.rtmp.youtube.com/live2/abc-def", ingest_url("abc-def"));
    }

    #[tokio::test]
    async fn missing_forwarding_host_is_an_error() {
        let service = HttpForwardingService::new(reqwest::Client::new());
        let config = BroadcastConfig::mock(BroadcastKind::VidforwardPermanent);
        assert!(service.stream(&config).await.is_err());
    }
}
