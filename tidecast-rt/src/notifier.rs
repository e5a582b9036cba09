use anyhow::bail;
use async_trait::async_trait;
use serde_json::json;
use tidecast::{NotificationKind, Notifier};
use tracing::warn;

use crate::settings::RuntimeConfig;

/// Fallback notifier for deployments without an ops endpoint: the
/// notification only lands in the logs.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        site_key: i64,
        kind: NotificationKind,
        message: &str,
    ) -> anyhow::Result<()> {
        warn!(site_key, kind = kind.as_str(), message, "operator notification");
        Ok(())
    }
}

/// Posts notifications to the ops endpoint configured under
/// `notifier.url`.
pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(
        &self,
        site_key: i64,
        kind: NotificationKind,
        message: &str,
    ) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "siteKey": site_key,
                "kind": kind.as_str(),
                "message": message,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("notifier answered {}", response.status());
        }
        Ok(())
    }
}

pub fn select_notifier(config: &RuntimeConfig, client: reqwest::Client) -> Box<dyn Notifier> {
    match config.get::<String>("notifier.url") {
        Some(url) => Box::new(HttpNotifier::new(client, url)),
        None => Box::new(LogNotifier),
    }
}
