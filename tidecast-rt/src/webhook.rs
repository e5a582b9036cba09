use anyhow::bail;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tidecast::{watch_url, BroadcastConfig, WebhookClient};
use tracing::debug;

use crate::settings::RuntimeConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebhookSettings {
    live_url: String,
    openfish_url: String,
    service_account: String,
    signing_secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LiveClaims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
}

/// Outbound webhook sender: a JWT-signed live announcement to the partner
/// site and a stream registration with the OpenFish annotation service.
pub struct WebhookSender {
    client: reqwest::Client,
    settings: WebhookSettings,
}

impl WebhookSender {
    pub fn new(client: reqwest::Client, settings: WebhookSettings) -> Self {
        Self { client, settings }
    }

    pub fn from_config(client: reqwest::Client, config: &RuntimeConfig) -> Self {
        Self::new(client, config.get_or_default("webhooks"))
    }

    fn live_token(&self, broadcast_id: &str) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = LiveClaims {
            iss: self.settings.service_account.clone(),
            sub: broadcast_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(5)).timestamp(),
        };
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.settings.signing_secret.as_bytes()),
        )?)
    }
}

fn accepted(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED
    )
}

#[async_trait]
impl WebhookClient for WebhookSender {
    async fn notify_live(&self, config: &BroadcastConfig) -> anyhow::Result<()> {
        if self.settings.live_url.is_empty() {
            debug!("no live webhook endpoint configured");
            return Ok(());
        }
        let token = self.live_token(&config.platform_broadcast_id)?;
        let response = self
            .client
            .post(&self.settings.live_url)
            .bearer_auth(token)
            .json(&json!({
                "uuid": config.id,
                "name": config.name,
                "bid": config.platform_broadcast_id,
                "state": "live",
            }))
            .send()
            .await?;
        if !accepted(response.status()) {
            bail!("live webhook answered {}", response.status());
        }
        Ok(())
    }

    async fn register_capture(&self, config: &BroadcastConfig) -> anyhow::Result<()> {
        if self.settings.openfish_url.is_empty() {
            debug!("no openfish endpoint configured");
            return Ok(());
        }
        let response = self
            .client
            .post(&self.settings.openfish_url)
            .json(&json!({
                "streamUrl": watch_url(&config.platform_broadcast_id),
                "captureSource": config.openfish_capture_source,
            }))
            .send()
            .await?;
        if !accepted(response.status()) {
            bail!("stream registration answered {}", response.status());
        }
        Ok(())
    }
}
