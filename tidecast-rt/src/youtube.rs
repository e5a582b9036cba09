use std::sync::Arc;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde_json::{json, Value};
use tidecast::{
    watch_url, BroadcastConfig, BroadcastManager, BroadcastStatus, PlatformIds, Store,
    StreamHealth,
};
use tracing::{debug, warn};

use crate::tokens::TokenStore;

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const TRANSITION_ATTEMPTS: u32 = 3;

/// The video platform over its REST surface, authenticated with bearer
/// tokens from the token store.
pub struct YouTubeBroadcastManager {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    store: Arc<dyn Store>,
}

impl YouTubeBroadcastManager {
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<dyn TokenStore>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            client,
            base_url: DEFAULT_API_BASE.into(),
            tokens,
            store,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> anyhow::Result<Value> {
        let token = self.tokens.bearer_token().await?;
        let mut builder = self
            .client
            .request(method, format!("{}/{path}", self.base_url))
            .bearer_auth(token)
            .query(query);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder.send().await?;
        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            bail!("platform answered {status}: {payload}");
        }
        Ok(payload)
    }

    async fn transition_once(&self, broadcast_id: &str, status: &str) -> anyhow::Result<()> {
        self.request(
            reqwest::Method::POST,
            "liveBroadcasts/transition",
            &[
                ("part", "status"),
                ("id", broadcast_id),
                ("broadcastStatus", status),
            ],
            None,
        )
        .await?;
        Ok(())
    }

    /// One platform status step, retried a bounded number of times. The
    /// platform rejects transitions into the current status; that counts
    /// as done.
    async fn transition_with_retry(&self, broadcast_id: &str, status: &str) -> anyhow::Result<()> {
        let mut last_error = None;
        for attempt in 1..=TRANSITION_ATTEMPTS {
            match self.transition_once(broadcast_id, status).await {
                Ok(()) => return Ok(()),
                Err(e) if e.to_string().contains("redundantTransition") => {
                    debug!(status, "already there");
                    return Ok(());
                }
                Err(e) => {
                    warn!(status, attempt, error = %e, "transition attempt failed");
                    last_error = Some(e);
                    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("transition failed")))
    }
}

fn item_str<'a>(value: &'a Value, pointer: &str) -> anyhow::Result<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("platform response missing {pointer}"))
}

fn parse_lifecycle(status: &str) -> anyhow::Result<BroadcastStatus> {
    Ok(match status {
        "created" => BroadcastStatus::Created,
        "ready" => BroadcastStatus::Ready,
        "testing" => BroadcastStatus::Testing,
        "live" => BroadcastStatus::Live,
        "complete" => BroadcastStatus::Complete,
        "revoked" => BroadcastStatus::Revoked,
        other => bail!("unknown lifecycle status '{other}'"),
    })
}

fn parse_health(status: &str) -> StreamHealth {
    match status {
        "good" => StreamHealth::Good,
        "ok" => StreamHealth::Ok,
        "bad" => StreamHealth::Bad,
        _ => StreamHealth::NoData,
    }
}

/// Statuses to walk through, in order, to reach the target.
fn transition_steps(status: BroadcastStatus) -> anyhow::Result<&'static [&'static str]> {
    Ok(match status {
        BroadcastStatus::Testing => &["testing"],
        BroadcastStatus::Live => &["testing", "live"],
        BroadcastStatus::Complete => &["complete"],
        other => bail!("'{}' is not a transition target", other.as_str()),
    })
}

#[async_trait]
impl BroadcastManager for YouTubeBroadcastManager {
    async fn create_broadcast(&self, config: &BroadcastConfig) -> anyhow::Result<PlatformIds> {
        let broadcast = self
            .request(
                reqwest::Method::POST,
                "liveBroadcasts",
                &[("part", "snippet,status,contentDetails")],
                Some(json!({
                    "snippet": {
                        "title": config.name,
                        "description": "Ocean observation livestream",
                        "scheduledStartTime": config.start.to_rfc3339(),
                        "scheduledEndTime": config.end.to_rfc3339(),
                    },
                    "status": {"privacyStatus": "public", "selfDeclaredMadeForKids": false},
                    "contentDetails": {"enableAutoStart": false, "enableAutoStop": false},
                })),
            )
            .await?;
        let broadcast_id = item_str(&broadcast, "/id")?.to_string();
        let chat_id = broadcast
            .pointer("/snippet/liveChatId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let stream = self
            .request(
                reqwest::Method::POST,
                "liveStreams",
                &[("part", "snippet,cdn")],
                Some(json!({
                    "snippet": {"title": config.name},
                    "cdn": {
                        "ingestionType": "rtmp",
                        "frameRate": "variable",
                        "resolution": "variable",
                    },
                })),
            )
            .await?;
        let stream_id = item_str(&stream, "/id")?.to_string();

        self.request(
            reqwest::Method::POST,
            "liveBroadcasts/bind",
            &[
                ("part", "id"),
                ("id", broadcast_id.as_str()),
                ("streamId", stream_id.as_str()),
            ],
            None,
        )
        .await?;

        Ok(PlatformIds {
            broadcast_id,
            stream_id,
            chat_id,
        })
    }

    async fn transition_status(
        &self,
        broadcast_id: &str,
        status: BroadcastStatus,
    ) -> anyhow::Result<()> {
        for step in transition_steps(status)? {
            self.transition_with_retry(broadcast_id, step).await?;
        }
        Ok(())
    }

    async fn broadcast_status(&self, broadcast_id: &str) -> anyhow::Result<BroadcastStatus> {
        let response = self
            .request(
                reqwest::Method::GET,
                "liveBroadcasts",
                &[("part", "status"), ("id", broadcast_id)],
                None,
            )
            .await?;
        parse_lifecycle(item_str(&response, "/items/0/status/lifeCycleStatus")?)
    }

    async fn complete_broadcast(&self, config: &BroadcastConfig) -> anyhow::Result<()> {
        self.transition_with_retry(&config.platform_broadcast_id, "complete")
            .await?;
        self.request(
            reqwest::Method::PUT,
            "videos",
            &[("part", "status")],
            Some(json!({
                "id": config.platform_broadcast_id,
                "status": {"privacyStatus": config.post_live_privacy},
            })),
        )
        .await?;
        Ok(())
    }

    async fn post_chat_message(&self, chat_id: &str, message: &str) -> anyhow::Result<()> {
        self.request(
            reqwest::Method::POST,
            "liveChat/messages",
            &[("part", "snippet")],
            Some(json!({
                "snippet": {
                    "liveChatId": chat_id,
                    "type": "textMessageEvent",
                    "textMessageDetails": {"messageText": message},
                },
            })),
        )
        .await?;
        Ok(())
    }

    async fn save_link(&self, variable: &str, broadcast_id: &str) -> anyhow::Result<()> {
        self.store
            .set_variable(variable, &watch_url(broadcast_id))
            .await?;
        Ok(())
    }

    async fn rtmp_key(&self, stream_title: &str) -> anyhow::Result<String> {
        let response = self
            .request(
                reqwest::Method::GET,
                "liveStreams",
                &[("part", "snippet,cdn"), ("mine", "true"), ("maxResults", "50")],
                None,
            )
            .await?;
        let items = response
            .pointer("/items")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("platform response missing /items"))?;
        for item in items {
            if item.pointer("/snippet/title").and_then(Value::as_str) == Some(stream_title) {
                return Ok(item_str(item, "/cdn/ingestionInfo/streamName")?.to_string());
            }
        }
        bail!("no stream titled '{stream_title}'")
    }

    async fn stream_health(&self, stream_id: &str) -> anyhow::Result<StreamHealth> {
        let response = self
            .request(
                reqwest::Method::GET,
                "liveStreams",
                &[("part", "status"), ("id", stream_id)],
                None,
            )
            .await?;
        Ok(parse_health(
            item_str(&response, "/items/0/status/healthStatus/status").unwrap_or("noData"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_statuses_parse() {
        assert_eq!(BroadcastStatus::Live, parse_lifecycle("live").unwrap());
        assert_eq!(
            BroadcastStatus::Complete,
            parse_lifecycle("complete").unwrap()
        );
        assert!(parse_lifecycle("paused").is_err());
    }

    #[test]
    fn health_defaults_to_no_data() {
        assert_eq!(StreamHealth::Good, parse_health("good"));
        assert_eq!(StreamHealth::Bad, parse_health("bad"));
        assert_eq!(StreamHealth::NoData, parse_health("unheard-of"));
    }

    #[test]
    fn going_live_passes_through_testing() {
        assert_eq!(
            &["testing", "live"],
            transition_steps(BroadcastStatus::Live).unwrap()
        );
        assert!(transition_steps(BroadcastStatus::Revoked).is_err());
    }
}
