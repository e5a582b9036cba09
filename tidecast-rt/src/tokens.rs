use std::path::PathBuf;

use anyhow::{bail, Context};
use async_trait::async_trait;

use crate::settings::RuntimeConfig;

/// Source of the bearer token for the video platform.
///
/// Which implementation runs is decided once, at construction time, from
/// the runtime configuration; nothing consults a global mode flag later.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn bearer_token(&self) -> anyhow::Result<String>;

    async fn save_token(&self, token: &str) -> anyhow::Result<()>;
}

/// Token in a file next to the configuration (development deployments).
pub struct FsTokenStore {
    path: PathBuf,
}

impl FsTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenStore for FsTokenStore {
    async fn bearer_token(&self) -> anyhow::Result<String> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("no token at {:?}", self.path))?;
        Ok(raw.trim().to_string())
    }

    async fn save_token(&self, token: &str) -> anyhow::Result<()> {
        tokio::fs::write(&self.path, token).await?;
        Ok(())
    }
}

/// Token held by an object store behind a plain HTTP interface
/// (production deployments).
pub struct HttpTokenStore {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenStore {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenStore for HttpTokenStore {
    async fn bearer_token(&self) -> anyhow::Result<String> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            bail!("token store answered {}", response.status());
        }
        Ok(response.text().await?.trim().to_string())
    }

    async fn save_token(&self, token: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .put(&self.url)
            .body(token.to_string())
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("token store answered {}", response.status());
        }
        Ok(())
    }
}

/// Picks the token store for this deployment: an object store URL when
/// configured, the local file otherwise.
pub fn select_token_store(
    config: &RuntimeConfig,
    client: reqwest::Client,
) -> Box<dyn TokenStore> {
    match config.get::<String>("platform.tokenUrl") {
        Some(url) => Box::new(HttpTokenStore::new(client, url)),
        None => Box::new(FsTokenStore::new(
            config.resolve_relative("platform-token"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_tokens_round_trip_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTokenStore::new(dir.path().join("token"));
        store.save_token("secret-token\n").await.unwrap();
        assert_eq!("secret-token", store.bearer_token().await.unwrap());
    }

    #[tokio::test]
    async fn missing_fs_token_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTokenStore::new(dir.path().join("token"));
        assert!(store.bearer_token().await.is_err());
    }
}
