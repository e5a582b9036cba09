use std::{
    io,
    path::{Path, PathBuf},
};

use config::ConfigError;
use glob::glob;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

/// Deployment settings for the control service: endpoints, tick period,
/// tracing levels, token locations.
///
/// Read once at startup by merging every JSON file in the root directory
/// (sorted, later files win) and never reloaded. Broadcast records are
/// deliberately not here: they live in the store under `data/` and are
/// re-read on every tick, because the console mutates them between ticks.
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    pub root: PathBuf,
    merged: config::Config,
}

impl RuntimeConfig {
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let root = path.into();
        let pattern = root.join("*.json");
        let pattern = pattern.to_str().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "configuration root is not valid UTF-8",
            )
        })?;

        let mut files = Vec::new();
        for entry in glob(pattern).map_err(reject)? {
            let file = entry.map_err(reject)?;
            // The store document is data, not settings.
            if file.file_name().is_some_and(|name| name == "store.json") {
                continue;
            }
            files.push(file);
        }
        files.sort_unstable();

        let mut builder = config::Config::builder();
        for file in files {
            info!(file = ?file, "merging settings file");
            builder = builder.add_source(config::File::from(file));
        }

        Ok(Self {
            root,
            merged: builder.build().map_err(reject)?,
        })
    }

    #[cfg(test)]
    pub fn mock(settings: serde_json::Value) -> Self {
        Self {
            root: "./test_data".into(),
            merged: config::Config::builder()
                .add_source(config::Config::try_from(&settings).unwrap())
                .build()
                .unwrap(),
        }
    }

    /// Resolves a relative path against the configuration root.
    pub fn resolve_relative(&self, path: impl Into<PathBuf> + AsRef<Path>) -> PathBuf {
        if path.as_ref().is_relative() {
            self.root.join(path)
        } else {
            path.into()
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.merged.get(key).ok()
    }

    /// Missing keys fall back silently; present-but-unusable values are
    /// worth an operator's attention before they fall back.
    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.merged.get::<T>(key) {
            Ok(value) => value,
            Err(ConfigError::NotFound(_)) => T::default(),
            Err(e) => {
                warn!(key, error = %e, "settings value is unusable, running with defaults");
                T::default()
            }
        }
    }
}

fn reject(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_lookup_with_defaults() {
        let settings = RuntimeConfig::mock(json!({"tick": {"periodSeconds": 30}}));
        assert_eq!(Some(30u64), settings.get("tick.periodSeconds"));
        assert_eq!(0u64, settings.get_or_default::<u64>("tick.missing"));
    }

    #[test]
    fn merges_json_files_from_the_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{"webhooks": {"liveUrl": "http://x"}}"#)
            .unwrap();
        std::fs::write(dir.path().join("store.json"), r#"{"broadcasts": {}}"#).unwrap();
        let settings = RuntimeConfig::new(dir.path()).unwrap();
        assert_eq!(
            Some("http://x".to_string()),
            settings.get::<String>("webhooks.liveUrl")
        );
        // The store document was skipped.
        assert_eq!(None, settings.get::<serde_json::Value>("broadcasts"));
    }

    #[test]
    fn later_files_override_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{"tick": {"periodSeconds": 60}}"#).unwrap();
        std::fs::write(dir.path().join("b.json"), r#"{"tick": {"periodSeconds": 15}}"#).unwrap();
        let settings = RuntimeConfig::new(dir.path()).unwrap();
        assert_eq!(Some(15u64), settings.get("tick.periodSeconds"));
    }

    #[test]
    fn relative_paths_resolve_against_the_root() {
        let settings = RuntimeConfig::mock(json!({}));
        assert_eq!(
            PathBuf::from("./test_data/platform-token"),
            settings.resolve_relative("platform-token")
        );
        assert_eq!(
            PathBuf::from("/abs/token"),
            settings.resolve_relative("/abs/token")
        );
    }
}
