use std::{collections::HashMap, path::PathBuf};

use serde::Deserialize;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::settings::RuntimeConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TracingSettings {
    default_level: String,
    filters: HashMap<String, String>,
    file: Option<TracingFileSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracingFileSettings {
    path: PathBuf,
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            default_level: "info".into(),
            filters: [
                ("hyper".to_string(), "warn".to_string()),
                ("reqwest".to_string(), "warn".to_string()),
            ]
            .into(),
            file: None,
        }
    }
}

impl TracingSettings {
    fn log_string(&self) -> String {
        std::iter::once(self.default_level.clone())
            .chain(
                self.filters
                    .iter()
                    .map(|(topic, level)| format!("{topic}={level}")),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Installs the stdout subscriber and, when configured, a rolling hourly
/// log file. The returned guard must be kept alive for the file writer to
/// flush.
pub fn init(config: &RuntimeConfig) -> Option<WorkerGuard> {
    let settings = config.get_or_default::<TracingSettings>("tracing");
    let filter = settings.log_string();

    let stdout = tracing_subscriber::fmt::layer()
        .with_line_number(true)
        .compact()
        .with_filter(EnvFilter::new(&filter));
    let registry = tracing_subscriber::registry().with(stdout);

    match &settings.file {
        Some(file) => {
            let path = config.resolve_relative(&file.path);
            let (non_blocking, guard) = tracing_appender::non_blocking(
                tracing_appender::rolling::hourly(&path, "tidecast-logs"),
            );
            let _ = registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_line_number(true)
                        .compact()
                        .with_filter(EnvFilter::new(&filter)),
                )
                .try_init();
            info!(directory = ?path, "hourly log files enabled");
            Some(guard)
        }
        None => {
            let _ = registry.try_init();
            None
        }
    }
}
