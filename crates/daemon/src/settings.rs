// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon tunables loaded from `council.toml`

use council_core::{SendMode, WorkerKey, DEFAULT_WORKERS};
use council_engine::{DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_REQUEST_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Idle time after which a daemon with no live sessions exits
pub const DEFAULT_IDLE_SHUTDOWN: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("settings list no workers")]
    NoWorkers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub keepalive_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub idle_shutdown: Duration,
    /// Preferred send mode, before per-platform downgrade
    pub send_mode: SendMode,
    pub workers: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            idle_shutdown: DEFAULT_IDLE_SHUTDOWN,
            send_mode: SendMode::default(),
            workers: DEFAULT_WORKERS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl Settings {
    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        Self::parse(&text).map_err(|e| match e {
            SettingsError::Parse { source, .. } => SettingsError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn parse(text: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(text).map_err(|source| SettingsError::Parse {
            path: String::new(),
            source,
        })?;
        if settings.workers.is_empty() {
            return Err(SettingsError::NoWorkers);
        }
        Ok(settings)
    }

    pub fn worker_keys(&self) -> Vec<WorkerKey> {
        self.workers.iter().map(|k| WorkerKey::new(k.as_str())).collect()
    }
}
