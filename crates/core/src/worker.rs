// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker slots
//!
//! Every session holds one `WorkerState` per configured worker key. The slot
//! is created with the session and is only ever mutated, never removed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Worker keys a session gets when none are configured
pub const DEFAULT_WORKERS: [&str; 4] = ["chatgpt", "claude", "gemini", "grok"];

/// Name of a worker slot within a session (e.g. "claude")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerKey(pub String);

impl WorkerKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkerKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque identity of a live worker endpoint (the channel handle)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerIdentity(pub String);

impl WorkerIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkerIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status of a worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    NotConnected,
    Ready,
    InputReady,
    AwaitingDispatch,
    Dispatching,
    Streaming,
    Complete,
    Error,
}

impl WorkerStatus {
    pub const ALL: [WorkerStatus; 8] = [
        WorkerStatus::NotConnected,
        WorkerStatus::Ready,
        WorkerStatus::InputReady,
        WorkerStatus::AwaitingDispatch,
        WorkerStatus::Dispatching,
        WorkerStatus::Streaming,
        WorkerStatus::Complete,
        WorkerStatus::Error,
    ];

    /// Statuses in which a worker may hold a channel handle (ready through complete)
    pub fn allows_channel(self) -> bool {
        !matches!(self, WorkerStatus::NotConnected | WorkerStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::NotConnected => "not_connected",
            WorkerStatus::Ready => "ready",
            WorkerStatus::InputReady => "input_ready",
            WorkerStatus::AwaitingDispatch => "awaiting_dispatch",
            WorkerStatus::Dispatching => "dispatching",
            WorkerStatus::Streaming => "streaming",
            WorkerStatus::Complete => "complete",
            WorkerStatus::Error => "error",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkerStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown worker status: {}", s))
    }
}

/// State of one worker slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerState {
    pub key: WorkerKey,
    pub status: WorkerStatus,
    #[serde(default, rename = "channelHandle", skip_serializing_if = "Option::is_none")]
    pub channel: Option<WorkerIdentity>,
    pub last_update: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerState {
    /// A fresh, unconnected slot
    pub fn new(key: WorkerKey, now: u64) -> Self {
        Self {
            key,
            status: WorkerStatus::NotConnected,
            channel: None,
            last_update: now,
            error: None,
        }
    }

    /// Apply a status change.
    ///
    /// A status outside ready..complete drops the channel handle. A supplied
    /// error replaces the previous one; healthy statuses clear it.
    pub(crate) fn apply_status(&mut self, status: WorkerStatus, error: Option<String>, now: u64) {
        self.status = status;
        self.last_update = now;
        if !status.allows_channel() {
            self.channel = None;
        }
        match error {
            Some(error) => self.error = Some(error),
            None if status.allows_channel() => self.error = None,
            None => {}
        }
    }

    /// Bind or clear the channel handle.
    ///
    /// Binding a handle to a disconnected or failed slot promotes it to ready.
    pub(crate) fn apply_channel(&mut self, channel: Option<WorkerIdentity>, now: u64) {
        self.last_update = now;
        match channel {
            Some(identity) => {
                if !self.status.allows_channel() {
                    self.status = WorkerStatus::Ready;
                    self.error = None;
                }
                self.channel = Some(identity);
            }
            None => self.channel = None,
        }
    }
}
