// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure signals and the remediation returned for them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A classified failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSignal {
    /// A worker's channel went away
    WorkerDisconnected,
    /// The worker's surface no longer matches what its adapter expects
    UiIncompatible,
    /// The external surface is throttling requests
    RateLimited,
    /// The coordinator process was torn down and started again
    CoordinatorRestarted,
    Unknown,
}

impl FailureSignal {
    pub const ALL: [FailureSignal; 5] = [
        FailureSignal::WorkerDisconnected,
        FailureSignal::UiIncompatible,
        FailureSignal::RateLimited,
        FailureSignal::CoordinatorRestarted,
        FailureSignal::Unknown,
    ];

    /// Signals that only make sense for a specific worker
    pub fn requires_worker(self) -> bool {
        matches!(
            self,
            FailureSignal::WorkerDisconnected
                | FailureSignal::UiIncompatible
                | FailureSignal::RateLimited
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureSignal::WorkerDisconnected => "worker_disconnected",
            FailureSignal::UiIncompatible => "ui_incompatible",
            FailureSignal::RateLimited => "rate_limited",
            FailureSignal::CoordinatorRestarted => "coordinator_restarted",
            FailureSignal::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureSignal::ALL
            .into_iter()
            .find(|signal| signal.as_str() == s)
            .ok_or_else(|| format!("unknown failure signal: {}", s))
    }
}

/// What the caller should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryKind {
    ReopenWorker,
    ResumeSession,
    FallbackManual,
    Retry,
}

/// Side effect the caller should perform for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    CopyToClipboard,
}

/// Typed remediation for a failure. Produced, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryAction {
    pub recoverable: bool,
    pub action: RecoveryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_effect: Option<SideEffect>,
}

impl RecoveryAction {
    pub fn recoverable(action: RecoveryKind, user_message: impl Into<String>) -> Self {
        Self {
            recoverable: true,
            action,
            user_message: Some(user_message.into()),
            side_effect: None,
        }
    }

    pub fn with_side_effect(mut self, side_effect: SideEffect) -> Self {
        self.side_effect = Some(side_effect);
        self
    }

    /// Manual fallback for failures nothing else can handle
    pub fn unrecoverable() -> Self {
        Self {
            recoverable: false,
            action: RecoveryKind::FallbackManual,
            user_message: Some("An unknown error occurred. Please try manual mode.".to_string()),
            side_effect: None,
        }
    }

    pub fn copy_to_clipboard(&self) -> bool {
        self.side_effect == Some(SideEffect::CopyToClipboard)
    }
}
