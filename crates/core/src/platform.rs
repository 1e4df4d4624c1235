// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker kinds and their automation policy
//!
//! The coordinator never drives an external surface itself; it only needs to
//! know, per kind of worker, what the surface supports and whether automated
//! sending is permitted. Unknown keys map to `WorkerKind::Other`, which has no
//! platform restrictions.

use crate::worker::WorkerKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Variant tag for a worker's surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    Chatgpt,
    Claude,
    Gemini,
    Grok,
    Other,
}

/// What a surface supports and allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub streaming: bool,
    pub file_upload: bool,
    pub allows_automation: bool,
    pub requires_manual_mode: bool,
    pub strict_security_policy: bool,
    pub max_requests_per_minute: Option<u32>,
}

impl WorkerKind {
    pub fn for_key(key: &WorkerKey) -> Self {
        match key.as_str() {
            "chatgpt" => WorkerKind::Chatgpt,
            "claude" => WorkerKind::Claude,
            "gemini" => WorkerKind::Gemini,
            "grok" => WorkerKind::Grok,
            _ => WorkerKind::Other,
        }
    }

    pub fn capabilities(self) -> Capabilities {
        match self {
            WorkerKind::Chatgpt | WorkerKind::Gemini => Capabilities {
                streaming: true,
                file_upload: true,
                allows_automation: false,
                requires_manual_mode: false,
                strict_security_policy: true,
                max_requests_per_minute: None,
            },
            WorkerKind::Claude => Capabilities {
                streaming: true,
                file_upload: true,
                allows_automation: false,
                requires_manual_mode: false,
                strict_security_policy: false,
                max_requests_per_minute: Some(10),
            },
            WorkerKind::Grok => Capabilities {
                streaming: true,
                file_upload: false,
                allows_automation: false,
                requires_manual_mode: true,
                strict_security_policy: true,
                max_requests_per_minute: None,
            },
            WorkerKind::Other => Capabilities {
                streaming: false,
                file_upload: false,
                allows_automation: true,
                requires_manual_mode: false,
                strict_security_policy: false,
                max_requests_per_minute: None,
            },
        }
    }

    /// Warning to surface to the user about automating this kind, if any
    pub fn automation_warning(self) -> Option<String> {
        let caps = self.capabilities();
        if self == WorkerKind::Grok {
            return Some(
                "grok terms of service prohibit automated access; always manual".to_string(),
            );
        }
        if caps.requires_manual_mode {
            return Some(format!("{} requires manual mode", self));
        }
        if caps.strict_security_policy {
            return Some(format!(
                "{} has a strict security policy; automation may be blocked",
                self
            ));
        }
        None
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerKind::Chatgpt => "chatgpt",
            WorkerKind::Claude => "claude",
            WorkerKind::Gemini => "gemini",
            WorkerKind::Grok => "grok",
            WorkerKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// How a prompt reaches the worker's surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// User pastes and sends
    #[default]
    Manual,
    /// Worker fills the input, user sends
    SemiAssisted,
    /// Worker fills and sends
    Automated,
}

impl fmt::Display for SendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SendMode::Manual => "manual",
            SendMode::SemiAssisted => "semi_assisted",
            SendMode::Automated => "automated",
        };
        f.write_str(name)
    }
}

impl FromStr for SendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SendMode::Manual),
            "semi_assisted" => Ok(SendMode::SemiAssisted),
            "automated" => Ok(SendMode::Automated),
            other => Err(format!("unknown send mode: {}", other)),
        }
    }
}

/// The send mode actually permitted for `kind`, given the user's preference
pub fn safe_send_mode(kind: WorkerKind, preferred: SendMode) -> SendMode {
    let caps = kind.capabilities();
    if kind == WorkerKind::Grok || caps.requires_manual_mode || !caps.allows_automation {
        if preferred != SendMode::Manual {
            tracing::debug!(%kind, %preferred, "send mode downgraded to manual");
        }
        return SendMode::Manual;
    }
    preferred
}
