// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session state
//!
//! A session tracks one end-to-end council workflow: the coordinator's phase
//! and the status of every worker slot. This module holds the pure state and
//! its persisted record form; persistence itself lives in the engine.
//!
//! ## Record form
//!
//! `SessionRecord` is what both store tiers hold under `session:<id>`. Workers
//! are an ordered list of `[key, state]` pairs so iteration order survives a
//! restart.

use crate::worker::{WorkerIdentity, WorkerKey, WorkerState, WorkerStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix of session keys in both store tiers
pub const SESSION_KEY_PREFIX: &str = "session:";

/// Unique identifier for a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Store key for this session
    pub fn storage_key(&self) -> String {
        format!("{}{}", SESSION_KEY_PREFIX, self.0)
    }

    /// Parse a store key back into a session id
    pub fn from_storage_key(key: &str) -> Option<Self> {
        key.strip_prefix(SESSION_KEY_PREFIX)
            .filter(|id| !id.is_empty())
            .map(|id| Self(id.to_string()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Coordinator phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Stage1,
    Stage2,
    Stage3,
    Complete,
    Error,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Idle,
        Phase::Stage1,
        Phase::Stage2,
        Phase::Stage3,
        Phase::Complete,
        Phase::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Stage1 => "stage1",
            Phase::Stage2 => "stage2",
            Phase::Stage3 => "stage3",
            Phase::Complete => "complete",
            Phase::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| format!("unknown phase: {}", s))
    }
}

/// Errors from session mutations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session {session} has no worker {worker}")]
    UnknownWorker { session: SessionId, worker: WorkerKey },
}

/// One session: phase plus an ordered set of worker slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub phase: Phase,
    workers: Vec<WorkerState>,
    pub last_update: u64,
}

impl Session {
    /// Create a session in the idle phase with every slot `not_connected`.
    ///
    /// Duplicate keys collapse onto their first occurrence.
    pub fn new(id: SessionId, keys: &[WorkerKey], now: u64) -> Self {
        let mut workers: Vec<WorkerState> = Vec::with_capacity(keys.len());
        for key in keys {
            if workers.iter().all(|w| &w.key != key) {
                workers.push(WorkerState::new(key.clone(), now));
            }
        }
        Self {
            id,
            phase: Phase::Idle,
            workers,
            last_update: now,
        }
    }

    pub fn workers(&self) -> &[WorkerState] {
        &self.workers
    }

    pub fn worker(&self, key: &WorkerKey) -> Option<&WorkerState> {
        self.workers.iter().find(|w| &w.key == key)
    }

    /// Find the slot currently bound to a channel identity
    pub fn worker_by_identity(&self, identity: &WorkerIdentity) -> Option<&WorkerState> {
        self.workers
            .iter()
            .find(|w| w.channel.as_ref() == Some(identity))
    }

    pub fn set_phase(&mut self, phase: Phase, now: u64) {
        self.phase = phase;
        self.last_update = now;
    }

    pub fn set_worker_status(
        &mut self,
        key: &WorkerKey,
        status: WorkerStatus,
        error: Option<String>,
        now: u64,
    ) -> Result<(), SessionError> {
        self.worker_mut(key)?.apply_status(status, error, now);
        self.last_update = now;
        Ok(())
    }

    pub fn set_worker_channel(
        &mut self,
        key: &WorkerKey,
        channel: Option<WorkerIdentity>,
        now: u64,
    ) -> Result<(), SessionError> {
        self.worker_mut(key)?.apply_channel(channel, now);
        self.last_update = now;
        Ok(())
    }

    /// Convert to the persisted record form
    pub fn serialize(&self) -> SessionRecord {
        SessionRecord {
            id: self.id.clone(),
            phase: self.phase,
            workers: self
                .workers
                .iter()
                .map(|w| (w.key.clone(), w.clone()))
                .collect(),
            last_update: self.last_update,
        }
    }

    /// Rebuild from a persisted record, keeping worker order
    pub fn deserialize(record: SessionRecord) -> Self {
        Self {
            id: record.id,
            phase: record.phase,
            workers: record.workers.into_iter().map(|(_, state)| state).collect(),
            last_update: record.last_update,
        }
    }

    fn worker_mut(&mut self, key: &WorkerKey) -> Result<&mut WorkerState, SessionError> {
        let id = &self.id;
        self.workers
            .iter_mut()
            .find(|w| &w.key == key)
            .ok_or_else(|| SessionError::UnknownWorker {
                session: id.clone(),
                worker: key.clone(),
            })
    }
}

/// Persisted form of a session, identical in both store tiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    pub phase: Phase,
    pub workers: Vec<(WorkerKey, WorkerState)>,
    pub last_update: u64,
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
