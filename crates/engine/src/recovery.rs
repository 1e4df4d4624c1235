// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery policy
//!
//! [`plan`] is a pure mapping from a failure signal to the worker mutation it
//! implies and the action to hand back. [`apply`] carries out the mutation on
//! a live session. [`recover_all`] handles a coordinator restart. No signal
//! ever deletes a session, and actions are only returned, never executed here.

use crate::liveness::LivenessManager;
use crate::machine::SessionMachine;
use council_core::{
    Clock, FailureSignal, RecoveryAction, RecoveryKind, SessionError, SideEffect, WorkerKey,
    WorkerStatus,
};
use council_storage::{StoreError, TieredStore};

/// Status change a plan applies to one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerMutation {
    pub key: WorkerKey,
    pub status: WorkerStatus,
    pub error: Option<String>,
}

/// Outcome of planning for one signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryPlan {
    pub mutation: Option<WorkerMutation>,
    pub action: RecoveryAction,
    /// Every session in the volatile tier should be restored
    pub rehydrate: bool,
}

impl RecoveryPlan {
    fn action_only(action: RecoveryAction) -> Self {
        Self {
            mutation: None,
            action,
            rehydrate: false,
        }
    }
}

/// Decide what a failure means, without touching any state
pub fn plan(signal: FailureSignal, worker: Option<&WorkerKey>) -> RecoveryPlan {
    if signal == FailureSignal::CoordinatorRestarted {
        return RecoveryPlan {
            mutation: None,
            action: RecoveryAction::recoverable(
                RecoveryKind::ResumeSession,
                "Recovering sessions after restart",
            ),
            rehydrate: true,
        };
    }

    let key = match worker {
        Some(key) if signal.requires_worker() => key,
        _ => return RecoveryPlan::action_only(RecoveryAction::unrecoverable()),
    };

    let (status, error, action) = match signal {
        FailureSignal::WorkerDisconnected => (
            WorkerStatus::NotConnected,
            "disconnected",
            RecoveryAction::recoverable(
                RecoveryKind::ReopenWorker,
                format!("{} disconnected. Reopen it to continue.", key),
            ),
        ),
        FailureSignal::UiIncompatible => (
            WorkerStatus::Error,
            "ui incompatible",
            RecoveryAction::recoverable(
                RecoveryKind::FallbackManual,
                format!("{} UI changed. Copy the prompt manually.", key),
            )
            .with_side_effect(SideEffect::CopyToClipboard),
        ),
        FailureSignal::RateLimited => (
            WorkerStatus::Error,
            "rate limited",
            RecoveryAction::recoverable(
                RecoveryKind::Retry,
                format!(
                    "{} is rate limited. Wait and retry, or proceed without it.",
                    key
                ),
            ),
        ),
        FailureSignal::CoordinatorRestarted | FailureSignal::Unknown => {
            return RecoveryPlan::action_only(RecoveryAction::unrecoverable())
        }
    };

    RecoveryPlan {
        mutation: Some(WorkerMutation {
            key: key.clone(),
            status,
            error: Some(error.to_string()),
        }),
        action,
        rehydrate: false,
    }
}

/// Apply a plan's worker mutation to a session and return its action.
///
/// A worker the session does not have turns the action into a manual
/// fallback.
pub async fn apply<C: Clock>(plan: RecoveryPlan, machine: &mut SessionMachine<C>) -> RecoveryAction {
    let Some(mutation) = plan.mutation else {
        return plan.action;
    };
    match machine
        .set_worker_status(&mutation.key, mutation.status, mutation.error)
        .await
    {
        Ok(()) => {
            tracing::info!(
                session_id = %machine.id(),
                worker = %mutation.key,
                status = %mutation.status,
                action = ?plan.action.action,
                "recovery applied"
            );
            plan.action
        }
        Err(SessionError::UnknownWorker { session, worker }) => {
            tracing::warn!(session_id = %session, %worker, "recovery for unknown worker");
            RecoveryAction::unrecoverable()
        }
    }
}

/// Sessions restored after a coordinator restart
pub struct Restored<C: Clock> {
    pub sessions: Vec<SessionMachine<C>>,
    pub action: RecoveryAction,
}

/// Restore every session the volatile tier knows and re-arm liveness for each.
///
/// A session whose record cannot be decoded is skipped with a warning.
pub async fn recover_all<C: Clock>(
    store: &TieredStore,
    clock: &C,
    liveness: &LivenessManager<C>,
) -> Result<Restored<C>, StoreError> {
    let ids = store.session_ids().await?;
    let mut sessions = Vec::with_capacity(ids.len());
    for id in ids {
        match SessionMachine::recover(&id, store.clone(), clock.clone()).await {
            Ok(Some(machine)) => {
                liveness.start_session(machine.id());
                sessions.push(machine);
            }
            Ok(None) => tracing::debug!(session_id = %id, "session vanished during recovery"),
            Err(e) => tracing::warn!(session_id = %id, error = %e, "session not recoverable"),
        }
    }

    let count = sessions.len();
    tracing::info!(count, "sessions recovered after restart");
    Ok(Restored {
        sessions,
        action: RecoveryAction::recoverable(
            RecoveryKind::ResumeSession,
            format!("Recovered {} session(s)", count),
        ),
    })
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
