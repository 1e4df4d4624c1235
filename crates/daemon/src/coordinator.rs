// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator
//!
//! Owns every live [`SessionMachine`], the [`MessageRouter`] and the
//! [`LivenessManager`], and is the only place where a router failure is
//! turned into a recovery policy call. Recovery actions are handed back to
//! the caller; none are executed here.

use crate::protocol::SessionSummary;
use crate::settings::Settings;
use council_adapters::WorkerTransport;
use council_core::{
    kinds, safe_send_mode, CaptureReply, Clock, Envelope, FailureSignal, IdGen, Phase,
    RecoveryAction, SendMode, SessionError, SessionId, SessionRecord, StatusUpdate,
    WorkerIdentity, WorkerKey, WorkerKind, WorkerStatus,
};
use council_engine::{
    recovery, BroadcastOutcome, LivenessManager, MessageRouter, RouterError, RouterEvent,
    SessionMachine,
};
use council_storage::{StoreError, TieredStore};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("session not found: {0}")]
    NotFound(SessionId),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("worker {worker} in session {session} has no channel")]
    NotAttached {
        session: SessionId,
        worker: WorkerKey,
    },
    #[error("{0}")]
    Router(#[from] RouterError),
    /// The worker could not be reached; the disconnect has been recorded
    #[error("{source}")]
    Unreachable {
        #[source]
        source: RouterError,
        action: RecoveryAction,
    },
    #[error("capture from {worker} failed: {message}")]
    CaptureFailed { worker: WorkerKey, message: String },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CoordinatorError {
    pub fn action(&self) -> Option<&RecoveryAction> {
        match self {
            CoordinatorError::Unreachable { action, .. } => Some(action),
            _ => None,
        }
    }
}

/// Result of handing a prompt to a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub mode: SendMode,
    pub delivered: bool,
    pub warning: Option<String>,
}

/// Snapshot for the `status` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorStatus {
    pub uptime_secs: u64,
    pub sessions_active: usize,
    pub channels_open: usize,
    pub liveness_armed: bool,
}

pub struct Coordinator<T: WorkerTransport, C: Clock, I: IdGen> {
    settings: Settings,
    workers: Vec<WorkerKey>,
    store: TieredStore,
    router: MessageRouter<T>,
    liveness: LivenessManager<C>,
    sessions: BTreeMap<SessionId, SessionMachine<C>>,
    clock: C,
    id_gen: I,
    started: Instant,
}

impl<T: WorkerTransport, C: Clock, I: IdGen> Coordinator<T, C, I> {
    /// Wire the components. The returned receiver carries the router's events
    /// and must be fed back through [`handle_event`](Self::handle_event).
    pub fn new(
        settings: Settings,
        store: TieredStore,
        transport: T,
        clock: C,
        id_gen: I,
    ) -> (Self, mpsc::UnboundedReceiver<RouterEvent>) {
        let (router, events) = MessageRouter::new(transport, settings.request_timeout);
        let liveness =
            LivenessManager::new(store.clone(), clock.clone(), settings.keepalive_interval);
        let coordinator = Self {
            workers: settings.worker_keys(),
            settings,
            store,
            router,
            liveness,
            sessions: BTreeMap::new(),
            clock,
            id_gen,
            started: Instant::now(),
        };
        (coordinator, events)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn router(&self) -> &MessageRouter<T> {
        &self.router
    }

    pub fn liveness(&self) -> &LivenessManager<C> {
        &self.liveness
    }

    /// Restart hook: bring back every session the volatile tier knows,
    /// re-arm liveness for each, and reopen the channels they were bound to.
    pub async fn restore(&mut self) -> Result<RecoveryAction, CoordinatorError> {
        let restored = recovery::recover_all(&self.store, &self.clock, &self.liveness).await?;
        for machine in restored.sessions {
            self.sessions.entry(machine.id().clone()).or_insert(machine);
        }
        self.rebind_channels().await;
        Ok(restored.action)
    }

    pub async fn create_session(&mut self) -> SessionId {
        let machine = SessionMachine::create_session(
            &self.id_gen,
            &self.workers,
            self.store.clone(),
            self.clock.clone(),
        )
        .await;
        let id = machine.id().clone();
        self.liveness.start_session(&id);
        self.sessions.insert(id.clone(), machine);
        id
    }

    /// Current record, or `None` when neither tier has the session
    pub async fn get_session(
        &mut self,
        id: &SessionId,
    ) -> Result<Option<SessionRecord>, CoordinatorError> {
        match self.machine(id).await {
            Ok(machine) => Ok(Some(machine.session().serialize())),
            Err(CoordinatorError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list_sessions(&mut self) -> Result<Vec<SessionSummary>, CoordinatorError> {
        let ids = self.store.session_ids().await?;
        let active = self.liveness.active_sessions();
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            let machine = match self.machine(&id).await {
                Ok(machine) => machine,
                Err(e) => {
                    tracing::warn!(session_id = %id, error = %e, "skipping unreadable session");
                    continue;
                }
            };
            let session = machine.session();
            summaries.push(SessionSummary {
                id: session.id.clone(),
                phase: session.phase,
                active: active.contains(&session.id),
                workers_ready: session
                    .workers()
                    .iter()
                    .filter(|w| w.channel.is_some())
                    .count(),
                workers_total: session.workers().len(),
                last_update: session.last_update,
            });
        }
        Ok(summaries)
    }

    pub async fn status_update(
        &mut self,
        id: &SessionId,
        worker: &WorkerKey,
        status: WorkerStatus,
        error: Option<String>,
    ) -> Result<(), CoordinatorError> {
        self.machine(id)
            .await?
            .set_worker_status(worker, status, error)
            .await?;
        Ok(())
    }

    pub async fn set_phase(&mut self, id: &SessionId, phase: Phase) -> Result<(), CoordinatorError> {
        self.machine(id).await?.set_phase(phase).await;
        Ok(())
    }

    /// Open the long-lived channel to `identity` and bind it to a worker slot
    pub async fn attach_worker(
        &mut self,
        id: &SessionId,
        worker: &WorkerKey,
        identity: WorkerIdentity,
    ) -> Result<(), CoordinatorError> {
        self.slot(id, worker).await?;
        if let Err(e) = self.router.connect(&identity).await {
            return Err(self.worker_failure(id, worker, e).await);
        }
        self.machine(id)
            .await?
            .set_worker_channel(worker, Some(identity))
            .await?;
        Ok(())
    }

    /// Ask a worker for its captured text
    pub async fn capture(
        &mut self,
        id: &SessionId,
        worker: &WorkerKey,
    ) -> Result<String, CoordinatorError> {
        let identity = self.bound_identity(id, worker).await?;
        let envelope = Envelope::new(
            kinds::CAPTURE,
            json!({ "sessionId": id, "worker": worker }),
        );
        let ack = match self.router.send_with_ack(&identity, envelope, None).await {
            Ok(ack) => ack,
            Err(e) => return Err(self.worker_failure(id, worker, e).await),
        };

        let reply: CaptureReply = ack.decode().map_err(|e| CoordinatorError::CaptureFailed {
            worker: worker.clone(),
            message: format!("malformed capture reply: {}", e),
        })?;
        match reply {
            CaptureReply {
                error: Some(message),
                ..
            } => Err(CoordinatorError::CaptureFailed {
                worker: worker.clone(),
                message,
            }),
            CaptureReply {
                text: Some(text), ..
            } => {
                tracing::info!(session_id = %id, %worker, len = text.len(), "captured");
                Ok(text)
            }
            CaptureReply { .. } => Err(CoordinatorError::CaptureFailed {
                worker: worker.clone(),
                message: "empty capture".to_string(),
            }),
        }
    }

    /// Hand a prompt to a worker in the safest send mode its platform allows.
    ///
    /// In manual mode nothing is sent; the slot waits for the user to paste.
    pub async fn dispatch(
        &mut self,
        id: &SessionId,
        worker: &WorkerKey,
        prompt: String,
        preferred: Option<SendMode>,
    ) -> Result<Dispatch, CoordinatorError> {
        let kind = WorkerKind::for_key(worker);
        let mode = safe_send_mode(kind, preferred.unwrap_or(self.settings.send_mode));
        let warning = kind.automation_warning();

        if mode == SendMode::Manual {
            self.slot(id, worker).await?;
            self.machine(id)
                .await?
                .set_worker_status(worker, WorkerStatus::AwaitingDispatch, None)
                .await?;
            return Ok(Dispatch {
                mode,
                delivered: false,
                warning,
            });
        }

        let identity = self.bound_identity(id, worker).await?;
        let envelope = Envelope::new(
            kinds::PREPARE_PROMPT,
            json!({ "sessionId": id, "prompt": prompt, "mode": mode }),
        );
        if let Err(e) = self.router.send_with_ack(&identity, envelope, None).await {
            return Err(self.worker_failure(id, worker, e).await);
        }

        let status = match mode {
            SendMode::Automated => WorkerStatus::Dispatching,
            _ => WorkerStatus::InputReady,
        };
        self.machine(id)
            .await?
            .set_worker_status(worker, status, None)
            .await?;
        Ok(Dispatch {
            mode,
            delivered: true,
            warning,
        })
    }

    /// Classify a failure reported from outside and apply the policy
    pub async fn report_failure(
        &mut self,
        id: &SessionId,
        worker: Option<&WorkerKey>,
        signal: FailureSignal,
    ) -> Result<RecoveryAction, CoordinatorError> {
        if signal == FailureSignal::CoordinatorRestarted {
            return self.restore().await;
        }
        let machine = self.machine(id).await?;
        Ok(recovery::apply(recovery::plan(signal, worker), machine).await)
    }

    pub async fn broadcast(
        &self,
        kind: String,
        payload: serde_json::Value,
    ) -> Result<Vec<BroadcastOutcome>, CoordinatorError> {
        Ok(self
            .router
            .broadcast(Envelope::new(kind, payload), None)
            .await?)
    }

    /// Stop liveness tracking; the session stays in the store
    pub async fn end_session(&mut self, id: &SessionId) -> Result<(), CoordinatorError> {
        self.machine(id).await?;
        self.liveness.stop_session(id);
        tracing::info!(session_id = %id, "session ended");
        Ok(())
    }

    /// Remove a session from both tiers and close channels nothing else uses
    pub async fn delete_session(&mut self, id: &SessionId) -> Result<(), CoordinatorError> {
        self.machine(id).await?;
        let machine = self
            .sessions
            .remove(id)
            .ok_or_else(|| CoordinatorError::NotFound(id.clone()))?;

        self.liveness.stop_session(id);
        SessionMachine::<C>::delete(&self.store, id).await?;
        for identity in machine.session().workers().iter().filter_map(|w| w.channel.as_ref()) {
            if self.bindings_of(identity).is_empty() {
                self.router.disconnect(identity);
            }
        }
        Ok(())
    }

    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            uptime_secs: self.started.elapsed().as_secs(),
            sessions_active: self.liveness.active_sessions().len(),
            channels_open: self.router.connected_identities().len(),
            liveness_armed: self.liveness.is_armed(),
        }
    }

    /// No armed liveness timer and no open worker channel
    pub fn is_idle(&self) -> bool {
        !self.liveness.is_armed() && self.router.connected_identities().is_empty()
    }

    /// React to something a worker channel did
    pub async fn handle_event(&mut self, event: RouterEvent) {
        match event {
            RouterEvent::Message { identity, envelope } => {
                if envelope.kind == kinds::STATUS_UPDATE {
                    self.on_status_update(&identity, &envelope).await;
                } else {
                    tracing::debug!(%identity, kind = %envelope.kind, "unhandled worker message");
                }
            }
            RouterEvent::ChannelClosed {
                identity,
                generation,
            } => {
                if self.router.has_channel(&identity) {
                    tracing::debug!(%identity, generation, "replaced channel closed");
                    return;
                }
                for (id, key) in self.bindings_of(&identity) {
                    if let Some(machine) = self.sessions.get_mut(&id) {
                        let action = recovery::apply(
                            recovery::plan(FailureSignal::WorkerDisconnected, Some(&key)),
                            machine,
                        )
                        .await;
                        tracing::info!(
                            session_id = %id,
                            worker = %key,
                            action = ?action.action,
                            "worker channel lost"
                        );
                    }
                }
            }
        }
    }

    /// Close channels and write every live session to both tiers
    pub async fn shutdown(&mut self) {
        self.router.shutdown();
        for machine in self.sessions.values() {
            if let Err(e) = machine.flush().await {
                tracing::warn!(session_id = %machine.id(), error = %e, "final flush failed");
            }
        }
    }

    async fn on_status_update(&mut self, identity: &WorkerIdentity, envelope: &Envelope) {
        let update: StatusUpdate = match envelope.decode() {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(%identity, error = %e, "malformed status update dropped");
                return;
            }
        };

        let target = match &update.session_id {
            Some(id) => match self.machine(id).await {
                Ok(machine) => machine
                    .session()
                    .worker_by_identity(identity)
                    .map(|w| (id.clone(), w.key.clone())),
                Err(e) => {
                    tracing::warn!(%identity, session_id = %id, error = %e, "status update for unknown session dropped");
                    return;
                }
            },
            None => self.bindings_of(identity).into_iter().next(),
        };
        let Some((id, key)) = target else {
            tracing::warn!(%identity, "status update from unbound worker dropped");
            return;
        };

        if let Some(machine) = self.sessions.get_mut(&id) {
            if let Err(e) = machine
                .set_worker_status(&key, update.status, update.error)
                .await
            {
                tracing::warn!(error = %e, "status update rejected");
            }
        }
    }

    /// Reopen channels recorded in restored sessions; a worker that cannot
    /// be reached is marked disconnected.
    async fn rebind_channels(&mut self) {
        let bound: Vec<(SessionId, WorkerKey, WorkerIdentity)> = self
            .sessions
            .values()
            .flat_map(|m| {
                m.session().workers().iter().filter_map(|w| {
                    w.channel
                        .clone()
                        .map(|identity| (m.id().clone(), w.key.clone(), identity))
                })
            })
            .collect();

        for (id, key, identity) in bound {
            if self.router.has_channel(&identity) {
                continue;
            }
            if let Err(e) = self.router.connect(&identity).await {
                tracing::warn!(session_id = %id, worker = %key, error = %e, "channel not restored");
                if let Some(machine) = self.sessions.get_mut(&id) {
                    recovery::apply(
                        recovery::plan(FailureSignal::WorkerDisconnected, Some(&key)),
                        machine,
                    )
                    .await;
                }
            }
        }
    }

    /// Turn a router failure into a policy call when the worker is gone
    async fn worker_failure(
        &mut self,
        id: &SessionId,
        worker: &WorkerKey,
        error: RouterError,
    ) -> CoordinatorError {
        if !error.is_unreachable() {
            return CoordinatorError::Router(error);
        }
        let action = match self.sessions.get_mut(id) {
            Some(machine) => {
                recovery::apply(
                    recovery::plan(FailureSignal::WorkerDisconnected, Some(worker)),
                    machine,
                )
                .await
            }
            None => RecoveryAction::unrecoverable(),
        };
        CoordinatorError::Unreachable {
            source: error,
            action,
        }
    }

    /// Every live (session, worker) slot bound to `identity`
    fn bindings_of(&self, identity: &WorkerIdentity) -> Vec<(SessionId, WorkerKey)> {
        self.sessions
            .values()
            .filter_map(|m| {
                m.session()
                    .worker_by_identity(identity)
                    .map(|w| (m.id().clone(), w.key.clone()))
            })
            .collect()
    }

    async fn bound_identity(
        &mut self,
        id: &SessionId,
        worker: &WorkerKey,
    ) -> Result<WorkerIdentity, CoordinatorError> {
        self.slot(id, worker)
            .await?
            .ok_or_else(|| CoordinatorError::NotAttached {
                session: id.clone(),
                worker: worker.clone(),
            })
    }

    /// Check the slot exists and return its channel handle
    async fn slot(
        &mut self,
        id: &SessionId,
        worker: &WorkerKey,
    ) -> Result<Option<WorkerIdentity>, CoordinatorError> {
        let machine = self.machine(id).await?;
        machine
            .session()
            .worker(worker)
            .map(|w| w.channel.clone())
            .ok_or_else(|| {
                CoordinatorError::Session(SessionError::UnknownWorker {
                    session: id.clone(),
                    worker: worker.clone(),
                })
            })
    }

    /// Live machine for `id`, loading it from the store on first use
    async fn machine(&mut self, id: &SessionId) -> Result<&mut SessionMachine<C>, CoordinatorError> {
        if !self.sessions.contains_key(id) {
            let machine = SessionMachine::recover(id, self.store.clone(), self.clock.clone())
                .await?
                .ok_or_else(|| CoordinatorError::NotFound(id.clone()))?;
            self.sessions.insert(id.clone(), machine);
        }
        self.sessions
            .get_mut(id)
            .ok_or_else(|| CoordinatorError::NotFound(id.clone()))
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
