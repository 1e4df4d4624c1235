// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness manager
//!
//! Keeps a registry of active sessions and exactly one recurring timer while
//! the registry is non-empty. Each tick refreshes the heartbeat marker in the
//! volatile tier and drops sessions the store no longer knows about.

use council_core::{Clock, SessionId};
use council_storage::TieredStore;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Tick interval when none is configured
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Shortest interval the timer will run at
pub const MIN_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct LivenessState {
    active: BTreeSet<SessionId>,
    timer: Option<Timer>,
    timer_generation: u64,
    ticks: u64,
}

/// Process-wide liveness registry. Cheap to clone; clones share state.
pub struct LivenessManager<C> {
    state: Arc<Mutex<LivenessState>>,
    store: TieredStore,
    clock: C,
    interval: Duration,
}

impl<C: Clone> Clone for LivenessManager<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            store: self.store.clone(),
            clock: self.clock.clone(),
            interval: self.interval,
        }
    }
}

impl<C: Clock> LivenessManager<C> {
    pub fn new(store: TieredStore, clock: C, interval: Duration) -> Self {
        let interval = interval.max(MIN_KEEPALIVE_INTERVAL);
        Self {
            state: Arc::new(Mutex::new(LivenessState::default())),
            store,
            clock,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Track a session, arming the timer if none is running
    pub fn start_session(&self, id: &SessionId) {
        let mut state = self.lock();
        let added = state.active.insert(id.clone());
        if state.timer.is_none() {
            state.timer_generation += 1;
            let generation = state.timer_generation;
            let handle = tokio::spawn(self.clone().run(generation));
            state.timer = Some(Timer { generation, handle });
            tracing::info!(interval = ?self.interval, "liveness timer armed");
        }
        if added {
            tracing::debug!(session_id = %id, active = state.active.len(), "session active");
        }
    }

    /// Stop tracking a session, disarming the timer when none remain
    pub fn stop_session(&self, id: &SessionId) {
        let mut state = self.lock();
        if state.active.remove(id) {
            tracing::debug!(session_id = %id, active = state.active.len(), "session inactive");
        }
        if state.active.is_empty() {
            disarm(&mut state);
        }
    }

    pub fn active_sessions(&self) -> Vec<SessionId> {
        self.lock().active.iter().cloned().collect()
    }

    pub fn has_active_sessions(&self) -> bool {
        !self.lock().active.is_empty()
    }

    pub fn is_armed(&self) -> bool {
        self.lock().timer.is_some()
    }

    /// Ticks completed since creation
    pub fn tick_count(&self) -> u64 {
        self.lock().ticks
    }

    /// One timer firing: heartbeat, then reconcile against the store
    pub async fn tick(&self) {
        if !self.has_active_sessions() {
            return;
        }

        if let Err(e) = self.store.heartbeat(self.clock.epoch_ms()).await {
            tracing::warn!(error = %e, "heartbeat write failed");
        }

        // Sessions started while the listing is in flight are not judged by it
        let checked: BTreeSet<SessionId> = self.lock().active.clone();
        let known: BTreeSet<SessionId> = match self.store.session_ids().await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                tracing::warn!(error = %e, "reconcile skipped, session listing failed");
                self.lock().ticks += 1;
                return;
            }
        };

        let mut state = self.lock();
        state.ticks += 1;
        let before = state.active.len();
        state
            .active
            .retain(|id| !checked.contains(id) || known.contains(id));
        let dropped = before - state.active.len();
        if dropped > 0 {
            tracing::info!(dropped, active = state.active.len(), "dropped sessions missing from store");
        }
        if state.active.is_empty() {
            disarm(&mut state);
        }
    }

    async fn run(self, generation: u64) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval fires immediately; the first heartbeat is due one period in
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let current = self
                .lock()
                .timer
                .as_ref()
                .is_some_and(|t| t.generation == generation);
            if !current {
                return;
            }
            self.tick().await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LivenessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn disarm(state: &mut LivenessState) {
    if let Some(timer) = state.timer.take() {
        timer.handle.abort();
        tracing::info!("liveness timer disarmed");
    }
}

#[cfg(test)]
#[path = "liveness_tests.rs"]
mod tests;
