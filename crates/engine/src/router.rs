// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message router
//!
//! Owns the long-lived channels to workers and the table of requests waiting
//! for an acknowledgment.
//!
//! Each open channel has a pump task reading the worker's envelopes. Acks are
//! matched against the pending table right there, so a caller awaiting an ack
//! never depends on whoever consumes [`RouterEvent`]s. Everything else is
//! forwarded as a [`RouterEvent::Message`]; the end of a channel becomes a
//! [`RouterEvent::ChannelClosed`].

use crate::error::RouterError;
use council_adapters::{WorkerLink, WorkerTransport};
use council_core::{CorrelationId, Envelope, WorkerIdentity};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

/// How long `send_with_ack` waits when the caller gives no timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Correlation ids remembered after expiry so their late acks drop quietly
const EXPIRED_MEMORY: usize = 256;

/// Notifications for the router's owner
#[derive(Debug, Clone, PartialEq)]
pub enum RouterEvent {
    /// A non-ack envelope arrived on a channel
    Message {
        identity: WorkerIdentity,
        envelope: Envelope,
    },
    /// A channel ended, by teardown or by the worker going away
    ChannelClosed {
        identity: WorkerIdentity,
        generation: u64,
    },
}

/// Result of one branch of a broadcast
#[derive(Debug)]
pub struct BroadcastOutcome {
    pub identity: WorkerIdentity,
    pub result: Result<Envelope, RouterError>,
}

struct Channel {
    generation: u64,
    outbound: mpsc::UnboundedSender<Envelope>,
    pump: JoinHandle<()>,
}

struct Pending {
    identity: WorkerIdentity,
    created_at: Instant,
    deadline: Instant,
    sink: oneshot::Sender<Envelope>,
}

#[derive(Default)]
struct RouterState {
    channels: HashMap<WorkerIdentity, Channel>,
    pending: HashMap<CorrelationId, Pending>,
    expired: VecDeque<CorrelationId>,
    next_generation: u64,
}

impl RouterState {
    fn remember_expired(&mut self, id: CorrelationId) {
        if self.expired.len() == EXPIRED_MEMORY {
            self.expired.pop_front();
        }
        self.expired.push_back(id);
    }
}

/// Routes envelopes to workers over a [`WorkerTransport`]. Cheap to clone.
pub struct MessageRouter<T> {
    transport: T,
    state: Arc<Mutex<RouterState>>,
    events: mpsc::UnboundedSender<RouterEvent>,
    default_timeout: Duration,
}

impl<T: Clone> Clone for MessageRouter<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            default_timeout: self.default_timeout,
        }
    }
}

impl<T: WorkerTransport> MessageRouter<T> {
    /// Create a router and the receiving end of its event stream
    pub fn new(
        transport: T,
        default_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<RouterEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let router = Self {
            transport,
            state: Arc::new(Mutex::new(RouterState::default())),
            events,
            default_timeout,
        };
        (router, rx)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Open the long-lived channel to `identity`, tearing down any prior one.
    ///
    /// Returns the new channel's generation.
    pub async fn connect(&self, identity: &WorkerIdentity) -> Result<u64, RouterError> {
        self.disconnect(identity);

        let WorkerLink { outbound, inbound } = self
            .transport
            .open(identity)
            .await
            .map_err(|e| RouterError::Connect(identity.clone(), e))?;

        let mut state = self.lock();
        // A concurrent connect may have won while we were opening
        if let Some(previous) = state.channels.remove(identity) {
            previous.pump.abort();
            let _ = self.events.send(RouterEvent::ChannelClosed {
                identity: identity.clone(),
                generation: previous.generation,
            });
        }
        state.next_generation += 1;
        let generation = state.next_generation;
        let pump = tokio::spawn(pump(
            identity.clone(),
            generation,
            inbound,
            Arc::clone(&self.state),
            self.events.clone(),
        ));
        state.channels.insert(
            identity.clone(),
            Channel {
                generation,
                outbound,
                pump,
            },
        );
        tracing::info!(%identity, generation, "channel open");
        Ok(generation)
    }

    /// Tear down the channel to `identity`. Returns false if none was open.
    pub fn disconnect(&self, identity: &WorkerIdentity) -> bool {
        let removed = self.lock().channels.remove(identity);
        match removed {
            Some(channel) => {
                channel.pump.abort();
                tracing::info!(%identity, generation = channel.generation, "channel closed");
                let _ = self.events.send(RouterEvent::ChannelClosed {
                    identity: identity.clone(),
                    generation: channel.generation,
                });
                true
            }
            None => false,
        }
    }

    pub fn has_channel(&self, identity: &WorkerIdentity) -> bool {
        self.lock().channels.contains_key(identity)
    }

    /// Generation of the open channel to `identity`
    pub fn channel_generation(&self, identity: &WorkerIdentity) -> Option<u64> {
        self.lock().channels.get(identity).map(|c| c.generation)
    }

    pub fn connected_identities(&self) -> Vec<WorkerIdentity> {
        let mut identities: Vec<_> = self.lock().channels.keys().cloned().collect();
        identities.sort();
        identities
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Post on the open channel without waiting for an ack.
    ///
    /// Returns false if no channel is open or it has already gone away.
    pub fn send_via_channel(&self, identity: &WorkerIdentity, envelope: Envelope) -> bool {
        let state = self.lock();
        match state.channels.get(identity) {
            Some(channel) => channel.outbound.send(envelope).is_ok(),
            None => {
                tracing::debug!(%identity, "no open channel");
                false
            }
        }
    }

    /// Deliver `envelope` and wait for its ack.
    ///
    /// A fresh correlation id is assigned. Resolves with the ack, fails at
    /// once if delivery fails, or fails with a timeout once the deadline
    /// passes. An ack arriving after that is dropped.
    pub async fn send_with_ack(
        &self,
        identity: &WorkerIdentity,
        mut envelope: Envelope,
        timeout: Option<Duration>,
    ) -> Result<Envelope, RouterError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let correlation_id = CorrelationId::generate();
        envelope.correlation_id = correlation_id.clone();
        envelope.needs_ack = true;

        let (sink, rx) = oneshot::channel();
        let created_at = Instant::now();
        let deadline = created_at + timeout;
        self.lock().pending.insert(
            correlation_id.clone(),
            Pending {
                identity: identity.clone(),
                created_at,
                deadline,
                sink,
            },
        );
        tracing::debug!(%identity, %correlation_id, kind = %envelope.kind, "awaiting ack");

        // The deadline bounds the delivery too; a reply after it is late
        let delivery =
            tokio::time::timeout_at(deadline, self.transport.deliver(identity, &envelope)).await;
        match delivery {
            Ok(Ok(Some(reply))) => self.accept(identity, reply),
            Ok(Ok(None)) | Err(_) => {}
            Ok(Err(source)) => {
                self.lock().pending.remove(&correlation_id);
                return Err(RouterError::Delivery {
                    identity: identity.clone(),
                    source,
                });
            }
        }

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(ack)) => Ok(ack),
            // The sink is dropped when an ack shows up past the deadline
            Ok(Err(_)) if Instant::now() < deadline => Err(RouterError::Cancelled(correlation_id)),
            Ok(Err(_)) | Err(_) => {
                let mut state = self.lock();
                if state.pending.remove(&correlation_id).is_some() {
                    state.remember_expired(correlation_id.clone());
                }
                drop(state);
                tracing::warn!(%identity, %correlation_id, ?timeout, "ack timed out");
                Err(RouterError::Timeout {
                    identity: identity.clone(),
                    correlation_id,
                    after: timeout,
                })
            }
        }
    }

    /// `send_with_ack` to every known worker; every branch settles on its own
    pub async fn broadcast(
        &self,
        envelope: Envelope,
        timeout: Option<Duration>,
    ) -> Result<Vec<BroadcastOutcome>, RouterError> {
        let mut targets: BTreeSet<WorkerIdentity> = self
            .transport
            .identities()
            .await
            .map_err(RouterError::Enumerate)?
            .into_iter()
            .collect();
        targets.extend(self.connected_identities());
        tracing::info!(kind = %envelope.kind, targets = targets.len(), "broadcast");

        let mut branches = JoinSet::new();
        for identity in targets.iter().cloned() {
            let router = self.clone();
            let envelope = envelope.clone();
            branches.spawn(async move {
                let result = router.send_with_ack(&identity, envelope, timeout).await;
                BroadcastOutcome { identity, result }
            });
        }

        let mut outcomes = Vec::with_capacity(targets.len());
        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!(error = %e, "broadcast branch aborted"),
            }
        }
        outcomes.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(outcomes)
    }

    /// Fail every pending request and close every channel
    pub fn shutdown(&self) {
        let mut state = self.lock();
        let pending = state.pending.len();
        state.pending.clear();
        for (identity, channel) in state.channels.drain() {
            channel.pump.abort();
            let _ = self.events.send(RouterEvent::ChannelClosed {
                identity,
                generation: channel.generation,
            });
        }
        tracing::info!(pending, "router shut down");
    }

    /// Route an envelope that arrived outside any channel
    fn accept(&self, identity: &WorkerIdentity, envelope: Envelope) {
        dispatch(identity, envelope, &self.state, &self.events);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Read a channel until it ends, then report the close
async fn pump(
    identity: WorkerIdentity,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<Envelope>,
    state: Arc<Mutex<RouterState>>,
    events: mpsc::UnboundedSender<RouterEvent>,
) {
    while let Some(envelope) = inbound.recv().await {
        dispatch(&identity, envelope, &state, &events);
    }

    let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
    let current = guard
        .channels
        .get(&identity)
        .is_some_and(|c| c.generation == generation);
    if current {
        guard.channels.remove(&identity);
    }
    drop(guard);

    if current {
        tracing::info!(%identity, generation, "channel ended by worker");
        let _ = events.send(RouterEvent::ChannelClosed {
            identity,
            generation,
        });
    }
}

/// Resolve an ack against the pending table, or forward anything else
fn dispatch(
    identity: &WorkerIdentity,
    envelope: Envelope,
    state: &Mutex<RouterState>,
    events: &mpsc::UnboundedSender<RouterEvent>,
) {
    if !envelope.is_ack() {
        tracing::debug!(%identity, kind = %envelope.kind, "inbound message");
        let _ = events.send(RouterEvent::Message {
            identity: identity.clone(),
            envelope,
        });
        return;
    }

    let Some(original) = envelope.acknowledges() else {
        tracing::warn!(%identity, "ack without originalCorrelationId dropped");
        return;
    };

    let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
    match guard.pending.remove(&original) {
        Some(pending) if Instant::now() >= pending.deadline => {
            // Dropping the sink wakes the waiter, which reports the timeout
            guard.remember_expired(original.clone());
            drop(guard);
            tracing::debug!(%identity, correlation_id = %original, "ack past deadline dropped");
        }
        Some(pending) => {
            drop(guard);
            let waited = pending.created_at.elapsed();
            tracing::debug!(
                %identity,
                correlation_id = %original,
                requested_of = %pending.identity,
                waited_ms = waited.as_millis() as u64,
                "ack received"
            );
            let _ = pending.sink.send(envelope);
        }
        None if guard.expired.contains(&original) => {
            tracing::debug!(%identity, correlation_id = %original, "late ack dropped");
        }
        None => {
            tracing::warn!(%identity, correlation_id = %original, "ack for unknown request dropped");
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
