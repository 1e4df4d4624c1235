// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake worker transport for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{TransportError, WorkerLink, WorkerTransport};
use async_trait::async_trait;
use council_core::{Envelope, WorkerIdentity};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Recorded transport call
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Open { identity: WorkerIdentity },
    Deliver { identity: WorkerIdentity, kind: String },
    Identities,
}

/// How a fake worker answers a one-shot delivery
#[derive(Debug, Clone, PartialEq)]
pub enum FakeReply {
    /// Reply immediately with an ack carrying this payload
    Ack(Value),
    /// Send the ack on the worker's open channel instead
    AckOnChannel(Value),
    /// Accept the envelope and never answer
    Silent,
}

#[derive(Debug)]
struct FakeWorker {
    reachable: bool,
    reply: FakeReply,
    delivered: Vec<Envelope>,
    /// Sender feeding the coordinator's side of an open channel
    inbound: Option<mpsc::UnboundedSender<Envelope>>,
    /// Receiver of what the coordinator posted on the open channel
    outbound: Option<mpsc::UnboundedReceiver<Envelope>>,
    posted: Vec<Envelope>,
}

impl FakeWorker {
    fn new() -> Self {
        Self {
            reachable: true,
            reply: FakeReply::Ack(Value::Object(Default::default())),
            delivered: Vec::new(),
            inbound: None,
            outbound: None,
            posted: Vec::new(),
        }
    }

    fn drain_posted(&mut self) {
        if let Some(rx) = self.outbound.as_mut() {
            while let Ok(envelope) = rx.try_recv() {
                self.posted.push(envelope);
            }
        }
    }
}

/// In-process transport whose workers are scripted by the test
#[derive(Clone, Default)]
pub struct FakeTransport {
    workers: Arc<Mutex<BTreeMap<WorkerIdentity, FakeWorker>>>,
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reachable worker that acks everything with `{}`
    pub fn add_worker(&self, identity: impl Into<WorkerIdentity>) {
        self.workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identity.into(), FakeWorker::new());
    }

    pub fn set_reply(&self, identity: &WorkerIdentity, reply: FakeReply) {
        if let Some(worker) = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(identity)
        {
            worker.reply = reply;
        }
    }

    /// Make the worker fail every `open` and `deliver`
    pub fn set_unreachable(&self, identity: &WorkerIdentity, unreachable: bool) {
        if let Some(worker) = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(identity)
        {
            worker.reachable = !unreachable;
        }
    }

    /// Send an envelope from the worker on its open channel.
    ///
    /// Returns false if no channel is open.
    pub fn push(&self, identity: &WorkerIdentity, envelope: Envelope) -> bool {
        let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        workers
            .get(identity)
            .and_then(|w| w.inbound.as_ref())
            .map(|tx| tx.send(envelope).is_ok())
            .unwrap_or(false)
    }

    /// Drop the worker's end of its open channel
    pub fn disconnect(&self, identity: &WorkerIdentity) {
        if let Some(worker) = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(identity)
        {
            worker.drain_posted();
            worker.inbound = None;
            worker.outbound = None;
        }
    }

    /// Whether the coordinator side of the worker's channel is still held
    pub fn is_open(&self, identity: &WorkerIdentity) -> bool {
        let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        workers
            .get(identity)
            .and_then(|w| w.inbound.as_ref())
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Envelopes delivered one-shot to the worker
    pub fn delivered(&self, identity: &WorkerIdentity) -> Vec<Envelope> {
        let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        workers
            .get(identity)
            .map(|w| w.delivered.clone())
            .unwrap_or_default()
    }

    /// Envelopes the coordinator posted on the worker's channel
    pub fn posted(&self, identity: &WorkerIdentity) -> Vec<Envelope> {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        match workers.get_mut(identity) {
            Some(worker) => {
                worker.drain_posted();
                worker.posted.clone()
            }
            None => Vec::new(),
        }
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: TransportCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

#[async_trait]
impl WorkerTransport for FakeTransport {
    async fn open(&self, identity: &WorkerIdentity) -> Result<WorkerLink, TransportError> {
        self.record(TransportCall::Open {
            identity: identity.clone(),
        });

        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        let worker = match workers.get_mut(identity) {
            Some(worker) if worker.reachable => worker,
            _ => return Err(TransportError::unreachable(identity, "no such worker")),
        };

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        worker.drain_posted();
        worker.inbound = Some(in_tx);
        worker.outbound = Some(out_rx);

        Ok(WorkerLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    async fn deliver(
        &self,
        identity: &WorkerIdentity,
        envelope: &Envelope,
    ) -> Result<Option<Envelope>, TransportError> {
        self.record(TransportCall::Deliver {
            identity: identity.clone(),
            kind: envelope.kind.clone(),
        });

        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        let worker = match workers.get_mut(identity) {
            Some(worker) if worker.reachable => worker,
            _ => return Err(TransportError::unreachable(identity, "no such worker")),
        };
        worker.delivered.push(envelope.clone());

        match &worker.reply {
            FakeReply::Ack(payload) => Ok(Some(Envelope::ack(
                &envelope.correlation_id,
                payload.clone(),
            ))),
            FakeReply::AckOnChannel(payload) => {
                let ack = Envelope::ack(&envelope.correlation_id, payload.clone());
                if let Some(tx) = worker.inbound.as_ref() {
                    let _ = tx.send(ack);
                }
                Ok(None)
            }
            FakeReply::Silent => Ok(None),
        }
    }

    async fn identities(&self) -> Result<Vec<WorkerIdentity>, TransportError> {
        self.record(TransportCall::Identities);
        let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        Ok(workers.keys().cloned().collect())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
