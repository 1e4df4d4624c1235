// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker transport
//!
//! A transport reaches worker endpoints by identity. It offers two paths: a
//! long-lived bidirectional channel (`open`) and a one-shot delivery
//! (`deliver`) that may carry an immediate reply.

mod frame;
mod socket;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use frame::{read_frame, write_frame, MAX_FRAME_LEN};
pub use socket::UnixSocketTransport;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeReply, FakeTransport, TransportCall};

use async_trait::async_trait;
use council_core::{Envelope, WorkerIdentity};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from worker transports
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("worker {identity} unreachable: {reason}")]
    Unreachable {
        identity: WorkerIdentity,
        reason: String,
    },
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl TransportError {
    pub fn unreachable(identity: &WorkerIdentity, reason: impl ToString) -> Self {
        TransportError::Unreachable {
            identity: identity.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Both directions of an open channel.
///
/// Envelopes sent on `outbound` reach the worker in order. `inbound` yields
/// what the worker sends and ends when the worker disconnects. Dropping
/// `inbound` tears the channel down.
#[derive(Debug)]
pub struct WorkerLink {
    pub outbound: mpsc::UnboundedSender<Envelope>,
    pub inbound: mpsc::UnboundedReceiver<Envelope>,
}

/// Adapter for reaching worker endpoints
#[async_trait]
pub trait WorkerTransport: Clone + Send + Sync + 'static {
    /// Open a long-lived channel to a worker
    async fn open(&self, identity: &WorkerIdentity) -> Result<WorkerLink, TransportError>;

    /// Deliver one envelope outside any channel.
    ///
    /// Returns the worker's immediate reply, if it sent one.
    async fn deliver(
        &self,
        identity: &WorkerIdentity,
        envelope: &Envelope,
    ) -> Result<Option<Envelope>, TransportError>;

    /// Identities of workers currently listening
    async fn identities(&self) -> Result<Vec<WorkerIdentity>, TransportError>;
}
