// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use council_adapters::TransportError;
use council_core::{CorrelationId, WorkerIdentity};
use std::time::Duration;
use thiserror::Error;

/// Failures of routed requests
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no ack from {identity} for {correlation_id} within {after:?}")]
    Timeout {
        identity: WorkerIdentity,
        correlation_id: CorrelationId,
        after: Duration,
    },
    #[error("delivery to {identity} failed: {source}")]
    Delivery {
        identity: WorkerIdentity,
        #[source]
        source: TransportError,
    },
    #[error("channel to {0} failed to open: {1}")]
    Connect(WorkerIdentity, #[source] TransportError),
    #[error("request {0} cancelled")]
    Cancelled(CorrelationId),
    #[error("listing workers failed: {0}")]
    Enumerate(#[source] TransportError),
}

impl RouterError {
    /// True when the worker could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            RouterError::Delivery { .. } | RouterError::Connect(..)
        )
    }
}
