// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced transport wrapper for consistent observability

use crate::transport::{TransportError, WorkerLink, WorkerTransport};
use async_trait::async_trait;
use council_core::{Envelope, WorkerIdentity};
use tracing::Instrument;

/// Wrapper that adds tracing to any WorkerTransport
#[derive(Clone)]
pub struct TracedTransport<T> {
    inner: T,
}

impl<T> TracedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: WorkerTransport> WorkerTransport for TracedTransport<T> {
    async fn open(&self, identity: &WorkerIdentity) -> Result<WorkerLink, TransportError> {
        let span = tracing::info_span!("transport.open", %identity);

        let start = std::time::Instant::now();
        let result = self.inner.open(identity).instrument(span.clone()).await;
        let elapsed = start.elapsed();
        let _guard = span.enter();

        match &result {
            Ok(_) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "channel opened"
            ),
            Err(e) => tracing::error!(
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "open failed"
            ),
        }

        result
    }

    async fn deliver(
        &self,
        identity: &WorkerIdentity,
        envelope: &Envelope,
    ) -> Result<Option<Envelope>, TransportError> {
        let span = tracing::info_span!(
            "transport.deliver",
            %identity,
            kind = %envelope.kind,
            correlation_id = %envelope.correlation_id,
        );

        span.in_scope(|| tracing::debug!("delivering"));
        let start = std::time::Instant::now();
        let result = self
            .inner
            .deliver(identity, envelope)
            .instrument(span.clone())
            .await;
        let elapsed = start.elapsed();
        let _guard = span.enter();

        match &result {
            Ok(reply) => tracing::debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                replied = reply.is_some(),
                "delivered"
            ),
            Err(e) => tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "delivery failed"
            ),
        }

        result
    }

    async fn identities(&self) -> Result<Vec<WorkerIdentity>, TransportError> {
        let result = self.inner.identities().await;
        match &result {
            Ok(found) => tracing::debug!(count = found.len(), "listed worker identities"),
            Err(e) => tracing::warn!(error = %e, "listing worker identities failed"),
        }
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
