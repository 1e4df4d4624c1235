// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The volatile/durable pair

use crate::{Store, StoreError};
use council_core::{SessionId, SESSION_KEY_PREFIX};
use serde_json::Value;
use std::sync::Arc;

/// Volatile-tier key refreshed on every liveness tick
pub const HEARTBEAT_KEY: &str = "keepalive_ping";

/// Which tier a read was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Volatile,
    Durable,
}

/// Both store tiers. Cheap to clone.
#[derive(Clone)]
pub struct TieredStore {
    volatile: Arc<dyn Store>,
    durable: Arc<dyn Store>,
}

impl TieredStore {
    pub fn new(volatile: impl Store, durable: impl Store) -> Self {
        Self {
            volatile: Arc::new(volatile),
            durable: Arc::new(durable),
        }
    }

    pub fn volatile(&self) -> &dyn Store {
        self.volatile.as_ref()
    }

    pub fn durable(&self) -> &dyn Store {
        self.durable.as_ref()
    }

    /// Read `key` from the volatile tier, falling back to the durable tier.
    ///
    /// A volatile read error falls through to the durable tier; a durable
    /// read error is returned.
    pub async fn read(&self, key: &str) -> Result<Option<(Tier, Value)>, StoreError> {
        match self.volatile.get(key).await {
            Ok(Some(value)) => return Ok(Some((Tier::Volatile, value))),
            Ok(None) => {}
            Err(e) => tracing::warn!(key, error = %e, "volatile read failed, trying durable"),
        }
        Ok(self
            .durable
            .get(key)
            .await?
            .map(|value| (Tier::Durable, value)))
    }

    /// Remove `key` from both tiers. Both deletes are attempted.
    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let volatile = self.volatile.delete(key).await;
        let durable = self.durable.delete(key).await;
        volatile.and(durable)
    }

    /// Session ids known to the volatile tier
    pub async fn session_ids(&self) -> Result<Vec<SessionId>, StoreError> {
        let keys = self.volatile.keys().await?;
        Ok(keys
            .iter()
            .filter(|key| key.starts_with(SESSION_KEY_PREFIX))
            .filter_map(|key| SessionId::from_storage_key(key))
            .collect())
    }

    /// Refresh the heartbeat marker
    pub async fn heartbeat(&self, epoch_ms: u64) -> Result<(), StoreError> {
        self.volatile.set(HEARTBEAT_KEY, Value::from(epoch_ms)).await
    }
}

#[cfg(test)]
#[path = "tiered_tests.rs"]
mod tests;
