// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session state machine
//!
//! Wraps one [`Session`] and persists it after every mutation: the volatile
//! tier first, then the durable tier. A failed durable write is logged and
//! never rolls back the volatile write or the in-memory state. A failed
//! volatile write is logged too; memory stays authoritative until the next
//! successful write.

use council_core::{
    Clock, IdGen, Phase, Session, SessionError, SessionId, SessionRecord, WorkerIdentity,
    WorkerKey, WorkerStatus,
};
use council_storage::{Store, StoreError, Tier, TieredStore};

/// One live session bound to its store
pub struct SessionMachine<C: Clock> {
    session: Session,
    store: TieredStore,
    clock: C,
}

impl<C: Clock> SessionMachine<C> {
    /// Create a session with every worker slot `not_connected`, and persist it
    pub async fn create(id: SessionId, keys: &[WorkerKey], store: TieredStore, clock: C) -> Self {
        let session = Session::new(id, keys, clock.epoch_ms());
        let machine = Self {
            session,
            store,
            clock,
        };
        machine.persist().await;
        tracing::info!(session_id = %machine.session.id, workers = keys.len(), "session created");
        machine
    }

    /// Generate an id, then [`create`](Self::create)
    pub async fn create_session<I: IdGen>(
        id_gen: &I,
        keys: &[WorkerKey],
        store: TieredStore,
        clock: C,
    ) -> Self {
        Self::create(SessionId::new(id_gen.next()), keys, store, clock).await
    }

    /// Rebuild a session from the volatile tier, or the durable tier if the
    /// volatile copy is gone.
    ///
    /// Returns `Ok(None)` when neither tier has it. A copy found only in the
    /// durable tier is written back to the volatile tier.
    pub async fn recover(
        id: &SessionId,
        store: TieredStore,
        clock: C,
    ) -> Result<Option<Self>, StoreError> {
        let key = id.storage_key();
        let Some((mut tier, value)) = store.read(&key).await? else {
            return Ok(None);
        };
        let record: SessionRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) if tier == Tier::Volatile => {
                tracing::warn!(session_id = %id, error = %e, "volatile record unreadable, trying durable");
                let Some(value) = store.durable().get(&key).await? else {
                    return Err(e.into());
                };
                tier = Tier::Durable;
                serde_json::from_value(value)?
            }
            Err(e) => return Err(e.into()),
        };
        let machine = Self {
            session: Session::deserialize(record),
            store,
            clock,
        };
        if tier == Tier::Durable {
            tracing::info!(session_id = %id, "session restored from durable tier");
            machine.write_volatile().await;
        }
        Ok(Some(machine))
    }

    /// Remove a session from both tiers
    pub async fn delete(store: &TieredStore, id: &SessionId) -> Result<(), StoreError> {
        store.remove(&id.storage_key()).await?;
        tracing::info!(session_id = %id, "session deleted");
        Ok(())
    }

    pub fn id(&self) -> &SessionId {
        &self.session.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn set_phase(&mut self, phase: Phase) {
        self.session.set_phase(phase, self.clock.epoch_ms());
        tracing::debug!(session_id = %self.session.id, %phase, "phase set");
        self.persist().await;
    }

    pub async fn set_worker_status(
        &mut self,
        key: &WorkerKey,
        status: WorkerStatus,
        error: Option<String>,
    ) -> Result<(), SessionError> {
        self.session
            .set_worker_status(key, status, error, self.clock.epoch_ms())?;
        tracing::debug!(session_id = %self.session.id, worker = %key, %status, "worker status set");
        self.persist().await;
        Ok(())
    }

    pub async fn set_worker_channel(
        &mut self,
        key: &WorkerKey,
        channel: Option<WorkerIdentity>,
    ) -> Result<(), SessionError> {
        self.session
            .set_worker_channel(key, channel.clone(), self.clock.epoch_ms())?;
        tracing::debug!(
            session_id = %self.session.id,
            worker = %key,
            channel = ?channel.as_ref().map(|c| c.as_str()),
            "worker channel set"
        );
        self.persist().await;
        Ok(())
    }

    /// Write both tiers and report the first failure
    pub async fn flush(&self) -> Result<(), StoreError> {
        let value = serde_json::to_value(self.session.serialize())?;
        let key = self.session.id.storage_key();
        self.store.volatile().set(&key, value.clone()).await?;
        self.store.durable().set(&key, value).await
    }

    async fn persist(&self) {
        self.write_volatile().await;
        self.write_durable().await;
    }

    async fn write_volatile(&self) {
        if let Err(e) = self.write(Tier::Volatile).await {
            tracing::error!(session_id = %self.session.id, error = %e, "volatile write failed");
        }
    }

    async fn write_durable(&self) {
        if let Err(e) = self.write(Tier::Durable).await {
            tracing::warn!(session_id = %self.session.id, error = %e, "durable write failed");
        }
    }

    async fn write(&self, tier: Tier) -> Result<(), StoreError> {
        let value = serde_json::to_value(self.session.serialize())?;
        let key = self.session.id.storage_key();
        match tier {
            Tier::Volatile => self.store.volatile().set(&key, value).await,
            Tier::Durable => self.store.durable().set(&key, value).await,
        }
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
