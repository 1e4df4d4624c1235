// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store

use crate::{Store, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, Value>,
    fail_writes: bool,
    fail_reads: bool,
}

/// Store backed by a shared map. Clones see the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one entry without going through the async trait
    pub fn peek(&self, key: &str) -> Option<Value> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry, as a host shutdown does to the volatile tier
    pub fn clear(&self) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.clear();
    }

    /// Make subsequent `set`/`delete` calls fail
    #[cfg(any(test, feature = "test-support"))]
    pub fn fail_writes(&self, fail: bool) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.fail_writes = fail;
    }

    /// Make subsequent `get`/`keys` calls fail
    #[cfg(any(test, feature = "test-support"))]
    pub fn fail_reads(&self, fail: bool) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.fail_reads = fail;
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if state.fail_reads {
            return Err(StoreError::Unavailable("read failure injected".to_string()));
        }
        Ok(state.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if state.fail_writes {
            return Err(StoreError::Unavailable("write failure injected".to_string()));
        }
        state.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if state.fail_writes {
            return Err(StoreError::Unavailable("write failure injected".to_string()));
        }
        state.entries.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if state.fail_reads {
            return Err(StoreError::Unavailable("read failure injected".to_string()));
        }
        Ok(state.entries.keys().cloned().collect())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
