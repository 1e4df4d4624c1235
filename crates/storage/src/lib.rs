// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Key/value storage for session records
//!
//! Two tiers hold identical records: a volatile tier that outlives a
//! coordinator restart but not a host restart, and a durable tier that
//! outlives both. Each tier is a plain key/value store with no transactions.

mod dir;
mod memory;
mod tiered;

pub use dir::JsonDirStore;
pub use memory::MemoryStore;
pub use tiered::{Tier, TieredStore, HEARTBEAT_KEY};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors from a store tier
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A single storage tier
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Every key currently held
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}
