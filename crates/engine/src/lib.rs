// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Council coordination engine

mod error;
pub mod liveness;
pub mod machine;
pub mod recovery;
pub mod router;

pub use error::RouterError;
pub use liveness::{LivenessManager, DEFAULT_KEEPALIVE_INTERVAL, MIN_KEEPALIVE_INTERVAL};
pub use machine::SessionMachine;
pub use recovery::{apply, plan, recover_all, RecoveryPlan, Restored, WorkerMutation};
pub use router::{BroadcastOutcome, MessageRouter, RouterEvent, DEFAULT_REQUEST_TIMEOUT};
