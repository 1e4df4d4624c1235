// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! council-core: data model for the council coordinator
//!
//! This crate provides:
//! - Session and worker slot state, with the persisted record form
//! - Envelopes exchanged with workers
//! - Failure signals and recovery actions
//! - Worker kinds and their automation policy
//! - Clock and id abstractions for testable time and identifiers

pub mod clock;
pub mod id;

pub mod envelope;
pub mod platform;
pub mod recovery;
pub mod session;
pub mod worker;

// Re-exports
pub use clock::{Clock, FakeClock, SystemClock};
pub use envelope::{kinds, AckPayload, CaptureReply, CorrelationId, Envelope, StatusUpdate};
pub use id::{IdGen, ScriptedIdGen, SequentialIdGen, UuidIdGen};
pub use platform::{safe_send_mode, Capabilities, SendMode, WorkerKind};
pub use recovery::{FailureSignal, RecoveryAction, RecoveryKind, SideEffect};
pub use session::{Phase, Session, SessionError, SessionId, SessionRecord, SESSION_KEY_PREFIX};
pub use worker::{WorkerIdentity, WorkerKey, WorkerState, WorkerStatus, DEFAULT_WORKERS};
