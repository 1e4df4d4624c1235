// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! council-daemon: the coordinator process
//!
//! The `councild` binary is a thin loop over [`lifecycle`] and [`server`].
//! The protocol types are shared with the `council` CLI.

pub mod coordinator;
pub mod lifecycle;
pub mod protocol;
pub mod server;
pub mod settings;

pub use coordinator::{Coordinator, CoordinatorError, CoordinatorStatus, Dispatch};
pub use protocol::{BroadcastEntry, Request, Response, SessionSummary, PROTOCOL_VERSION};
pub use settings::Settings;

/// Startup marker prefix written to the log before anything else.
/// The CLI uses it to find where the current startup attempt begins.
/// Full format: "--- councild: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- councild: starting (pid: ";
