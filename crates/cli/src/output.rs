// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting for CLI commands

use std::fmt;

use clap::ValueEnum;
use council_core::{RecoveryAction, SessionRecord};
use council_daemon::{BroadcastEntry, SessionSummary};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print output in the specified format
pub fn print<T: Serialize + fmt::Display>(value: &T, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", value),
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(value) {
                println!("{}", json);
            }
        }
    }
}

/// Print a list of items, with `empty` shown in text mode when there are none
pub fn print_list<T: Serialize + fmt::Display>(items: &[T], format: OutputFormat, empty: &str) {
    match format {
        OutputFormat::Text if items.is_empty() => println!("{}", empty),
        OutputFormat::Text => {
            for item in items {
                println!("{}", item);
            }
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(items) {
                println!("{}", json);
            }
        }
    }
}

/// Full session state, one worker per line
#[derive(Serialize)]
#[serde(transparent)]
pub struct SessionView<'a>(pub &'a SessionRecord);

impl fmt::Display for SessionView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.0;
        writeln!(f, "Session: {}", record.id)?;
        writeln!(f, "  Phase: {}", record.phase)?;
        write!(f, "  Workers:")?;
        for (key, state) in &record.workers {
            write!(f, "\n    {:<10} {:<18}", key.as_str(), state.status.as_str())?;
            if let Some(channel) = &state.channel {
                write!(f, " {}", channel)?;
            }
            if let Some(error) = &state.error {
                write!(f, " ({})", error)?;
            }
        }
        Ok(())
    }
}

/// One row of `session list`
#[derive(Serialize)]
#[serde(transparent)]
pub struct SummaryRow<'a>(pub &'a SessionSummary);

impl fmt::Display for SummaryRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        write!(
            f,
            "{:<38} {:<10} {}/{} ready{}",
            s.id.as_str(),
            s.phase.as_str(),
            s.workers_ready,
            s.workers_total,
            if s.active { "" } else { " (ended)" }
        )
    }
}

/// One row of `broadcast` results
#[derive(Serialize)]
#[serde(transparent)]
pub struct OutcomeRow<'a>(pub &'a BroadcastEntry);

impl fmt::Display for OutcomeRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entry = self.0;
        match (entry.ok, &entry.error) {
            (true, _) => write!(f, "{:<20} ok", entry.identity.as_str()),
            (false, Some(error)) => write!(f, "{:<20} failed: {}", entry.identity.as_str(), error),
            (false, None) => write!(f, "{:<20} failed", entry.identity.as_str()),
        }
    }
}

/// A recovery hint as shown to the user
#[derive(Serialize)]
#[serde(transparent)]
pub struct ActionView<'a>(pub &'a RecoveryAction);

impl fmt::Display for ActionView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = self.0;
        let kind = serde_json::to_value(action.action)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        write!(f, "Next step: {}", kind)?;
        if !action.recoverable {
            write!(f, " (unrecoverable)")?;
        }
        if let Some(message) = &action.user_message {
            write!(f, "\n  {}", message)?;
        }
        if action.copy_to_clipboard() {
            write!(f, "\n  Copy the prompt to the clipboard and paste it manually.")?;
        }
        Ok(())
    }
}
