// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol between `council` and `councild`
//!
//! One request per connection. Each message is a 4-byte big-endian length
//! followed by a JSON body.

use council_core::{
    FailureSignal, Phase, RecoveryAction, SendMode, SessionId, SessionRecord, WorkerIdentity,
    WorkerKey, WorkerStatus,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version reported in the hello handshake
pub const PROTOCOL_VERSION: &str = "1";

/// Default time allowed for reading a request or writing a response
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a single message body
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// Errors on the IPC socket
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("timed out")]
    Timeout,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("message of {0} bytes exceeds limit")]
    MessageTooLarge(usize),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Requests from the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,
    Hello {
        version: String,
    },
    Status,
    CreateSession,
    GetSessionState {
        session_id: SessionId,
    },
    ListSessions,
    StatusUpdate {
        session_id: SessionId,
        worker: WorkerKey,
        status: WorkerStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SetPhase {
        session_id: SessionId,
        phase: Phase,
    },
    /// Open a long-lived channel to a worker and bind it to a slot
    AttachWorker {
        session_id: SessionId,
        worker: WorkerKey,
        identity: WorkerIdentity,
    },
    Capture {
        session_id: SessionId,
        worker: WorkerKey,
    },
    /// Hand a prompt to a worker in the safest allowed send mode
    Dispatch {
        session_id: SessionId,
        worker: WorkerKey,
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<SendMode>,
    },
    ReportFailure {
        session_id: SessionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worker: Option<WorkerKey>,
        signal: FailureSignal,
    },
    Broadcast {
        kind: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
    EndSession {
        session_id: SessionId,
    },
    DeleteSession {
        session_id: SessionId,
    },
    Shutdown,
}

/// Responses from the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Pong,
    Hello {
        version: String,
    },
    ShuttingDown,
    Status {
        uptime_secs: u64,
        sessions_active: usize,
        channels_open: usize,
        liveness_armed: bool,
    },
    SessionCreated {
        session_id: SessionId,
    },
    Session {
        session: Box<SessionRecord>,
    },
    NotFound {
        session_id: SessionId,
    },
    Sessions {
        sessions: Vec<SessionSummary>,
    },
    Captured {
        text: String,
    },
    Dispatched {
        mode: SendMode,
        delivered: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
    },
    Recovery {
        action: RecoveryAction,
    },
    Broadcast {
        outcomes: Vec<BroadcastEntry>,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<RecoveryAction>,
    },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
            action: None,
        }
    }
}

/// Session row for `list_sessions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub phase: Phase,
    /// Tracked by the liveness registry
    pub active: bool,
    pub workers_ready: usize,
    pub workers_total: usize,
    pub last_update: u64,
}

/// One branch of a broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastEntry {
    pub identity: WorkerIdentity,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Serialize to raw JSON, no length prefix
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(value)?)
}

pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Write one length-prefixed message
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    if data.len() > MAX_MESSAGE_LEN {
        return Err(ProtocolError::MessageTooLarge(data.len()));
    }
    writer.write_all(&(data.len() as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed message
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(ProtocolError::MessageTooLarge(len));
    }
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;
    Ok(data)
}

pub async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Request, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let bytes = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &bytes))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
