// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Envelopes: the unit of exchange between coordinator and workers

use crate::session::SessionId;
use crate::worker::WorkerStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Well-known envelope kinds. Anything else belongs to the adapter layer.
pub mod kinds {
    pub const ACK: &str = "ack";
    pub const STATUS_UPDATE: &str = "status_update";
    pub const CAPTURE: &str = "capture_response";
    pub const PREPARE_PROMPT: &str = "prepare_prompt";
}

/// Links a request to its acknowledgment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    /// Fresh random (UUID v4) correlation id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message to or from a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub correlation_id: CorrelationId,
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub needs_ack: bool,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            correlation_id: CorrelationId::generate(),
            kind: kind.into(),
            payload,
            needs_ack: false,
        }
    }

    /// Acknowledge `original`. Extra object fields in `payload` ride along.
    pub fn ack(original: &CorrelationId, payload: Value) -> Self {
        let mut body = match payload {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        body.insert(
            "originalCorrelationId".to_string(),
            Value::String(original.0.clone()),
        );
        Self::new(kinds::ACK, Value::Object(body))
    }

    pub fn is_ack(&self) -> bool {
        self.kind == kinds::ACK
    }

    /// The correlation id this envelope acknowledges, if it is an ack
    pub fn acknowledges(&self) -> Option<CorrelationId> {
        if !self.is_ack() {
            return None;
        }
        self.payload
            .get("originalCorrelationId")
            .and_then(Value::as_str)
            .map(|id| CorrelationId(id.to_string()))
    }

    /// Decode the payload as a typed body
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Ack body as seen by a requester
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckPayload {
    pub original_correlation_id: CorrelationId,
    #[serde(flatten)]
    pub body: serde_json::Map<String, Value>,
}

/// `status_update` body sent by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: WorkerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Target session; when absent the coordinator resolves it from the channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// What a worker puts in the ack of a `capture_response` request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureReply {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
