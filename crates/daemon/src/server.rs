// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.

use council_adapters::WorkerTransport;
use council_core::{Clock, IdGen};
use council_engine::BroadcastOutcome;
use tokio::net::UnixStream;
use tracing::{debug, error};

use crate::coordinator::{Coordinator, CoordinatorError};
use crate::lifecycle::DaemonState;
use crate::protocol::{
    self, BroadcastEntry, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION,
};

/// Handle a single client connection
pub async fn handle_connection(
    daemon: &mut DaemonState,
    stream: UnixStream,
) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();

    let request = match protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(req) => req,
        Err(protocol::ProtocolError::Timeout) => {
            error!("Request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(protocol::ProtocolError::ConnectionClosed) => {
            debug!("Client disconnected before sending request");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to read request: {}", e);
            return Err(ServerError::Protocol(e));
        }
    };

    debug!("Received request: {:?}", request);
    daemon.touch();

    let response = handle_request(&mut daemon.coordinator, request).await;
    if response == Response::ShuttingDown {
        daemon.shutdown_requested = true;
    }

    debug!("Sending response: {:?}", response);

    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT)
        .await
        .map_err(ServerError::Protocol)?;

    Ok(())
}

/// Handle a single request and return a response
pub async fn handle_request<T, C, I>(
    coordinator: &mut Coordinator<T, C, I>,
    request: Request,
) -> Response
where
    T: WorkerTransport,
    C: Clock,
    I: IdGen,
{
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version: _ } => Response::Hello {
            version: PROTOCOL_VERSION.to_string(),
        },

        Request::Status => {
            let status = coordinator.status();
            Response::Status {
                uptime_secs: status.uptime_secs,
                sessions_active: status.sessions_active,
                channels_open: status.channels_open,
                liveness_armed: status.liveness_armed,
            }
        }

        Request::Shutdown => Response::ShuttingDown,

        Request::CreateSession => Response::SessionCreated {
            session_id: coordinator.create_session().await,
        },

        Request::GetSessionState { session_id } => {
            match coordinator.get_session(&session_id).await {
                Ok(Some(record)) => Response::Session {
                    session: Box::new(record),
                },
                Ok(None) => Response::NotFound { session_id },
                Err(e) => error_response(e),
            }
        }

        Request::ListSessions => match coordinator.list_sessions().await {
            Ok(sessions) => Response::Sessions { sessions },
            Err(e) => error_response(e),
        },

        Request::StatusUpdate {
            session_id,
            worker,
            status,
            error,
        } => match coordinator
            .status_update(&session_id, &worker, status, error)
            .await
        {
            Ok(()) => Response::Ok,
            Err(CoordinatorError::NotFound(_)) => Response::NotFound { session_id },
            Err(e) => error_response(e),
        },

        Request::SetPhase { session_id, phase } => {
            match coordinator.set_phase(&session_id, phase).await {
                Ok(()) => Response::Ok,
                Err(CoordinatorError::NotFound(_)) => Response::NotFound { session_id },
                Err(e) => error_response(e),
            }
        }

        Request::AttachWorker {
            session_id,
            worker,
            identity,
        } => match coordinator
            .attach_worker(&session_id, &worker, identity)
            .await
        {
            Ok(()) => Response::Ok,
            Err(CoordinatorError::NotFound(_)) => Response::NotFound { session_id },
            Err(e) => error_response(e),
        },

        Request::Capture { session_id, worker } => {
            match coordinator.capture(&session_id, &worker).await {
                Ok(text) => Response::Captured { text },
                Err(CoordinatorError::NotFound(_)) => Response::NotFound { session_id },
                Err(e) => error_response(e),
            }
        }

        Request::Dispatch {
            session_id,
            worker,
            prompt,
            mode,
        } => match coordinator
            .dispatch(&session_id, &worker, prompt, mode)
            .await
        {
            Ok(dispatch) => Response::Dispatched {
                mode: dispatch.mode,
                delivered: dispatch.delivered,
                warning: dispatch.warning,
            },
            Err(CoordinatorError::NotFound(_)) => Response::NotFound { session_id },
            Err(e) => error_response(e),
        },

        Request::ReportFailure {
            session_id,
            worker,
            signal,
        } => match coordinator
            .report_failure(&session_id, worker.as_ref(), signal)
            .await
        {
            Ok(action) => Response::Recovery { action },
            Err(CoordinatorError::NotFound(_)) => Response::NotFound { session_id },
            Err(e) => error_response(e),
        },

        Request::Broadcast { kind, payload } => match coordinator.broadcast(kind, payload).await {
            Ok(outcomes) => Response::Broadcast {
                outcomes: outcomes.into_iter().map(broadcast_entry).collect(),
            },
            Err(e) => error_response(e),
        },

        Request::EndSession { session_id } => match coordinator.end_session(&session_id).await {
            Ok(()) => Response::Ok,
            Err(CoordinatorError::NotFound(_)) => Response::NotFound { session_id },
            Err(e) => error_response(e),
        },

        Request::DeleteSession { session_id } => {
            match coordinator.delete_session(&session_id).await {
                Ok(()) => Response::Ok,
                Err(CoordinatorError::NotFound(_)) => Response::NotFound { session_id },
                Err(e) => error_response(e),
            }
        }
    }
}

fn error_response(e: CoordinatorError) -> Response {
    Response::Error {
        message: e.to_string(),
        action: e.action().cloned(),
    }
}

fn broadcast_entry(outcome: BroadcastOutcome) -> BroadcastEntry {
    BroadcastEntry {
        identity: outcome.identity,
        ok: outcome.result.is_ok(),
        error: outcome.result.err().map(|e| e.to_string()),
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Request timeout")]
    Timeout,
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
