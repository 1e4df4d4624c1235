// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix-socket worker transport
//!
//! Each worker listens on `<workers_dir>/<identity>.sock`.

use super::frame::{read_frame, write_frame};
use super::{TransportError, WorkerLink, WorkerTransport};
use async_trait::async_trait;
use council_core::{Envelope, WorkerIdentity};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::sync::mpsc;

/// How long `deliver` waits for an immediate reply after writing
const DEFAULT_REPLY_WINDOW: Duration = Duration::from_secs(2);

/// Transport over per-worker Unix sockets
#[derive(Debug, Clone)]
pub struct UnixSocketTransport {
    workers_dir: PathBuf,
    reply_window: Duration,
}

impl UnixSocketTransport {
    pub fn new(workers_dir: impl Into<PathBuf>) -> Self {
        Self {
            workers_dir: workers_dir.into(),
            reply_window: DEFAULT_REPLY_WINDOW,
        }
    }

    pub fn with_reply_window(mut self, window: Duration) -> Self {
        self.reply_window = window;
        self
    }

    pub fn workers_dir(&self) -> &Path {
        &self.workers_dir
    }

    pub fn socket_path(&self, identity: &WorkerIdentity) -> PathBuf {
        self.workers_dir.join(format!("{}.sock", identity))
    }

    async fn connect(&self, identity: &WorkerIdentity) -> Result<UnixStream, TransportError> {
        let path = self.socket_path(identity);
        UnixStream::connect(&path)
            .await
            .map_err(|e| TransportError::unreachable(identity, e))
    }
}

#[async_trait]
impl WorkerTransport for UnixSocketTransport {
    async fn open(&self, identity: &WorkerIdentity) -> Result<WorkerLink, TransportError> {
        let stream = self.connect(identity).await?;
        let (mut reader, mut writer) = stream.into_split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Envelope>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Envelope>();

        let who = identity.clone();
        tokio::spawn(async move {
            while let Some(envelope) = out_rx.recv().await {
                if let Err(e) = write_frame(&mut writer, &envelope).await {
                    tracing::debug!(identity = %who, error = %e, "channel write failed");
                    break;
                }
            }
        });

        let who = identity.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = in_tx.closed() => break,
                    frame = read_frame(&mut reader) => match frame {
                        Ok(Some(envelope)) => {
                            if in_tx.send(envelope).is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::debug!(identity = %who, error = %e, "channel read failed");
                            break;
                        }
                    },
                }
            }
        });

        Ok(WorkerLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    async fn deliver(
        &self,
        identity: &WorkerIdentity,
        envelope: &Envelope,
    ) -> Result<Option<Envelope>, TransportError> {
        let mut stream = self.connect(identity).await?;
        write_frame(&mut stream, envelope)
            .await
            .map_err(|e| TransportError::unreachable(identity, e))?;

        match tokio::time::timeout(self.reply_window, read_frame(&mut stream)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(TransportError::Io(e))) if e.kind() == io::ErrorKind::ConnectionReset => {
                Ok(None)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    async fn identities(&self) -> Result<Vec<WorkerIdentity>, TransportError> {
        let mut found = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.workers_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(identity) = name.to_string_lossy().strip_suffix(".sock") {
                found.push(WorkerIdentity::new(identity));
            }
        }
        found.sort();
        Ok(found)
    }
}

#[cfg(test)]
#[path = "socket_tests.rs"]
mod tests;
