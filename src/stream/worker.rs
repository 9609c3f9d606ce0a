//! Stream worker: one task owning one RTSP connection
//!
//! The worker is a reconnection state machine around a [`FrameSource`]:
//!
//! ```text
//!   Connecting ──first frame──► Connected ──read failure──► Error(kind)
//!       ▲                                                      │
//!       └──────────────── backoff (bounded) ◄──────────────────┘
//! ```
//!
//! Every cycle through that loop is a new attempt with a fresh
//! [`AttemptId`](crate::status::AttemptId), so a failure report from an
//! abandoned attempt can never overwrite a newer attempt's state in the
//! [`StatusRegistry`]. The worker absorbs all transient failures itself;
//! its only observable effects are slot publishes and registry updates.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use crate::backoff::Backoff;
use crate::config::redact_url;
use crate::error::ErrorKind;
use crate::status::{AttemptId, Channel, ConnectionState, StatusRegistry};

use super::slot::FrameSlot;
use super::source::{FrameReader, FrameSource};

/// Why a streaming session ended
enum SessionEnd {
    Cancelled,
    Failed { kind: ErrorKind, was_live: bool },
}

/// Supervises one RTSP feed and republishes its frames.
pub struct StreamWorker<S: FrameSource> {
    channel: Channel,
    url: String,
    source: S,
    slot: Arc<FrameSlot>,
    registry: Arc<StatusRegistry>,
    connect_timeout: Duration,
    max_read_failures: u32,
    backoff: Backoff,
}

impl<S: FrameSource> StreamWorker<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channel: Channel,
        url: String,
        source: S,
        slot: Arc<FrameSlot>,
        registry: Arc<StatusRegistry>,
        connect_timeout: Duration,
        max_read_failures: u32,
        backoff: Backoff,
    ) -> Self {
        Self {
            channel,
            url,
            source,
            slot,
            registry,
            connect_timeout,
            max_read_failures,
            backoff,
        }
    }

    /// Run until cancelled.
    ///
    /// Blocks for the worker's lifetime; transient failures are retried
    /// with exponential backoff forever. Returns only after the underlying
    /// connection has been released.
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) {
        tracing::info!(channel = %self.channel, url = %redact_url(&self.url), "Stream worker started");

        loop {
            let attempt = self.registry.begin_attempt(self.channel);
            self.registry
                .update(self.channel, attempt, ConnectionState::Connecting);

            match self.session(attempt, &mut cancel).await {
                SessionEnd::Cancelled => break,
                SessionEnd::Failed { kind, was_live } => {
                    self.registry
                        .update(self.channel, attempt, ConnectionState::Error(kind));
                    if was_live {
                        self.backoff.reset();
                    }

                    let delay = self.backoff.next_delay();
                    tracing::warn!(
                        channel = %self.channel,
                        kind = %kind,
                        retry_in_ms = delay.as_millis() as u64,
                        "Stream lost, scheduling reconnect"
                    );
                    tokio::select! {
                        _ = cancel.changed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        // Terminal state always wins over anything a dying session reported.
        let final_attempt = self.registry.begin_attempt(self.channel);
        self.registry
            .update(self.channel, final_attempt, ConnectionState::Disconnected);
        tracing::info!(channel = %self.channel, "Stream worker stopped");
    }

    /// One connection attempt plus (if it goes live) its decode loop.
    ///
    /// The reader is always closed before this returns.
    async fn session(&mut self, attempt: AttemptId, cancel: &mut watch::Receiver<bool>) -> SessionEnd {
        let opened = tokio::select! {
            _ = cancel.changed() => return SessionEnd::Cancelled,
            r = self.source.open(&self.url) => r,
        };
        let mut reader = match opened {
            Ok(reader) => reader,
            Err(e) => {
                return SessionEnd::Failed {
                    kind: e.kind(),
                    was_live: false,
                }
            }
        };

        // The source is only trusted once it delivers a frame.
        let first = tokio::select! {
            _ = cancel.changed() => {
                reader.close().await;
                return SessionEnd::Cancelled;
            }
            r = timeout(self.connect_timeout, reader.read_frame()) => r,
        };
        let first = match first {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                reader.close().await;
                return SessionEnd::Failed {
                    kind: e.kind(),
                    was_live: false,
                };
            }
            Err(_elapsed) => {
                reader.close().await;
                return SessionEnd::Failed {
                    kind: ErrorKind::Network,
                    was_live: false,
                };
            }
        };

        self.registry
            .update(self.channel, attempt, ConnectionState::Connected);
        tracing::info!(channel = %self.channel, "Stream connected");
        self.slot.publish(first);

        let mut consecutive_failures = 0u32;
        loop {
            let read = tokio::select! {
                _ = cancel.changed() => {
                    reader.close().await;
                    return SessionEnd::Cancelled;
                }
                r = reader.read_frame() => r,
            };

            match read {
                Ok(data) => {
                    consecutive_failures = 0;
                    self.slot.publish(data);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        channel = %self.channel,
                        failures = consecutive_failures,
                        error = %e,
                        "Frame read failed"
                    );
                    if consecutive_failures >= self.max_read_failures {
                        reader.close().await;
                        return SessionEnd::Failed {
                            kind: e.kind(),
                            was_live: true,
                        };
                    }
                }
            }
        }
    }
}
