//! Command arbiter and control loop
//!
//! The arbiter is the only path to [`DeviceControl::send`]. Web handlers
//! call [`CommandArbiter::submit`] concurrently; the control loop pulls
//! requests off one queue and executes them strictly one at a time, so
//! command execution order is submission order. The one deliberate
//! exception: a pending `Stop` cancels queued `Move`s and jumps ahead of
//! them, because a lost or delayed `Stop` leaves the camera physically
//! moving.
//!
//! The same loop supervises the ONVIF session: reconnect with bounded
//! backoff on network failures, report every transition to the status
//! registry under an attempt id, and after an authentication failure stay
//! down until a reconnect is explicitly requested.

use tokio::sync::{mpsc, oneshot, watch};

use crate::backoff::Backoff;
use crate::error::{Error, ErrorKind, Result};
use crate::status::{Channel, ConnectionState, StatusRegistry};

use super::client::DeviceControl;
use super::command::PtzCommand;
use super::soap::SoapTransport;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// What happened to a submitted command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Sent to the camera and acknowledged
    Delivered,
    /// A later `Stop` arrived before this `Move` was sent; it was dropped
    CancelledByStop,
}

enum ControlRequest {
    Command {
        command: PtzCommand,
        reply: oneshot::Sender<Result<CommandOutcome>>,
    },
    /// Explicit trigger that clears an auth failure and reconnects
    Reconnect,
}

/// Handle for submitting PTZ commands to the control loop.
#[derive(Clone)]
pub struct CommandArbiter {
    tx: mpsc::Sender<ControlRequest>,
}

impl CommandArbiter {
    /// Enqueue a command for exclusive execution and wait for its outcome.
    ///
    /// Errors from the camera ([`Error::CommandRejected`], [`Error::Auth`],
    /// [`Error::Network`]) surface here, to the submitter.
    pub async fn submit(&self, command: PtzCommand) -> Result<CommandOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControlRequest::Command {
                command,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::Network("control loop not running".into()))?;
        reply_rx
            .await
            .map_err(|_| Error::Network("control loop dropped the command".into()))?
    }

    /// Request a fresh connection attempt, clearing any auth lockout.
    pub async fn reconnect(&self) -> Result<()> {
        self.tx
            .send(ControlRequest::Reconnect)
            .await
            .map_err(|_| Error::Network("control loop not running".into()))
    }
}

/// Spawn the control loop; returns the arbiter handle and the task handle.
pub fn spawn_control_loop<T: SoapTransport>(
    control: DeviceControl<T>,
    registry: Arc<StatusRegistry>,
    backoff: Backoff,
    max_protocol_errors: u32,
    queue_depth: usize,
    cancel: watch::Receiver<bool>,
) -> (CommandArbiter, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(queue_depth);
    let control_loop = ControlLoop {
        control,
        registry,
        rx,
        backoff,
        max_protocol_errors,
        auth_blocked: false,
        degraded: false,
        protocol_errors: 0,
    };
    let handle = tokio::spawn(control_loop.run(cancel));
    (CommandArbiter { tx }, handle)
}

struct ControlLoop<T: SoapTransport> {
    control: DeviceControl<T>,
    registry: Arc<StatusRegistry>,
    rx: mpsc::Receiver<ControlRequest>,
    backoff: Backoff,
    max_protocol_errors: u32,
    auth_blocked: bool,
    degraded: bool,
    protocol_errors: u32,
}

impl<T: SoapTransport> ControlLoop<T> {
    async fn run(mut self, mut cancel: watch::Receiver<bool>) {
        tracing::info!("Control loop started");

        'outer: loop {
            // Supervision: (re)connect unless locked out by an auth failure.
            if !self.control.is_connected() && !self.auth_blocked {
                // A degraded channel holds its Error(Protocol) state for one
                // backoff delay instead of reconnecting instantly.
                if std::mem::take(&mut self.degraded) {
                    let delay = self.backoff.next_delay();
                    if self.wait_backoff(delay, &mut cancel).await {
                        break 'outer;
                    }
                }
                let connected = tokio::select! {
                    _ = cancel.changed() => break 'outer,
                    r = self.try_connect() => r,
                };
                if let Err(e) = connected {
                    if e.kind() != ErrorKind::Auth {
                        let delay = self.backoff.next_delay();
                        tracing::warn!(
                            error = %e,
                            retry_in_ms = delay.as_millis() as u64,
                            "ONVIF connect failed, scheduling reconnect"
                        );
                        if self.wait_backoff(delay, &mut cancel).await {
                            break 'outer;
                        }
                        continue 'outer;
                    }
                }
            }

            tokio::select! {
                _ = cancel.changed() => break 'outer,
                request = self.rx.recv() => match request {
                    None => break 'outer,
                    Some(request) => self.handle_batch(request).await,
                },
            }
        }

        let attempt = self.registry.begin_attempt(Channel::Control);
        self.registry
            .update(Channel::Control, attempt, ConnectionState::Disconnected);
        tracing::info!("Control loop stopped");
    }

    /// One connection attempt, reported to the registry under a fresh
    /// attempt id. An auth failure locks the channel until a reconnect
    /// request clears it.
    async fn try_connect(&mut self) -> Result<()> {
        let attempt = self.registry.begin_attempt(Channel::Control);
        self.registry
            .update(Channel::Control, attempt, ConnectionState::Connecting);

        match self.control.connect().await {
            Ok(()) => {
                self.registry
                    .update(Channel::Control, attempt, ConnectionState::Connected);
                self.backoff.reset();
                self.protocol_errors = 0;
                Ok(())
            }
            Err(e) => {
                self.registry
                    .update(Channel::Control, attempt, ConnectionState::Error(e.kind()));
                if e.kind() == ErrorKind::Auth {
                    tracing::error!(error = %e, "ONVIF authentication failed; waiting for explicit reconnect");
                    self.auth_blocked = true;
                }
                Err(e)
            }
        }
    }

    /// Backoff wait that keeps answering (and failing fast) incoming
    /// requests, so a queued `Stop` never sits unanswered behind a dead
    /// connection. Returns true on cancellation.
    async fn wait_backoff(&mut self, delay: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
        let deadline = tokio::time::sleep(delay);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = cancel.changed() => return true,
                _ = &mut deadline => return false,
                request = self.rx.recv() => match request {
                    None => return true,
                    Some(ControlRequest::Reconnect) => {
                        self.auth_blocked = false;
                        return false;
                    }
                    Some(ControlRequest::Command { command, reply }) => {
                        tracing::debug!(command = %command, "Rejecting command while reconnecting");
                        let _ = reply.send(Err(Error::Network(
                            "control channel reconnecting".into(),
                        )));
                    }
                },
            }
        }
    }

    /// Execute one request plus everything queued behind it, applying the
    /// stop-priority rule before every send.
    ///
    /// The channel is re-drained between sends, so a `Stop` submitted while
    /// an earlier command is still in flight cancels every not-yet-sent
    /// `Move` ahead of it, including ones already pulled into this batch.
    async fn handle_batch(&mut self, first: ControlRequest) {
        let mut queue = VecDeque::new();
        self.enqueue(first, &mut queue);

        loop {
            // Pick up anything that arrived while the last command ran.
            while let Ok(request) = self.rx.try_recv() {
                self.enqueue(request, &mut queue);
            }
            let Some((command, reply)) = queue.pop_front() else {
                break;
            };

            // Stop priority: a Move with a Stop pending behind it is dropped
            // unsent. Stops and commands submitted after the last Stop run
            // in order.
            if !command.is_stop() && queue.iter().any(|(c, _)| c.is_stop()) {
                tracing::debug!(command = %command, "Move cancelled by queued stop");
                let _ = reply.send(Ok(CommandOutcome::CancelledByStop));
                continue;
            }

            let result = self.execute(command).await;
            let _ = reply.send(result);
        }
    }

    /// Reconnect requests take effect immediately; commands queue up.
    fn enqueue(
        &mut self,
        request: ControlRequest,
        queue: &mut VecDeque<(PtzCommand, oneshot::Sender<Result<CommandOutcome>>)>,
    ) {
        match request {
            ControlRequest::Reconnect => {
                self.auth_blocked = false;
                self.control.reset();
            }
            ControlRequest::Command { command, reply } => queue.push_back((command, reply)),
        }
    }

    async fn execute(&mut self, command: PtzCommand) -> Result<CommandOutcome> {
        if self.auth_blocked {
            return Err(Error::Auth(
                "onvif credentials rejected; reconnect required".into(),
            ));
        }
        // A command arriving right behind a reconnect request connects
        // inline rather than waiting for the next supervision pass.
        if !self.control.is_connected() {
            self.try_connect().await?;
        }

        match self.control.send(command).await {
            Ok(()) => {
                self.protocol_errors = 0;
                tracing::debug!(command = %command, "PTZ command delivered");
                Ok(CommandOutcome::Delivered)
            }
            Err(e) => {
                tracing::warn!(command = %command, error = %e, "PTZ command failed");
                match e.kind() {
                    ErrorKind::Network => {
                        // Session already dropped by DeviceControl::send;
                        // the supervision arm reconnects before the next
                        // command executes.
                        let attempt = self.registry.begin_attempt(Channel::Control);
                        self.registry.update(
                            Channel::Control,
                            attempt,
                            ConnectionState::Error(ErrorKind::Network),
                        );
                    }
                    ErrorKind::Protocol => {
                        self.protocol_errors += 1;
                        if self.protocol_errors >= self.max_protocol_errors {
                            tracing::error!(
                                consecutive = self.protocol_errors,
                                "Repeated ONVIF protocol errors, reporting control channel degraded"
                            );
                            let attempt = self.registry.begin_attempt(Channel::Control);
                            self.registry.update(
                                Channel::Control,
                                attempt,
                                ConnectionState::Error(ErrorKind::Protocol),
                            );
                            self.control.reset();
                            self.degraded = true;
                            self.protocol_errors = 0;
                        }
                    }
                    // CommandRejected concerns only this command; the
                    // channel itself stays healthy.
                    ErrorKind::Auth | ErrorKind::CommandRejected => {}
                }
                Err(e)
            }
        }
    }
}
