//! Bridge assembly and public handle
//!
//! [`CameraBridge`] wires the pieces together: two stream workers feeding
//! their frame slots, the control loop behind the command arbiter, and the
//! status registry they all report into. The embedding web server holds one
//! bridge per camera and serves viewers from [`CameraBridge::publisher`].

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backoff::Backoff;
use crate::config::BridgeConfig;
use crate::control::{
    spawn_control_loop, CommandArbiter, CommandOutcome, DeviceControl, Direction, PtzCommand,
    SoapTransport,
};
use crate::error::Result;
use crate::status::{Channel, StatusRegistry, StatusSnapshot};
use crate::stream::{FramePublisher, FrameSlot, FrameSource, StreamWorker};

/// Which of the two RTSP feeds a viewer wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamId {
    /// PTZ-capable feed
    Primary,
    /// Fixed overview feed
    Secondary,
}

/// PTZ request as it arrives from the web layer.
///
/// `speed: None` means "use the configured default"; the bridge fills it in
/// before the command reaches the arbiter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PtzRequest {
    Move {
        direction: Direction,
        speed: Option<f32>,
    },
    Stop,
}

/// One running camera bridge.
pub struct CameraBridge {
    registry: Arc<StatusRegistry>,
    primary_slot: Arc<FrameSlot>,
    secondary_slot: Arc<FrameSlot>,
    arbiter: CommandArbiter,
    default_ptz_speed: f32,
    publisher_poll_interval: std::time::Duration,
    cancel: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl CameraBridge {
    /// Start all bridge tasks.
    ///
    /// `source` produces the RTSP frame readers and `transport` carries the
    /// ONVIF SOAP calls; production passes
    /// [`FfmpegSource`](crate::stream::FfmpegSource) and
    /// [`HttpTransport`](crate::control::HttpTransport), tests substitute
    /// scripted fakes. Returns immediately; all connecting happens in the
    /// background and is observable through [`status`](Self::status).
    pub fn start<S, T>(config: BridgeConfig, source: S, transport: T) -> Self
    where
        S: FrameSource + Clone,
        T: SoapTransport,
    {
        let registry = Arc::new(StatusRegistry::new());
        let primary_slot = Arc::new(FrameSlot::new());
        let secondary_slot = Arc::new(FrameSlot::new());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let backoff = || Backoff::new(config.backoff_initial, config.backoff_max);

        let mut tasks = Vec::with_capacity(3);
        for (channel, url, slot) in [
            (
                Channel::PrimaryStream,
                config.endpoint.primary_rtsp_url.clone(),
                Arc::clone(&primary_slot),
            ),
            (
                Channel::SecondaryStream,
                config.endpoint.secondary_rtsp_url.clone(),
                Arc::clone(&secondary_slot),
            ),
        ] {
            let worker = StreamWorker::new(
                channel,
                url,
                source.clone(),
                slot,
                Arc::clone(&registry),
                config.connect_timeout,
                config.max_read_failures,
                backoff(),
            );
            tasks.push(tokio::spawn(worker.run(cancel_rx.clone())));
        }

        let control = DeviceControl::new(transport, config.endpoint.clone());
        let (arbiter, control_task) = spawn_control_loop(
            control,
            Arc::clone(&registry),
            backoff(),
            config.max_protocol_errors,
            config.command_queue_depth,
            cancel_rx,
        );
        tasks.push(control_task);

        Self {
            registry,
            primary_slot,
            secondary_slot,
            arbiter,
            default_ptz_speed: config.default_ptz_speed,
            publisher_poll_interval: config.publisher_poll_interval,
            cancel: cancel_tx,
            tasks,
        }
    }

    /// Current state of all three camera channels
    pub fn status(&self) -> StatusSnapshot {
        self.registry.snapshot()
    }

    /// New frame sequence for one viewer of the given feed.
    ///
    /// Publishers are independent; creating one is cheap and dropping it has
    /// no effect on the stream or on other viewers.
    pub fn publisher(&self, stream: StreamId) -> FramePublisher {
        let slot = match stream {
            StreamId::Primary => Arc::clone(&self.primary_slot),
            StreamId::Secondary => Arc::clone(&self.secondary_slot),
        };
        FramePublisher::new(slot, self.publisher_poll_interval)
    }

    /// Submit one PTZ request and wait for its outcome.
    pub async fn request_ptz(&self, request: PtzRequest) -> Result<CommandOutcome> {
        let command = match request {
            PtzRequest::Move { direction, speed } => PtzCommand::Move {
                direction,
                speed: speed.unwrap_or(self.default_ptz_speed),
            },
            PtzRequest::Stop => PtzCommand::Stop,
        };
        self.arbiter.submit(command).await
    }

    /// Force a fresh ONVIF connection attempt.
    ///
    /// This is the only way back after an authentication failure; network
    /// failures reconnect on their own.
    pub async fn reconnect_control(&self) -> Result<()> {
        self.arbiter.reconnect().await
    }

    /// Stop all tasks and wait for them to release their connections.
    ///
    /// Open publishers drain the last frame of each feed and then end.
    pub async fn shutdown(self) {
        tracing::info!("Bridge shutting down");
        let _ = self.cancel.send(true);
        self.primary_slot.close();
        self.secondary_slot.close();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Bridge task panicked during shutdown");
            }
        }
        tracing::info!("Bridge stopped");
    }
}
