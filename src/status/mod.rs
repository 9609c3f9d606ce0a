//! Per-channel connection health tracking
//!
//! The bridge maintains three independent channels to the camera: the two
//! RTSP streams and the ONVIF control session. Each is supervised by its own
//! task and reconnects on its own schedule, so the dashboard needs a single
//! place that always reflects the most recent *true* state of each channel.
//!
//! Reconnection makes this racy: a supervisor that abandons attempt N and
//! starts attempt N+1 may still have a failure report from N in flight.
//! Updates therefore carry an [`AttemptId`], and the registry rejects any
//! update older than the last one it accepted for that channel.

mod registry;

pub use registry::{AttemptId, StatusRegistry, StatusSnapshot};

use crate::error::ErrorKind;

/// One unit of connection-health tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// PTZ-capable RTSP stream
    PrimaryStream,
    /// Fixed RTSP stream
    SecondaryStream,
    /// ONVIF control session
    Control,
}

impl Channel {
    pub(crate) fn index(self) -> usize {
        match self {
            Channel::PrimaryStream => 0,
            Channel::SecondaryStream => 1,
            Channel::Control => 2,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Channel::PrimaryStream => "primary-stream",
            Channel::SecondaryStream => "secondary-stream",
            Channel::Control => "control",
        };
        f.write_str(name)
    }
}

/// Observed state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying (initial state, or after shutdown)
    Disconnected,
    /// An attempt to connect is in progress
    Connecting,
    /// Live
    Connected,
    /// The last attempt failed; the kind decides whether it will be retried
    Error(ErrorKind),
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Error(kind) => write!(f, "error({kind})"),
        }
    }
}
