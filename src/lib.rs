//! # cambridge
//!
//! Bridge between a PTZ-capable ONVIF IP camera and browser viewers.
//!
//! The bridge maintains three independent channels to one camera and makes
//! them consumable over plain HTTP:
//!
//! ```text
//!                  ┌──RTSP (primary)───► StreamWorker ─► FrameSlot ─► FramePublisher ─► viewers
//!   camera ────────┼──RTSP (secondary)─► StreamWorker ─► FrameSlot ─► FramePublisher ─► viewers
//!                  └──ONVIF/SOAP──────► DeviceControl ◄─ control loop ◄─ CommandArbiter ◄─ PTZ requests
//!                                                            │
//!                                     StatusRegistry ◄───────┴── (all channels report here)
//! ```
//!
//! Each channel reconnects on its own schedule with bounded backoff and
//! reports every transition to the [`status::StatusRegistry`] under an
//! attempt id, so late reports from abandoned attempts never shadow newer
//! state. Frames fan out losslessly in allocation (shared [`bytes::Bytes`])
//! but lossily in time: the slot keeps only the newest frame and slow
//! viewers skip ahead.
//!
//! The embedding application constructs a [`bridge::CameraBridge`] per
//! camera and serves viewers from [`bridge::CameraBridge::publisher`].

pub mod backoff;
pub mod bridge;
pub mod config;
pub mod control;
pub mod error;
pub mod status;
pub mod stream;

pub use bridge::{CameraBridge, PtzRequest, StreamId};
pub use config::{BridgeConfig, CameraEndpoint};
pub use control::{CommandOutcome, Direction, PtzCommand};
pub use error::{Error, ErrorKind, Result};
pub use status::{ConnectionState, StatusSnapshot};
