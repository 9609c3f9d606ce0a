//! ONVIF device control: PTZ commands over SOAP
//!
//! One [`DeviceControl`] owns the ONVIF session. All PTZ traffic funnels
//! through the [`CommandArbiter`]'s queue into a single control loop, so at
//! most one command is ever in flight to the camera and two web handlers
//! can never race a Move against a Stop.
//!
//! ```text
//!   web handler ──submit()──┐
//!   web handler ──submit()──┼──mpsc──► control loop ──SOAP──► camera
//!   web handler ──submit()──┘         (DeviceControl)
//! ```
//!
//! A `Stop` is safety-relevant: the camera keeps moving until it arrives.
//! The loop therefore cancels queued, not-yet-sent `Move`s whenever a
//! `Stop` is waiting, so a burst of buffered moves can never delay it.

pub mod arbiter;
pub mod client;
pub mod command;
pub mod soap;
mod wsse;

pub use arbiter::{spawn_control_loop, CommandArbiter, CommandOutcome};
pub use client::DeviceControl;
pub use command::{Direction, PtzCommand, Velocity};
pub use soap::{HttpTransport, SoapResponse, SoapTransport};
