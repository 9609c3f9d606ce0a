//! Frame source seam
//!
//! The stream worker only cares about two operations: open a connection to
//! an RTSP URL, and pull the next encoded frame from it. Putting those
//! behind traits keeps the worker's reconnection machinery testable against
//! scripted sources, with the ffmpeg-backed implementation used in
//! production.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Factory for live frame readers, one per connection attempt.
#[async_trait]
pub trait FrameSource: Send + Sync + 'static {
    type Reader: FrameReader;

    /// Open a connection to the given RTSP URL.
    ///
    /// Returning does not yet mean frames are flowing; the worker treats
    /// the first successfully read frame as proof of a live connection.
    async fn open(&self, url: &str) -> Result<Self::Reader>;
}

/// One live connection delivering encoded frames.
#[async_trait]
pub trait FrameReader: Send {
    /// Pull the next encoded (JPEG) frame, blocking this task until the
    /// source delivers one.
    async fn read_frame(&mut self) -> Result<Bytes>;

    /// Release the underlying connection. Must be called (and awaited)
    /// before the reader is discarded so the transport is torn down
    /// deterministically rather than whenever drop happens to run.
    async fn close(&mut self);
}
