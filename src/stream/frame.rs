//! Decoded frame type

use std::time::SystemTime;

use bytes::Bytes;

/// One encoded (JPEG) video frame.
///
/// Cheap to clone: the payload is reference-counted. Sequence numbers are
/// assigned by the [`FrameSlot`](crate::stream::FrameSlot) on publish and
/// increase strictly within one stream, so consumers can detect "new frame"
/// without comparing payloads.
#[derive(Debug, Clone)]
pub struct Frame {
    /// JPEG-encoded image data
    pub data: Bytes,
    /// Per-stream sequence number, strictly increasing, starts at 1
    pub seq: u64,
    /// Wall-clock capture time
    pub captured_at: SystemTime,
}
