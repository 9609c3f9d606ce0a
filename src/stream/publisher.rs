//! Per-viewer frame sequence
//!
//! A [`FramePublisher`] adapts a [`FrameSlot`] into the lazy, infinite
//! sequence of frames one HTTP viewer consumes. Each publisher tracks the
//! last sequence number it yielded, so a viewer never receives the same
//! frame twice in a row; a slow viewer simply skips ahead to whatever is
//! newest when it next pulls.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::frame::Frame;
use super::slot::FrameSlot;

/// Boundary string separating parts of the `multipart/x-mixed-replace`
/// stream. Must never occur inside JPEG data.
pub const MULTIPART_BOUNDARY: &str = "cambridge-frame";

/// Adapts a frame slot into one viewer's frame sequence.
pub struct FramePublisher {
    slot: Arc<FrameSlot>,
    last_seq: u64,
    poll_interval: Duration,
}

impl FramePublisher {
    /// Create a publisher over `slot`.
    ///
    /// `poll_interval` bounds how stale a viewer can be after a publish
    /// whose wakeup was missed; tens of milliseconds is plenty for video.
    pub fn new(slot: Arc<FrameSlot>, poll_interval: Duration) -> Self {
        Self {
            slot,
            last_seq: 0,
            poll_interval,
        }
    }

    /// Next frame for this viewer.
    ///
    /// Waits until the slot holds a sequence number different from the last
    /// one yielded here. Keeps waiting across transient stream errors (the
    /// worker will reconnect and publish again); returns `None` only once
    /// the slot has been closed and its final frame consumed.
    pub async fn next(&mut self) -> Option<Arc<Frame>> {
        loop {
            if let Some(frame) = self.slot.latest() {
                if frame.seq != self.last_seq {
                    self.last_seq = frame.seq;
                    return Some(frame);
                }
            }
            if self.slot.is_closed() {
                return None;
            }
            // A publish may slip in between the check above and parking on
            // the notify; the timeout bounds the staleness either way.
            let _ = tokio::time::timeout(self.poll_interval, self.slot.changed()).await;
        }
    }
}

/// MIME type for an MJPEG multipart stream built from [`multipart_chunk`].
pub fn multipart_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={MULTIPART_BOUNDARY}")
}

/// Render one frame as a `multipart/x-mixed-replace` part.
///
/// Browsers render this natively via `<img src=...>`; the web layer just
/// concatenates chunks onto the response body.
pub fn multipart_chunk(frame: &Frame) -> Bytes {
    let header = format!(
        "--{MULTIPART_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        frame.data.len()
    );

    let mut out = Vec::with_capacity(header.len() + frame.data.len() + 2);
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(&frame.data);
    out.extend_from_slice(b"\r\n");
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_yields_each_frame_once() {
        let slot = Arc::new(FrameSlot::new());
        let mut publisher = FramePublisher::new(Arc::clone(&slot), Duration::from_millis(5));

        slot.publish(Bytes::from_static(b"f1"));
        let a = publisher.next().await.unwrap();
        assert_eq!(a.seq, 1);

        slot.publish(Bytes::from_static(b"f2"));
        let b = publisher.next().await.unwrap();
        assert_eq!(b.seq, 2);
        assert_ne!(a.seq, b.seq);
    }

    #[tokio::test]
    async fn test_waits_instead_of_repeating() {
        let slot = Arc::new(FrameSlot::new());
        let mut publisher = FramePublisher::new(Arc::clone(&slot), Duration::from_millis(5));

        slot.publish(Bytes::from_static(b"f1"));
        assert_eq!(publisher.next().await.unwrap().seq, 1);

        // No new frame: next() must wait rather than repeat seq 1.
        let waited = tokio::time::timeout(Duration::from_millis(50), publisher.next()).await;
        assert!(waited.is_err());

        slot.publish(Bytes::from_static(b"f2"));
        assert_eq!(publisher.next().await.unwrap().seq, 2);
    }

    #[tokio::test]
    async fn test_slow_viewer_skips_to_newest() {
        let slot = Arc::new(FrameSlot::new());
        let mut publisher = FramePublisher::new(Arc::clone(&slot), Duration::from_millis(5));

        slot.publish(Bytes::from_static(b"f1"));
        slot.publish(Bytes::from_static(b"f2"));
        slot.publish(Bytes::from_static(b"f3"));

        // Intermediate frames are gone; the viewer gets the newest.
        assert_eq!(publisher.next().await.unwrap().seq, 3);
    }

    #[tokio::test]
    async fn test_terminates_after_close_and_drain() {
        let slot = Arc::new(FrameSlot::new());
        let mut publisher = FramePublisher::new(Arc::clone(&slot), Duration::from_millis(5));

        slot.publish(Bytes::from_static(b"last"));
        slot.close();

        // The final frame is still delivered, then the sequence ends.
        assert_eq!(publisher.next().await.unwrap().seq, 1);
        assert!(publisher.next().await.is_none());
    }

    #[tokio::test]
    async fn test_two_publishers_are_independent() {
        let slot = Arc::new(FrameSlot::new());
        let mut a = FramePublisher::new(Arc::clone(&slot), Duration::from_millis(5));
        let mut b = FramePublisher::new(Arc::clone(&slot), Duration::from_millis(5));

        slot.publish(Bytes::from_static(b"f1"));
        assert_eq!(a.next().await.unwrap().seq, 1);
        assert_eq!(b.next().await.unwrap().seq, 1);

        slot.publish(Bytes::from_static(b"f2"));
        assert_eq!(b.next().await.unwrap().seq, 2);
        assert_eq!(a.next().await.unwrap().seq, 2);
    }

    #[test]
    fn test_multipart_chunk_framing() {
        let frame = Frame {
            data: Bytes::from_static(b"\xFF\xD8jpeg\xFF\xD9"),
            seq: 7,
            captured_at: std::time::SystemTime::now(),
        };

        let chunk = multipart_chunk(&frame);
        let text = String::from_utf8_lossy(&chunk);

        assert!(text.starts_with("--cambridge-frame\r\n"));
        assert!(text.contains("Content-Type: image/jpeg\r\n"));
        assert!(text.contains("Content-Length: 8\r\n\r\n"));
        assert!(chunk.ends_with(b"\r\n"));
    }
}
