//! Single-writer/multi-reader latest-frame cell

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use tokio::sync::Notify;

use super::frame::Frame;

/// Holds the most recent [`Frame`] of one stream.
///
/// `publish` atomically replaces the held frame; the superseded frame is
/// dropped as soon as the last reader releases its `Arc`. `latest` is
/// wait-free: readers never block the writer and the writer never blocks
/// readers. A reader that is too slow simply misses frames.
pub struct FrameSlot {
    latest: ArcSwapOption<Frame>,
    next_seq: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            latest: ArcSwapOption::const_empty(),
            next_seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Replace the held frame, assigning the next sequence number.
    ///
    /// Wakes any publishers waiting in [`changed`](Self::changed). Returns
    /// the assigned sequence number.
    pub fn publish(&self, data: Bytes) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.latest.store(Some(Arc::new(Frame {
            data,
            seq,
            captured_at: SystemTime::now(),
        })));
        self.notify.notify_waiters();
        seq
    }

    /// Currently held frame, if any has been published yet.
    ///
    /// Never blocks and never observes a torn value: the swap is atomic.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.latest.load_full()
    }

    /// Mark the stream permanently gone (shutdown).
    ///
    /// Publishers drain any final frame and then terminate. Transient
    /// stream errors do not close the slot; only the bridge shutdown does.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait until a publish or close wakes us.
    ///
    /// A notification between a `latest` check and this call can be lost,
    /// which is why callers bound the wait with a poll interval.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}
