//! Attempt-versioned state registry

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{Channel, ConnectionState};

/// Token identifying one reconnection attempt on one channel.
///
/// Attempt ids are monotonically increasing per channel. A state update
/// stamped with an old attempt id is a leftover from an abandoned attempt
/// and is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AttemptId(u64);

#[derive(Debug, Clone)]
struct Entry {
    attempt: u64,
    state: ConnectionState,
}

/// Point-in-time view of all three channels, as served to the dashboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub onvif: ConnectionState,
    pub primary_stream: ConnectionState,
    pub secondary_stream: ConnectionState,
}

/// Single source of truth for channel states.
///
/// Writers hold the lock only long enough to compare attempt ids and store
/// an enum; readers take a consistent snapshot of all three channels under
/// the same lock, so a snapshot can never observe a value mid-update.
pub struct StatusRegistry {
    next_attempt: [AtomicU64; 3],
    entries: Mutex<[Entry; 3]>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        let entry = Entry {
            attempt: 0,
            state: ConnectionState::Disconnected,
        };
        Self {
            next_attempt: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
            entries: Mutex::new([entry.clone(), entry.clone(), entry]),
        }
    }

    /// Allocate the next attempt id for a channel.
    ///
    /// Every connection attempt must get a fresh id before reporting state.
    pub fn begin_attempt(&self, channel: Channel) -> AttemptId {
        let id = self.next_attempt[channel.index()].fetch_add(1, Ordering::Relaxed) + 1;
        AttemptId(id)
    }

    /// Record an observed state for a channel.
    ///
    /// Returns `false` (and leaves the entry untouched) if `attempt` is
    /// older than the last accepted attempt for that channel.
    pub fn update(&self, channel: Channel, attempt: AttemptId, state: ConnectionState) -> bool {
        let mut entries = self.entries.lock().expect("status registry poisoned");
        let entry = &mut entries[channel.index()];

        if attempt.0 < entry.attempt {
            tracing::trace!(
                channel = %channel,
                attempt = attempt.0,
                current = entry.attempt,
                "Discarding stale status update"
            );
            return false;
        }

        if entry.state != state {
            tracing::debug!(channel = %channel, attempt = attempt.0, state = %state, "Channel state");
        }
        entry.attempt = attempt.0;
        entry.state = state;
        true
    }

    /// Current state of one channel
    pub fn state(&self, channel: Channel) -> ConnectionState {
        let entries = self.entries.lock().expect("status registry poisoned");
        entries[channel.index()].state
    }

    /// Consistent view of all three channels at one instant
    pub fn snapshot(&self) -> StatusSnapshot {
        let entries = self.entries.lock().expect("status registry poisoned");
        StatusSnapshot {
            onvif: entries[Channel::Control.index()].state,
            primary_stream: entries[Channel::PrimaryStream.index()].state,
            secondary_stream: entries[Channel::SecondaryStream.index()].state,
        }
    }
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}
