//! Agent playback scheduling
//!
//! Keeps a single cursor in the output clock domain so chunks of one agent
//! turn play back to back no matter how jittery their arrival was.

use std::collections::BTreeMap;
use std::time::Duration;

/// Identifier of a scheduled playback source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub u64);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "src-{}", self.0)
    }
}

/// A chunk placed on the output clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledSource {
    pub id: SourceId,
    /// Start offset on the output clock
    pub start: Duration,
    pub duration: Duration,
}

impl ScheduledSource {
    #[must_use]
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

/// Cursor and active set for agent playback
#[derive(Debug, Clone)]
pub struct PlaybackScheduler {
    lead_time: Duration,
    cursor: Duration,
    turn_open: bool,
    next_id: u64,
    active: BTreeMap<SourceId, ScheduledSource>,
}

impl PlaybackScheduler {
    #[must_use]
    pub const fn new(lead_time: Duration) -> Self {
        Self {
            lead_time,
            cursor: Duration::ZERO,
            turn_open: false,
            next_id: 0,
            active: BTreeMap::new(),
        }
    }

    /// Place a chunk of `duration` on the output clock
    ///
    /// The first chunk of a turn starts at `max(cursor, now) + lead`; every
    /// later chunk starts exactly where the previous one ends.
    pub fn schedule(&mut self, duration: Duration, now: Duration) -> ScheduledSource {
        let start = if self.turn_open {
            self.cursor
        } else {
            self.turn_open = true;
            self.cursor.max(now) + self.lead_time
        };

        self.push(start, duration)
    }

    /// Place a chunk that continues a draining turn
    ///
    /// Used when audio arrives after the active set emptied but before the
    /// turn was closed; starts at the cursor or immediately, whichever is
    /// later.
    pub fn resume(&mut self, duration: Duration, now: Duration) -> ScheduledSource {
        self.turn_open = true;
        let start = self.cursor.max(now);
        self.push(start, duration)
    }

    fn push(&mut self, start: Duration, duration: Duration) -> ScheduledSource {
        let id = SourceId(self.next_id);
        self.next_id += 1;
        self.cursor = start + duration;

        let source = ScheduledSource {
            id,
            start,
            duration,
        };
        self.active.insert(id, source);

        tracing::trace!(
            %id,
            start_ms = start.as_millis(),
            duration_ms = duration.as_millis(),
            "playback source scheduled"
        );

        source
    }

    /// Remove a source that finished playing
    ///
    /// Returns `false` for ids that are no longer active, such as sources
    /// already stopped by a barge-in.
    pub fn finish(&mut self, id: SourceId) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Stop everything: clear the active set and reset the cursor
    ///
    /// Returns the ids that must be silenced on the output device.
    pub fn stop_all(&mut self) -> Vec<SourceId> {
        let stopped: Vec<SourceId> = self.active.keys().copied().collect();
        self.active.clear();
        self.cursor = Duration::ZERO;
        self.turn_open = false;
        stopped
    }

    /// Close the current turn so the next chunk gets a fresh lead time
    pub const fn end_turn(&mut self) {
        self.turn_open = false;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    #[must_use]
    pub const fn cursor(&self) -> Duration {
        self.cursor
    }
}
