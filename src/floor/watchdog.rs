//! Silence watchdog
//!
//! Armed when the agent hands the floor back; if nobody has spoken when it
//! fires, the session sends a single check-in prompt. It never re-arms
//! itself: the next agent turn does that.

use std::time::Duration;

use super::timer::{TimerKind, TimerSlots, TimerToken};

/// Single outstanding silence timer
#[derive(Debug, Clone)]
pub struct SilenceWatchdog {
    delay: Duration,
    nudges: u32,
}

impl SilenceWatchdog {
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay, nudges: 0 }
    }

    /// Arm for a fresh idle window, replacing any pending arming
    pub const fn arm(&self, slots: &mut TimerSlots) -> (TimerToken, Duration) {
        (slots.arm(TimerKind::Watchdog), self.delay)
    }

    /// Cancel a pending arming; returns whether one was pending
    pub const fn cancel(&self, slots: &mut TimerSlots) -> bool {
        slots.cancel(TimerKind::Watchdog)
    }

    /// Handle a firing
    ///
    /// Returns `true` when the check-in prompt should be sent: the token
    /// is current and the floor is still free.
    pub fn fire(&mut self, token: TimerToken, slots: &mut TimerSlots, floor_free: bool) -> bool {
        debug_assert_eq!(token.kind, TimerKind::Watchdog);
        if !slots.accept(token) {
            tracing::trace!(generation = token.generation, "stale watchdog firing ignored");
            return false;
        }
        if !floor_free {
            tracing::debug!("watchdog fired while floor occupied, skipping nudge");
            return false;
        }
        self.nudges += 1;
        true
    }

    /// Number of check-ins sent this session
    #[must_use]
    pub const fn nudges(&self) -> u32 {
        self.nudges
    }
}
