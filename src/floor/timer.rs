//! Deferred one-shot timers
//!
//! The coordinator only deals in [`TimerToken`]s: arming a kind bumps its
//! generation, so a firing that raced with a cancel or re-arm carries a
//! stale token and is dropped without touching floor state.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// The deferred callbacks the floor relies on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Candidate went quiet; hint that the agent is thinking
    CandidateGrace,
    /// Lead window of the first agent chunk elapsed
    AgentStart,
    /// Agent audio drained; hand the floor back
    Drain,
    /// Nobody spoke after the agent finished
    Watchdog,
}

impl TimerKind {
    const ALL: [Self; 4] = [
        Self::CandidateGrace,
        Self::AgentStart,
        Self::Drain,
        Self::Watchdog,
    ];

    const fn index(self) -> usize {
        match self {
            Self::CandidateGrace => 0,
            Self::AgentStart => 1,
            Self::Drain => 2,
            Self::Watchdog => 3,
        }
    }
}

impl std::fmt::Display for TimerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CandidateGrace => "candidate_grace",
            Self::AgentStart => "agent_start",
            Self::Drain => "drain",
            Self::Watchdog => "watchdog",
        };
        f.write_str(name)
    }
}

/// Identifies one arming of a timer kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub generation: u64,
}

/// Generation bookkeeping, one slot per kind
#[derive(Debug, Clone, Default)]
pub struct TimerSlots {
    generations: [u64; 4],
    armed: [bool; 4],
}

impl TimerSlots {
    /// Arm `kind`, superseding any outstanding arming
    pub const fn arm(&mut self, kind: TimerKind) -> TimerToken {
        let i = kind.index();
        self.generations[i] += 1;
        self.armed[i] = true;
        TimerToken {
            kind,
            generation: self.generations[i],
        }
    }

    /// Disarm `kind`; returns whether it was armed
    pub const fn cancel(&mut self, kind: TimerKind) -> bool {
        let i = kind.index();
        let was_armed = self.armed[i];
        self.armed[i] = false;
        was_armed
    }

    /// Consume a firing; `false` for stale or cancelled tokens
    pub const fn accept(&mut self, token: TimerToken) -> bool {
        let i = token.kind.index();
        if !self.armed[i] || self.generations[i] != token.generation {
            return false;
        }
        self.armed[i] = false;
        true
    }

    #[must_use]
    pub const fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed[kind.index()]
    }

    /// Kinds currently armed
    #[must_use]
    pub fn armed(&self) -> Vec<TimerKind> {
        TimerKind::ALL
            .into_iter()
            .filter(|kind| self.is_armed(*kind))
            .collect()
    }
}

/// Wall-clock deadlines for armed timers, driven by the session task
#[derive(Debug, Default)]
pub struct Deadlines {
    pending: HashMap<TimerKind, (Instant, TimerToken)>,
}

impl Deadlines {
    pub fn arm(&mut self, token: TimerToken, after: Duration) {
        self.pending
            .insert(token.kind, (Instant::now() + after, token));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.pending.remove(&kind);
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Earliest deadline, if any timer is pending
    #[must_use]
    pub fn next(&self) -> Option<(Instant, TimerToken)> {
        self.pending.values().min_by_key(|(at, _)| *at).copied()
    }

    /// Forget a deadline that has fired
    pub fn fired(&mut self, token: TimerToken) {
        if self
            .pending
            .get(&token.kind)
            .is_some_and(|(_, pending)| *pending == token)
        {
            self.pending.remove(&token.kind);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Sleep until `next` and yield its token; never resolves for `None`
pub async fn wait_for(next: Option<(Instant, TimerToken)>) -> TimerToken {
    match next {
        Some((deadline, token)) => {
            tokio::time::sleep_until(deadline).await;
            token
        }
        None => std::future::pending().await,
    }
}
