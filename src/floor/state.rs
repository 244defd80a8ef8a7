//! Floor ownership state

use std::fmt;

use serde::Serialize;

/// Who currently holds the floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FloorState {
    /// Nobody is speaking
    #[default]
    Idle,
    /// Candidate speech confirmed
    CandidateSpeaking,
    /// Candidate went quiet, waiting out the grace delay
    CandidateTrailing,
    /// First agent chunk is scheduled inside the lead window
    AgentPreparing,
    /// Agent audio is playing
    AgentSpeaking,
    /// Agent audio finished, waiting out the drain delay
    AgentTrailing,
}

impl FloorState {
    /// Whether outbound microphone audio must be muted
    #[must_use]
    pub const fn is_locked(self) -> bool {
        matches!(self, Self::AgentPreparing | Self::AgentSpeaking)
    }

    /// Whether the agent holds or is about to hold the floor
    #[must_use]
    pub const fn is_agent(self) -> bool {
        matches!(
            self,
            Self::AgentPreparing | Self::AgentSpeaking | Self::AgentTrailing
        )
    }
}

impl fmt::Display for FloorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::CandidateSpeaking => "candidate_speaking",
            Self::CandidateTrailing => "candidate_trailing",
            Self::AgentPreparing => "agent_preparing",
            Self::AgentSpeaking => "agent_speaking",
            Self::AgentTrailing => "agent_trailing",
        };
        f.write_str(name)
    }
}
