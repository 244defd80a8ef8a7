//! Transcript aggregation
//!
//! Incremental transcription deltas arrive word by word; consecutive deltas
//! from the same speaker are folded into one utterance.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Speaker of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The remote interviewer
    Agent,
    /// The local speaker
    Candidate,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent => write!(f, "agent"),
            Self::Candidate => write!(f, "candidate"),
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" | "interviewer" => Ok(Self::Agent),
            "candidate" | "user" => Ok(Self::Candidate),
            other => Err(Error::RemoteSession(format!("unknown transcript role: {other}"))),
        }
    }
}

/// One utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
}

/// Ordered, append-only sequence of utterances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a delta, coalescing with the last entry when roles match
    pub fn push_delta(&mut self, role: Role, text: &str) {
        if text.is_empty() {
            return;
        }

        if let Some(last) = self.entries.last_mut().filter(|e| e.role == role) {
            let needs_space = !last.text.ends_with(char::is_whitespace)
                && !text.starts_with(char::is_whitespace);
            if needs_space {
                last.text.push(' ');
            }
            last.text.push_str(text);
            return;
        }

        self.entries.push(TranscriptEntry {
            role,
            text: text.to_string(),
        });
    }

    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<TranscriptEntry>> for Transcript {
    fn from(entries: Vec<TranscriptEntry>) -> Self {
        Self { entries }
    }
}

/// Whitespace-separated words spoken by `role`
#[must_use]
pub fn count_words(entries: &[TranscriptEntry], role: Role) -> usize {
    entries
        .iter()
        .filter(|e| e.role == role)
        .map(|e| e.text.split_whitespace().count())
        .sum()
}
