//! Error types for Parley

use thiserror::Error;

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in a Parley session
#[derive(Debug, Error)]
pub enum Error {
    /// Microphone or speaker could not be acquired
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Remote agent session transport or auth failure
    #[error("remote session error: {0}")]
    RemoteSession(String),

    /// Malformed inbound audio chunk
    #[error("decode failure: {0}")]
    Decode(String),

    /// Audio stream error after the device was acquired
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transcript holds no candidate speech to grade
    #[error("insufficient evidence: {0}")]
    InsufficientEvidence(String),

    /// Analysis service error
    #[error("analysis error: {0}")]
    Analysis(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error ends the session
    ///
    /// Decode failures only cost the offending chunk
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_failures_are_not_fatal() {
        assert!(!Error::Decode("odd length".to_string()).is_fatal());
        assert!(Error::RemoteSession("closed".to_string()).is_fatal());
        assert!(Error::DeviceUnavailable("no mic".to_string()).is_fatal());
    }
}
