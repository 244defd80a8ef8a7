//! Real-time floor control
//!
//! Decides frame by frame who holds the conversational floor:
//!
//! - **VAD** - debounced RMS onset/offset detection
//! - **Pre-roll** - keeps the syllables spoken before onset was confirmed
//! - **Coordinator** - the state machine that gates the microphone
//! - **Scheduler** - gapless agent playback on the output clock
//! - **Watchdog** - nudges a silent candidate once per idle window

pub mod coordinator;
pub mod preroll;
pub mod scheduler;
pub mod state;
pub mod timer;
pub mod transcript;
pub mod vad;
pub mod watchdog;

use std::time::Duration;

use serde::Deserialize;

use crate::voice::INPUT_SAMPLE_RATE;

pub use coordinator::{Coordinator, Effect, FloorEvent, chunk_duration};
pub use preroll::PreRollBuffer;
pub use scheduler::{PlaybackScheduler, ScheduledSource, SourceId};
pub use state::FloorState;
pub use timer::{Deadlines, TimerKind, TimerSlots, TimerToken};
pub use transcript::{Role, Transcript, TranscriptEntry};
pub use vad::{MicCheck, MicLevel, Sensitivity, ThresholdTable, VoiceActivityDetector};
pub use watchdog::SilenceWatchdog;

/// Samples per microphone frame
pub const DEFAULT_FRAME_SIZE: usize = 2048;

/// Audio kept ahead of a confirmed onset
pub const DEFAULT_PREROLL: Duration = Duration::from_millis(500);

/// Timing and detection parameters of the floor
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FloorConfig {
    /// Taken from the session setup
    #[serde(skip)]
    pub sensitivity: Sensitivity,

    /// Continuous excursion needed before onset
    #[serde(with = "millis")]
    pub debounce: Duration,

    /// Continuous quiet needed before offset
    #[serde(with = "millis")]
    pub hangover: Duration,

    /// Delay before the "agent thinking" hint
    #[serde(with = "millis")]
    pub candidate_grace: Duration,

    /// Headroom reserved before the first chunk of an agent turn
    #[serde(with = "millis")]
    pub lead_time: Duration,

    /// Quiet period after the last agent source ends
    #[serde(with = "millis")]
    pub drain_delay: Duration,

    /// Silence before the check-in prompt
    #[serde(with = "millis")]
    pub silence_nudge: Duration,

    /// Taken from the audio settings
    #[serde(skip)]
    pub input_sample_rate: u32,

    /// Microphone audio replayed once speech is confirmed
    #[serde(with = "millis")]
    pub preroll: Duration,

    pub frame_size: usize,

    /// Keep detecting speech while the agent holds the floor
    pub local_barge_in: bool,
}

impl Default for FloorConfig {
    fn default() -> Self {
        Self {
            sensitivity: Sensitivity::Normal,
            debounce: Duration::from_millis(200),
            hangover: Duration::from_millis(500),
            candidate_grace: Duration::from_millis(1000),
            lead_time: Duration::from_millis(800),
            drain_delay: Duration::from_millis(600),
            silence_nudge: Duration::from_millis(3500),
            input_sample_rate: INPUT_SAMPLE_RATE,
            preroll: DEFAULT_PREROLL,
            frame_size: DEFAULT_FRAME_SIZE,
            local_barge_in: false,
        }
    }
}

impl FloorConfig {
    /// Pre-roll capacity in samples at the input rate
    #[must_use]
    pub fn preroll_samples(&self) -> usize {
        let samples = self.preroll.as_millis() * u128::from(self.input_sample_rate) / 1000;
        usize::try_from(samples).unwrap_or(usize::MAX)
    }
}

/// Durations written as integer milliseconds in config files
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_floor_table_keeps_defaults() {
        let config: FloorConfig = toml::from_str(
            r#"
            drain_delay = 900
            local_barge_in = true
            "#,
        )
        .unwrap();

        assert_eq!(config.sensitivity, Sensitivity::Normal);
        assert_eq!(config.drain_delay, Duration::from_millis(900));
        assert!(config.local_barge_in);
        assert_eq!(config.lead_time, Duration::from_millis(800));
        assert_eq!(config.preroll_samples(), 8000);
    }

    #[test]
    fn preroll_follows_input_rate() {
        let config = FloorConfig {
            input_sample_rate: 48_000,
            ..FloorConfig::default()
        };
        assert_eq!(config.preroll_samples(), 24_000);

        let config: FloorConfig = toml::from_str("preroll = 250").unwrap();
        assert_eq!(config.preroll, Duration::from_millis(250));
        assert_eq!(config.preroll_samples(), 4000);
    }
}
