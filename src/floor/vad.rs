//! Energy-based voice activity detection
//!
//! Scores each frame by RMS against a sensitivity threshold, debounces
//! onsets and holds offsets so that single-frame spikes and short pauses
//! do not flip the floor.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Named microphone sensitivity, picked once per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    /// Quiet room, lowest cutoff
    High,
    /// Default cutoff
    #[default]
    Normal,
    /// Noisy room, highest cutoff
    Low,
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Sensitivity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            other => Err(Error::Config(format!("unknown sensitivity: {other}"))),
        }
    }
}

/// RMS cutoffs for each sensitivity plus the meter scaling used with them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdTable {
    pub high: f32,
    pub normal: f32,
    pub low: f32,
    /// Meter value reported when RMS sits exactly at the threshold
    pub meter_scale: f32,
}

impl ThresholdTable {
    /// Pre-flight microphone check
    pub const CALIBRATION: Self = Self {
        high: 0.008,
        normal: 0.02,
        low: 0.045,
        meter_scale: 50.0,
    };

    /// Live session
    pub const LIVE: Self = Self {
        high: 0.005,
        normal: 0.012,
        low: 0.035,
        meter_scale: 30.0,
    };

    /// RMS cutoff for a sensitivity
    #[must_use]
    pub const fn threshold(&self, sensitivity: Sensitivity) -> f32 {
        match sensitivity {
            Sensitivity::High => self.high,
            Sensitivity::Normal => self.normal,
            Sensitivity::Low => self.low,
        }
    }
}

/// Root-mean-square amplitude of a block of samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Normalized 0-100 meter value, advisory only
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn meter_level(rms: f32, threshold: f32, scale: f32) -> u8 {
    if threshold <= 0.0 {
        return 0;
    }
    (rms / threshold * scale).clamp(0.0, 100.0) as u8
}

/// Speech boundary reported by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadTransition {
    /// Speech confirmed after the debounce window
    Onset,
    /// Speech ended after the hangover window
    Offset,
}

/// Result of scoring one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadReading {
    /// RMS of the raw frame
    pub rms: f32,
    /// Meter value for display
    pub meter: u8,
    /// Whether the frame cleared the effective threshold
    pub above_threshold: bool,
    /// Boundary confirmed by this frame, if any
    pub transition: Option<VadTransition>,
}

/// Debounced RMS detector
#[derive(Debug, Clone)]
pub struct VoiceActivityDetector {
    threshold: f32,
    meter_scale: f32,
    debounce: Duration,
    hangover: Duration,
    excursion_start: Option<Duration>,
    last_voiced: Option<Duration>,
    speaking: bool,
}

impl VoiceActivityDetector {
    /// Create a detector from a threshold table entry
    #[must_use]
    pub fn new(
        table: &ThresholdTable,
        sensitivity: Sensitivity,
        debounce: Duration,
        hangover: Duration,
    ) -> Self {
        tracing::debug!(
            %sensitivity,
            threshold = table.threshold(sensitivity),
            debounce_ms = debounce.as_millis(),
            hangover_ms = hangover.as_millis(),
            "voice activity detector initialized"
        );

        Self {
            threshold: table.threshold(sensitivity),
            meter_scale: table.meter_scale,
            debounce,
            hangover,
            excursion_start: None,
            last_voiced: None,
            speaking: false,
        }
    }

    /// Score one frame captured at `at` (session-relative)
    ///
    /// While `locked` the threshold is unreachable: no excursion can begin
    /// and any excursion in progress is dropped. The meter still reflects
    /// the raw samples.
    pub fn process(&mut self, samples: &[f32], at: Duration, locked: bool) -> VadReading {
        let energy = rms(samples);
        let meter = meter_level(energy, self.threshold, self.meter_scale);
        let effective = if locked { f32::INFINITY } else { self.threshold };
        let above_threshold = energy > effective;

        let mut transition = None;

        if above_threshold {
            let started = *self.excursion_start.get_or_insert(at);
            if self.speaking {
                self.last_voiced = Some(at);
            } else if at.saturating_sub(started) >= self.debounce {
                self.speaking = true;
                self.last_voiced = Some(at);
                transition = Some(VadTransition::Onset);
                tracing::trace!(energy, "speech onset");
            }
        } else {
            self.excursion_start = None;
            if self.speaking {
                let last = self.last_voiced.unwrap_or(at);
                if at.saturating_sub(last) >= self.hangover {
                    self.speaking = false;
                    self.last_voiced = None;
                    transition = Some(VadTransition::Offset);
                    tracing::trace!(energy, "speech offset");
                }
            }
        }

        VadReading {
            rms: energy,
            meter,
            above_threshold,
            transition,
        }
    }

    /// Whether an onset has been confirmed without a matching offset
    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.speaking
    }
}

/// One pre-flight meter sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MicLevel {
    pub rms: f32,
    pub meter: u8,
    /// Whether a live session would count this frame as speech energy
    pub would_trigger: bool,
}

/// Pre-flight microphone check against the calibration table
#[derive(Debug, Clone, Copy)]
pub struct MicCheck {
    threshold: f32,
    meter_scale: f32,
}

impl MicCheck {
    #[must_use]
    pub const fn new(sensitivity: Sensitivity) -> Self {
        let table = ThresholdTable::CALIBRATION;
        Self {
            threshold: table.threshold(sensitivity),
            meter_scale: table.meter_scale,
        }
    }

    /// Measure one frame
    #[must_use]
    pub fn measure(&self, samples: &[f32]) -> MicLevel {
        let energy = rms(samples);
        MicLevel {
            rms: energy,
            meter: meter_level(energy, self.threshold, self.meter_scale),
            would_trigger: energy > self.threshold,
        }
    }
}
