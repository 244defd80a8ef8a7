//! Configuration management for Parley
//!
//! Precedence: CLI flags > environment > `config.toml` > defaults. CLI
//! overrides are applied by the binary after [`Config::load`].

pub mod file;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::floor::{FloorConfig, Sensitivity};
use crate::prompt::{DEFAULT_INTERVIEWER, DEFAULT_VOICE, Difficulty, Language};
use crate::voice::{INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use crate::{Error, Result};

use file::ParleyConfigFile;

/// Interview setup, fixed for the whole session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSetup {
    pub candidate_name: String,
    pub company: String,
    pub job_title: String,
    pub career_field: String,
    pub experience: String,
    pub language: Language,
    pub sensitivity: Sensitivity,
    pub difficulty: Difficulty,
    pub interviewer_name: String,
    pub interviewer_voice: String,
}

impl Default for SessionSetup {
    fn default() -> Self {
        Self {
            candidate_name: "Candidate".to_string(),
            company: "the company".to_string(),
            job_title: "an entry-level position".to_string(),
            career_field: "General".to_string(),
            experience: "no prior work experience".to_string(),
            language: Language::English,
            sensitivity: Sensitivity::Normal,
            difficulty: Difficulty::Student,
            interviewer_name: DEFAULT_INTERVIEWER.to_string(),
            interviewer_voice: DEFAULT_VOICE.to_string(),
        }
    }
}

/// Device sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    /// Microphone capture and outbound audio rate
    pub input_sample_rate: u32,
    /// Speaker rate
    pub output_sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
        }
    }
}

/// Remote agent session endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: Option<String>,
    pub token: Option<String>,
}

/// Grading service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Service endpoint; analysis is skipped when unset
    pub url: Option<String>,
    pub primary_model: String,
    pub fallback_model: String,
    /// Wait before retrying a rate-limited request
    pub retry_delay: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            url: None,
            primary_model: "gemini-3-pro-preview".to_string(),
            fallback_model: "gemini-3-flash-preview".to_string(),
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Parley configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub session: SessionSetup,
    pub floor: FloorConfig,
    pub audio: AudioConfig,
    pub remote: RemoteConfig,
    pub analysis: AnalysisConfig,
}

impl Config {
    /// Load configuration from the config file and environment
    ///
    /// # Errors
    ///
    /// Returns error if an environment override is malformed or the result
    /// fails validation
    pub fn load() -> Result<Self> {
        Self::resolve(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with environment lookups over defaults
    ///
    /// # Errors
    ///
    /// Returns error if an environment override is malformed or the result
    /// fails validation
    pub fn resolve(fc: ParleyConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = SessionSetup::default();
        let s = fc.session;

        let language = match env("PARLEY_LANGUAGE") {
            Some(value) => value.parse()?,
            None => s.language.unwrap_or(defaults.language),
        };
        let sensitivity = match env("PARLEY_SENSITIVITY") {
            Some(value) => value.parse()?,
            None => s.sensitivity.unwrap_or(defaults.sensitivity),
        };

        let session = SessionSetup {
            candidate_name: s.candidate_name.unwrap_or(defaults.candidate_name),
            company: s.company.unwrap_or(defaults.company),
            job_title: s.job_title.unwrap_or(defaults.job_title),
            career_field: s.career_field.unwrap_or(defaults.career_field),
            experience: s.experience.unwrap_or(defaults.experience),
            language,
            sensitivity,
            difficulty: s.difficulty.unwrap_or(defaults.difficulty),
            interviewer_name: s.interviewer_name.unwrap_or(defaults.interviewer_name),
            interviewer_voice: s.interviewer_voice.unwrap_or(defaults.interviewer_voice),
        };

        let audio_defaults = AudioConfig::default();
        let audio = AudioConfig {
            input_sample_rate: fc
                .audio
                .input_sample_rate
                .unwrap_or(audio_defaults.input_sample_rate),
            output_sample_rate: fc
                .audio
                .output_sample_rate
                .unwrap_or(audio_defaults.output_sample_rate),
        };

        let mut floor = fc.floor;
        floor.sensitivity = sensitivity;
        floor.input_sample_rate = audio.input_sample_rate;
        if let Some(value) = env("PARLEY_LOCAL_BARGE_IN") {
            floor.local_barge_in = parse_bool("PARLEY_LOCAL_BARGE_IN", &value)?;
        }

        let remote = RemoteConfig {
            url: env("PARLEY_REMOTE_URL").or(fc.remote.url),
            token: env("PARLEY_REMOTE_TOKEN").or(fc.remote.token),
        };

        let analysis_defaults = AnalysisConfig::default();
        let analysis = AnalysisConfig {
            url: env("PARLEY_ANALYSIS_URL").or(fc.analysis.url),
            primary_model: fc
                .analysis
                .primary_model
                .unwrap_or(analysis_defaults.primary_model),
            fallback_model: fc
                .analysis
                .fallback_model
                .unwrap_or(analysis_defaults.fallback_model),
            retry_delay: fc
                .analysis
                .retry_delay_ms
                .map_or(analysis_defaults.retry_delay, Duration::from_millis),
        };

        let config = Self {
            session,
            floor,
            audio,
            remote,
            analysis,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the session cannot run with
    ///
    /// # Errors
    ///
    /// Returns `Config` for zero frame sizes or sample rates, or a pre-roll
    /// too short to cover the onset debounce
    pub fn validate(&self) -> Result<()> {
        if self.floor.frame_size == 0 {
            return Err(Error::Config("floor.frame_size must be positive".to_string()));
        }
        if self.audio.input_sample_rate == 0 || self.audio.output_sample_rate == 0 {
            return Err(Error::Config("sample rates must be positive".to_string()));
        }
        if self.floor.preroll_samples() == 0 || self.floor.preroll < self.floor.debounce {
            return Err(Error::Config(format!(
                "floor.preroll ({} ms) must cover floor.debounce ({} ms)",
                self.floor.preroll.as_millis(),
                self.floor.debounce.as_millis()
            )));
        }
        if self.session.interviewer_name.trim().is_empty() {
            return Err(Error::Config("interviewer name must not be empty".to_string()));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{key}: expected a boolean, got {other}"))),
    }
}
