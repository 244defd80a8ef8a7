//! TOML configuration file loading
//!
//! Supports `~/.config/parley/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::floor::{FloorConfig, Sensitivity};
use crate::prompt::{Difficulty, Language};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ParleyConfigFile {
    /// Interview setup
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Floor timings and detection
    #[serde(default)]
    pub floor: FloorConfig,

    /// Device rates
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Remote agent session
    #[serde(default)]
    pub remote: RemoteFileConfig,

    /// Grading service
    #[serde(default)]
    pub analysis: AnalysisFileConfig,
}

/// Interview setup
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    pub candidate_name: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub career_field: Option<String>,
    /// Free-form experience summary (e.g. "two summers at a bike shop")
    pub experience: Option<String>,
    pub language: Option<Language>,
    pub sensitivity: Option<Sensitivity>,
    pub difficulty: Option<Difficulty>,
    pub interviewer_name: Option<String>,
    pub interviewer_voice: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub input_sample_rate: Option<u32>,
    pub output_sample_rate: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoteFileConfig {
    /// WebSocket URL of the agent session
    pub url: Option<String>,
    /// Bearer token
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalysisFileConfig {
    pub url: Option<String>,
    pub primary_model: Option<String>,
    pub fallback_model: Option<String>,
    pub retry_delay_ms: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ParleyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ParleyConfigFile {
    config_file_path().map_or_else(ParleyConfigFile::default, |path| load_from(&path))
}

/// Load a config file from `path`, falling back to defaults
pub fn load_from(path: &Path) -> ParleyConfigFile {
    if !path.exists() {
        return ParleyConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ParleyConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ParleyConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/parley/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("parley").join("config.toml"))
}
