//! Parley - Live voice interview sessions with a streaming agent
//!
//! This library provides the core functionality for a mock interview:
//! - Floor control between the candidate and the remote interviewer
//! - Microphone capture and gapless playback scheduling
//! - The remote agent session transport
//! - Post-session transcript analysis
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Microphone  │  Speaker                  │
//! └────────────────────┬────────────────────────────────┘
//!                      │ frames / ended sources
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Floor session                        │
//! │   VAD  │  Pre-roll  │  Scheduler  │  Watchdog        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ audio / text / interruptions
//! ┌────────────────────▼────────────────────────────────┐
//! │             Remote agent session                     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod floor;
pub mod prompt;
pub mod remote;
pub mod session;
pub mod voice;

pub use analysis::{Analyzer, Feedback, HttpAnalyzer, analyze_interview};
pub use config::{Config, SessionSetup};
pub use error::{Error, Result};
pub use floor::{Coordinator, FloorConfig, FloorState, Sensitivity};
pub use remote::{RemoteEvent, RemoteLink, RemoteSink};
pub use session::{FloorSession, SessionConfig, SessionOutcome};
