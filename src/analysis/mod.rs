//! Post-session analysis
//!
//! Turns a finished transcript into a graded [`Feedback`] report through an
//! external [`Analyzer`]. This module owns the evidence check and transcript
//! preparation; scoring itself happens in the service.

mod clean;
mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use clean::clean_transcription_text;
pub use http::HttpAnalyzer;

use crate::config::SessionSetup;
use crate::floor::{Role, TranscriptEntry, transcript::count_words};
use crate::prompt::{Difficulty, Language};
use crate::{Error, Result};

/// Below this many candidate words a report is marked partial
pub const PARTIAL_WORD_THRESHOLD: usize = 30;

/// Label used for candidate lines in the graded transcript
const CANDIDATE_LABEL: &str = "Student";

/// Transcript ready for grading
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub language: Language,
    pub difficulty: Difficulty,
    /// Whitespace-normalized entries
    pub transcript: Vec<TranscriptEntry>,
    /// Cleaned, role-labelled lines joined by newlines
    pub transcript_text: String,
    pub candidate_words: usize,
    pub is_partial: bool,
}

impl AnalysisRequest {
    /// Check the evidence and prepare the transcript
    ///
    /// # Errors
    ///
    /// Returns `InsufficientEvidence` when the candidate said nothing
    pub fn prepare(setup: &SessionSetup, entries: &[TranscriptEntry]) -> Result<Self> {
        let candidate_words = count_words(entries, Role::Candidate);

        if candidate_words == 0 {
            let message = match setup.language {
                Language::English => {
                    "No candidate response was detected. Please speak during the interview to receive feedback."
                }
                Language::Spanish => {
                    "No se detectó respuesta del candidato. Por favor, hable durante la entrevista para recibir comentarios."
                }
            };
            return Err(Error::InsufficientEvidence(message.to_string()));
        }

        let transcript: Vec<TranscriptEntry> = entries
            .iter()
            .map(|entry| TranscriptEntry {
                role: entry.role,
                text: entry.text.split_whitespace().collect::<Vec<_>>().join(" "),
            })
            .collect();

        let transcript_text = transcript
            .iter()
            .map(|entry| {
                let label = match entry.role {
                    Role::Agent => setup.interviewer_name.as_str(),
                    Role::Candidate => CANDIDATE_LABEL,
                };
                format!("{label}: {}", clean_transcription_text(&entry.text))
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(Self {
            language: setup.language,
            difficulty: setup.difficulty,
            transcript,
            transcript_text,
            candidate_words,
            is_partial: candidate_words < PARTIAL_WORD_THRESHOLD,
        })
    }
}

/// Per-category scores, each 0-20
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackMetrics {
    pub technical_skills: u32,
    pub communication: u32,
    pub problem_solving: u32,
    pub adaptability: u32,
    pub self_awareness: u32,
}

impl FeedbackMetrics {
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.technical_skills
            + self.communication
            + self.problem_solving
            + self.adaptability
            + self.self_awareness
    }
}

/// One graded category with its justification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDetail {
    pub label: String,
    pub score: u32,
    pub weight: u32,
    pub justification: String,
}

/// Feedback on a single interview question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionFeedback {
    pub question: String,
    pub feedback: String,
}

/// Graded report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub score: u32,
    pub summary: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub metrics: FeedbackMetrics,
    pub metric_details: Vec<MetricDetail>,
    pub detailed_analysis: Vec<QuestionFeedback>,
    #[serde(default)]
    pub is_partial: bool,
    #[serde(default)]
    pub is_low_power_mode: bool,
    pub assessment_mode: Difficulty,
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
}

impl Feedback {
    /// Clamp every metric detail to its weight
    pub fn normalize(&mut self) {
        for detail in &mut self.metric_details {
            if detail.score > detail.weight {
                tracing::debug!(
                    label = %detail.label,
                    score = detail.score,
                    weight = detail.weight,
                    "clamping metric over its weight"
                );
                detail.score = detail.weight;
            }
        }
    }
}

/// Grading service
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Grade a prepared transcript
    ///
    /// # Errors
    ///
    /// Returns error if no report could be produced
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Feedback>;
}

/// Prepare `entries` and grade them
///
/// The returned report carries the partial flag and the normalized
/// transcript regardless of what the service echoed back.
///
/// # Errors
///
/// Returns `InsufficientEvidence` without contacting the service when the
/// candidate said nothing, otherwise whatever the analyzer fails with
pub async fn analyze_interview(
    analyzer: &dyn Analyzer,
    setup: &SessionSetup,
    entries: &[TranscriptEntry],
) -> Result<Feedback> {
    let request = AnalysisRequest::prepare(setup, entries)?;

    tracing::info!(
        words = request.candidate_words,
        partial = request.is_partial,
        "requesting interview analysis"
    );

    let mut feedback = analyzer.analyze(&request).await?;
    feedback.normalize();
    feedback.is_partial = request.is_partial;
    feedback.transcript = request.transcript;
    Ok(feedback)
}
