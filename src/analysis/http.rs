//! HTTP grading service client

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{AnalysisRequest, Analyzer, Feedback};
use crate::config::AnalysisConfig;
use crate::prompt::Language;
use crate::{Error, Result};

/// Request timeout for a single grading call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GradeBody<'a> {
    model: &'a str,
    /// Shorter, stricter instructions for the fallback model
    emergency: bool,
    #[serde(flatten)]
    request: &'a AnalysisRequest,
}

enum Failure {
    RateLimited,
    Other(Error),
}

/// Posts transcripts to a grading service
///
/// A rate-limited primary request is retried once after a delay; any
/// remaining failure falls back to the fallback model, whose report is
/// flagged as low-power.
#[derive(Debug, Clone)]
pub struct HttpAnalyzer {
    client: reqwest::Client,
    url: String,
    primary_model: String,
    fallback_model: String,
    retry_delay: Duration,
}

impl HttpAnalyzer {
    /// Build an analyzer for `config.url`
    ///
    /// # Errors
    ///
    /// Returns `Config` if no analysis URL is configured
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| Error::Config("analysis url not configured".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            url,
            primary_model: config.primary_model.clone(),
            fallback_model: config.fallback_model.clone(),
            retry_delay: config.retry_delay,
        })
    }

    async fn grade(
        &self,
        request: &AnalysisRequest,
        model: &str,
        emergency: bool,
    ) -> std::result::Result<Feedback, Failure> {
        let body = GradeBody {
            model,
            emergency,
            request,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Failure::Other(e.into()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Failure::RateLimited);
        }
        if !status.is_success() {
            return Err(Failure::Other(Error::Analysis(format!(
                "grading service returned {status}"
            ))));
        }

        response
            .json::<Feedback>()
            .await
            .map_err(|e| Failure::Other(Error::Analysis(format!("malformed report: {e}"))))
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Feedback> {
        let mut outcome = self.grade(request, &self.primary_model, false).await;

        if matches!(outcome, Err(Failure::RateLimited)) {
            tracing::warn!(
                delay_ms = self.retry_delay.as_millis(),
                "analysis rate limited, retrying"
            );
            tokio::time::sleep(self.retry_delay).await;
            outcome = self.grade(request, &self.primary_model, false).await;
        }

        match outcome {
            Ok(mut feedback) => {
                feedback.is_low_power_mode = false;
                return Ok(feedback);
            }
            Err(Failure::RateLimited) => {
                tracing::warn!("primary analysis still rate limited, using fallback model");
            }
            Err(Failure::Other(e)) => {
                tracing::warn!(error = %e, "primary analysis failed, using fallback model");
            }
        }

        match self.grade(request, &self.fallback_model, true).await {
            Ok(mut feedback) => {
                feedback.is_low_power_mode = true;
                Ok(feedback)
            }
            Err(failure) => {
                if let Failure::Other(e) = failure {
                    tracing::error!(error = %e, "fallback analysis failed");
                }
                let message = match request.language {
                    Language::English => "Failed to perform analysis. Please try again later.",
                    Language::Spanish => {
                        "No se pudo realizar el análisis. Inténtelo de nuevo más tarde."
                    }
                };
                Err(Error::Analysis(message.to_string()))
            }
        }
    }
}
