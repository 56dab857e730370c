use crate::analysis::AudioFeatures;
use crate::retry::RetryPolicy;
use crate::reviewer::Reviewer;
use crate::session_state::Session;
use crate::validator::{
    Feedback, Summary, parse_llm_json, truncate_for_log, validate_feedback, validate_summary,
};
use anyhow::{Result, bail};
use serde_json::Value;
use std::sync::Arc;

/// Turns raw reviewer output into validated feedback and summaries.
///
/// Upstream failures stop here: after the retry budget is spent the caller
/// gets the default record, never an error.
pub struct FeedbackAgent {
    reviewer: Arc<dyn Reviewer>,
    policy: RetryPolicy,
}

impl FeedbackAgent {
    pub fn new(reviewer: Arc<dyn Reviewer>) -> Self {
        Self::with_policy(reviewer, RetryPolicy::FEEDBACK)
    }

    pub fn with_policy(reviewer: Arc<dyn Reviewer>, policy: RetryPolicy) -> Self {
        Self { reviewer, policy }
    }

    pub async fn analyze_response(
        &self,
        question: &str,
        response: &str,
        audio_features: &AudioFeatures,
    ) -> Feedback {
        let features = serde_json::to_string(audio_features).unwrap_or_else(|_| "{}".to_string());
        let features = features.as_str();
        let reviewer = &self.reviewer;

        let result = self
            .policy
            .run("Response analysis", |attempt| async move {
                let raw = reviewer
                    .analyze_response(question, response, features)
                    .await?;
                tracing::debug!(
                    "Attempt {attempt} - raw feedback: {}",
                    truncate_for_log(&raw, 500)
                );
                require_object(parse_llm_json(&raw)?)
            })
            .await;

        match result {
            Ok(value) => {
                let feedback = validate_feedback(&value);
                tracing::debug!("Validated feedback: {feedback:?}");
                feedback
            }
            Err(e) => {
                tracing::error!("Falling back to default feedback: {e:#}");
                Feedback::default()
            }
        }
    }

    pub async fn generate_summary(&self, session: &Session) -> Summary {
        let session_json = match serde_json::to_string(session) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Could not serialize session for summary: {e}");
                return Summary::default();
            }
        };
        let session_json = session_json.as_str();
        let reviewer = &self.reviewer;

        let result = self
            .policy
            .run("Summary report", |attempt| async move {
                let raw = reviewer.generate_summary(session_json).await?;
                tracing::debug!(
                    "Attempt {attempt} - raw summary: {}",
                    truncate_for_log(&raw, 500)
                );
                require_object(parse_llm_json(&raw)?)
            })
            .await;

        match result {
            Ok(value) => validate_summary(&value),
            Err(e) => {
                tracing::error!("Falling back to default summary: {e:#}");
                Summary::default()
            }
        }
    }
}

fn require_object(value: Value) -> Result<Value> {
    if !value.is_object() {
        bail!("Expected a JSON object, got {value}");
    }
    Ok(value)
}
