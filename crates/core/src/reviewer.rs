use crate::offline_reviewer::OfflineReviewer;
use crate::prompts::{ANALYZE_RESPONSE, EXTRACT_SKILLS, PromptSet, SUMMARY_REPORT, TAILOR_QUESTIONS};
use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4-turbo";
/// Upper bound on one HTTP round trip to the reviewer.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_TOKENS: u32 = 1000;

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub content: String,
}

// The `Reviewer` trait is the seam between the interview logic and whatever
// LLM produces the raw text. Every method returns the model's reply verbatim;
// cleanup, validation and defaulting happen in the agents that call it.
//
// `#[cfg_attr(test, automock)]` generates `MockReviewer` for unit tests only.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait Reviewer: Send + Sync {
    /// Raw feedback JSON for one answer. `audio_features` is already serialized.
    async fn analyze_response(
        &self,
        question: &str,
        response: &str,
        audio_features: &str,
    ) -> Result<String>;

    /// Raw summary JSON for a finished session, given as serialized JSON.
    async fn generate_summary(&self, session_json: &str) -> Result<String>;

    async fn extract_skills(&self, resume: &str) -> Result<String>;

    async fn tailor_questions(
        &self,
        resume_data: &str,
        interview_type: &str,
        level: &str,
    ) -> Result<String>;
}

/// Which `Reviewer` implementation a process runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewerProvider {
    OpenAI,
    Offline,
}

impl FromStr for ReviewerProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ReviewerProvider::OpenAI),
            "offline" => Ok(ReviewerProvider::Offline),
            other => Err(format!("unknown reviewer provider '{other}'")),
        }
    }
}

/// Settings for the live OpenAI-compatible reviewer.
#[derive(Debug)]
pub struct ReviewerSettings {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

/// Builds the shared reviewer for a process.
///
/// The live client needs settings; `Offline` ignores them.
pub fn build_reviewer(
    provider: ReviewerProvider,
    settings: Option<ReviewerSettings>,
    prompts: PromptSet,
) -> Result<Arc<dyn Reviewer>> {
    match provider {
        ReviewerProvider::OpenAI => {
            let settings =
                settings.context("The openai reviewer requires an API key and model")?;
            tracing::info!("Using OpenAI reviewer with model {}", settings.model);
            Ok(Arc::new(ReviewerClient::new(settings, prompts)?))
        }
        ReviewerProvider::Offline => {
            tracing::info!("Using offline reviewer");
            Ok(Arc::new(OfflineReviewer))
        }
    }
}

pub struct ReviewerClient {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    prompts: PromptSet,
}

impl ReviewerClient {
    pub fn new(settings: ReviewerSettings, prompts: PromptSet) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("Failed to build the reviewer HTTP client")?;
        Ok(Self {
            client,
            api_key: settings.api_key,
            model: settings.model,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            prompts,
        })
    }

    async fn chat(&self, prompt: String, temperature: f32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "max_tokens": MAX_TOKENS,
            "temperature": temperature
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("Chat completion request failed")?
            .error_for_status()
            .context("Chat completion returned an error status")?
            .json::<LlmResponse>()
            .await
            .context("Chat completion response was not understood")?;

        let answer = &resp
            .choices
            .first()
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))?
            .message
            .content;
        tracing::debug!(
            "LLM reply: {}",
            crate::validator::truncate_for_log(answer, 500)
        );
        Ok(answer.trim().to_string())
    }
}

#[async_trait]
impl Reviewer for ReviewerClient {
    async fn analyze_response(
        &self,
        question: &str,
        response: &str,
        audio_features: &str,
    ) -> Result<String> {
        let prompt = self.prompts.render(
            ANALYZE_RESPONSE,
            &[
                ("question", question),
                ("response", response),
                ("audio_features", audio_features),
            ],
        )?;
        self.chat(prompt, 0.2).await
    }

    async fn generate_summary(&self, session_json: &str) -> Result<String> {
        let prompt = self
            .prompts
            .render(SUMMARY_REPORT, &[("session", session_json)])?;
        self.chat(prompt, 0.2).await
    }

    async fn extract_skills(&self, resume: &str) -> Result<String> {
        let prompt = self.prompts.render(EXTRACT_SKILLS, &[("resume", resume)])?;
        self.chat(prompt, 0.0).await
    }

    async fn tailor_questions(
        &self,
        resume_data: &str,
        interview_type: &str,
        level: &str,
    ) -> Result<String> {
        let prompt = self.prompts.render(
            TAILOR_QUESTIONS,
            &[
                ("resume_data", resume_data),
                ("interview_type", interview_type),
                ("level", level),
            ],
        )?;
        self.chat(prompt, 0.7).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{parse_llm_json, validate_feedback};
    use std::env;

    fn live_client() -> ReviewerClient {
        dotenvy::dotenv_override().ok();
        let api_key = env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY not set");
        ReviewerClient::new(
            ReviewerSettings {
                api_key: SecretString::from(api_key),
                base_url: DEFAULT_BASE_URL.to_string(),
                model: "gpt-4o".to_string(),
                timeout: DEFAULT_REQUEST_TIMEOUT,
            },
            PromptSet::default(),
        )
        .expect("client should build")
    }

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!(
            "OpenAI".parse::<ReviewerProvider>(),
            Ok(ReviewerProvider::OpenAI)
        );
        assert_eq!(
            " offline ".parse::<ReviewerProvider>(),
            Ok(ReviewerProvider::Offline)
        );
        assert!("gemini".parse::<ReviewerProvider>().is_err());
    }

    #[test]
    fn openai_provider_requires_settings() {
        assert!(build_reviewer(ReviewerProvider::OpenAI, None, PromptSet::default()).is_err());
        assert!(build_reviewer(ReviewerProvider::Offline, None, PromptSet::default()).is_ok());
    }

    #[tokio::test]
    async fn stalled_endpoint_times_out() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let reviewer = ReviewerClient::new(
            ReviewerSettings {
                api_key: SecretString::from("sk-test".to_string()),
                base_url: format!("http://{addr}/v1"),
                model: DEFAULT_CHAT_MODEL.to_string(),
                timeout: Duration::from_millis(200),
            },
            PromptSet::default(),
        )
        .unwrap();

        let started = std::time::Instant::now();
        let result = reviewer.generate_summary("{}").await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
        server.abort();
    }

    // Makes a live call to the OpenAI API. Run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_analyze_response_returns_feedback_json() {
        let reviewer = live_client();

        let raw = reviewer
            .analyze_response(
                "What is a hash map?",
                "A hash map stores key-value pairs and uses a hash function to find buckets.",
                r#"{"word_count": 0, "filler_words": 0, "pace": 5.0, "confidence": 5.0, "estimated_tone": "neutral"}"#,
            )
            .await
            .expect("analyze_response failed");

        let value = parse_llm_json(&raw).expect("reply should be JSON");
        let feedback = validate_feedback(&value);
        assert!(!feedback.feedback.is_empty());
    }

    // See the note on `test_analyze_response_returns_feedback_json`.
    #[tokio::test]
    #[ignore]
    async fn test_extract_skills_lists_keys() {
        let reviewer = live_client();

        let raw = reviewer
            .extract_skills("Backend engineer. Rust, Go, PostgreSQL, Kubernetes, Kafka.")
            .await
            .expect("extract_skills failed");

        let value = parse_llm_json(&raw).expect("reply should be JSON");
        for key in ["skills", "tools", "technologies"] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }
}
