//! Application Configuration Module
//!
//! Loads the console coach's settings from environment variables (and a
//! `.env` file when present) into a single struct that is passed to the
//! parts of the application that need it.

use interview_core::coach::TURN_BUDGET;
use interview_core::reviewer::{
    DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_REQUEST_TIMEOUT, ReviewerProvider,
    ReviewerSettings,
};
use interview_core::store::StoreBackend;
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Holds all configuration loaded from the environment.
#[derive(Debug)]
pub struct Config {
    pub provider: ReviewerProvider,
    pub openai_api_key: Option<SecretString>,
    pub openai_base_url: String,
    pub chat_model: String,
    pub log_level: Level,
    pub storage_dir: PathBuf,
    pub store_backend: StoreBackend,
    pub db_path: PathBuf,
    pub question_banks_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub response_timeout: Duration,
    pub request_timeout: Duration,
    pub voice_enabled: bool,
    pub transcription_model: String,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// *   `REVIEWER_PROVIDER`: "openai" or "offline". Defaults to "openai".
    /// *   `OPENAI_API_KEY`: Required if provider is "openai".
    /// *   `OPENAI_BASE_URL`: (Optional) Any OpenAI-compatible endpoint.
    /// *   `CHAT_MODEL`: (Optional) The model used for feedback. Defaults to "gpt-4-turbo".
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    /// *   `STORAGE_DIR`: (Optional) Where interviews and profiles are kept.
    /// *   `QUESTION_BANKS_DIR`: (Optional) Extra `*.json` question banks.
    /// *   `PROMPTS_DIR`: (Optional) `.md` files overriding the default prompts.
    /// *   `STORE_BACKEND`: (Optional) "file" or "sqlite". Defaults to "file".
    /// *   `DB_PATH`: (Optional) The SQLite database file. Defaults to "interview_data/interviews.db".
    /// *   `RESPONSE_TIMEOUT_SECS`: (Optional) Seconds allowed per answer. Defaults to 60.
    /// *   `REQUEST_TIMEOUT_SECS`: (Optional) Seconds allowed per reviewer call. Defaults to 30.
    /// *   `VOICE_ENABLED`: (Optional) Listen on the microphone too. Needs the `voice` feature.
    /// *   `TRANSCRIPTION_MODEL`: (Optional) Speech-to-text model. Defaults to "whisper-1".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let provider_str = var_or("REVIEWER_PROVIDER", "openai");
        let provider = provider_str
            .parse::<ReviewerProvider>()
            .map_err(|e| ConfigError::InvalidValue("REVIEWER_PROVIDER".to_string(), e))?;

        let openai_api_key = lookup("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);
        if provider == ReviewerProvider::OpenAI && openai_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "OPENAI_API_KEY must be set for 'openai' provider".to_string(),
            ));
        }

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let response_timeout = seconds(&lookup, "RESPONSE_TIMEOUT_SECS", TURN_BUDGET)?;
        let request_timeout =
            seconds(&lookup, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT)?;

        let store_backend = var_or("STORE_BACKEND", "file")
            .parse::<StoreBackend>()
            .map_err(|e| ConfigError::InvalidValue("STORE_BACKEND".to_string(), e))?;

        let voice_str = var_or("VOICE_ENABLED", "false");
        let voice_enabled = match voice_str.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" | "" => false,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "VOICE_ENABLED".to_string(),
                    format!("'{voice_str}' is not a boolean"),
                ));
            }
        };

        Ok(Self {
            provider,
            openai_api_key,
            openai_base_url: var_or("OPENAI_BASE_URL", DEFAULT_BASE_URL),
            chat_model: var_or("CHAT_MODEL", DEFAULT_CHAT_MODEL),
            log_level,
            storage_dir: PathBuf::from(var_or("STORAGE_DIR", "interview_data")),
            store_backend,
            db_path: PathBuf::from(var_or("DB_PATH", "interview_data/interviews.db")),
            question_banks_dir: PathBuf::from(var_or("QUESTION_BANKS_DIR", "question_banks")),
            prompts_dir: PathBuf::from(var_or("PROMPTS_DIR", "prompts")),
            response_timeout,
            request_timeout,
            voice_enabled,
            transcription_model: var_or("TRANSCRIPTION_MODEL", DEFAULT_TRANSCRIPTION_MODEL),
        })
    }

    /// Settings for the live reviewer, if an API key is configured.
    pub fn reviewer_settings(&self) -> Option<ReviewerSettings> {
        self.openai_api_key.as_ref().map(|key| ReviewerSettings {
            api_key: SecretString::from(key.expose_secret().to_string()),
            base_url: self.openai_base_url.clone(),
            model: self.chat_model.clone(),
            timeout: self.request_timeout,
        })
    }
}

/// Reads a positive number of seconds, falling back to `default` when unset.
fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("'{raw}' is not a positive number of seconds"),
            )),
        },
        None => Ok(default),
    }
}
