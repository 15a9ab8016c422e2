//! Environment-derived configuration.
//!
//! All knobs come from environment variables with documented defaults; CLI
//! flags override the environment afterwards. Parsing is routed through a
//! variable-lookup closure so tests can feed values without mutating the
//! process environment.

use std::time::Duration;

use thiserror::Error;

use crate::core::retry::RetryConfig;
use crate::provider::Backend;

/// Default session attempt budget (`MAX_RETRIES`).
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default Groq model id (`GROQ_MODEL`).
pub const DEFAULT_GROQ_MODEL: &str = "llama3-8b-8192";
/// Default Hugging Face model id (`HUGGINGFACE_MODEL`).
pub const DEFAULT_HUGGINGFACE_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2";
/// Default provider HTTP retry budget (`AI_MAX_RETRIES`).
pub const DEFAULT_AI_MAX_RETRIES: u32 = 3;
/// Default provider backoff base in seconds (`AI_RETRY_DELAY`).
pub const DEFAULT_AI_RETRY_DELAY_SECS: f64 = 2.0;
/// Default sampling temperature (`AI_TEMPERATURE`).
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Default per-command execution bound (`COMMAND_TIMEOUT_SECS`).
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held an unusable value.
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// The offending value.
        value: String,
        /// What was expected instead.
        reason: &'static str,
    },
}

/// Runtime configuration assembled from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Session attempt budget.
    pub max_retries: u32,
    /// Verbose logging plus the feedback log file.
    pub debug: bool,
    /// Selected plan generation backend.
    pub backend: Backend,
    /// Bearer token for Groq, if configured.
    pub groq_api_key: Option<String>,
    /// Groq model id.
    pub groq_model: String,
    /// Bearer token for Hugging Face, if configured.
    pub huggingface_api_token: Option<String>,
    /// Hugging Face model id.
    pub huggingface_model: String,
    /// Provider HTTP retry budget.
    pub ai_max_retries: u32,
    /// Provider backoff base delay.
    pub ai_retry_delay: Duration,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-command execution bound.
    pub command_timeout: Duration,
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for any variable that is present but
    /// unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Loads configuration through a variable-lookup function.
    ///
    /// Absent variables take their defaults; present ones must parse.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for any variable that is present but
    /// unparseable.
    pub fn from_vars<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match get("AI_PROVIDER") {
            Some(value) => Backend::from_name(&value).ok_or(ConfigError::Invalid {
                name: "AI_PROVIDER",
                value,
                reason: "expected one of: groq, huggingface",
            })?,
            None => Backend::default(),
        };

        let retry_delay_secs = parse_f64(
            &get,
            "AI_RETRY_DELAY",
            DEFAULT_AI_RETRY_DELAY_SECS,
        )?;
        let temperature = parse_f64(&get, "AI_TEMPERATURE", f64::from(DEFAULT_TEMPERATURE))?;
        #[allow(clippy::cast_possible_truncation)]
        let temperature = temperature as f32;

        Ok(Self {
            max_retries: parse_u32(&get, "MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            debug: parse_bool(&get, "DEBUG_MODE", false)?,
            backend,
            groq_api_key: get("GROQ_API_KEY"),
            groq_model: get("GROQ_MODEL").unwrap_or_else(|| DEFAULT_GROQ_MODEL.to_string()),
            huggingface_api_token: get("HUGGINGFACE_API_TOKEN"),
            huggingface_model: get("HUGGINGFACE_MODEL")
                .unwrap_or_else(|| DEFAULT_HUGGINGFACE_MODEL.to_string()),
            ai_max_retries: parse_u32(&get, "AI_MAX_RETRIES", DEFAULT_AI_MAX_RETRIES)?,
            ai_retry_delay: Duration::from_secs_f64(retry_delay_secs),
            temperature,
            command_timeout: Duration::from_secs(parse_u64(
                &get,
                "COMMAND_TIMEOUT_SECS",
                DEFAULT_COMMAND_TIMEOUT_SECS,
            )?),
        })
    }

    /// Applies CLI flag overrides on top of the environment values.
    pub fn apply_cli(&mut self, debug: bool, max_retries: Option<u32>) {
        self.debug |= debug;
        if let Some(n) = max_retries {
            self.max_retries = n;
        }
    }

    /// Returns the retry configuration for provider HTTP calls.
    #[must_use]
    pub const fn provider_retry(&self) -> RetryConfig {
        RetryConfig::new(self.ai_max_retries, self.ai_retry_delay)
    }
}

fn parse_u32<F>(get: &F, name: &'static str, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value,
            reason: "expected a non-negative integer",
        }),
    }
}

fn parse_u64<F>(get: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value,
            reason: "expected a non-negative integer",
        }),
    }
}

fn parse_f64<F>(get: &F, name: &'static str, default: f64) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = get(name) else {
        return Ok(default);
    };
    let parsed: f64 = value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.clone(),
        reason: "expected a number",
    })?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(ConfigError::Invalid {
            name,
            value,
            reason: "expected a finite non-negative number",
        });
    }
    Ok(parsed)
}

fn parse_bool<F>(get: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(value) => match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                name,
                value,
                reason: "expected a boolean (true/false)",
            }),
        },
    }
}
