//! Plan generation backends.
//!
//! Provides a trait-based abstraction for turning a task description into a
//! plan via an external text-generation service, with one implementation per
//! backend. Selection is explicit configuration (`AI_PROVIDER`), never
//! runtime type inspection. HTTP calls go through the bounded retry loop in
//! [`crate::core::retry`], with rate-limit and model-loading responses
//! treated as throttled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::core::prompts::{SYSTEM_ROLE, clean_response, wrap_for_planning, wrap_for_refinement};
use crate::core::retry::{RetryClass, RetryConfig, Retryable, run_with_retry};

const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const HUGGINGFACE_URL_BASE: &str = "https://api-inference.huggingface.co/models";

/// Token budget for a generated plan.
const MAX_TOKENS: u32 = 1024;

/// Bound on a single HTTP request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Length cap for response bodies echoed into error messages.
const ERROR_BODY_LIMIT: usize = 500;

/// Errors from a plan generation backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The selected backend has no credential configured.
    #[error("missing API credential: set {0}")]
    MissingKey(&'static str),
    /// The service answered with a non-success status.
    #[error("provider returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },
    /// The service could not be reached.
    #[error("failed to reach provider: {0}")]
    Transport(#[from] reqwest::Error),
    /// The service answered with a payload we cannot interpret.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl Retryable for ProviderError {
    fn retry_class(&self) -> RetryClass {
        match self {
            // 429 is rate limiting; HuggingFace answers 503 while a model
            // is still loading. Both deserve the extended delay.
            Self::Http {
                status: 429 | 503, ..
            } => RetryClass::Throttled,
            Self::Http { status, .. } if *status >= 500 => RetryClass::Transient,
            Self::Transport(_) => RetryClass::Transient,
            _ => RetryClass::Fatal,
        }
    }
}

/// Trait for plan generation backends.
///
/// Returns `Ok(vec![])` to signal "no usable plan" without erroring; errors
/// mean the service was unreachable or its retry budget is spent.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    /// Generates a plan for the task, optionally refining a previous attempt
    /// with user feedback.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the backend cannot produce a response
    /// after the configured retries.
    async fn generate_plan(
        &self,
        task: &str,
        previous_plan: Option<&[String]>,
        feedback: Option<&str>,
    ) -> Result<Vec<String>, ProviderError>;

    /// Returns the display name for this backend.
    fn name(&self) -> &'static str;
}

/// Available plan generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Groq chat completions API.
    #[default]
    Groq,
    /// Hugging Face inference API.
    HuggingFace,
}

impl Backend {
    /// Returns the configuration name for the backend.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::HuggingFace => "huggingface",
        }
    }

    /// Returns a short description of the backend.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Groq => "Groq chat completions API",
            Self::HuggingFace => "Hugging Face inference API",
        }
    }

    /// Parses a backend from its configuration name, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "groq" => Some(Self::Groq),
            "huggingface" => Some(Self::HuggingFace),
            _ => None,
        }
    }

    /// Returns all available backends.
    #[must_use]
    pub const fn all() -> &'static [Backend] {
        &[Backend::Groq, Backend::HuggingFace]
    }
}

/// Constructs the generator selected by the configuration.
///
/// # Errors
///
/// Returns [`ProviderError::MissingKey`] when the selected backend has no
/// credential, or a transport error if the HTTP client cannot be built.
pub fn make_generator(config: &Config) -> Result<Box<dyn PlanGenerator>, ProviderError> {
    match config.backend {
        Backend::Groq => Ok(Box::new(GroqGenerator::new(config)?)),
        Backend::HuggingFace => Ok(Box::new(HuggingFaceGenerator::new(config)?)),
    }
}

/// Builds the user prompt for an attempt.
fn build_prompt(task: &str, previous_plan: Option<&[String]>, feedback: Option<&str>) -> String {
    match previous_plan {
        Some(plan) => wrap_for_refinement(
            task,
            plan,
            feedback.unwrap_or("The previous attempt did not succeed."),
        ),
        None => wrap_for_planning(task),
    }
}

/// Truncates a response body for inclusion in an error message.
fn truncate_body(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        body.to_string()
    } else {
        let mut end = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    }
}

// =============================================================================
// Groq
// =============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Extracts the completion text from a Groq response body.
fn parse_chat_response(body: &str) -> Result<String, ProviderError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::MalformedResponse("response contained no choices".into()))
}

/// Plan generator backed by the Groq chat completions API.
pub struct GroqGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    retry: RetryConfig,
}

impl GroqGenerator {
    /// Creates a generator from the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MissingKey`] when `GROQ_API_KEY` is unset.
    pub fn new(config: &Config) -> Result<Self, ProviderError> {
        let api_key = config
            .groq_api_key
            .clone()
            .ok_or(ProviderError::MissingKey("GROQ_API_KEY"))?;
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            model: config.groq_model.clone(),
            temperature: config.temperature,
            retry: config.provider_retry(),
        })
    }

    async fn request_completion(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_ROLE,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(GROQ_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        parse_chat_response(&body)
    }
}

#[async_trait]
impl PlanGenerator for GroqGenerator {
    async fn generate_plan(
        &self,
        task: &str,
        previous_plan: Option<&[String]>,
        feedback: Option<&str>,
    ) -> Result<Vec<String>, ProviderError> {
        let prompt = build_prompt(task, previous_plan, feedback);
        debug!(model = %self.model, refining = previous_plan.is_some(), "requesting plan from Groq");
        let raw = run_with_retry(&self.retry, || self.request_completion(&prompt)).await?;
        Ok(clean_response(&raw))
    }

    fn name(&self) -> &'static str {
        "Groq"
    }
}

// =============================================================================
// Hugging Face
// =============================================================================

#[derive(Serialize)]
struct InferenceRequest {
    inputs: String,
    parameters: InferenceParameters,
}

#[derive(Serialize)]
struct InferenceParameters {
    max_new_tokens: u32,
    temperature: f32,
    return_full_text: bool,
}

#[derive(Deserialize)]
struct Generation {
    generated_text: String,
}

/// Extracts the generated text from a Hugging Face response body.
fn parse_inference_response(body: &str) -> Result<String, ProviderError> {
    let parsed: Vec<Generation> =
        serde_json::from_str(body).map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
    parsed
        .into_iter()
        .next()
        .map(|generation| generation.generated_text)
        .ok_or_else(|| ProviderError::MalformedResponse("response contained no generations".into()))
}

/// Plan generator backed by the Hugging Face inference API.
pub struct HuggingFaceGenerator {
    client: reqwest::Client,
    api_token: String,
    model: String,
    temperature: f32,
    retry: RetryConfig,
}

impl HuggingFaceGenerator {
    /// Creates a generator from the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MissingKey`] when `HUGGINGFACE_API_TOKEN` is
    /// unset.
    pub fn new(config: &Config) -> Result<Self, ProviderError> {
        let api_token = config
            .huggingface_api_token
            .clone()
            .ok_or(ProviderError::MissingKey("HUGGINGFACE_API_TOKEN"))?;
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_token,
            model: config.huggingface_model.clone(),
            temperature: config.temperature,
            retry: config.provider_retry(),
        })
    }

    async fn request_completion(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = InferenceRequest {
            inputs: format!("[INST] {SYSTEM_ROLE}\n\n{prompt} [/INST]"),
            parameters: InferenceParameters {
                max_new_tokens: MAX_TOKENS,
                temperature: self.temperature,
                return_full_text: false,
            },
        };

        let url = format!("{HUGGINGFACE_URL_BASE}/{}", self.model);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        parse_inference_response(&body)
    }
}

#[async_trait]
impl PlanGenerator for HuggingFaceGenerator {
    async fn generate_plan(
        &self,
        task: &str,
        previous_plan: Option<&[String]>,
        feedback: Option<&str>,
    ) -> Result<Vec<String>, ProviderError> {
        let prompt = build_prompt(task, previous_plan, feedback);
        debug!(model = %self.model, refining = previous_plan.is_some(), "requesting plan from Hugging Face");
        let raw = run_with_retry(&self.retry, || self.request_completion(&prompt)).await?;
        Ok(clean_response(&raw))
    }

    fn name(&self) -> &'static str {
        "HuggingFace"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // =========================================================================
    // Backend Tests
    // =========================================================================

    mod backend_tests {
        use super::*;

        /// Tests name round-trips through `from_name`.
        #[test]
        fn from_name_round_trips() {
            for backend in Backend::all() {
                assert_eq!(Backend::from_name(backend.name()), Some(*backend));
            }
        }

        /// Tests that parsing is case-insensitive.
        #[test]
        fn from_name_is_case_insensitive() {
            assert_eq!(Backend::from_name("Groq"), Some(Backend::Groq));
            assert_eq!(Backend::from_name("HUGGINGFACE"), Some(Backend::HuggingFace));
        }

        /// Tests that unknown names are rejected.
        #[test]
        fn from_name_rejects_unknown() {
            assert_eq!(Backend::from_name("openai"), None);
            assert_eq!(Backend::from_name(""), None);
        }

        /// Tests the default backend.
        #[test]
        fn default_is_groq() {
            assert_eq!(Backend::default(), Backend::Groq);
        }
    }

    // =========================================================================
    // Error Classification Tests
    // =========================================================================

    mod retry_class_tests {
        use super::*;

        fn http(status: u16) -> ProviderError {
            ProviderError::Http {
                status,
                body: String::new(),
            }
        }

        /// Tests that rate limiting and model loading are throttled.
        #[test]
        fn rate_limit_and_loading_are_throttled() {
            assert_eq!(http(429).retry_class(), RetryClass::Throttled);
            assert_eq!(http(503).retry_class(), RetryClass::Throttled);
        }

        /// Tests that other server errors are transient.
        #[test]
        fn server_errors_are_transient() {
            assert_eq!(http(500).retry_class(), RetryClass::Transient);
            assert_eq!(http(502).retry_class(), RetryClass::Transient);
        }

        /// Tests that client errors and bad payloads are fatal.
        #[test]
        fn client_errors_are_fatal() {
            assert_eq!(http(401).retry_class(), RetryClass::Fatal);
            assert_eq!(http(400).retry_class(), RetryClass::Fatal);
            assert_eq!(
                ProviderError::MissingKey("GROQ_API_KEY").retry_class(),
                RetryClass::Fatal
            );
            assert_eq!(
                ProviderError::MalformedResponse("nope".into()).retry_class(),
                RetryClass::Fatal
            );
        }
    }

    // =========================================================================
    // Response Parsing Tests
    // =========================================================================

    mod parsing_tests {
        use super::*;

        /// Tests extracting the first choice from a chat response.
        #[test]
        fn parses_chat_response() {
            let body = r#"{"choices":[{"message":{"role":"assistant","content":"echo hi"}}]}"#;

            assert_eq!(parse_chat_response(body).unwrap(), "echo hi");
        }

        /// Tests that an empty choices array is malformed.
        #[test]
        fn empty_choices_is_malformed() {
            let result = parse_chat_response(r#"{"choices":[]}"#);

            assert!(matches!(result, Err(ProviderError::MalformedResponse(_))));
        }

        /// Tests extracting the first generation from an inference response.
        #[test]
        fn parses_inference_response() {
            let body = r#"[{"generated_text":"echo hi\necho there"}]"#;

            assert_eq!(
                parse_inference_response(body).unwrap(),
                "echo hi\necho there"
            );
        }

        /// Tests that invalid JSON is malformed, not a panic.
        #[test]
        fn invalid_json_is_malformed() {
            assert!(matches!(
                parse_chat_response("not json"),
                Err(ProviderError::MalformedResponse(_))
            ));
            assert!(matches!(
                parse_inference_response("{}"),
                Err(ProviderError::MalformedResponse(_))
            ));
        }
    }

    // =========================================================================
    // Construction Tests
    // =========================================================================

    mod construction_tests {
        use super::*;
        use crate::config::Config;

        /// Tests that a missing credential fails at construction time, not on
        /// the first call.
        #[test]
        fn missing_key_fails_at_construction() {
            let config = Config::from_vars(|_| None).unwrap();

            assert!(matches!(
                make_generator(&config),
                Err(ProviderError::MissingKey("GROQ_API_KEY"))
            ));
        }

        /// Tests that the configured backend is the one constructed.
        #[test]
        fn configured_backend_is_constructed() {
            let config = Config::from_vars(|name| match name {
                "AI_PROVIDER" => Some("huggingface".to_string()),
                "HUGGINGFACE_API_TOKEN" => Some("hf_test".to_string()),
                _ => None,
            })
            .unwrap();

            let generator = make_generator(&config).unwrap();

            assert_eq!(generator.name(), "HuggingFace");
        }
    }

    // =========================================================================
    // Prompt Selection Tests
    // =========================================================================

    mod build_prompt_tests {
        use super::*;

        /// Tests that a first attempt uses the planning prompt.
        #[test]
        fn first_attempt_uses_planning_prompt() {
            let prompt = build_prompt("list files", None, None);

            assert!(prompt.contains("Task: list files"));
            assert!(!prompt.contains("previous plan"));
        }

        /// Tests that a refinement includes the previous plan and feedback.
        #[test]
        fn refinement_includes_plan_and_feedback() {
            let previous = vec!["ls".to_string()];

            let prompt = build_prompt("list files", Some(&previous), Some("wrong directory"));

            assert!(prompt.contains("ls"));
            assert!(prompt.contains("wrong directory"));
        }

        /// Tests the fallback feedback line when none was supplied.
        #[test]
        fn refinement_without_feedback_uses_fallback() {
            let previous = vec!["ls".to_string()];

            let prompt = build_prompt("list files", Some(&previous), None);

            assert!(prompt.contains("The previous attempt did not succeed."));
        }
    }

    // =========================================================================
    // truncate_body Tests
    // =========================================================================

    mod truncate_body_tests {
        use super::*;

        /// Tests that short bodies pass through unchanged.
        #[test]
        fn short_body_is_unchanged() {
            assert_eq!(truncate_body("short"), "short");
        }

        /// Tests that long bodies are capped.
        #[test]
        fn long_body_is_capped() {
            let body = "x".repeat(2000);

            let truncated = truncate_body(&body);

            assert!(truncated.len() < body.len());
            assert!(truncated.ends_with('…'));
        }

        /// Tests that truncation lands on a char boundary.
        #[test]
        fn truncation_respects_char_boundaries() {
            let body = "é".repeat(ERROR_BODY_LIMIT);

            // Must not panic slicing mid-codepoint.
            let _ = truncate_body(&body);
        }
    }
}
