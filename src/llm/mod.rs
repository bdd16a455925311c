//! Narrative gateway: prompt, model fallback, retry, result assembly.
//!
//! The gateway walks `[primary_model] + fallback_models` in order. Each model
//! gets its own retry budget (see [`backoff`]); a model that exhausts it is
//! never tried again in the same call. A model whose provider has no API key
//! is given up on after its first try. Only total exhaustion reaches the
//! caller, as a single [`GatewayError::Exhausted`].

pub mod backoff;
pub mod provider;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::experience::prompt::format_dream_prompt;
use crate::experience::{ExperienceMode, NarrativeResult, Observation};

use self::backoff::{Backoff, RetryConfig};

/// Errors from the narrative gateway.
#[derive(Debug, Error, Diagnostic)]
pub enum GatewayError {
    #[error("provider call failed for model {model}: {message}")]
    #[diagnostic(
        code(sleepwalker::llm::communication),
        help("Check network connectivity, the provider endpoint, and the API key.")
    )]
    Communication { model: String, message: String },

    #[error("invalid response from model {model}: {message}")]
    #[diagnostic(
        code(sleepwalker::llm::validation),
        help("The model returned no usable content. Try another model.")
    )]
    Validation { model: String, message: String },

    #[error("no credentials for {provider}: {env_var} is not set")]
    #[diagnostic(
        code(sleepwalker::llm::missing_credentials),
        help("Export {env_var} or choose a model from another provider.")
    )]
    MissingCredentials { provider: String, env_var: String },

    #[error("all LLM providers failed (attempted: {})", attempted.join(", "))]
    #[diagnostic(
        code(sleepwalker::llm::exhausted),
        help("Every configured model failed. Set GEMINI_API_KEY or OPENAI_API_KEY, or adjust llm.fallback_models.")
    )]
    Exhausted {
        attempted: Vec<String>,
        #[source]
        source: Box<GatewayError>,
    },
}

impl GatewayError {
    /// Failures worth another try against the same model.
    ///
    /// A missing key cannot appear between tries, so it moves straight on to
    /// the next model.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Communication { .. } | Self::Validation { .. })
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Base URLs for each provider family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    #[serde(default = "default_openai_url")]
    pub openai: String,
    #[serde(default = "default_gemini_url")]
    pub gemini: String,
    #[serde(default = "default_ollama_url")]
    pub ollama: String,
}

fn default_openai_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            openai: default_openai_url(),
            gemini: default_gemini_url(),
            ollama: default_ollama_url(),
        }
    }
}

/// Model selection and request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequestConfig {
    /// Tried first.
    #[serde(default = "default_primary_model")]
    pub primary_model: String,
    /// Tried in order after the primary is exhausted.
    #[serde(default = "default_fallback_models")]
    pub fallback_models: Vec<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub endpoints: ProviderEndpoints,
}

fn default_primary_model() -> String {
    "gemini/gemini-2.5-flash".into()
}
fn default_fallback_models() -> Vec<String> {
    vec!["gpt-4o-mini".into()]
}
fn default_timeout_secs() -> u64 {
    10
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            primary_model: default_primary_model(),
            fallback_models: default_fallback_models(),
            timeout_secs: default_timeout_secs(),
            max_output_tokens: None,
            temperature: None,
            retry: RetryConfig::default(),
            endpoints: ProviderEndpoints::default(),
        }
    }
}

impl LlmRequestConfig {
    /// Candidate models in order, without blanks or repeats.
    pub fn candidate_models(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();
        for model in std::iter::once(&self.primary_model).chain(&self.fallback_models) {
            let model = model.trim();
            if !model.is_empty() && !models.iter().any(|m| m == model) {
                models.push(model.to_string());
            }
        }
        models
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A chat message sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// "system", "user", or "assistant".
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// One provider call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub timeout: Duration,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Token counts reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// What a provider returned: candidate texts and optional usage.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub choices: Vec<String>,
    pub usage: Option<TokenUsage>,
}

/// The external completion call. Implementations perform one request, no retries.
pub trait CompletionProvider: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResponse>;
}

/// Prompt builder used by the gateway.
pub type PromptFormatter = fn(&[Observation]) -> String;

/// Turns observations into a narrative through the configured models.
pub struct LlmGateway {
    config: LlmRequestConfig,
    provider: Box<dyn CompletionProvider>,
    backoff: Backoff,
    formatter: PromptFormatter,
}

impl std::fmt::Debug for LlmGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGateway")
            .field("models", &self.config.candidate_models())
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl LlmGateway {
    pub fn new(config: LlmRequestConfig, provider: Box<dyn CompletionProvider>) -> Self {
        let backoff = Backoff::from_config(&config.retry);
        Self {
            config,
            provider,
            backoff,
            formatter: format_dream_prompt,
        }
    }

    /// Gateway backed by the HTTP providers and environment credentials.
    pub fn from_env(config: LlmRequestConfig) -> Self {
        let provider = provider::HttpProvider::from_env(config.endpoints.clone());
        Self::new(config, Box::new(provider))
    }

    /// Replace the retry policy (tests use [`Backoff::immediate`]).
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_formatter(mut self, formatter: PromptFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn config(&self) -> &LlmRequestConfig {
        &self.config
    }

    /// Generate a dream narrative from `observations`.
    ///
    /// Fails only when every candidate model has exhausted its retries.
    pub fn generate_narrative(&self, observations: &[Observation]) -> GatewayResult<NarrativeResult> {
        let prompt = (self.formatter)(observations);
        let models = self.config.candidate_models();
        let mut attempted = Vec::with_capacity(models.len());
        let mut last_error = None;

        for model in &models {
            tracing::debug!(model = %model, "attempting narrative generation");
            let request = self.request_for(model, &prompt);
            let outcome = self.backoff.retry_if(
                |attempt| {
                    tracing::debug!(model = %model, attempt, "calling provider");
                    self.call_once(&request)
                },
                GatewayError::is_retryable,
            );
            match outcome {
                Ok(outcome) => {
                    tracing::debug!(
                        model = %model,
                        duration_ms = outcome.duration.as_millis() as u64,
                        "narrative generated"
                    );
                    return Ok(assemble(model, &prompt, observations, outcome));
                }
                Err(exhausted) => {
                    tracing::debug!(
                        model = %model,
                        attempts = exhausted.attempts,
                        error = %exhausted.last_error,
                        "model exhausted its retries"
                    );
                    attempted.push(model.clone());
                    last_error = Some(exhausted.last_error);
                }
            }
        }

        let source = last_error.unwrap_or_else(|| GatewayError::Validation {
            model: "<none>".into(),
            message: "no candidate models configured".into(),
        });
        tracing::error!(attempted = %attempted.join(", "), error = %source, "all LLM providers failed");
        Err(GatewayError::Exhausted {
            attempted,
            source: Box::new(source),
        })
    }

    fn request_for(&self, model: &str, prompt: &str) -> CompletionRequest {
        CompletionRequest {
            model: model.to_string(),
            messages: vec![ChatMessage::user(prompt)],
            timeout: self.config.timeout(),
            max_tokens: self.config.max_output_tokens.filter(|n| *n > 0),
            temperature: self.config.temperature,
        }
    }

    /// One provider call plus response validation.
    fn call_once(&self, request: &CompletionRequest) -> GatewayResult<CallOutcome> {
        let started = Instant::now();
        let response = self.provider.complete(request)?;
        let duration = started.elapsed();

        let content = response
            .choices
            .first()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GatewayError::Validation {
                model: request.model.clone(),
                message: "empty response".into(),
            })?
            .to_string();

        Ok(CallOutcome {
            content,
            usage: response.usage,
            duration,
        })
    }
}

struct CallOutcome {
    content: String,
    usage: Option<TokenUsage>,
    duration: Duration,
}

fn assemble(model: &str, prompt: &str, observations: &[Observation], outcome: CallOutcome) -> NarrativeResult {
    let now = Utc::now();
    let session_start = observations.first().map_or(now, |o| o.timestamp);
    let session_end = observations.last().map_or(now, |o| o.timestamp);

    let mut metadata = BTreeMap::new();
    metadata.insert("model".to_string(), serde_json::json!(model));
    metadata.insert(
        "duration_seconds".to_string(),
        serde_json::json!(outcome.duration.as_secs_f64()),
    );
    metadata.insert("observation_count".to_string(), serde_json::json!(observations.len()));
    metadata.insert("prompt_length".to_string(), serde_json::json!(prompt.chars().count()));
    metadata.insert(
        "content_length".to_string(),
        serde_json::json!(outcome.content.chars().count()),
    );
    if let Some(usage) = outcome.usage {
        let counts = [
            ("total_tokens", usage.total_tokens),
            ("prompt_tokens", usage.prompt_tokens),
            ("completion_tokens", usage.completion_tokens),
        ];
        for (key, value) in counts {
            if let Some(value) = value {
                metadata.insert(key.to_string(), serde_json::json!(value));
            }
        }
    }

    NarrativeResult {
        kind: ExperienceMode::Dream,
        session_start,
        session_end,
        observation_count: observations.len(),
        content: outcome.content,
        metadata,
        output_format: NarrativeResult::MARKDOWN.to_string(),
    }
}
