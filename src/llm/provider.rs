//! HTTP completion providers over `ureq`.
//!
//! Model identifiers select the backend by prefix:
//! - `gemini/<model>` uses the Gemini `generateContent` REST API
//! - `ollama/<model>` uses a local Ollama server's `/api/chat`
//! - anything else (optionally `openai/<model>`) uses an OpenAI-compatible
//!   `/chat/completions` endpoint
//!
//! Response parsing is kept in pure functions so it can be tested offline.

use serde_json::Value;

use super::{
    ChatMessage, CompletionProvider, CompletionRequest, CompletionResponse, GatewayError,
    GatewayResult, ProviderEndpoints, TokenUsage,
};

pub const GEMINI_KEY_VAR: &str = "GEMINI_API_KEY";
pub const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";

/// API keys detected in the environment. Only presence matters to the core.
#[derive(Clone, Default)]
pub struct Credentials {
    pub gemini: Option<String>,
    pub openai: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("gemini", &self.gemini.is_some())
            .field("openai", &self.openai.is_some())
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            gemini: env_key(GEMINI_KEY_VAR),
            openai: env_key(OPENAI_KEY_VAR),
        }
    }

    /// At least one hosted provider key is available.
    pub fn any(&self) -> bool {
        self.gemini.is_some() || self.openai.is_some()
    }
}

fn env_key(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Backend chosen for a model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Gemini(&'a str),
    Ollama(&'a str),
    OpenAi(&'a str),
}

impl<'a> Route<'a> {
    pub fn for_model(model: &'a str) -> Self {
        if let Some(name) = model.strip_prefix("gemini/") {
            Route::Gemini(name)
        } else if let Some(name) = model.strip_prefix("ollama/") {
            Route::Ollama(name)
        } else {
            Route::OpenAi(model.strip_prefix("openai/").unwrap_or(model))
        }
    }
}

/// Synchronous provider speaking the three supported HTTP APIs.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    endpoints: ProviderEndpoints,
    credentials: Credentials,
}

impl HttpProvider {
    pub fn new(endpoints: ProviderEndpoints, credentials: Credentials) -> Self {
        Self {
            endpoints,
            credentials,
        }
    }

    pub fn from_env(endpoints: ProviderEndpoints) -> Self {
        Self::new(endpoints, Credentials::from_env())
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn gemini(&self, name: &str, request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
        let key = self
            .credentials
            .gemini
            .as_deref()
            .ok_or_else(|| missing("Gemini", GEMINI_KEY_VAR))?;
        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoints.gemini.trim_end_matches('/'),
            name
        );
        let body = gemini_body(request);
        let raw = post_json(request, &url, &body, &[("x-goog-api-key", key)])?;
        parse_gemini(&request.model, &raw)
    }

    fn ollama(&self, name: &str, request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
        let url = format!("{}/api/chat", self.endpoints.ollama.trim_end_matches('/'));
        let mut body = serde_json::json!({
            "model": name,
            "messages": messages_json(&request.messages),
            "stream": false,
        });
        let mut options = serde_json::Map::new();
        if let Some(t) = request.temperature {
            options.insert("temperature".into(), serde_json::json!(t));
        }
        if let Some(n) = request.max_tokens {
            options.insert("num_predict".into(), serde_json::json!(n));
        }
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }
        let raw = post_json(request, &url, &body, &[])?;
        parse_ollama(&request.model, &raw)
    }

    fn openai(&self, name: &str, request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
        let key = self
            .credentials
            .openai
            .as_deref()
            .ok_or_else(|| missing("OpenAI", OPENAI_KEY_VAR))?;
        let url = format!(
            "{}/chat/completions",
            self.endpoints.openai.trim_end_matches('/')
        );
        let mut body = serde_json::json!({
            "model": name,
            "messages": messages_json(&request.messages),
        });
        if let Some(t) = request.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if let Some(n) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(n);
        }
        let auth = format!("Bearer {key}");
        let raw = post_json(request, &url, &body, &[("Authorization", auth.as_str())])?;
        parse_openai(&request.model, &raw)
    }
}

impl CompletionProvider for HttpProvider {
    fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
        match Route::for_model(&request.model) {
            Route::Gemini(name) => self.gemini(name, request),
            Route::Ollama(name) => self.ollama(name, request),
            Route::OpenAi(name) => self.openai(name, request),
        }
    }
}

fn missing(provider: &str, env_var: &str) -> GatewayError {
    GatewayError::MissingCredentials {
        provider: provider.into(),
        env_var: env_var.into(),
    }
}

fn messages_json(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
        .collect()
}

fn gemini_body(request: &CompletionRequest) -> Value {
    let contents: Vec<Value> = request
        .messages
        .iter()
        .map(|m| {
            let role = if m.role == "assistant" { "model" } else { "user" };
            serde_json::json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();
    let mut body = serde_json::json!({ "contents": contents });
    let mut generation = serde_json::Map::new();
    if let Some(t) = request.temperature {
        generation.insert("temperature".into(), serde_json::json!(t));
    }
    if let Some(n) = request.max_tokens {
        generation.insert("maxOutputTokens".into(), serde_json::json!(n));
    }
    if !generation.is_empty() {
        body["generationConfig"] = Value::Object(generation);
    }
    body
}

fn post_json(
    request: &CompletionRequest,
    url: &str,
    body: &Value,
    headers: &[(&str, &str)],
) -> GatewayResult<String> {
    let communication = |message: String| GatewayError::Communication {
        model: request.model.clone(),
        message,
    };

    let body_str = serde_json::to_string(body)
        .map_err(|e| communication(format!("JSON serialize error: {e}")))?;

    let agent = ureq::AgentBuilder::new().timeout(request.timeout).build();
    let mut call = agent.post(url).set("Content-Type", "application/json");
    for (name, value) in headers {
        call = call.set(name, value);
    }

    let resp = call.send_string(&body_str).map_err(|e| match e {
        ureq::Error::Status(code, resp) => {
            let detail = resp.into_string().unwrap_or_default();
            communication(format!("HTTP {code}: {}", snippet(&detail)))
        }
        other => communication(other.to_string()),
    })?;

    resp.into_string()
        .map_err(|e| communication(format!("failed to read response body: {e}")))
}

fn snippet(text: &str) -> String {
    const MAX: usize = 200;
    let text = text.trim();
    match text.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn parse_json(model: &str, raw: &str) -> GatewayResult<Value> {
    serde_json::from_str(raw).map_err(|e| GatewayError::Validation {
        model: model.to_string(),
        message: format!("malformed JSON: {e}"),
    })
}

fn count(value: &Value) -> Option<u64> {
    value.as_u64()
}

fn usage_if_any(usage: TokenUsage) -> Option<TokenUsage> {
    (usage != TokenUsage::default()).then_some(usage)
}

/// Parse an OpenAI chat-completions response.
pub fn parse_openai(model: &str, raw: &str) -> GatewayResult<CompletionResponse> {
    let json = parse_json(model, raw)?;
    let choices = json["choices"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|c| c["message"]["content"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let usage = &json["usage"];
    Ok(CompletionResponse {
        choices,
        usage: usage_if_any(TokenUsage {
            prompt_tokens: count(&usage["prompt_tokens"]),
            completion_tokens: count(&usage["completion_tokens"]),
            total_tokens: count(&usage["total_tokens"]),
        }),
    })
}

/// Parse a Gemini `generateContent` response. Parts of one candidate are joined.
pub fn parse_gemini(model: &str, raw: &str) -> GatewayResult<CompletionResponse> {
    let json = parse_json(model, raw)?;
    let choices = json["candidates"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|c| {
                    let parts = c["content"]["parts"].as_array()?;
                    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
                    Some(text)
                })
                .collect()
        })
        .unwrap_or_default();
    let usage = &json["usageMetadata"];
    Ok(CompletionResponse {
        choices,
        usage: usage_if_any(TokenUsage {
            prompt_tokens: count(&usage["promptTokenCount"]),
            completion_tokens: count(&usage["candidatesTokenCount"]),
            total_tokens: count(&usage["totalTokenCount"]),
        }),
    })
}

/// Parse an Ollama `/api/chat` response.
pub fn parse_ollama(model: &str, raw: &str) -> GatewayResult<CompletionResponse> {
    let json = parse_json(model, raw)?;
    let choices = json["message"]["content"]
        .as_str()
        .map(|s| vec![s.to_string()])
        .unwrap_or_default();
    let prompt_tokens = count(&json["prompt_eval_count"]);
    let completion_tokens = count(&json["eval_count"]);
    let total_tokens = match (prompt_tokens, completion_tokens) {
        (Some(p), Some(c)) => Some(p + c),
        _ => None,
    };
    Ok(CompletionResponse {
        choices,
        usage: usage_if_any(TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }),
    })
}
