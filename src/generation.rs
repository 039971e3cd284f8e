//! Generation backend abstraction.
//!
//! A [`GenerationBackend`] takes a system prompt, the running conversation
//! and (optionally) a set of tool definitions, and returns a tagged
//! [`BackendReply`]: either a final answer or a request to call tools.
//! The orchestrator switches on that tag; nothing else about the backend's
//! wire format leaks out of this module.
//!
//! | Config Value | Backend |
//! |-------------|---------|
//! | `"anthropic"` | [`AnthropicBackend`] (Messages API, `ANTHROPIC_API_KEY`) |
//! | `"disabled"` | [`DisabledBackend`] (every call is service-unavailable) |
//!
//! `ScriptedBackend` replays canned replies and is what the test suite
//! drives the orchestrator with.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::tools::ToolDefinition;

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One tool call requested by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Backend-assigned id, echoed back with the result.
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// The outcome of a tool call, sent back to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

/// A conversation message, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    User(String),
    /// A backend turn that requested tools.
    AssistantToolCalls {
        text: Option<String>,
        calls: Vec<ToolInvocation>,
    },
    /// Results for every call of the preceding assistant turn.
    ToolResults(Vec<ToolOutput>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub messages: Vec<Message>,
    /// Empty means tools are not offered on this call.
    pub tools: Vec<ToolDefinition>,
}

/// Tagged backend reply.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendReply {
    FinalAnswer(String),
    ToolCall {
        /// Any text the backend produced alongside the calls.
        text: Option<String>,
        calls: Vec<ToolInvocation>,
    },
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Errors are [`Error::ServiceUnavailable`] for transport and upstream failures.
    async fn generate(&self, request: &GenerationRequest) -> Result<BackendReply>;
}

/// Create the backend selected by `[generation]`.
pub fn create_backend(config: &GenerationConfig) -> Result<Arc<dyn GenerationBackend>> {
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicBackend::from_env(config)?)),
        "disabled" => Ok(Arc::new(DisabledBackend)),
        other => Err(Error::invalid(format!(
            "Unknown generation provider: {}",
            other
        ))),
    }
}

// ============ Anthropic ============

/// Backend for the Anthropic Messages API.
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl AnthropicBackend {
    /// Build from config, reading `ANTHROPIC_API_KEY` from the environment.
    pub fn from_env(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| Error::invalid("ANTHROPIC_API_KEY environment variable not set"))?;
        Self::new(config, api_key)
    }

    pub fn new(config: &GenerationConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::unavailable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_URL.to_string()),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": request.system,
            "messages": request.messages.iter().map(message_json).collect::<Vec<_>>(),
        });
        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools);
            body["tool_choice"] = json!({ "type": "auto" });
        }
        body
    }
}

fn message_json(message: &Message) -> Value {
    match message {
        Message::User(text) => json!({ "role": "user", "content": text }),
        Message::AssistantToolCalls { text, calls } => {
            let mut content = Vec::new();
            if let Some(text) = text.as_deref().filter(|t| !t.is_empty()) {
                content.push(json!({ "type": "text", "text": text }));
            }
            for call in calls {
                content.push(json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": call.args,
                }));
            }
            json!({ "role": "assistant", "content": content })
        }
        Message::ToolResults(results) => {
            let content: Vec<Value> = results
                .iter()
                .map(|r| {
                    json!({
                        "type": "tool_result",
                        "tool_use_id": r.call_id,
                        "content": r.content,
                        "is_error": r.is_error,
                    })
                })
                .collect();
            json!({ "role": "user", "content": content })
        }
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn parse_reply(response: MessagesResponse) -> BackendReply {
    let mut texts = Vec::new();
    let mut calls = Vec::new();
    for block in response.content {
        match block {
            ResponseBlock::Text { text } => texts.push(text),
            ResponseBlock::ToolUse { id, name, input } => calls.push(ToolInvocation {
                id,
                name,
                args: input,
            }),
            ResponseBlock::Other => {}
        }
    }
    let text = texts.join("");
    if calls.is_empty() {
        BackendReply::FinalAnswer(text)
    } else {
        BackendReply::ToolCall {
            text: if text.is_empty() { None } else { Some(text) },
            calls,
        }
    }
}

fn map_http_error(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.to_string());
    Error::unavailable(format!("Anthropic API error {}: {}", status, message))
}

#[async_trait]
impl GenerationBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<BackendReply> {
        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| Error::unavailable(format!("Failed to parse Anthropic response: {}", e)))?;
        Ok(parse_reply(parsed))
    }
}

// ============ Disabled ============

/// Backend used when no generation service is configured.
pub struct DisabledBackend;

#[async_trait]
impl GenerationBackend for DisabledBackend {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<BackendReply> {
        Err(Error::unavailable("generation provider is disabled"))
    }
}

// ============ Scripted ============

/// Replays a fixed sequence of replies and records every request it sees.
///
/// Once the script runs out, the `repeat` reply (if any) is returned on
/// every further call; otherwise the call fails as service-unavailable.
#[doc(hidden)]
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<BackendReply>>>,
    repeat: Option<BackendReply>,
    delay: Option<Duration>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn new(replies: impl IntoIterator<Item = BackendReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    /// Returns `reply` on every call.
    pub fn repeating(reply: BackendReply) -> Self {
        Self {
            repeat: Some(reply),
            ..Self::default()
        }
    }

    /// Fails every call with a service-unavailable error.
    pub fn failing(message: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Err(Error::unavailable(message))])),
            ..Self::default()
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<BackendReply> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(reply) => reply,
            None => self
                .repeat
                .clone()
                .ok_or_else(|| Error::unavailable("scripted backend has no more replies")),
        }
    }
}

/// Convenience for building a single tool call.
#[doc(hidden)]
pub fn tool_call(id: &str, name: &str, args: Value) -> BackendReply {
    BackendReply::ToolCall {
        text: None,
        calls: vec![ToolInvocation {
            id: id.to_string(),
            name: name.to_string(),
            args,
        }],
    }
}
