//! OpenRouter (OpenAI-compatible chat completions) client
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{ChatModel, ModelResponse, UsageMetadata};
use crate::config::AgentConfig;
use crate::error::OrchestrationError;
use crate::models::{Message, MessageContent, Role, ToolCallRequest};
use crate::tools::ToolSpec;
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

/// Reusable OpenRouter client (connection-pooled)
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenRouterClient {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn build_request(&self, messages: &[Message], tools: &[ToolSpec]) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: tools.iter().map(WireTool::from).collect(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl ChatModel for OpenRouterClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<ModelResponse> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::LlmUnavailable(
                "OPENROUTER_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let request = self.build_request(messages, tools);

        debug!(
            model = %self.model,
            message_count = messages.len(),
            tool_count = tools.len(),
            "Calling OpenRouter"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("OpenRouter request failed: {}", e);
                if e.is_timeout() || e.is_connect() {
                    OrchestrationError::LlmUnavailable(format!("OpenRouter request failed: {}", e))
                } else {
                    OrchestrationError::LlmError(format!("OpenRouter request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, "OpenRouter error response: {}", error_text);
            let message = format!("OpenRouter returned {}: {}", status, error_text);
            return Err(if is_unavailable_status(status) {
                OrchestrationError::LlmUnavailable(message)
            } else {
                OrchestrationError::LlmError(message)
            });
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse OpenRouter response: {}", e);
            OrchestrationError::LlmError(format!("OpenRouter parse error: {}", e))
        })?;

        body.into_model_response()
    }
}

fn is_unavailable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

//
// ================= Wire Format =================
//

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let role = match message.role {
            Role::System => "system",
            Role::Human => "user",
            Role::Ai => "assistant",
            Role::Tool => "tool",
        };
        let content = match &message.content {
            MessageContent::Text(text) => Value::String(text.clone()),
            MessageContent::Structured(value) => value.clone(),
        };

        Self {
            role,
            content,
            tool_calls: message.tool_calls.iter().map(WireToolCall::from).collect(),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded argument object
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<&ToolCallRequest> for WireToolCall {
    fn from(call: &ToolCallRequest) -> Self {
        Self {
            id: call.id.clone(),
            call_type: function_type(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: call.args.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolSpec> for WireTool {
    fn from(spec: &ToolSpec) -> Self {
        Self {
            tool_type: "function",
            function: WireFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.input_schema.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

impl ChatResponse {
    fn into_model_response(self) -> Result<ModelResponse> {
        let usage_metadata = self.usage.map(|u| UsageMetadata {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        let choice = self.choices.into_iter().next().ok_or_else(|| {
            OrchestrationError::LlmError("No choices in OpenRouter response".to_string())
        })?;

        let content = match choice.message.content {
            Some(Value::String(text)) => MessageContent::Text(text),
            Some(Value::Null) | None => MessageContent::Text(String::new()),
            Some(other) => MessageContent::Structured(other),
        };

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCallRequest {
                args: parse_arguments(&call.function.arguments),
                id: call.id,
                name: call.function.name,
            })
            .collect();

        Ok(ModelResponse {
            content,
            tool_calls,
            usage_metadata,
            response_metadata: None,
        })
    }
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
