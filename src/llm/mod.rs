//! LLM client abstraction
//!
//! The orchestration loop only talks to `ChatModel`. Tool schemas are bound
//! once per request through `BoundModel`, mirroring the provider-side
//! "bind tools, then invoke" contract.

use crate::models::{Message, MessageContent, Role, ToolCallRequest};
use crate::tools::ToolSpec;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod openrouter;
pub use openrouter::OpenRouterClient;

/// A chat-completion model that can request tool calls.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier reported in response metadata.
    fn model_name(&self) -> &str;

    /// Invoke the model. An empty `tools` slice disables tool calling.
    async fn invoke(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<ModelResponse>;
}

/// A model with a fixed tool schema set attached.
#[derive(Clone)]
pub struct BoundModel {
    model: Arc<dyn ChatModel>,
    tools: Vec<ToolSpec>,
}

impl BoundModel {
    pub fn bind(model: Arc<dyn ChatModel>, tools: Vec<ToolSpec>) -> Self {
        Self { model, tools }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub async fn invoke(&self, messages: &[Message]) -> Result<ModelResponse> {
        self.model.invoke(messages, &self.tools).await
    }

    /// Final-answer call with tool calling disabled.
    pub async fn invoke_without_tools(&self, messages: &[Message]) -> Result<ModelResponse> {
        self.model.invoke(messages, &[]).await
    }
}

//
// ================= Response =================
//

/// Unified usage shape (preferred).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageMetadata {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// Legacy nested usage shape: `response_metadata.tokenUsage`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTokenUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub token_usage: Option<LegacyTokenUsage>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub content: MessageContent,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage_metadata: Option<UsageMetadata>,
    pub response_metadata: Option<ResponseMetadata>,
}

impl ModelResponse {
    /// Plain text answer without tool calls or usage data.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: MessageContent::Text(content.into()),
            ..Self::default()
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_usage(mut self, usage: UsageMetadata) -> Self {
        self.usage_metadata = Some(usage);
        self
    }

    /// The assistant message to append to the working sequence.
    pub fn to_message(&self) -> Message {
        Message {
            role: Role::Ai,
            content: self.content.clone(),
            tool_calls: self.tool_calls.clone(),
            tool_call_id: None,
        }
    }
}
