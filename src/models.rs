//! Core data models for the portfolio agent

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

//
// ================= Enums =================
//

/// Author of a message in the working sequence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Human,
    Ai,
    Tool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    LlmFailure,
    InputValidation,
    VerificationFailure,
    ToolFailure,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackRating {
    Up,
    Down,
}

//
// ================= Messages =================
//

/// Message body: plain text or provider-structured content blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Structured(Value),
}

impl MessageContent {
    /// Canonical text form. Structured content is serialized as compact JSON.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Structured(value) => value.to_string(),
        }
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(rename = "type")]
    pub role: Role,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::text(Role::Human, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::text(Role::Ai, content)
    }

    /// Result of a tool call, linked back to the request id.
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Text(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

//
// ================= Tool Calls =================
//

/// Audit record of one executed tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    pub name: String,
    pub input: Value,
    pub output: Value,
}

impl ToolCallRecord {
    /// True when the tool reported a domain error (`error: true` or an error message).
    pub fn has_error_marker(&self) -> bool {
        match self.output.get("error") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(message)) => !message.is_empty(),
            _ => false,
        }
    }
}

//
// ================= Verification =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationResult {
    #[serde(rename = "type")]
    pub check_type: String,
    pub passed: bool,
    pub details: String,
    pub severity: Severity,
}

impl VerificationResult {
    pub fn pass(check_type: &str, details: impl Into<String>) -> Self {
        Self {
            check_type: check_type.to_string(),
            passed: true,
            details: details.into(),
            severity: Severity::Info,
        }
    }

    pub fn fail(check_type: &str, details: impl Into<String>, severity: Severity) -> Self {
        Self {
            check_type: check_type.to_string(),
            passed: false,
            details: details.into(),
            severity,
        }
    }
}

//
// ================= Token Usage =================
//

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

//
// ================= Final Response =================
//

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LatencyBreakdown {
    pub llm_ms: u64,
    pub tool_ms: u64,
    pub verification_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenDetail {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetadata {
    pub model: String,
    pub tokens_used: u64,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_breakdown: Option<LatencyBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_detail: Option<TokenDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub response: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub conversation_id: String,
    pub verification: Vec<VerificationResult>,
    pub metadata: AgentMetadata,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::Human => "human",
            Role::Ai => "ai",
            Role::Tool => "tool",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::LlmFailure => "llm_failure",
            ErrorCategory::InputValidation => "input_validation",
            ErrorCategory::VerificationFailure => "verification_failure",
            ErrorCategory::ToolFailure => "tool_failure",
            ErrorCategory::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_content_as_text() {
        let content = MessageContent::Structured(json!([{"type": "text", "text": "hi"}]));
        assert_eq!(content.as_text(), r#"[{"text":"hi","type":"text"}]"#);
        assert_eq!(MessageContent::Text("plain".into()).as_text(), "plain");
    }

    #[test]
    fn test_error_marker_detection() {
        let failed = ToolCallRecord {
            name: "market_data".into(),
            input: json!({}),
            output: json!({"error": true, "message": "provider down"}),
        };
        let ok = ToolCallRecord {
            name: "market_data".into(),
            input: json!({}),
            output: json!({"quotes": {}, "error": false}),
        };
        assert!(failed.has_error_marker());
        assert!(!ok.has_error_marker());
    }

    #[test]
    fn test_verification_result_serialization() {
        let result = VerificationResult::fail("ticker_validation", "bad", Severity::Warning);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["type"], "ticker_validation");
        assert_eq!(value["severity"], "warning");
        assert_eq!(value["passed"], false);
    }

    #[test]
    fn test_metadata_omits_missing_optionals() {
        let metadata = AgentMetadata {
            model: "m".into(),
            tokens_used: 0,
            latency_ms: 5,
            confidence_score: None,
            latency_breakdown: None,
            token_detail: None,
        };
        let value = serde_json::to_value(&metadata).unwrap();
        assert!(value.get("confidenceScore").is_none());
        assert_eq!(value["latencyMs"], 5);
    }
}
