//! Agent session facade
//!
//! Wires history, the tool-calling loop, verification, confidence scoring
//! and trace export into a single `chat` call.

use super::{LoopOutcome, ToolCallingLoop};
use crate::audit::{TraceLog, TraceRecord, TraceSink};
use crate::config::AgentConfig;
use crate::error::OrchestrationError;
use crate::llm::{ChatModel, OpenRouterClient};
use crate::memory::{ConversationStore, FeedbackRecord, FeedbackStore};
use crate::models::{
    AgentMetadata, AgentResponse, ErrorCategory, FeedbackRating, LatencyBreakdown, Message,
    TokenDetail, VerificationResult,
};
use crate::observability::{sanitize_tool_calls_for_trace, ErrorCategorizer, TraceSanitizerOptions};
use crate::state::{build_key_value_store, KeyValueStore};
use crate::tools::{create_default_registry, ToolRegistry};
use crate::verification::{
    create_default_verification_pipeline, score_confidence, ConfidenceFactors,
    ConfidenceScoreOptions, VerificationPipeline,
};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const GRACEFUL_ERROR_MESSAGE: &str = "I encountered an issue processing your request. This may be a temporary problem - please try rephrasing your question or try again shortly.";

const RATE_LIMITED_MESSAGE: &str =
    "The AI service is currently rate-limited. Please wait a moment and try again.";
const UNAVAILABLE_MESSAGE: &str =
    "The AI service is temporarily unavailable. Please try again in a few minutes.";

/// System prompt for a user with the given base currency.
pub fn system_prompt(base_currency: &str) -> String {
    format!(
        "You are a financial assistant that helps users understand their portfolio, market data and investment performance.\n\
         \n\
         Rules:\n\
         1. Always use the available tools to retrieve real data before answering. Never fabricate holdings, prices or performance figures.\n\
         2. You can only access the authenticated user's own data.\n\
         3. The user's base currency is {}. Present monetary values in this currency unless asked otherwise.\n\
         4. Mention where data came from and when it was retrieved.\n\
         5. If a tool fails or a symbol is not found, say so plainly instead of guessing.\n\
         6. Never promise returns or give buy/sell directives, and never claim to execute trades.\n\
         \n\
         End every answer with: \"Note: This is informational only and not financial advice.\"",
        base_currency
    )
}

pub struct AgentSession {
    tool_loop: ToolCallingLoop,
    conversations: ConversationStore,
    feedback: FeedbackStore,
    verification: VerificationPipeline,
    confidence: ConfidenceScoreOptions,
    categorizer: ErrorCategorizer,
    sanitizer: TraceSanitizerOptions,
    trace_sink: Option<Arc<dyn TraceSink>>,
    base_currency: String,
}

impl AgentSession {
    pub fn new(
        model: Arc<dyn ChatModel>,
        registry: Arc<ToolRegistry>,
        kv: Arc<dyn KeyValueStore>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            tool_loop: ToolCallingLoop::new(model, registry, config.max_iterations),
            conversations: ConversationStore::with_ttl(kv.clone(), config.conversation_ttl),
            feedback: FeedbackStore::new(kv),
            verification: create_default_verification_pipeline(),
            confidence: ConfidenceScoreOptions::with_threshold(config.confidence_threshold),
            categorizer: ErrorCategorizer::default(),
            sanitizer: TraceSanitizerOptions::default(),
            trace_sink: None,
            base_currency: config.base_currency.clone(),
        }
    }

    /// OpenRouter model, API-backed tools, configured key/value store and an
    /// in-memory trace log bounded to `DEFAULT_TRACE_CAPACITY` records.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let model: Arc<dyn ChatModel> = Arc::new(OpenRouterClient::new(config)?);
        let registry = Arc::new(create_default_registry(
            config.financial_api_base_url.as_deref(),
        )?);
        let kv = build_key_value_store(config.database_url.as_deref());

        info!(
            model = %config.model,
            tool_count = registry.len(),
            max_iterations = config.max_iterations,
            "Agent session initialized"
        );

        Ok(Self::new(model, registry, kv, config).with_trace_sink(Arc::new(TraceLog::new())))
    }

    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = Some(sink);
        self
    }

    pub fn with_verification(mut self, pipeline: VerificationPipeline) -> Self {
        self.verification = pipeline;
        self
    }

    pub fn with_sanitizer(mut self, options: TraceSanitizerOptions) -> Self {
        self.sanitizer = options;
        self
    }

    /// Answer one user message.
    ///
    /// Returns `LlmUnavailable` when the model provider is unreachable or
    /// rate-limited. Every other failure becomes an apologetic response.
    pub async fn chat(&self, message: &str, conversation_id: Option<&str>) -> Result<AgentResponse> {
        let started = Instant::now();

        let conversation_id = conversation_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let history = self.conversations.load(&conversation_id).await;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system_prompt(&self.base_currency)));
        messages.extend(history);
        messages.push(Message::human(message));

        info!(
            conversation_id = %conversation_id,
            message_count = messages.len(),
            "Agent chat started"
        );

        let outcome = match self.tool_loop.run(messages).await {
            Ok(outcome) => outcome,
            Err(e) => return self.handle_failure(e, conversation_id, started),
        };

        let verification_started = Instant::now();
        let mut verification = self.verification.verify(&outcome.content, &outcome.tool_calls);
        let confidence = {
            let factors = ConfidenceFactors::from_tool_calls(&outcome.tool_calls, &verification);
            score_confidence(&factors, &self.confidence)
        };
        verification.push(confidence.verification_result);
        let verification_ms = verification_started.elapsed().as_millis() as u64;

        self.conversations
            .save(
                &conversation_id,
                Message::human(message),
                Message::ai(outcome.content.clone()),
            )
            .await;

        let latency_ms = started.elapsed().as_millis() as u64;

        self.export_trace(&conversation_id, &outcome, &verification, latency_ms)
            .await;

        info!(
            conversation_id = %conversation_id,
            tool_calls = outcome.tool_calls.len(),
            tokens = outcome.token_usage.total_tokens,
            confidence = confidence.score,
            latency_ms = latency_ms,
            "Agent chat completed"
        );

        let metadata = AgentMetadata {
            model: self.tool_loop.model_name().to_string(),
            tokens_used: outcome.token_usage.total_tokens,
            latency_ms,
            confidence_score: Some(confidence.score),
            latency_breakdown: Some(LatencyBreakdown {
                llm_ms: outcome.llm_ms,
                tool_ms: outcome.tool_ms,
                verification_ms,
            }),
            token_detail: Some(TokenDetail {
                input_tokens: outcome.token_usage.input_tokens,
                output_tokens: outcome.token_usage.output_tokens,
            }),
        };

        Ok(AgentResponse {
            response: outcome.content,
            tool_calls: outcome.tool_calls,
            conversation_id,
            verification,
            metadata,
        })
    }

    /// Record a thumbs up/down on one message of a conversation.
    pub async fn submit_feedback(
        &self,
        conversation_id: &str,
        message_index: i64,
        rating: &str,
    ) -> Result<()> {
        if conversation_id.trim().is_empty() {
            return Err(OrchestrationError::InvalidInput(
                "conversationId is required".to_string(),
            ));
        }

        if message_index < 0 {
            return Err(OrchestrationError::InvalidInput(
                "messageIndex must be a non-negative number".to_string(),
            ));
        }

        let rating = match rating {
            "up" => FeedbackRating::Up,
            "down" => FeedbackRating::Down,
            _ => {
                return Err(OrchestrationError::InvalidInput(
                    "rating must be \"up\" or \"down\"".to_string(),
                ))
            }
        };

        self.feedback
            .record(FeedbackRecord {
                conversation_id: conversation_id.to_string(),
                message_index: message_index as u64,
                rating,
                created_at: Utc::now(),
            })
            .await
    }

    fn handle_failure(
        &self,
        e: OrchestrationError,
        conversation_id: String,
        started: Instant,
    ) -> Result<AgentResponse> {
        let category = self.categorizer.categorize(&e);

        error!(
            conversation_id = %conversation_id,
            category = %category,
            error = %e,
            "Agent execution failed"
        );

        if category == ErrorCategory::LlmFailure {
            let message = e.to_string().to_lowercase();
            let user_message = if message.contains("429") || message.contains("rate limit") {
                RATE_LIMITED_MESSAGE
            } else {
                UNAVAILABLE_MESSAGE
            };
            return Err(OrchestrationError::LlmUnavailable(user_message.to_string()));
        }

        Ok(AgentResponse {
            response: GRACEFUL_ERROR_MESSAGE.to_string(),
            tool_calls: Vec::new(),
            conversation_id,
            verification: Vec::new(),
            metadata: AgentMetadata {
                model: self.tool_loop.model_name().to_string(),
                tokens_used: 0,
                latency_ms: started.elapsed().as_millis() as u64,
                confidence_score: None,
                latency_breakdown: None,
                token_detail: None,
            },
        })
    }

    async fn export_trace(
        &self,
        conversation_id: &str,
        outcome: &LoopOutcome,
        verification: &[VerificationResult],
        latency_ms: u64,
    ) {
        let Some(sink) = self.trace_sink.as_ref() else {
            return;
        };

        let record = TraceRecord::new(
            conversation_id,
            self.tool_loop.model_name(),
            sanitize_tool_calls_for_trace(&outcome.tool_calls, &self.sanitizer),
            verification.to_vec(),
            outcome.token_usage,
            latency_ms,
        );

        if let Err(e) = sink.export(record).await {
            warn!(conversation_id = conversation_id, error = %e, "Trace export failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::*;
    use crate::llm::ModelResponse;
    use crate::models::{Role, Severity};
    use crate::observability::sanitizer::REDACTED;
    use crate::state::InMemoryKeyValueStore;
    use serde_json::json;

    struct FailingSink;

    #[async_trait::async_trait]
    impl TraceSink for FailingSink {
        async fn export(&self, _record: TraceRecord) -> Result<()> {
            Err(OrchestrationError::Unknown("collector offline".into()))
        }
    }

    fn portfolio_tool() -> StaticTool {
        StaticTool {
            name: "portfolio_analysis",
            body: json!({
                "holdings": [
                    {"symbol": "VT", "quantity": 50, "allocationInPercentage": "85.00"},
                    {"symbol": "AMZN", "quantity": 3, "allocationInPercentage": "15.00"}
                ],
                "dataRetrievedAt": Utc::now().to_rfc3339()
            })
            .to_string(),
        }
    }

    fn session_with(model: Arc<ScriptedModel>, kv: Arc<InMemoryKeyValueStore>) -> AgentSession {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(portfolio_tool()));
        AgentSession::new(model, Arc::new(registry), kv, &AgentConfig::default())
    }

    fn portfolio_then_answer(answer: &str) -> Arc<ScriptedModel> {
        Arc::new(ScriptedModel::new(
            vec![
                Ok(ModelResponse::text("")
                    .with_tool_calls(vec![tool_call("c1", "portfolio_analysis", json!({}))])
                    .with_usage(usage(200, 30))),
                Ok(ModelResponse::text(answer).with_usage(usage(300, 40))),
            ],
            ModelResponse::text("unused"),
        ))
    }

    #[tokio::test]
    async fn test_grounded_chat() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let model = portfolio_then_answer("Your portfolio is 85% VT and 15% AMZN.");
        let session = session_with(model, kv.clone());

        let response = session.chat("How is my portfolio allocated?", None).await.unwrap();

        assert_eq!(response.response, "Your portfolio is 85% VT and 15% AMZN.");
        assert_eq!(response.tool_calls.len(), 1);
        assert!(Uuid::parse_str(&response.conversation_id).is_ok());

        let types: Vec<&str> = response
            .verification
            .iter()
            .map(|v| v.check_type.as_str())
            .collect();
        assert_eq!(
            types,
            vec!["ticker_validation", "numerical_crosscheck", "data_freshness", "confidence_score"]
        );
        assert!(response.verification.iter().all(|v| v.passed));

        assert_eq!(response.metadata.confidence_score, Some(100));
        assert_eq!(response.metadata.tokens_used, 570);
        assert_eq!(response.metadata.model, "scripted-model");
        let detail = response.metadata.token_detail.unwrap();
        assert_eq!((detail.input_tokens, detail.output_tokens), (500, 70));
        assert!(response.metadata.latency_breakdown.is_some());

        let history = ConversationStore::new(kv)
            .load(&response.conversation_id)
            .await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], Message::human("How is my portfolio allocated?"));
    }

    #[tokio::test]
    async fn test_ungrounded_answer_has_low_confidence() {
        let session = session_with(
            Arc::new(ScriptedModel::answering("Hello! How can I help?")),
            Arc::new(InMemoryKeyValueStore::new()),
        );

        let response = session.chat("hi", Some("conv-1")).await.unwrap();

        assert_eq!(response.conversation_id, "conv-1");
        assert_eq!(response.metadata.confidence_score, Some(60));
        let confidence = response.verification.last().unwrap();
        assert_eq!(confidence.check_type, "confidence_score");
        assert!(!confidence.passed);
        assert_eq!(confidence.severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_history_is_replayed_in_order() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let model = Arc::new(ScriptedModel::answering("ok"));
        let session = session_with(model.clone(), kv);

        session.chat("first", Some("conv-2")).await.unwrap();
        session.chat("second", Some("conv-2")).await.unwrap();

        let calls = model.calls.lock().unwrap();
        let sent = &calls[1].0;
        let roles: Vec<Role> = sent.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::Human, Role::Ai, Role::Human]);
        assert_eq!(sent[1].content.as_text(), "first");
        assert_eq!(sent[3].content.as_text(), "second");
        assert!(sent[0].content.as_text().contains("base currency is USD"));
    }

    #[tokio::test]
    async fn test_llm_unavailable_is_surfaced() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let model = Arc::new(ScriptedModel::new(
            vec![Err(OrchestrationError::LlmError(
                "OpenRouter returned 429 Too Many Requests".into(),
            ))],
            ModelResponse::text("unused"),
        ));
        let session = session_with(model, kv.clone());

        let result = session.chat("hi", Some("conv-3")).await;
        match result {
            Err(OrchestrationError::LlmUnavailable(message)) => {
                assert!(message.contains("rate-limited"))
            }
            other => panic!("expected LlmUnavailable, got {:?}", other),
        }
        assert!(ConversationStore::new(kv).load("conv-3").await.is_empty());
    }

    #[tokio::test]
    async fn test_other_failures_return_graceful_response() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ThrowingTool));
        let model = Arc::new(ScriptedModel::new(
            vec![Ok(ModelResponse::text("")
                .with_tool_calls(vec![tool_call("c1", "portfolio_analysis", json!({}))]))],
            ModelResponse::text("unused"),
        ));
        let session =
            AgentSession::new(model, Arc::new(registry), kv.clone(), &AgentConfig::default());

        let response = session.chat("How am I doing?", Some("conv-4")).await.unwrap();

        assert_eq!(response.response, GRACEFUL_ERROR_MESSAGE);
        assert!(response.tool_calls.is_empty());
        assert!(response.verification.is_empty());
        assert_eq!(response.metadata.tokens_used, 0);
        assert!(ConversationStore::new(kv).load("conv-4").await.is_empty());
    }

    #[tokio::test]
    async fn test_trace_export_is_sanitized() {
        let log = TraceLog::new();
        let session = session_with(
            portfolio_then_answer("VT and AMZN."),
            Arc::new(InMemoryKeyValueStore::new()),
        )
        .with_trace_sink(Arc::new(log.clone()));

        let response = session.chat("holdings?", Some("conv-5")).await.unwrap();

        let ids = log.list_for_conversation("conv-5").await.unwrap();
        assert_eq!(ids.len(), 1);
        let trace = log.get(ids[0]).await.unwrap().unwrap();
        assert_eq!(trace.tool_calls[0].output["holdings"][0]["quantity"], REDACTED);
        assert_eq!(trace.tool_calls[0].output["holdings"][0]["symbol"], "VT");
        assert!(log.verify_integrity(ids[0]).await.unwrap());

        // The response keeps the real figures.
        assert_eq!(response.tool_calls[0].output["holdings"][0]["quantity"], 50);
    }

    #[tokio::test]
    async fn test_trace_sink_failure_is_swallowed() {
        let session = session_with(
            Arc::new(ScriptedModel::answering("ok")),
            Arc::new(InMemoryKeyValueStore::new()),
        )
        .with_trace_sink(Arc::new(FailingSink));

        assert!(session.chat("hi", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_feedback_validation_and_storage() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let session = session_with(Arc::new(ScriptedModel::answering("ok")), kv.clone());

        session.submit_feedback("conv-6", 1, "up").await.unwrap();
        let stored = FeedbackStore::new(kv).list("conv-6").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].rating, FeedbackRating::Up);

        for (id, index, rating) in [("", 0, "up"), ("conv-6", -1, "up"), ("conv-6", 0, "meh")] {
            let result = session.submit_feedback(id, index, rating).await;
            assert!(matches!(result, Err(OrchestrationError::InvalidInput(_))));
        }
    }
}
