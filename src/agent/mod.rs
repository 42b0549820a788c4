//! Tool-calling orchestration loop
//!
//! LLM call, then every requested tool in emission order, repeated until the
//! model answers without tool calls. After `max_iterations` rounds one final
//! call is made with tools disabled, so a run makes at most
//! `max_iterations + 1` model calls.

use crate::llm::{BoundModel, ChatModel};
use crate::models::{Message, TokenUsage, ToolCallRecord};
use crate::observability::{accumulate_token_usage, extract_token_usage};
use crate::tools::{parse_tool_output, unknown_tool_payload, ToolRegistry};
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub mod session;

pub use session::AgentSession;

/// Result of one loop run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub token_usage: TokenUsage,
    pub llm_calls: usize,
    pub llm_ms: u64,
    pub tool_ms: u64,
}

pub struct ToolCallingLoop {
    model: BoundModel,
    registry: Arc<ToolRegistry>,
    max_iterations: usize,
}

impl ToolCallingLoop {
    /// Bind every registered tool's schema to the model.
    pub fn new(model: Arc<dyn ChatModel>, registry: Arc<ToolRegistry>, max_iterations: usize) -> Self {
        let specs = registry.specs();
        Self {
            model: BoundModel::bind(model, specs),
            registry,
            max_iterations,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Run the loop over `messages` (system prompt, history, new user message).
    ///
    /// Model errors and tool invocation errors are not retried and propagate.
    pub async fn run(&self, mut messages: Vec<Message>) -> Result<LoopOutcome> {
        let mut tool_calls: Vec<ToolCallRecord> = Vec::new();
        let mut token_usage = TokenUsage::default();
        let mut llm_calls = 0;
        let mut llm_ms = 0;
        let mut tool_ms = 0;

        for iteration in 0..self.max_iterations {
            let started = Instant::now();
            let response = self.model.invoke(&messages).await?;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            llm_calls += 1;
            llm_ms += elapsed_ms;
            token_usage = accumulate_token_usage(token_usage, extract_token_usage(&response));

            debug!(
                iteration = iteration,
                elapsed_ms = elapsed_ms,
                tool_call_count = response.tool_calls.len(),
                "Model responded"
            );

            messages.push(response.to_message());

            if response.tool_calls.is_empty() {
                info!(
                    iterations = iteration + 1,
                    tool_calls = tool_calls.len(),
                    tokens = token_usage.total_tokens,
                    "Tool-calling loop completed"
                );
                return Ok(LoopOutcome {
                    content: response.content.as_text(),
                    tool_calls,
                    token_usage,
                    llm_calls,
                    llm_ms,
                    tool_ms,
                });
            }

            for call in &response.tool_calls {
                let call_id = if call.id.is_empty() {
                    call.name.clone()
                } else {
                    call.id.clone()
                };

                let Some(tool) = self.registry.get(&call.name) else {
                    warn!(tool_name = %call.name, "Model requested an unknown tool");
                    messages.push(Message::tool(unknown_tool_payload(&call.name), call_id));
                    continue;
                };

                let started = Instant::now();
                let output = tool.invoke(&call.args).await?;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                tool_ms += elapsed_ms;

                debug!(tool_name = %call.name, elapsed_ms = elapsed_ms, "Tool executed");

                tool_calls.push(ToolCallRecord {
                    name: call.name.clone(),
                    input: call.args.clone(),
                    output: parse_tool_output(&output),
                });
                messages.push(Message::tool(output, call_id));
            }
        }

        warn!(
            max_iterations = self.max_iterations,
            "Iteration limit reached, requesting final answer without tools"
        );

        let started = Instant::now();
        let response = self.model.invoke_without_tools(&messages).await?;
        llm_calls += 1;
        llm_ms += started.elapsed().as_millis() as u64;
        token_usage = accumulate_token_usage(token_usage, extract_token_usage(&response));

        Ok(LoopOutcome {
            content: response.content.as_text(),
            tool_calls,
            token_usage,
            llm_calls,
            llm_ms,
            tool_ms,
        })
    }
}
