//! Portfolio Agent
//!
//! A conversational assistant for investment portfolios that:
//! - Answers questions by letting an LLM call financial data tools
//! - Verifies every answer (tickers, numbers, data freshness)
//! - Scores confidence from tool usage and verification results
//! - Persists short-term conversation history and user feedback
//! - Exports sanitized, hash-sealed traces for each request
//!
//! REQUEST LOOP:
//! INPUT → LLM ⇄ TOOLS → VERIFY → SCORE → PERSIST → RESPOND

pub mod agent;
pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod models;
pub mod observability;
pub mod state;
pub mod tools;
pub mod verification;

pub use error::Result;

// Re-export common types
pub use agent::AgentSession;
pub use config::AgentConfig;
pub use models::*;
