//! REST API for the portfolio agent
//!
//! `POST /agent/chat` and `POST /agent/feedback` in front of an
//! `AgentSession`, plus a health probe.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::agent::AgentSession;
use crate::error::OrchestrationError;
use crate::observability::categorize_error;

pub const MAX_MESSAGE_LENGTH: usize = 10_240;

lazy_static! {
    /// Control characters except tab, newline and carriage return.
    static ref CONTROL_CHARS: Regex =
        Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("valid control character regex");
}

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub conversation_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    #[serde(default)]
    pub conversation_id: Option<Value>,
    #[serde(default)]
    pub message_index: Option<Value>,
    #[serde(default)]
    pub rating: Option<Value>,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub session: Arc<AgentSession>,
}

/// =============================
/// Helpers
/// =============================

/// Strip control characters, keeping `\t`, `\n` and `\r`.
pub fn sanitize_message(input: &str) -> String {
    CONTROL_CHARS.replace_all(input, "").into_owned()
}

fn validate_message(raw: Option<&Value>) -> Result<String, OrchestrationError> {
    let message = raw
        .and_then(Value::as_str)
        .map(sanitize_message)
        .unwrap_or_default();

    if message.trim().is_empty() {
        return Err(OrchestrationError::InvalidInput(
            "Message is required".to_string(),
        ));
    }

    if message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(OrchestrationError::InvalidInput(format!(
            "Message exceeds maximum length of {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }

    Ok(message)
}

fn validate_conversation_id(raw: Option<&Value>) -> Result<Option<String>, OrchestrationError> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(id.clone())),
        Some(_) => Err(OrchestrationError::InvalidInput(
            "conversationId must be a string".to_string(),
        )),
    }
}

/// Malformed or non-JSON bodies are input errors, not 422s.
fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, OrchestrationError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| {
            OrchestrationError::InvalidInput(format!("Invalid request body: {}", rejection.body_text()))
        })
}

fn status_for(e: &OrchestrationError) -> StatusCode {
    match e {
        OrchestrationError::LlmUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        OrchestrationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Client-facing message: unexpected failures are not echoed back.
fn public_message(e: &OrchestrationError, fallback: &str) -> String {
    match e {
        OrchestrationError::LlmUnavailable(message) | OrchestrationError::InvalidInput(message) => {
            message.clone()
        }
        _ => fallback.to_string(),
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let validated = parse_body(payload).and_then(|req| {
        let message = validate_message(req.message.as_ref())?;
        let conversation_id = validate_conversation_id(req.conversation_id.as_ref())?;
        Ok((message, conversation_id))
    });

    let (message, conversation_id) = match validated {
        Ok(validated) => validated,
        Err(e) => {
            return (
                status_for(&e),
                Json(json!({
                    "error": public_message(&e, ""),
                    "category": categorize_error(&e),
                })),
            )
        }
    };

    info!(
        conversation_id = ?conversation_id,
        message_length = message.len(),
        "Received chat request"
    );

    match state
        .session
        .chat(&message, conversation_id.as_deref())
        .await
    {
        Ok(response) => match serde_json::to_value(&response) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(e) => {
                error!("Failed to serialize agent response: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "An unexpected error occurred. Please try again.",
                        "category": "unknown",
                    })),
                )
            }
        },
        Err(e) => {
            error!(error = %e, "Agent chat failed");
            (
                status_for(&e),
                Json(json!({
                    "error": public_message(&e, "An unexpected error occurred. Please try again."),
                    "category": categorize_error(&e),
                })),
            )
        }
    }
}

/// =============================
/// Feedback Endpoint
/// =============================

async fn feedback_handler(
    State(state): State<ApiState>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let req = match parse_body(payload) {
        Ok(req) => req,
        Err(e) => {
            return (
                status_for(&e),
                Json(json!({
                    "success": false,
                    "error": public_message(&e, ""),
                    "category": categorize_error(&e),
                })),
            )
        }
    };

    let conversation_id = req
        .conversation_id
        .as_ref()
        .and_then(Value::as_str)
        .unwrap_or_default();
    // Non-integral or missing indexes are rejected like negative ones.
    let message_index = req
        .message_index
        .as_ref()
        .and_then(Value::as_i64)
        .unwrap_or(-1);
    let rating = req
        .rating
        .as_ref()
        .and_then(Value::as_str)
        .unwrap_or_default();

    match state
        .session
        .submit_feedback(conversation_id, message_index, rating)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))),
        Err(e) => {
            error!(error = %e, "Failed to submit feedback");
            (
                status_for(&e),
                Json(json!({
                    "success": false,
                    "error": public_message(&e, "Failed to submit feedback"),
                    "category": categorize_error(&e),
                })),
            )
        }
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(session: Arc<AgentSession>) -> Router {
    let state = ApiState { session };

    Router::new()
        .route("/health", get(health))
        .route("/agent/chat", post(chat_handler))
        .route("/agent/feedback", post(feedback_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    session: Arc<AgentSession>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(session);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
