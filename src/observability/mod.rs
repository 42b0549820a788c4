//! Observability helpers
//!
//! Pure functions only: token accounting, error categorization and
//! redaction of tool payloads before they leave the process.

pub mod errors;
pub mod sanitizer;
pub mod tokens;

pub use errors::{categorize_error, ErrorCategorizer, ErrorPattern};
pub use sanitizer::{sanitize_tool_calls_for_trace, RedactionRule, TraceSanitizerOptions};
pub use tokens::{accumulate_token_usage, extract_token_usage};
