//! Error categorization for alerting and response shaping

use crate::error::OrchestrationError;
use crate::models::ErrorCategory;
use std::collections::HashMap;

/// Substring group (matched against the lowercased message).
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    pub patterns: Vec<&'static str>,
    pub category: ErrorCategory,
}

/// Classifies errors by variant kind first, then by message patterns.
/// Patterns are checked in order; the first match wins.
#[derive(Debug, Clone)]
pub struct ErrorCategorizer {
    kind_map: HashMap<&'static str, ErrorCategory>,
    patterns: Vec<ErrorPattern>,
}

impl ErrorCategorizer {
    pub fn new(kind_map: HashMap<&'static str, ErrorCategory>, patterns: Vec<ErrorPattern>) -> Self {
        Self { kind_map, patterns }
    }

    pub fn categorize(&self, error: &OrchestrationError) -> ErrorCategory {
        if let Some(category) = self.kind_map.get(error.kind()) {
            return *category;
        }

        self.categorize_message(&error.to_string())
    }

    pub fn categorize_message(&self, message: &str) -> ErrorCategory {
        let msg = message.to_lowercase();

        self.patterns
            .iter()
            .find(|group| group.patterns.iter().any(|p| msg.contains(p)))
            .map(|group| group.category)
            .unwrap_or(ErrorCategory::Unknown)
    }
}

impl Default for ErrorCategorizer {
    fn default() -> Self {
        let kind_map = HashMap::from([
            ("LlmUnavailable", ErrorCategory::LlmFailure),
            ("InvalidInput", ErrorCategory::InputValidation),
            ("VerificationError", ErrorCategory::VerificationFailure),
        ]);

        let patterns = vec![
            ErrorPattern {
                patterns: vec![
                    "429",
                    "rate limit",
                    "timeout",
                    "timed out",
                    "econnrefused",
                    "connection refused",
                    "503",
                    "openrouter",
                ],
                category: ErrorCategory::LlmFailure,
            },
            ErrorPattern {
                patterns: vec!["validation", "required", "invalid", "maximum length"],
                category: ErrorCategory::InputValidation,
            },
            ErrorPattern {
                patterns: vec!["verification", "crosscheck"],
                category: ErrorCategory::VerificationFailure,
            },
            ErrorPattern {
                patterns: vec![
                    "financial api",
                    "portfolio",
                    "data provider",
                    "benchmark",
                    "symbol",
                ],
                category: ErrorCategory::ToolFailure,
            },
        ];

        Self::new(kind_map, patterns)
    }
}

/// Categorize with the default kind map and pattern groups.
pub fn categorize_error(error: &OrchestrationError) -> ErrorCategory {
    ErrorCategorizer::default().categorize(error)
}
