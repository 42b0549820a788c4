//! Confidence scoring
//!
//! Rolls tool usage and verification outcomes into a 0-100 score. The
//! score is reported as one more verification result.

use crate::config::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::models::{Severity, ToolCallRecord, VerificationResult};

pub const CHECK_TYPE: &str = "confidence_score";

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceFactors<'a> {
    pub tool_call_count: usize,
    pub verification_results: &'a [VerificationResult],
    pub has_tool_errors: bool,
    pub data_retrieved_count: usize,
}

impl<'a> ConfidenceFactors<'a> {
    /// Derive execution statistics from the executed tool calls.
    pub fn from_tool_calls(
        tool_calls: &[ToolCallRecord],
        verification_results: &'a [VerificationResult],
    ) -> Self {
        let errored = tool_calls.iter().filter(|r| r.has_error_marker()).count();

        Self {
            tool_call_count: tool_calls.len(),
            verification_results,
            has_tool_errors: errored > 0,
            data_retrieved_count: tool_calls.len() - errored,
        }
    }
}

/// Penalties are in score points.
#[derive(Debug, Clone)]
pub struct ConfidenceScoreOptions {
    pub low_confidence_threshold: i32,
    pub no_tool_calls_penalty: i32,
    pub error_penalty: i32,
    pub warning_penalty: i32,
    pub info_penalty: i32,
    pub tool_error_penalty: i32,
    pub no_data_penalty: i32,
}

impl Default for ConfidenceScoreOptions {
    fn default() -> Self {
        Self {
            low_confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            no_tool_calls_penalty: 40,
            error_penalty: 25,
            warning_penalty: 15,
            info_penalty: 5,
            tool_error_penalty: 20,
            no_data_penalty: 15,
        }
    }
}

impl ConfidenceScoreOptions {
    pub fn with_threshold(threshold: i32) -> Self {
        Self {
            low_confidence_threshold: threshold,
            ..Self::default()
        }
    }

    fn severity_penalty(&self, severity: Severity) -> i32 {
        match severity {
            Severity::Error => self.error_penalty,
            Severity::Warning => self.warning_penalty,
            Severity::Info => self.info_penalty,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceScore {
    pub score: u8,
    pub verification_result: VerificationResult,
}

pub fn score_confidence(
    factors: &ConfidenceFactors<'_>,
    options: &ConfidenceScoreOptions,
) -> ConfidenceScore {
    let mut score: i32 = 100;

    if factors.tool_call_count == 0 {
        score -= options.no_tool_calls_penalty;
    }

    score -= factors
        .verification_results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| options.severity_penalty(r.severity))
        .sum::<i32>();

    if factors.has_tool_errors {
        score -= options.tool_error_penalty;
    }

    if factors.tool_call_count > 0 && factors.data_retrieved_count == 0 {
        score -= options.no_data_penalty;
    }

    let score = score.clamp(0, 100);
    let passed = score >= options.low_confidence_threshold;

    let verification_result = if passed {
        VerificationResult::pass(CHECK_TYPE, format!("Confidence score: {}/100.", score))
    } else {
        VerificationResult::fail(
            CHECK_TYPE,
            format!(
                "Low confidence score: {}/100. Results may be unreliable.",
                score
            ),
            Severity::Warning,
        )
    };

    ConfidenceScore {
        score: score as u8,
        verification_result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clean(tool_call_count: usize) -> ConfidenceFactors<'static> {
        ConfidenceFactors {
            tool_call_count,
            verification_results: &[],
            has_tool_errors: false,
            data_retrieved_count: tool_call_count,
        }
    }

    #[test]
    fn test_grounded_clean_response_scores_100() {
        let result = score_confidence(&clean(2), &ConfidenceScoreOptions::default());
        assert_eq!(result.score, 100);
        assert!(result.verification_result.passed);
        assert_eq!(result.verification_result.details, "Confidence score: 100/100.");
        assert_eq!(result.verification_result.severity, Severity::Info);
    }

    #[test]
    fn test_no_tool_calls_scores_60_and_fails() {
        let result = score_confidence(&clean(0), &ConfidenceScoreOptions::default());
        assert_eq!(result.score, 60);
        assert!(!result.verification_result.passed);
        assert_eq!(result.verification_result.check_type, "confidence_score");
        assert_eq!(result.verification_result.severity, Severity::Warning);
        assert_eq!(
            result.verification_result.details,
            "Low confidence score: 60/100. Results may be unreliable."
        );
    }

    #[test]
    fn test_score_clamps_to_zero() {
        let failures = vec![
            VerificationResult::fail("a", "x", Severity::Error),
            VerificationResult::fail("b", "x", Severity::Error),
            VerificationResult::fail("c", "x", Severity::Error),
        ];
        let factors = ConfidenceFactors {
            tool_call_count: 0,
            verification_results: &failures,
            has_tool_errors: true,
            data_retrieved_count: 0,
        };
        let result = score_confidence(&factors, &ConfidenceScoreOptions::default());
        assert_eq!(result.score, 0);
    }

    #[test]
    fn test_severity_penalties_and_passed_checks() {
        let results = vec![
            VerificationResult::fail("a", "x", Severity::Warning),
            VerificationResult::fail("b", "x", Severity::Info),
            VerificationResult::pass("c", "ok"),
        ];
        let factors = ConfidenceFactors {
            verification_results: &results,
            ..clean(1)
        };
        let result = score_confidence(&factors, &ConfidenceScoreOptions::default());
        assert_eq!(result.score, 80);
        assert!(result.verification_result.passed);
    }

    #[test]
    fn test_factors_from_tool_calls() {
        let records = vec![
            ToolCallRecord {
                name: "market_data".into(),
                input: json!({}),
                output: json!({"error": true, "message": "down"}),
            },
            ToolCallRecord {
                name: "market_data".into(),
                input: json!({}),
                output: json!({"error": true, "message": "still down"}),
            },
        ];
        let factors = ConfidenceFactors::from_tool_calls(&records, &[]);
        assert_eq!(factors.tool_call_count, 2);
        assert!(factors.has_tool_errors);
        assert_eq!(factors.data_retrieved_count, 0);

        // 100 - 20 (tool error) - 15 (no data)
        let result = score_confidence(&factors, &ConfidenceScoreOptions::default());
        assert_eq!(result.score, 65);
    }

    #[test]
    fn test_custom_threshold() {
        let result = score_confidence(&clean(0), &ConfidenceScoreOptions::with_threshold(50));
        assert!(result.verification_result.passed);
    }
}
