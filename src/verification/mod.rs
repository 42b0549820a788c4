//! Response verification pipeline
//!
//! Deterministic checks run against the model's final answer and the tool
//! outputs it was given. Each check is independent: an error or panic in one
//! check degrades to a single flagged result and the remaining checks still run.

use crate::models::{Severity, ToolCallRecord, VerificationResult};
use crate::tools::ToolPayload;
use crate::Result;
use chrono::{DateTime, Utc};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{info, warn};

pub mod confidence;
pub mod freshness;
pub mod numerical;
pub mod ticker;

pub use confidence::{score_confidence, ConfidenceFactors, ConfidenceScore, ConfidenceScoreOptions};
pub use freshness::{DataFreshness, DataFreshnessOptions, FreshnessCheckKind};
pub use numerical::{NumericalCrosscheck, NumericalCrosscheckOptions};
pub use ticker::{TickerValidation, TickerValidationOptions};

pub const CHECK_FAILED_DETAILS: &str = "Verification could not be completed.";

/// Everything a check may look at for one response.
pub struct VerificationContext<'a> {
    pub response_text: &'a str,
    pub tool_calls: &'a [ToolCallRecord],
    /// Typed view of each record, same order as `tool_calls`.
    pub payloads: Vec<ToolPayload>,
    pub now: DateTime<Utc>,
}

impl<'a> VerificationContext<'a> {
    pub fn new(response_text: &'a str, tool_calls: &'a [ToolCallRecord], now: DateTime<Utc>) -> Self {
        Self {
            response_text,
            tool_calls,
            payloads: tool_calls.iter().map(ToolPayload::from_record).collect(),
            now,
        }
    }

    /// Records paired with their typed payloads.
    pub fn typed_calls(&self) -> impl Iterator<Item = (&ToolCallRecord, &ToolPayload)> {
        self.tool_calls.iter().zip(self.payloads.iter())
    }
}

/// A single verification check
pub trait VerificationCheck: Send + Sync {
    /// Result type reported in `VerificationResult.type`.
    fn name(&self) -> &'static str;

    fn check(&self, ctx: &VerificationContext<'_>) -> Result<VerificationResult>;
}

/// Runs every registered check in order
pub struct VerificationPipeline {
    checks: Vec<Box<dyn VerificationCheck>>,
}

impl VerificationPipeline {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn add_check(&mut self, check: Box<dyn VerificationCheck>) {
        self.checks.push(check);
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn verify(&self, response_text: &str, tool_calls: &[ToolCallRecord]) -> Vec<VerificationResult> {
        self.verify_at(response_text, tool_calls, Utc::now())
    }

    /// Verify against an explicit clock.
    pub fn verify_at(
        &self,
        response_text: &str,
        tool_calls: &[ToolCallRecord],
        now: DateTime<Utc>,
    ) -> Vec<VerificationResult> {
        let ctx = VerificationContext::new(response_text, tool_calls, now);
        let mut results = Vec::with_capacity(self.checks.len());

        for check in &self.checks {
            let outcome = catch_unwind(AssertUnwindSafe(|| check.check(&ctx)));

            let result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!(check = check.name(), error = %e, "Verification check failed");
                    degraded(check.name())
                }
                Err(_) => {
                    warn!(check = check.name(), "Verification check panicked");
                    degraded(check.name())
                }
            };

            results.push(result);
        }

        let failed = results.iter().filter(|r| !r.passed).count();
        info!(
            check_count = results.len(),
            failed = failed,
            "Verification completed"
        );

        results
    }
}

impl Default for VerificationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn degraded(check_name: &str) -> VerificationResult {
    VerificationResult::fail(check_name, CHECK_FAILED_DETAILS, Severity::Warning)
}

#[derive(Debug, Clone, Default)]
pub struct VerificationOptions {
    pub ticker: TickerValidationOptions,
    pub numerical: NumericalCrosscheckOptions,
    pub freshness: DataFreshnessOptions,
}

/// Ticker validation, numerical crosscheck and data freshness, in that order.
pub fn create_default_verification_pipeline() -> VerificationPipeline {
    create_verification_pipeline(VerificationOptions::default())
}

pub fn create_verification_pipeline(options: VerificationOptions) -> VerificationPipeline {
    let mut pipeline = VerificationPipeline::new();
    pipeline.add_check(Box::new(TickerValidation::new(options.ticker)));
    pipeline.add_check(Box::new(NumericalCrosscheck::new(options.numerical)));
    pipeline.add_check(Box::new(DataFreshness::new(options.freshness)));
    pipeline
}

//
// ================= Tests =================
//
