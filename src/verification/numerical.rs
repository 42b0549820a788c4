//! Numerical crosscheck
//!
//! Internal consistency of figures in tool outputs: allocation percentages
//! must sum to roughly 100, and annualized benchmark performance must stay
//! proportionate to net performance.

use super::{VerificationCheck, VerificationContext};
use crate::models::{Severity, VerificationResult};
use crate::tools::payload::{BenchmarkCompareOutput, PortfolioAnalysisOutput};
use crate::tools::ToolPayload;
use crate::Result;

pub const CHECK_TYPE: &str = "numerical_crosscheck";

#[derive(Debug, Clone)]
pub struct NumericalCrosscheckOptions {
    /// Allowed deviation of the allocation sum from 100, in percentage points.
    pub allocation_tolerance: f64,
    /// Maximum `|annualized / net|` ratio.
    pub max_performance_ratio: f64,
    /// Net performance magnitude below which the ratio is not computed.
    pub min_net_performance: f64,
}

impl Default for NumericalCrosscheckOptions {
    fn default() -> Self {
        Self {
            allocation_tolerance: 2.0,
            max_performance_ratio: 10.0,
            min_net_performance: 0.01,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NumericalCrosscheck {
    options: NumericalCrosscheckOptions,
}

impl NumericalCrosscheck {
    pub fn new(options: NumericalCrosscheckOptions) -> Self {
        Self { options }
    }

    fn check_allocation_sum(&self, portfolio: &PortfolioAnalysisOutput) -> Option<String> {
        if portfolio.holdings.is_empty() {
            return None;
        }

        let sum: f64 = portfolio
            .holdings
            .iter()
            .map(|h| h.allocation_in_percentage.unwrap_or(0.0))
            .sum();
        let deviation = (sum - 100.0).abs();

        (deviation > self.options.allocation_tolerance).then(|| {
            format!(
                "Allocation percentages sum to {:.2}% (expected ~100%, deviation {:.2}%).",
                sum, deviation
            )
        })
    }

    fn check_benchmark_consistency(&self, benchmark: &BenchmarkCompareOutput) -> Option<String> {
        if benchmark.mode.as_deref() != Some("compare") {
            return None;
        }

        let portfolio = benchmark.portfolio.as_ref()?;
        let net = portfolio.net_performance_percent?;
        let annualized = portfolio.annualized_performance_percent?;

        if net.abs() <= self.options.min_net_performance {
            return None;
        }

        let ratio = (annualized / net).abs();
        (ratio > self.options.max_performance_ratio).then(|| {
            format!(
                "Annualized performance ({}%) seems disproportionate to net performance ({}%). Data may be unreliable for this date range.",
                annualized, net
            )
        })
    }
}

impl VerificationCheck for NumericalCrosscheck {
    fn name(&self) -> &'static str {
        CHECK_TYPE
    }

    fn check(&self, ctx: &VerificationContext<'_>) -> Result<VerificationResult> {
        let issues: Vec<String> = ctx
            .payloads
            .iter()
            .filter_map(|payload| match payload {
                ToolPayload::PortfolioAnalysis(portfolio) => self.check_allocation_sum(portfolio),
                ToolPayload::BenchmarkCompare(benchmark) => {
                    self.check_benchmark_consistency(benchmark)
                }
                _ => None,
            })
            .collect();

        if issues.is_empty() {
            return Ok(VerificationResult::pass(
                CHECK_TYPE,
                "All numerical values are internally consistent.",
            ));
        }

        Ok(VerificationResult::fail(
            CHECK_TYPE,
            issues.join(" "),
            Severity::Warning,
        ))
    }
}
