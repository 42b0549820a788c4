//! Data freshness
//!
//! Flags tool data older than its staleness threshold. Crypto quotes use a
//! shorter threshold than equities and whole-output timestamps.

use super::{VerificationCheck, VerificationContext};
use crate::models::{Severity, VerificationResult};
use crate::tools::payload::{BENCHMARK_COMPARE, MARKET_DATA, PORTFOLIO_ANALYSIS};
use crate::Result;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;

pub const CHECK_TYPE: &str = "data_freshness";

const CRYPTO_PREFIXES: &[&str] = &[
    "BTC", "ETH", "XRP", "SOL", "ADA", "DOGE", "DOT", "MATIC", "AVAX", "LINK",
];
const CRYPTO_PAIR_SUFFIXES: &[&str] = &["-USD", "-EUR", "-GBP"];

const LOCAL_FORMATS: &[&str] = &[
    "%m/%d/%Y, %I:%M:%S %p",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

lazy_static! {
    static ref ZONE_SUFFIX: Regex = Regex::new(r"\s+([A-Z]{1,4})$").expect("valid zone suffix regex");
}

/// How a tool's output is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessCheckKind {
    /// Every symbol under `quotes`, with per-symbol thresholds.
    Quotes,
    /// The top-level `retrievedAt` / `dataRetrievedAt`.
    Timestamp,
}

#[derive(Debug, Clone)]
pub struct DataFreshnessOptions {
    pub default_threshold: Duration,
    pub crypto_threshold: Duration,
    pub tool_checks: HashMap<String, FreshnessCheckKind>,
}

impl Default for DataFreshnessOptions {
    fn default() -> Self {
        Self {
            default_threshold: Duration::from_secs(24 * 3600),
            crypto_threshold: Duration::from_secs(3600),
            tool_checks: HashMap::from([
                (MARKET_DATA.to_string(), FreshnessCheckKind::Quotes),
                (PORTFOLIO_ANALYSIS.to_string(), FreshnessCheckKind::Timestamp),
                (BENCHMARK_COMPARE.to_string(), FreshnessCheckKind::Timestamp),
            ]),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataFreshness {
    options: DataFreshnessOptions,
}

impl DataFreshness {
    pub fn new(options: DataFreshnessOptions) -> Self {
        Self { options }
    }

    fn threshold_for(&self, symbol: &str) -> Duration {
        if is_crypto_symbol(symbol) {
            self.options.crypto_threshold
        } else {
            self.options.default_threshold
        }
    }
}

impl VerificationCheck for DataFreshness {
    fn name(&self) -> &'static str {
        CHECK_TYPE
    }

    fn check(&self, ctx: &VerificationContext<'_>) -> Result<VerificationResult> {
        let mut issues = Vec::new();

        for (record, payload) in ctx.typed_calls() {
            let Some(kind) = self.options.tool_checks.get(&record.name) else {
                continue;
            };
            let Some(retrieved_at) = payload.retrieved_at().and_then(parse_retrieved_at) else {
                continue;
            };

            let age_ms = (ctx.now - retrieved_at).num_milliseconds();
            let hours = age_ms as f64 / 3_600_000.0;

            match kind {
                FreshnessCheckKind::Quotes => {
                    for symbol in payload.quote_symbols() {
                        let threshold = self.threshold_for(&symbol);
                        if age_ms > threshold.as_millis() as i64 {
                            issues.push(format!(
                                "{} data is {:.1}h old (threshold: {}).",
                                symbol,
                                hours,
                                threshold_label(threshold)
                            ));
                        }
                    }
                }
                FreshnessCheckKind::Timestamp => {
                    let threshold = self.options.default_threshold;
                    if age_ms > threshold.as_millis() as i64 {
                        issues.push(format!(
                            "{} data is {:.1}h old (threshold: {}).",
                            tool_label(&record.name),
                            hours,
                            threshold_label(threshold)
                        ));
                    }
                }
            }
        }

        if issues.is_empty() {
            return Ok(VerificationResult::pass(
                CHECK_TYPE,
                "All data is within acceptable freshness thresholds.",
            ));
        }

        Ok(VerificationResult::fail(
            CHECK_TYPE,
            format!("Stale data detected: {}", issues.join(" ")),
            Severity::Warning,
        ))
    }
}

/// Crypto prefixes (case-insensitive) or a currency-pair suffix.
pub fn is_crypto_symbol(symbol: &str) -> bool {
    let upper = symbol.to_ascii_uppercase();
    CRYPTO_PREFIXES.iter().any(|p| upper.starts_with(p))
        || CRYPTO_PAIR_SUFFIXES.iter().any(|s| upper.ends_with(s))
}

/// Parse a tool timestamp: RFC 3339, or a local date-time with an optional
/// trailing zone label. `ET`/`EST`/`EDT` resolve in New York; anything else is UTC.
pub fn parse_retrieved_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    let (clean, zone) = match ZONE_SUFFIX.captures(raw) {
        Some(caps) => {
            let label = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            if label == "AM" || label == "PM" {
                (raw, None)
            } else {
                let start = caps.get(0).map(|m| m.start()).unwrap_or(raw.len());
                (&raw[..start], Some(label))
            }
        }
        None => (raw, None),
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(clean) {
        return Some(parsed.with_timezone(&Utc));
    }

    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(clean, format).ok())?;

    match zone {
        Some("ET") | Some("EST") | Some("EDT") => New_York
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc)),
        _ => Some(Utc.from_utc_datetime(&naive)),
    }
}

fn threshold_label(threshold: Duration) -> String {
    let secs = threshold.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// `portfolio_analysis` -> `Portfolio analysis`
fn tool_label(tool_name: &str) -> String {
    let spaced = tool_name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
