//! Ticker validation
//!
//! Flags uppercase ticker-like tokens in the answer that never appeared in
//! any tool output.

use super::{VerificationCheck, VerificationContext};
use crate::models::{Severity, VerificationResult};
use crate::Result;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

pub const CHECK_TYPE: &str = "ticker_validation";

lazy_static! {
    static ref TICKER_PATTERN: Regex = Regex::new(r"\b[A-Z][A-Z0-9]{0,9}\b").expect("valid ticker regex");

    /// Common words, abbreviations and currency codes that look like tickers.
    static ref FALSE_POSITIVES: HashSet<&'static str> = [
        "A", "I", "AM", "AN", "AS", "AT", "BE", "BY", "DO", "GO", "HE", "IF", "IN", "IS", "IT",
        "ME", "MY", "NO", "OF", "OK", "ON", "OR", "SO", "TO", "UP", "US", "WE", "AND", "ARE",
        "BUT", "CAN", "DID", "FOR", "GET", "HAD", "HAS", "HER", "HIM", "HIS", "HOW", "ITS",
        "LET", "MAY", "NEW", "NOT", "NOW", "OLD", "OUR", "OWN", "SAY", "SHE", "THE", "TOO",
        "TRY", "USE", "WAY", "WHO", "ALL", "ANY", "DAY", "END", "FEW", "GOT", "LOW", "MAN",
        "PUT", "RUN", "SET", "USD", "EUR", "GBP", "CHF", "JPY", "CAD", "AUD", "NZD", "ETF",
        "BUY", "NOTE", "THIS", "THAT", "WITH", "FROM", "HAVE", "WILL", "YOUR", "BEEN", "EACH",
        "MAKE", "LIKE", "LONG", "LOOK", "MANY", "SOME", "SUCH", "THAN", "THEM", "THEN", "TIME",
        "VERY", "WHEN", "ONLY", "OVER", "ALSO",
    ]
    .into_iter()
    .collect();
}

#[derive(Debug, Clone)]
pub struct TickerValidationOptions {
    /// Merged with the built-in dictionary.
    pub additional_false_positives: HashSet<String>,
    pub min_ticker_length: usize,
    pub max_ticker_length: usize,
}

impl Default for TickerValidationOptions {
    fn default() -> Self {
        Self {
            additional_false_positives: HashSet::new(),
            min_ticker_length: 2,
            max_ticker_length: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TickerValidation {
    options: TickerValidationOptions,
}

impl TickerValidation {
    pub fn new(options: TickerValidationOptions) -> Self {
        Self { options }
    }

    fn is_false_positive(&self, token: &str) -> bool {
        FALSE_POSITIVES.contains(token) || self.options.additional_false_positives.contains(token)
    }
}

impl VerificationCheck for TickerValidation {
    fn name(&self) -> &'static str {
        CHECK_TYPE
    }

    fn check(&self, ctx: &VerificationContext<'_>) -> Result<VerificationResult> {
        let known: HashSet<String> = ctx
            .payloads
            .iter()
            .flat_map(|payload| payload.known_symbols())
            .collect();

        if known.is_empty() {
            return Ok(VerificationResult::pass(
                CHECK_TYPE,
                "No tool calls with symbol data to validate against.",
            ));
        }

        let mut seen = HashSet::new();
        let suspicious: Vec<&str> = TICKER_PATTERN
            .find_iter(ctx.response_text)
            .map(|m| m.as_str())
            .filter(|token| seen.insert(*token))
            .filter(|token| !self.is_false_positive(token))
            .filter(|token| {
                token.len() >= self.options.min_ticker_length
                    && token.len() <= self.options.max_ticker_length
            })
            .filter(|token| !known.contains(*token))
            .collect();

        if suspicious.is_empty() {
            return Ok(VerificationResult::pass(
                CHECK_TYPE,
                "All mentioned symbols were found in tool output data.",
            ));
        }

        Ok(VerificationResult::fail(
            CHECK_TYPE,
            format!(
                "Symbols mentioned in response but not found in tool data: {}. These may be fabricated.",
                suspicious.join(", ")
            ),
            Severity::Warning,
        ))
    }
}
