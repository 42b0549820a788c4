//! Redaction of sensitive figures before trace export
//!
//! Rules are a declarative table of field paths per tool name. Sanitizing
//! builds new records; the records used for verification and persistence
//! are never touched.

use crate::models::ToolCallRecord;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const REDACTED: &str = "[REDACTED]";

/// Where a redacted field lives inside a tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLocation {
    /// Every object item of the top-level array under this key.
    EachItem(String),
    /// The top-level object under this key.
    Within(String),
}

impl FieldLocation {
    fn key(&self) -> &str {
        match self {
            FieldLocation::EachItem(key) | FieldLocation::Within(key) => key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub location: FieldLocation,
    pub field: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactionRule {
    pub paths: Vec<FieldPath>,
}

impl RedactionRule {
    fn from_table(table: &[(Location, &[&str])]) -> Self {
        let paths = table
            .iter()
            .flat_map(|(location, fields)| {
                fields.iter().map(move |field| FieldPath {
                    location: location.to_owned_location(),
                    field: field.to_string(),
                })
            })
            .collect();
        Self { paths }
    }

    fn fields_at(&self, key: &str, each_item: bool) -> Vec<&str> {
        self.paths
            .iter()
            .filter(|p| p.location.key() == key)
            .filter(|p| matches!(p.location, FieldLocation::EachItem(_)) == each_item)
            .map(|p| p.field.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum Location {
    EachItem(&'static str),
    Within(&'static str),
}

impl Location {
    fn to_owned_location(self) -> FieldLocation {
        match self {
            Location::EachItem(key) => FieldLocation::EachItem(key.to_string()),
            Location::Within(key) => FieldLocation::Within(key.to_string()),
        }
    }
}

type RuleTable = &'static [(&'static str, &'static [(Location, &'static [&'static str])])];

const DEFAULT_RULES: RuleTable = &[
    (
        "portfolio_analysis",
        &[
            (
                Location::EachItem("holdings"),
                &[
                    "quantity",
                    "marketPrice",
                    "valueInBaseCurrency",
                    "netPerformance",
                    "investment",
                    "balance",
                ],
            ),
            (Location::EachItem("accounts"), &["balance", "valueInBaseCurrency"]),
            (Location::Within("summary"), &["netWorth", "totalInvestment", "netPerformance"]),
        ],
    ),
    (
        "benchmark_compare",
        &[(
            Location::Within("portfolio"),
            &["netPerformance", "currentNetWorth", "totalInvestment"],
        )],
    ),
];

#[derive(Debug, Clone)]
pub struct TraceSanitizerOptions {
    pub rules: HashMap<String, RedactionRule>,
    pub redacted_value: String,
}

impl Default for TraceSanitizerOptions {
    fn default() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .map(|(tool, table)| (tool.to_string(), RedactionRule::from_table(table)))
            .collect();

        Self {
            rules,
            redacted_value: REDACTED.to_string(),
        }
    }
}

/// Redacted copies of `records`, in the same order.
pub fn sanitize_tool_calls_for_trace(
    records: &[ToolCallRecord],
    options: &TraceSanitizerOptions,
) -> Vec<ToolCallRecord> {
    records
        .iter()
        .map(|record| ToolCallRecord {
            name: record.name.clone(),
            input: record.input.clone(),
            output: sanitize_output(&record.name, &record.output, options),
        })
        .collect()
}

fn sanitize_output(tool_name: &str, output: &Value, options: &TraceSanitizerOptions) -> Value {
    let (Some(rule), Some(object)) = (options.rules.get(tool_name), output.as_object()) else {
        return output.clone();
    };

    let redacted = &options.redacted_value;
    let sanitized: Map<String, Value> = object
        .iter()
        .map(|(key, value)| {
            let new_value = match value {
                Value::Array(items) => {
                    let fields = rule.fields_at(key, true);
                    if fields.is_empty() {
                        value.clone()
                    } else {
                        Value::Array(
                            items
                                .iter()
                                .map(|item| redact_fields(item, &fields, redacted))
                                .collect(),
                        )
                    }
                }
                Value::Object(_) => redact_fields(value, &rule.fields_at(key, false), redacted),
                _ => value.clone(),
            };
            (key.clone(), new_value)
        })
        .collect();

    Value::Object(sanitized)
}

/// Replace the listed fields of an object; non-objects pass through.
fn redact_fields(value: &Value, fields: &[&str], redacted: &str) -> Value {
    match value.as_object() {
        Some(object) if !fields.is_empty() => Value::Object(
            object
                .iter()
                .map(|(key, v)| {
                    if fields.contains(&key.as_str()) {
                        (key.clone(), Value::String(redacted.to_string()))
                    } else {
                        (key.clone(), v.clone())
                    }
                })
                .collect(),
        ),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn portfolio_record() -> ToolCallRecord {
        ToolCallRecord {
            name: "portfolio_analysis".into(),
            input: json!({"dateRange": "max"}),
            output: json!({
                "holdings": [{
                    "symbol": "VT",
                    "name": "Vanguard Total World Stock ETF",
                    "currency": "USD",
                    "quantity": 50,
                    "marketPrice": 108.5,
                    "valueInBaseCurrency": 5425,
                    "allocationInPercentage": "85.00"
                }],
                "accounts": [{"name": "Main Brokerage", "balance": 500, "valueInBaseCurrency": 6382.5}],
                "summary": {"netWorth": 6882.5, "totalInvestment": 5732, "netPerformance": 650.5, "netPerformancePercent": 0.1135},
                "dataRetrievedAt": "2026-01-01T00:00:00Z"
            }),
        }
    }

    #[test]
    fn test_portfolio_fields_are_redacted() {
        let records = vec![portfolio_record()];
        let sanitized = sanitize_tool_calls_for_trace(&records, &TraceSanitizerOptions::default());
        let output = &sanitized[0].output;

        assert_eq!(output["holdings"][0]["quantity"], REDACTED);
        assert_eq!(output["holdings"][0]["marketPrice"], REDACTED);
        assert_eq!(output["holdings"][0]["valueInBaseCurrency"], REDACTED);
        assert_eq!(output["accounts"][0]["balance"], REDACTED);
        assert_eq!(output["summary"]["netWorth"], REDACTED);

        // Pass-through fields
        assert_eq!(output["holdings"][0]["symbol"], "VT");
        assert_eq!(output["holdings"][0]["name"], "Vanguard Total World Stock ETF");
        assert_eq!(output["holdings"][0]["currency"], "USD");
        assert_eq!(output["holdings"][0]["allocationInPercentage"], "85.00");
        assert_eq!(output["accounts"][0]["name"], "Main Brokerage");
        assert_eq!(output["summary"]["netPerformancePercent"], 0.1135);
        assert_eq!(sanitized[0].input, records[0].input);
    }

    #[test]
    fn test_original_records_are_not_mutated() {
        let records = vec![portfolio_record()];
        let before = records.clone();
        let _ = sanitize_tool_calls_for_trace(&records, &TraceSanitizerOptions::default());
        assert_eq!(records, before);
        assert_eq!(records[0].output["holdings"][0]["quantity"], 50);
    }

    #[test]
    fn test_benchmark_portfolio_object_redacted() {
        let records = vec![ToolCallRecord {
            name: "benchmark_compare".into(),
            input: json!({"mode": "compare"}),
            output: json!({
                "mode": "compare",
                "portfolio": {"netPerformance": 650.5, "currentNetWorth": 6882.5, "totalInvestment": 5732, "netPerformancePercent": 11.35},
                "benchmark": {"symbol": "SPY", "name": "S&P 500"}
            }),
        }];

        let sanitized = sanitize_tool_calls_for_trace(&records, &TraceSanitizerOptions::default());
        let output = &sanitized[0].output;
        assert_eq!(output["portfolio"]["currentNetWorth"], REDACTED);
        assert_eq!(output["portfolio"]["netPerformancePercent"], 11.35);
        assert_eq!(output["benchmark"]["symbol"], "SPY");
    }

    #[test]
    fn test_tools_without_rules_pass_through() {
        let records = vec![ToolCallRecord {
            name: "market_data".into(),
            input: json!({"symbols": ["AAPL"]}),
            output: json!({"quotes": {"AAPL": {"marketPrice": 190.1}}}),
        }];
        let sanitized = sanitize_tool_calls_for_trace(&records, &TraceSanitizerOptions::default());
        assert_eq!(sanitized, records);
    }

    #[test]
    fn test_custom_marker() {
        let options = TraceSanitizerOptions {
            redacted_value: "***".into(),
            ..TraceSanitizerOptions::default()
        };
        let sanitized = sanitize_tool_calls_for_trace(&[portfolio_record()], &options);
        assert_eq!(sanitized[0].output["summary"]["totalInvestment"], "***");
    }
}
