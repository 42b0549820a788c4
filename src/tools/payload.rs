//! Typed views over tool outputs
//!
//! One variant per known tool, plus `ToolError` for error payloads and
//! `Generic` for anything that does not match its expected shape.

use crate::models::ToolCallRecord;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

pub const PORTFOLIO_ANALYSIS: &str = "portfolio_analysis";
pub const MARKET_DATA: &str = "market_data";
pub const BENCHMARK_COMPARE: &str = "benchmark_compare";
pub const SYMBOL_SEARCH: &str = "symbol_search";
pub const WATCHLIST_MANAGE: &str = "watchlist_manage";

#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload {
    PortfolioAnalysis(PortfolioAnalysisOutput),
    MarketData(MarketDataOutput),
    BenchmarkCompare(BenchmarkCompareOutput),
    SymbolSearch(SymbolSearchOutput),
    Watchlist(WatchlistOutput),
    ToolError(ToolErrorPayload),
    Generic(Value),
}

//
// ================= Per-tool Shapes =================
//

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioAnalysisOutput {
    #[serde(default)]
    pub base_currency: Option<String>,
    #[serde(default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub accounts: Vec<Value>,
    #[serde(default)]
    pub summary: Option<Value>,
    #[serde(default)]
    pub retrieved_at: Option<String>,
    #[serde(default)]
    pub data_retrieved_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    /// Percentage points; tools emit either numbers or strings like `"85.00"`.
    #[serde(default, deserialize_with = "lenient_number")]
    pub allocation_in_percentage: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataOutput {
    #[serde(default)]
    pub quotes: BTreeMap<String, Value>,
    #[serde(default)]
    pub errors: Option<Vec<Value>>,
    #[serde(default)]
    pub retrieved_at: Option<String>,
    #[serde(default)]
    pub data_retrieved_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkCompareOutput {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub date_range: Option<String>,
    #[serde(default)]
    pub portfolio: Option<BenchmarkPortfolio>,
    #[serde(default)]
    pub benchmark: Option<SymbolRef>,
    #[serde(default)]
    pub benchmarks: Vec<SymbolRef>,
    #[serde(default)]
    pub retrieved_at: Option<String>,
    #[serde(default)]
    pub data_retrieved_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkPortfolio {
    #[serde(default, deserialize_with = "strict_number")]
    pub net_performance_percent: Option<f64>,
    #[serde(default, deserialize_with = "strict_number")]
    pub annualized_performance_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SymbolRef {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SymbolSearchOutput {
    #[serde(default)]
    pub results: Vec<SymbolRef>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub total_results: Option<u64>,
    #[serde(default)]
    pub retrieved_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistOutput {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub watchlist: Vec<SymbolRef>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ToolErrorPayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
}

//
// ================= Construction =================
//

impl ToolPayload {
    pub fn from_record(record: &ToolCallRecord) -> Self {
        if record.has_error_marker() {
            return ToolPayload::ToolError(
                ToolErrorPayload::deserialize(&record.output).unwrap_or_default(),
            );
        }

        let output = &record.output;
        let typed = match record.name.as_str() {
            PORTFOLIO_ANALYSIS => PortfolioAnalysisOutput::deserialize(output)
                .ok()
                .map(ToolPayload::PortfolioAnalysis),
            MARKET_DATA => MarketDataOutput::deserialize(output)
                .ok()
                .map(ToolPayload::MarketData),
            BENCHMARK_COMPARE => BenchmarkCompareOutput::deserialize(output)
                .ok()
                .map(ToolPayload::BenchmarkCompare),
            SYMBOL_SEARCH => SymbolSearchOutput::deserialize(output)
                .ok()
                .map(ToolPayload::SymbolSearch),
            WATCHLIST_MANAGE => WatchlistOutput::deserialize(output)
                .ok()
                .map(ToolPayload::Watchlist),
            _ => None,
        };

        typed.unwrap_or_else(|| ToolPayload::Generic(output.clone()))
    }

    //
    // ================= Accessors =================
    //

    /// Instrument symbols this payload proves were retrieved:
    /// holdings, quote keys and benchmark symbols.
    pub fn known_symbols(&self) -> Vec<String> {
        match self {
            ToolPayload::PortfolioAnalysis(p) => {
                p.holdings.iter().filter_map(|h| h.symbol.clone()).collect()
            }
            ToolPayload::MarketData(m) => m.quotes.keys().cloned().collect(),
            ToolPayload::BenchmarkCompare(b) => b
                .benchmark
                .iter()
                .chain(b.benchmarks.iter())
                .filter_map(|r| r.symbol.clone())
                .collect(),
            ToolPayload::SymbolSearch(_) | ToolPayload::Watchlist(_) | ToolPayload::ToolError(_) => {
                Vec::new()
            }
            ToolPayload::Generic(value) => generic_known_symbols(value),
        }
    }

    /// `retrievedAt`, falling back to `dataRetrievedAt`.
    pub fn retrieved_at(&self) -> Option<&str> {
        match self {
            ToolPayload::PortfolioAnalysis(p) => {
                p.retrieved_at.as_deref().or(p.data_retrieved_at.as_deref())
            }
            ToolPayload::MarketData(m) => {
                m.retrieved_at.as_deref().or(m.data_retrieved_at.as_deref())
            }
            ToolPayload::BenchmarkCompare(b) => {
                b.retrieved_at.as_deref().or(b.data_retrieved_at.as_deref())
            }
            ToolPayload::SymbolSearch(s) => s.retrieved_at.as_deref(),
            ToolPayload::Watchlist(_) | ToolPayload::ToolError(_) => None,
            ToolPayload::Generic(value) => value
                .get("retrievedAt")
                .and_then(Value::as_str)
                .or_else(|| value.get("dataRetrievedAt").and_then(Value::as_str)),
        }
    }

    /// Symbols carrying their own quote (for per-symbol freshness thresholds).
    pub fn quote_symbols(&self) -> Vec<String> {
        match self {
            ToolPayload::MarketData(m) => m.quotes.keys().cloned().collect(),
            ToolPayload::Generic(value) => value
                .get("quotes")
                .and_then(Value::as_object)
                .map(|quotes| quotes.keys().cloned().collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

fn generic_known_symbols(value: &Value) -> Vec<String> {
    let mut symbols = Vec::new();

    let symbol_of = |item: &Value| match item.get("symbol") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    if let Some(holdings) = value.get("holdings").and_then(Value::as_array) {
        symbols.extend(holdings.iter().filter_map(symbol_of));
    }
    if let Some(quotes) = value.get("quotes").and_then(Value::as_object) {
        symbols.extend(quotes.keys().cloned());
    }
    if let Some(benchmark) = value.get("benchmark").filter(|b| b.is_object()) {
        symbols.extend(symbol_of(benchmark));
    }
    if let Some(benchmarks) = value.get("benchmarks").and_then(Value::as_array) {
        symbols.extend(benchmarks.iter().filter_map(symbol_of));
    }

    symbols
}

//
// ================= Field Deserializers =================
//

/// Accepts numbers and numeric strings; anything else becomes `None`.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Accepts JSON numbers only; strings and other types become `None`.
fn strict_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()))
}
