//! HTTP-backed tools
//!
//! Each tool forwards its arguments to the financial API service and hands
//! the response body back verbatim. Failures are converted into structured
//! error payloads so a broken backend never aborts the chat request.

use super::payload::{
    BENCHMARK_COMPARE, MARKET_DATA, PORTFOLIO_ANALYSIS, SYMBOL_SEARCH, WATCHLIST_MANAGE,
};
use super::{Tool, ToolRegistry};
use crate::error::OrchestrationError;
use crate::Result;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Clone)]
pub struct FinancialApiClient {
    client: Client,
    base_url: String,
}

impl FinancialApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::ToolError(format!(
                    "Financial API request failed for {}: {}",
                    path, e
                ))
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| OrchestrationError::ToolError(format!("Invalid response body: {}", e)))?;

        if !status.is_success() {
            return Err(OrchestrationError::ToolError(format!(
                "Financial API returned {} for {}: {}",
                status, path, text
            )));
        }

        Ok(text)
    }
}

/// A tool whose implementation lives behind the financial API.
pub struct ApiBackedTool {
    name: &'static str,
    description: &'static str,
    schema: Value,
    suggestion: &'static str,
    api: Option<FinancialApiClient>,
}

impl ApiBackedTool {
    fn error_payload(&self, message: String) -> String {
        json!({
            "error": true,
            "message": message,
            "suggestion": self.suggestion,
        })
        .to_string()
    }
}

#[async_trait::async_trait]
impl Tool for ApiBackedTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn invoke(&self, args: &Value) -> Result<String> {
        let Some(api) = self.api.as_ref() else {
            return Ok(self.error_payload(
                "FINANCIAL_API_BASE_URL (or TOOLS_API_BASE_URL) is not configured".to_string(),
            ));
        };

        let path = format!("/api/v1/agent/tools/{}", self.name);
        match api.post_json(&path, args).await {
            Ok(body) => Ok(body),
            Err(e) => {
                warn!(tool_name = self.name, error = %e, "Tool backend call failed");
                Ok(self.error_payload(e.to_string()))
            }
        }
    }
}

fn tool_definitions() -> Vec<(&'static str, &'static str, Value, &'static str)> {
    vec![
        (
            PORTFOLIO_ANALYSIS,
            "Retrieves the authenticated user's portfolio holdings, allocation percentages, performance metrics, and account details. Use this for questions about the user's portfolio, holdings, investments, diversification, gains, losses, or asset allocation.",
            json!({
                "type": "object",
                "properties": {
                    "dateRange": {
                        "type": "string",
                        "enum": ["1d", "1y", "5y", "max", "mtd", "wtd", "ytd"],
                        "description": "Time range for performance data. Defaults to \"max\" (all time)."
                    },
                    "withSummary": {
                        "type": "boolean",
                        "description": "Include portfolio summary with totals. Defaults to true."
                    }
                }
            }),
            "The portfolio data could not be loaded. This may be a temporary issue - please try again.",
        ),
        (
            MARKET_DATA,
            "Retrieves current market prices, market state (open/closed), and currency for ticker symbols. Use this for questions about stock prices, crypto prices, ETF prices, or any market quote. Accepts up to 10 symbols at once.",
            json!({
                "type": "object",
                "properties": {
                    "symbols": {
                        "type": "array",
                        "items": {"type": "string"},
                        "minItems": 1,
                        "maxItems": 10,
                        "description": "Array of ticker symbols to look up (e.g., [\"AAPL\", \"MSFT\", \"BTC-USD\"])."
                    }
                },
                "required": ["symbols"]
            }),
            "Market data could not be loaded. This may be a temporary issue - please try again.",
        ),
        (
            BENCHMARK_COMPARE,
            "Lists available market benchmarks or compares portfolio performance against a specific benchmark. Use \"list\" mode to show available benchmarks. Use \"compare\" mode to compare the user's portfolio returns against a benchmark over a time range.",
            json!({
                "type": "object",
                "properties": {
                    "mode": {"type": "string", "enum": ["list", "compare"]},
                    "benchmarkSymbol": {
                        "type": "string",
                        "description": "The benchmark symbol to compare against. Required for \"compare\" mode."
                    },
                    "dateRange": {
                        "type": "string",
                        "enum": ["1d", "1y", "5y", "max", "mtd", "wtd", "ytd"]
                    }
                },
                "required": ["mode"]
            }),
            "Benchmark data could not be loaded. This may be a temporary issue - please try again.",
        ),
        (
            SYMBOL_SEARCH,
            "Searches for ticker symbols by company name, ticker, or keyword. Use this when the user mentions an asset by name and the exact symbol is unknown.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Company name, ticker, or keyword."}
                },
                "required": ["query"]
            }),
            "Symbol search is temporarily unavailable - please try again.",
        ),
        (
            WATCHLIST_MANAGE,
            "Views, adds to, or removes from the user's watchlist.",
            json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["view", "add", "remove"]},
                    "symbol": {"type": "string"},
                    "dataSource": {"type": "string"}
                },
                "required": ["action"]
            }),
            "The watchlist could not be updated. This may be a temporary issue - please try again.",
        ),
    ]
}

/// Create a registry with the API-backed financial tools.
pub fn create_default_registry(financial_api_base_url: Option<&str>) -> Result<ToolRegistry> {
    let api = financial_api_base_url
        .map(FinancialApiClient::new)
        .transpose()?;

    let mut registry = ToolRegistry::new();
    for (name, description, schema, suggestion) in tool_definitions() {
        registry.register(Arc::new(ApiBackedTool {
            name,
            description,
            schema,
            suggestion,
            api: api.clone(),
        }));
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_tools() {
        let registry = create_default_registry(None).unwrap();
        assert_eq!(
            registry.list(),
            vec![
                "portfolio_analysis",
                "market_data",
                "benchmark_compare",
                "symbol_search",
                "watchlist_manage"
            ]
        );
        let specs = registry.specs();
        assert_eq!(specs[1].input_schema["required"][0], "symbols");
    }

    #[tokio::test]
    async fn test_unconfigured_backend_returns_error_payload() {
        let registry = create_default_registry(None).unwrap();
        let tool = registry.get("market_data").unwrap();

        let output = tool.invoke(&json!({"symbols": ["AAPL"]})).await.unwrap();
        let parsed: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed["error"], true);
        assert!(parsed["message"].as_str().unwrap().contains("not configured"));
        assert!(parsed["suggestion"].is_string());
    }

    #[tokio::test]
    async fn test_unreachable_backend_returns_error_payload() {
        let registry = create_default_registry(Some("http://127.0.0.1:9/")).unwrap();
        let tool = registry.get("portfolio_analysis").unwrap();

        let output = tool.invoke(&json!({})).await.unwrap();
        let parsed: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed["error"], true);
        assert!(parsed["message"]
            .as_str()
            .unwrap()
            .contains("/api/v1/agent/tools/portfolio_analysis"));
    }
}
