//! Token usage extraction and accumulation

use crate::llm::ModelResponse;
use crate::models::TokenUsage;

/// Extract usage from a model response.
///
/// Prefers the unified `usage_metadata` shape (when it carries an input
/// count) and falls back to the legacy `response_metadata.tokenUsage`
/// shape. Returns all zeros when neither is present.
pub fn extract_token_usage(response: &ModelResponse) -> TokenUsage {
    if let Some(usage) = response.usage_metadata {
        if let Some(input_tokens) = usage.input_tokens {
            return TokenUsage {
                input_tokens,
                output_tokens: usage.output_tokens.unwrap_or(0),
                total_tokens: usage.total_tokens.unwrap_or(0),
            };
        }
    }

    if let Some(legacy) = response.response_metadata.and_then(|m| m.token_usage) {
        return TokenUsage {
            input_tokens: legacy.prompt_tokens.unwrap_or(0),
            output_tokens: legacy.completion_tokens.unwrap_or(0),
            total_tokens: legacy.total_tokens.unwrap_or(0),
        };
    }

    TokenUsage::default()
}

pub fn accumulate_token_usage(existing: TokenUsage, addition: TokenUsage) -> TokenUsage {
    TokenUsage {
        input_tokens: existing.input_tokens + addition.input_tokens,
        output_tokens: existing.output_tokens + addition.output_tokens,
        total_tokens: existing.total_tokens + addition.total_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LegacyTokenUsage, ResponseMetadata, UsageMetadata};

    #[test]
    fn test_prefers_usage_metadata() {
        let response = ModelResponse {
            usage_metadata: Some(UsageMetadata {
                input_tokens: Some(100),
                output_tokens: Some(50),
                total_tokens: Some(150),
            }),
            response_metadata: Some(ResponseMetadata {
                token_usage: Some(LegacyTokenUsage {
                    prompt_tokens: Some(1),
                    completion_tokens: Some(1),
                    total_tokens: Some(2),
                }),
            }),
            ..ModelResponse::default()
        };

        assert_eq!(
            extract_token_usage(&response),
            TokenUsage { input_tokens: 100, output_tokens: 50, total_tokens: 150 }
        );
    }

    #[test]
    fn test_falls_back_to_legacy_shape() {
        let response = ModelResponse {
            usage_metadata: Some(UsageMetadata::default()),
            response_metadata: Some(ResponseMetadata {
                token_usage: Some(LegacyTokenUsage {
                    prompt_tokens: Some(200),
                    completion_tokens: Some(80),
                    total_tokens: Some(280),
                }),
            }),
            ..ModelResponse::default()
        };

        assert_eq!(
            extract_token_usage(&response),
            TokenUsage { input_tokens: 200, output_tokens: 80, total_tokens: 280 }
        );
    }

    #[test]
    fn test_missing_usage_is_zero() {
        assert_eq!(extract_token_usage(&ModelResponse::text("hi")), TokenUsage::default());
    }

    #[test]
    fn test_accumulation_is_additive() {
        let a = TokenUsage { input_tokens: 10, output_tokens: 5, total_tokens: 15 };
        let b = TokenUsage { input_tokens: 20, output_tokens: 7, total_tokens: 27 };
        assert_eq!(
            accumulate_token_usage(a, b),
            TokenUsage { input_tokens: 30, output_tokens: 12, total_tokens: 42 }
        );
    }
}
