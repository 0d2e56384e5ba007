//! The LLM invocation contract consumed by the classification graph.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LlmError;

/// Providers known to honor a JSON schema in the request.
const NATIVE_STRUCTURED: &[&str] = &["openai", "azure_openai", "ollama", "vllm"];

/// Providers that honor a deterministic `seed` parameter.
const SEEDABLE: &[&str] = &["openai", "azure_openai", "ollama", "vllm", "together", "deepseek"];

pub fn supports_native_structured(provider_id: &str) -> bool {
    NATIVE_STRUCTURED.contains(&provider_id)
}

pub fn supports_seed(provider_id: &str) -> bool {
    SEEDABLE.contains(&provider_id)
}

/// JSON schema attached to a request for native structured decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

/// One chat-style call: a system prompt, a user prompt, and call parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmRequest {
    pub system: String,
    pub user: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub seed: Option<u64>,
    pub response_schema: Option<ResponseSchema>,
}

impl LlmRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Attach `seed` only if `provider_id` honors it.
    pub fn with_seed_for(mut self, provider_id: &str, seed: Option<u64>) -> Self {
        self.seed = seed.filter(|_| supports_seed(provider_id));
        self
    }

    pub fn with_schema(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.response_schema = Some(ResponseSchema {
            name: name.into(),
            schema,
        });
        self
    }
}

/// Anything that can turn a prompt into text.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Identifier used for capability decisions (`openai`, `anthropic`, ...).
    fn provider_id(&self) -> &str;

    async fn invoke(&self, request: &LlmRequest) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_lists() {
        assert!(supports_native_structured("openai"));
        assert!(!supports_native_structured("anthropic"));
        assert!(supports_seed("together"));
        assert!(!supports_seed("anthropic"));
    }

    #[test]
    fn seed_dropped_for_unsupported_provider() {
        let req = LlmRequest::new("s", "u").with_seed_for("anthropic", Some(7));
        assert_eq!(req.seed, None);
        let req = LlmRequest::new("s", "u").with_seed_for("openai", Some(7));
        assert_eq!(req.seed, Some(7));
    }
}
