//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::client::{LlmClient, LlmRequest};
use crate::error::LlmError;

/// HTTP client for `POST {base_url}/chat/completions`.
pub struct ChatClient {
    client: reqwest::Client,
    provider_id: String,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

impl ChatClient {
    /// Create a client. `base_url` should be like `https://api.openai.com/v1`
    /// (no trailing slash needed). Transport timeouts are enforced here.
    pub fn new(
        provider_id: impl Into<String>,
        base_url: &str,
        api_key: Option<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            provider_id: provider_id.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: default_model.into(),
        })
    }

    fn body(&self, request: &LlmRequest) -> Value {
        build_body(request, &self.default_model)
    }
}

/// Request body for a chat completion.
fn build_body(request: &LlmRequest, default_model: &str) -> Value {
    let model = request.model.as_deref().unwrap_or(default_model);
    let mut body = json!({
        "model": model,
        "messages": [
            {"role": "system", "content": request.system},
            {"role": "user", "content": request.user},
        ],
    });
    if let Some(t) = request.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(n) = request.max_tokens {
        body["max_tokens"] = json!(n);
    }
    if let Some(seed) = request.seed {
        body["seed"] = json!(seed);
    }
    if let Some(schema) = &request.response_schema {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {"name": schema.name, "schema": schema.schema},
        });
    }
    body
}

#[async_trait]
impl LlmClient for ChatClient {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn invoke(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, structured = request.response_schema.is_some(), "chat completion");

        let mut builder = self.client.post(&url).json(&self.body(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::provider("response contained no choices"))?;
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(LlmError::provider("completion stopped by content_filter"));
        }
        Ok(choice.message.content.unwrap_or_default())
    }
}
