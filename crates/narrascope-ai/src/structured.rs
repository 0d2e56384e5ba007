//! Typed results from free-text LLM replies.
//!
//! Providers with native JSON-schema decoding are asked for it first. Anyone
//! else (and any native attempt that fails) gets the schema spelled out in the
//! system prompt, and the reply is mined for JSON by a chain of parsers.
//! When nothing usable comes back the caller receives `T::default()`: an empty
//! structured result is a normal outcome, not an error.

use narrascope_core::Label;
use narrascope_llm::{LlmClient, LlmError, LlmRequest, supports_native_structured};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::retry::RetryExecutor;

/// A type the extractor can decode.
pub trait StructuredOutput: DeserializeOwned + Default + Send {
    /// Schema name sent to native structured decoding.
    const NAME: &'static str;

    /// JSON schema describing the expected object.
    fn schema() -> Value;

    /// Fields that must be present for a parse to count.
    fn required_fields() -> &'static [&'static str];
}

fn label_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "evidence_quote": {"type": "string"},
            "reasoning": {"type": "string"}
        },
        "required": ["name", "evidence_quote", "reasoning"]
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeResponse {
    pub narratives: Vec<Label>,
}

impl StructuredOutput for NarrativeResponse {
    const NAME: &'static str = "narrative_classification";

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {"narratives": {"type": "array", "items": label_schema()}},
            "required": ["narratives"]
        })
    }

    fn required_fields() -> &'static [&'static str] {
        &["narratives"]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubnarrativeResponse {
    pub subnarratives: Vec<Label>,
}

impl StructuredOutput for SubnarrativeResponse {
    const NAME: &'static str = "subnarrative_classification";

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {"subnarratives": {"type": "array", "items": label_schema()}},
            "required": ["subnarratives"]
        })
    }

    fn required_fields() -> &'static [&'static str] {
        &["subnarratives"]
    }
}

/// A critic's verdict on the actor's labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub is_valid: bool,
    #[serde(default)]
    pub feedback: String,
}

impl StructuredOutput for ValidationResponse {
    const NAME: &'static str = "classification_review";

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "is_valid": {"type": "boolean"},
                "feedback": {"type": "string"}
            },
            "required": ["is_valid", "feedback"]
        })
    }

    fn required_fields() -> &'static [&'static str] {
        &["is_valid"]
    }
}

/// Structured-output front end over an [`LlmClient`] and [`RetryExecutor`].
pub struct Extractor<'a> {
    client: &'a dyn LlmClient,
    retry: &'a RetryExecutor,
}

impl<'a> Extractor<'a> {
    pub fn new(client: &'a dyn LlmClient, retry: &'a RetryExecutor) -> Self {
        Self { client, retry }
    }

    /// Invoke the model and decode its reply as `T`.
    ///
    /// The native path gets a single attempt. Only an exhausted (or
    /// non-retryable) transport error on the generic path is returned;
    /// malformed replies degrade to `T::default()`.
    pub async fn extract<T: StructuredOutput>(
        &self,
        request: LlmRequest,
        label: &str,
    ) -> Result<T, LlmError> {
        let provider = self.client.provider_id();
        if supports_native_structured(provider) {
            // One native attempt; retries belong to the generic path.
            let native = request.clone().with_schema(T::NAME, T::schema());
            match self.client.invoke(&native).await {
                Ok(text) => match serde_json::from_str::<T>(text.trim()) {
                    Ok(value) => return Ok(value),
                    Err(e) => debug!(operation = label, error = %e, "native decode failed"),
                },
                Err(e) => debug!(operation = label, error = %e, "native call failed"),
            }
        }

        let mut generic = request;
        generic.response_schema = None;
        generic.system = with_schema_instructions::<T>(&generic.system);
        let text = self.call(&generic, label).await?;
        Ok(decode_or_default::<T>(&text, label))
    }

    async fn call(&self, request: &LlmRequest, label: &str) -> Result<String, LlmError> {
        self.retry
            .invoke(label, || self.client.invoke(request))
            .await
    }
}

/// Append the schema description to a system prompt.
pub fn with_schema_instructions<T: StructuredOutput>(system: &str) -> String {
    let schema = serde_json::to_string_pretty(&T::schema()).unwrap_or_default();
    format!(
        "{system}\n\nRespond ONLY with a JSON object matching this schema. \
         No explanation outside the JSON.\n{schema}"
    )
}

/// Decode free text as `T`, falling back to `T::default()`.
pub fn decode_or_default<T: StructuredOutput>(text: &str, label: &str) -> T {
    let Some(value) = recover_json(text) else {
        warn!(operation = label, "no JSON found in reply, using empty result");
        return T::default();
    };
    let Some(object) = shape_object::<T>(value) else {
        warn!(operation = label, "reply JSON is not an object, using empty result");
        return T::default();
    };
    let object = normalize_keys::<T>(object);

    if let Some(missing) = T::required_fields().iter().find(|f| !object.contains_key(**f)) {
        warn!(operation = label, field = missing, "required field missing, using empty result");
        return T::default();
    }
    serde_json::from_value(Value::Object(object)).unwrap_or_else(|e| {
        warn!(operation = label, error = %e, "reply did not match schema, using empty result");
        T::default()
    })
}

type Parser = fn(&str) -> Option<Value>;

/// Tried in order; the first to yield JSON wins.
const PARSERS: [Parser; 4] = [parse_whole, parse_fenced, parse_braces, parse_brackets];

/// Find a JSON value in an LLM reply.
pub fn recover_json(text: &str) -> Option<Value> {
    PARSERS.iter().find_map(|parse| parse(text))
}

fn parse_whole(text: &str) -> Option<Value> {
    serde_json::from_str(text.trim()).ok()
}

/// Contents of the first ``` fenced block, with or without a language tag.
fn parse_fenced(text: &str) -> Option<Value> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```")?;
    serde_json::from_str(body[..end].trim()).ok()
}

fn parse_braces(text: &str) -> Option<Value> {
    delimited(text, '{', '}')
}

fn parse_brackets(text: &str) -> Option<Value> {
    delimited(text, '[', ']')
}

fn delimited(text: &str, open: char, close: char) -> Option<Value> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Coerce a recovered value into an object. A bare array is accepted when `T`
/// has exactly one required field and the schema declares it an array.
fn shape_object<T: StructuredOutput>(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        Value::Array(items) => {
            let [field] = T::required_fields() else {
                return None;
            };
            let schema = T::schema();
            let is_array = schema["properties"][*field]["type"] == "array";
            is_array.then(|| {
                let mut map = Map::new();
                map.insert(field.to_string(), Value::Array(items));
                map
            })
        }
        _ => None,
    }
}

/// Rename a near-miss key onto a missing required field, e.g. `narratives`
/// onto `subnarratives`. One rename per missing field.
fn normalize_keys<T: StructuredOutput>(mut object: Map<String, Value>) -> Map<String, Value> {
    let schema = T::schema();
    let known: Vec<&str> = schema["properties"]
        .as_object()
        .map(|props| props.keys().map(String::as_str).collect())
        .unwrap_or_default();

    for missing in T::required_fields() {
        if object.contains_key(*missing) {
            continue;
        }
        let extra = object
            .keys()
            .find(|k| {
                !known.contains(&k.as_str())
                    && (missing.contains(k.as_str()) || k.contains(*missing))
            })
            .cloned();
        if let Some(extra) = extra
            && let Some(value) = object.remove(&extra)
        {
            debug!(from = %extra, to = missing, "renamed reply key");
            object.insert(missing.to_string(), value);
        }
    }
    object
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        provider: &'static str,
        replies: Mutex<Vec<Result<String, LlmError>>>,
        seen: Mutex<Vec<LlmRequest>>,
    }

    impl Canned {
        fn new(provider: &'static str, replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                provider,
                replies: Mutex::new(replies.into_iter().rev().collect()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for Canned {
        fn provider_id(&self) -> &str {
            self.provider
        }

        async fn invoke(&self, request: &LlmRequest) -> Result<String, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(LlmError::provider("no reply scripted")))
        }
    }

    #[test]
    fn parser_chain_order() {
        assert_eq!(recover_json(r#"{"a": 1}"#), Some(json!({"a": 1})));
        assert_eq!(
            recover_json("Sure!\n```json\n{\"a\": 2}\n```\nDone."),
            Some(json!({"a": 2}))
        );
        assert_eq!(
            recover_json("The answer is {\"a\": 3} as requested."),
            Some(json!({"a": 3}))
        );
        assert_eq!(recover_json("Labels: [1, 2]"), Some(json!([1, 2])));
        assert_eq!(recover_json("no json here"), None);
    }

    #[test]
    fn fenced_block_with_missing_field_is_renamed() {
        let reply = "Here you go:\n```json\n{\"narratives\": [{\"name\": \"S1\", \"evidence_quote\": \"q\", \"reasoning\": \"r\"}]}\n```";
        let parsed: SubnarrativeResponse = decode_or_default(reply, "test");
        assert_eq!(parsed.subnarratives.len(), 1);
        assert_eq!(parsed.subnarratives[0].name, "S1");
        assert_eq!(parsed.subnarratives[0].evidence_quote, "q");
    }

    #[test]
    fn subnarrative_items_naming_their_parent_are_kept() {
        let parsed: SubnarrativeResponse = decode_or_default(
            r#"{"subnarratives":[{"narrative":"URW: A","subnarrative":"URW: A: one","evidence_quote":"q"}]}"#,
            "test",
        );
        assert_eq!(parsed.subnarratives.len(), 1);
        assert_eq!(parsed.subnarratives[0].name, "URW: A: one");
        assert_eq!(parsed.subnarratives[0].evidence_quote, "q");
    }

    #[test]
    fn known_field_is_not_renamed() {
        let object = json!({"feedback": "looks fine"}).as_object().cloned().unwrap();
        let normalized = normalize_keys::<ValidationResponse>(object);
        assert!(!normalized.contains_key("is_valid"));
        let parsed: ValidationResponse = decode_or_default(r#"{"feedback": "x"}"#, "test");
        assert_eq!(parsed, ValidationResponse::default());
    }

    #[test]
    fn bare_array_wrapped_into_single_field() {
        let parsed: NarrativeResponse =
            decode_or_default(r#"Result: [{"name": "A"}, {"name": "B"}]"#, "test");
        let names: Vec<&str> = parsed.narratives.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn garbage_yields_zero_value() {
        let parsed: NarrativeResponse = decode_or_default("I cannot help with that.", "test");
        assert_eq!(parsed, NarrativeResponse::default());
        let parsed: NarrativeResponse = decode_or_default(r#"{"narratives": "A"}"#, "test");
        assert!(parsed.narratives.is_empty());
    }

    #[tokio::test]
    async fn generic_path_appends_schema() {
        let client = Canned::new("anthropic", vec![Ok(r#"{"narratives": []}"#.into())]);
        let retry = RetryExecutor::default();
        let parsed: NarrativeResponse = Extractor::new(&client, &retry)
            .extract(LlmRequest::new("Classify.", "text"), "test")
            .await
            .unwrap();
        assert!(parsed.narratives.is_empty());

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].response_schema.is_none());
        assert!(seen[0].system.starts_with("Classify."));
        assert!(seen[0].system.contains("\"narratives\""));
    }

    #[tokio::test]
    async fn native_failure_falls_through_to_generic() {
        let client = Canned::new(
            "openai",
            vec![
                Err(LlmError::Status {
                    status: 400,
                    body: "response_format not supported".into(),
                }),
                Ok("```\n{\"narratives\": [{\"name\": \"A\"}]}\n```".into()),
            ],
        );
        let retry = RetryExecutor::default();
        let parsed: NarrativeResponse = Extractor::new(&client, &retry)
            .extract(LlmRequest::new("Classify.", "text"), "test")
            .await
            .unwrap();
        assert_eq!(parsed.narratives[0].name, "A");

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].response_schema.is_some());
        assert!(seen[1].response_schema.is_none());
    }

    #[tokio::test]
    async fn transient_native_error_is_not_retried_natively() {
        let client = Canned::new(
            "openai",
            vec![
                Err(LlmError::Status {
                    status: 503,
                    body: "overloaded".into(),
                }),
                Ok(r#"{"narratives": [{"name": "A"}]}"#.into()),
            ],
        );
        let retry = RetryExecutor::default();
        let parsed: NarrativeResponse = Extractor::new(&client, &retry)
            .extract(LlmRequest::new("Classify.", "text"), "test")
            .await
            .unwrap();
        assert_eq!(parsed.narratives[0].name, "A");

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].response_schema.is_none());
    }

    #[tokio::test]
    async fn native_success_skips_generic() {
        let client = Canned::new("openai", vec![Ok(r#"{"is_valid": true, "feedback": "ok"}"#.into())]);
        let retry = RetryExecutor::default();
        let parsed: ValidationResponse = Extractor::new(&client, &retry)
            .extract(LlmRequest::new("Review.", "labels"), "test")
            .await
            .unwrap();
        assert!(parsed.is_valid);
        assert_eq!(client.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fatal_transport_error_propagates() {
        let client = Canned::new(
            "anthropic",
            vec![Err(LlmError::provider("blocked by content_filter"))],
        );
        let retry = RetryExecutor::default();
        let err = Extractor::new(&client, &retry)
            .extract::<NarrativeResponse>(LlmRequest::new("s", "u"), "test")
            .await
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "content_filter");
    }
}
