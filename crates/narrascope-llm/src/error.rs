use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    Provider(String),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    /// Classify this error for retry decisions and audit records.
    pub fn kind(&self) -> ErrorKind {
        match self {
            #[cfg(feature = "http")]
            Self::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            #[cfg(feature = "http")]
            Self::Http(e) if e.is_connect() => ErrorKind::Connection,
            #[cfg(feature = "http")]
            Self::Http(e) if e.is_decode() => ErrorKind::ParseError,
            Self::Status { status: 429, .. } => ErrorKind::RateLimit,
            Self::Status { status, body } if (500..600).contains(status) => {
                match ErrorKind::classify(body) {
                    ErrorKind::ContentFilter => ErrorKind::ContentFilter,
                    _ => ErrorKind::ServerError,
                }
            }
            Self::Json(_) => ErrorKind::ParseError,
            other => ErrorKind::classify(&other.to_string()),
        }
    }
}

/// Failure classes of an LLM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimit,
    Timeout,
    Connection,
    ServerError,
    ContentFilter,
    ParseError,
    Unknown,
}

const CONTENT_FILTER: &[&str] = &[
    "content_filter",
    "content filter",
    "content management policy",
    "responsibleaipolicyviolation",
    "safety system",
];
const RATE_LIMIT: &[&str] = &[
    "rate_limit",
    "rate limit",
    "ratelimit",
    "too many requests",
    "429",
    "quota",
];
const TIMEOUT: &[&str] = &["timeout", "timed out", "deadline exceeded"];
const SERVER_ERROR: &[&str] = &[
    "500",
    "502",
    "503",
    "504",
    "internal server error",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
    "overloaded",
];
const CONNECTION: &[&str] = &[
    "connection",
    "connect error",
    "broken pipe",
    "dns error",
    "network",
];
const PARSE_ERROR: &[&str] = &["parse", "json", "decode", "deserializ"];

impl ErrorKind {
    /// Classify by substring on the lower-cased error text. Content filtering
    /// wins over every other class.
    pub fn classify(message: &str) -> Self {
        let text = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));
        if has(CONTENT_FILTER) {
            Self::ContentFilter
        } else if has(RATE_LIMIT) {
            Self::RateLimit
        } else if has(TIMEOUT) {
            Self::Timeout
        } else if has(SERVER_ERROR) {
            Self::ServerError
        } else if has(CONNECTION) {
            Self::Connection
        } else if has(PARSE_ERROR) {
            Self::ParseError
        } else {
            Self::Unknown
        }
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Timeout | Self::Connection | Self::ServerError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::ServerError => "server_error",
            Self::ContentFilter => "content_filter",
            Self::ParseError => "parse_error",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
