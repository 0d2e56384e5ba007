//! LLM invocation layer: the client contract, error classification, and an
//! OpenAI-compatible HTTP transport.

mod client;
mod error;

pub use client::{
    LlmClient, LlmRequest, ResponseSchema, supports_native_structured, supports_seed,
};
pub use error::{ErrorKind, LlmError};

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::ChatClient;
