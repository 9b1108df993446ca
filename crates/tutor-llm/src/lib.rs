//! Adapter for the external text-completion endpoint.
//!
//! The relay only ever sends one assembled prompt and needs back the generated
//! text plus the token count the provider charged for it.

pub mod gemini;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::{GeminiClient, GeminiConfig};

/// Reply text used when the provider answers successfully but without any text.
pub const FALLBACK_REPLY: &str = "I'm sorry, I couldn't generate a response. Please try asking again.";

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Tokens reported by the provider; 0 when the provider omits usage.
    pub total_tokens: u32,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode completion response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Single-turn completion of `prompt`.
    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError>;
}
