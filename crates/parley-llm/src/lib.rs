pub mod client;
pub mod types;

pub use client::{ChatCompletion, LlmClient, LlmConfig};
pub use types::{ChatMessage, ContentPart, ImageUrl, MessageContent};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("model API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("model API returned no choices")]
    EmptyResponse,

    #[error("failed to parse model API response: {0}")]
    Parse(#[from] serde_json::Error),
}
