//! Anthropic Messages client backing the item interpreter and the product
//! judge.

mod anthropic;
pub mod utils;

use thiserror::Error;

pub use anthropic::{AnthropicClient, ClaudeConfig};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no API key configured")]
    MissingKey,
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("model returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response invalid: {0}")]
    Response(String),
}
