//! LLM client for the KrillClaw runtime.
//!
//! One client, three wire dialects. Each dialect knows how to assemble
//! a request body, which headers to send, and how to parse the response
//! back into the common content-block model.

pub mod anthropic;
pub mod client;
pub mod ollama;
pub mod openai_compat;
pub mod sse;

use krillclaw_core::{ApiResponse, ClientError, Message, Provider, ToolDef};

pub use client::{Carrier, LlmClient, LlmClientConfig};
pub use sse::SseDecoder;

/// Everything a dialect needs to assemble one request.
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub system: Option<&'a str>,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDef],
    pub stream: bool,
}

/// A provider wire dialect: request assembly and response parsing.
///
/// Dialects are pure (no I/O), which keeps them testable byte-for-byte
/// and lets the same body builder feed both the HTTP path and the
/// bridge envelope path.
pub trait Dialect: Send + Sync {
    fn provider(&self) -> Provider;

    /// Request headers, auth included. Content-Type is implied.
    fn headers(&self, api_key: &str) -> Vec<(&'static str, String)>;

    fn build_body(&self, req: &ChatRequest<'_>) -> Result<String, ClientError>;

    fn parse_response(&self, body: &[u8]) -> Result<ApiResponse, ClientError>;
}

/// The dialect implementation for a provider.
pub fn dialect_for(provider: Provider) -> &'static dyn Dialect {
    match provider {
        Provider::Claude => &anthropic::AnthropicDialect,
        Provider::OpenAiStyle => &openai_compat::OpenAiDialect,
        Provider::Ollama => &ollama::OllamaDialect,
    }
}
