//! Ollama native chat dialect.
//!
//! `/api/chat` with no auth header. Requests use the OpenAI message
//! shape, but `"stream": false` is always sent; Ollama streams chunked
//! JSON rather than SSE, so streaming is pinned off by contract.

use crate::openai_compat::build_chat_body;
use crate::{ChatRequest, Dialect};
use krillclaw_core::{ApiResponse, ClientError, ContentBlock, Provider, StopReason};
use serde::Deserialize;

pub struct OllamaDialect;

impl Dialect for OllamaDialect {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    fn headers(&self, _api_key: &str) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    fn build_body(&self, req: &ChatRequest<'_>) -> Result<String, ClientError> {
        // Always non-streaming, whatever the caller asked for.
        build_chat_body(req, Some(false))
    }

    fn parse_response(&self, body: &[u8]) -> Result<ApiResponse, ClientError> {
        let resp: WireResponse = serde_json::from_slice(body)
            .map_err(|e| ClientError::InvalidResponse(format!("ollama response: {e}")))?;

        let mut blocks = Vec::new();
        if !resp.message.content.is_empty() {
            blocks.push(ContentBlock::Text {
                text: resp.message.content,
            });
        }
        for (i, tc) in resp.message.tool_calls.unwrap_or_default().into_iter().enumerate() {
            blocks.push(ContentBlock::ToolUse {
                // Ollama assigns no call ids; synthesise stable ones
                id: format!("call_{i}"),
                name: tc.function.name,
                input_raw: tc.function.arguments.to_string(),
            });
        }

        let has_tools = blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }));
        let stop_reason = if has_tools {
            StopReason::ToolUse
        } else {
            resp.done_reason
                .as_deref()
                .map(StopReason::parse)
                .unwrap_or(StopReason::EndTurn)
        };

        Ok(ApiResponse {
            id: String::new(),
            stop_reason,
            blocks,
            input_tokens: resp.prompt_eval_count,
            output_tokens: resp.eval_count,
        })
    }
}

// --- Wire types ---

#[derive(Deserialize)]
struct WireResponse {
    message: WireMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    /// Ollama emits arguments as an object, not a string
    arguments: serde_json::Value,
}
