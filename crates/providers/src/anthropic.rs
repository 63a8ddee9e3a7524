//! Anthropic Messages API dialect.
//!
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//!
//! Tool inputs and schemas travel as [`RawValue`] so the bytes the
//! provider emitted (or that were embedded at build time) reach the wire
//! unmodified.

use crate::{ChatRequest, Dialect};
use krillclaw_core::{ApiResponse, ClientError, ContentBlock, Message, Provider, Role, StopReason};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicDialect;

impl Dialect for AnthropicDialect {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    fn headers(&self, api_key: &str) -> Vec<(&'static str, String)> {
        vec![
            ("x-api-key", api_key.to_string()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ]
    }

    fn build_body(&self, req: &ChatRequest<'_>) -> Result<String, ClientError> {
        let messages = to_wire_messages(req.messages)?;
        let tools = req
            .tools
            .iter()
            .map(|t| {
                Ok(WireTool {
                    name: t.name,
                    description: t.description,
                    input_schema: raw(t.input_schema)?,
                })
            })
            .collect::<Result<Vec<_>, ClientError>>()?;

        let body = WireRequest {
            model: req.model,
            max_tokens: req.max_tokens,
            system: req.system,
            messages,
            tools,
            stream: req.stream,
        };
        serde_json::to_string(&body).map_err(|e| ClientError::ParseError(e.to_string()))
    }

    fn parse_response(&self, body: &[u8]) -> Result<ApiResponse, ClientError> {
        let resp: WireResponse = serde_json::from_slice(body)
            .map_err(|e| ClientError::InvalidResponse(format!("anthropic response: {e}")))?;

        let mut blocks = Vec::with_capacity(resp.content.len());
        for block in resp.content {
            match block {
                RespBlock::Text { text } => blocks.push(ContentBlock::Text { text }),
                RespBlock::ToolUse { id, name, input } => {
                    blocks.push(ContentBlock::ToolUse {
                        id,
                        name,
                        input_raw: input.get().to_string(),
                    });
                }
                // Extended-thinking blocks are not part of the content model
                RespBlock::Thinking { .. } => {}
            }
        }

        Ok(ApiResponse {
            id: resp.id,
            stop_reason: resp
                .stop_reason
                .as_deref()
                .map(StopReason::parse)
                .unwrap_or(StopReason::Unknown),
            blocks,
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
        })
    }
}

fn raw(s: &str) -> Result<&RawValue, ClientError> {
    serde_json::from_str::<&RawValue>(s)
        .map_err(|e| ClientError::ParseError(format!("invalid embedded JSON: {e}")))
}

fn to_wire_messages(messages: &[Message]) -> Result<Vec<WireMessage<'_>>, ClientError> {
    let mut out = Vec::with_capacity(messages.len());
    for msg in messages {
        // System content travels top-level, never in the message list
        if msg.role == Role::System {
            continue;
        }
        let mut content = Vec::with_capacity(msg.blocks.len());
        for block in &msg.blocks {
            content.push(match block {
                ContentBlock::Text { text } => WireBlock::Text { text },
                ContentBlock::ToolUse {
                    id,
                    name,
                    input_raw,
                } => WireBlock::ToolUse {
                    id,
                    name,
                    input: raw(input_raw)?,
                },
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => WireBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error: *is_error,
                },
            });
        }
        out.push(WireMessage {
            role: msg.role.as_str(),
            content,
        });
    }
    Ok(out)
}

// --- Wire types ---

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: Vec<WireBlock<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock<'a> {
    Text {
        text: &'a str,
    },
    ToolUse {
        id: &'a str,
        name: &'a str,
        input: &'a RawValue,
    },
    ToolResult {
        tool_use_id: &'a str,
        content: &'a str,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a RawValue,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    id: String,
    content: Vec<RespBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: WireUsage,
}

enum RespBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Box<RawValue>,
    },
    Thinking {
        thinking: String,
    },
}

// `#[serde(tag = "type")]` buffers each block into a generic `Content`
// representation to peek the tag, and that buffering can't carry a
// `RawValue` through losslessly (it is only supported when deserializing
// directly from the input). Dispatch on the tag manually instead so
// `input` keeps the provider's exact bytes.
impl<'de> Deserialize<'de> for RespBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(rename = "type")]
            ty: String,
            #[serde(default)]
            text: Option<String>,
            #[serde(default)]
            id: Option<String>,
            #[serde(default)]
            name: Option<String>,
            #[serde(default)]
            input: Option<Box<RawValue>>,
            #[serde(default)]
            thinking: Option<String>,
        }

        let raw = Raw::deserialize(deserializer)?;
        match raw.ty.as_str() {
            "text" => Ok(RespBlock::Text {
                text: raw.text.unwrap_or_default(),
            }),
            "tool_use" => Ok(RespBlock::ToolUse {
                id: raw.id.unwrap_or_default(),
                name: raw.name.unwrap_or_default(),
                input: raw
                    .input
                    .unwrap_or_else(|| RawValue::from_string("{}".to_string()).unwrap()),
            }),
            "thinking" => Ok(RespBlock::Thinking {
                thinking: raw.thinking.unwrap_or_default(),
            }),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["text", "tool_use", "thinking"],
            )),
        }
    }
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}
