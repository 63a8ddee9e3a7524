//! OpenAI Chat Completions dialect.
//!
//! Works with OpenAI and any compatible endpoint (OpenRouter, vLLM,
//! Together, …). Bearer auth; tools as `function` entries; the system
//! prompt is prepended as an ordinary message; assistant tool calls ride
//! a `tool_calls` array and each tool result becomes its own message
//! with `role = "tool"` right after the owning assistant message.
//!
//! `function.arguments` is a JSON-encoded string on this wire, which is
//! exactly what `input_raw` holds, so it crosses unmodified in both
//! directions.

use crate::{ChatRequest, Dialect};
use krillclaw_core::{ApiResponse, ClientError, ContentBlock, Message, Provider, Role, StopReason};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

pub struct OpenAiDialect;

impl Dialect for OpenAiDialect {
    fn provider(&self) -> Provider {
        Provider::OpenAiStyle
    }

    fn headers(&self, api_key: &str) -> Vec<(&'static str, String)> {
        vec![("Authorization", format!("Bearer {api_key}"))]
    }

    fn build_body(&self, req: &ChatRequest<'_>) -> Result<String, ClientError> {
        build_chat_body(req, req.stream.then_some(true))
    }

    fn parse_response(&self, body: &[u8]) -> Result<ApiResponse, ClientError> {
        let resp: WireResponse = serde_json::from_slice(body)
            .map_err(|e| ClientError::InvalidResponse(format!("chat completion: {e}")))?;
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::InvalidResponse("response has no choices".into()))?;

        let mut blocks = Vec::new();
        if let Some(text) = choice.message.content
            && !text.is_empty()
        {
            blocks.push(ContentBlock::Text { text });
        }
        for tc in choice.message.tool_calls.unwrap_or_default() {
            blocks.push(ContentBlock::ToolUse {
                id: tc.id,
                name: tc.function.name,
                input_raw: if tc.function.arguments.is_empty() {
                    "{}".to_string()
                } else {
                    tc.function.arguments
                },
            });
        }

        Ok(ApiResponse {
            id: resp.id,
            stop_reason: choice
                .finish_reason
                .as_deref()
                .map(StopReason::parse)
                .unwrap_or(StopReason::Unknown),
            blocks,
            input_tokens: resp.usage.prompt_tokens,
            output_tokens: resp.usage.completion_tokens,
        })
    }
}

/// Shared body builder; the Ollama dialect reuses this message shape
/// at its own path with streaming pinned off.
///
/// `stream`: `None` omits the field, `Some(v)` emits it explicitly
/// (Ollama defaults to streaming, so its `false` must be on the wire).
pub(crate) fn build_chat_body(
    req: &ChatRequest<'_>,
    stream: Option<bool>,
) -> Result<String, ClientError> {
    let mut messages = Vec::with_capacity(req.messages.len() + 1);
    if let Some(system) = req.system {
        messages.push(WireMessage {
            role: "system",
            content: Some(system.into()),
            tool_calls: None,
            tool_call_id: None,
        });
    }
    for msg in req.messages {
        render_message(msg, &mut messages);
    }

    let tools = req
        .tools
        .iter()
        .map(|t| {
            Ok(WireTool {
                kind: "function",
                function: WireToolFunction {
                    name: t.name,
                    description: t.description,
                    parameters: serde_json::from_str::<&RawValue>(t.input_schema)
                        .map_err(|e| ClientError::ParseError(format!("invalid schema: {e}")))?,
                },
            })
        })
        .collect::<Result<Vec<_>, ClientError>>()?;

    let body = WireRequest {
        model: req.model,
        max_tokens: Some(req.max_tokens),
        messages,
        tools,
        stream,
        // Without this the final usage chunk is never sent
        stream_options: (stream == Some(true)).then_some(StreamOptions {
            include_usage: true,
        }),
    };
    serde_json::to_string(&body).map_err(|e| ClientError::ParseError(e.to_string()))
}

fn render_message<'a>(msg: &'a Message, out: &mut Vec<WireMessage<'a>>) {
    match msg.role {
        Role::System => out.push(WireMessage {
            role: "system",
            content: Some(msg.text().into()),
            tool_calls: None,
            tool_call_id: None,
        }),
        Role::Assistant => {
            let tool_calls: Vec<WireToolCall<'a>> = msg
                .blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse {
                        id,
                        name,
                        input_raw,
                    } => Some(WireToolCall {
                        id,
                        kind: "function",
                        function: WireCallFunction {
                            name,
                            arguments: input_raw,
                        },
                    }),
                    _ => None,
                })
                .collect();
            let text = msg.text();
            out.push(WireMessage {
                role: "assistant",
                content: (!text.is_empty()).then(|| text.into()),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
            });
        }
        Role::User => {
            // Tool results each get their own `tool` message
            for block in &msg.blocks {
                if let ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } = block
                {
                    out.push(WireMessage {
                        role: "tool",
                        content: Some(content.as_str().into()),
                        tool_calls: None,
                        tool_call_id: Some(tool_use_id),
                    });
                }
            }
            let text = msg.text();
            if !text.is_empty() {
                out.push(WireMessage {
                    role: "user",
                    content: Some(text.into()),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
        }
    }
}

/// Accumulates OpenAI streaming deltas into a complete response.
///
/// Chunks arrive as `data:` JSON documents; tool-call argument deltas
/// are merged by index, text deltas are forwarded to the caller.
#[derive(Default)]
pub struct StreamCollector {
    id: String,
    text: String,
    calls: Vec<PartialCall>,
    finish_reason: Option<String>,
    prompt_tokens: u32,
    completion_tokens: u32,
    done: bool,
}

#[derive(Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

impl StreamCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Process one `data:` payload.
    pub fn process_data(
        &mut self,
        data: &str,
        on_delta: &mut dyn FnMut(&str),
    ) -> Result<(), ClientError> {
        if data == "[DONE]" {
            self.done = true;
            return Ok(());
        }
        let chunk: WireChunk = serde_json::from_str(data)
            .map_err(|e| ClientError::ParseError(format!("stream chunk: {e}")))?;
        if self.id.is_empty() {
            self.id = chunk.id;
        }
        if let Some(usage) = chunk.usage {
            self.prompt_tokens = usage.prompt_tokens;
            self.completion_tokens = usage.completion_tokens;
        }
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(());
        };
        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
        }
        if let Some(text) = choice.delta.content
            && !text.is_empty()
        {
            on_delta(&text);
            self.text.push_str(&text);
        }
        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let index = tc.index.unwrap_or(self.calls.len());
            if index >= self.calls.len() {
                self.calls.resize_with(index + 1, PartialCall::default);
            }
            let call = &mut self.calls[index];
            if let Some(id) = tc.id {
                call.id = id;
            }
            if let Some(function) = tc.function {
                if let Some(name) = function.name {
                    call.name.push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    call.arguments.push_str(&arguments);
                }
            }
        }
        Ok(())
    }

    pub fn finish(self) -> ApiResponse {
        let mut blocks = Vec::new();
        if !self.text.is_empty() {
            blocks.push(ContentBlock::Text { text: self.text });
        }
        for call in self.calls {
            blocks.push(ContentBlock::ToolUse {
                id: call.id,
                name: call.name,
                input_raw: if call.arguments.is_empty() {
                    "{}".to_string()
                } else {
                    call.arguments
                },
            });
        }
        ApiResponse {
            id: self.id,
            stop_reason: self
                .finish_reason
                .as_deref()
                .map(StopReason::parse)
                .unwrap_or(StopReason::Unknown),
            blocks,
            input_tokens: self.prompt_tokens,
            output_tokens: self.completion_tokens,
        }
    }
}

// --- Wire types ---

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<std::borrow::Cow<'a, str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireCallFunction<'a>,
}

#[derive(Serialize)]
struct WireCallFunction<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolFunction<'a>,
}

#[derive(Serialize)]
struct WireToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a RawValue,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    id: String,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireRespMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireRespMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireRespToolCall>>,
}

#[derive(Deserialize)]
struct WireRespToolCall {
    #[serde(default)]
    id: String,
    function: WireRespFunction,
}

#[derive(Deserialize)]
struct WireRespFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct WireChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    choices: Vec<WireChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChunkChoice {
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireDeltaToolCall>>,
}

#[derive(Deserialize)]
struct WireDeltaToolCall {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireDeltaFunction>,
}

#[derive(Deserialize)]
struct WireDeltaFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}
