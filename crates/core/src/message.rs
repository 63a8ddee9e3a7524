//! Message and conversation domain types.
//!
//! A message is an ordered sequence of content blocks rather than a
//! flat string: tool calls live on assistant messages, their results on
//! the next user message, matched by id and in the same order.

use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (also carries tool results back to the model)
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One atom of message content.
///
/// `input_raw` on `ToolUse` is the JSON object text of the call's
/// arguments exactly as the provider emitted it. It is stored verbatim
/// and spliced back into request bodies unmodified so the provider sees
/// its own bytes on the next turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input_raw: String,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        input_raw: impl Into<String>,
    ) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input_raw: input_raw.into(),
        }
    }

    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }

    /// Character weight of this block for token estimation, including
    /// the per-block wire overhead.
    pub fn estimate_chars(&self) -> usize {
        match self {
            ContentBlock::Text { text } => text.len(),
            ContentBlock::ToolUse {
                name, input_raw, ..
            } => name.len() + input_raw.len() + TOOL_USE_OVERHEAD_CHARS,
            ContentBlock::ToolResult { content, .. } => content.len() + TOOL_RESULT_OVERHEAD_CHARS,
        }
    }

    /// Estimated token cost: ~4 characters per token, at least one.
    pub fn estimate_tokens(&self) -> usize {
        (self.estimate_chars() / 4).max(1)
    }
}

/// Per-message wire overhead (role name, delimiters) in characters.
pub const MESSAGE_OVERHEAD_CHARS: usize = 10;
/// Extra characters a tool-use block costs on the wire (id, type tags).
pub const TOOL_USE_OVERHEAD_CHARS: usize = 50;
/// Extra characters a tool-result block costs on the wire.
pub const TOOL_RESULT_OVERHEAD_CHARS: usize = 30;

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// Ordered content blocks
    pub blocks: Vec<ContentBlock>,

    /// Cached token estimate, refreshed whenever blocks change
    pub token_estimate: usize,
}

impl Message {
    pub fn new(role: Role, blocks: Vec<ContentBlock>) -> Self {
        let mut msg = Self {
            role,
            blocks,
            token_estimate: 0,
        };
        msg.refresh_estimate();
        msg
    }

    /// A plain-text user message.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::text(text)])
    }

    /// An assistant message built from parsed response blocks.
    pub fn assistant(blocks: Vec<ContentBlock>) -> Self {
        Self::new(Role::Assistant, blocks)
    }

    /// A user message carrying tool results back to the model.
    pub fn tool_results(blocks: Vec<ContentBlock>) -> Self {
        Self::new(Role::User, blocks)
    }

    /// Recompute and cache the token estimate for this message.
    pub fn refresh_estimate(&mut self) {
        let blocks: usize = self.blocks.iter().map(|b| b.estimate_tokens()).sum();
        self.token_estimate = MESSAGE_OVERHEAD_CHARS / 4 + blocks;
    }

    pub fn has_tool_use(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }

    pub fn has_tool_result(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolResult { .. }))
    }

    /// Concatenated text content of this message.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }
}

/// Estimated token count for a whole conversation.
pub fn estimate_conversation_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| m.token_estimate).sum()
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Unknown,
}

impl StopReason {
    /// Parse the provider's stop-reason string. Anything unrecognised
    /// maps to `Unknown` rather than failing the response.
    pub fn parse(s: &str) -> Self {
        match s {
            "end_turn" | "stop" | "stop_sequence" => StopReason::EndTurn,
            "tool_use" | "tool_calls" => StopReason::ToolUse,
            "max_tokens" | "length" => StopReason::MaxTokens,
            _ => StopReason::Unknown,
        }
    }
}

/// A parsed provider response, independent of wire dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Provider-assigned response id (empty when the dialect has none)
    pub id: String,

    pub stop_reason: StopReason,

    /// Content blocks in emission order
    pub blocks: Vec<ContentBlock>,

    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl ApiResponse {
    /// Iterate over the tool-use blocks of this response, in order.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.blocks.iter().filter_map(|b| match b {
            ContentBlock::ToolUse {
                id,
                name,
                input_raw,
            } => Some((id.as_str(), name.as_str(), input_raw.as_str())),
            _ => None,
        })
    }

    pub fn has_tool_use(&self) -> bool {
        self.tool_uses().next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_estimate() {
        // 8 chars → 2 tokens, + 10 chars message overhead → 2 tokens
        let msg = Message::user_text("12345678");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.token_estimate, 4);
    }

    #[test]
    fn tiny_block_costs_at_least_one_token() {
        let msg = Message::user_text("x");
        assert_eq!(msg.token_estimate, MESSAGE_OVERHEAD_CHARS / 4 + 1);
    }

    #[test]
    fn tool_use_carries_overhead() {
        let block = ContentBlock::tool_use("toolu_1", "bash", r#"{"command":"ls"}"#);
        // 4 + 16 + 50 = 70 chars → 17 tokens
        assert_eq!(block.estimate_tokens(), 17);
    }

    #[test]
    fn message_role_queries() {
        let assistant = Message::assistant(vec![
            ContentBlock::text("let me check"),
            ContentBlock::tool_use("t1", "bash", "{}"),
        ]);
        assert!(assistant.has_tool_use());
        assert!(!assistant.has_tool_result());

        let results = Message::tool_results(vec![ContentBlock::tool_result("t1", "ok", false)]);
        assert!(results.has_tool_result());
        assert_eq!(results.role, Role::User);
    }

    #[test]
    fn text_concatenates_blocks() {
        let msg = Message::assistant(vec![
            ContentBlock::text("one"),
            ContentBlock::tool_use("t1", "bash", "{}"),
            ContentBlock::text("two"),
        ]);
        assert_eq!(msg.text(), "one\ntwo");
    }

    #[test]
    fn stop_reason_parsing() {
        assert_eq!(StopReason::parse("end_turn"), StopReason::EndTurn);
        assert_eq!(StopReason::parse("tool_use"), StopReason::ToolUse);
        assert_eq!(StopReason::parse("tool_calls"), StopReason::ToolUse);
        assert_eq!(StopReason::parse("length"), StopReason::MaxTokens);
        assert_eq!(StopReason::parse("banana"), StopReason::Unknown);
    }

    #[test]
    fn response_tool_use_iteration() {
        let resp = ApiResponse {
            id: "msg_1".into(),
            stop_reason: StopReason::ToolUse,
            blocks: vec![
                ContentBlock::text("thinking"),
                ContentBlock::tool_use("t1", "bash", r#"{"command":"ls"}"#),
                ContentBlock::tool_use("t2", "read_file", r#"{"path":"a"}"#),
            ],
            input_tokens: 10,
            output_tokens: 20,
        };
        let uses: Vec<_> = resp.tool_uses().collect();
        assert_eq!(uses.len(), 2);
        assert_eq!(uses[0].1, "bash");
        assert_eq!(uses[1].0, "t2");
    }

    #[test]
    fn block_serde_roundtrip() {
        let block = ContentBlock::tool_use("t1", "bash", r#"{"command":"ls"}"#);
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("\"type\":\"tool_use\""));
        let back: ContentBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, block);
    }
}
