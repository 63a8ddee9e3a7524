//! Incremental decoder for Anthropic server-sent-event streams.
//!
//! Fed raw bytes as they arrive off the socket; no assumption that a
//! read boundary lines up with a line or an event. Every string the
//! decoder retains across event boundaries is copied into owned
//! storage, since the line buffer is reused.

use krillclaw_core::{ApiResponse, ClientError, ContentBlock, StopReason};
use serde_json::Value;
use tracing::trace;

/// Splits an incoming byte stream into SSE lines. Partial lines stay
/// buffered until their newline arrives.
#[derive(Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete line, CR/LF stripped.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop(); // \n
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

/// Decoder state for one streamed response.
pub struct SseDecoder {
    lines: LineBuffer,

    // Current event being assembled from `event:` / `data:` lines
    event_name: String,
    data: String,

    // Block assembly
    block_index: Option<u64>,
    in_tool_use: bool,
    text_acc: String,
    input_acc: String,
    tool_id: String,
    tool_name: String,

    // Response assembly
    id: String,
    blocks: Vec<ContentBlock>,
    stop_reason: StopReason,
    input_tokens: u32,
    output_tokens: u32,
    done: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            lines: LineBuffer::default(),
            event_name: String::new(),
            data: String::new(),
            block_index: None,
            in_tool_use: false,
            text_acc: String::new(),
            input_acc: String::new(),
            tool_id: String::new(),
            tool_name: String::new(),
            id: String::new(),
            blocks: Vec::new(),
            stop_reason: StopReason::Unknown,
            input_tokens: 0,
            output_tokens: 0,
            done: false,
        }
    }

    /// Feed a slice of stream bytes, invoking `on_delta` for each text
    /// fragment as it arrives.
    pub fn feed(
        &mut self,
        bytes: &[u8],
        on_delta: &mut dyn FnMut(&str),
    ) -> Result<(), ClientError> {
        self.lines.push(bytes);
        while let Some(line) = self.lines.next_line() {
            self.process_line(&line, on_delta)?;
        }
        Ok(())
    }

    /// `message_stop` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consume the decoder into the assembled response.
    pub fn finish(mut self) -> Result<ApiResponse, ClientError> {
        // A stream that drops mid-block still yields what it carried
        self.flush_block();
        Ok(ApiResponse {
            id: self.id,
            stop_reason: self.stop_reason,
            blocks: self.blocks,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
        })
    }

    fn process_line(
        &mut self,
        line: &str,
        on_delta: &mut dyn FnMut(&str),
    ) -> Result<(), ClientError> {
        if line.is_empty() {
            // Blank line terminates the event
            if !self.data.is_empty() {
                let data = std::mem::take(&mut self.data);
                let name = std::mem::take(&mut self.event_name);
                self.dispatch(&name, &data, on_delta)?;
            }
            return Ok(());
        }
        if line.starts_with(':') {
            return Ok(()); // comment
        }
        if let Some(name) = line.strip_prefix("event:") {
            self.event_name = name.trim().to_string();
        } else if let Some(data) = line.strip_prefix("data:") {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(data.trim_start());
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        name: &str,
        data: &str,
        on_delta: &mut dyn FnMut(&str),
    ) -> Result<(), ClientError> {
        // The event field and the payload's "type" agree on this wire;
        // trust the payload when the field was absent.
        let event: Value = serde_json::from_str(data)
            .map_err(|e| ClientError::ParseError(format!("SSE data: {e}")))?;
        let kind = if name.is_empty() {
            event["type"].as_str().unwrap_or("").to_string()
        } else {
            name.to_string()
        };

        match kind.as_str() {
            "message_start" => {
                let message = &event["message"];
                // Copy out: the event buffer is reused
                if let Some(id) = message["id"].as_str() {
                    self.id = id.to_string();
                }
                if let Some(tokens) = message["usage"]["input_tokens"].as_u64() {
                    self.input_tokens = tokens as u32;
                }
            }
            "content_block_start" => {
                self.block_index = event["index"].as_u64();
                let block = &event["content_block"];
                if block["type"].as_str() == Some("tool_use") {
                    // A dangling text block ends here
                    self.flush_block();
                    self.tool_id = block["id"].as_str().unwrap_or("").to_string();
                    self.tool_name = block["name"].as_str().unwrap_or("").to_string();
                    self.input_acc.clear();
                    self.in_tool_use = true;
                }
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => {
                        if let Some(text) = delta["text"].as_str() {
                            on_delta(text);
                            self.text_acc.push_str(text);
                        }
                    }
                    Some("input_json_delta") => {
                        if let Some(partial) = delta["partial_json"].as_str() {
                            self.input_acc.push_str(partial);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                trace!(index = ?self.block_index, "content block complete");
                self.flush_block();
            }
            "message_delta" => {
                if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                    self.stop_reason = StopReason::parse(reason);
                }
                if let Some(tokens) = event["usage"]["output_tokens"].as_u64() {
                    self.output_tokens = tokens as u32;
                }
            }
            "message_stop" => {
                self.flush_block();
                self.done = true;
            }
            "ping" => {}
            "error" => {
                let message = event["error"]["message"]
                    .as_str()
                    .unwrap_or("stream error")
                    .to_string();
                return Err(ClientError::InvalidResponse(message));
            }
            other => {
                trace!(event = other, "ignoring unknown SSE event");
            }
        }
        Ok(())
    }

    /// Emit whichever block is in progress.
    fn flush_block(&mut self) {
        if self.in_tool_use {
            let input_raw = if self.input_acc.is_empty() {
                "{}".to_string()
            } else {
                std::mem::take(&mut self.input_acc)
            };
            self.blocks.push(ContentBlock::ToolUse {
                id: std::mem::take(&mut self.tool_id),
                name: std::mem::take(&mut self.tool_name),
                input_raw,
            });
            self.in_tool_use = false;
        } else if !self.text_acc.is_empty() {
            self.blocks.push(ContentBlock::Text {
                text: std::mem::take(&mut self.text_acc),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(stream: &str) -> (ApiResponse, String) {
        let mut decoder = SseDecoder::new();
        let mut deltas = String::new();
        decoder
            .feed(stream.as_bytes(), &mut |d| deltas.push_str(d))
            .unwrap();
        assert!(decoder.is_done(), "stream should reach message_stop");
        (decoder.finish().unwrap(), deltas)
    }

    const TEXT_STREAM: &str = "event: message_start\n\
        data: {\"type\":\"message_start\",\"message\":{\"id\":\"m\",\"usage\":{\"input_tokens\":5}}}\n\
        \n\
        event: content_block_start\n\
        data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\"}}\n\
        \n\
        event: content_block_delta\n\
        data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n\
        \n\
        event: content_block_stop\n\
        data: {\"type\":\"content_block_stop\",\"index\":0}\n\
        \n\
        event: message_delta\n\
        data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":1}}\n\
        \n\
        event: message_stop\n\
        data: {\"type\":\"message_stop\"}\n\
        \n";

    #[test]
    fn text_roundtrip() {
        let (resp, deltas) = decode(TEXT_STREAM);
        assert_eq!(resp.id, "m");
        assert_eq!(resp.blocks, vec![ContentBlock::text("hi")]);
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert_eq!(resp.input_tokens, 5);
        assert_eq!(resp.output_tokens, 1);
        assert_eq!(deltas, "hi");
    }

    #[test]
    fn byte_at_a_time_feeding() {
        let mut decoder = SseDecoder::new();
        let mut deltas = String::new();
        for byte in TEXT_STREAM.as_bytes() {
            decoder
                .feed(std::slice::from_ref(byte), &mut |d| deltas.push_str(d))
                .unwrap();
        }
        assert!(decoder.is_done());
        let resp = decoder.finish().unwrap();
        assert_eq!(resp.blocks, vec![ContentBlock::text("hi")]);
        assert_eq!(deltas, "hi");
    }

    #[test]
    fn tool_use_partial_json_concatenation() {
        let stream = "event: message_start\n\
            data: {\"type\":\"message_start\",\"message\":{\"id\":\"m2\",\"usage\":{\"input_tokens\":9}}}\n\
            \n\
            event: content_block_start\n\
            data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_x\",\"name\":\"bash\"}}\n\
            \n\
            event: content_block_delta\n\
            data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"command\"}}\n\
            \n\
            event: content_block_delta\n\
            data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\":\\\"ls\\\"\"}}\n\
            \n\
            event: content_block_delta\n\
            data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"}\"}}\n\
            \n\
            event: content_block_stop\n\
            data: {\"type\":\"content_block_stop\",\"index\":0}\n\
            \n\
            event: message_delta\n\
            data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":12}}\n\
            \n\
            event: message_stop\n\
            data: {\"type\":\"message_stop\"}\n\
            \n";
        let (resp, deltas) = decode(stream);
        assert!(deltas.is_empty());
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        let uses: Vec<_> = resp.tool_uses().collect();
        assert_eq!(uses, vec![("toolu_x", "bash", "{\"command\":\"ls\"}")]);
    }

    #[test]
    fn empty_tool_input_defaults_to_braces() {
        let stream = "event: content_block_start\n\
            data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"t1\",\"name\":\"get_time\"}}\n\
            \n\
            event: content_block_stop\n\
            data: {\"type\":\"content_block_stop\",\"index\":0}\n\
            \n\
            event: message_stop\n\
            data: {\"type\":\"message_stop\"}\n\
            \n";
        let (resp, _) = decode(stream);
        let uses: Vec<_> = resp.tool_uses().collect();
        assert_eq!(uses, vec![("t1", "get_time", "{}")]);
    }

    #[test]
    fn text_then_tool_flushes_text_block() {
        let stream = "event: content_block_start\n\
            data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\"}}\n\
            \n\
            event: content_block_delta\n\
            data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"let me look\"}}\n\
            \n\
            event: content_block_start\n\
            data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"t9\",\"name\":\"search\"}}\n\
            \n\
            event: content_block_delta\n\
            data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"pattern\\\":\\\"x\\\"}\"}}\n\
            \n\
            event: content_block_stop\n\
            data: {\"type\":\"content_block_stop\",\"index\":1}\n\
            \n\
            event: message_stop\n\
            data: {\"type\":\"message_stop\"}\n\
            \n";
        let (resp, deltas) = decode(stream);
        assert_eq!(deltas, "let me look");
        assert_eq!(resp.blocks.len(), 2);
        assert_eq!(resp.blocks[0], ContentBlock::text("let me look"));
        assert!(matches!(
            &resp.blocks[1],
            ContentBlock::ToolUse { name, .. } if name == "search"
        ));
    }

    #[test]
    fn ping_is_ignored_and_error_surfaces() {
        let mut decoder = SseDecoder::new();
        decoder
            .feed(b"event: ping\ndata: {\"type\":\"ping\"}\n\n", &mut |_| {})
            .unwrap();

        let err = decoder
            .feed(
                b"event: error\ndata: {\"type\":\"error\",\"error\":{\"message\":\"overloaded\"}}\n\n",
                &mut |_| {},
            )
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(m) if m.contains("overloaded")));
    }

    #[test]
    fn crlf_lines_accepted() {
        let stream = TEXT_STREAM.replace('\n', "\r\n");
        let mut decoder = SseDecoder::new();
        let mut deltas = String::new();
        decoder
            .feed(stream.as_bytes(), &mut |d| deltas.push_str(d))
            .unwrap();
        assert!(decoder.is_done());
        assert_eq!(deltas, "hi");
    }
}
