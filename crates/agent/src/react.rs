//! The ReAct loop and stuck-loop detection.

use crate::context::ContextWindow;
use async_trait::async_trait;
use krillclaw_core::{ApiResponse, ClientError, ContentBlock, Error, Message, StopReason};
use krillclaw_providers::LlmClient;
use krillclaw_tools::Dispatcher;
use tracing::{debug, info, warn};

/// Hard ceiling on think→act→observe iterations per turn.
pub const MAX_ITERATIONS: u32 = 10;

/// Fingerprint ring slots for repeat detection.
const RING_SLOTS: usize = 8;

/// Observation text substituted for a repeated call.
const REPEAT_MESSAGE: &str = "repeated identical tool call; try a different approach";

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model finished its answer.
    Done,
    /// The response was cut off by the per-response token cap.
    MaxTokens,
    /// The iteration ceiling was hit while tools were still being
    /// requested.
    IterationLimit,
}

/// The seam the loop drives the model through. [`LlmClient`] is the
/// production implementation; tests script their own.
#[async_trait]
pub trait ModelClient: Send {
    async fn send(&mut self, messages: &[Message]) -> Result<ApiResponse, ClientError>;

    async fn send_streaming(
        &mut self,
        messages: &[Message],
        on_delta: &mut (dyn for<'r> FnMut(&'r str) + Send),
    ) -> Result<ApiResponse, ClientError>;
}

#[async_trait]
impl ModelClient for LlmClient {
    async fn send(&mut self, messages: &[Message]) -> Result<ApiResponse, ClientError> {
        LlmClient::send(self, messages).await
    }

    async fn send_streaming(
        &mut self,
        messages: &[Message],
        on_delta: &mut (dyn for<'r> FnMut(&'r str) + Send),
    ) -> Result<ApiResponse, ClientError> {
        LlmClient::send_streaming(self, messages, on_delta).await
    }
}

pub struct Agent {
    client: Box<dyn ModelClient>,
    dispatcher: Dispatcher,
    context: ContextWindow,
    ring: SignatureRing,
    conversation: Vec<Message>,
    max_turns: u32,
    streaming: bool,
}

impl Agent {
    pub fn new(
        client: impl ModelClient + 'static,
        dispatcher: Dispatcher,
        context: ContextWindow,
        max_turns: u32,
        streaming: bool,
    ) -> Self {
        Self {
            client: Box::new(client),
            dispatcher,
            context,
            ring: SignatureRing::new(),
            conversation: Vec::new(),
            max_turns,
            streaming,
        }
    }

    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run one user turn to completion, streaming text to `on_delta`.
    pub async fn run_turn(
        &mut self,
        prompt: &str,
        on_delta: &mut (dyn for<'r> FnMut(&'r str) + Send),
    ) -> Result<TurnOutcome, Error> {
        self.conversation.push(Message::user_text(prompt));

        let cap = if self.max_turns == 0 {
            MAX_ITERATIONS
        } else {
            MAX_ITERATIONS.min(self.max_turns)
        };

        for iteration in 0..cap {
            debug!(iteration, "agent iteration");
            self.context.truncate(&mut self.conversation);

            let response = if self.streaming {
                self.client
                    .send_streaming(&self.conversation, on_delta)
                    .await?
            } else {
                let response = self.client.send(&self.conversation).await?;
                for block in &response.blocks {
                    if let ContentBlock::Text { text } = block {
                        on_delta(text);
                    }
                }
                response
            };

            let classification = classify(&response);
            self.conversation
                .push(Message::assistant(response.blocks.clone()));

            match classification {
                Classification::NeedsObservation => {
                    let results = self.execute_tools(&response).await;
                    self.conversation.push(Message::tool_results(results));
                }
                Classification::MaxTokens => {
                    warn!("response hit the max_tokens cap");
                    return Ok(TurnOutcome::MaxTokens);
                }
                Classification::Done => {
                    info!(iterations = iteration + 1, "turn complete");
                    return Ok(TurnOutcome::Done);
                }
            }
        }

        warn!(cap, "iteration limit reached with tools still pending");
        Ok(TurnOutcome::IterationLimit)
    }

    /// Execute the response's tool-use blocks in emission order,
    /// producing one result block per call.
    async fn execute_tools(&mut self, response: &ApiResponse) -> Vec<ContentBlock> {
        let mut results = Vec::new();
        for (id, name, input_raw) in response.tool_uses() {
            let repeats = self.ring.observe(name, input_raw);
            let output = if repeats >= 2 {
                warn!(tool = name, repeats, "suppressing repeated tool call");
                krillclaw_core::ToolOutput::error(REPEAT_MESSAGE)
            } else {
                self.dispatcher.execute(name, input_raw).await
            };
            results.push(ContentBlock::tool_result(id, output.output, output.is_error));
        }
        results
    }
}

enum Classification {
    NeedsObservation,
    MaxTokens,
    Done,
}

/// Tool use trumps everything; max-tokens only matters when no tools
/// were requested.
fn classify(response: &ApiResponse) -> Classification {
    if response.has_tool_use() {
        Classification::NeedsObservation
    } else if response.stop_reason == StopReason::MaxTokens {
        Classification::MaxTokens
    } else {
        Classification::Done
    }
}

/// FNV-1a over a byte string.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Fixed ring of 128-bit call fingerprints `(hash(name), hash(input))`.
struct SignatureRing {
    slots: [(u64, u64); RING_SLOTS],
    len: usize,
    idx: usize,
}

impl SignatureRing {
    fn new() -> Self {
        Self {
            slots: [(0, 0); RING_SLOTS],
            len: 0,
            idx: 0,
        }
    }

    /// Count matches already in the ring, then record this call.
    fn observe(&mut self, name: &str, input_raw: &str) -> usize {
        let sig = (fnv1a(name.as_bytes()), fnv1a(input_raw.as_bytes()));
        let matches = self.slots[..self.len].iter().filter(|&&s| s == sig).count();
        self.slots[self.idx % RING_SLOTS] = sig;
        self.idx += 1;
        self.len = self.len.max(self.idx.min(RING_SLOTS));
        matches
    }
}
