//! The LLM client.
//!
//! Owns request assembly (delegated to the dialect), the HTTP
//! connection or framed transport for the duration of a request, and
//! response decoding. Failures are surfaced, never retried.

use crate::openai_compat::StreamCollector;
use crate::sse::{LineBuffer, SseDecoder};
use crate::{dialect_for, ChatRequest, Dialect};
use futures::StreamExt;
use krillclaw_core::{ApiResponse, ClientError, Message, Provider, ToolDef};
use krillclaw_transport::{envelope, Transport};
use tracing::{debug, warn};

/// Static configuration for a client.
#[derive(Clone)]
pub struct LlmClientConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: String,
    /// Override of the provider's default base URL.
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
    pub tools: Vec<ToolDef>,
}

impl std::fmt::Debug for LlmClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClientConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("tools", &self.tools.len())
            .finish()
    }
}

/// How request bytes reach the provider.
pub enum Carrier {
    /// Direct HTTPS from this process.
    Http,
    /// Length-prefixed frames to the bridge sidecar, which performs the
    /// HTTPS call on our behalf. Streaming is unavailable here.
    Framed(Box<dyn Transport>),
}

pub struct LlmClient {
    config: LlmClientConfig,
    dialect: &'static dyn Dialect,
    http: reqwest::Client,
    carrier: Carrier,
}

impl LlmClient {
    pub fn new(config: LlmClientConfig, carrier: Carrier) -> Self {
        let dialect = dialect_for(config.provider);
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("failed to build HTTP client");
        Self {
            config,
            dialect,
            http,
            carrier,
        }
    }

    pub fn provider(&self) -> Provider {
        self.config.provider
    }

    fn url(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or_else(|| self.config.provider.default_base_url())
            .trim_end_matches('/');
        format!("{base}{}", self.config.provider.messages_path())
    }

    fn chat_request<'a>(&'a self, messages: &'a [Message], stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: self.config.system_prompt.as_deref(),
            messages,
            tools: &self.config.tools,
            stream,
        }
    }

    /// Send the conversation and wait for the complete response.
    pub async fn send(&mut self, messages: &[Message]) -> Result<ApiResponse, ClientError> {
        let body = self
            .dialect
            .build_body(&self.chat_request(messages, false))?;

        if let Carrier::Framed(transport) = &mut self.carrier {
            debug!(provider = %self.config.provider, "sending request via bridge");
            let env = envelope::api_request(self.config.provider.as_str(), &body);
            let reply = transport
                .send(env.as_bytes())
                .await
                .map_err(transport_to_client)?;
            let inner = envelope::parse_api_result(&reply).map_err(transport_to_client)?;
            return self.dialect.parse_response(inner.as_bytes());
        }

        debug!(provider = %self.config.provider, model = %self.config.model, "sending request");
        let response = self.post(&body).await?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        if status != 200 {
            let message = String::from_utf8_lossy(&bytes).into_owned();
            warn!(status, "provider returned error");
            return Err(ClientError::from_status(status, message));
        }
        self.dialect.parse_response(&bytes)
    }

    /// Send the conversation, streaming text deltas to `on_delta`.
    ///
    /// Falls back to the non-streaming path when the provider or the
    /// carrier cannot stream.
    pub async fn send_streaming(
        &mut self,
        messages: &[Message],
        on_delta: &mut (dyn for<'r> FnMut(&'r str) + Send),
    ) -> Result<ApiResponse, ClientError> {
        let can_stream = self.config.provider.supports_streaming()
            && matches!(self.carrier, Carrier::Http);
        if !can_stream {
            return self.send(messages).await;
        }

        let body = self.dialect.build_body(&self.chat_request(messages, true))?;
        debug!(provider = %self.config.provider, model = %self.config.model, "sending streaming request");

        let response = self.post(&body).await?;
        let status = response.status().as_u16();
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            warn!(status, "provider returned error");
            return Err(ClientError::from_status(status, message));
        }

        let mut stream = response.bytes_stream();
        match self.config.provider {
            Provider::Claude => {
                let mut decoder = SseDecoder::new();
                while let Some(chunk) = stream.next().await {
                    let bytes =
                        chunk.map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
                    decoder.feed(&bytes, on_delta)?;
                    if decoder.is_done() {
                        break;
                    }
                }
                decoder.finish()
            }
            Provider::OpenAiStyle => {
                let mut lines = LineBuffer::default();
                let mut collector = StreamCollector::new();
                'outer: while let Some(chunk) = stream.next().await {
                    let bytes =
                        chunk.map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
                    lines.push(&bytes);
                    while let Some(line) = lines.next_line() {
                        if let Some(data) = line.strip_prefix("data:") {
                            collector.process_data(data.trim(), on_delta)?;
                            if collector.is_done() {
                                break 'outer;
                            }
                        }
                    }
                }
                Ok(collector.finish())
            }
            Provider::Ollama => unreachable!("ollama never streams"),
        }
    }

    async fn post(&self, body: &str) -> Result<reqwest::Response, ClientError> {
        let mut request = self
            .http
            .post(self.url())
            .header("Content-Type", "application/json");
        for (name, value) in self.dialect.headers(&self.config.api_key) {
            request = request.header(name, value);
        }
        request
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ClientError::ConnectionRefused(e.to_string())
                } else {
                    ClientError::HttpError {
                        status: 0,
                        message: e.to_string(),
                    }
                }
            })
    }
}

fn transport_to_client(err: krillclaw_core::TransportError) -> ClientError {
    use krillclaw_core::TransportError as T;
    match err {
        T::ConnectionRefused(m) => ClientError::ConnectionRefused(m),
        T::ConnectionClosed => ClientError::ConnectionRefused("connection closed".into()),
        T::MessageTooLarge { .. } => ClientError::OutOfMemory,
        other => ClientError::InvalidResponse(other.to_string()),
    }
}
