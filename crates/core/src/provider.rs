//! Provider enumeration and tool definitions.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The wire dialect to speak to the LLM endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Anthropic Messages API
    Claude,
    /// OpenAI Chat Completions and compatible endpoints
    #[serde(rename = "openai")]
    OpenAiStyle,
    /// Ollama native chat API (local models)
    Ollama,
}

impl Provider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Claude => "https://api.anthropic.com",
            Provider::OpenAiStyle => "https://api.openai.com",
            Provider::Ollama => "http://localhost:11434",
        }
    }

    pub fn messages_path(&self) -> &'static str {
        match self {
            Provider::Claude => "/v1/messages",
            Provider::OpenAiStyle => "/v1/chat/completions",
            Provider::Ollama => "/api/chat",
        }
    }

    /// Ollama's chunked-JSON stream format is not SSE; streaming is
    /// disabled for it by contract.
    pub fn supports_streaming(&self) -> bool {
        !matches!(self, Provider::Ollama)
    }

    /// Whether this provider requires an API key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Provider::Ollama)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::OpenAiStyle => "openai",
            Provider::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Provider::Claude),
            "openai" | "openai-style" => Ok(Provider::OpenAiStyle),
            "ollama" => Ok(Provider::Ollama),
            other => Err(format!(
                "unknown provider '{other}' (expected claude, openai, or ollama)"
            )),
        }
    }
}

/// A tool definition advertised to the model.
///
/// Tool tables are selected at compile time, so every field is a static
/// string; `input_schema` is the raw JSON Schema text embedded in the
/// binary and spliced into request bodies without re-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: &'static str,
}
