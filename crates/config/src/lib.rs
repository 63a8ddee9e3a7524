//! Configuration loading for KrillClaw.
//!
//! Layered, lowest precedence first: built-in defaults, the
//! `.krillclaw.json` file in the working directory, environment
//! variables. CLI flags are applied on top by the driver.

use krillclaw_core::Provider;
use krillclaw_transport::TransportKind;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Config file name, looked up in the current working directory.
pub const CONFIG_FILE: &str = ".krillclaw.json";

const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_MAX_TOKENS: u32 = 8192;
const DEFAULT_MAX_CONTEXT_TOKENS: usize = 100_000;
const DEFAULT_SERIAL_BAUD: u32 = 115_200;
const DEFAULT_SYSTEM_PROMPT: &str = "You are KrillClaw, a small autonomous agent. \
Use the available tools to accomplish the user's task, then answer concisely.";

#[derive(Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub provider: Provider,
    pub model: String,
    pub base_url: Option<String>,

    /// Per-response output cap.
    pub max_tokens: u32,
    /// Context-window size the truncation budget is derived from.
    pub max_context_tokens: usize,
    /// Hard cap on loop iterations per turn (0 = library default).
    pub max_turns: u32,

    pub system_prompt: String,
    pub streaming: bool,

    pub transport: TransportKind,
    pub ble_device: Option<String>,
    pub serial_port: Option<String>,
    pub serial_baud: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: Provider::Claude,
            model: DEFAULT_MODEL.into(),
            base_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            max_turns: 0,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            streaming: true,
            transport: TransportKind::Http,
            ble_device: None,
            serial_port: None,
            serial_baud: DEFAULT_SERIAL_BAUD,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("max_context_tokens", &self.max_context_tokens)
            .field("max_turns", &self.max_turns)
            .field("streaming", &self.streaming)
            .field("transport", &self.transport)
            .field("ble_device", &self.ble_device)
            .field("serial_port", &self.serial_port)
            .field("serial_baud", &self.serial_baud)
            .finish()
    }
}

/// The subset of keys the config file may carry. Unknown keys are
/// ignored rather than rejected.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    model: Option<String>,
    provider: Option<String>,
    max_tokens: Option<u32>,
    max_turns: Option<u32>,
    system_prompt: Option<String>,
    base_url: Option<String>,
    streaming: Option<bool>,
}

impl Config {
    /// Load from the default locations: defaults, then `.krillclaw.json`
    /// in the working directory, then the environment.
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply_file(Path::new(CONFIG_FILE));
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Merge the config file at `path`, if present and parseable.
    pub fn apply_file(&mut self, path: &Path) {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        let file: FileConfig = match serde_json::from_str(&content) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring malformed config file");
                return;
            }
        };
        debug!(path = %path.display(), "config file loaded");

        if let Some(model) = file.model {
            self.model = model;
        }
        if let Some(provider) = file.provider {
            match provider.parse() {
                Ok(p) => self.provider = p,
                Err(e) => warn!("config file: {e}"),
            }
        }
        if let Some(max_tokens) = file.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(max_turns) = file.max_turns {
            self.max_turns = max_turns;
        }
        if let Some(system_prompt) = file.system_prompt {
            self.system_prompt = system_prompt;
        }
        if let Some(base_url) = file.base_url {
            self.base_url = Some(base_url);
        }
        if let Some(streaming) = file.streaming {
            self.streaming = streaming;
        }
    }

    /// Merge environment variables through the provided lookup
    /// (injectable for tests).
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Provider keys: Anthropic wins; the OpenAI key also selects
        // the openai provider when nothing chose one explicitly.
        if let Some(key) = var("ANTHROPIC_API_KEY") {
            self.api_key = Some(key);
        } else if let Some(key) = var("OPENAI_API_KEY") {
            self.api_key = Some(key);
            self.provider = Provider::OpenAiStyle;
        }

        if let Some(key) = var("KRILLCLAW_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(model) = var("KRILLCLAW_MODEL") {
            self.model = model;
        }
        if let Some(provider) = var("KRILLCLAW_PROVIDER") {
            match provider.parse() {
                Ok(p) => self.provider = p,
                Err(e) => warn!("KRILLCLAW_PROVIDER: {e}"),
            }
        }
        if let Some(max_tokens) = var("KRILLCLAW_MAX_TOKENS") {
            match max_tokens.parse() {
                Ok(v) => self.max_tokens = v,
                Err(_) => warn!("KRILLCLAW_MAX_TOKENS is not a number"),
            }
        }
        if let Some(base_url) = var("KRILLCLAW_BASE_URL") {
            self.base_url = Some(base_url);
        }
        if let Some(system_prompt) = var("KRILLCLAW_SYSTEM_PROMPT") {
            self.system_prompt = system_prompt;
        }
        if let Some(transport) = var("KRILLCLAW_TRANSPORT") {
            match transport.parse() {
                Ok(t) => self.transport = t,
                Err(e) => warn!("KRILLCLAW_TRANSPORT: {e}"),
            }
        }
        if let Some(port) = var("KRILLCLAW_SERIAL_PORT") {
            self.serial_port = Some(port);
            self.transport = TransportKind::Serial;
        }
        if let Some(device) = var("KRILLCLAW_BLE_DEVICE") {
            self.ble_device = Some(device);
            self.transport = TransportKind::Ble;
        }
    }

    /// Pre-loop validation: the one failure class that exits non-zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.provider.requires_api_key()
            && self.transport == TransportKind::Http
            && self.api_key.is_none()
        {
            return Err(format!(
                "no API key configured for provider '{}'; set ANTHROPIC_API_KEY or OPENAI_API_KEY",
                self.provider
            ));
        }
        if self.transport == TransportKind::Serial && self.serial_port.is_none() {
            return Err("serial transport selected but no --serial-port given".into());
        }
        Ok(())
    }

    /// Streaming, after the provider's own capabilities are applied.
    pub fn effective_streaming(&self) -> bool {
        self.streaming && self.provider.supports_streaming()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.provider, Provider::Claude);
        assert_eq!(config.transport, TransportKind::Http);
        assert!(config.streaming);
        assert!(config.api_key.is_none());
        assert_eq!(config.serial_baud, 115_200);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{"model":"gpt-4o","provider":"openai","max_tokens":2048,"streaming":false}"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_file(&path);
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.provider, Provider::OpenAiStyle);
        assert_eq!(config.max_tokens, 2048);
        assert!(!config.streaming);
        // Untouched keys keep their defaults
        assert_eq!(config.max_context_tokens, DEFAULT_MAX_CONTEXT_TOKENS);
    }

    #[test]
    fn malformed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{not json").unwrap();

        let mut config = Config::default();
        config.apply_file(&path);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn env_overrides_file() {
        let mut config = Config::default();
        config.apply_env(|name| match name {
            "ANTHROPIC_API_KEY" => Some("sk-ant-1".into()),
            "KRILLCLAW_MODEL" => Some("claude-haiku".into()),
            _ => None,
        });
        assert_eq!(config.api_key.as_deref(), Some("sk-ant-1"));
        assert_eq!(config.model, "claude-haiku");
        assert_eq!(config.provider, Provider::Claude);
    }

    #[test]
    fn openai_key_selects_openai_provider() {
        let mut config = Config::default();
        config.apply_env(|name| match name {
            "OPENAI_API_KEY" => Some("sk-oai".into()),
            _ => None,
        });
        assert_eq!(config.provider, Provider::OpenAiStyle);
        assert_eq!(config.api_key.as_deref(), Some("sk-oai"));
    }

    #[test]
    fn anthropic_key_wins_over_openai_key() {
        let mut config = Config::default();
        config.apply_env(|name| match name {
            "ANTHROPIC_API_KEY" => Some("sk-ant".into()),
            "OPENAI_API_KEY" => Some("sk-oai".into()),
            _ => None,
        });
        assert_eq!(config.provider, Provider::Claude);
        assert_eq!(config.api_key.as_deref(), Some("sk-ant"));
    }

    #[test]
    fn endpoint_vars_imply_transport() {
        let mut config = Config::default();
        config.apply_env(|name| match name {
            "KRILLCLAW_SERIAL_PORT" => Some("/dev/ttyUSB0".into()),
            _ => None,
        });
        assert_eq!(config.transport, TransportKind::Serial);
        assert_eq!(config.serial_port.as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn validate_requires_key_for_http_claude() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut with_key = Config::default();
        with_key.api_key = Some("sk".into());
        assert!(with_key.validate().is_ok());

        // Over a framed transport the bridge holds the key
        let mut framed = Config::default();
        framed.transport = TransportKind::Ble;
        assert!(framed.validate().is_ok());

        // Ollama needs no key at all
        let mut ollama = Config::default();
        ollama.provider = Provider::Ollama;
        ollama.apply_env(no_env);
        assert!(ollama.validate().is_ok());
    }

    #[test]
    fn ollama_never_streams_effectively() {
        let mut config = Config::default();
        config.provider = Provider::Ollama;
        assert!(config.streaming);
        assert!(!config.effective_streaming());
    }

    #[test]
    fn debug_redacts_the_key() {
        let mut config = Config::default();
        config.api_key = Some("sk-secret-value".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret-value"));
        assert!(debug.contains("REDACTED"));
    }
}
