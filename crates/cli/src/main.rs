//! KrillClaw CLI: REPL, one-shot, and scheduled drivers.
//!
//! Exit code 1 is reserved for pre-loop configuration failures
//! (missing API key, missing serial port). Loop-time failures print a
//! hint and exit clean.

use clap::{ArgAction, Parser};
use krillclaw_agent::{Agent, ContextWindow, Scheduler};
use krillclaw_config::Config;
use krillclaw_providers::{Carrier, LlmClient, LlmClientConfig};
use krillclaw_tools::Dispatcher;
use krillclaw_transport::TransportKind;
use std::process::ExitCode;

mod driver;

#[derive(Parser)]
#[command(
    name = "krillclaw",
    about = "KrillClaw, a minimal autonomous agent runtime",
    disable_version_flag = true
)]
struct Cli {
    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    /// Run one-shot with this prompt instead of the REPL
    #[arg(short, long)]
    prompt: Option<String>,

    /// Provider: claude | openai | ollama
    #[arg(long)]
    provider: Option<String>,

    /// Override the provider base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Disable streaming output
    #[arg(long)]
    no_stream: bool,

    /// Transport: http | ble | serial
    #[arg(long)]
    transport: Option<String>,

    /// Serial port path (implies --transport serial)
    #[arg(long)]
    serial_port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    serial_baud: Option<u32>,

    /// BLE device address or socket path (implies --transport ble)
    #[arg(long)]
    ble_device: Option<String>,

    /// Run the agent every S seconds with the cron prompt
    #[arg(long, value_name = "S")]
    cron_interval: Option<u64>,

    /// Prompt for scheduled runs
    #[arg(long, value_name = "TEXT")]
    cron_prompt: Option<String>,

    /// Stop after N scheduled runs (0 = unlimited)
    #[arg(long, value_name = "N")]
    cron_max_runs: Option<u32>,

    /// Heartbeat every S seconds
    #[arg(long, value_name = "S")]
    heartbeat: Option<u64>,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,

    /// Prompt (same as --prompt)
    #[arg(value_name = "PROMPT")]
    positional_prompt: Option<String>,
}

impl Cli {
    /// CLI flags override everything the config file and environment
    /// provided.
    fn apply_to(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(provider) = &self.provider {
            match provider.parse() {
                Ok(p) => config.provider = p,
                Err(e) => eprintln!("warning: {e}"),
            }
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone());
        }
        if self.no_stream {
            config.streaming = false;
        }
        if let Some(transport) = &self.transport {
            match transport.parse() {
                Ok(t) => config.transport = t,
                Err(e) => eprintln!("warning: {e}"),
            }
        }
        if let Some(port) = &self.serial_port {
            config.serial_port = Some(port.clone());
            config.transport = TransportKind::Serial;
        }
        if let Some(baud) = self.serial_baud {
            config.serial_baud = baud;
        }
        if let Some(device) = &self.ble_device {
            config.ble_device = Some(device.clone());
            config.transport = TransportKind::Ble;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load();
    cli.apply_to(&mut config);

    if let Err(message) = config.validate() {
        eprintln!("error: {message}");
        if config.api_key.is_none() {
            eprintln!();
            eprintln!("  Set one of:");
            eprintln!("    ANTHROPIC_API_KEY   (claude, the default provider)");
            eprintln!("    OPENAI_API_KEY      (also selects the openai provider)");
            eprintln!();
            eprintln!("  Or run against a local model with: --provider ollama");
        }
        return ExitCode::from(1);
    }

    let agent = match build_agent(&config).await {
        Ok(agent) => agent,
        Err(err) => {
            driver::print_hint(&err);
            return ExitCode::from(1);
        }
    };

    let scheduler = Scheduler::new(
        cli.cron_interval.unwrap_or(0),
        cli.cron_prompt
            .clone()
            .unwrap_or_else(|| "Perform your scheduled check-in.".to_string()),
        cli.heartbeat.unwrap_or(0),
        cli.cron_max_runs.unwrap_or(0),
    );

    let prompt = cli.prompt.clone().or(cli.positional_prompt.clone());
    if scheduler.enabled() {
        driver::run_daemon(agent, scheduler).await
    } else if let Some(prompt) = prompt {
        driver::run_once(agent, &prompt).await
    } else {
        driver::run_repl(agent).await
    }
}

async fn build_agent(config: &Config) -> Result<Agent, krillclaw_core::Error> {
    let dispatcher = Dispatcher::new();
    let tools = dispatcher.definitions();

    let context = ContextWindow::new(
        config.max_context_tokens,
        config.max_tokens,
        Some(&config.system_prompt),
        &tools,
    );

    let client_config = LlmClientConfig {
        provider: config.provider,
        model: config.model.clone(),
        api_key: config.api_key.clone().unwrap_or_default(),
        base_url: config.base_url.clone(),
        max_tokens: config.max_tokens,
        system_prompt: Some(config.system_prompt.clone()),
        tools,
    };

    let carrier = open_carrier(config).await?;
    let client = LlmClient::new(client_config, carrier);

    Ok(Agent::new(
        client,
        dispatcher,
        context,
        config.max_turns,
        config.effective_streaming(),
    ))
}

async fn open_carrier(config: &Config) -> Result<Carrier, krillclaw_core::Error> {
    match config.transport {
        TransportKind::Http => Ok(Carrier::Http),
        #[cfg(unix)]
        TransportKind::Ble => {
            let device = config.ble_device.as_deref().unwrap_or_default();
            let transport = krillclaw_transport::BleTransport::connect(device).await?;
            Ok(Carrier::Framed(Box::new(transport)))
        }
        #[cfg(unix)]
        TransportKind::Serial => {
            let port = config
                .serial_port
                .as_deref()
                .expect("validated: serial transport has a port");
            let transport =
                krillclaw_transport::SerialTransport::open(port, config.serial_baud).await?;
            Ok(Carrier::Framed(Box::new(transport)))
        }
        #[cfg(not(unix))]
        _ => Err(krillclaw_core::Error::Config {
            message: format!(
                "the {} transport requires a Unix host",
                config.transport.as_str()
            ),
        }),
    }
}
