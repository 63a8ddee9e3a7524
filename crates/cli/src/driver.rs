//! Drivers: REPL, one-shot, and the scheduler daemon.

use krillclaw_agent::{Agent, Scheduler, TurnOutcome};
use krillclaw_core::{ClientError, Error};
use std::io::Write;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// Print a streamed fragment without buffering a full line.
fn emit(fragment: &str) {
    print!("{fragment}");
    let _ = std::io::stdout().flush();
}

fn report_outcome(outcome: TurnOutcome) {
    println!();
    match outcome {
        TurnOutcome::Done => {}
        TurnOutcome::MaxTokens => {
            eprintln!("[response truncated by the max_tokens cap]");
        }
        TurnOutcome::IterationLimit => {
            eprintln!("[stopped: iteration limit reached while tools were still running]");
        }
    }
}

/// One prompt, one exit. Loop failures print a hint but exit clean;
/// only pre-loop configuration problems use a non-zero code.
pub async fn run_once(mut agent: Agent, prompt: &str) -> ExitCode {
    match agent.run_turn(prompt, &mut emit).await {
        Ok(outcome) => report_outcome(outcome),
        Err(err) => print_hint(&err),
    }
    ExitCode::SUCCESS
}

/// Interactive loop on stdin. The conversation lives for the process
/// lifetime only.
pub async fn run_repl(mut agent: Agent) -> ExitCode {
    println!("krillclaw {} - type a prompt, or 'exit' to quit", env!("CARGO_PKG_VERSION"));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        match agent.run_turn(line, &mut emit).await {
            Ok(outcome) => report_outcome(outcome),
            Err(err) => print_hint(&err),
        }
    }
    ExitCode::SUCCESS
}

/// Re-enter the loop on a schedule until the run budget is spent.
pub async fn run_daemon(mut agent: Agent, mut scheduler: Scheduler) -> ExitCode {
    info!("scheduler daemon starting");
    loop {
        if scheduler.should_run_agent() {
            let prompt = scheduler.prompt().to_string();
            info!(run = scheduler.run_count(), "scheduled run");
            match agent.run_turn(&prompt, &mut emit).await {
                Ok(outcome) => report_outcome(outcome),
                Err(err) => print_hint(&err),
            }
        }
        if scheduler.should_heartbeat() {
            info!("heartbeat");
            println!("[heartbeat]");
        }
        if scheduler.finished() {
            info!("scheduler run budget spent, exiting");
            break;
        }
        scheduler.sleep_until_next().await;
    }
    ExitCode::SUCCESS
}

/// Single-line hints for the failure classes a user can act on; raw
/// display for the rest.
pub fn print_hint(err: &Error) {
    match err {
        Error::Client(ClientError::ConnectionRefused(detail)) => {
            eprintln!("error: connection refused ({detail})");
            eprintln!("hint: check the endpoint URL, or start the server (ollama serve / the bridge)");
        }
        Error::Client(ClientError::AuthError(_)) => {
            eprintln!("error: {err}");
            eprintln!("hint: the API key was rejected; check ANTHROPIC_API_KEY / OPENAI_API_KEY");
        }
        Error::Client(ClientError::RateLimited) => {
            eprintln!("error: {err}");
            eprintln!("hint: rate limited; wait a moment and try again");
        }
        Error::Client(ClientError::ServerError { .. }) => {
            eprintln!("error: {err}");
            eprintln!("hint: provider-side failure, usually transient; try again");
        }
        other => eprintln!("error: {other}"),
    }
}
