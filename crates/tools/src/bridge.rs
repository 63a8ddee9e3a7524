//! Bridge sidecar invocation: spawns `<bridge> --exec-tool '<json>'`
//! and reads one JSON document back. Over BLE/serial the same request
//! travels as a `tool` envelope instead.

use crate::runtime::{cap_output, ToolRuntime, OUTPUT_CAP};
use krillclaw_core::ToolOutput;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

/// Delegate a tool call to the bridge subprocess.
///
/// `action` is the bridge handler name; `args` is the tool input, which
/// rides inside the command document under the bridge's flat argument
/// convention.
pub async fn exec_tool(rt: &ToolRuntime, action: &str, args: &Value) -> ToolOutput {
    if !rt.bridge_call_allowed() {
        return ToolOutput::error("bridge call rate limit exceeded (30/minute); wait before retrying");
    }

    let mut command = args.clone();
    if !command.is_object() {
        command = serde_json::json!({});
    }
    command["action"] = Value::String(action.to_string());

    debug!(action, "delegating to bridge");
    let output = Command::new(&rt.bridge_program)
        .arg("--exec-tool")
        .arg(command.to_string())
        .output()
        .await;

    let output = match output {
        Ok(o) => o,
        Err(e) => {
            warn!(action, error = %e, "bridge spawn failed");
            return ToolOutput::error(format!(
                "bridge unavailable ({}: {e}); tool '{action}' cannot run on this device",
                rt.bridge_program
            ));
        }
    };

    let stdout = cap_output(String::from_utf8_lossy(&output.stdout).into_owned(), OUTPUT_CAP);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return ToolOutput::error(format!("bridge exited with error: {}", stderr.trim()));
    }

    // Bridge responses are JSON; an "error" key marks failure.
    match serde_json::from_str::<Value>(&stdout) {
        Ok(v) => {
            if let Some(err) = v.get("error").and_then(Value::as_str) {
                ToolOutput::error(err.to_string())
            } else {
                ToolOutput::ok(stdout.trim().to_string())
            }
        }
        Err(_) => ToolOutput::ok(stdout.trim().to_string()),
    }
}
