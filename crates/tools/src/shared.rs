//! Shared tools available in every profile: `get_time`, the KV store,
//! and the bridge-delegated set (web_search, session_*, ota_*).

use crate::bridge;
use crate::runtime::ToolRuntime;
use krillclaw_core::tool::require_str;
use krillclaw_core::{ToolDef, ToolOutput};
use krillclaw_security::validate_kv_key;
use serde_json::Value;

pub const DEFINITIONS: &[ToolDef] = &[
    ToolDef {
        name: "get_time",
        description: "Get the current date and time (UTC and local).",
        input_schema: r#"{"type":"object","properties":{}}"#,
    },
    ToolDef {
        name: "kv_get",
        description: "Read a value from the persistent key-value store.",
        input_schema: r#"{"type":"object","properties":{"key":{"type":"string","description":"Key to read"}},"required":["key"]}"#,
    },
    ToolDef {
        name: "kv_set",
        description: "Write a value to the persistent key-value store.",
        input_schema: r#"{"type":"object","properties":{"key":{"type":"string","description":"Key to write"},"value":{"type":"string","description":"Value to store"}},"required":["key","value"]}"#,
    },
    ToolDef {
        name: "web_search",
        description: "Search the web and return result snippets.",
        input_schema: r#"{"type":"object","properties":{"query":{"type":"string","description":"Search query"}},"required":["query"]}"#,
    },
    ToolDef {
        name: "session_save",
        description: "Save the current session under an id for later restore.",
        input_schema: r#"{"type":"object","properties":{"session_id":{"type":"string"}},"required":["session_id"]}"#,
    },
    ToolDef {
        name: "session_load",
        description: "Load a previously saved session by id.",
        input_schema: r#"{"type":"object","properties":{"session_id":{"type":"string"}},"required":["session_id"]}"#,
    },
    ToolDef {
        name: "session_list",
        description: "List saved sessions.",
        input_schema: r#"{"type":"object","properties":{}}"#,
    },
    ToolDef {
        name: "ota_check",
        description: "Check whether a firmware/binary update is available.",
        input_schema: r#"{"type":"object","properties":{}}"#,
    },
    ToolDef {
        name: "ota_download",
        description: "Download a pending update.",
        input_schema: r#"{"type":"object","properties":{"version":{"type":"string"}}}"#,
    },
    ToolDef {
        name: "ota_apply",
        description: "Apply a downloaded update.",
        input_schema: r#"{"type":"object","properties":{"version":{"type":"string"}}}"#,
    },
];

/// Tools that only name a bridge handler.
const BRIDGE_DELEGATED: &[&str] = &[
    "web_search",
    "session_save",
    "session_load",
    "session_list",
    "ota_check",
    "ota_download",
    "ota_apply",
];

/// Execute a shared tool. `None` when the name is not in this table.
pub async fn execute(rt: &ToolRuntime, name: &str, args: &Value) -> Option<ToolOutput> {
    match name {
        "get_time" => Some(get_time()),
        "kv_get" => Some(kv_get(rt, args)),
        "kv_set" => Some(kv_set(rt, args)),
        _ if BRIDGE_DELEGATED.contains(&name) => Some(bridge::exec_tool(rt, name, args).await),
        _ => None,
    }
}

fn get_time() -> ToolOutput {
    let now = chrono::Utc::now();
    let local = chrono::Local::now();
    ToolOutput::ok(format!(
        "UTC: {}\nLocal: {}",
        now.format("%Y-%m-%d %H:%M:%S"),
        local.format("%Y-%m-%d %H:%M:%S %Z")
    ))
}

fn kv_get(rt: &ToolRuntime, args: &Value) -> ToolOutput {
    let key = match require_str(args, "key") {
        Ok(k) => k,
        Err(e) => return e.into(),
    };
    let key = match validate_kv_key(key) {
        Ok(k) => k,
        Err(e) => return ToolOutput::error(format!("invalid key: {e}")),
    };
    match std::fs::read_to_string(rt.kv_dir.join(key)) {
        Ok(value) => ToolOutput::ok(value),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            ToolOutput::error(format!("key '{key}' not found"))
        }
        Err(e) => ToolOutput::error(format!("kv read failed: {e}")),
    }
}

fn kv_set(rt: &ToolRuntime, args: &Value) -> ToolOutput {
    let key = match require_str(args, "key") {
        Ok(k) => k,
        Err(e) => return e.into(),
    };
    let value = match require_str(args, "value") {
        Ok(v) => v,
        Err(e) => return e.into(),
    };
    let key = match validate_kv_key(key) {
        Ok(k) => k,
        Err(e) => return ToolOutput::error(format!("invalid key: {e}")),
    };
    if let Err(e) = std::fs::create_dir_all(&rt.kv_dir) {
        return ToolOutput::error(format!("kv store unavailable: {e}"));
    }
    match std::fs::write(rt.kv_dir.join(key), value) {
        Ok(()) => ToolOutput::ok(format!("stored {} bytes under '{key}'", value.len())),
        Err(e) => ToolOutput::error(format!("kv write failed: {e}")),
    }
}
