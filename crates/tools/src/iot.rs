//! IoT profile: messaging and device tools. MQTT goes through the
//! bridge sidecar; shell access and file writes are refused by name.

use crate::bridge;
use crate::runtime::{cap_output, ToolRuntime, OUTPUT_CAP};
use krillclaw_core::tool::{opt_str, require_str};
use krillclaw_core::{ToolDef, ToolOutput};
use serde_json::Value;
use tracing::debug;

pub const PROFILE_NAME: &str = "iot";

/// Response body ceiling for http_request.
const HTTP_BODY_CAP: usize = 64 * 1024;

pub const DEFINITIONS: &[ToolDef] = &[
    ToolDef {
        name: "publish_mqtt",
        description: "Publish a payload to an MQTT topic.",
        input_schema: r#"{"type":"object","properties":{"topic":{"type":"string"},"payload":{"type":"string"},"broker":{"type":"string"},"port":{"type":"integer"}},"required":["topic","payload"]}"#,
    },
    ToolDef {
        name: "subscribe_mqtt",
        description: "Subscribe to an MQTT topic and wait for one message.",
        input_schema: r#"{"type":"object","properties":{"topic":{"type":"string"},"timeout_ms":{"type":"integer"}},"required":["topic"]}"#,
    },
    ToolDef {
        name: "http_request",
        description: "Make an HTTP GET or POST request and return the response body.",
        input_schema: r#"{"type":"object","properties":{"url":{"type":"string"},"method":{"type":"string","enum":["GET","POST"]},"body":{"type":"string"}},"required":["url"]}"#,
    },
    ToolDef {
        name: "device_info",
        description: "Report information about this device and build.",
        input_schema: r#"{"type":"object","properties":{}}"#,
    },
];

/// Tools this profile refuses outright, whatever table they might be
/// found in downstream.
const DENIED: &[(&str, &str)] = &[
    ("bash", "shell access is disabled in the iot profile"),
    ("write_file", "file writes are disabled in the iot profile"),
    ("edit_file", "file writes are disabled in the iot profile"),
    ("apply_patch", "file writes are disabled in the iot profile"),
];

pub fn deny_reason(name: &str) -> Option<&'static str> {
    DENIED.iter().find(|(n, _)| *n == name).map(|(_, r)| *r)
}

/// Execute an IoT tool. `None` when the name is not in this table.
pub async fn execute(rt: &ToolRuntime, name: &str, args: &Value) -> Option<ToolOutput> {
    Some(match name {
        "publish_mqtt" => bridge::exec_tool(rt, "mqtt_publish", args).await,
        "subscribe_mqtt" => bridge::exec_tool(rt, "mqtt_subscribe", args).await,
        "http_request" => http_request(args).await,
        "device_info" => device_info(),
        _ => return None,
    })
}

async fn http_request(args: &Value) -> ToolOutput {
    let url = match require_str(args, "url") {
        Ok(u) => u,
        Err(e) => return e.into(),
    };
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return ToolOutput::error("url must be http:// or https://");
    }
    let method = opt_str(args, "method").unwrap_or("GET").to_ascii_uppercase();
    debug!(url, method, "http_request");

    let client = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
    {
        Ok(c) => c,
        Err(e) => return ToolOutput::error(format!("http client: {e}")),
    };

    let request = match method.as_str() {
        "GET" => client.get(url),
        "POST" => {
            let body = opt_str(args, "body").unwrap_or("").to_string();
            client.post(url).body(body)
        }
        other => return ToolOutput::error(format!("unsupported method '{other}'")),
    };

    match request.send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let body = cap_output(body, HTTP_BODY_CAP);
            if (200..300).contains(&status) {
                ToolOutput::ok(format!("[{status}]\n{body}"))
            } else {
                ToolOutput::error(format!("[{status}]\n{body}"))
            }
        }
        Err(e) => ToolOutput::error(format!("request failed: {e}")),
    }
}

fn device_info() -> ToolOutput {
    ToolOutput::ok(cap_output(
        format!(
            "os: {}\narch: {}\nprofile: {}\npid: {}\nversion: {}",
            std::env::consts::OS,
            std::env::consts::ARCH,
            PROFILE_NAME,
            std::process::id(),
            env!("CARGO_PKG_VERSION"),
        ),
        OUTPUT_CAP,
    ))
}
