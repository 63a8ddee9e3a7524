//! Bridge RPC envelopes.
//!
//! ```json
//! {"type":"api","provider":"claude","body":"<request body JSON, as a string>"}
//! {"type":"tool","name":"bash","input":{"command":"ls"}}
//! ```
//!
//! The bridge mirrors these back as `api_result` / `tool_result`.
//! Envelopes are built with the byte-level writer and peeled with the
//! extraction functions so the inner JSON never transits a parse on
//! this side of the wire.

use krillclaw_core::{json, ToolOutput, TransportError};

/// Build an `api` request envelope around a provider request body.
pub fn api_request(provider: &str, body: &str) -> String {
    let mut w = json::Writer::with_capacity(body.len() + 64);
    w.begin_object()
        .string_field("type", "api")
        .string_field("provider", provider)
        .string_field("body", body)
        .end_object();
    w.finish()
}

/// Build a `tool` request envelope. `input_raw` must already be a JSON
/// object; it is copied through verbatim.
pub fn tool_request(name: &str, input_raw: &str) -> String {
    let mut w = json::Writer::with_capacity(input_raw.len() + 48);
    w.begin_object()
        .string_field("type", "tool")
        .string_field("name", name)
        .raw_field("input", input_raw)
        .end_object();
    w.finish()
}

/// Unwrap an `api_result` envelope, returning the inner response body.
pub fn parse_api_result(bytes: &[u8]) -> Result<String, TransportError> {
    match json::extract_string(bytes, "type") {
        Some("api_result") => {}
        Some(other) => {
            return Err(TransportError::BadEnvelope(format!(
                "expected api_result, got '{other}'"
            )));
        }
        None => return Err(TransportError::BadEnvelope("missing 'type' field".into())),
    }
    if let Some(err) = json::extract_string(bytes, "error") {
        return Err(TransportError::BadEnvelope(format!(
            "bridge error: {}",
            json::unescape(err)
        )));
    }
    json::extract_string(bytes, "body")
        .map(json::unescape)
        .ok_or_else(|| TransportError::BadEnvelope("api_result without body".into()))
}

/// Unwrap a `tool_result` envelope into a [`ToolOutput`].
pub fn parse_tool_result(bytes: &[u8]) -> Result<ToolOutput, TransportError> {
    match json::extract_string(bytes, "type") {
        Some("tool_result") => {}
        Some(other) => {
            return Err(TransportError::BadEnvelope(format!(
                "expected tool_result, got '{other}'"
            )));
        }
        None => return Err(TransportError::BadEnvelope("missing 'type' field".into())),
    }
    let output = json::extract_string(bytes, "output")
        .map(json::unescape)
        .unwrap_or_default();
    let is_error = json::extract_bool(bytes, "is_error").unwrap_or(false);
    Ok(ToolOutput { output, is_error })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_request_wraps_body_as_string() {
        let body = r#"{"model":"claude-sonnet-4-5","messages":[{"role":"user"}]}"#;
        let env = api_request("claude", body);
        assert!(env.starts_with(r#"{"type":"api","provider":"claude","body":"#));
        // body is escaped into a string field, and round-trips
        let recovered = json::extract_string(env.as_bytes(), "body").unwrap();
        assert_eq!(json::unescape(recovered), body);
    }

    #[test]
    fn tool_request_keeps_input_raw() {
        let env = tool_request("bash", r#"{"command":"ls -la"}"#);
        assert_eq!(
            env,
            r#"{"type":"tool","name":"bash","input":{"command":"ls -la"}}"#
        );
    }

    #[test]
    fn parse_api_result_ok() {
        let inner = r#"{"id":"msg_1","content":[]}"#;
        let mut w = json::Writer::new();
        w.begin_object()
            .string_field("type", "api_result")
            .string_field("body", inner)
            .end_object();
        let body = parse_api_result(w.finish().as_bytes()).unwrap();
        assert_eq!(body, inner);
    }

    #[test]
    fn parse_api_result_error() {
        let env = br#"{"type":"api_result","error":"rate limited"}"#;
        let err = parse_api_result(env).unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn parse_api_result_wrong_type() {
        let env = br#"{"type":"tool_result","output":"x"}"#;
        assert!(parse_api_result(env).is_err());
    }

    #[test]
    fn parse_tool_result_ok_and_error() {
        let env = br#"{"type":"tool_result","output":"line1\nline2","is_error":false}"#;
        let out = parse_tool_result(env).unwrap();
        assert_eq!(out.output, "line1\nline2");
        assert!(!out.is_error);

        let env = br#"{"type":"tool_result","output":"boom","is_error":true}"#;
        assert!(parse_tool_result(env).unwrap().is_error);
    }

    #[test]
    fn parse_tool_result_missing_fields_degrades() {
        let env = br#"{"type":"tool_result"}"#;
        let out = parse_tool_result(env).unwrap();
        assert_eq!(out.output, "");
        assert!(!out.is_error);
    }
}
