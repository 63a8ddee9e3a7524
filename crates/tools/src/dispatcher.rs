//! The tool dispatcher.
//!
//! Lookup order: shared table, profile table, profile deny list, bridge
//! fall-through. One profile is linked at build time, so dispatch is a
//! single match chain.

use crate::runtime::ToolRuntime;
use crate::{bridge, profile, shared};
use krillclaw_core::{ToolDef, ToolOutput};
use serde_json::Value;
use tracing::debug;

pub struct Dispatcher {
    runtime: ToolRuntime,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            runtime: ToolRuntime::new(),
        }
    }

    pub fn with_runtime(runtime: ToolRuntime) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &ToolRuntime {
        &self.runtime
    }

    /// All tool definitions advertised to the model: shared first, then
    /// the compiled profile.
    pub fn definitions(&self) -> Vec<ToolDef> {
        let mut defs = Vec::with_capacity(shared::DEFINITIONS.len() + profile::DEFINITIONS.len());
        defs.extend_from_slice(shared::DEFINITIONS);
        defs.extend_from_slice(profile::DEFINITIONS);
        defs
    }

    /// Execute one tool-use block. Never fails; every error becomes an
    /// error-flagged output for the model to observe.
    pub async fn execute(&self, name: &str, input_raw: &str) -> ToolOutput {
        let args: Value = match serde_json::from_str(input_raw) {
            Ok(v) => v,
            Err(e) => return ToolOutput::error(format!("invalid tool input JSON: {e}")),
        };
        debug!(tool = name, "dispatch");

        if let Some(output) = shared::execute(&self.runtime, name, &args).await {
            return output;
        }
        if let Some(output) = profile::execute(&self.runtime, name, &args).await {
            return output;
        }
        if let Some(reason) = profile::deny_reason(name) {
            return ToolOutput::error(reason);
        }
        // Unknown locally; the bridge may know it
        debug!(tool = name, "falling through to bridge");
        bridge::exec_tool(&self.runtime, name, &args).await
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
