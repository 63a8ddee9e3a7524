//! Robotics profile: motion commands behind bounds, rate, and estop.
//!
//! Every command observes the estop latch, then the rate ring, then its
//! parameter bounds, before being delegated to the bridge (which owns
//! the actual ROS/hardware bindings).

use crate::bridge;
use crate::runtime::ToolRuntime;
use krillclaw_core::tool::{opt_f64, require_str};
use krillclaw_core::{ToolDef, ToolOutput};
use serde_json::Value;
use tracing::warn;

pub const PROFILE_NAME: &str = "robotics";

/// |pose| bound per axis (mm).
const POSE_LIMIT: f64 = 1000.0;
/// |velocity| bound per axis (mm/s).
const VELOCITY_LIMIT: f64 = 500.0;

pub const DEFINITIONS: &[ToolDef] = &[
    ToolDef {
        name: "robot_cmd",
        description: "Send a motion command to the robot: pose (x/y/z), velocity (x/y/z), or gripper (grip 0..1).",
        input_schema: r#"{"type":"object","properties":{"cmd_type":{"type":"string","enum":["pose","velocity","gripper"]},"x":{"type":"number"},"y":{"type":"number"},"z":{"type":"number"},"grip":{"type":"number"}},"required":["cmd_type"]}"#,
    },
    ToolDef {
        name: "estop",
        description: "Emergency stop. Latches until the operator resets; all further robot commands are refused.",
        input_schema: r#"{"type":"object","properties":{"reason":{"type":"string"}}}"#,
    },
    ToolDef {
        name: "telemetry_snapshot",
        description: "Read a snapshot of robot telemetry (joints, battery, system).",
        input_schema: r#"{"type":"object","properties":{}}"#,
    },
];

pub fn deny_reason(name: &str) -> Option<&'static str> {
    match name {
        "bash" | "write_file" | "edit_file" | "apply_patch" => {
            Some("host access is disabled in the robotics profile")
        }
        _ => None,
    }
}

/// Execute a robotics tool. `None` when the name is not in this table.
pub async fn execute(rt: &ToolRuntime, name: &str, args: &Value) -> Option<ToolOutput> {
    Some(match name {
        "robot_cmd" => robot_cmd(rt, args).await,
        "estop" => estop(rt, args).await,
        "telemetry_snapshot" => bridge::exec_tool(rt, "telemetry", args).await,
        _ => return None,
    })
}

async fn robot_cmd(rt: &ToolRuntime, args: &Value) -> ToolOutput {
    if rt.estop_active() {
        return ToolOutput::error("emergency stop is latched; robot commands are blocked until reset");
    }
    let cmd_type = match require_str(args, "cmd_type") {
        Ok(t) => t,
        Err(e) => return e.into(),
    };
    if let Err(reason) = check_bounds(cmd_type, args) {
        return ToolOutput::error(reason);
    }
    if !rt.robot_command_allowed() {
        warn!(cmd_type, "robot command rate exceeded");
        return ToolOutput::error("robot command rate limit exceeded (10/second)");
    }

    // Bridge expects {"action":"robot_cmd","type":...,"params":{...}}
    let mut params = args.clone();
    if let Some(obj) = params.as_object_mut() {
        obj.remove("cmd_type");
    }
    let command = serde_json::json!({
        "type": cmd_type,
        "params": params,
    });
    bridge::exec_tool(rt, "robot_cmd", &command).await
}

fn check_bounds(cmd_type: &str, args: &Value) -> Result<(), String> {
    match cmd_type {
        "pose" => {
            for axis in ["x", "y", "z"] {
                if let Some(v) = opt_f64(args, axis)
                    && v.abs() > POSE_LIMIT
                {
                    return Err(format!(
                        "pose {axis}={v} exceeds bound (|{axis}| <= {POSE_LIMIT})"
                    ));
                }
            }
            Ok(())
        }
        "velocity" => {
            for axis in ["x", "y", "z"] {
                if let Some(v) = opt_f64(args, axis)
                    && v.abs() > VELOCITY_LIMIT
                {
                    return Err(format!(
                        "velocity {axis}={v} exceeds bound (|{axis}| <= {VELOCITY_LIMIT})"
                    ));
                }
            }
            Ok(())
        }
        "gripper" => {
            let grip = opt_f64(args, "grip")
                .ok_or_else(|| "gripper command requires 'grip'".to_string())?;
            if !(0.0..=1.0).contains(&grip) {
                return Err(format!("grip={grip} out of range [0, 1]"));
            }
            Ok(())
        }
        other => Err(format!(
            "unknown cmd_type '{other}' (expected pose, velocity, or gripper)"
        )),
    }
}

async fn estop(rt: &ToolRuntime, args: &Value) -> ToolOutput {
    rt.trigger_estop();
    warn!("emergency stop triggered");
    let result = bridge::exec_tool(rt, "estop", args).await;
    if result.is_error {
        // The latch is set regardless of whether the bridge heard us
        return ToolOutput::ok(format!(
            "emergency stop latched locally (bridge unreachable: {})",
            result.output
        ));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn offline_runtime() -> ToolRuntime {
        let mut rt = ToolRuntime::new();
        rt.bridge_program = "/nonexistent/bridge.py".into();
        rt
    }

    #[tokio::test]
    async fn estop_latches_and_blocks_commands() {
        let rt = offline_runtime();
        let out = execute(&rt, "estop", &json!({"reason": "test"})).await.unwrap();
        assert!(!out.is_error); // latch set even without a bridge
        assert!(rt.estop_active());

        let out = execute(&rt, "robot_cmd", &json!({"cmd_type": "pose", "x": 1.0}))
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.output.contains("emergency stop"));

        rt.reset_estop();
        // After reset the command reaches the bridge stage (and fails
        // there in this offline test, but not on the latch)
        let out = execute(&rt, "robot_cmd", &json!({"cmd_type": "pose", "x": 1.0}))
            .await
            .unwrap();
        assert!(!out.output.contains("emergency stop"));
    }

    #[tokio::test]
    async fn pose_bounds_enforced() {
        let rt = offline_runtime();
        let out = execute(&rt, "robot_cmd", &json!({"cmd_type": "pose", "x": 1500.0}))
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.output.contains("exceeds bound"));
    }

    #[tokio::test]
    async fn velocity_bounds_enforced() {
        let rt = offline_runtime();
        let out = execute(
            &rt,
            "robot_cmd",
            &json!({"cmd_type": "velocity", "y": -501.0}),
        )
        .await
        .unwrap();
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn gripper_range_enforced() {
        let rt = offline_runtime();
        for grip in [-0.1, 1.1] {
            let out = execute(&rt, "robot_cmd", &json!({"cmd_type": "gripper", "grip": grip}))
                .await
                .unwrap();
            assert!(out.is_error, "grip={grip} should be rejected");
        }
        let out = execute(&rt, "robot_cmd", &json!({"cmd_type": "gripper", "grip": 0.5}))
            .await
            .unwrap();
        // Passes validation; fails only at the offline bridge
        assert!(out.output.contains("bridge unavailable"));
    }

    #[tokio::test]
    async fn unknown_cmd_type_rejected() {
        let rt = offline_runtime();
        let out = execute(&rt, "robot_cmd", &json!({"cmd_type": "dance"})).await.unwrap();
        assert!(out.is_error);
        assert!(out.output.contains("unknown cmd_type"));
    }

    #[tokio::test]
    async fn rate_limit_kicks_in() {
        let rt = offline_runtime();
        let mut limited = false;
        // 21 rapid calls span at most one second boundary, so one
        // second must see at least 11 of them and trip the ring
        for _ in 0..21 {
            let out = execute(&rt, "robot_cmd", &json!({"cmd_type": "pose", "x": 1.0}))
                .await
                .unwrap();
            if out.output.contains("rate limit") {
                limited = true;
                break;
            }
        }
        assert!(limited, "burst of 21 commands should trip the 10/s ring");
    }

    #[test]
    fn host_tools_denied() {
        assert!(deny_reason("bash").is_some());
        assert!(deny_reason("robot_cmd").is_none());
    }
}
