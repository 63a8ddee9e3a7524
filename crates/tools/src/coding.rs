//! Coding profile: shell, file, and patch tools. Every path crosses
//! the path-policy gate before any filesystem call.

use crate::runtime::{cap_output, ToolRuntime, OUTPUT_CAP, PATCH_OUTPUT_CAP};
use krillclaw_core::tool::{opt_str, require_str};
use krillclaw_core::{ToolDef, ToolOutput};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

pub const PROFILE_NAME: &str = "coding";

/// Largest file `read_file` will return.
const READ_CAP: usize = 64 * 1024;
/// `search` result ceiling.
const SEARCH_MAX_MATCHES: usize = 100;
/// `list_files` result ceiling.
const LIST_MAX_FILES: usize = 200;
/// Recursion ceiling for `search` and `list_files`.
const MAX_DEPTH: usize = 10;
/// Bytes sniffed for NUL to skip binaries.
const BINARY_SNIFF: usize = 512;

pub const DEFINITIONS: &[ToolDef] = &[
    ToolDef {
        name: "bash",
        description: "Run a shell command and return combined stdout/stderr. Non-zero exit is reported as an error result.",
        input_schema: r#"{"type":"object","properties":{"command":{"type":"string","description":"The shell command to execute"}},"required":["command"]}"#,
    },
    ToolDef {
        name: "read_file",
        description: "Read a text file (up to 64 KiB).",
        input_schema: r#"{"type":"object","properties":{"path":{"type":"string","description":"Path to the file"}},"required":["path"]}"#,
    },
    ToolDef {
        name: "write_file",
        description: "Create or overwrite a file, creating parent directories as needed.",
        input_schema: r#"{"type":"object","properties":{"path":{"type":"string"},"content":{"type":"string"}},"required":["path","content"]}"#,
    },
    ToolDef {
        name: "edit_file",
        description: "Replace exactly one occurrence of old_string with new_string in a file. Fails unless the match is unique.",
        input_schema: r#"{"type":"object","properties":{"path":{"type":"string"},"old_string":{"type":"string"},"new_string":{"type":"string"}},"required":["path","old_string","new_string"]}"#,
    },
    ToolDef {
        name: "search",
        description: "Recursive substring search under a directory. Skips dotfiles, build directories, and binaries.",
        input_schema: r#"{"type":"object","properties":{"pattern":{"type":"string","description":"Substring to find"},"path":{"type":"string","description":"Directory to search (default .)"}},"required":["pattern"]}"#,
    },
    ToolDef {
        name: "list_files",
        description: "Recursively list files under a directory. Optional glob with a leading or trailing *.",
        input_schema: r#"{"type":"object","properties":{"path":{"type":"string","description":"Directory to list (default .)"},"pattern":{"type":"string","description":"Name filter, e.g. *.rs or src*"}}}"#,
    },
    ToolDef {
        name: "apply_patch",
        description: "Apply a unified diff with patch -p0.",
        input_schema: r#"{"type":"object","properties":{"diff":{"type":"string","description":"Unified diff text"}},"required":["diff"]}"#,
    },
];

/// Execute a coding tool. `None` when the name is not in this table.
pub async fn execute(rt: &ToolRuntime, name: &str, args: &Value) -> Option<ToolOutput> {
    Some(match name {
        "bash" => bash(rt, args).await,
        "read_file" => read_file(rt, args),
        "write_file" => write_file(rt, args),
        "edit_file" => edit_file(rt, args),
        "search" => search(rt, args),
        "list_files" => list_files(rt, args),
        "apply_patch" => apply_patch(rt, args).await,
        _ => return None,
    })
}

/// Names this profile refuses outright (nothing here).
pub fn deny_reason(_name: &str) -> Option<&'static str> {
    None
}

async fn bash(rt: &ToolRuntime, args: &Value) -> ToolOutput {
    let command = match require_str(args, "command") {
        Ok(c) => c,
        Err(e) => return e.into(),
    };
    debug!(command, "bash");

    // In sandbox mode: fixed cwd, cleared environment (PATH included),
    // and an absolute shell path so the spawn needs no lookup. The
    // command crosses the argv boundary whole, so no shell quoting is
    // layered on top.
    let mut cmd = if let Some(sandbox) = &rt.sandbox_dir {
        let mut cmd = Command::new("/bin/sh");
        cmd.current_dir(sandbox).env_clear();
        cmd
    } else {
        Command::new("sh")
    };
    cmd.arg("-c").arg(command);

    match cmd.output().await {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut combined = stdout.into_owned();
            if !stderr.is_empty() {
                combined.push_str("\n--- stderr ---\n");
                combined.push_str(&stderr);
            }
            let combined = cap_output(combined, OUTPUT_CAP);
            if output.status.success() {
                ToolOutput::ok(if combined.trim().is_empty() {
                    "(no output)".to_string()
                } else {
                    combined
                })
            } else {
                let code = output.status.code().unwrap_or(-1);
                warn!(command, code, "command failed");
                ToolOutput::error(format!("[exit code: {code}]\n{combined}"))
            }
        }
        Err(e) => ToolOutput::error(format!("failed to spawn shell: {e}")),
    }
}

fn read_file(rt: &ToolRuntime, args: &Value) -> ToolOutput {
    let path = match checked_path(rt, args) {
        Ok(p) => p,
        Err(out) => return out,
    };
    match std::fs::read(&path) {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            if text.is_empty() {
                ToolOutput::ok("(empty file)")
            } else {
                ToolOutput::ok(cap_output(text, READ_CAP))
            }
        }
        Err(e) => ToolOutput::error(format!("cannot read {}: {e}", path.display())),
    }
}

fn write_file(rt: &ToolRuntime, args: &Value) -> ToolOutput {
    let content = match require_str(args, "content") {
        Ok(c) => c,
        Err(e) => return e.into(),
    };
    let path = match checked_path(rt, args) {
        Ok(p) => p,
        Err(out) => return out,
    };
    if let Some(parent) = path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        return ToolOutput::error(format!("cannot create {}: {e}", parent.display()));
    }
    match std::fs::write(&path, content) {
        Ok(()) => ToolOutput::ok(format!("Wrote {} bytes to {}", content.len(), path.display())),
        Err(e) => ToolOutput::error(format!("cannot write {}: {e}", path.display())),
    }
}

fn edit_file(rt: &ToolRuntime, args: &Value) -> ToolOutput {
    let old = match require_str(args, "old_string") {
        Ok(s) => s,
        Err(e) => return e.into(),
    };
    let new = match require_str(args, "new_string") {
        Ok(s) => s,
        Err(e) => return e.into(),
    };
    if old.is_empty() {
        return ToolOutput::error("old_string must not be empty");
    }
    let path = match checked_path(rt, args) {
        Ok(p) => p,
        Err(out) => return out,
    };
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => return ToolOutput::error(format!("cannot read {}: {e}", path.display())),
    };
    match content.matches(old).count() {
        0 => ToolOutput::error("old_string not found in file"),
        1 => {
            let updated = content.replacen(old, new, 1);
            match std::fs::write(&path, updated) {
                Ok(()) => ToolOutput::ok(format!("Edited {}", path.display())),
                Err(e) => ToolOutput::error(format!("cannot write {}: {e}", path.display())),
            }
        }
        n => ToolOutput::error(format!(
            "old_string has {n} matches; provide more context to make it unique"
        )),
    }
}

fn search(rt: &ToolRuntime, args: &Value) -> ToolOutput {
    let pattern = match require_str(args, "pattern") {
        Ok(p) => p,
        Err(e) => return e.into(),
    };
    let root = match checked_dir(rt, args) {
        Ok(p) => p,
        Err(out) => return out,
    };

    let mut matches = Vec::new();
    walk(&root, 0, &mut |file| {
        if matches.len() >= SEARCH_MAX_MATCHES {
            return false;
        }
        let Ok(bytes) = std::fs::read(file) else {
            return true;
        };
        if bytes.iter().take(BINARY_SNIFF).any(|&b| b == 0) {
            return true;
        }
        let text = String::from_utf8_lossy(&bytes);
        for (lineno, line) in text.lines().enumerate() {
            if line.contains(pattern) {
                matches.push(format!(
                    "{}:{}:{}",
                    relative_display(file, &root),
                    lineno + 1,
                    line.trim_end()
                ));
                if matches.len() >= SEARCH_MAX_MATCHES {
                    break;
                }
            }
        }
        true
    });

    if matches.is_empty() {
        ToolOutput::ok("No matches found")
    } else {
        let mut out = matches.join("\n");
        if matches.len() >= SEARCH_MAX_MATCHES {
            out.push_str("\n[match limit reached]");
        }
        ToolOutput::ok(out)
    }
}

fn list_files(rt: &ToolRuntime, args: &Value) -> ToolOutput {
    let root = match checked_dir(rt, args) {
        Ok(p) => p,
        Err(out) => return out,
    };
    let pattern = opt_str(args, "pattern");

    let mut files = Vec::new();
    walk(&root, 0, &mut |file| {
        if files.len() >= LIST_MAX_FILES {
            return false;
        }
        let name = file.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if glob_match(pattern, name) {
            files.push(relative_display(file, &root));
        }
        true
    });

    if files.is_empty() {
        ToolOutput::ok("No files found")
    } else {
        let mut out = files.join("\n");
        if files.len() >= LIST_MAX_FILES {
            out.push_str("\n[file limit reached]");
        }
        ToolOutput::ok(out)
    }
}

async fn apply_patch(rt: &ToolRuntime, args: &Value) -> ToolOutput {
    let diff = match require_str(args, "diff") {
        Ok(d) => d,
        Err(e) => return e.into(),
    };
    let workdir = rt
        .sandbox_dir
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    // Timestamp nonce keeps concurrent invocations from colliding
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let patch_file = std::env::temp_dir().join(format!("krillclaw-patch-{nonce}.diff"));
    if let Err(e) = std::fs::write(&patch_file, diff) {
        return ToolOutput::error(format!("cannot stage patch: {e}"));
    }

    let result = Command::new("patch")
        .arg("-p0")
        .arg("-i")
        .arg(&patch_file)
        .current_dir(&workdir)
        .output()
        .await;
    let _ = std::fs::remove_file(&patch_file);

    match result {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut combined = stdout.into_owned();
            if !stderr.is_empty() {
                combined.push_str("\n--- stderr ---\n");
                combined.push_str(&stderr);
            }
            let combined = cap_output(combined, PATCH_OUTPUT_CAP);
            if output.status.success() {
                ToolOutput::ok(combined)
            } else {
                ToolOutput::error(format!("patch failed:\n{combined}"))
            }
        }
        Err(e) => ToolOutput::error(format!("failed to run patch: {e}")),
    }
}

// --- helpers ---

fn checked_path(rt: &ToolRuntime, args: &Value) -> Result<PathBuf, ToolOutput> {
    let path = require_str(args, "path").map_err(ToolOutput::from)?;
    rt.path_policy
        .resolve(path)
        .map_err(|e| ToolOutput::error(format!("Path not allowed: {e}")))
}

fn checked_dir(rt: &ToolRuntime, args: &Value) -> Result<PathBuf, ToolOutput> {
    let path = opt_str(args, "path").unwrap_or(".");
    rt.path_policy
        .resolve(path)
        .map_err(|e| ToolOutput::error(format!("Path not allowed: {e}")))
}

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &["target", "node_modules", "build", "dist", "zig-out", "__pycache__"];

/// Depth-first walk calling `visit` on every regular file. `visit`
/// returning false stops the walk.
fn walk(dir: &Path, depth: usize, visit: &mut dyn FnMut(&Path) -> bool) -> bool {
    if depth > MAX_DEPTH {
        return true;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return true;
    };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            if SKIP_DIRS.contains(&name.as_ref()) {
                continue;
            }
            if !walk(&path, depth + 1, visit) {
                return false;
            }
        } else if path.is_file() && !visit(&path) {
            return false;
        }
    }
    true
}

fn relative_display(file: &Path, root: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .display()
        .to_string()
}

/// Leading- or trailing-`*` glob; no pattern matches everything, no
/// star means exact name.
fn glob_match(pattern: Option<&str>, name: &str) -> bool {
    match pattern {
        None | Some("") | Some("*") => true,
        Some(p) => {
            if let Some(suffix) = p.strip_prefix('*') {
                name.ends_with(suffix)
            } else if let Some(prefix) = p.strip_suffix('*') {
                name.starts_with(prefix)
            } else {
                name == p
            }
        }
    }
}
