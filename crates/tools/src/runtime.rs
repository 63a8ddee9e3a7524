//! Long-lived tool runtime state: the estop latch, rate-limit rings,
//! and KV/sandbox paths, carried as fields of one value threaded
//! through the dispatcher rather than as globals.

use krillclaw_security::PathPolicy;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

/// Ceiling on captured subprocess/bridge output.
pub const OUTPUT_CAP: usize = 256 * 1024;
/// Smaller ceiling for `patch` output.
pub const PATCH_OUTPUT_CAP: usize = 64 * 1024;

/// Robot commands per second.
const ROBOT_RATE_SLOTS: usize = 10;
/// Bridge-delegated calls per minute.
const BRIDGE_CALLS_PER_MINUTE: f64 = 30.0;

pub struct ToolRuntime {
    /// File access policy for the compiled profile.
    pub path_policy: PathPolicy,
    /// Fixed working directory in sandbox builds.
    pub sandbox_dir: Option<PathBuf>,
    /// Directory backing the shared key-value store.
    pub kv_dir: PathBuf,
    /// Program invoked for bridge-delegated tools.
    pub bridge_program: String,

    estop: AtomicBool,
    robot_ring: Mutex<RateRing>,
    bridge_bucket: Mutex<TokenBucket>,
}

impl ToolRuntime {
    pub fn new() -> Self {
        let sandbox_dir = sandbox_dir();
        let path_policy = match &sandbox_dir {
            Some(dir) => PathPolicy::sandboxed(dir.clone()),
            None => PathPolicy::for_cwd(),
        };
        let bridge_program = std::env::var("KRILLCLAW_BRIDGE")
            .unwrap_or_else(|_| "bridge.py".to_string());
        Self {
            path_policy,
            sandbox_dir,
            kv_dir: PathBuf::from(".krillclaw").join("kv"),
            bridge_program,
            estop: AtomicBool::new(false),
            robot_ring: Mutex::new(RateRing::new()),
            bridge_bucket: Mutex::new(TokenBucket::new(
                BRIDGE_CALLS_PER_MINUTE,
                BRIDGE_CALLS_PER_MINUTE / 60.0,
            )),
        }
    }

    // --- estop latch ---

    pub fn estop_active(&self) -> bool {
        self.estop.load(Ordering::SeqCst)
    }

    pub fn trigger_estop(&self) {
        debug!("estop latch set");
        self.estop.store(true, Ordering::SeqCst);
    }

    /// Clears the latch. Deliberately not reachable from the model's
    /// tool surface; only the driver may reset.
    pub fn reset_estop(&self) {
        debug!("estop latch cleared");
        self.estop.store(false, Ordering::SeqCst);
    }

    // --- rate limits ---

    /// Record one robot command; false when the per-second budget is
    /// already spent.
    pub fn robot_command_allowed(&self) -> bool {
        self.robot_ring.lock().unwrap().allow(now_secs())
    }

    /// Take one bridge-call token; false when the minute budget is
    /// exhausted.
    pub fn bridge_call_allowed(&self) -> bool {
        self.bridge_bucket.lock().unwrap().take(Instant::now())
    }
}

impl Default for ToolRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "sandbox")]
fn sandbox_dir() -> Option<PathBuf> {
    let dir = std::env::temp_dir().join("krillclaw-sandbox");
    let _ = std::fs::create_dir_all(&dir);
    dir.canonicalize().ok()
}

#[cfg(not(feature = "sandbox"))]
fn sandbox_dir() -> Option<PathBuf> {
    None
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Fixed ring of second-granular timestamps. A command is allowed
/// unless the slot it would overwrite was written in the same second,
/// i.e. the N-th previous command is less than a second old.
struct RateRing {
    slots: [u64; ROBOT_RATE_SLOTS],
    idx: usize,
}

impl RateRing {
    fn new() -> Self {
        Self {
            slots: [0; ROBOT_RATE_SLOTS],
            idx: 0,
        }
    }

    fn allow(&mut self, now: u64) -> bool {
        let slot = self.idx % ROBOT_RATE_SLOTS;
        if self.slots[slot] == now && now != 0 {
            return false;
        }
        self.slots[slot] = now;
        self.idx = self.idx.wrapping_add(1);
        true
    }
}

/// Classic token bucket: `capacity` tokens, refilled at `rate` per
/// second.
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    rate: f64,
    last: Option<Instant>,
}

impl TokenBucket {
    fn new(capacity: f64, rate: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            rate,
            last: None,
        }
    }

    fn take(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        }
        self.last = Some(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Truncate captured output at `cap` bytes, marking the cut.
pub fn cap_output(mut output: String, cap: usize) -> String {
    if output.len() > cap {
        let mut cut = cap;
        while !output.is_char_boundary(cut) {
            cut -= 1;
        }
        output.truncate(cut);
        output.push_str("\n[output truncated]");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn estop_latch_set_and_reset() {
        let rt = ToolRuntime::new();
        assert!(!rt.estop_active());
        rt.trigger_estop();
        assert!(rt.estop_active());
        rt.trigger_estop(); // idempotent
        assert!(rt.estop_active());
        rt.reset_estop();
        assert!(!rt.estop_active());
    }

    #[test]
    fn rate_ring_allows_ten_per_second() {
        let mut ring = RateRing::new();
        let t = 1_700_000_000;
        for _ in 0..10 {
            assert!(ring.allow(t));
        }
        assert!(!ring.allow(t));
        // Next second the budget resets
        assert!(ring.allow(t + 1));
    }

    #[test]
    fn rate_ring_interleaved_seconds() {
        let mut ring = RateRing::new();
        let t = 1_700_000_000;
        for i in 0..5 {
            assert!(ring.allow(t + i));
        }
        // Only 5 commands this second; 5 more fit
        for _ in 0..10 {
            ring.allow(t + 10);
        }
        assert!(!ring.allow(t + 10));
    }

    #[test]
    fn token_bucket_caps_burst() {
        let mut bucket = TokenBucket::new(3.0, 1.0);
        let start = Instant::now();
        assert!(bucket.take(start));
        assert!(bucket.take(start));
        assert!(bucket.take(start));
        assert!(!bucket.take(start));
        // One second later, one token has refilled
        assert!(bucket.take(start + Duration::from_secs(1)));
        assert!(!bucket.take(start + Duration::from_secs(1)));
    }

    #[test]
    fn cap_output_marks_truncation() {
        let out = cap_output("x".repeat(100), 10);
        assert!(out.starts_with("xxxxxxxxxx"));
        assert!(out.ends_with("[output truncated]"));
        assert_eq!(cap_output("short".into(), 10), "short");
    }
}
