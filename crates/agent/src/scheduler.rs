//! Periodic driver: cron-style agent runs and heartbeats. Poll-based
//! and single-threaded; nothing executes in the background.

use std::time::{Duration, Instant};
use tracing::debug;

pub struct Scheduler {
    interval: Duration,
    prompt: String,
    heartbeat: Duration,
    max_runs: u32,

    last_run: Instant,
    last_heartbeat: Instant,
    run_count: u32,
}

impl Scheduler {
    /// `interval_s` / `heartbeat_s` of 0 disable that timer;
    /// `max_runs` of 0 means unlimited.
    pub fn new(interval_s: u64, prompt: impl Into<String>, heartbeat_s: u64, max_runs: u32) -> Self {
        let now = Instant::now();
        Self {
            interval: Duration::from_secs(interval_s),
            prompt: prompt.into(),
            heartbeat: Duration::from_secs(heartbeat_s),
            max_runs,
            last_run: now,
            last_heartbeat: now,
            run_count: 0,
        }
    }

    pub fn enabled(&self) -> bool {
        !self.interval.is_zero() || !self.heartbeat.is_zero()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn run_count(&self) -> u32 {
        self.run_count
    }

    /// All cron runs spent and no heartbeat to keep the daemon alive.
    pub fn finished(&self) -> bool {
        self.heartbeat.is_zero()
            && (self.interval.is_zero() || (self.max_runs > 0 && self.run_count >= self.max_runs))
    }

    /// True when a cron run is due; advances the clock and the run
    /// counter as a side effect.
    pub fn should_run_agent(&mut self) -> bool {
        self.should_run_agent_at(Instant::now())
    }

    /// True when a heartbeat is due; advances the heartbeat clock.
    pub fn should_heartbeat(&mut self) -> bool {
        self.should_heartbeat_at(Instant::now())
    }

    /// Sleep until the earlier of the next cron or heartbeat deadline.
    pub async fn sleep_until_next(&self) {
        let now = Instant::now();
        let mut deadline: Option<Instant> = None;
        if !self.interval.is_zero() && (self.max_runs == 0 || self.run_count < self.max_runs) {
            deadline = Some(self.last_run + self.interval);
        }
        if !self.heartbeat.is_zero() {
            let hb = self.last_heartbeat + self.heartbeat;
            deadline = Some(match deadline {
                Some(d) => d.min(hb),
                None => hb,
            });
        }
        let Some(deadline) = deadline else { return };
        if deadline > now {
            debug!(in_secs = (deadline - now).as_secs(), "scheduler sleeping");
            tokio::time::sleep(deadline - now).await;
        }
    }

    fn should_run_agent_at(&mut self, now: Instant) -> bool {
        if self.interval.is_zero() {
            return false;
        }
        if self.max_runs > 0 && self.run_count >= self.max_runs {
            return false;
        }
        if now.duration_since(self.last_run) >= self.interval {
            self.last_run = now;
            self.run_count += 1;
            return true;
        }
        false
    }

    fn should_heartbeat_at(&mut self, now: Instant) -> bool {
        if self.heartbeat.is_zero() {
            return false;
        }
        if now.duration_since(self.last_heartbeat) >= self.heartbeat {
            self.last_heartbeat = now;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_scheduler_never_fires() {
        let mut s = Scheduler::new(0, "tick", 0, 0);
        assert!(!s.enabled());
        let later = Instant::now() + Duration::from_secs(3600);
        assert!(!s.should_run_agent_at(later));
        assert!(!s.should_heartbeat_at(later));
    }

    #[test]
    fn cron_fires_after_interval_and_advances() {
        let mut s = Scheduler::new(60, "tick", 0, 0);
        let start = Instant::now();
        assert!(!s.should_run_agent_at(start + Duration::from_secs(59)));
        assert!(s.should_run_agent_at(start + Duration::from_secs(61)));
        assert_eq!(s.run_count(), 1);
        // The clock advanced; not due again immediately
        assert!(!s.should_run_agent_at(start + Duration::from_secs(62)));
        assert!(s.should_run_agent_at(start + Duration::from_secs(125)));
        assert_eq!(s.run_count(), 2);
    }

    #[test]
    fn max_runs_caps_cron() {
        let mut s = Scheduler::new(1, "tick", 0, 2);
        let start = Instant::now();
        assert!(s.should_run_agent_at(start + Duration::from_secs(2)));
        assert!(s.should_run_agent_at(start + Duration::from_secs(4)));
        assert!(!s.should_run_agent_at(start + Duration::from_secs(60)));
        assert_eq!(s.run_count(), 2);
        assert!(s.finished());
    }

    #[test]
    fn heartbeat_independent_of_cron() {
        let mut s = Scheduler::new(100, "tick", 10, 0);
        let start = Instant::now();
        assert!(s.should_heartbeat_at(start + Duration::from_secs(11)));
        assert!(!s.should_run_agent_at(start + Duration::from_secs(11)));
        assert!(!s.should_heartbeat_at(start + Duration::from_secs(12)));
        assert!(!s.finished());
    }

    #[tokio::test]
    async fn sleep_returns_quickly_near_deadline() {
        let s = Scheduler::new(0, "", 0, 0);
        // Nothing scheduled: must not hang
        tokio::time::timeout(Duration::from_millis(50), s.sleep_until_next())
            .await
            .expect("disabled scheduler should not sleep");
    }

    #[tokio::test]
    async fn sleep_waits_for_next_cron() {
        let s = Scheduler::new(1, "tick", 0, 0);
        let start = Instant::now();
        tokio::time::timeout(Duration::from_secs(3), s.sleep_until_next())
            .await
            .expect("sleep should complete after the interval elapses");
        assert!(start.elapsed() >= Duration::from_millis(900));
    }
}
