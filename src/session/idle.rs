//! User-idle tracking.
//!
//! The last-activity instant is shared behind a mutex: an activity listener
//! on another thread writes it, the orchestrator loop reads it. A zero
//! threshold means "always idle", so cycles never wait.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Tracks time since the last observed user activity.
#[derive(Debug, Clone)]
pub struct IdleDetector {
    threshold: Duration,
    last_activity: Arc<Mutex<Instant>>,
}

impl IdleDetector {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            last_activity: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// A detector that never gates cycles.
    pub fn always_idle() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Note user activity now. Safe to call from a listener thread.
    pub fn record_activity(&self) {
        self.record_activity_at(Instant::now());
    }

    pub fn record_activity_at(&self, at: Instant) {
        let mut last = self.last_activity.lock().unwrap_or_else(|e| e.into_inner());
        if at > *last {
            *last = at;
        }
    }

    pub fn idle_for(&self) -> Duration {
        let last = *self.last_activity.lock().unwrap_or_else(|e| e.into_inner());
        last.elapsed()
    }

    pub fn is_idle(&self) -> bool {
        self.threshold.is_zero() || self.idle_for() > self.threshold
    }

    /// Time left until the idle threshold is crossed.
    pub fn remaining(&self) -> Duration {
        if self.threshold.is_zero() {
            return Duration::ZERO;
        }
        self.threshold.saturating_sub(self.idle_for())
    }
}

impl Default for IdleDetector {
    fn default() -> Self {
        Self::always_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threshold_is_always_idle() {
        let d = IdleDetector::always_idle();
        d.record_activity();
        assert!(d.is_idle());
        assert_eq!(d.remaining(), Duration::ZERO);
    }

    #[test]
    fn fresh_activity_is_not_idle() {
        let d = IdleDetector::new(Duration::from_secs(900));
        d.record_activity();
        assert!(!d.is_idle());
        assert!(d.remaining() > Duration::from_secs(800));
    }

    #[test]
    fn elapsed_threshold_becomes_idle() {
        let d = IdleDetector::new(Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(20));
        assert!(d.is_idle());
    }

    #[test]
    fn activity_from_another_thread_is_visible() {
        let d = IdleDetector::new(Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(100));
        assert!(d.is_idle());
        let listener = d.clone();
        std::thread::spawn(move || listener.record_activity())
            .join()
            .unwrap();
        assert!(d.idle_for() < Duration::from_millis(100));
    }

    #[test]
    fn older_activity_does_not_rewind() {
        let d = IdleDetector::new(Duration::from_secs(60));
        let before = Instant::now();
        std::thread::sleep(Duration::from_millis(100));
        d.record_activity();
        d.record_activity_at(before);
        assert!(d.idle_for() < Duration::from_millis(100));
    }
}
