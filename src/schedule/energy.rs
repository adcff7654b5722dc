//! Idle pacing
//!
//! The simulation state publishes the idle budget on the main thread; the
//! physics thread sleeps for it once per frame after the chain finished.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Longest single idle, so a bogus prediction cannot stall the loop
pub const MAX_IDLE_SECONDS: f64 = 0.25;

#[derive(Debug, Default)]
pub struct EnergySaver {
    /// f64 bits of the next idle duration in seconds
    idle_bits: AtomicU64,
}

impl EnergySaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamped to [0, MAX_IDLE_SECONDS]
    pub fn set_idle_time(&self, seconds: f64) {
        let seconds = if seconds.is_finite() {
            seconds.clamp(0.0, MAX_IDLE_SECONDS)
        } else {
            0.0
        };
        self.idle_bits.store(seconds.to_bits(), Ordering::Release);
    }

    pub fn idle_time(&self) -> f64 {
        f64::from_bits(self.idle_bits.load(Ordering::Acquire))
    }

    /// Sleep for the current budget; returns the seconds slept
    pub fn idle(&self) -> f64 {
        let seconds = self.idle_time();
        if seconds > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(seconds));
        }
        seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_time_is_clamped() {
        let saver = EnergySaver::new();
        assert_eq!(saver.idle_time(), 0.0);
        saver.set_idle_time(0.004);
        assert_eq!(saver.idle_time(), 0.004);
        saver.set_idle_time(-1.0);
        assert_eq!(saver.idle_time(), 0.0);
        saver.set_idle_time(10.0);
        assert_eq!(saver.idle_time(), MAX_IDLE_SECONDS);
        saver.set_idle_time(f64::NAN);
        assert_eq!(saver.idle_time(), 0.0);
    }

    #[test]
    fn test_zero_budget_does_not_sleep() {
        let saver = EnergySaver::new();
        assert_eq!(saver.idle(), 0.0);
    }
}
