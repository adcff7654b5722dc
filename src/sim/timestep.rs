//! Adaptive, oscillation-damped integration step
//!
//! The raw wall-clock delta jitters with scheduler contention. Instead of
//! feeding it straight into the integrator, the controller moves the previous
//! step toward `actual + debt` by a correction that grows quadratically with
//! the relative error, so small fluctuations are damped while large ones are
//! followed quickly. Whatever the step does not consume is carried in `debt`,
//! which keeps the long-run average equal to the elapsed time.

use std::time::Instant;

use crate::consts::*;

#[derive(Debug, Clone)]
pub struct TimeStepController {
    last_instant: Instant,
    debt: f64,
    last_step: f64,
}

impl Default for TimeStepController {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeStepController {
    pub fn new() -> Self {
        Self {
            last_instant: Instant::now(),
            debt: 0.0,
            last_step: 0.0,
        }
    }

    /// Step emitted by the most recent advance (0 before the first one)
    ///
    /// The first advance measures from construction.
    pub fn last_step(&self) -> f64 {
        self.last_step
    }

    /// Accumulated shortfall between elapsed and emitted time
    pub fn debt(&self) -> f64 {
        self.debt
    }

    /// Produce the step for a pass that starts at `now`
    pub fn advance(&mut self, now: Instant, multiplier: f64, strictness: f64) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_instant).as_secs_f64();
        self.last_instant = now;
        self.advance_elapsed(elapsed, multiplier, strictness)
    }

    /// Produce the step for `elapsed` seconds of wall-clock time
    ///
    /// `elapsed` is clamped to `[MIN_TIME_DIFF, MAX_TIME_DIFF]`; the floor
    /// keeps `offset / actual` finite.
    pub fn advance_elapsed(&mut self, elapsed: f64, multiplier: f64, strictness: f64) -> f64 {
        let elapsed = if elapsed.is_finite() {
            elapsed.clamp(MIN_TIME_DIFF, MAX_TIME_DIFF)
        } else {
            MIN_TIME_DIFF
        };
        let actual = elapsed * multiplier.clamp(MIN_TIME_MULTIPLIER, MAX_TIME_MULTIPLIER);
        let strictness = if strictness.is_finite() {
            strictness.clamp(0.0, 1.0)
        } else {
            1.0
        };

        let offset = actual + self.debt - self.last_step;
        let correction = (strictness * offset * (offset / actual).abs()).clamp(-offset.abs(), offset.abs());

        let mut step = self.last_step + correction;
        if !(step > 0.0) {
            step = actual * MIN_TIME_DIFF_SCALE;
        }

        self.debt += actual - step;
        self.last_step = step;
        step
    }
}

/// Exponentially smoothed physics updates per frame, turned into strictness
#[derive(Debug, Clone)]
pub struct StrictnessMeter {
    smoothed: f64,
}

impl Default for StrictnessMeter {
    fn default() -> Self {
        Self { smoothed: 1.0 }
    }
}

impl StrictnessMeter {
    /// Fold in the number of physics updates observed since the last frame
    pub fn update(&mut self, raw_updates: u64) -> f64 {
        self.smoothed += (raw_updates as f64 - self.smoothed) * TIME_STRICTNESS_UPDATE_ALPHA;
        self.smoothed = self.smoothed.max(1.0);
        self.strictness()
    }

    pub fn rate(&self) -> f64 {
        self.smoothed
    }

    /// Reciprocal of the smoothed rate, in (0, 1]
    pub fn strictness(&self) -> f64 {
        1.0 / self.smoothed
    }
}
