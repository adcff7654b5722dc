//! Execution-time measurement and prediction

use std::time::Instant;

use serde::Serialize;

/// Smoothing factor of the execution-time averages
pub const PREDICTION_ALPHA: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct PerfTimer {
    start: Instant,
}

impl PerfTimer {
    pub fn start() -> Self {
        PerfTimer {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Exponentially smoothed durations of a physics chain run and of a full frame
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ExecutionPredictor {
    physics: Option<f64>,
    frame: Option<f64>,
}

impl ExecutionPredictor {
    pub fn record_physics(&mut self, seconds: f64) {
        self.physics = Some(smooth(self.physics, seconds));
    }

    pub fn record_frame(&mut self, seconds: f64) {
        self.frame = Some(smooth(self.frame, seconds));
    }

    /// Predicted seconds for pass 1 + pass 2 (0 until measured)
    pub fn physics_seconds(&self) -> f64 {
        self.physics.unwrap_or(0.0)
    }

    /// Predicted seconds for a whole frame (0 until measured)
    pub fn frame_seconds(&self) -> f64 {
        self.frame.unwrap_or(0.0)
    }
}

fn smooth(previous: Option<f64>, sample: f64) -> f64 {
    let sample = if sample.is_finite() { sample.max(0.0) } else { 0.0 };
    match previous {
        Some(previous) => previous + (sample - previous) * PREDICTION_ALPHA,
        None => sample,
    }
}
