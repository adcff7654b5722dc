//! Simulation parameters shared by both physics passes
//!
//! Mutated only by `SimulationState` at the frame boundary; the passes see a
//! shared borrow for the whole frame.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Sign applied to pairwise gravity, selectable independently of the on/off toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GravitySign {
    #[default]
    Attract,
    Repel,
    Neutral,
}

impl GravitySign {
    pub fn scale(self) -> f64 {
        match self {
            GravitySign::Attract => 1.0,
            GravitySign::Repel => -1.0,
            GravitySign::Neutral => 0.0,
        }
    }

    /// Attract -> Repel -> Neutral -> Attract
    pub fn next(self) -> Self {
        match self {
            GravitySign::Attract => GravitySign::Repel,
            GravitySign::Repel => GravitySign::Neutral,
            GravitySign::Neutral => GravitySign::Attract,
        }
    }
}

/// Cursor state latched once per frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CursorState {
    /// World-space position
    pub position: DVec2,
    pub pull: bool,
    pub push: bool,
    pub brake: bool,
}

impl CursorState {
    /// Signed inverse-square strength of the cursor force (pull wins over push)
    pub fn gravity(&self) -> f64 {
        if self.pull {
            CURSOR_GRAVITY_ACCELERATION
        } else if self.push {
            -CURSOR_GRAVITY_ACCELERATION
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    pub population: usize,
    pub time_multiplier: f64,
    /// CPU budget knob in [0, 1]
    pub fidelity: f64,
    pub down_gravity: bool,
    pub relative_gravity: bool,
    pub gravity_sign: GravitySign,
    pub variable_mass: bool,
    pub min_mass: f64,
    pub max_mass: f64,
    pub border_collision: bool,
    pub object_collision: bool,
    pub motion_blur: bool,
    /// Half extents of the simulated area
    pub border: DVec2,
    /// Width / height of the viewport
    pub aspect_ratio: f64,
    pub cursor: CursorState,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            population: DEFAULT_BODIES,
            time_multiplier: DEFAULT_TIME_MULTIPLIER,
            fidelity: DEFAULT_PHYSICS_FIDELITY,
            down_gravity: false,
            relative_gravity: false,
            gravity_sign: GravitySign::Attract,
            variable_mass: false,
            min_mass: MIN_MASS,
            max_mass: MAX_MASS,
            border_collision: true,
            object_collision: false,
            motion_blur: false,
            border: DVec2::ONE,
            aspect_ratio: 1.0,
            cursor: CursorState::default(),
        }
    }
}

impl SimulationParameters {
    /// Net pairwise gravity scale: zero when the toggle is off
    pub fn relative_gravity_scale(&self) -> f64 {
        if self.relative_gravity {
            self.gravity_sign.scale()
        } else {
            0.0
        }
    }

    pub fn down_acceleration(&self) -> f64 {
        if self.down_gravity {
            DOWN_GRAVITY_ACCELERATION
        } else {
            0.0
        }
    }

    pub fn set_population(&mut self, count: usize) {
        self.population = count.clamp(MIN_BODIES, MAX_BODIES);
    }

    pub fn set_time_multiplier(&mut self, multiplier: f64) {
        self.time_multiplier = clamp_or(multiplier, MIN_TIME_MULTIPLIER, MAX_TIME_MULTIPLIER, self.time_multiplier);
    }

    pub fn set_fidelity(&mut self, fidelity: f64) {
        self.fidelity = clamp_or(fidelity, MIN_PHYSICS_FIDELITY, MAX_PHYSICS_FIDELITY, self.fidelity);
    }

    /// Clamp both ends into [MIN_MASS, MAX_MASS]; a reversed range is reordered
    pub fn set_mass_range(&mut self, min: f64, max: f64) {
        let min = clamp_or(min, MIN_MASS, MAX_MASS, self.min_mass);
        let max = clamp_or(max, MIN_MASS, MAX_MASS, self.max_mass);
        self.min_mass = min.min(max);
        self.max_mass = min.max(max);
    }

    /// Derive border extents from the framebuffer size; a degenerate size keeps
    /// the previous extents
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.aspect_ratio = width as f64 / height as f64;
        self.border = DVec2::new(self.aspect_ratio, 1.0);
    }

    /// Map a pixel position (origin top-left) into world space
    pub fn cursor_to_world(&self, px: f64, py: f64, width: u32, height: u32) -> DVec2 {
        if width == 0 || height == 0 {
            return self.cursor.position;
        }
        DVec2::new(
            self.border.x * (2.0 * px / width as f64 - 1.0),
            self.border.y * (1.0 - 2.0 * py / height as f64),
        )
    }
}

/// Clamp into `[lo, hi]`, keeping `fallback` for NaN input
fn clamp_or(value: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(lo, hi)
    }
}
