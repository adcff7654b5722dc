//! Gravity Sandbox - real-time simulation core of a 2D particle sandbox
//!
//! Core modules:
//! - `sim`: bodies, spatial index, time stepping, the two physics passes and
//!   the rotating buffer state machine
//! - `schedule`: task graph, barriers and the per-frame scheduler
//! - `platform`: window/input and render ports plus a headless shim
//! - `settings`: startup configuration

pub mod error;
pub mod platform;
pub mod schedule;
pub mod settings;
pub mod sim;

pub use error::{Result, SimError};
pub use settings::Settings;

use glam::DVec2;

/// Simulation constants
pub mod consts {
    /// Capacity of every body buffer
    pub const MAX_BODIES: usize = 1000;
    pub const MIN_BODIES: usize = 0;
    pub const DEFAULT_BODIES: usize = 10;

    /// Body mass bounds (also the bounds of the variable-mass range)
    pub const DEFAULT_MASS: f64 = 1.0;
    pub const MIN_MASS: f64 = 0.5;
    pub const MAX_MASS: f64 = 2.0;
    /// Body radius = mass * MASS_TO_RADIUS
    pub const MASS_TO_RADIUS: f64 = 0.01;

    pub const DEFAULT_TIME_MULTIPLIER: f64 = 1.0;
    pub const MIN_TIME_MULTIPLIER: f64 = 0.125;
    pub const MAX_TIME_MULTIPLIER: f64 = 8.0;

    pub const DEFAULT_PHYSICS_FIDELITY: f64 = 0.625;
    pub const PHYSICS_FIDELITY_STEP: f64 = 0.0625;
    pub const MIN_PHYSICS_FIDELITY: f64 = 0.0;
    pub const MAX_PHYSICS_FIDELITY: f64 = 1.0;

    /// Contacts tracked per body in one collision pass
    pub const MAX_CONTACTS: usize = 24;
    /// Fraction of the rebound kept on impact (1 - collision loss)
    pub const COLLISION_PRESERVE: f64 = 0.8;

    /// Constant downward acceleration when down gravity is on
    pub const DOWN_GRAVITY_ACCELERATION: f64 = 1.0;
    /// Pairwise attraction constant (G)
    pub const MASS_GRAVITY_ACCELERATION: f64 = 0.02;
    /// Bodies farther apart than this do not attract each other
    pub const MASS_GRAVITY_RADIUS: f64 = 0.5;
    /// Up to this population relative gravity uses the direct O(n²) loop
    pub const BRUTE_FORCE_GRAVITY_LIMIT: usize = 10;
    pub const CURSOR_GRAVITY_ACCELERATION: f64 = 0.1;
    pub const CURSOR_BRAKING_ACCELERATION: f64 = 1.0;

    /// Largest wall-clock delta fed into one step (seconds)
    pub const MAX_TIME_DIFF: f64 = 0.1;
    /// Smallest wall-clock delta fed into one step (seconds)
    pub const MIN_TIME_DIFF: f64 = 1.0e-6;
    /// Floor applied when the damped step would drop to zero or below
    pub const MIN_TIME_DIFF_SCALE: f64 = 0.5;
    /// Smoothing factor of the measured physics updates per frame
    pub const TIME_STRICTNESS_UPDATE_ALPHA: f64 = 0.05;

    /// Spatial grid resolution and covered area (world units)
    pub const GRID_SIZE_X: usize = 64;
    pub const GRID_SIZE_Y: usize = 16;
    pub const GRID_AREA_X: f64 = 8.0;
    pub const GRID_AREA_Y: f64 = 2.0;
    pub const GRID_CELL_CAPACITY: usize = 48;

    /// Worker count bounds
    pub const MIN_CONCURRENCY: usize = 1;
    pub const MAX_CONCURRENCY: usize = 1024;
}

/// Kinetic energy of a point mass
#[inline]
pub fn kinetic_energy(mass: f64, velocity: DVec2) -> f64 {
    0.5 * mass * velocity.length_squared()
}

/// Contiguous range of worker `k` out of `total` over `count` items
#[inline]
pub fn worker_range(k: usize, total: usize, count: usize) -> std::ops::Range<usize> {
    let total = total.max(1);
    (k * count / total)..((k + 1) * count / total)
}
