//! Simulation core
//!
//! - Bodies live in four rotating buffers (`buffers`)
//! - Pass 1 integrates forces (`forces`), pass 2 resolves contacts (`collision`)
//! - Proximity queries go through a toroidal hash grid (`spatial`)
//! - `state` ties them together at the frame boundary

pub mod body;
pub mod buffers;
pub mod collision;
pub mod forces;
pub mod params;
pub mod spatial;
pub mod state;
pub mod timestep;

pub use body::Body;
pub use buffers::{BufferSet, PassBuffers, RenderView, Roles};
pub use collision::{CollisionContext, ContactMemory, ContactSet, resolve_range};
pub use forces::{ForceContext, apply_border, integrate_range};
pub use params::{CursorState, GravitySign, SimulationParameters};
pub use spatial::SpatialIndex;
pub use state::{PassSummary, PhysicsFrame, SimulationState, WorkerLayout, idle_budget};
pub use timestep::{StrictnessMeter, TimeStepController};
