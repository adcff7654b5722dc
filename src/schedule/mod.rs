//! Cooperative frame scheduling
//!
//! - `graph`: task capabilities and the per-frame stage list
//! - `barrier`: generation-counted pass barriers
//! - `predict`: execution-time measurement
//! - `energy`: idle pacing
//! - `runner`: executes the graph each frame

pub mod barrier;
pub mod energy;
pub mod graph;
pub mod predict;
pub mod runner;

pub use barrier::PassBarrier;
pub use energy::EnergySaver;
pub use graph::{Notifier, Stage, Task, TaskGraph};
pub use predict::{ExecutionPredictor, PerfTimer};
pub use runner::{FrameScheduler, FrameStats};
