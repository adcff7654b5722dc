//! Crate error type
//!
//! Steady-state operation has no recoverable errors: knobs are clamped and a
//! full grid cell drops the insertion. What remains are startup failures.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// Simulation logic ran before the worker layout was wired in
    #[error("simulation used before worker wiring completed")]
    NotWired,

    /// The state was wired for a different worker count than the scheduler runs
    #[error("state wired for {wired} workers, scheduler runs {scheduled}")]
    WorkerMismatch { wired: usize, scheduled: usize },

    /// The main-thread step was invoked from another thread
    #[error("main-thread step invoked from a foreign thread")]
    ForeignThread,

    /// Paired buffers must hold the same number of bodies
    #[error("{role} holds {actual} entries, expected {expected}")]
    BufferLengthMismatch {
        role: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("failed to read settings from {path}: {source}")]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    /// Length check shared by every paired-buffer constructor
    pub(crate) fn check_len(role: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(SimError::BufferLengthMismatch {
                role,
                expected,
                actual,
            })
        }
    }
}
