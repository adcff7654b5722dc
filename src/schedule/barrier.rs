//! Generation-counted pass barrier
//!
//! Workers of a parallel stage call [`PassBarrier::arrive`]; the notifier that
//! follows calls [`PassBarrier::release`], which only succeeds once every
//! worker arrived, and then opens the next generation.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug)]
pub struct PassBarrier {
    expected: usize,
    arrived: AtomicUsize,
    generation: AtomicU64,
}

impl PassBarrier {
    pub fn new(expected: usize) -> Self {
        Self {
            expected: expected.max(1),
            arrived: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn arrive(&self) {
        self.arrived.fetch_add(1, Ordering::AcqRel);
    }

    pub fn arrived(&self) -> usize {
        self.arrived.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.arrived() >= self.expected
    }

    /// Close the current generation if every worker arrived
    pub fn release(&self) -> bool {
        if self
            .arrived
            .compare_exchange(self.expected, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!(
                "barrier released early: {}/{} arrived",
                self.arrived(),
                self.expected
            );
            return false;
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Completed generations so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
