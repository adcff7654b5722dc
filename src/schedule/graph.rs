//! Frame task graph
//!
//! Work is described as data: each unit is a [`Task`] capability and the
//! frame is an ordered list of [`Stage`]s. The runner interprets the graph;
//! nothing is dispatched through trait objects.

use serde::Serialize;

use crate::consts::{MAX_CONCURRENCY, MIN_CONCURRENCY};

/// Single-threaded step run between two parallel stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Notifier {
    /// Rebuild the spatial index from the pass-1 output
    RebuildIndex,
    /// Publish pass-2 output as the next pass-1 source and count the update
    FinalizePass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Task {
    /// Frame boundary work pinned to the main thread
    MainThreadStep,
    /// Force integration over worker `k`'s range
    ForceWorker(usize),
    /// Collision resolution over worker `k`'s range
    CollisionWorker(usize),
    BarrierNotifier(Notifier),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Stage {
    /// Members run concurrently; the stage ends when all have arrived
    Parallel(Vec<Task>),
    Sequential(Task),
}

impl Stage {
    pub fn tasks(&self) -> &[Task] {
        match self {
            Stage::Parallel(tasks) => tasks,
            Stage::Sequential(task) => std::slice::from_ref(task),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskGraph {
    workers: usize,
    /// Runs on the main thread before the frame forks
    main: Stage,
    /// Runs beside the renderer, possibly several times per frame
    physics: Vec<Stage>,
}

impl TaskGraph {
    /// Standard frame for `workers` workers per pass (clamped to [1, 1024])
    pub fn for_workers(workers: usize) -> Self {
        let workers = workers.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        Self {
            workers,
            main: Stage::Sequential(Task::MainThreadStep),
            physics: vec![
                Stage::Parallel((0..workers).map(Task::ForceWorker).collect()),
                Stage::Sequential(Task::BarrierNotifier(Notifier::RebuildIndex)),
                Stage::Parallel((0..workers).map(Task::CollisionWorker).collect()),
                Stage::Sequential(Task::BarrierNotifier(Notifier::FinalizePass)),
            ],
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn main_stage(&self) -> &Stage {
        &self.main
    }

    pub fn physics_chain(&self) -> &[Stage] {
        &self.physics
    }
}
