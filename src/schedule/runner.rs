//! Frame scheduler
//!
//! One frame:
//! 1. main step on the calling thread (input, rotation, resizing, idle budget)
//! 2. renderer on the calling thread, physics chain on a sibling thread
//! 3. the chain repeats while the renderer is still busy, up to a limit
//! 4. the physics thread idles for the energy-saving budget

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use serde::{Deserialize, Serialize};

use super::barrier::PassBarrier;
use super::energy::EnergySaver;
use super::graph::{Stage, Task, TaskGraph};
use super::predict::{ExecutionPredictor, PerfTimer};
use crate::error::{Result, SimError};
use crate::platform::{RenderSink, WindowPort};
use crate::sim::{PassSummary, PhysicsFrame, SimulationState, WorkerLayout};

pub const DEFAULT_MAX_PHYSICS_RUNS: usize = 4;
pub const MAX_PHYSICS_RUNS: usize = 16;

/// Per-frame statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    pub frame: u64,
    /// Physics chain runs completed this frame
    pub physics_runs: usize,
    pub population: usize,
    /// Total kinetic energy of the published render buffer
    pub kinetic_energy: f64,
    /// Last step emitted by the time-step controller
    pub step: f64,
    pub strictness: f64,
    pub idle_seconds: f64,
    pub grid_entries: usize,
    pub dropped_insertions: usize,
    /// Mean duration of one chain run
    pub physics_seconds: f64,
    /// Frame duration without idling
    pub frame_seconds: f64,
}

struct ChainOutcome {
    runs: usize,
    physics_seconds: f64,
    idle_seconds: f64,
    summary: PassSummary,
}

pub struct FrameScheduler {
    graph: TaskGraph,
    pool: rayon::ThreadPool,
    /// One per parallel stage of the physics chain, in order
    barriers: Vec<PassBarrier>,
    predictor: ExecutionPredictor,
    saver: EnergySaver,
    max_physics_runs: usize,
}

impl FrameScheduler {
    pub fn new(workers: usize, max_physics_runs: usize) -> Result<Self> {
        let graph = TaskGraph::for_workers(workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(graph.workers())
            .thread_name(|i| format!("physics-{i}"))
            .build()?;
        let barriers = graph
            .physics_chain()
            .iter()
            .filter_map(|stage| match stage {
                Stage::Parallel(tasks) => Some(PassBarrier::new(tasks.len())),
                Stage::Sequential(_) => None,
            })
            .collect();
        log::info!(
            "scheduler: {} workers, up to {} physics runs per frame",
            graph.workers(),
            max_physics_runs.clamp(1, MAX_PHYSICS_RUNS)
        );
        Ok(Self {
            graph,
            pool,
            barriers,
            predictor: ExecutionPredictor::default(),
            saver: EnergySaver::new(),
            max_physics_runs: max_physics_runs.clamp(1, MAX_PHYSICS_RUNS),
        })
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn predictor(&self) -> &ExecutionPredictor {
        &self.predictor
    }

    /// Layout to wire a state driven by this scheduler from the calling thread
    pub fn layout(&self) -> WorkerLayout {
        WorkerLayout::on_current_thread(self.graph.workers())
    }

    /// Completed generations of each pass barrier
    pub fn barrier_generations(&self) -> Vec<u64> {
        self.barriers.iter().map(PassBarrier::generation).collect()
    }

    pub fn run_frame(
        &mut self,
        state: &mut SimulationState,
        window: &mut dyn WindowPort,
        renderer: &mut dyn RenderSink,
    ) -> Result<FrameStats> {
        let wired = state.layout()?.workers;
        if wired != self.graph.workers() {
            return Err(SimError::WorkerMismatch {
                wired,
                scheduled: self.graph.workers(),
            });
        }

        let frame_timer = PerfTimer::start();
        for task in self.graph.main_stage().tasks() {
            match task {
                Task::MainThreadStep => state.main_step(window, &self.predictor, &self.saver)?,
                other => log::warn!("{other:?} cannot run on the main stage"),
            }
        }

        let (render, physics) = state.split_frame()?;
        let rendering = AtomicBool::new(true);
        let graph = &self.graph;
        let pool = &self.pool;
        let barriers = self.barriers.as_slice();
        let saver = &self.saver;
        let max_runs = self.max_physics_runs;

        let outcome = thread::scope(|s| {
            let rendering = &rendering;
            let chain = s.spawn(move || {
                let mut physics = physics;
                let mut runs = 0;
                let mut busy_seconds = 0.0;
                loop {
                    let timer = PerfTimer::start();
                    run_chain(&mut physics, graph, pool, barriers);
                    busy_seconds += timer.elapsed_secs();
                    runs += 1;
                    if runs >= max_runs || !rendering.load(Ordering::Acquire) {
                        break;
                    }
                }
                ChainOutcome {
                    runs,
                    physics_seconds: busy_seconds / runs as f64,
                    idle_seconds: saver.idle(),
                    summary: physics.summary(),
                }
            });

            renderer.render(&render);
            rendering.store(false, Ordering::Release);

            match chain.join() {
                Ok(outcome) => outcome,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        });

        let frame_seconds = (frame_timer.elapsed_secs() - outcome.idle_seconds).max(0.0);
        self.predictor.record_physics(outcome.physics_seconds);
        self.predictor.record_frame(frame_seconds);

        let stats = FrameStats {
            frame: state.frame(),
            physics_runs: outcome.runs,
            population: state.population(),
            kinetic_energy: state.total_kinetic_energy(),
            step: outcome.summary.step,
            strictness: state.strictness(),
            idle_seconds: outcome.idle_seconds,
            grid_entries: outcome.summary.grid_entries,
            dropped_insertions: outcome.summary.dropped_insertions,
            physics_seconds: outcome.physics_seconds,
            frame_seconds,
        };
        log::debug!(
            "frame {}: {} runs, {} bodies, step {:.6}, idle {:.4}s",
            stats.frame,
            stats.physics_runs,
            stats.population,
            stats.step,
            stats.idle_seconds
        );
        if stats.dropped_insertions > 0 {
            log::warn!(
                "frame {}: spatial index dropped {} insertions",
                stats.frame,
                stats.dropped_insertions
            );
        }
        Ok(stats)
    }

    /// Run frames until the state is asked to stop; returns the last frame's stats
    pub fn run(
        &mut self,
        state: &mut SimulationState,
        window: &mut dyn WindowPort,
        renderer: &mut dyn RenderSink,
    ) -> Result<Option<FrameStats>> {
        let mut last = None;
        while !state.should_stop() {
            last = Some(self.run_frame(state, window, renderer)?);
        }
        Ok(last)
    }
}

/// One pass-1 -> rebuild -> pass-2 -> finalize sequence
fn run_chain(
    physics: &mut PhysicsFrame<'_>,
    graph: &TaskGraph,
    pool: &rayon::ThreadPool,
    barriers: &[PassBarrier],
) {
    let mut current = None;
    let mut next_barrier = barriers.iter();
    for stage in graph.physics_chain() {
        match stage {
            Stage::Parallel(tasks) => {
                let Some(barrier) = next_barrier.next() else {
                    log::warn!("no barrier for parallel stage, skipping");
                    continue;
                };
                physics.run_workers(tasks, pool, barrier);
                current = Some(barrier);
            }
            Stage::Sequential(Task::BarrierNotifier(notifier)) => {
                match current.take() {
                    Some(barrier) if barrier.release() => physics.notify(*notifier),
                    _ => log::warn!("{notifier:?} skipped: workers did not all arrive"),
                }
            }
            Stage::Sequential(task) => log::warn!("{task:?} cannot run in the physics chain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{HeadlessWindow, InputEvent, Key, StatsSink};

    #[test]
    fn test_run_stops_at_frame_limit() {
        let mut scheduler = FrameScheduler::new(2, 1).unwrap();
        let mut state = SimulationState::new(11, 40);
        state.wire(scheduler.layout()).unwrap();
        let mut window = HeadlessWindow::new(640, 480).with_frame_limit(5);
        let mut sink = StatsSink::default();

        let last = scheduler.run(&mut state, &mut window, &mut sink).unwrap().unwrap();
        assert_eq!(last.frame, 5);
        assert_eq!(last.physics_runs, 1);
        assert_eq!(sink.frames, 5);
        assert_eq!(last.population, 40);
        assert_eq!(scheduler.barrier_generations(), vec![5, 5]);
        assert!(last.step > 0.0);
    }

    #[test]
    fn test_physics_runs_are_bounded() {
        struct SlowSink;
        impl RenderSink for SlowSink {
            fn render(&mut self, _frame: &crate::platform::RenderFrame<'_>) {
                thread::sleep(std::time::Duration::from_millis(30));
            }
        }

        let mut scheduler = FrameScheduler::new(1, 3).unwrap();
        let mut state = SimulationState::new(12, 5);
        state.wire(scheduler.layout()).unwrap();
        let mut window = HeadlessWindow::default();
        let stats = scheduler.run_frame(&mut state, &mut window, &mut SlowSink).unwrap();
        assert!((1..=3).contains(&stats.physics_runs));

        // The next frame's strictness reflects the extra runs
        let next = scheduler.run_frame(&mut state, &mut window, &mut SlowSink).unwrap();
        assert_eq!(state.last_physics_updates(), stats.physics_runs as u64);
        assert!(next.strictness <= 1.0);
    }

    #[test]
    fn test_close_key_stops_loop() {
        let mut scheduler = FrameScheduler::new(1, 1).unwrap();
        let mut state = SimulationState::new(13, 3);
        state.wire(scheduler.layout()).unwrap();
        let mut window = HeadlessWindow::default().with_event(2, InputEvent::Press(Key::Escape));
        let last = scheduler
            .run(&mut state, &mut window, &mut StatsSink::default())
            .unwrap()
            .unwrap();
        assert_eq!(last.frame, 3);
    }

    #[test]
    fn test_worker_count_must_match_scheduler() {
        let mut scheduler = FrameScheduler::new(2, 1).unwrap();
        let mut state = SimulationState::new(15, 40);
        state.set_down_gravity(true);
        let mut window = HeadlessWindow::new(640, 640);
        let mut sink = StatsSink::default();

        for workers in [4, 1] {
            state.wire(WorkerLayout::on_current_thread(workers)).unwrap();
            let result = scheduler.run_frame(&mut state, &mut window, &mut sink);
            assert!(
                matches!(result, Err(SimError::WorkerMismatch { wired, scheduled: 2 }) if wired == workers),
                "{result:?}"
            );
        }
        assert_eq!(window.frame(), 0);
        assert_eq!(state.frame(), 0);

        // Wired from the scheduler every body is simulated
        state.wire(scheduler.layout()).unwrap();
        for _ in 0..3 {
            scheduler.run_frame(&mut state, &mut window, &mut sink).unwrap();
        }
        assert_eq!(state.render_buffer().len(), 40);
        assert!(state.render_buffer().iter().all(|b| b.velocity != glam::DVec2::ZERO));
    }

    #[test]
    fn test_unwired_state_is_rejected() {
        let mut scheduler = FrameScheduler::new(1, 1).unwrap();
        let mut state = SimulationState::new(14, 3);
        let result = scheduler.run_frame(&mut state, &mut HeadlessWindow::default(), &mut StatsSink::default());
        assert!(matches!(result, Err(crate::SimError::NotWired)));
    }
}
