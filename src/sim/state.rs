//! Simulation state and frame boundary
//!
//! `SimulationState` owns everything that survives a frame: the rotating
//! buffers, the spatial index, contact memory, the time-step controller and
//! the parameters. Once per frame the main thread runs [`SimulationState::main_step`];
//! afterwards [`SimulationState::split_frame`] hands the renderer and the
//! physics chain disjoint borrows for the rest of the frame.
//!
//! The state is built unwired. Until [`SimulationState::wire`] records the
//! worker layout, every entry point fails with [`SimError::NotWired`].

use std::ops::Range;
use std::thread::{self, ThreadId};
use std::time::Instant;

use rand::SeedableRng;
use rand_pcg::Pcg32;
use rayon::prelude::*;
use serde::Serialize;

use super::body::{Body, random_between};
use super::buffers::{BufferSet, PassBuffers};
use super::collision::{CollisionContext, ContactMemory, ContactSet, resolve_range};
use super::forces::{ForceContext, integrate_range};
use super::params::{CursorState, GravitySign, SimulationParameters};
use super::spatial::SpatialIndex;
use super::timestep::{StrictnessMeter, TimeStepController};
use crate::consts::*;
use crate::error::{Result, SimError};
use crate::platform::{Key, RenderFrame, WindowPort};
use crate::schedule::{EnergySaver, ExecutionPredictor, Notifier, PassBarrier, Task};
use crate::worker_range;

/// Worker layout recorded at wiring time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerLayout {
    /// Workers per physics pass
    pub workers: usize,
    /// The only thread allowed to run the main step
    pub main_thread: ThreadId,
}

impl WorkerLayout {
    /// Layout pinned to the calling thread
    pub fn on_current_thread(workers: usize) -> Self {
        Self {
            workers: workers.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
            main_thread: thread::current().id(),
        }
    }
}

/// Idle budget for one frame
///
/// The fidelity-derived minimum frame time is `(1 - fidelity)^3` of the
/// predicted frame; whatever the physics passes do not fill of it is idled.
pub fn idle_budget(fidelity: f64, predicted_frame: f64, predicted_physics: f64) -> f64 {
    let slack = (1.0 - fidelity.clamp(0.0, 1.0)).powi(3);
    (slack * predicted_frame - predicted_physics).max(0.0)
}

#[derive(Debug)]
pub struct SimulationState {
    params: SimulationParameters,
    buffers: BufferSet,
    index: SpatialIndex,
    contacts: ContactMemory,
    clock: TimeStepController,
    meter: StrictnessMeter,
    strictness: f64,
    /// Finalized physics runs since the last main step
    pending_updates: u64,
    last_updates: u64,
    rng: Pcg32,
    layout: Option<WorkerLayout>,
    stop: bool,
    frame: u64,
    idle_seconds: f64,
}

impl SimulationState {
    /// Unwired state seeded with `population` random bodies
    pub fn new(seed: u64, population: usize) -> Self {
        let mut state = Self::with_buffers(seed, BufferSet::with_bodies(&[]));
        state.params.set_population(population);
        state.apply_population();
        state
    }

    /// Unwired state holding exactly `bodies`
    pub fn with_bodies(seed: u64, bodies: &[Body]) -> Self {
        Self::with_buffers(seed, BufferSet::with_bodies(bodies))
    }

    /// Unwired state adopting four prepared buffers of equal length
    pub fn from_slots(seed: u64, slots: [Vec<Body>; 4]) -> Result<Self> {
        Ok(Self::with_buffers(seed, BufferSet::from_slots(slots)?))
    }

    fn with_buffers(seed: u64, buffers: BufferSet) -> Self {
        let mut params = SimulationParameters::default();
        params.population = buffers.len();
        let mut index = SpatialIndex::default();
        index.rebuild(buffers.render().iter().map(|b| b.position));
        Self {
            params,
            contacts: ContactMemory::new(buffers.len()),
            buffers,
            index,
            clock: TimeStepController::new(),
            meter: StrictnessMeter::default(),
            strictness: 1.0,
            pending_updates: 0,
            last_updates: 0,
            rng: Pcg32::seed_from_u64(seed),
            layout: None,
            stop: false,
            frame: 0,
            idle_seconds: 0.0,
        }
    }

    /// Record the worker layout; required before anything runs
    pub fn wire(&mut self, layout: WorkerLayout) -> Result<()> {
        if let Some(previous) = self.layout {
            log::warn!("rewiring simulation ({} -> {} workers)", previous.workers, layout.workers);
        }
        let layout = WorkerLayout {
            workers: layout.workers.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
            ..layout
        };
        log::info!(
            "simulation wired: {} workers per pass, main thread {:?}",
            layout.workers,
            layout.main_thread
        );
        self.layout = Some(layout);
        Ok(())
    }

    pub fn is_wired(&self) -> bool {
        self.layout.is_some()
    }

    /// Layout recorded by [`SimulationState::wire`]
    pub fn layout(&self) -> Result<WorkerLayout> {
        self.layout.ok_or(SimError::NotWired)
    }

    /// Frame boundary: rotate roles, latch input, resize, and set the idle budget
    pub fn main_step(
        &mut self,
        window: &mut dyn WindowPort,
        predictor: &ExecutionPredictor,
        saver: &EnergySaver,
    ) -> Result<()> {
        let layout = self.layout()?;
        if thread::current().id() != layout.main_thread {
            return Err(SimError::ForeignThread);
        }

        window.update();
        if window.should_close() || window.pressed_keys().contains(&Key::Escape) {
            log::info!("stop requested at frame {}", self.frame);
            self.stop = true;
        }

        self.buffers.rotate();
        self.frame += 1;
        self.last_updates = std::mem::take(&mut self.pending_updates);
        self.strictness = self.meter.update(self.last_updates);

        self.apply_keys(window);

        let (width, height) = window.framebuffer_size();
        self.params.set_viewport(width, height);
        self.apply_population();

        let pixel = window.cursor_position();
        let buttons = window.mouse_buttons();
        self.params.cursor = CursorState {
            position: self.params.cursor_to_world(pixel.x, pixel.y, width, height),
            pull: buttons.left,
            push: buttons.right,
            brake: buttons.middle,
        };

        self.idle_seconds = idle_budget(
            self.params.fidelity,
            predictor.frame_seconds(),
            predictor.physics_seconds(),
        );
        saver.set_idle_time(self.idle_seconds);
        Ok(())
    }

    fn apply_keys(&mut self, window: &dyn WindowPort) {
        let pressed = window.pressed_keys();
        let toggled = |a: Key, b: Key| pressed.contains(&a) || pressed.contains(&b);
        let params = &mut self.params;

        if toggled(Key::G, Key::Digit1) {
            params.down_gravity = !params.down_gravity;
            log::debug!("down gravity: {}", params.down_gravity);
        }
        if toggled(Key::R, Key::Digit2) {
            params.relative_gravity = !params.relative_gravity;
            log::debug!("relative gravity: {}", params.relative_gravity);
        }
        if toggled(Key::M, Key::Digit3) {
            params.variable_mass = !params.variable_mass;
            log::debug!("variable mass: {}", params.variable_mass);
        }
        if toggled(Key::B, Key::Digit4) {
            params.border_collision = !params.border_collision;
            log::debug!("border collision: {}", params.border_collision);
        }
        if toggled(Key::C, Key::Digit5) {
            params.object_collision = !params.object_collision;
            log::debug!("object collision: {}", params.object_collision);
        }
        if toggled(Key::N, Key::Digit6) {
            params.gravity_sign = params.gravity_sign.next();
            log::debug!("relative gravity sign: {:?}", params.gravity_sign);
        }
        if toggled(Key::V, Key::Digit7) {
            params.motion_blur = !params.motion_blur;
            log::debug!("motion blur: {}", params.motion_blur);
        }

        let held = |key: Key| window.pressed_or_repeated(key);
        let change = params.population / 11 + 1;
        if held(Key::Up) {
            params.set_population(params.population + change);
        }
        if held(Key::Down) {
            params.set_population(params.population.saturating_sub(change));
        }
        if held(Key::Left) {
            params.set_time_multiplier(params.time_multiplier * 0.5);
        }
        if held(Key::Right) {
            params.set_time_multiplier(params.time_multiplier * 2.0);
        }
        if held(Key::Minus) {
            params.set_fidelity(params.fidelity - PHYSICS_FIDELITY_STEP);
        }
        if held(Key::Equal) {
            params.set_fidelity(params.fidelity + PHYSICS_FIDELITY_STEP);
        }
    }

    /// Bring every buffer, the contact memory and the index to the requested
    /// population
    fn apply_population(&mut self) {
        let target = self.params.population;
        let current = self.buffers.len();
        if target < current {
            self.buffers.truncate(target);
            self.contacts.truncate(target);
            self.index
                .rebuild(self.buffers.render().iter().map(|b| b.position));
            log::debug!("population {current} -> {target} (index rebuilt)");
        } else if target > current {
            for _ in current..target {
                let mass = if self.params.variable_mass {
                    random_between(&mut self.rng, self.params.min_mass, self.params.max_mass)
                } else {
                    DEFAULT_MASS
                };
                let body = Body::random(&mut self.rng, mass, self.params.border);
                if !self.buffers.push(body) {
                    break;
                }
            }
            let len = self.buffers.len();
            self.contacts.extend_to(len);
            self.index
                .extend(current, self.buffers.render()[current..].iter().map(|b| b.position));
            self.params.population = len;
            log::debug!("population {current} -> {len}");
        }
    }

    /// Borrow the renderer's view and the physics chain for this frame
    pub fn split_frame(&mut self) -> Result<(RenderFrame<'_>, PhysicsFrame<'_>)> {
        let workers = self.layout()?.workers;
        let step = self.clock.last_step();
        let (view, passes) = self.buffers.split();
        let render = RenderFrame {
            frame: self.frame,
            bodies: view.render,
            previous: view.previous,
            params: &self.params,
        };
        let physics = PhysicsFrame {
            buffers: passes,
            index: &mut self.index,
            contacts: &mut self.contacts,
            params: &self.params,
            clock: &mut self.clock,
            strictness: self.strictness,
            updates: &mut self.pending_updates,
            workers,
            step,
        };
        Ok((render, physics))
    }

    pub fn should_stop(&self) -> bool {
        self.stop
    }

    pub fn request_stop(&mut self) {
        self.stop = true;
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn buffers(&self) -> &BufferSet {
        &self.buffers
    }

    pub fn render_buffer(&self) -> &[Body] {
        self.buffers.render()
    }

    pub fn previous_buffer(&self) -> &[Body] {
        self.buffers.previous()
    }

    /// Valid between frames only; the physics chain rebuilds it mid-frame
    pub fn spatial_index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn contacts(&self) -> &ContactMemory {
        &self.contacts
    }

    pub fn population(&self) -> usize {
        self.buffers.len()
    }

    pub fn strictness(&self) -> f64 {
        self.strictness
    }

    /// Step emitted by the most recent force pass
    pub fn last_step(&self) -> f64 {
        self.clock.last_step()
    }

    /// Physics runs finalized during the previous frame
    pub fn last_physics_updates(&self) -> u64 {
        self.last_updates
    }

    pub fn idle_seconds(&self) -> f64 {
        self.idle_seconds
    }

    pub fn total_kinetic_energy(&self) -> f64 {
        self.buffers
            .render()
            .iter()
            .map(|b| crate::kinetic_energy(b.mass, b.velocity))
            .sum()
    }

    /// Buffers follow at the next main step
    pub fn set_population(&mut self, count: usize) {
        self.params.set_population(count);
    }

    pub fn set_time_multiplier(&mut self, multiplier: f64) {
        self.params.set_time_multiplier(multiplier);
    }

    pub fn set_fidelity(&mut self, fidelity: f64) {
        self.params.set_fidelity(fidelity);
    }

    pub fn set_mass_range(&mut self, min: f64, max: f64) {
        self.params.set_mass_range(min, max);
    }

    pub fn set_down_gravity(&mut self, on: bool) {
        self.params.down_gravity = on;
    }

    pub fn set_relative_gravity(&mut self, on: bool) {
        self.params.relative_gravity = on;
    }

    pub fn set_relative_gravity_sign(&mut self, sign: GravitySign) {
        self.params.gravity_sign = sign;
    }

    pub fn set_variable_mass(&mut self, on: bool) {
        self.params.variable_mass = on;
    }

    pub fn set_border_collision(&mut self, on: bool) {
        self.params.border_collision = on;
    }

    pub fn set_object_collision(&mut self, on: bool) {
        self.params.object_collision = on;
    }

    pub fn set_motion_blur(&mut self, on: bool) {
        self.params.motion_blur = on;
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.params.set_viewport(width, height);
    }

    /// Overrides window input until the next main step
    pub fn set_cursor(&mut self, cursor: CursorState) {
        self.params.cursor = cursor;
    }
}

/// Snapshot of the physics-facing state for one frame
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PassSummary {
    pub step: f64,
    pub grid_entries: usize,
    pub dropped_insertions: usize,
}

/// The physics chain's borrows for one frame
///
/// Writes are confined to worker ranges split out of the target buffers, so
/// the parallel stages need no locks.
#[derive(Debug)]
pub struct PhysicsFrame<'a> {
    buffers: PassBuffers<'a>,
    index: &'a mut SpatialIndex,
    contacts: &'a mut ContactMemory,
    params: &'a SimulationParameters,
    clock: &'a mut TimeStepController,
    strictness: f64,
    updates: &'a mut u64,
    workers: usize,
    step: f64,
}

impl<'a> PhysicsFrame<'a> {
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn summary(&self) -> PassSummary {
        PassSummary {
            step: self.step,
            grid_entries: self.index.len(),
            dropped_insertions: self.index.dropped(),
        }
    }

    /// Run one parallel stage of worker tasks on `pool`
    ///
    /// Every worker arrives at `barrier` when its range is done.
    pub fn run_workers(&mut self, tasks: &[Task], pool: &rayon::ThreadPool, barrier: &PassBarrier) {
        let mut force = Vec::new();
        let mut collision = Vec::new();
        for task in tasks {
            match *task {
                Task::ForceWorker(k) => force.push(k),
                Task::CollisionWorker(k) => collision.push(k),
                other => log::warn!("{other:?} is not a worker task"),
            }
        }
        if !force.is_empty() {
            self.force_pass(&force, pool, barrier);
        }
        if !collision.is_empty() {
            self.collision_pass(&collision, pool, barrier);
        }
    }

    /// Single-threaded step between passes
    pub fn notify(&mut self, notifier: Notifier) {
        match notifier {
            Notifier::RebuildIndex => {
                self.index
                    .rebuild(self.buffers.intermediate().iter().map(|b| b.position));
                log::trace!(
                    "index rebuilt: {} entries, {} dropped",
                    self.index.len(),
                    self.index.dropped()
                );
            }
            Notifier::FinalizePass => {
                self.buffers.finalize();
                *self.updates += 1;
            }
        }
    }

    fn advance_clock(&mut self) -> f64 {
        self.step = self
            .clock
            .advance(Instant::now(), self.params.time_multiplier, self.strictness);
        self.step
    }

    fn force_pass(&mut self, workers: &[usize], pool: &rayon::ThreadPool, barrier: &PassBarrier) {
        let step = self.advance_clock();
        let ranges = self.ranges(workers);
        let params = self.params;
        let index: &SpatialIndex = &*self.index;
        let (source, target) = self.buffers.force_pass();
        let ctx = ForceContext {
            source,
            index,
            params,
            step,
        };
        let chunks = split_ranges(target, &ranges);
        pool.install(|| {
            ranges
                .par_iter()
                .zip(chunks)
                .for_each(|(range, chunk)| {
                    integrate_range(&ctx, range.start, chunk);
                    barrier.arrive();
                });
        });
    }

    fn collision_pass(&mut self, workers: &[usize], pool: &rayon::ThreadPool, barrier: &PassBarrier) {
        let ranges = self.ranges(workers);
        let params = self.params;

        if !params.object_collision {
            // Same integration as pass 1, reading the intermediate buffer
            let step = self.advance_clock();
            let index: &SpatialIndex = &*self.index;
            let memory = split_ranges(self.contacts.as_mut_slice(), &ranges);
            let (source, target) = self.buffers.collision_pass();
            let ctx = ForceContext {
                source,
                index,
                params,
                step,
            };
            let chunks = split_ranges(target, &ranges);
            pool.install(|| {
                ranges
                    .par_iter()
                    .zip(chunks)
                    .zip(memory)
                    .for_each(|((range, chunk), memory)| {
                        integrate_range(&ctx, range.start, chunk);
                        memory.iter_mut().for_each(ContactSet::clear);
                        barrier.arrive();
                    });
            });
            return;
        }

        let step = self.step;
        let index: &SpatialIndex = &*self.index;
        let memory = split_ranges(self.contacts.as_mut_slice(), &ranges);
        let (source, target) = self.buffers.collision_pass();
        let ctx = CollisionContext {
            source,
            index,
            params,
            step,
        };
        let chunks = split_ranges(target, &ranges);
        pool.install(|| {
            ranges
                .par_iter()
                .zip(chunks)
                .zip(memory)
                .for_each(|((range, chunk), memory)| {
                    resolve_range(&ctx, range.start, chunk, memory);
                    barrier.arrive();
                });
        });
    }

    /// Ascending, disjoint ranges of the given workers
    fn ranges(&self, workers: &[usize]) -> Vec<Range<usize>> {
        let len = self.buffers.len();
        let mut ids: Vec<usize> = workers.iter().copied().filter(|&k| k < self.workers).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter()
            .map(|k| worker_range(k, self.workers, len))
            .collect()
    }
}

/// Split `slice` into the given ascending, non-overlapping ranges
fn split_ranges<'s, T>(mut slice: &'s mut [T], ranges: &[Range<usize>]) -> Vec<&'s mut [T]> {
    let mut chunks = Vec::with_capacity(ranges.len());
    let mut consumed = 0;
    for range in ranges {
        let skip = range.start.saturating_sub(consumed).min(slice.len());
        let rest = std::mem::take(&mut slice).split_at_mut(skip).1;
        let take = range.len().min(rest.len());
        let (chunk, rest) = rest.split_at_mut(take);
        chunks.push(chunk);
        slice = rest;
        consumed = consumed.max(range.end);
    }
    chunks
}
