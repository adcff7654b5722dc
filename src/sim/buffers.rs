//! Four rotating body buffers
//!
//! Each frame one slot is the stable render buffer, one the previous render
//! buffer (kept for interpolation), one the pass-1 -> pass-2 intermediate and
//! one the in-flight target written by pass 2. Roles move by reassigning slot
//! indices, never by copying bodies.
//!
//! Rotation at the frame boundary:
//! - previous <- render
//! - render <- in-flight (the newest physics output)
//! - in-flight <- previous (the oldest data, free to overwrite)
//! - intermediate keeps its slot

use serde::Serialize;

use super::body::Body;
use crate::consts::MAX_BODIES;
use crate::error::{Result, SimError};

/// Slot index assigned to each role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Roles {
    pub previous: usize,
    pub render: usize,
    pub intermediate: usize,
    pub in_flight: usize,
}

impl Default for Roles {
    fn default() -> Self {
        Self {
            previous: 0,
            render: 1,
            intermediate: 2,
            in_flight: 3,
        }
    }
}

impl Roles {
    pub fn rotated(self) -> Self {
        Self {
            previous: self.render,
            render: self.in_flight,
            intermediate: self.intermediate,
            in_flight: self.previous,
        }
    }

    /// True when the four roles name four different slots
    pub fn is_disjoint(&self) -> bool {
        let mut seen = [false; 4];
        for slot in [self.previous, self.render, self.intermediate, self.in_flight] {
            if slot >= 4 || seen[slot] {
                return false;
            }
            seen[slot] = true;
        }
        true
    }
}

const PREVIOUS: usize = 0;
const RENDER: usize = 1;
const INTERMEDIATE: usize = 2;
const IN_FLIGHT: usize = 3;

/// Buffers are stored in role order; `roles` tracks which physical slot
/// each one started as.
#[derive(Debug, Clone)]
pub struct BufferSet {
    slots: [Vec<Body>; 4],
    roles: Roles,
}

impl BufferSet {
    /// Every slot starts as a copy of `bodies` (truncated to `MAX_BODIES`)
    pub fn with_bodies(bodies: &[Body]) -> Self {
        let bodies = &bodies[..bodies.len().min(MAX_BODIES)];
        let slot = || {
            let mut buffer = Vec::with_capacity(MAX_BODIES);
            buffer.extend_from_slice(bodies);
            buffer
        };
        Self {
            slots: [slot(), slot(), slot(), slot()],
            roles: Roles::default(),
        }
    }

    /// Adopt four prepared buffers, in slot order; all must hold the same
    /// number of bodies, at most `MAX_BODIES`
    pub fn from_slots(slots: [Vec<Body>; 4]) -> Result<Self> {
        let expected = slots[0].len();
        SimError::check_len("body buffer", MAX_BODIES.min(expected), expected)?;
        for slot in &slots[1..] {
            SimError::check_len("body buffer", expected, slot.len())?;
        }
        Ok(Self {
            slots,
            roles: Roles::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.slots[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn roles(&self) -> Roles {
        self.roles
    }

    pub fn rotate(&mut self) {
        // [previous, render, intermediate, in_flight]
        //   -> [render, in_flight, intermediate, previous]
        self.slots.swap(PREVIOUS, RENDER);
        self.slots.swap(RENDER, IN_FLIGHT);
        self.roles = self.roles.rotated();
    }

    pub fn render(&self) -> &[Body] {
        &self.slots[RENDER]
    }

    pub fn previous(&self) -> &[Body] {
        &self.slots[PREVIOUS]
    }

    pub fn intermediate(&self) -> &[Body] {
        &self.slots[INTERMEDIATE]
    }

    pub fn in_flight(&self) -> &[Body] {
        &self.slots[IN_FLIGHT]
    }

    pub fn slot_lengths(&self) -> [usize; 4] {
        [
            self.slots[0].len(),
            self.slots[1].len(),
            self.slots[2].len(),
            self.slots[3].len(),
        ]
    }

    /// Shrink every slot to `len` bodies
    pub fn truncate(&mut self, len: usize) {
        for slot in &mut self.slots {
            slot.truncate(len);
        }
    }

    /// Append the same body to every slot; ignored at capacity
    pub fn push(&mut self, body: Body) -> bool {
        if self.len() >= MAX_BODIES {
            return false;
        }
        for slot in &mut self.slots {
            slot.push(body);
        }
        true
    }

    /// Borrow the render-facing and physics-facing roles at the same time
    pub fn split(&mut self) -> (RenderView<'_>, PassBuffers<'_>) {
        let [previous, render, intermediate, in_flight] = &mut self.slots;
        let render = render.as_slice();
        (
            RenderView {
                render,
                previous: previous.as_slice(),
            },
            PassBuffers {
                render,
                intermediate: intermediate.as_mut_slice(),
                in_flight: in_flight.as_mut_slice(),
                read_in_flight: false,
            },
        )
    }
}

/// What the renderer may read while physics runs
#[derive(Debug, Clone, Copy)]
pub struct RenderView<'a> {
    pub render: &'a [Body],
    pub previous: &'a [Body],
}

/// What the physics chain may touch for one frame
///
/// Pass 1 reads the stable render buffer on the first chain run. Once a run is
/// finalized, later runs in the same frame read the in-flight buffer, which
/// now holds the newest state.
#[derive(Debug)]
pub struct PassBuffers<'a> {
    render: &'a [Body],
    intermediate: &'a mut [Body],
    in_flight: &'a mut [Body],
    read_in_flight: bool,
}

impl<'a> PassBuffers<'a> {
    pub fn len(&self) -> usize {
        self.intermediate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intermediate.is_empty()
    }

    /// Pass-1 source and target
    pub fn force_pass(&mut self) -> (&[Body], &mut [Body]) {
        let source: &[Body] = if self.read_in_flight {
            &*self.in_flight
        } else {
            self.render
        };
        (source, &mut *self.intermediate)
    }

    /// Pass-2 source and target
    pub fn collision_pass(&mut self) -> (&[Body], &mut [Body]) {
        (&*self.intermediate, &mut *self.in_flight)
    }

    /// Output of pass 1, read by the index rebuild
    pub fn intermediate(&self) -> &[Body] {
        self.intermediate
    }

    /// Repoint the pass-1 source at the freshly written in-flight buffer
    pub fn finalize(&mut self) {
        self.read_in_flight = true;
    }
}
