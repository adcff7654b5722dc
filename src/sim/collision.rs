//! Sticky-contact collision resolution (pass 2)
//!
//! Overlaps are detected against the pass-1 output through the spatial index.
//! A contact that already existed last frame is *continuing*: it gets no
//! impulse and no momentum blending, only positional correction. Without
//! this, bodies resting on each other would keep re-colliding and pump energy
//! into the pile.
//!
//! Per body: Free -> NewContact (impulse) -> RestingContact (correction only)
//! -> Free as soon as one frame sees no overlap.

use glam::DVec2;

use super::body::Body;
use super::forces::apply_border;
use super::params::SimulationParameters;
use super::spatial::SpatialIndex;
use crate::consts::*;

/// Sorted, bounded set of body indices a body is touching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContactSet {
    len: u8,
    indices: [u32; MAX_CONTACTS],
}

impl ContactSet {
    /// Build from indices already in ascending order; extra entries are ignored
    pub fn from_sorted<I>(indices: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut set = Self::default();
        for index in indices.into_iter().take(MAX_CONTACTS) {
            set.indices[set.len as usize] = index as u32;
            set.len += 1;
        }
        set
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.indices[..self.len as usize]
    }

    pub fn contains(&self, index: usize) -> bool {
        self.as_slice().binary_search(&(index as u32)).is_ok()
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Drop every index `>= bound`
    pub fn retain_below(&mut self, bound: usize) {
        // Sorted, so the survivors are a prefix
        let keep = self.as_slice().partition_point(|&index| (index as usize) < bound);
        self.len = keep as u8;
    }
}

/// Previous-frame contacts of every body, indexed like the body buffers
#[derive(Debug, Clone, Default)]
pub struct ContactMemory {
    sets: Vec<ContactSet>,
}

impl ContactMemory {
    pub fn new(len: usize) -> Self {
        Self {
            sets: vec![ContactSet::default(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn get(&self, body: usize) -> Option<&ContactSet> {
        self.sets.get(body)
    }

    /// Shrink to `len` bodies and forget contacts with removed bodies
    pub fn truncate(&mut self, len: usize) {
        self.sets.truncate(len);
        for set in &mut self.sets {
            set.retain_below(len);
        }
    }

    /// Grow to `len` bodies; new bodies start without contacts
    pub fn extend_to(&mut self, len: usize) {
        if len > self.sets.len() {
            self.sets.resize(len, ContactSet::default());
        }
    }

    pub fn clear(&mut self) {
        self.sets.iter_mut().for_each(ContactSet::clear);
    }

    pub fn as_mut_slice(&mut self) -> &mut [ContactSet] {
        &mut self.sets
    }
}

/// Everything one collision worker reads
#[derive(Debug, Clone, Copy)]
pub struct CollisionContext<'a> {
    /// Pass-1 output
    pub source: &'a [Body],
    /// Built from `source`
    pub index: &'a SpatialIndex,
    pub params: &'a SimulationParameters,
    /// Step the pass-1 bodies were advanced by
    pub step: f64,
}

#[derive(Debug, Clone, Copy)]
struct Contact {
    other: usize,
    /// Unit vector from the other body toward this one
    direction: DVec2,
    /// Center distance below which the two overlap
    threshold: f64,
}

/// Resolve bodies `[begin, begin + out.len())`; `memory` covers the same range
pub fn resolve_range(
    ctx: &CollisionContext<'_>,
    begin: usize,
    out: &mut [Body],
    memory: &mut [ContactSet],
) {
    let mut contacts = Vec::with_capacity(MAX_CONTACTS);
    for (offset, (target, remembered)) in out.iter_mut().zip(memory.iter_mut()).enumerate() {
        let i = begin + offset;
        let Some(&body) = ctx.source.get(i) else {
            break;
        };

        find_contacts(ctx, i, &body, &mut contacts);
        *target = if contacts.is_empty() {
            body
        } else {
            resolve_body(ctx, &body, &contacts, remembered)
        };
        *remembered = ContactSet::from_sorted(contacts.iter().map(|c| c.other));
        apply_border(target, ctx.params.border, ctx.params.border_collision);
    }
}

/// Overlapping neighbors of body `i`, ascending by index
fn find_contacts(ctx: &CollisionContext<'_>, i: usize, body: &Body, contacts: &mut Vec<Contact>) {
    contacts.clear();
    ctx.index
        .visit_radius(body.position, 2.0 * MAX_MASS * MASS_TO_RADIUS, |j| {
            if j == i {
                return false;
            }
            let Some(other) = ctx.source.get(j) else {
                return false;
            };
            let delta = body.position - other.position;
            let threshold = (body.mass + other.mass) * MASS_TO_RADIUS;
            if delta.length() < threshold {
                contacts.push(Contact {
                    other: j,
                    direction: contact_normal(delta, i, j),
                    threshold,
                });
            }
            contacts.len() >= MAX_CONTACTS
        });
    contacts.sort_unstable_by_key(|c| c.other);
}

/// Unit vector along `delta`; coincident bodies split along x by index order
fn contact_normal(delta: DVec2, i: usize, j: usize) -> DVec2 {
    match delta.try_normalize() {
        Some(normal) => normal,
        None if i < j => DVec2::NEG_X,
        None => DVec2::X,
    }
}

fn resolve_body(
    ctx: &CollisionContext<'_>,
    body: &Body,
    contacts: &[Contact],
    remembered: &ContactSet,
) -> Body {
    let mut momentum = body.velocity * body.mass;
    let mut shared_mass = body.mass;
    let mut rebound = DVec2::ZERO;
    let mut new_contacts = 0usize;
    for contact in contacts.iter().filter(|c| !remembered.contains(c.other)) {
        let other = &ctx.source[contact.other];
        momentum += other.velocity * other.mass;
        shared_mass += other.mass;
        let d = contact.direction;
        rebound += d * ((other.velocity.dot(d) - body.velocity.dot(d)) * 0.5);
        new_contacts += 1;
    }

    // Each side moves half the penetration, so the pair exactly separates
    let mut position = body.position;
    for contact in contacts {
        let delta = position - ctx.source[contact.other].position;
        let distance = delta.length();
        if distance < contact.threshold {
            let normal = delta.try_normalize().unwrap_or(contact.direction);
            position += normal * ((contact.threshold - distance) * 0.5);
        }
    }

    let velocity = if new_contacts > 0 {
        let shared = momentum / shared_mass;
        shared + rebound / new_contacts as f64 * 0.5 * COLLISION_PRESERVE
    } else if ctx.step > 0.0 {
        // Resting: motion is whatever pass 1 and the correction produced
        let previous = body.position - body.velocity * ctx.step;
        (position - previous) / ctx.step
    } else {
        body.velocity
    };

    Body {
        mass: body.mass,
        position,
        velocity,
    }
}
