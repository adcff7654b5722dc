//! Simulated point bodies

use bytemuck::{Pod, Zeroable};
use glam::DVec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::consts::*;

/// A massed point body
///
/// `#[repr(C)]` and `Pod` so a whole buffer can be handed to a renderer as bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Pod, Zeroable)]
pub struct Body {
    pub mass: f64,
    pub position: DVec2,
    pub velocity: DVec2,
}

impl Default for Body {
    fn default() -> Self {
        Self::new(DEFAULT_MASS, DVec2::ZERO)
    }
}

impl Body {
    /// A body at rest
    pub fn new(mass: f64, position: DVec2) -> Self {
        Self {
            mass,
            position,
            velocity: DVec2::ZERO,
        }
    }

    pub fn with_velocity(mut self, velocity: DVec2) -> Self {
        self.velocity = velocity;
        self
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.mass * MASS_TO_RADIUS
    }

    /// Spawn a body at rest somewhere inside `border`, keeping a margin of its
    /// own radius on every side
    pub fn random<R: Rng>(rng: &mut R, mass: f64, border: DVec2) -> Self {
        let margin = mass * MASS_TO_RADIUS;
        let x = random_between(rng, -border.x + margin, border.x - margin);
        let y = random_between(rng, -border.y + margin, border.y - margin);
        Self::new(mass, DVec2::new(x, y))
    }
}

/// Uniform sample in `[lo, hi]`; the midpoint when the range is empty
pub fn random_between<R: Rng>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    if lo < hi {
        rng.random_range(lo..=hi)
    } else {
        (lo + hi) * 0.5
    }
}

/// Binary view of a buffer for GPU upload
pub fn as_bytes(bodies: &[Body]) -> &[u8] {
    bytemuck::cast_slice(bodies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_random_body_respects_margin() {
        let mut rng = Pcg32::seed_from_u64(7);
        let border = DVec2::new(1.5, 1.0);
        for _ in 0..500 {
            let body = Body::random(&mut rng, MAX_MASS, border);
            let limit = border - DVec2::splat(body.radius());
            assert!(body.position.x.abs() <= limit.x);
            assert!(body.position.y.abs() <= limit.y);
            assert_eq!(body.velocity, DVec2::ZERO);
        }
    }

    #[test]
    fn test_random_body_tiny_border_collapses_to_center() {
        let mut rng = Pcg32::seed_from_u64(1);
        let body = Body::random(&mut rng, MAX_MASS, DVec2::new(0.001, 1.0));
        assert_eq!(body.position.x, 0.0);
    }

    #[test]
    fn test_body_bytes_are_tightly_packed() {
        let bodies = [Body::default(); 3];
        assert_eq!(as_bytes(&bodies).len(), 3 * 5 * std::mem::size_of::<f64>());
    }
}
