//! Force integration pass
//!
//! Each worker owns a contiguous range of the target buffer and reads the
//! whole source buffer. Forces are evaluated from the source only, so the
//! result does not depend on how the population is partitioned.

use glam::DVec2;

use super::body::Body;
use super::params::SimulationParameters;
use super::spatial::SpatialIndex;
use crate::consts::*;

/// Everything one force-pass worker reads
#[derive(Debug, Clone, Copy)]
pub struct ForceContext<'a> {
    pub source: &'a [Body],
    pub index: &'a SpatialIndex,
    pub params: &'a SimulationParameters,
    pub step: f64,
}

/// Integrate bodies `[begin, begin + out.len())` of `ctx.source` into `out`
pub fn integrate_range(ctx: &ForceContext<'_>, begin: usize, out: &mut [Body]) {
    let gravity_scale = ctx.params.relative_gravity_scale();
    let relative = ctx.params.relative_gravity;
    for (offset, target) in out.iter_mut().enumerate() {
        let i = begin + offset;
        let Some(body) = ctx.source.get(i) else {
            break;
        };

        let mut acceleration = DVec2::ZERO;
        if relative {
            acceleration += pairwise_gravity(ctx, i) * gravity_scale;
        }
        acceleration.y -= ctx.params.down_acceleration();
        acceleration += cursor_force(
            ctx.params.cursor.position - body.position,
            ctx.params.cursor.gravity(),
        );

        let mut velocity = body.velocity + acceleration * ctx.step;
        if ctx.params.cursor.brake {
            velocity = brake(velocity, CURSOR_BRAKING_ACCELERATION * ctx.step);
        }

        *target = Body {
            mass: body.mass,
            position: body.position + velocity * ctx.step,
            velocity,
        };
        apply_border(target, ctx.params.border, ctx.params.border_collision);
    }
}

/// Unscaled attraction on body `i` from every other body within
/// `MASS_GRAVITY_RADIUS`
pub fn pairwise_gravity(ctx: &ForceContext<'_>, i: usize) -> DVec2 {
    let source = ctx.source;
    let origin = source[i].position;
    let mut total = DVec2::ZERO;
    let mut add = |j: usize| {
        if j == i {
            return;
        }
        let Some(other) = source.get(j) else {
            return;
        };
        total += inverse_square(other.position - origin, other.mass * MASS_GRAVITY_ACCELERATION, MASS_GRAVITY_RADIUS);
    };

    if source.len() > BRUTE_FORCE_GRAVITY_LIMIT {
        ctx.index.visit_radius(origin, MASS_GRAVITY_RADIUS, |j| {
            add(j);
            false
        });
    } else {
        (0..source.len()).for_each(add);
    }
    total
}

/// `strength / d²` along `delta`; zero at zero distance or beyond `radius`
#[inline]
fn inverse_square(delta: DVec2, strength: f64, radius: f64) -> DVec2 {
    let distance_sq = delta.length_squared();
    if distance_sq == 0.0 || distance_sq > radius * radius {
        return DVec2::ZERO;
    }
    delta / distance_sq.sqrt() * (strength / distance_sq)
}

/// Signed inverse-square pull toward the cursor (negative strength pushes)
#[inline]
pub fn cursor_force(delta: DVec2, strength: f64) -> DVec2 {
    if strength == 0.0 {
        return DVec2::ZERO;
    }
    inverse_square(delta, strength, f64::INFINITY)
}

/// Shrink each component's magnitude by `amount`, stopping at zero
#[inline]
pub fn brake(velocity: DVec2, amount: f64) -> DVec2 {
    let shrink = |v: f64| {
        let magnitude = v.abs() - amount;
        if magnitude <= 0.0 { 0.0 } else { magnitude.copysign(v) }
    };
    DVec2::new(shrink(velocity.x), shrink(velocity.y))
}

/// Keep a body inside `border`
///
/// Bouncing mirrors the overshoot past `border - radius` and reverses the
/// crossing velocity component with `COLLISION_PRESERVE` of its speed.
/// Otherwise the body re-enters from the opposite edge with its overshoot and
/// velocity unchanged.
pub fn apply_border(body: &mut Body, border: DVec2, bounce: bool) {
    if bounce {
        let limit = border - DVec2::splat(body.radius());
        bounce_axis(&mut body.position.x, &mut body.velocity.x, limit.x);
        bounce_axis(&mut body.position.y, &mut body.velocity.y, limit.y);
    } else {
        wrap_axis(&mut body.position.x, border.x);
        wrap_axis(&mut body.position.y, border.y);
    }
}

#[inline]
fn bounce_axis(position: &mut f64, velocity: &mut f64, limit: f64) {
    if *position < -limit {
        *position = -limit + (-limit - *position);
        *velocity = -*velocity * COLLISION_PRESERVE;
    }
    if *position > limit {
        *position = limit + (limit - *position);
        *velocity = -*velocity * COLLISION_PRESERVE;
    }
}

#[inline]
fn wrap_axis(position: &mut f64, border: f64) {
    if *position < -border {
        *position = border + (*position + border);
    }
    if *position > border {
        *position = -border + (*position - border);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::params::GravitySign;

    fn context<'a>(
        source: &'a [Body],
        index: &'a SpatialIndex,
        params: &'a SimulationParameters,
        step: f64,
    ) -> ForceContext<'a> {
        ForceContext {
            source,
            index,
            params,
            step,
        }
    }

    fn integrate(source: &[Body], params: &SimulationParameters, step: f64) -> Vec<Body> {
        let mut index = SpatialIndex::default();
        index.rebuild(source.iter().map(|b| b.position));
        let mut out = vec![Body::default(); source.len()];
        integrate_range(&context(source, &index, params, step), 0, &mut out);
        out
    }

    #[test]
    fn test_down_gravity_accelerates_downward() {
        let mut params = SimulationParameters::default();
        params.down_gravity = true;
        let out = integrate(&[Body::new(1.0, DVec2::ZERO)], &params, 0.1);
        assert!((out[0].velocity.y + 0.1).abs() < 1e-12);
        assert!((out[0].position.y + 0.01).abs() < 1e-12);
        assert_eq!(out[0].velocity.x, 0.0);
    }

    #[test]
    fn test_relative_gravity_sign_and_cutoff() {
        let bodies = [
            Body::new(1.0, DVec2::new(-0.1, 0.0)),
            Body::new(1.0, DVec2::new(0.1, 0.0)),
            Body::new(1.0, DVec2::new(0.9, 0.0)),
        ];
        let mut params = SimulationParameters::default();
        params.relative_gravity = true;
        let out = integrate(&bodies, &params, 0.01);
        // Body 0 is pulled right by body 1; body 2 is beyond the radius of both
        assert!(out[0].velocity.x > 0.0);
        assert!(out[1].velocity.x < 0.0);
        assert_eq!(out[2].velocity, DVec2::ZERO);

        params.gravity_sign = GravitySign::Repel;
        let out = integrate(&bodies, &params, 0.01);
        assert!(out[0].velocity.x < 0.0);

        params.gravity_sign = GravitySign::Neutral;
        let out = integrate(&bodies, &params, 0.01);
        assert_eq!(out[0].velocity, DVec2::ZERO);
    }

    #[test]
    fn test_grid_and_brute_force_gravity_agree() {
        let bodies: Vec<Body> = (0..BRUTE_FORCE_GRAVITY_LIMIT + 6)
            .map(|i| {
                let angle = i as f64 * 0.7;
                Body::new(1.0, DVec2::new(angle.cos(), angle.sin()) * (0.05 + 0.02 * i as f64))
            })
            .collect();
        let mut index = SpatialIndex::default();
        index.rebuild(bodies.iter().map(|b| b.position));
        let params = SimulationParameters::default();
        let ctx = context(&bodies, &index, &params, 0.01);
        for i in 0..bodies.len() {
            let grid = pairwise_gravity(&ctx, i);
            let direct: DVec2 = (0..bodies.len())
                .filter(|&j| j != i)
                .map(|j| {
                    inverse_square(
                        bodies[j].position - bodies[i].position,
                        bodies[j].mass * MASS_GRAVITY_ACCELERATION,
                        MASS_GRAVITY_RADIUS,
                    )
                })
                .sum();
            assert!((grid - direct).length() < 1e-9, "body {i}: {grid} vs {direct}");
        }
    }

    #[test]
    fn test_cursor_pull_and_push() {
        let mut params = SimulationParameters::default();
        params.cursor.position = DVec2::new(0.5, 0.0);
        params.cursor.pull = true;
        let body = [Body::new(1.0, DVec2::ZERO)];
        let pulled = integrate(&body, &params, 0.01);
        assert!((pulled[0].velocity.x - CURSOR_GRAVITY_ACCELERATION / 0.25 * 0.01).abs() < 1e-12);

        params.cursor.pull = false;
        params.cursor.push = true;
        let pushed = integrate(&body, &params, 0.01);
        assert!((pushed[0].velocity.x + pulled[0].velocity.x).abs() < 1e-12);
    }

    #[test]
    fn test_brake_never_overshoots() {
        let slowed = brake(DVec2::new(0.5, -0.05), 0.1);
        assert!((slowed.x - 0.4).abs() < 1e-12);
        assert_eq!(slowed.y, 0.0);
        let slowed = brake(DVec2::new(-0.3, 0.0), 0.1);
        assert!((slowed.x + 0.2).abs() < 1e-12);
        assert_eq!(slowed.y, 0.0);
    }

    #[test]
    fn test_border_bounce_mirrors_overshoot() {
        let border = DVec2::new(1.0, 1.0);
        let mut body = Body::new(1.0, DVec2::new(1.05, -0.2)).with_velocity(DVec2::new(2.0, -1.0));
        apply_border(&mut body, border, true);
        let limit = 1.0 - body.radius();
        let overshoot = 1.05 - limit;
        assert!((body.position.x - (limit - overshoot)).abs() < 1e-12);
        assert!((body.velocity.x + 2.0 * COLLISION_PRESERVE).abs() < 1e-12);
        assert_eq!(body.position.y, -0.2);
        assert_eq!(body.velocity.y, -1.0);

        let mut low = Body::new(2.0, DVec2::new(0.0, -1.1)).with_velocity(DVec2::new(0.0, -3.0));
        apply_border(&mut low, border, true);
        let limit = 1.0 - low.radius();
        assert!((low.position.y - (-limit + (1.1 - limit))).abs() < 1e-12);
        assert!((low.velocity.y - 3.0 * COLLISION_PRESERVE).abs() < 1e-12);
    }

    #[test]
    fn test_border_wrap_keeps_velocity() {
        let border = DVec2::new(2.0, 1.0);
        let velocity = DVec2::new(3.0, -4.0);
        let mut body = Body::new(1.0, DVec2::new(2.1, -1.25)).with_velocity(velocity);
        apply_border(&mut body, border, false);
        assert!((body.position.x - (-2.0 + 0.1)).abs() < 1e-12);
        assert!((body.position.y - (1.0 - 0.25)).abs() < 1e-12);
        assert_eq!(body.velocity, velocity);
    }

    #[test]
    fn test_partitioned_integration_matches_single_worker() {
        let bodies: Vec<Body> = (0..40)
            .map(|i| Body::new(1.0, DVec2::new(i as f64 * 0.03 - 0.6, (i % 7) as f64 * 0.05)))
            .collect();
        let mut params = SimulationParameters::default();
        params.relative_gravity = true;
        params.down_gravity = true;
        let mut index = SpatialIndex::default();
        index.rebuild(bodies.iter().map(|b| b.position));
        let ctx = context(&bodies, &index, &params, 0.005);

        let mut whole = vec![Body::default(); bodies.len()];
        integrate_range(&ctx, 0, &mut whole);

        let mut split = vec![Body::default(); bodies.len()];
        let (left, right) = split.split_at_mut(17);
        integrate_range(&ctx, 0, left);
        integrate_range(&ctx, 17, right);
        assert_eq!(whole, split);
    }
}
