//! Vector steering primitives.
//!
//! Pure functions turning a displacement into a target velocity, a velocity
//! error into a rate-limited acceleration, and an acceleration into the
//! rotation rate and forward thrust a ship's engine can deliver. All of them
//! are total: zero vectors and zero `dt` take explicit branches.

use orbit_core::{Body, Vec2};
use std::f64::consts::{PI, TAU};

/// Cap on commanded speed, au/s.
pub const MAX_TARGET_VELOCITY: f64 = 120.0;
/// Engine acceleration, au/s/s.
pub const ACCELERATION: f64 = 40.0;
/// Margin on the stopping profile (> 1) so ships do not overshoot.
pub const DECELERATION_SAFETY_FACTOR: f64 = 1.5;
/// Maximum turn rate, rad/s.
pub const ROTATION_RATE: f64 = 6.0;
/// Clearance kept from a body's surface, au.
pub const COLLISION_THRESHOLD: f64 = 20.0;
/// Lead time added to the avoidance horizon while the ship turns, s.
pub const COLLISION_REACTION_TIME: f64 = 1.0;

/// Direction of `v` in radians.
pub fn angle(v: &Vec2) -> f64 {
    v.y.atan2(v.x)
}

/// Wrap an angle into `(-π, π]`.
pub fn wrap_angle(a: f64) -> f64 {
    a - TAU * ((a - PI) / TAU).ceil()
}

/// 2D cross product (z component).
pub fn cross(a: &Vec2, b: &Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Rotate `v` counter-clockwise by `theta`.
pub fn rotate(v: &Vec2, theta: f64) -> Vec2 {
    let (sin, cos) = theta.sin_cos();
    Vec2::new(cos * v.x - sin * v.y, sin * v.x + cos * v.y)
}

/// Velocity that brings a ship to rest after travelling `delta`.
///
/// Minimum stopping distance at speed `v` is `v² / 2a`, so the speed is
/// `sqrt(2 a |delta|)`, reduced by the safety factor and capped.
pub fn target_velocity(delta: &Vec2) -> Vec2 {
    let length = delta.norm();
    if length == 0.0 {
        return Vec2::zeros();
    }
    let speed = ((2.0 * ACCELERATION * length).sqrt() / DECELERATION_SAFETY_FACTOR)
        .min(MAX_TARGET_VELOCITY);
    delta * (speed / length)
}

/// Acceleration towards `target_velocity`, limited to what reaches it in
/// `dt` and to [`ACCELERATION`].
pub fn target_acceleration(dt: f64, velocity: &Vec2, target_velocity: &Vec2) -> Vec2 {
    let delta = target_velocity - velocity;
    let length = delta.norm();
    if length == 0.0 {
        return Vec2::zeros();
    }
    let acceleration = if dt > 0.0 {
        (length / dt).min(ACCELERATION)
    } else {
        ACCELERATION
    };
    delta * (acceleration / length)
}

/// Signed turn rate bringing `rotation` onto the direction of
/// `target_acceleration`, limited to [`ROTATION_RATE`] and to the remaining
/// difference over `dt`.
pub fn rotation_rate(dt: f64, rotation: f64, target_acceleration: &Vec2) -> f64 {
    let difference = wrap_angle(angle(target_acceleration) - rotation);
    if difference == 0.0 {
        return 0.0;
    }
    let limit = if dt > 0.0 {
        ROTATION_RATE.min(difference.abs() / dt)
    } else {
        ROTATION_RATE
    };
    limit.copysign(difference)
}

/// Forward thrust: the projection of `target_acceleration` on the heading.
/// The engine cannot push backwards, so negative projections give zero.
pub fn thrust(rotation: f64, target_acceleration: &Vec2) -> f64 {
    let heading = Vec2::new(rotation.cos(), rotation.sin());
    heading.dot(target_acceleration).max(0.0)
}

struct Threat {
    time: f64,
    offset: Vec2,
    relative: Vec2,
    radius: f64,
    body_velocity: Vec2,
}

/// Deflect `desired` so the ship does not run into any of `bodies`.
///
/// Inside a body's clearance circle the result is an escape at full speed
/// straight away from it. Otherwise the earliest collision along the desired
/// relative velocity that falls within the ship's stopping distance is
/// avoided by turning that velocity (same speed) until it is tangent to the
/// clearance circle. One obstacle is handled per call.
pub fn avoid_collisions<'a, I>(position: &Vec2, velocity: &Vec2, desired: &Vec2, bodies: I) -> Vec2
where
    I: IntoIterator<Item = &'a Body>,
{
    let mut threat: Option<Threat> = None;
    for body in bodies {
        let offset = position - body.position;
        let relative = desired - body.velocity;
        let radius = body.radius + COLLISION_THRESHOLD;
        let c = offset.norm_squared() - radius * radius;
        if c < 0.0 {
            let distance = offset.norm();
            let away = if distance > 0.0 {
                offset / distance
            } else {
                Vec2::new(1.0, 0.0)
            };
            return body.velocity + away * MAX_TARGET_VELOCITY;
        }
        let a = relative.norm_squared();
        if a == 0.0 {
            continue;
        }
        let b = 2.0 * offset.dot(&relative);
        let discriminant = b * b - 4.0 * a * c;
        if discriminant < 0.0 {
            continue;
        }
        let time = (-b - discriminant.sqrt()) / (2.0 * a);
        if time < 0.0 {
            continue;
        }
        let speed = (velocity - body.velocity).norm();
        let horizon = DECELERATION_SAFETY_FACTOR * speed * speed / (2.0 * ACCELERATION)
            + speed * COLLISION_REACTION_TIME;
        if time * a.sqrt() > horizon {
            continue;
        }
        if threat.as_ref().map_or(true, |t| time < t.time) {
            threat = Some(Threat {
                time,
                offset,
                relative,
                radius,
                body_velocity: body.velocity,
            });
        }
    }

    let Some(threat) = threat else {
        return *desired;
    };
    let distance = threat.offset.norm();
    let tangent = (threat.radius / distance).min(1.0).asin();
    let cos = (-threat.offset).dot(&threat.relative) / (distance * threat.relative.norm());
    let current = cos.clamp(-1.0, 1.0).acos();
    let sign = if cross(&threat.offset, &threat.relative) <= 0.0 {
        1.0
    } else {
        -1.0
    };
    threat.body_velocity + rotate(&threat.relative, sign * (tangent - current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use orbit_core::PlayerId;
    use proptest::prelude::*;

    fn v(x: f64, y: f64) -> Vec2 {
        Vec2::new(x, y)
    }

    fn a(theta: f64) -> Vec2 {
        v(theta.cos(), theta.sin())
    }

    #[test]
    fn wrap_angle_half_open_range() {
        assert_abs_diff_eq!(wrap_angle(PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(-PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(TAU + 0.5), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(-TAU - 0.5), -0.5, epsilon = 1e-12);
    }

    #[test]
    fn target_velocity_destination_reached() {
        assert_eq!(target_velocity(&v(0.0, 0.0)), v(0.0, 0.0));
    }

    #[test]
    fn target_velocity_saturates_far_away() {
        assert_abs_diff_eq!(
            target_velocity(&v(0.0, -1000.0)),
            v(0.0, -MAX_TARGET_VELOCITY),
            epsilon = 1e-9
        );
    }

    #[test]
    fn target_velocity_low_speed_close_to_destination() {
        let target = target_velocity(&v(-3.0, 4.0));
        assert_abs_diff_eq!(
            target.norm(),
            (10.0 * ACCELERATION).sqrt() / DECELERATION_SAFETY_FACTOR,
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(target.normalize(), v(-0.6, 0.8), epsilon = 1e-9);
    }

    #[test]
    fn target_acceleration_cases() {
        assert_eq!(
            target_acceleration(0.2, &v(10.0, 20.0), &v(10.0, 20.0)),
            v(0.0, 0.0)
        );
        assert_abs_diff_eq!(
            target_acceleration(0.2, &v(10.0, 20.0), &v(9.0, 20.0)),
            v(-5.0, 0.0),
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(
            target_acceleration(0.01, &v(10.0, 20.0), &v(0.0, 20.0)),
            v(-ACCELERATION, 0.0),
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(
            target_acceleration(0.0, &v(0.0, 0.0), &v(0.0, 1.0)),
            v(0.0, ACCELERATION),
            epsilon = 1e-9
        );
    }

    #[test]
    fn rotation_rate_unclipped() {
        assert_eq!(rotation_rate(0.1, 0.0, &v(1.0, 0.0)), 0.0);
        assert_eq!(rotation_rate(0.1, -PI, &v(-1.0, 0.0)), 0.0);
        assert_abs_diff_eq!(
            rotation_rate(0.1, 0.02 - PI, &a(PI - 0.01)),
            -0.3,
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(
            rotation_rate(0.1, PI - 0.02, &a(0.01 - PI)),
            0.3,
            epsilon = 1e-9
        );
    }

    #[test]
    fn rotation_rate_clipped() {
        assert_eq!(rotation_rate(0.1, 0.0, &v(0.0, 1.0)), ROTATION_RATE);
        assert_eq!(rotation_rate(0.1, 0.0, &v(0.0, -1.0)), -ROTATION_RATE);
        assert_eq!(rotation_rate(0.0, 0.0, &v(0.0, -1.0)), -ROTATION_RATE);
    }

    #[test]
    fn thrust_projection() {
        assert_abs_diff_eq!(thrust(0.0, &v(10.0, 0.0)), 10.0, epsilon = 1e-9);
        assert_eq!(thrust(0.0, &v(-10.0, 0.0)), 0.0);
        assert_abs_diff_eq!(thrust(PI / 2.0, &v(-3.0, 2.0)), 2.0, epsilon = 1e-9);
    }

    fn planet() -> Body {
        Body::stationary(v(0.0, 0.0), 100.0, PlayerId::Neutral)
    }

    #[test]
    fn avoidance_ignores_clear_paths() {
        let desired = v(100.0, 0.0);
        // passes 300 au above the planet
        let out = avoid_collisions(&v(-500.0, 300.0), &desired, &desired, [&planet()]);
        assert_eq!(out, desired);
        // heading away from the planet
        let out = avoid_collisions(&v(500.0, 0.0), &desired, &desired, [&planet()]);
        assert_eq!(out, desired);
    }

    #[test]
    fn avoidance_ignores_distant_collisions() {
        let desired = v(10.0, 0.0);
        let out = avoid_collisions(&v(-1000.0, 0.0), &desired, &desired, [&planet()]);
        assert_eq!(out, desired);
    }

    #[test]
    fn avoidance_escapes_from_inside_clearance() {
        let out = avoid_collisions(&v(0.0, 110.0), &v(0.0, 0.0), &v(0.0, -50.0), [&planet()]);
        assert_abs_diff_eq!(out, v(0.0, MAX_TARGET_VELOCITY), epsilon = 1e-9);
    }

    #[test]
    fn avoidance_grazes_tangentially() {
        let desired = v(100.0, 0.0);
        let position = v(-200.0, 10.0);
        let out = avoid_collisions(&position, &desired, &desired, [&planet()]);
        assert_abs_diff_eq!(out.norm(), 100.0, epsilon = 1e-9);
        // passing above the centre keeps turning the same way (up)
        assert!(out.y > 0.0);
        // the deflected ray touches the clearance circle
        let offset = position;
        let closest = (offset - out * (offset.dot(&out) / out.norm_squared())).norm();
        assert_abs_diff_eq!(
            closest,
            planet().radius + COLLISION_THRESHOLD,
            epsilon = 1e-6
        );
    }

    #[test]
    fn avoidance_picks_earliest_threat() {
        let near = Body::stationary(v(0.0, 40.0), 100.0, PlayerId::Neutral);
        let far = Body::stationary(v(200.0, -40.0), 100.0, PlayerId::Neutral);
        let desired = v(120.0, 0.0);
        let out = avoid_collisions(&v(-250.0, 0.0), &desired, &desired, [&far, &near]);
        // the nearer body sits above the path, so the ship ducks below it
        assert!(out.y < 0.0);
    }

    proptest! {
        #[test]
        fn target_velocity_is_bounded(x in -5_000.0f64..5_000.0, y in -5_000.0f64..5_000.0) {
            let t = target_velocity(&v(x, y));
            prop_assert!(t.norm() <= MAX_TARGET_VELOCITY + 1e-9);
            prop_assert!(t.dot(&v(x, y)) >= 0.0);
        }

        #[test]
        fn rotation_rate_is_bounded(dt in 0.0f64..1.0, r in -10.0f64..10.0, theta in -10.0f64..10.0) {
            let rate = rotation_rate(dt, r, &a(theta));
            prop_assert!(rate.abs() <= ROTATION_RATE);
        }

        #[test]
        fn thrust_is_non_negative(r in -10.0f64..10.0, x in -100.0f64..100.0, y in -100.0f64..100.0) {
            let acc = v(x, y);
            let t = thrust(r, &acc);
            prop_assert!(t >= 0.0);
            let dot = r.cos() * x + r.sin() * y;
            if dot > 0.0 {
                prop_assert!((t - dot).abs() < 1e-9);
            }
        }
    }
}
