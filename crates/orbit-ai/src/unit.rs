//! Per-ship command state and the controller that turns it into engine
//! outputs every frame.

use crate::steering::{
    avoid_collisions, rotation_rate, target_acceleration, target_velocity, thrust,
};
use orbit_core::{random_radial_point, Body, Celestial, CelestialId, Ship, Vec2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::warn;

/// Radius of the disk patrol destinations are sampled from.
pub const PATROL_RADIUS: f64 = 50.0;
/// Distance at which a patrol destination counts as reached.
pub const PATROL_ARRIVAL_THRESHOLD: f64 = 5.0;
/// Orbit radius as a multiple of the celestial's radius.
pub const ORBIT_RADIUS_FACTOR: f64 = 1.0;
/// Orbit radius added on top of the scaled celestial radius.
pub const ORBIT_RADIUS_OFFSET: f64 = 40.0;
/// Band outside the orbit in which a ship switches to orbit tracking.
pub const ORBIT_THRESHOLD_OFFSET: f64 = 30.0;
/// Tangential speed of a ship in orbit, au/s.
pub const ORBIT_VELOCITY: f64 = 30.0;
/// Half-width of the random phase offset on orbit entry.
pub const ORBIT_PHASE_JITTER: f64 = PI / 8.0;
/// Accelerations below this magnitude leave the engine idle.
pub const ACCELERATION_THRESHOLD: f64 = 1.0;

/// What a ship is currently trying to do.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Wander around `objective`, flying to `destination` and resampling it
    /// on arrival.
    Patrol { objective: Vec2, destination: Vec2 },
    /// Circle `celestial`. The phase is `None` until the ship first enters
    /// the orbit band.
    Orbit {
        celestial: CelestialId,
        orbital_angle: Option<f64>,
    },
}

/// Engine outputs for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Steer {
    /// Forward acceleration, au/s/s (>= 0).
    pub thrust: f64,
    /// Signed turn rate, rad/s.
    pub rotation_rate: f64,
}

/// Radius at which ships orbit `celestial`.
pub fn orbital_radius(celestial: &Body) -> f64 {
    celestial.radius * ORBIT_RADIUS_FACTOR + ORBIT_RADIUS_OFFSET
}

/// Owns a ship's [`Command`] and computes its [`Steer`] each frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SteeringController {
    command: Command,
}

impl SteeringController {
    /// A controller patrolling around `objective`.
    pub fn new(objective: Vec2) -> Self {
        Self {
            command: Command::Patrol {
                objective,
                destination: objective,
            },
        }
    }

    /// A controller orbiting `celestial`.
    pub fn orbiting(celestial: CelestialId) -> Self {
        Self {
            command: Command::Orbit {
                celestial,
                orbital_angle: None,
            },
        }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Patrol around `objective`. Ignored while already patrolling within
    /// [`PATROL_RADIUS`] of it, so repeated orders do not reset the route.
    pub fn patrol(&mut self, objective: Vec2) {
        if let Command::Patrol {
            objective: current, ..
        } = &self.command
        {
            if (current - objective).norm() < PATROL_RADIUS {
                return;
            }
        }
        self.command = Command::Patrol {
            objective,
            destination: objective,
        };
    }

    /// Orbit `celestial`. Ignored when already orbiting it; a new celestial
    /// resets the orbital phase.
    pub fn orbit(&mut self, celestial: CelestialId) {
        if matches!(self.command, Command::Orbit { celestial: current, .. } if current == celestial)
        {
            return;
        }
        self.command = Command::Orbit {
            celestial,
            orbital_angle: None,
        };
    }

    /// Compute this frame's engine outputs for `ship`.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        dt: f64,
        ship: &Ship,
        celestials: &[Celestial],
        rng: &mut R,
    ) -> Steer {
        let position = ship.body.position;
        let desired = match &mut self.command {
            Command::Patrol {
                objective,
                destination,
            } => {
                if (*destination - position).norm() < PATROL_ARRIVAL_THRESHOLD {
                    *destination = random_radial_point(objective, PATROL_RADIUS, rng);
                }
                target_velocity(&(*destination - position))
            }
            Command::Orbit {
                celestial,
                orbital_angle,
            } => {
                let Some(target) = celestials.get(celestial.0) else {
                    warn!(celestial = celestial.0, "orbit command names an unknown celestial");
                    return Steer::default();
                };
                let body = &target.body;
                let radius = orbital_radius(body);
                let relative = body.position - position;
                let distance = relative.norm();
                if distance <= radius + ORBIT_THRESHOLD_OFFSET {
                    let angle = orbital_angle.get_or_insert_with(|| {
                        (-relative.y).atan2(-relative.x)
                            + rng.gen_range(-ORBIT_PHASE_JITTER..=ORBIT_PHASE_JITTER)
                    });
                    *angle += dt * ORBIT_VELOCITY / radius;
                    let (sin, cos) = angle.sin_cos();
                    let point = body.position + Vec2::new(cos, sin) * radius;
                    target_velocity(&(point - position))
                        + body.velocity
                        + Vec2::new(-sin, cos) * ORBIT_VELOCITY
                } else {
                    target_velocity(&(relative * ((distance - radius) / distance)))
                }
            }
        };

        let desired = avoid_collisions(
            &position,
            &ship.body.velocity,
            &desired,
            celestials.iter().map(|c| &c.body),
        );
        let acceleration = target_acceleration(dt, &ship.body.velocity, &desired);
        if acceleration.norm() < ACCELERATION_THRESHOLD {
            return Steer::default();
        }
        Steer {
            thrust: thrust(ship.rotation, &acceleration),
            rotation_rate: rotation_rate(dt, ship.rotation, &acceleration),
        }
    }
}

/// A friendly ship as seen by the strategy layer.
pub trait Unit {
    fn body(&self) -> &Body;
    fn controller_mut(&mut self) -> &mut SteeringController;
}
