#![deny(warnings)]

//! Core world model for the orbital RTS simulation.
//!
//! This crate defines the bodies shared by the steering, economy and strategy
//! crates: ships, orbiting celestials, map layouts and the match
//! configuration, with validation helpers to guarantee basic invariants.

pub mod maps;

use nalgebra::Vector2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

pub use maps::{build_map, original_demo, two_planets, Bounds, GameMap, MapId};

/// World-space vector in au.
pub type Vec2 = Vector2<f64>;

/// Orbital angular speed per unit of centre radius, (au/s)/au.
pub const GRAVITY_PER_RADIUS: f64 = 0.05;
/// Weapon range of every ship, au.
pub const LAZER_RANGE: f64 = 200.0;
/// Collision radius of a ship, au.
pub const SHIP_RADIUS: f64 = 10.0;

/// Owner tag carried by every body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerId {
    /// The human side.
    Player,
    /// The scripted opponent.
    Enemy,
    /// Passive garrisons; killing them pays a bounty.
    Neutral,
    /// Nobody (e.g. an unclaimed rock).
    Unowned,
}

impl PlayerId {
    /// Players that run an economy and may be AI-controlled.
    pub fn is_active(self) -> bool {
        matches!(self, PlayerId::Player | PlayerId::Enemy)
    }

    /// The other active player, if any.
    pub fn opponent(self) -> Option<PlayerId> {
        match self {
            PlayerId::Player => Some(PlayerId::Enemy),
            PlayerId::Enemy => Some(PlayerId::Player),
            PlayerId::Neutral | PlayerId::Unowned => None,
        }
    }

    /// Whether ships owned by `self` shoot at ships owned by `other`.
    pub fn is_hostile_to(self, other: PlayerId) -> bool {
        self != other && self != PlayerId::Unowned && other != PlayerId::Unowned
    }
}

/// Stable handle into the celestial registry (an index into `&[Celestial]`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CelestialId(pub usize);

/// Kinematic state shared by ships and celestials.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Position in au, written by the integrator (ships) or orbit (celestials).
    pub position: Vec2,
    /// Velocity in au/s.
    pub velocity: Vec2,
    /// Collision radius in au (> 0).
    pub radius: f64,
    /// Owning player.
    pub player: PlayerId,
}

impl Body {
    /// A body at rest.
    pub fn stationary(position: Vec2, radius: f64, player: PlayerId) -> Self {
        Self {
            position,
            velocity: Vec2::zeros(),
            radius,
            player,
        }
    }

    /// Distance from this body's centre to `point`.
    pub fn distance_to(&self, point: &Vec2) -> f64 {
        (self.position - point).norm()
    }
}

/// A steerable unit: a body with an engine heading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    pub body: Body,
    /// Heading in radians, measured from +x towards +y.
    pub rotation: f64,
}

impl Ship {
    pub fn new(position: Vec2, velocity: Vec2, rotation: f64, player: PlayerId) -> Self {
        Self {
            body: Body {
                position,
                velocity,
                radius: SHIP_RADIUS,
                player,
            },
            rotation,
        }
    }

    /// Unit vector along the engine heading.
    pub fn heading(&self) -> Vec2 {
        Vec2::new(self.rotation.cos(), self.rotation.sin())
    }
}

/// Circular orbit of a celestial around another one.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Orbit {
    /// Body being orbited; must precede the orbiting body in the registry.
    pub center: CelestialId,
    /// Orbit radius in au (> 0).
    pub radius: f64,
    /// Current phase in radians.
    pub angle: f64,
    pub clockwise: bool,
}

impl Orbit {
    fn direction(&self) -> f64 {
        if self.clockwise {
            -1.0
        } else {
            1.0
        }
    }

    /// Angular speed (rad/s, unsigned) around a centre of `center_radius`.
    pub fn angular_speed(&self, center_radius: f64) -> f64 {
        if self.radius <= 0.0 {
            return 0.0;
        }
        GRAVITY_PER_RADIUS * center_radius / self.radius
    }

    /// Offset from the centre at phase `angle`.
    pub fn offset(&self, angle: f64) -> Vec2 {
        Vec2::new(self.radius * angle.sin(), self.radius * angle.cos())
    }

    /// Velocity relative to the centre at phase `angle`.
    fn relative_velocity(&self, angle: f64, center_radius: f64) -> Vec2 {
        let rate = self.direction() * self.angular_speed(center_radius);
        Vec2::new(angle.cos(), -angle.sin()) * (self.radius * rate)
    }

    /// Phase after `dt` seconds around a centre of `center_radius`.
    pub fn angle_after(&self, dt: f64, center_radius: f64) -> f64 {
        self.angle + self.direction() * dt * self.angular_speed(center_radius)
    }
}

/// A planet or moon. Position and velocity are derived from `orbit` when set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Celestial {
    pub body: Body,
    pub orbit: Option<Orbit>,
}

impl Celestial {
    /// A celestial fixed in place.
    pub fn fixed(position: Vec2, radius: f64, player: PlayerId) -> Self {
        Self {
            body: Body::stationary(position, radius, player),
            orbit: None,
        }
    }

    /// An orbiting celestial; placed on its orbit by [`update_celestials`].
    pub fn orbiting(orbit: Orbit, radius: f64, player: PlayerId) -> Self {
        Self {
            body: Body::stationary(Vec2::zeros(), radius, player),
            orbit: Some(orbit),
        }
    }
}

/// Advance every orbiting celestial by `dt` and recompute its position and
/// velocity. Centres precede their satellites, so one in-order pass sees
/// up-to-date parents.
pub fn update_celestials(celestials: &mut [Celestial], dt: f64) {
    for i in 0..celestials.len() {
        let Some(mut orbit) = celestials[i].orbit else {
            continue;
        };
        let (center_position, center_velocity, center_radius) = match celestials
            .get(orbit.center.0)
        {
            Some(c) if orbit.center.0 < i => (c.body.position, c.body.velocity, c.body.radius),
            _ => {
                debug!(index = i, center = orbit.center.0, "skipping orbit with invalid centre");
                continue;
            }
        };
        orbit.angle = orbit.angle_after(dt, center_radius);
        let celestial = &mut celestials[i];
        celestial.body.position = center_position + orbit.offset(orbit.angle);
        celestial.body.velocity =
            center_velocity + orbit.relative_velocity(orbit.angle, center_radius);
        celestial.orbit = Some(orbit);
    }
}

/// Forecast failures.
#[derive(Debug, Error, PartialEq)]
pub enum ForecastError {
    /// Handle does not name a celestial.
    #[error("unknown celestial {0:?}")]
    UnknownCelestial(CelestialId),
    /// The orbit's centre is itself orbiting; nested orbits are not extrapolated.
    #[error("celestial {0:?} orbits a moving centre")]
    MovingCenter(CelestialId),
}

/// Predicted position of celestial `id` after `dt` seconds.
///
/// Fixed bodies stay put; bodies orbiting a fixed centre are extrapolated
/// analytically. Orbits around a moving centre are rejected.
pub fn forecast_position(
    celestials: &[Celestial],
    id: CelestialId,
    dt: f64,
) -> Result<Vec2, ForecastError> {
    let celestial = celestials
        .get(id.0)
        .ok_or(ForecastError::UnknownCelestial(id))?;
    let Some(orbit) = celestial.orbit else {
        return Ok(celestial.body.position);
    };
    let center = celestials
        .get(orbit.center.0)
        .ok_or(ForecastError::UnknownCelestial(orbit.center))?;
    if center.orbit.is_some() {
        return Err(ForecastError::MovingCenter(id));
    }
    let angle = orbit.angle_after(dt, center.body.radius);
    Ok(center.body.position + orbit.offset(angle))
}

/// First celestial owned by `player`.
pub fn find_home(celestials: &[Celestial], player: PlayerId) -> Option<CelestialId> {
    celestials
        .iter()
        .position(|c| c.body.player == player)
        .map(CelestialId)
}

/// Uniform random point in the disk of `radius` around `center`.
pub fn random_radial_point<R: Rng + ?Sized>(center: &Vec2, radius: f64, rng: &mut R) -> Vec2 {
    let r = radius * rng.gen::<f64>().sqrt();
    let a = TAU * rng.gen::<f64>();
    center + Vec2::new(r * a.cos(), r * a.sin())
}

/// AI strength of a scripted player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl FromStr for Difficulty {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(ValidationError::UnknownName(s.to_string())),
        }
    }
}

/// Match configuration parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for deterministic RNG.
    pub rng_seed: u64,
    /// Map layout.
    pub map: MapId,
    /// Difficulty of the enemy AI.
    pub enemy_ai: Difficulty,
    /// AI for the player's side; `None` leaves its ships to external commands.
    pub player_ai: Option<Difficulty>,
    /// Income multiplier of the player.
    pub player_bonus: f64,
    /// Income multiplier of the enemy.
    pub enemy_bonus: f64,
    /// Seconds per frame.
    pub frame_dt: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rng_seed: 42,
            map: MapId::OriginalDemo,
            enemy_ai: Difficulty::Medium,
            player_ai: None,
            player_bonus: 1.0,
            enemy_bonus: 1.0,
            frame_dt: 1.0 / 60.0,
        }
    }
}

impl SimConfig {
    /// Income bonus of an active player (1 for anyone else).
    pub fn bonus(&self, player: PlayerId) -> f64 {
        match player {
            PlayerId::Player => self.player_bonus,
            PlayerId::Enemy => self.enemy_bonus,
            PlayerId::Neutral | PlayerId::Unowned => 1.0,
        }
    }

    /// AI difficulty driving `player`, if scripted.
    pub fn ai(&self, player: PlayerId) -> Option<Difficulty> {
        match player {
            PlayerId::Player => self.player_ai,
            PlayerId::Enemy => Some(self.enemy_ai),
            PlayerId::Neutral | PlayerId::Unowned => None,
        }
    }
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Numeric field must be finite.
    #[error("non-finite numeric value encountered")]
    NonFinite,
    /// Radii must be strictly positive.
    #[error("celestial {0} has a non-positive radius")]
    NonPositiveRadius(usize),
    /// An orbit must reference an earlier celestial.
    #[error("celestial {index} orbits {center}, which does not precede it")]
    OrbitCenterOrder { index: usize, center: usize },
    /// Every active player needs a home celestial.
    #[error("no home celestial for {0:?}")]
    MissingHome(PlayerId),
    /// Income bonus must be finite and > 0.
    #[error("invalid income bonus {0}")]
    InvalidBonus(f64),
    /// Frame time must be finite and > 0.
    #[error("invalid frame time {0}")]
    InvalidFrameTime(f64),
    /// Unrecognised map or difficulty name.
    #[error("unknown name: {0}")]
    UnknownName(String),
}

/// Validate a celestial registry: radii, orbit ordering and finiteness.
pub fn validate_celestials(celestials: &[Celestial]) -> Result<(), ValidationError> {
    for (index, c) in celestials.iter().enumerate() {
        if !(c.body.position.x.is_finite() && c.body.position.y.is_finite()) {
            return Err(ValidationError::NonFinite);
        }
        if c.body.radius <= 0.0 {
            return Err(ValidationError::NonPositiveRadius(index));
        }
        if let Some(orbit) = &c.orbit {
            if !(orbit.radius.is_finite() && orbit.angle.is_finite()) {
                return Err(ValidationError::NonFinite);
            }
            if orbit.center.0 >= index {
                return Err(ValidationError::OrbitCenterOrder {
                    index,
                    center: orbit.center.0,
                });
            }
        }
    }
    Ok(())
}

/// Validate a map, including that both active players have a home.
pub fn validate_map(map: &GameMap) -> Result<(), ValidationError> {
    validate_celestials(&map.celestials)?;
    for player in [PlayerId::Player, PlayerId::Enemy] {
        if find_home(&map.celestials, player).is_none() {
            return Err(ValidationError::MissingHome(player));
        }
    }
    Ok(())
}

/// Validate configuration fields.
pub fn validate_config(config: &SimConfig) -> Result<(), ValidationError> {
    for bonus in [config.player_bonus, config.enemy_bonus] {
        if !(bonus.is_finite() && bonus > 0.0) {
            return Err(ValidationError::InvalidBonus(bonus));
        }
    }
    if !(config.frame_dt.is_finite() && config.frame_dt > 0.0) {
        return Err(ValidationError::InvalidFrameTime(config.frame_dt));
    }
    Ok(())
}
