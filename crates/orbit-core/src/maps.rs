//! Built-in map layouts.

use crate::{update_celestials, Celestial, CelestialId, Orbit, PlayerId, ValidationError, Vec2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::str::FromStr;

/// Identifier of a built-in map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapId {
    /// One neutral planet with a player moon and an enemy moon.
    #[default]
    OriginalDemo,
    /// Two neutral planets, each with a home moon.
    TwoPlanets,
}

impl FromStr for MapId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original-demo" | "original" => Ok(MapId::OriginalDemo),
            "two-planets" => Ok(MapId::TwoPlanets),
            _ => Err(ValidationError::UnknownName(s.to_string())),
        }
    }
}

/// Axis-aligned playable area.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    fn from_corner(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            min: Vec2::new(x, y),
            max: Vec2::new(x + width, y + height),
        }
    }

    pub fn contains(&self, p: &Vec2) -> bool {
        self.min.x <= p.x && p.x <= self.max.x && self.min.y <= p.y && p.y <= self.max.y
    }
}

/// A playable map: bounds plus the celestial registry, placed at t = 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameMap {
    pub bounds: Bounds,
    pub celestials: Vec<Celestial>,
}

impl GameMap {
    fn new(bounds: Bounds, mut celestials: Vec<Celestial>) -> Self {
        update_celestials(&mut celestials, 0.0);
        Self { bounds, celestials }
    }
}

/// Build the map named by `id`.
pub fn build_map(id: MapId) -> GameMap {
    match id {
        MapId::OriginalDemo => original_demo(),
        MapId::TwoPlanets => two_planets(),
    }
}

pub fn original_demo() -> GameMap {
    let planet = Celestial::fixed(Vec2::zeros(), 500.0, PlayerId::Neutral);
    let player_moon = Celestial::orbiting(
        Orbit {
            center: CelestialId(0),
            radius: 1200.0,
            angle: PI / 2.0,
            clockwise: true,
        },
        50.0,
        PlayerId::Player,
    );
    let enemy_moon = Celestial::orbiting(
        Orbit {
            center: CelestialId(0),
            radius: 1700.0,
            angle: -PI / 2.0,
            clockwise: false,
        },
        50.0,
        PlayerId::Enemy,
    );
    GameMap::new(
        Bounds::from_corner(-2000.0, -2000.0, 4000.0, 4000.0),
        vec![planet, player_moon, enemy_moon],
    )
}

pub fn two_planets() -> GameMap {
    let left = Celestial::fixed(Vec2::new(-1500.0, 0.0), 400.0, PlayerId::Neutral);
    let right = Celestial::fixed(Vec2::new(1500.0, 0.0), 400.0, PlayerId::Neutral);
    let left_moon = Celestial::orbiting(
        Orbit {
            center: CelestialId(0),
            radius: 1200.0,
            angle: -PI,
            clockwise: true,
        },
        50.0,
        PlayerId::Player,
    );
    let right_moon = Celestial::orbiting(
        Orbit {
            center: CelestialId(1),
            radius: 1200.0,
            angle: 0.0,
            clockwise: false,
        },
        50.0,
        PlayerId::Enemy,
    );
    GameMap::new(
        Bounds::from_corner(-3000.0, -2000.0, 6000.0, 4000.0),
        vec![left, right, left_moon, right_moon],
    )
}
