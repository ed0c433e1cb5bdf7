#![deny(warnings)]

//! Headless match runtime on `bevy_ecs`.
//!
//! A [`Match`] owns a world with one entity per ship and a chained schedule
//! that, every frame, advances the clock, moves celestials along their
//! orbits, steers and integrates ships, resolves lazer fire, and on their own
//! cadences runs the economy (1 s) and the strategy AIs (200 ms).

use bevy_ecs::prelude::*;
use orbit_ai::{orbital_radius, AiError, Steer, SteeringController, StrategyAi, Unit};
use orbit_core::{
    build_map, find_home, update_celestials, validate_config, validate_map, Body, Celestial,
    CelestialId, Difficulty, GameMap, PlayerId, Ship, SimConfig, ValidationError, Vec2,
    LAZER_RANGE,
};
use orbit_econ::{Account, EconError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use thiserror::Error;
use tracing::{debug, info};

/// Hull damage per second dealt by a firing ship.
pub const LAZER_DPS: f64 = 2.0;
/// Hit points of a fresh ship.
pub const SHIP_HEALTH: f64 = 10.0;
/// Ships each active player starts with.
pub const STARTING_SHIPS: usize = 3;
/// Neutral ships guarding every neutral celestial.
pub const NEUTRAL_GARRISON: usize = 4;
/// Seconds between economy ticks.
pub const ECONOMY_INTERVAL: f64 = 1.0;
/// Seconds between strategy ticks.
pub const STRATEGY_INTERVAL: f64 = 0.2;

const CADENCE_EPSILON: f64 = 1e-9;

/// Errors raised while setting up a match.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Econ(#[from] EconError),
    #[error(transparent)]
    Ai(#[from] AiError),
}

#[derive(Component, Debug, Clone)]
pub struct ShipState(pub Ship);

#[derive(Component, Debug, Clone)]
pub struct Controller(pub SteeringController);

/// Engine outputs computed this frame.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Output(pub Steer);

#[derive(Component, Debug, Clone, Copy)]
pub struct Health(pub f64);

#[derive(Resource, Debug)]
struct Clock {
    frame: u64,
    dt: f64,
    time: f64,
    economy_timer: f64,
    strategy_timer: f64,
    economy_due: bool,
    strategy_due: bool,
}

fn cadence(timer: &mut f64, dt: f64, interval: f64) -> bool {
    *timer += dt;
    if *timer + CADENCE_EPSILON >= interval {
        *timer -= interval;
        true
    } else {
        false
    }
}

#[derive(Resource, Debug)]
struct Celestials(Vec<Celestial>);

#[derive(Debug)]
struct PlayerSlot {
    id: PlayerId,
    home: CelestialId,
    account: Account,
    ai: Option<StrategyAi>,
    built: u32,
    lost: u32,
    kills: u32,
}

#[derive(Resource, Debug)]
struct Players(Vec<PlayerSlot>);

impl Players {
    fn get(&self, id: PlayerId) -> Option<&PlayerSlot> {
        self.0.iter().find(|slot| slot.id == id)
    }

    fn record_kill(&mut self, killer: PlayerId, victim: PlayerId) {
        if let Some(slot) = self.0.iter_mut().find(|slot| slot.id == killer) {
            slot.kills += 1;
            if victim == PlayerId::Neutral {
                slot.account.credit_neutral_kill();
            }
        }
        if let Some(slot) = self.0.iter_mut().find(|slot| slot.id == victim) {
            slot.lost += 1;
        }
        debug!(?killer, ?victim, "ship destroyed");
    }
}

#[derive(Resource)]
struct SimRng(ChaCha8Rng);

fn ship_bundle(ship: Ship, controller: SteeringController) -> (ShipState, Controller, Output, Health) {
    (
        ShipState(ship),
        Controller(controller),
        Output::default(),
        Health(SHIP_HEALTH),
    )
}

/// A ship on the orbit ring of `celestial`, moving with it.
fn ring_ship<R: Rng + ?Sized>(celestial: &Body, player: PlayerId, rng: &mut R) -> Ship {
    let angle = rng.gen_range(0.0..TAU);
    let offset = Vec2::new(angle.cos(), angle.sin()) * orbital_radius(celestial);
    Ship::new(
        celestial.position + offset,
        celestial.velocity,
        angle + TAU / 4.0,
        player,
    )
}

fn advance_clock(mut clock: ResMut<Clock>) {
    let clock = &mut *clock;
    clock.frame += 1;
    clock.time = clock.frame as f64 * clock.dt;
    clock.economy_due = cadence(&mut clock.economy_timer, clock.dt, ECONOMY_INTERVAL);
    clock.strategy_due = cadence(&mut clock.strategy_timer, clock.dt, STRATEGY_INTERVAL);
}

fn advance_celestials(clock: Res<Clock>, mut celestials: ResMut<Celestials>) {
    update_celestials(&mut celestials.0, clock.dt);
}

fn steer_ships(
    clock: Res<Clock>,
    celestials: Res<Celestials>,
    mut rng: ResMut<SimRng>,
    mut ships: Query<(&ShipState, &mut Controller, &mut Output)>,
) {
    for (ship, mut controller, mut output) in &mut ships {
        output.0 = controller
            .0
            .step(clock.dt, &ship.0, &celestials.0, &mut rng.0);
    }
}

/// Semi-implicit Euler: turn, accelerate along the new heading, then move.
fn integrate_ships(clock: Res<Clock>, mut ships: Query<(&mut ShipState, &Output)>) {
    let dt = clock.dt;
    for (mut state, output) in &mut ships {
        let ship = &mut state.0;
        ship.rotation += output.0.rotation_rate * dt;
        let heading = ship.heading();
        ship.body.velocity += heading * (output.0.thrust * dt);
        ship.body.position += ship.body.velocity * dt;
    }
}

/// Every ship damages the nearest hostile ship in range.
fn fire_lazers(
    mut commands: Commands,
    clock: Res<Clock>,
    mut players: ResMut<Players>,
    mut ships: Query<(Entity, &ShipState, &mut Health)>,
) {
    // Fire is simultaneous: ships killed earlier in this pass still shoot.
    let snapshot: Vec<(Entity, Vec2, PlayerId)> = ships
        .iter()
        .map(|(entity, state, _)| (entity, state.0.body.position, state.0.body.player))
        .collect();
    let damage = LAZER_DPS * clock.dt;
    for &(_, position, shooter) in &snapshot {
        let target = snapshot
            .iter()
            .filter(|(_, p, owner)| {
                shooter.is_hostile_to(*owner) && (p - position).norm() <= LAZER_RANGE
            })
            .min_by(|a, b| {
                (a.1 - position)
                    .norm()
                    .total_cmp(&(b.1 - position).norm())
            });
        let Some(&(target, _, victim)) = target else {
            continue;
        };
        let Ok((_, _, mut health)) = ships.get_mut(target) else {
            continue;
        };
        if health.0 <= 0.0 {
            continue;
        }
        health.0 -= damage;
        if health.0 <= 0.0 {
            commands.entity(target).despawn();
            players.record_kill(shooter, victim);
        }
    }
}

fn run_economy(
    mut commands: Commands,
    clock: Res<Clock>,
    celestials: Res<Celestials>,
    mut players: ResMut<Players>,
    mut rng: ResMut<SimRng>,
) {
    if !clock.economy_due {
        return;
    }
    for slot in players.0.iter_mut() {
        let ships = slot.account.update();
        if ships == 0 {
            continue;
        }
        let Some(home) = celestials.0.get(slot.home.0) else {
            continue;
        };
        for _ in 0..ships {
            let ship = ring_ship(&home.body, slot.id, &mut rng.0);
            commands.spawn(ship_bundle(ship, SteeringController::orbiting(slot.home)));
        }
        slot.built += ships;
        debug!(player = ?slot.id, ships, time = clock.time, "ships launched");
    }
}

/// Friendly ship handed to a [`StrategyAi`].
struct FriendlyUnit<'a> {
    body: &'a Body,
    controller: Mut<'a, Controller>,
}

impl Unit for FriendlyUnit<'_> {
    fn body(&self) -> &Body {
        self.body
    }

    fn controller_mut(&mut self) -> &mut SteeringController {
        &mut self.controller.0
    }
}

fn run_strategy(
    clock: Res<Clock>,
    celestials: Res<Celestials>,
    mut players: ResMut<Players>,
    mut ships: Query<(&ShipState, &mut Controller)>,
) {
    if !clock.strategy_due {
        return;
    }
    for slot in players.0.iter_mut() {
        let Some(ai) = slot.ai.as_mut() else {
            continue;
        };
        let id = slot.id;
        let enemies: Vec<Body> = ships
            .iter()
            .filter(|(state, _)| id.is_hostile_to(state.0.body.player))
            .map(|(state, _)| state.0.body.clone())
            .collect();
        let mut friendlies: Vec<FriendlyUnit> = ships
            .iter_mut()
            .filter(|(state, _)| state.0.body.player == id)
            .map(|(state, controller)| FriendlyUnit {
                body: &state.0.body,
                controller,
            })
            .collect();
        ai.update(
            clock.time,
            &mut slot.account,
            &celestials.0,
            &mut friendlies,
            &enemies,
        );
    }
}

/// End-of-run statistics of one active player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub player: PlayerId,
    pub ai: Option<Difficulty>,
    pub ships: usize,
    pub built: u32,
    pub lost: u32,
    pub kills: u32,
    pub capital: f64,
    pub spending: f64,
}

/// Snapshot of a match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub time: f64,
    pub frames: u64,
    pub players: Vec<PlayerSummary>,
    pub neutral_ships: usize,
}

/// A headless match.
pub struct Match {
    world: World,
    schedule: Schedule,
}

impl Match {
    /// Build and validate a match on the configured built-in map.
    pub fn new(config: &SimConfig) -> Result<Self, MatchError> {
        Self::with_map(config, build_map(config.map))
    }

    /// Build a match on a custom map.
    pub fn with_map(config: &SimConfig, map: GameMap) -> Result<Self, MatchError> {
        validate_config(config)?;
        validate_map(&map)?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.rng_seed);
        let mut world = World::new();
        let celestials = map.celestials;

        let mut slots = Vec::new();
        for id in [PlayerId::Player, PlayerId::Enemy] {
            let home = find_home(&celestials, id).ok_or(ValidationError::MissingHome(id))?;
            let ai = config
                .ai(id)
                .map(|difficulty| StrategyAi::new(id, difficulty, &celestials, 0.0))
                .transpose()?;
            for _ in 0..STARTING_SHIPS {
                let ship = ring_ship(&celestials[home.0].body, id, &mut rng);
                world.spawn(ship_bundle(ship, SteeringController::orbiting(home)));
            }
            slots.push(PlayerSlot {
                id,
                home,
                account: Account::new(config.bonus(id))?,
                ai,
                built: 0,
                lost: 0,
                kills: 0,
            });
        }
        for (index, celestial) in celestials.iter().enumerate() {
            if celestial.body.player != PlayerId::Neutral {
                continue;
            }
            for _ in 0..NEUTRAL_GARRISON {
                let ship = ring_ship(&celestial.body, PlayerId::Neutral, &mut rng);
                world.spawn(ship_bundle(
                    ship,
                    SteeringController::orbiting(CelestialId(index)),
                ));
            }
        }

        world.insert_resource(Clock {
            frame: 0,
            dt: config.frame_dt,
            time: 0.0,
            economy_timer: 0.0,
            strategy_timer: 0.0,
            economy_due: false,
            strategy_due: false,
        });
        world.insert_resource(Celestials(celestials));
        world.insert_resource(Players(slots));
        world.insert_resource(SimRng(rng));

        let mut schedule = Schedule::default();
        schedule.add_systems(
            (
                advance_clock,
                advance_celestials,
                steer_ships,
                integrate_ships,
                fire_lazers,
                run_economy,
                run_strategy,
            )
                .chain(),
        );
        info!(map = ?config.map, enemy_ai = ?config.enemy_ai, player_ai = ?config.player_ai, seed = config.rng_seed, "match ready");
        Ok(Self { world, schedule })
    }

    /// Advance one frame.
    pub fn step(&mut self) {
        self.schedule.run(&mut self.world);
    }

    /// Advance by `seconds` of simulated time, rounded to whole frames.
    pub fn run_for(&mut self, seconds: f64) {
        let dt = self.world.resource::<Clock>().dt;
        let frames = (seconds / dt).round().max(0.0) as u64;
        for _ in 0..frames {
            self.step();
        }
    }

    /// Simulated seconds since the start.
    pub fn time(&self) -> f64 {
        self.world.resource::<Clock>().time
    }

    pub fn celestials(&self) -> &[Celestial] {
        &self.world.resource::<Celestials>().0
    }

    /// Add a ship to the match.
    pub fn spawn_ship(&mut self, ship: Ship, controller: SteeringController) -> Entity {
        self.world.spawn(ship_bundle(ship, controller)).id()
    }

    /// All ships alive.
    pub fn ships(&mut self) -> Vec<Ship> {
        let mut query = self.world.query::<&ShipState>();
        query.iter(&self.world).map(|state| state.0.clone()).collect()
    }

    /// Apply `order` to every controller of `player`, for sides without AI.
    pub fn command_fleet<F: FnMut(&mut SteeringController)>(&mut self, player: PlayerId, mut order: F) {
        let mut query = self.world.query::<(&ShipState, &mut Controller)>();
        for (state, mut controller) in query.iter_mut(&mut self.world) {
            if state.0.body.player == player {
                order(&mut controller.0);
            }
        }
    }

    /// HUD lines of `player`'s AI; empty for sides without one.
    pub fn telemetry(&self, player: PlayerId) -> Vec<String> {
        self.world
            .resource::<Players>()
            .get(player)
            .and_then(|slot| slot.ai.as_ref())
            .map(|ai| ai.telemetry().to_vec())
            .unwrap_or_default()
    }

    pub fn summary(&mut self) -> MatchSummary {
        let mut counts: Vec<(PlayerId, usize)> = Vec::new();
        for ship in self.ships() {
            match counts.iter_mut().find(|(id, _)| *id == ship.body.player) {
                Some((_, n)) => *n += 1,
                None => counts.push((ship.body.player, 1)),
            }
        }
        let alive = |player: PlayerId| {
            counts
                .iter()
                .find(|(id, _)| *id == player)
                .map_or(0, |(_, n)| *n)
        };
        let clock = self.world.resource::<Clock>();
        let players = self.world.resource::<Players>();
        MatchSummary {
            time: clock.time,
            frames: clock.frame,
            players: players
                .0
                .iter()
                .map(|slot| PlayerSummary {
                    player: slot.id,
                    ai: slot.ai.as_ref().map(|ai| ai.difficulty()),
                    ships: alive(slot.id),
                    built: slot.built,
                    lost: slot.lost,
                    kills: slot.kills,
                    capital: slot.account.future_capital(),
                    spending: slot.account.spending,
                })
                .collect(),
            neutral_ships: alive(PlayerId::Neutral),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use orbit_core::{Bounds, MapId};

    fn config() -> SimConfig {
        SimConfig {
            rng_seed: 7,
            ..SimConfig::default()
        }
    }

    fn player(summary: &MatchSummary, id: PlayerId) -> &PlayerSummary {
        summary
            .players
            .iter()
            .find(|p| p.player == id)
            .unwrap()
    }

    /// Two far-apart home moons and no neutral celestial.
    fn duel_map() -> GameMap {
        GameMap {
            bounds: Bounds {
                min: Vec2::new(-20_000.0, -20_000.0),
                max: Vec2::new(20_000.0, 20_000.0),
            },
            celestials: vec![
                Celestial::fixed(Vec2::zeros(), 50.0, PlayerId::Player),
                Celestial::fixed(Vec2::new(10_000.0, 0.0), 50.0, PlayerId::Enemy),
            ],
        }
    }

    #[test]
    fn setup_spawns_starting_fleets_and_garrisons() {
        let mut game = Match::new(&config()).unwrap();
        let summary = game.summary();
        assert_eq!(player(&summary, PlayerId::Player).ships, STARTING_SHIPS);
        assert_eq!(player(&summary, PlayerId::Enemy).ships, STARTING_SHIPS);
        assert_eq!(summary.neutral_ships, NEUTRAL_GARRISON);
        assert_eq!(player(&summary, PlayerId::Enemy).ai, Some(Difficulty::Medium));
        assert_eq!(player(&summary, PlayerId::Player).ai, None);
        assert_eq!(summary.frames, 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad = SimConfig {
            player_bonus: -1.0,
            ..config()
        };
        assert!(matches!(
            Match::new(&bad),
            Err(MatchError::Validation(ValidationError::InvalidBonus(_)))
        ));

        let mut map = duel_map();
        map.celestials[1].body.player = PlayerId::Neutral;
        assert!(matches!(
            Match::with_map(&config(), map),
            Err(MatchError::Validation(ValidationError::MissingHome(PlayerId::Enemy)))
        ));
    }

    #[test]
    fn cadences_follow_simulated_time() {
        let mut game = Match::with_map(&config(), duel_map()).unwrap();
        game.run_for(1.0);
        assert_abs_diff_eq!(game.time(), 1.0, epsilon = 1e-9);
        assert_eq!(game.world.resource::<Clock>().frame, 60);
        // one economy tick at zero capital produced no ship yet
        let summary = game.summary();
        assert_eq!(player(&summary, PlayerId::Player).built, 0);
        assert!(!game.telemetry(PlayerId::Enemy).is_empty());
        assert!(game.telemetry(PlayerId::Player).is_empty());
    }

    #[test]
    fn economy_launches_ships_at_home() {
        let config = SimConfig {
            player_bonus: 4.0,
            ..config()
        };
        let mut game = Match::with_map(&config, duel_map()).unwrap();
        game.run_for(4.0);
        let summary = game.summary();
        // spending 0.5 of 4/s buys one ship every 4 s
        assert_eq!(player(&summary, PlayerId::Player).built, 1);
        assert_eq!(player(&summary, PlayerId::Player).ships, STARTING_SHIPS + 1);
        for ship in game.ships() {
            if ship.body.player == PlayerId::Player {
                assert!(ship.body.position.norm() < 200.0);
            }
        }
    }

    #[test]
    fn neutral_kill_is_credited() {
        let mut game = Match::with_map(&config(), duel_map()).unwrap();
        let hunter = Vec2::new(3000.0, 3000.0);
        game.spawn_ship(
            Ship::new(hunter, Vec2::zeros(), 0.0, PlayerId::Player),
            SteeringController::new(hunter),
        );
        let prey = Vec2::new(3050.0, 3000.0);
        game.spawn_ship(
            Ship::new(prey, Vec2::zeros(), 0.0, PlayerId::Neutral),
            SteeringController::new(prey),
        );
        game.run_for(6.0);
        let summary = game.summary();
        assert_eq!(player(&summary, PlayerId::Player).kills, 1);
        assert_eq!(player(&summary, PlayerId::Player).lost, 1);
        assert_eq!(summary.neutral_ships, 0);
        // both sides shoot at the same rate, so they trade
        assert_eq!(player(&summary, PlayerId::Player).ships, STARTING_SHIPS);
    }

    #[test]
    fn external_commands_reach_controllers() {
        let mut game = Match::with_map(&config(), duel_map()).unwrap();
        game.command_fleet(PlayerId::Player, |c| c.orbit(CelestialId(1)));
        game.run_for(20.0);
        // ships launched meanwhile still orbit home
        let departed = game
            .ships()
            .iter()
            .filter(|s| s.body.player == PlayerId::Player && s.body.position.x > 1000.0)
            .count();
        assert_eq!(departed, STARTING_SHIPS);
    }

    #[test]
    fn same_seed_same_match() {
        let config = SimConfig {
            map: MapId::TwoPlanets,
            player_ai: Some(Difficulty::Hard),
            ..config()
        };
        let mut a = Match::new(&config).unwrap();
        let mut b = Match::new(&config).unwrap();
        a.run_for(10.0);
        b.run_for(10.0);
        assert_eq!(a.summary(), b.summary());
        assert_eq!(a.ships(), b.ships());
    }

    #[test]
    fn summary_serializes_to_json() {
        let config = SimConfig {
            player_ai: Some(Difficulty::Medium),
            ..config()
        };
        let mut game = Match::new(&config).unwrap();
        game.run_for(5.0);
        let summary = game.summary();

        let text = serde_json::to_string_pretty(&summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["frames"], summary.frames);
        assert_eq!(value["players"].as_array().unwrap().len(), 2);
        assert_eq!(value["players"][1]["player"], "Enemy");

        let back: MatchSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(back.frames, summary.frames);
        assert_eq!(back.neutral_ships, summary.neutral_ships);
        assert_abs_diff_eq!(back.time, summary.time, epsilon = 1e-9);
        for (b, p) in back.players.iter().zip(&summary.players) {
            assert_eq!((b.player, b.ai, b.ships), (p.player, p.ai, p.ships));
            assert_eq!((b.built, b.lost, b.kills), (p.built, p.lost, p.kills));
            assert_abs_diff_eq!(b.capital, p.capital, epsilon = 1e-9);
            assert_abs_diff_eq!(b.spending, p.spending, epsilon = 1e-9);
        }
    }

    #[test]
    fn long_run_stays_finite() {
        let mut game = Match::new(&config()).unwrap();
        game.run_for(90.0);
        let summary = game.summary();
        assert!(player(&summary, PlayerId::Enemy).built > 0);
        for ship in game.ships() {
            assert!(ship.body.position.x.is_finite() && ship.body.position.y.is_finite());
        }
        let moon = &game.celestials()[1];
        assert_abs_diff_eq!(moon.body.position.norm(), 1200.0, epsilon = 1e-6);
    }
}
