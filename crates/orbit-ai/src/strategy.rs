//! Scripted opponent: invasion planning, spending policy and the tactical
//! ladder that turns the situation around the fleet into unit commands.

use crate::unit::Unit;
use orbit_core::{
    find_home, forecast_position, Body, Celestial, CelestialId, Difficulty, PlayerId, Vec2,
    LAZER_RANGE,
};
use orbit_econ::Account;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Radius around the leader in which ships are counted for force ratios.
pub const VISION_RANGE: f64 = 500.0;
/// Radius used to elect the leader and measure how grouped the fleet is.
pub const LEADER_RADIUS: f64 = 150.0;
/// Enemies this close to home trigger a defence.
pub const INVASION_RADIUS: f64 = 600.0;
/// The fleet counts as home when its leader is this close to it.
pub const HOME_RADIUS: f64 = 300.0;
/// Distance to the objective beyond which a scattered fleet regroups.
pub const GROUP_DISTANCE: f64 = 600.0;
/// Fraction of ships near the leader for the fleet to count as grouped.
pub const GROUP_FRACTION: f64 = 0.75;
/// How far towards the objective a regrouping fleet moves.
pub const GROUP_STEP: f64 = 200.0;
/// Retreat when enemies outnumber friendlies by more than this ratio.
pub const RETREAT_RATIO: f64 = 1.5;
/// Enemies needed to attack while invading.
pub const ATTACK_MIN_ENEMIES: usize = 3;
/// Seconds of retreating that make the fleet give up and go home.
pub const IMPATIENCE_THRESHOLD: f64 = 15.0;
/// Impatience lost per second when not retreating.
pub const IMPATIENCE_DECAY: f64 = 1.0;
pub const MIN_WAIT_TIME: f64 = 20.0;
pub const MAX_WAIT_TIME: f64 = 120.0;
/// Length of an invasion before replanning, s.
pub const INVASION_DURATION: f64 = 60.0;
/// Sampling step of the approach forecast, s.
pub const FORECAST_INTERVAL: f64 = 1.0;
/// Horizon of the approach forecast, s.
pub const FORECAST_LIMIT: f64 = MAX_WAIT_TIME;
/// Ships bought before any investment.
pub const STARTER_FLEET: u32 = 5;
/// Seconds the medium AI invests after its starter fleet.
pub const MEDIUM_INVEST_WINDOW: f64 = 60.0;
/// Fixed spending of the easy AI.
pub const EASY_SPENDING: f64 = 0.25;

/// Errors raised when setting up an AI.
#[derive(Debug, Error, PartialEq)]
pub enum AiError {
    /// The player owns no celestial to call home.
    #[error("no home celestial for {0:?}")]
    NoHome(PlayerId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanKind {
    /// Build up at home until the deadline.
    Wait,
    /// Push towards the target until the deadline.
    Invade,
}

/// Macro plan.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub kind: PlanKind,
    /// Simulated time at which the plan moves on.
    pub deadline: f64,
    pub target: CelestialId,
}

/// Tactical decision issued to every friendly ship.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Give up and orbit home until the fleet gets there.
    Flee { orbit: CelestialId },
    /// Return to a threatened home.
    Defend { orbit: CelestialId },
    /// Back off out of weapon range.
    Retreat { patrol: Vec2 },
    /// Close in to weapon range.
    Attack { patrol: Vec2 },
    /// Consolidate partway towards the objective.
    Group { patrol: Vec2 },
    /// Orbit the current objective.
    Move { orbit: CelestialId },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Flee { .. } => "flee",
            Action::Defend { .. } => "defend",
            Action::Retreat { .. } => "retreat",
            Action::Attack { .. } => "attack",
            Action::Group { .. } => "group",
            Action::Move { .. } => "move",
        }
    }
}

/// Time within [`FORECAST_LIMIT`] at which celestials `a` and `b` come
/// closest, sampled every [`FORECAST_INTERVAL`].
///
/// Orbits around a moving centre cannot be forecast; they produce a warning
/// and the limit itself.
pub fn closest_approach_time(celestials: &[Celestial], a: CelestialId, b: CelestialId) -> f64 {
    let steps = (FORECAST_LIMIT / FORECAST_INTERVAL).round() as usize;
    let mut best_time = 0.0;
    let mut best_distance = f64::INFINITY;
    for i in 0..=steps {
        let t = i as f64 * FORECAST_INTERVAL;
        let (pa, pb) = match (
            forecast_position(celestials, a, t),
            forecast_position(celestials, b, t),
        ) {
            (Ok(pa), Ok(pb)) => (pa, pb),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "cannot forecast approach, assuming the limit");
                return FORECAST_LIMIT;
            }
        };
        let distance = (pa - pb).norm();
        if distance < best_distance {
            best_distance = distance;
            best_time = t;
        }
    }
    best_time
}

fn nearest_owned(
    celestials: &[Celestial],
    from: &Vec2,
    player: PlayerId,
) -> Option<CelestialId> {
    celestials
        .iter()
        .enumerate()
        .filter(|(_, c)| c.body.player == player)
        .min_by(|(_, x), (_, y)| x.body.distance_to(from).total_cmp(&y.body.distance_to(from)))
        .map(|(i, _)| CelestialId(i))
}

fn direction_or_x(v: Vec2) -> Vec2 {
    let length = v.norm();
    if length > 0.0 {
        v / length
    } else {
        Vec2::new(1.0, 0.0)
    }
}

/// Strategy state of one AI-controlled player.
#[derive(Clone, Debug)]
pub struct StrategyAi {
    player: PlayerId,
    difficulty: Difficulty,
    home: CelestialId,
    plan: Plan,
    action: Option<Action>,
    leader: Option<Vec2>,
    impatience: f64,
    fleeing: bool,
    start_time: f64,
    last_time: f64,
    telemetry: Vec<String>,
}

impl StrategyAi {
    /// Set up the AI for `player` at simulated `time`.
    pub fn new(
        player: PlayerId,
        difficulty: Difficulty,
        celestials: &[Celestial],
        time: f64,
    ) -> Result<Self, AiError> {
        let home = find_home(celestials, player).ok_or(AiError::NoHome(player))?;
        let mut ai = Self {
            player,
            difficulty,
            home,
            plan: Plan {
                kind: PlanKind::Wait,
                deadline: time,
                target: home,
            },
            action: None,
            leader: None,
            impatience: 0.0,
            fleeing: false,
            start_time: time,
            last_time: time,
            telemetry: Vec::new(),
        };
        ai.replan(celestials, time);
        Ok(ai)
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn home(&self) -> CelestialId {
        self.home
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Last tactical decision; `None` until the first update with ships.
    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    pub fn impatience(&self) -> f64 {
        self.impatience
    }

    /// Short status lines for a HUD, refreshed by every update.
    pub fn telemetry(&self) -> &[String] {
        &self.telemetry
    }

    /// Opponent-owned celestial nearest home, else the nearest neutral one,
    /// else home.
    fn choose_target(&self, celestials: &[Celestial]) -> CelestialId {
        let Some(home) = celestials.get(self.home.0) else {
            return self.home;
        };
        let from = home.body.position;
        self.player
            .opponent()
            .and_then(|opponent| nearest_owned(celestials, &from, opponent))
            .or_else(|| nearest_owned(celestials, &from, PlayerId::Neutral))
            .unwrap_or(self.home)
    }

    /// Start waiting for the next invasion window.
    pub fn replan(&mut self, celestials: &[Celestial], time: f64) {
        let target = self.choose_target(celestials);
        let wait = closest_approach_time(celestials, self.home, target)
            .clamp(MIN_WAIT_TIME, MAX_WAIT_TIME);
        self.plan = Plan {
            kind: PlanKind::Wait,
            deadline: time + wait,
            target,
        };
        debug!(player = ?self.player, ?target, deadline = self.plan.deadline, "waiting to invade");
    }

    /// Run one strategy tick at simulated `time`: advance the plan, set the
    /// account's spending and command the friendly ships.
    pub fn update<U: Unit>(
        &mut self,
        time: f64,
        account: &mut Account,
        celestials: &[Celestial],
        friendlies: &mut [U],
        enemies: &[Body],
    ) {
        let dt = (time - self.last_time).max(0.0);
        self.last_time = time;
        self.update_plan(celestials, time);
        account.spending = self.spending(time, account);
        self.update_ship_commands(dt, celestials, friendlies, enemies);
        self.refresh_telemetry(time, account);
    }

    fn update_plan(&mut self, celestials: &[Celestial], time: f64) {
        if time < self.plan.deadline {
            return;
        }
        match self.plan.kind {
            PlanKind::Wait => {
                self.plan.kind = PlanKind::Invade;
                self.plan.deadline = time + INVASION_DURATION;
                debug!(player = ?self.player, target = ?self.plan.target, "invading");
            }
            PlanKind::Invade => self.replan(celestials, time),
        }
    }

    fn spending(&self, time: f64, account: &Account) -> f64 {
        let elapsed = time - self.start_time;
        let starter = account.starter_fleet_time(STARTER_FLEET);
        match self.difficulty {
            Difficulty::Easy => EASY_SPENDING,
            Difficulty::Medium => {
                if elapsed >= starter && elapsed < starter + MEDIUM_INVEST_WINDOW {
                    0.0
                } else {
                    1.0
                }
            }
            Difficulty::Hard => match self.plan.kind {
                PlanKind::Invade => 1.0,
                PlanKind::Wait if elapsed < starter => 1.0,
                PlanKind::Wait => {
                    let remaining = self.plan.deadline - time;
                    if account.break_even_time(account.future_capital()) < remaining {
                        0.0
                    } else {
                        1.0
                    }
                }
            },
        }
    }

    fn update_ship_commands<U: Unit>(
        &mut self,
        dt: f64,
        celestials: &[Celestial],
        friendlies: &mut [U],
        enemies: &[Body],
    ) {
        let Some(leader) = elect_leader(friendlies) else {
            self.leader = None;
            return;
        };
        let Some(home) = celestials.get(self.home.0) else {
            warn!(home = self.home.0, "home celestial missing from registry");
            return;
        };
        self.leader = Some(leader);
        let home_position = home.body.position;
        let at_home = (leader - home_position).norm() <= HOME_RADIUS;

        if self.fleeing && at_home {
            self.fleeing = false;
            self.impatience = 0.0;
        }
        if !self.fleeing && self.impatience > IMPATIENCE_THRESHOLD && !at_home {
            self.fleeing = true;
        }

        let action = if self.fleeing {
            Action::Flee { orbit: self.home }
        } else {
            self.tactics(leader, at_home, home_position, celestials, friendlies, enemies)
        };

        if matches!(action, Action::Retreat { .. }) {
            self.impatience += dt;
        } else {
            self.impatience = (self.impatience - IMPATIENCE_DECAY * dt).max(0.0);
        }
        if self.action.map(|a| a.name()) != Some(action.name()) {
            debug!(player = ?self.player, action = action.name(), "tactical change");
        }
        self.action = Some(action);

        for unit in friendlies.iter_mut() {
            let controller = unit.controller_mut();
            match action {
                Action::Flee { orbit } | Action::Defend { orbit } | Action::Move { orbit } => {
                    controller.orbit(orbit)
                }
                Action::Retreat { patrol } | Action::Attack { patrol } | Action::Group { patrol } => {
                    controller.patrol(patrol)
                }
            }
        }
    }

    /// Defend, Retreat, Attack, Group, Move in priority order.
    fn tactics<U: Unit>(
        &self,
        leader: Vec2,
        at_home: bool,
        home_position: Vec2,
        celestials: &[Celestial],
        friendlies: &[U],
        enemies: &[Body],
    ) -> Action {
        if !at_home
            && enemies
                .iter()
                .any(|e| e.distance_to(&home_position) <= INVASION_RADIUS)
        {
            return Action::Defend { orbit: self.home };
        }

        let near_enemies: Vec<&Body> = enemies
            .iter()
            .filter(|e| e.distance_to(&leader) <= VISION_RANGE)
            .collect();
        let near_friendlies = friendlies
            .iter()
            .filter(|f| f.body().distance_to(&leader) <= VISION_RANGE)
            .count();

        if near_enemies.len() as f64 > RETREAT_RATIO * near_friendlies as f64 {
            let mean = near_enemies.iter().map(|e| e.position).sum::<Vec2>()
                / near_enemies.len() as f64;
            let away = direction_or_x(leader - mean);
            return Action::Retreat {
                patrol: mean + away * (LAZER_RANGE * 1.2),
            };
        }

        let min_enemies = match self.plan.kind {
            PlanKind::Wait => 1,
            PlanKind::Invade => ATTACK_MIN_ENEMIES,
        };
        if near_enemies.len() >= min_enemies {
            let closest = near_enemies
                .iter()
                .min_by(|a, b| a.distance_to(&leader).total_cmp(&b.distance_to(&leader)));
            if let Some(closest) = closest {
                let towards = direction_or_x(leader - closest.position);
                return Action::Attack {
                    patrol: closest.position + towards * (LAZER_RANGE * 0.8),
                };
            }
        }

        let objective = match self.plan.kind {
            PlanKind::Wait => self.home,
            PlanKind::Invade => self.plan.target,
        };
        if let Some(target) = celestials.get(objective.0) {
            let grouped = friendlies
                .iter()
                .filter(|f| f.body().distance_to(&leader) <= LEADER_RADIUS)
                .count();
            let fraction = grouped as f64 / friendlies.len() as f64;
            let offset = target.body.position - leader;
            if fraction < GROUP_FRACTION && offset.norm() > GROUP_DISTANCE {
                return Action::Group {
                    patrol: leader + direction_or_x(offset) * GROUP_STEP,
                };
            }
        }
        Action::Move { orbit: objective }
    }

    fn refresh_telemetry(&mut self, time: f64, account: &Account) {
        self.telemetry.clear();
        self.telemetry.push(format!(
            "plan {:?} -> #{} in {:.0}s",
            self.plan.kind,
            self.plan.target.0,
            (self.plan.deadline - time).max(0.0)
        ));
        self.telemetry.push(format!(
            "action {}",
            self.action.map_or("idle", |a| a.name())
        ));
        self.telemetry.push(format!(
            "spending {:.2} capital {:.1}",
            account.spending,
            account.future_capital()
        ));
        if let Some(leader) = self.leader {
            self.telemetry
                .push(format!("leader ({:.0}, {:.0})", leader.x, leader.y));
        }
        self.telemetry
            .push(format!("impatience {:.1}", self.impatience));
    }
}

/// Position of the friendly with the most friendlies within
/// [`LEADER_RADIUS`]; the first one wins ties.
fn elect_leader<U: Unit>(friendlies: &[U]) -> Option<Vec2> {
    let mut best: Option<(usize, Vec2)> = None;
    for unit in friendlies {
        let position = unit.body().position;
        let count = friendlies
            .iter()
            .filter(|f| f.body().distance_to(&position) <= LEADER_RADIUS)
            .count();
        if best.map_or(true, |(n, _)| count > n) {
            best = Some((count, position));
        }
    }
    best.map(|(_, position)| position)
}
