#![deny(warnings)]

//! Unit steering and strategic AI.
//!
//! [`steering`] holds the vector primitives, [`unit`] the per-ship command
//! controller built on them, and [`strategy`] the scripted player that plans
//! invasions, sets spending and commands its fleet.

pub mod steering;
pub mod strategy;
pub mod unit;

pub use strategy::{closest_approach_time, Action, AiError, Plan, PlanKind, StrategyAi};
pub use unit::{orbital_radius, Command, Steer, SteeringController, Unit};
