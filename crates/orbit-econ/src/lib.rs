#![deny(warnings)]

//! Economic model: delayed capital growth and ship production.
//!
//! Each active player owns an [`Account`]. Income depends on realised capital
//! through a saturating curve; the `spending` control splits every payment
//! between the production balance (spent on ships in whole [`SHIP_COST`]
//! units) and an investment that matures into capital after
//! [`CAPITAL_DELAY`] ticks.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::trace;

/// Ticks between investing and the investment becoming capital.
pub const CAPITAL_DELAY: usize = 10;
/// Production cost of one ship.
pub const SHIP_COST: f64 = 8.0;
/// Income at zero capital (per tick, before bonus).
pub const MIN_INCOME: f64 = 1.0;
/// Asymptotic income (per tick, before bonus).
pub const MAX_INCOME: f64 = 4.0;
/// Capital that closes half the gap between min and max income.
pub const CAPITAL_SCALE: f64 = 100.0;
/// Flat payment for destroying a neutral ship.
pub const NEUTRAL_KILL_REWARD: f64 = 4.0;

/// Errors produced by economic helpers.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Income multiplier must be finite and > 0.
    #[error("invalid income bonus: {0}")]
    InvalidBonus(f64),
}

/// Income per tick for a given capital and bonus multiplier.
///
/// `bonus * (MIN + (MAX - MIN) * (1 - 2^(-capital / K)))`: strictly
/// increasing and concave in capital, saturating at `bonus * MAX_INCOME`.
pub fn capital_to_income(capital: f64, bonus: f64) -> f64 {
    bonus * (MIN_INCOME + (MAX_INCOME - MIN_INCOME) * (1.0 - (-capital / CAPITAL_SCALE).exp2()))
}

/// A player's ledger.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    /// Proportion of income spent on production, clamped to [0, 1] when used.
    pub spending: f64,
    /// When set, production accrues but no ships are released.
    pub hold: bool,
    capital: f64,
    production: f64,
    investments: VecDeque<f64>,
    bonus: f64,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            spending: 0.5,
            hold: false,
            capital: 0.0,
            production: 0.0,
            investments: VecDeque::with_capacity(CAPITAL_DELAY),
            bonus: 1.0,
        }
    }
}

impl Account {
    /// New account with an income multiplier.
    pub fn new(bonus: f64) -> Result<Self, EconError> {
        if !(bonus.is_finite() && bonus > 0.0) {
            return Err(EconError::InvalidBonus(bonus));
        }
        Ok(Self {
            bonus,
            ..Self::default()
        })
    }

    /// Realised capital.
    pub fn capital(&self) -> f64 {
        self.capital
    }

    /// Unspent production balance.
    pub fn production(&self) -> f64 {
        self.production
    }

    pub fn bonus(&self) -> f64 {
        self.bonus
    }

    /// Capital including investments that have not matured yet.
    pub fn future_capital(&self) -> f64 {
        self.capital + self.investments.iter().sum::<f64>()
    }

    /// Income per tick at `capital` for this account's bonus.
    pub fn income_at(&self, capital: f64) -> f64 {
        capital_to_income(capital, self.bonus)
    }

    /// Current income per tick.
    pub fn income(&self) -> f64 {
        self.income_at(self.capital)
    }

    /// Ticks for one extra unit of capital, invested at `capital`, to pay for
    /// itself, including the maturation delay. Infinite once the marginal
    /// gain vanishes.
    pub fn break_even_time(&self, capital: f64) -> f64 {
        let gain = self.income_at(capital + 1.0) - self.income_at(capital);
        if gain <= 0.0 {
            return f64::INFINITY;
        }
        CAPITAL_DELAY as f64 + 1.0 / gain
    }

    /// Ticks needed to afford `ships` from zero capital at full spending.
    pub fn starter_fleet_time(&self, ships: u32) -> f64 {
        let income = self.income_at(0.0);
        if income <= 0.0 {
            return f64::INFINITY;
        }
        ships as f64 * SHIP_COST / income
    }

    /// Run one economic tick and return the number of ships to spawn.
    pub fn update(&mut self) -> u32 {
        if self.investments.len() >= CAPITAL_DELAY {
            if let Some(matured) = self.investments.pop_front() {
                self.capital += matured;
            }
        }
        self.investments.push_back(0.0);
        self.add_income(self.income());

        if self.hold {
            return 0;
        }
        let ships = (self.production / SHIP_COST).floor();
        self.production -= ships * SHIP_COST;
        trace!(ships, capital = self.capital, "economy tick");
        ships as u32
    }

    /// Pay the bounty for a destroyed neutral, split like regular income.
    pub fn credit_neutral_kill(&mut self) {
        self.add_income(NEUTRAL_KILL_REWARD);
    }

    fn add_income(&mut self, income: f64) {
        let spending = self.spending.clamp(0.0, 1.0);
        self.production += spending * income;
        let invested = (1.0 - spending) * income;
        match self.investments.back_mut() {
            Some(slot) => *slot += invested,
            None => self.investments.push_back(invested),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn run(account: &mut Account, ticks: usize) -> u32 {
        (0..ticks).map(|_| account.update()).sum()
    }

    #[test]
    fn income_basic_properties() {
        assert_abs_diff_eq!(capital_to_income(0.0, 1.0), MIN_INCOME, epsilon = 1e-12);
        assert_abs_diff_eq!(capital_to_income(0.0, 2.0), 2.0 * MIN_INCOME, epsilon = 1e-12);

        let gap0 = capital_to_income(2.0, 1.0) - capital_to_income(0.0, 1.0);
        let gap5 = capital_to_income(7.0, 1.0) - capital_to_income(5.0, 1.0);
        assert!(gap5 > 0.0);
        assert!(gap5 < gap0);

        assert!((capital_to_income(10.0, 1.0) - capital_to_income(11.0, 1.0)).abs() > 1e-3);
        assert_abs_diff_eq!(
            capital_to_income(10_000.0, 1.0),
            capital_to_income(10_001.0, 1.0),
            epsilon = 1e-9
        );
        assert!(capital_to_income(1e6, 1.0) <= MAX_INCOME);
    }

    #[test]
    fn full_spending_builds_one_ship_per_cost() {
        let mut account = Account::default();
        account.spending = 1.0;
        assert_eq!(run(&mut account, 5 * SHIP_COST as usize), 5);
        assert_eq!(account.capital(), 0.0);
    }

    #[test]
    fn simple_schedules() {
        let mut account = Account::default();
        account.spending = 1.0;
        let mut total = run(&mut account, 5 * SHIP_COST as usize);
        assert_eq!(total, 5);

        account.spending = 0.0;
        total += run(&mut account, 5 * SHIP_COST as usize);
        assert_eq!(total, 5, "everything is invested");
        assert!(account.capital() > 0.0);
        assert!(account.future_capital() > account.capital());

        account.spending = 1.0;
        total += run(&mut account, 5 * SHIP_COST as usize);
        assert!(total > 10, "production should have increased, got {total}");
    }

    #[test]
    fn investment_matures_after_delay() {
        let mut account = Account::default();
        account.spending = 0.0;
        run(&mut account, CAPITAL_DELAY);
        assert_eq!(account.capital(), 0.0);
        assert_abs_diff_eq!(account.future_capital(), CAPITAL_DELAY as f64, epsilon = 1e-12);
        account.update();
        assert_abs_diff_eq!(account.capital(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn hold_accrues_then_flushes() {
        let mut account = Account::default();
        account.spending = 1.0;
        account.hold = true;
        assert_eq!(run(&mut account, 5 * SHIP_COST as usize), 0);
        assert_abs_diff_eq!(account.production(), 5.0 * SHIP_COST, epsilon = 1e-12);
        account.hold = false;
        assert_eq!(account.update(), 5);
    }

    #[test]
    fn neutral_kill_respects_split() {
        let mut account = Account::default();
        account.spending = 0.25;
        account.update();
        let before = account.future_capital();
        account.credit_neutral_kill();
        assert_abs_diff_eq!(
            account.production(),
            0.25 * (MIN_INCOME + NEUTRAL_KILL_REWARD),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            account.future_capital() - before,
            0.75 * NEUTRAL_KILL_REWARD,
            epsilon = 1e-12
        );
    }

    #[test]
    fn spending_is_clamped() {
        let mut account = Account::default();
        account.spending = 3.0;
        account.update();
        assert_abs_diff_eq!(account.production(), MIN_INCOME, epsilon = 1e-12);
        assert_eq!(account.future_capital(), 0.0);
    }

    #[test]
    fn bonus_scales_income_and_is_validated() {
        let account = Account::new(1.5).unwrap();
        assert_abs_diff_eq!(account.income(), 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(account.starter_fleet_time(3), 16.0, epsilon = 1e-9);
        assert_eq!(Account::new(0.0).unwrap_err(), EconError::InvalidBonus(0.0));
        assert!(Account::new(f64::INFINITY).is_err());
    }

    #[test]
    fn break_even_grows_with_capital() {
        let account = Account::default();
        let early = account.break_even_time(0.0);
        let late = account.break_even_time(500.0);
        assert!(early > CAPITAL_DELAY as f64);
        assert!(late > early);
        assert_eq!(account.break_even_time(1e6), f64::INFINITY);
    }

    proptest! {
        #[test]
        fn income_increasing_and_concave(c in 0.0f64..2_000.0, bonus in 0.1f64..5.0) {
            let a = capital_to_income(c, bonus);
            let b = capital_to_income(c + 1.0, bonus);
            let d = capital_to_income(c + 2.0, bonus);
            prop_assert!(b > a);
            prop_assert!(d - b < b - a);
            prop_assert!(d <= bonus * MAX_INCOME);
        }

        #[test]
        fn zero_spending_builds_nothing(ticks in 1usize..200) {
            let mut account = Account::default();
            account.spending = 0.0;
            prop_assert_eq!(run(&mut account, ticks), 0);
        }
    }
}
