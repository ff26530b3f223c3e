//! An agent that trades at random within its capacity.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use oneshot_core::{
    Contract, Deal, MechanismInfo, MechanismState, NegotiationRole, ResponseType,
};

use crate::config::AgentConfig;
use crate::error::{AgentError, ConfigError};
use crate::ledger::{CapacityLedger, Category, LedgerPlan};
use crate::strategy::{OneShotStrategy, debug_check_ledger, feasible_times, has_valid_issues};
use crate::world::AgentWorld;

/// Registered name of the random strategy.
pub const RANDOM: &str = "random";

/// Uniformly random offers and coin-flip acceptance.
#[derive(Debug)]
pub struct RandomStrategy {
    accept_probability: f64,
    avoid_free_sales: bool,
    rng: StdRng,
    ledger: CapacityLedger,
}

impl RandomStrategy {
    /// Creates a random agent, rejecting an invalid configuration.
    pub fn new(config: &AgentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            accept_probability: config.random.accept_probability,
            avoid_free_sales: config.avoid_free_sales,
            rng: StdRng::seed_from_u64(config.seed),
            ledger: CapacityLedger::new(0),
        })
    }
}

impl OneShotStrategy for RandomStrategy {
    fn name(&self) -> &'static str {
        RANDOM
    }

    fn ledger(&self) -> &CapacityLedger {
        &self.ledger
    }

    fn ledger_mut(&mut self) -> &mut CapacityLedger {
        &mut self.ledger
    }

    fn init(&mut self, awi: &dyn AgentWorld) -> Result<(), AgentError> {
        self.ledger = CapacityLedger::new(awi.n_steps());
        Ok(())
    }

    fn before_step(&mut self, awi: &dyn AgentWorld) -> Result<(), AgentError> {
        let horizon = self.ledger.horizon();
        let step = awi.current_step();
        let lines = awi.n_lines();
        self.ledger.reset_for_step(
            LedgerPlan::uniform(horizon, step, lines),
            LedgerPlan::uniform(horizon, step, lines),
        )?;
        Ok(())
    }

    fn propose(
        &mut self,
        awi: &dyn AgentWorld,
        info: &MechanismInfo,
        _state: &MechanismState,
        role: NegotiationRole,
    ) -> Option<Deal> {
        let partner = info.partner_of(awi.agent_id())?.clone();
        let category = Category::for_selling(role.selling);
        self.ledger.release_tentative(category, &partner);
        if !has_valid_issues(info) {
            return None;
        }

        let times = feasible_times(&self.ledger, category, info);
        if times.is_empty() {
            return None;
        }
        let (time, least, most) = times[self.rng.gen_range(0..times.len())];
        let quantity = self.rng.gen_range(least..=most);
        let prices = info.issues.unit_price;
        let low = if role.selling && self.avoid_free_sales && quantity > 0 {
            prices.min.max(1)
        } else {
            prices.min
        };
        if low > prices.max {
            return None;
        }
        let unit_price = f64::from(self.rng.gen_range(low..=prices.max));

        if let Err(err) = self
            .ledger
            .reserve_tentative(category, &partner, time, quantity)
        {
            warn!(partner = %partner, error = %err, "cannot reserve offer");
            return None;
        }
        debug_check_ledger(&self.ledger);
        Deal::new(quantity, time, unit_price).ok()
    }

    fn respond(
        &mut self,
        awi: &dyn AgentWorld,
        info: &MechanismInfo,
        _state: &MechanismState,
        offer: &Deal,
        role: NegotiationRole,
    ) -> ResponseType {
        let Some(partner) = info.partner_of(awi.agent_id()).cloned() else {
            return ResponseType::Reject;
        };
        let category = Category::for_selling(role.selling);
        let feasible = has_valid_issues(info)
            && offer.time < self.ledger.horizon()
            && offer.quantity <= self.ledger.available_excluding(category, offer.time, &partner)
            && offer.quantity >= self.ledger.min(category, offer.time)
            && !(role.selling && self.avoid_free_sales && offer.is_free());
        if !feasible || !self.rng.gen_bool(self.accept_probability) {
            return ResponseType::Reject;
        }
        match self
            .ledger
            .accept(category, &partner, offer.time, offer.quantity)
        {
            Ok(()) => {
                debug_check_ledger(&self.ledger);
                ResponseType::Accept
            }
            Err(err) => {
                debug!(partner = %partner, error = %err, "offer no longer fits");
                ResponseType::Reject
            }
        }
    }

    fn sign_all_contracts(&mut self, _awi: &dyn AgentWorld, contracts: &[Contract]) -> Vec<bool> {
        vec![true; contracts.len()]
    }
}
