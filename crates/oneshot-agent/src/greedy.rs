//! A utility-driven agent.
//!
//! The greedy agent rebuilds this step's utility function from the world,
//! aims for the quantities of the best attainable bundle, and judges every
//! offer and contract by how it changes utility.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use oneshot_core::{
    AgentId, Contract, Deal, FreeSalePolicy, Limits, MechanismInfo, MechanismState,
    NegotiationRole, OneShotUFun, ResponseType, Side,
};

use crate::concession::ConcessionCurve;
use crate::config::{AgentConfig, GreedyConfig};
use crate::error::{AgentError, ConfigError};
use crate::ledger::{CapacityLedger, Category, LedgerPlan};
use crate::strategy::{
    OneShotStrategy, debug_check_ledger, feasible_times, has_valid_issues, record_failure,
    record_success,
};
use crate::world::{AgentWorld, make_ufun};

/// Registered name of the greedy strategy.
pub const GREEDY: &str = "greedy";

const UTILITY_TOLERANCE: f64 = 1e-9;

/// The greedy strategy.
#[derive(Debug)]
pub struct GreedyStrategy {
    config: GreedyConfig,
    policy: FreeSalePolicy,
    curve: ConcessionCurve,
    ledger: CapacityLedger,
    ufun: Option<OneShotUFun>,
    limits: Option<Limits>,
    committed: HashMap<(Category, AgentId), Deal>,
}

impl GreedyStrategy {
    /// Creates a greedy agent, rejecting an invalid configuration.
    pub fn new(config: &AgentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: config.greedy,
            policy: if config.avoid_free_sales {
                FreeSalePolicy::Reject
            } else {
                FreeSalePolicy::Allow
            },
            curve: ConcessionCurve::new(config.greedy.concession_exponent)?,
            ledger: CapacityLedger::new(0),
            ufun: None,
            limits: None,
            committed: HashMap::new(),
        })
    }

    /// Utility limits of the current step.
    #[must_use]
    pub const fn limits(&self) -> Option<&Limits> {
        self.limits.as_ref()
    }

    /// Utility of everything committed this step, plus `extra`, leaving out
    /// any commitment to `skip`.
    fn utility(
        &self,
        ufun: &OneShotUFun,
        skip: Option<(Category, &AgentId)>,
        extra: Option<(Category, Deal)>,
    ) -> f64 {
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let committed = self
            .committed
            .iter()
            .filter(|((category, partner), _)| skip != Some((*category, partner)))
            .map(|((category, _), deal)| (*category, *deal));
        for (category, deal) in committed.chain(extra) {
            match category {
                Category::Sales => outputs.push(deal),
                Category::Supplies => inputs.push(deal),
            }
        }
        ufun.evaluate_guarded(&inputs, &outputs, self.policy)
    }

    /// Units still missing to reach the best bundle on one side.
    fn needed(&self, category: Category) -> u64 {
        let Some(limits) = &self.limits else {
            return 0;
        };
        let target = match category {
            Category::Sales => limits.best.negotiated_output_quantity(),
            Category::Supplies => limits.best.negotiated_input_quantity(),
        };
        let committed: u64 = self
            .committed
            .iter()
            .filter(|((c, _), _)| *c == category)
            .map(|(_, deal)| u64::from(deal.quantity))
            .sum();
        target.saturating_sub(committed)
    }
}

impl OneShotStrategy for GreedyStrategy {
    fn name(&self) -> &'static str {
        GREEDY
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
        let ufun = make_ufun(awi)?;
        let limits = ufun.limits();
        let horizon = self.ledger.horizon();
        let step = awi.current_step();
        let lines = u64::from(awi.n_lines());
        let cap = |quantity: u64| u32::try_from(quantity.max(lines)).unwrap_or(u32::MAX);

        self.ledger.reset_for_step(
            LedgerPlan::uniform(horizon, step, cap(limits.best.negotiated_output_quantity())),
            LedgerPlan::uniform(horizon, step, cap(limits.best.negotiated_input_quantity())),
        )?;
        info!(
            agent = %awi.agent_id(),
            step,
            best = limits.best.utility,
            worst = limits.worst.utility,
            "utility limits computed"
        );
        self.committed.clear();
        self.ufun = Some(ufun);
        self.limits = Some(limits);
        Ok(())
    }

    fn propose(
        &mut self,
        awi: &dyn AgentWorld,
        info: &MechanismInfo,
        state: &MechanismState,
        role: NegotiationRole,
    ) -> Option<Deal> {
        let partner = info.partner_of(awi.agent_id())?.clone();
        let category = Category::for_selling(role.selling);
        self.ledger.release_tentative(category, &partner);
        if !has_valid_issues(info) {
            return None;
        }

        let needed = self.needed(category);
        if needed == 0 {
            debug!(partner = %partner, %category, "nothing left to trade");
            return None;
        }
        let &(time, least, most) = feasible_times(&self.ledger, category, info).first()?;
        let quantity = u32::try_from(needed).unwrap_or(u32::MAX).clamp(least, most);

        let low = f64::from(info.issues.unit_price.min);
        let high = f64::from(info.issues.unit_price.max);
        let (favourable, other) = if role.selling { (high, low) } else { (low, high) };
        let conceded = self
            .curve
            .interpolate(favourable, other, state.relative_time())
            .round();

        let ufun = self.ufun.as_ref()?;
        let baseline = self.utility(ufun, Some((category, &partner)), None);
        let with_price = |unit_price: f64| {
            let deal = Deal::new(quantity, time, unit_price).ok()?;
            let gain = self.utility(ufun, Some((category, &partner)), Some((category, deal)));
            (gain >= baseline - UTILITY_TOLERANCE).then_some(deal)
        };
        let offer = with_price(conceded).or_else(|| with_price(favourable))?;

        if let Err(err) = self
            .ledger
            .reserve_tentative(category, &partner, time, quantity)
        {
            warn!(partner = %partner, error = %err, "cannot reserve offer");
            return None;
        }
        debug_check_ledger(&self.ledger);
        debug!(partner = %partner, %category, time, quantity, unit_price = offer.unit_price, "proposing");
        Some(offer)
    }

    fn respond(
        &mut self,
        awi: &dyn AgentWorld,
        info: &MechanismInfo,
        state: &MechanismState,
        offer: &Deal,
        role: NegotiationRole,
    ) -> ResponseType {
        let Some(partner) = info.partner_of(awi.agent_id()).cloned() else {
            return ResponseType::Reject;
        };
        let (Some(ufun), Some(limits)) = (&self.ufun, &self.limits) else {
            warn!(negotiation = %info.id, "offer received before the step was planned");
            return ResponseType::Reject;
        };
        let category = Category::for_selling(role.selling);
        if !has_valid_issues(info)
            || offer.time >= self.ledger.horizon()
            || offer.quantity > self.ledger.available_excluding(category, offer.time, &partner)
            || offer.quantity < self.ledger.min(category, offer.time)
        {
            return ResponseType::Reject;
        }

        let without = self.utility(ufun, Some((category, &partner)), None);
        let with = self.utility(ufun, Some((category, &partner)), Some((category, *offer)));
        let margin = (limits.best.utility - without).max(0.0)
            * self.config.aspiration
            * self.curve.ratio(state.relative_time());
        if !with.is_finite() || with < without + margin {
            debug!(partner = %partner, with, without, margin, "offer not good enough");
            return ResponseType::Reject;
        }

        match self
            .ledger
            .accept(category, &partner, offer.time, offer.quantity)
        {
            Ok(()) => {
                self.committed.insert((category, partner), *offer);
                debug_check_ledger(&self.ledger);
                ResponseType::Accept
            }
            Err(err) => {
                warn!(partner = %partner, error = %err, "cannot accept offer");
                ResponseType::Reject
            }
        }
    }

    fn on_negotiation_success(
        &mut self,
        awi: &dyn AgentWorld,
        _info: &MechanismInfo,
        contract: &Contract,
    ) {
        let me = awi.agent_id();
        record_success(&mut self.ledger, me, contract);
        if let Some(partner) = contract.partner_of(me) {
            let category = Category::for_selling(contract.is_sale_for(me));
            self.committed
                .insert((category, partner.clone()), contract.agreement);
        }
    }

    fn on_negotiation_failure(&mut self, awi: &dyn AgentWorld, info: &MechanismInfo) {
        let me = awi.agent_id();
        record_failure(&mut self.ledger, me, info);
        if let Some(partner) = info.partner_of(me) {
            let category = Category::for_selling(&info.annotation.seller == me);
            self.committed.remove(&(category, partner.clone()));
        }
    }

    /// Signs sales from the highest price and supplies from the lowest,
    /// keeping each contract only if it does not lower utility.
    fn sign_all_contracts(&mut self, awi: &dyn AgentWorld, contracts: &[Contract]) -> Vec<bool> {
        let mut signatures = vec![false; contracts.len()];
        let Some(ufun) = &self.ufun else {
            warn!(agent = %awi.agent_id(), "contracts offered before the step was planned");
            return signatures;
        };
        let me = awi.agent_id();
        let (mut sales, mut supplies): (Vec<usize>, Vec<usize>) =
            (0..contracts.len()).partition(|&i| contracts[i].is_sale_for(me));
        let price = |i: usize| contracts[i].agreement.unit_price;
        sales.sort_by(|&a, &b| price(b).total_cmp(&price(a)));
        supplies.sort_by(|&a, &b| price(a).total_cmp(&price(b)));

        let mut signed: Vec<(Side, Deal)> = Vec::new();
        let mut current = ufun.from_tagged(&signed);
        for (side, i) in sales
            .into_iter()
            .map(|i| (Side::Output, i))
            .chain(supplies.into_iter().map(|i| (Side::Input, i)))
        {
            let deal = contracts[i].agreement;
            if side == Side::Output && self.policy == FreeSalePolicy::Reject && deal.is_free() {
                continue;
            }
            signed.push((side, deal));
            let candidate = ufun.from_tagged(&signed);
            if candidate >= current - UTILITY_TOLERANCE {
                signatures[i] = true;
                current = candidate;
            } else {
                signed.pop();
            }
        }
        debug!(agent = %me, utility = current, "contracts signed");
        signatures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oneshot_core::{
        Annotation, ChainRole, ExogenousContract, IssueRange, OutcomeSpace, TimeRange,
    };

    use crate::world::StaticWorld;

    /// An input agent holding ten units bought for 100 and two buyers
    /// paying between 15 and 25.
    fn world() -> StaticWorld {
        let mut world =
            StaticWorld::new("me", 10, 2, 0).with_partners(&["SELLER"], &["c1", "c2"]);
        world.system_agents = vec![AgentId::from("SELLER")];
        world.profile.role = ChainRole::Input;
        world.exogenous.input = ExogenousContract::new(10, 100.0).unwrap();
        world.ranges.output_quantity = IssueRange { min: 1, max: 10 };
        world.ranges.output_price = IssueRange { min: 15, max: 25 };
        world
    }

    fn ready(world: &StaticWorld) -> GreedyStrategy {
        let mut agent = GreedyStrategy::new(&AgentConfig::default()).unwrap();
        agent.init(world).unwrap();
        agent.before_step(world).unwrap();
        agent
    }

    fn sale_negotiation(partner: &str) -> MechanismInfo {
        MechanismInfo::bilateral(
            Annotation {
                seller: "me".into(),
                buyer: partner.into(),
                caller: partner.into(),
                product: 1,
            },
            OutcomeSpace {
                quantity: IssueRange { min: 1, max: 10 },
                time: TimeRange::at(0),
                unit_price: IssueRange { min: 15, max: 25 },
            },
        ).unwrap()
    }

    fn deal(quantity: u32, unit_price: f64) -> Deal {
        Deal::new(quantity, 0, unit_price).unwrap()
    }

    fn seller() -> NegotiationRole {
        NegotiationRole::seller(false)
    }

    // ==========================================================================
    // Planning
    // ==========================================================================

    #[test]
    fn plan_follows_the_best_bundle() {
        let world = world();
        let agent = ready(&world);
        let limits = agent.limits().unwrap();
        // Overselling pays: 25 per unit against a 1.5 penalty.
        assert_eq!(limits.best.negotiated_output_quantity(), 20);
        assert!((limits.best.utility - 375.0).abs() < 0.1);
        // Selling nothing leaves all ten units in storage.
        assert!((limits.worst.utility + 105.0).abs() < 0.1);
        assert_eq!(agent.ledger().max(Category::Sales, 0), 20);
        assert_eq!(agent.ledger().max(Category::Supplies, 0), 10);
    }

    #[test]
    fn invalid_world_is_an_error() {
        let mut world = world();
        world.profile.n_lines = 0;
        let mut agent = GreedyStrategy::new(&AgentConfig::default()).unwrap();
        agent.init(&world).unwrap();
        assert!(matches!(agent.before_step(&world), Err(AgentError::Core(_))));
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut config = AgentConfig::default();
        config.greedy.concession_exponent = 0.0;
        assert!(matches!(
            GreedyStrategy::new(&config),
            Err(ConfigError::OutOfRange { field: "greedy.concession_exponent", .. })
        ));
        config.greedy.concession_exponent = 2.0;
        config.greedy.aspiration = 1.5;
        assert!(GreedyStrategy::new(&config).is_err());
    }

    // ==========================================================================
    // Negotiation
    // ==========================================================================

    #[test]
    fn proposes_the_needed_quantity_at_the_best_price() {
        let world = world();
        let mut agent = ready(&world);
        let info = sale_negotiation("c1");
        let offer = agent
            .propose(&world, &info, &MechanismState::new(0, 20), seller())
            .unwrap();
        assert_eq!(offer, deal(10, 25.0));
        assert_eq!(agent.ledger().tentative(Category::Sales, 0), 10);

        let late = agent
            .propose(&world, &info, &MechanismState::new(19, 20), seller())
            .unwrap();
        assert_eq!(late, deal(10, 15.0));
        assert_eq!(agent.ledger().tentative(Category::Sales, 0), 10);
    }

    #[test]
    fn stops_proposing_once_the_target_is_met() {
        let world = world();
        let mut agent = ready(&world);
        let state = MechanismState::new(0, 20);
        for partner in ["c1", "c2"] {
            let info = sale_negotiation(partner);
            assert_eq!(agent.respond(&world, &info, &state, &deal(10, 25.0), seller()), ResponseType::Accept);
        }
        let third = sale_negotiation("c3");
        assert!(agent.propose(&world, &third, &state, seller()).is_none());
    }

    #[test]
    fn acceptance_margin_decays_over_time() {
        let world = world();
        let mut agent = ready(&world);
        let info = sale_negotiation("c1");
        // Early on an offer must close 30% of the gap to the best bundle.
        let early = MechanismState::new(0, 20);
        assert_eq!(agent.respond(&world, &info, &early, &deal(3, 15.0), seller()), ResponseType::Reject);
        assert_eq!(agent.respond(&world, &info, &early, &deal(10, 20.0), seller()), ResponseType::Accept);

        let other = sale_negotiation("c2");
        let late = MechanismState::new(19, 20);
        assert_eq!(agent.respond(&world, &other, &late, &deal(3, 15.0), seller()), ResponseType::Accept);
        assert!(agent.ledger().check_invariant().is_ok());
    }

    #[test]
    fn free_sales_are_never_accepted() {
        let world = world();
        let mut agent = ready(&world);
        let info = sale_negotiation("c1");
        let late = MechanismState::new(19, 20);
        assert_eq!(agent.respond(&world, &info, &late, &deal(5, 0.0), seller()), ResponseType::Reject);
    }

    #[test]
    fn failure_forgets_the_commitment() {
        let world = world();
        let mut agent = ready(&world);
        let info = sale_negotiation("c1");
        let state = MechanismState::new(0, 20);
        assert_eq!(agent.respond(&world, &info, &state, &deal(10, 25.0), seller()), ResponseType::Accept);
        assert_eq!(agent.needed(Category::Sales), 10);

        agent.on_negotiation_failure(&world, &info);
        assert_eq!(agent.needed(Category::Sales), 20);
        assert_eq!(agent.ledger().accepted(Category::Sales, 0), 0);
    }

    // ==========================================================================
    // Contracts
    // ==========================================================================

    #[test]
    fn signs_contracts_that_do_not_lower_utility() {
        let world = world();
        let mut agent = ready(&world);
        let sale = |partner: &str, quantity, price| {
            Contract::new(
                Annotation {
                    seller: "me".into(),
                    buyer: partner.into(),
                    caller: partner.into(),
                    product: 1,
                },
                deal(quantity, price),
            )
        };
        let contracts = vec![sale("c1", 5, 0.0), sale("c2", 10, 18.0), sale("c3", 10, 22.0)];
        let signatures = agent.sign_all_contracts(&world, &contracts);
        assert_eq!(signatures, vec![false, true, true]);
    }
}
