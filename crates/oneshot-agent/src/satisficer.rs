//! The satisficer: a rule-based agent that aims for a small, safe profit
//! every step.
//!
//! Each step the agent plans how much it can sell and buy per day, requests
//! negotiations with its partners, and then concedes over negotiation time
//! on price, quantity, and delivery time. One issue is picked at random per
//! round to concede on; the others lag one round behind. All offers and
//! acceptances go through the capacity ledger so concurrent negotiations
//! never overcommit a day.

use std::collections::HashMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use oneshot_core::{
    AgentId, Contract, Deal, IssueRange, MechanismInfo, MechanismState, NegotiationRole,
    ResponseType, TimeRange,
};

use crate::concession::{ConcessionCurve, ConcessionDimension};
use crate::config::{AgentConfig, SatisficerConfig};
use crate::error::{AgentError, ConfigError};
use crate::ledger::{CapacityLedger, Category, LedgerPlan};
use crate::strategy::{
    NegotiationStatus, OneShotStrategy, debug_check_ledger, feasible_times, has_valid_issues,
    record_failure, record_success,
};
use crate::world::{AgentWorld, NegotiationRequest};

/// Registered name of the satisficer.
pub const SATISFICER: &str = "satisficer";

/// Total quantities the agent wants to trade until the end of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TradeTargets {
    /// Units to sell.
    pub sales: u64,
    /// Units to buy.
    pub supplies: u64,
}

/// Ledger plans and targets computed at the start of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan {
    /// Per-day sale bounds.
    pub sales: LedgerPlan,
    /// Per-day supply bounds.
    pub supplies: LedgerPlan,
    /// Totals to reach.
    pub targets: TradeTargets,
}

/// The satisficer strategy.
#[derive(Debug)]
pub struct SatisficerStrategy {
    config: SatisficerConfig,
    avoid_free_sales: bool,
    rng: StdRng,
    ledger: CapacityLedger,
    price_curve: ConcessionCurve,
    quantity_curve: ConcessionCurve,
    time_curve: ConcessionCurve,
    production_cost: f64,
    market_share: f64,
    market_capacity: u64,
    targets: TradeTargets,
    next_dimension: HashMap<AgentId, ConcessionDimension>,
    statuses: HashMap<Uuid, NegotiationStatus>,
}

impl SatisficerStrategy {
    /// Creates a satisficer, rejecting an invalid configuration.
    pub fn new(config: &AgentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let satisficer = config.satisficer;
        Ok(Self {
            config: satisficer,
            avoid_free_sales: config.avoid_free_sales,
            rng: StdRng::seed_from_u64(config.seed),
            ledger: CapacityLedger::new(0),
            price_curve: ConcessionCurve::new(satisficer.concession.price)?,
            quantity_curve: ConcessionCurve::new(satisficer.concession.quantity)?,
            time_curve: ConcessionCurve::new(satisficer.concession.time)?,
            production_cost: 0.0,
            market_share: 1.0,
            market_capacity: 0,
            targets: TradeTargets::default(),
            next_dimension: HashMap::new(),
            statuses: HashMap::new(),
        })
    }

    /// Targets of the current step.
    #[must_use]
    pub const fn targets(&self) -> TradeTargets {
        self.targets
    }

    /// Status of a negotiation this step, if the agent has taken part in it.
    #[must_use]
    pub fn status(&self, negotiation: Uuid) -> Option<NegotiationStatus> {
        self.statuses.get(&negotiation).copied()
    }

    /// Computes the per-day plan for the current step.
    ///
    /// Sales happen after the first possible supply and before the products
    /// downstream run out of time to be processed. Each sale day is capped by
    /// the agent's share of the market's capacity; each supply day by what
    /// can still be sold later and, for finite balances, by what the agent
    /// can afford.
    pub fn plan(&self, awi: &dyn AgentWorld) -> StepPlan {
        let steps = awi.n_steps();
        let step = awi.current_step();
        let level = awi.my_input_product();
        let lines = u64::from(awi.n_lines());
        let available_input = u64::from(awi.inventory(level));
        let available_output = u64::from(awi.inventory(awi.my_output_product()));

        let first_supply = step.max(level);
        let last_sale = (steps + level + 1)
            .saturating_sub(awi.n_processes())
            .min(steps);
        let first_sale = first_supply + 1;
        let period = last_sale.saturating_sub(first_sale);

        let capacity = self.market_capacity.min(lines);
        let future_sales = (capacity as f64
            * self.market_share
            * period as f64
            * self.config.target_productivity)
            .round() as u64;
        let targets = TradeTargets {
            sales: future_sales + available_output + available_input,
            supplies: future_sales + available_output,
        };

        let mut sales = LedgerPlan::closed(steps);
        let mut supplies = LedgerPlan::closed(steps);
        if period > 0 {
            let mut planned = 0;
            for t in first_sale..last_sale {
                let room = targets.sales - planned;
                if room == 0 {
                    break;
                }
                let quantity = capacity.min(room);
                sales.max[t] = clamp_u32(quantity);
                planned += quantity;
            }

            let affordable = awi
                .balance()
                .affordable_units(awi.price_of(level))
                .map(u64::from);
            for t in first_supply..last_sale.saturating_sub(1) {
                let later: u64 = sales.max[t + 1..].iter().map(|&q| u64::from(q)).sum();
                let mut quantity = capacity.min(later);
                if let Some(affordable) = affordable {
                    quantity = quantity.min(affordable);
                }
                supplies.max[t] = clamp_u32(quantity);
            }
        }

        StepPlan {
            sales,
            supplies,
            targets,
        }
    }

    /// Price past which the agent will not go while negotiating.
    fn acceptable_price(&self, awi: &dyn AgentWorld, selling: bool) -> f64 {
        if selling {
            awi.price_of(awi.my_output_product()) * (1.0 - self.config.acceptable_loss)
        } else {
            awi.price_of(awi.my_input_product()) * (1.0 + self.config.acceptable_loss)
        }
    }

    /// Price at the centre of requested negotiation ranges.
    fn agenda_price(&self, awi: &dyn AgentWorld, selling: bool) -> f64 {
        let input = awi.price_of(awi.my_input_product());
        let output = awi.price_of(awi.my_output_product());
        let profit = self.config.satisfying_profit;
        if selling {
            output.max((1.0 + profit) * (input + self.production_cost))
        } else {
            input.min((1.0 - profit) * (output - self.production_cost))
        }
    }

    fn is_good_price(&self, awi: &dyn AgentWorld, selling: bool, price: f64, slack: f64) -> bool {
        let input = awi.price_of(awi.my_input_product());
        let output = awi.price_of(awi.my_output_product());
        let profit = self.config.satisfying_profit;
        if selling {
            price > (1.0 + profit - slack) * (input + self.production_cost)
        } else {
            price < (1.0 - profit + slack) * (output - self.production_cost)
        }
    }

    /// Concession ratios for time, quantity, and price this round.
    fn ratios(&mut self, partner: &AgentId, state: &MechanismState) -> (f64, f64, f64) {
        let dimension = self
            .next_dimension
            .remove(partner)
            .unwrap_or_else(|| ConcessionDimension::random(&mut self.rng));
        let now = state.relative_time();
        let before = state.previous_relative_time();
        let elapsed = |d: ConcessionDimension| if d == dimension { now } else { before };
        let ratios = (
            self.time_curve.ratio(elapsed(ConcessionDimension::Time)),
            self.quantity_curve.ratio(elapsed(ConcessionDimension::Quantity)),
            self.price_curve.ratio(elapsed(ConcessionDimension::Price)),
        );
        self.next_dimension
            .insert(partner.clone(), ConcessionDimension::random(&mut self.rng));
        ratios
    }

    fn request_for(&self, awi: &dyn AgentWorld, selling: bool) -> Option<NegotiationRequest> {
        let step = awi.current_step();
        let (category, product, partners) = if selling {
            (Category::Sales, awi.my_output_product(), awi.my_consumers())
        } else {
            (Category::Supplies, awi.my_input_product(), awi.my_suppliers())
        };

        let limit = self.ledger.max_available_from(category, step);
        if limit < 1 {
            return None;
        }
        // Raw material and final products are traded with the system only.
        if (selling && product >= awi.n_processes()) || (!selling && product < 1) {
            return None;
        }
        let partners: Vec<AgentId> = partners
            .iter()
            .filter(|p| !awi.is_system(p))
            .cloned()
            .collect();
        if partners.is_empty() {
            return None;
        }

        let first = if selling { step + 1 } else { step };
        let last = (first..self.ledger.horizon())
            .rev()
            .find(|&t| self.ledger.available(category, t) > 0)?;
        let time = TimeRange::new(first, last.min(first + self.config.horizon));
        if time.is_empty() {
            return None;
        }

        let price = self.agenda_price(awi, selling);
        let half_width = awi.price_of(product) * self.config.price_range / 2.0;
        let low = (price - half_width).max(0.0).floor() as u32;
        let high = ((price + half_width + 0.5).floor() as u32).max(low);

        Some(NegotiationRequest {
            selling,
            product,
            quantity: IssueRange { min: 1, max: limit },
            unit_price: IssueRange { min: low, max: high },
            time,
            partners,
        })
    }
}

impl OneShotStrategy for SatisficerStrategy {
    fn name(&self) -> &'static str {
        SATISFICER
    }

    fn ledger(&self) -> &CapacityLedger {
        &self.ledger
    }

    fn ledger_mut(&mut self) -> &mut CapacityLedger {
        &mut self.ledger
    }

    fn init(&mut self, awi: &dyn AgentWorld) -> Result<(), AgentError> {
        self.ledger = CapacityLedger::new(awi.n_steps());
        self.production_cost = awi.profile().production_cost;
        self.market_share = self.config.market_share.fraction(awi.n_competitors());
        self.market_capacity = u64::from(awi.n_lines()) * awi.min_consumers_per_process() as u64;
        if awi.my_suppliers().is_empty() || awi.my_consumers().is_empty() {
            warn!(agent = %awi.agent_id(), "agent is missing suppliers or consumers");
        }
        info!(
            agent = %awi.agent_id(),
            market_share = self.market_share,
            market_capacity = self.market_capacity,
            "satisficer initialized"
        );
        Ok(())
    }

    fn before_step(&mut self, awi: &dyn AgentWorld) -> Result<(), AgentError> {
        if self.ledger.horizon() != awi.n_steps() {
            return Err(AgentError::World(format!(
                "ledger covers {} steps but the world has {}; was init called?",
                self.ledger.horizon(),
                awi.n_steps()
            )));
        }
        let plan = self.plan(awi);
        self.ledger.reset_for_step(plan.sales, plan.supplies)?;
        self.targets = plan.targets;
        self.next_dimension.clear();
        self.statuses.clear();
        info!(
            agent = %awi.agent_id(),
            step = awi.current_step(),
            target_sales = self.targets.sales,
            target_supplies = self.targets.supplies,
            "step planned"
        );
        Ok(())
    }

    fn step(&mut self, awi: &mut dyn AgentWorld) -> Result<(), AgentError> {
        let level = awi.my_input_product();
        let lines = awi.n_lines();
        let inputs = awi.inventory(level).min(lines);
        awi.set_commands((0..lines).map(|line| (line < inputs).then_some(level)).collect());

        for selling in [false, true] {
            if let Some(request) = self.request_for(awi, selling) {
                info!(
                    agent = %awi.agent_id(),
                    selling,
                    partners = request.partners.len(),
                    max_quantity = request.quantity.max,
                    "requesting negotiations"
                );
                awi.request_negotiations(request);
            }
        }
        Ok(())
    }

    fn propose(
        &mut self,
        awi: &dyn AgentWorld,
        info: &MechanismInfo,
        state: &MechanismState,
        role: NegotiationRole,
    ) -> Option<Deal> {
        let Some(partner) = info.partner_of(awi.agent_id()).cloned() else {
            warn!(negotiation = %info.id, "negotiation has no partner");
            return None;
        };
        let category = Category::for_selling(role.selling);
        // The previous offer is implicitly rejected by the partner's turn.
        self.ledger.release_tentative(category, &partner);
        self.statuses.entry(info.id).or_insert(NegotiationStatus::Active);
        if !has_valid_issues(info) {
            return None;
        }

        let (r_time, r_quantity, r_price) = self.ratios(&partner, state);
        let p0 = f64::from(info.issues.unit_price.min);
        let p1 = f64::from(info.issues.unit_price.max);
        let acceptable = self.acceptable_price(awi, role.selling);
        let (price, r_time) = if role.selling {
            ((p1 - acceptable).mul_add(r_price, acceptable), r_time)
        } else {
            // Buyers start low, and ask for early delivery first.
            ((acceptable - p0).mul_add(-r_price, acceptable), 1.0 - r_time)
        };

        let times = feasible_times(&self.ledger, category, info);
        if times.is_empty() {
            debug!(partner = %partner, selling = role.selling, "no feasible delivery time");
            return None;
        }
        let index = ((times.len() as f64).mul_add(r_time, 0.5) as usize).min(times.len() - 1);
        let (time, least, most) = times[index];
        let quantity = if most == least {
            most
        } else {
            (least + (f64::from(most - least) * r_quantity) as u32).clamp(least, most)
        };

        let mut unit_price = (price + 0.5).floor().clamp(p0, p1);
        if role.selling && self.avoid_free_sales && unit_price <= 0.0 && quantity > 0 {
            if p1 <= 0.0 {
                return None;
            }
            unit_price = p1.min(1.0);
        }

        if let Err(err) = self
            .ledger
            .reserve_tentative(category, &partner, time, quantity)
        {
            warn!(partner = %partner, error = %err, "cannot reserve offer");
            return None;
        }
        debug_check_ledger(&self.ledger);
        debug!(partner = %partner, selling = role.selling, time, quantity, unit_price, "proposing");
        Some(Deal {
            quantity,
            time,
            unit_price,
        })
    }

    fn respond(
        &mut self,
        awi: &dyn AgentWorld,
        info: &MechanismInfo,
        state: &MechanismState,
        offer: &Deal,
        role: NegotiationRole,
    ) -> ResponseType {
        let me = awi.agent_id();
        let Some(partner) = info.partner_of(me).cloned() else {
            warn!(negotiation = %info.id, "negotiation has no partner");
            return ResponseType::Reject;
        };
        let category = Category::for_selling(role.selling);
        self.statuses.entry(info.id).or_insert(NegotiationStatus::Active);
        if !has_valid_issues(info) {
            return ResponseType::Reject;
        }

        let (quantity, time) = (offer.quantity, offer.time);
        if time >= self.ledger.horizon() {
            debug!(partner = %partner, time, "offer outside horizon");
            return ResponseType::Reject;
        }
        // Accepting supersedes our own standing offer to this partner.
        if quantity > self.ledger.available_excluding(category, time, &partner)
            || quantity < self.ledger.min(category, time)
        {
            debug!(partner = %partner, time, quantity, "offer exceeds capacity");
            return ResponseType::Reject;
        }
        if role.selling && self.avoid_free_sales && offer.is_free() {
            return ResponseType::Reject;
        }

        let p0 = f64::from(info.issues.unit_price.min);
        let p1 = f64::from(info.issues.unit_price.max);
        let worst = if info.requested_by(me) {
            if role.selling { p0 } else { p1 }
        } else {
            self.acceptable_price(awi, role.selling)
        };
        let r = self.price_curve.ratio(state.relative_time());
        let good = if role.selling {
            offer.unit_price >= (p1 - worst).mul_add(r, worst)
        } else {
            offer.unit_price <= (worst - p0).mul_add(-r, worst)
        };
        if !good {
            return ResponseType::Reject;
        }

        match self.ledger.accept(category, &partner, time, quantity) {
            Ok(()) => {
                self.statuses.insert(info.id, NegotiationStatus::Accepted);
                debug_check_ledger(&self.ledger);
                debug!(partner = %partner, time, quantity, unit_price = offer.unit_price, "accepting");
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
        info: &MechanismInfo,
        contract: &Contract,
    ) {
        self.statuses.insert(info.id, NegotiationStatus::Accepted);
        record_success(&mut self.ledger, awi.agent_id(), contract);
    }

    fn on_negotiation_failure(&mut self, awi: &dyn AgentWorld, info: &MechanismInfo) {
        self.statuses.insert(info.id, NegotiationStatus::Failed);
        record_failure(&mut self.ledger, awi.agent_id(), info);
    }

    /// Signs the best-priced contracts first while totals stay under target
    /// and each day stays under its planned maximum.
    fn sign_all_contracts(&mut self, awi: &dyn AgentWorld, contracts: &[Contract]) -> Vec<bool> {
        let me = awi.agent_id();
        let mut signatures = vec![false; contracts.len()];
        let (mut sales, mut supplies): (Vec<usize>, Vec<usize>) =
            (0..contracts.len()).partition(|&i| contracts[i].is_sale_for(me));
        let agreement = |i: usize| contracts[i].agreement;
        sales.sort_by(|&a, &b| {
            agreement(b)
                .unit_price
                .total_cmp(&agreement(a).unit_price)
                .then(agreement(a).quantity.cmp(&agreement(b).quantity))
        });
        supplies.sort_by(|&a, &b| {
            agreement(a)
                .unit_price
                .total_cmp(&agreement(b).unit_price)
                .then(agreement(a).quantity.cmp(&agreement(b).quantity))
        });

        let slack = self.config.satisfying_profit * 1.5;
        for (selling, order, target) in [
            (false, supplies, self.targets.supplies),
            (true, sales, self.targets.sales),
        ] {
            let category = Category::for_selling(selling);
            let mut total = 0u64;
            let mut per_day: HashMap<usize, u64> = HashMap::new();
            for i in order {
                if total >= target {
                    break;
                }
                let deal = agreement(i);
                let room = u64::from(self.ledger.max(category, deal.time))
                    .saturating_sub(u64::from(self.ledger.secured(category, deal.time)));
                let day = per_day.entry(deal.time).or_default();
                if *day + u64::from(deal.quantity) > room {
                    continue;
                }
                if !self.is_good_price(awi, selling, deal.unit_price, slack) {
                    continue;
                }
                signatures[i] = true;
                *day += u64::from(deal.quantity);
                total += u64::from(deal.quantity);
            }
        }
        debug!(
            agent = %me,
            offered = contracts.len(),
            signed = signatures.iter().filter(|&&s| s).count(),
            "signing contracts"
        );
        signatures
    }
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
