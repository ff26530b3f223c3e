//! The one-shot utility function.
//!
//! [`OneShotUFun`] scores a bundle of supplies and sales for a single
//! simulation step. Exogenous contracts are folded in, production is bounded
//! by the number of lines and by what was sold, unprocessed input pays a
//! storage cost and undelivered output pays a delivery penalty:
//!
//! ```text
//! produced = min(Qin, n_lines, Qout)
//! u = Pout - Pin - production_cost * produced
//!     - storage_cost * input_penalty_scale * (Qin - produced)
//!     - delivery_penalty * output_penalty_scale * (Qout - produced)
//! ```
//!
//! Evaluation is pure: the function owns no mutable state.

use serde::{Deserialize, Serialize};

use crate::deal::{Deal, Side};
use crate::error::{CoreError, non_negative};
use crate::limits::{LimitResult, LimitSearch, Limits};
use crate::profile::{ExogenousContracts, NegotiationRanges, ProductionProfile};

/// How acceptance strategies score sales at a zero unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FreeSalePolicy {
    /// Score free sales like any other deal.
    Allow,
    /// Score any bundle containing a free sale as negative infinity.
    #[default]
    Reject,
}

/// Total quantities and money on both sides of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aggregates {
    /// Units received.
    pub input_quantity: u64,
    /// Money paid for received units.
    pub input_payment: f64,
    /// Units sold.
    pub output_quantity: u64,
    /// Money received for sold units.
    pub output_revenue: f64,
}

impl Aggregates {
    /// Adds a deal on the given side.
    pub fn add(&mut self, side: Side, deal: &Deal) {
        match side {
            Side::Input => {
                self.input_quantity += u64::from(deal.quantity);
                self.input_payment += deal.total_price();
            }
            Side::Output => {
                self.output_quantity += u64::from(deal.quantity);
                self.output_revenue += deal.total_price();
            }
        }
    }

    /// Average unit price paid for inputs; zero without inputs.
    #[must_use]
    pub fn average_input_price(&self) -> f64 {
        average(self.input_payment, self.input_quantity)
    }

    /// Average unit price received for outputs; zero without outputs.
    #[must_use]
    pub fn average_output_price(&self) -> f64 {
        average(self.output_revenue, self.output_quantity)
    }
}

fn average(money: f64, quantity: u64) -> f64 {
    if quantity == 0 { 0.0 } else { money / quantity as f64 }
}

/// Every term that makes up a utility value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UtilityBreakdown {
    /// Units processed.
    pub produced: u64,
    /// Units of input left unprocessed.
    pub excess_input: u64,
    /// Units sold but not produced.
    pub shortfall: u64,
    /// Money received for sales.
    pub revenue: f64,
    /// Money paid for supplies.
    pub payments: f64,
    /// Cost of processing.
    pub production_cost: f64,
    /// Cost of holding unprocessed input.
    pub storage_cost: f64,
    /// Penalty for undelivered output.
    pub delivery_penalty: f64,
    /// The resulting utility.
    pub utility: f64,
}

/// Utility function of one agent for one simulation step.
#[derive(Debug, Clone, PartialEq)]
pub struct OneShotUFun {
    profile: ProductionProfile,
    exogenous: ExogenousContracts,
    ranges: NegotiationRanges,
    n_input_negs: usize,
    n_output_negs: usize,
    force_exogenous: bool,
    current_step: usize,
}

impl OneShotUFun {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> OneShotUFunBuilder {
        OneShotUFunBuilder::default()
    }

    /// Production and penalty parameters.
    #[must_use]
    pub const fn profile(&self) -> &ProductionProfile {
        &self.profile
    }

    /// Exogenous contracts of the step.
    #[must_use]
    pub const fn exogenous(&self) -> &ExogenousContracts {
        &self.exogenous
    }

    /// Legal ranges of the open negotiations.
    #[must_use]
    pub const fn ranges(&self) -> &NegotiationRanges {
        &self.ranges
    }

    /// Number of concurrent supply negotiations.
    #[must_use]
    pub const fn n_input_negs(&self) -> usize {
        self.n_input_negs
    }

    /// Number of concurrent sale negotiations.
    #[must_use]
    pub const fn n_output_negs(&self) -> usize {
        self.n_output_negs
    }

    /// True when exogenous contracts are exact rather than expected values.
    #[must_use]
    pub const fn force_exogenous(&self) -> bool {
        self.force_exogenous
    }

    /// The simulation step this function scores.
    #[must_use]
    pub const fn current_step(&self) -> usize {
        self.current_step
    }

    /// Utility of a bundle of negotiated supplies and sales.
    #[must_use]
    pub fn evaluate(&self, input_deals: &[Deal], output_deals: &[Deal]) -> f64 {
        self.breakdown(input_deals, output_deals).utility
    }

    /// Utility of a bundle given as side-tagged deals.
    #[must_use]
    pub fn from_tagged(&self, deals: &[(Side, Deal)]) -> f64 {
        let mut aggregates = self.exogenous_aggregates(
            self.exogenous.input.quantity,
            self.exogenous.output.quantity,
        );
        for (side, deal) in deals {
            aggregates.add(*side, deal);
        }
        self.from_aggregates(&aggregates).utility
    }

    /// Utility with the free-sale override used by acceptance strategies.
    #[must_use]
    pub fn evaluate_guarded(
        &self,
        input_deals: &[Deal],
        output_deals: &[Deal],
        policy: FreeSalePolicy,
    ) -> f64 {
        if policy == FreeSalePolicy::Reject && output_deals.iter().any(Deal::is_free) {
            return f64::NEG_INFINITY;
        }
        self.evaluate(input_deals, output_deals)
    }

    /// Every utility term of a bundle, exogenous contracts at stated values.
    #[must_use]
    pub fn breakdown(&self, input_deals: &[Deal], output_deals: &[Deal]) -> UtilityBreakdown {
        self.breakdown_with_exogenous(
            self.exogenous.input.quantity,
            self.exogenous.output.quantity,
            input_deals,
            output_deals,
        )
    }

    /// Every utility term of a bundle with the given realized exogenous
    /// quantities (at the stated unit prices).
    #[must_use]
    pub fn breakdown_with_exogenous(
        &self,
        exogenous_input: u32,
        exogenous_output: u32,
        input_deals: &[Deal],
        output_deals: &[Deal],
    ) -> UtilityBreakdown {
        let mut aggregates = self.exogenous_aggregates(exogenous_input, exogenous_output);
        for deal in input_deals {
            aggregates.add(Side::Input, deal);
        }
        for deal in output_deals {
            aggregates.add(Side::Output, deal);
        }
        self.from_aggregates(&aggregates)
    }

    /// Scores totals directly.
    #[must_use]
    pub fn from_aggregates(&self, aggregates: &Aggregates) -> UtilityBreakdown {
        let profile = &self.profile;
        let produced = aggregates
            .input_quantity
            .min(u64::from(profile.n_lines))
            .min(aggregates.output_quantity);
        let excess_input = aggregates.input_quantity - produced;
        let shortfall = aggregates.output_quantity - produced;

        let production_cost = profile.production_cost * produced as f64;
        let storage_cost = profile.unit_storage_cost() * excess_input as f64;
        let delivery_penalty = profile.unit_delivery_penalty() * shortfall as f64;
        let utility = aggregates.output_revenue
            - aggregates.input_payment
            - production_cost
            - storage_cost
            - delivery_penalty;

        UtilityBreakdown {
            produced,
            excess_input,
            shortfall,
            revenue: aggregates.output_revenue,
            payments: aggregates.input_payment,
            production_cost,
            storage_cost,
            delivery_penalty,
            utility,
        }
    }

    /// Aggregates holding only the given exogenous realization.
    #[must_use]
    pub fn exogenous_aggregates(&self, input_quantity: u32, output_quantity: u32) -> Aggregates {
        let input_quantity = input_quantity.min(self.exogenous.input.quantity);
        let output_quantity = output_quantity.min(self.exogenous.output.quantity);
        Aggregates {
            input_quantity: u64::from(input_quantity),
            input_payment: self.exogenous.input.price_for(input_quantity),
            output_quantity: u64::from(output_quantity),
            output_revenue: self.exogenous.output.price_for(output_quantity),
        }
    }

    /// Best (`maximize`) or worst attainable utility this step.
    #[must_use]
    pub fn find_limit(&self, maximize: bool) -> LimitResult {
        LimitSearch::new(self).find(maximize)
    }

    /// Both attainable extremes.
    #[must_use]
    pub fn limits(&self) -> Limits {
        LimitSearch::new(self).find_both()
    }
}

/// Builder for [`OneShotUFun`]; validates everything in [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct OneShotUFunBuilder {
    profile: ProductionProfile,
    exogenous: ExogenousContracts,
    ranges: NegotiationRanges,
    n_input_negs: usize,
    n_output_negs: usize,
    force_exogenous: bool,
    current_step: usize,
}

impl OneShotUFunBuilder {
    /// Sets the production profile.
    #[must_use]
    pub const fn profile(mut self, profile: ProductionProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Sets the exogenous contracts.
    #[must_use]
    pub const fn exogenous(mut self, exogenous: ExogenousContracts) -> Self {
        self.exogenous = exogenous;
        self
    }

    /// Sets the negotiation ranges.
    #[must_use]
    pub const fn ranges(mut self, ranges: NegotiationRanges) -> Self {
        self.ranges = ranges;
        self
    }

    /// Sets the number of concurrent supply and sale negotiations.
    #[must_use]
    pub const fn negotiations(mut self, n_input_negs: usize, n_output_negs: usize) -> Self {
        self.n_input_negs = n_input_negs;
        self.n_output_negs = n_output_negs;
        self
    }

    /// Sets whether exogenous contracts are exact.
    #[must_use]
    pub const fn force_exogenous(mut self, force: bool) -> Self {
        self.force_exogenous = force;
        self
    }

    /// Sets the simulation step.
    #[must_use]
    pub const fn current_step(mut self, step: usize) -> Self {
        self.current_step = step;
        self
    }

    /// Validates the parameters and builds the utility function.
    pub fn build(self) -> Result<OneShotUFun, CoreError> {
        self.profile.validate()?;
        self.ranges.validate()?;
        non_negative("exogenous_input_price", self.exogenous.input.total_price)?;
        non_negative("exogenous_output_price", self.exogenous.output.total_price)?;
        Ok(OneShotUFun {
            profile: self.profile,
            exogenous: self.exogenous,
            ranges: self.ranges,
            n_input_negs: self.n_input_negs,
            n_output_negs: self.n_output_negs,
            force_exogenous: self.force_exogenous,
            current_step: self.current_step,
        })
    }
}
