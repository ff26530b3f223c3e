//! Best and worst attainable utility for one step.
//!
//! Two searches are provided:
//!
//! - **Brute force** enumerates every negotiation's outcome ("no agreement"
//!   or any integer quantity and price in range) for every possible
//!   exogenous realization. It is the ground truth and is capped.
//! - **Aggregate search** exploits the shape of the utility function: for
//!   fixed quantities utility is linear in each price, so the extremes sit
//!   at the price bounds, and only the *total* quantity per side matters.
//!   For a fixed total on the sale side, utility is piecewise linear in the
//!   supply total with a single kink where production stops growing, so
//!   only four supply totals need scoring.
//!
//! The analytic search ([`LimitSearch::optimal`]) is the aggregate search
//! under exact exogenous contracts.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::deal::{Deal, IssueRange};
use crate::error::CoreError;
use crate::ufun::{Aggregates, OneShotUFun};

/// Largest allowed gap between brute-force and analytic limits.
pub const LIMIT_TOLERANCE: f64 = 0.1;

/// Default cap on the number of outcomes brute force may enumerate.
pub const DEFAULT_MAX_OUTCOMES: u128 = 2_000_000;

/// Debug builds cross-check analytic limits against brute force below this size.
const CROSS_CHECK_OUTCOMES: u128 = 20_000;

/// An extreme utility together with the bundle that attains it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitResult {
    /// The extreme utility.
    pub utility: f64,
    /// Negotiated supplies of the bundle.
    pub input_deals: Vec<Deal>,
    /// Negotiated sales of the bundle.
    pub output_deals: Vec<Deal>,
    /// Realized exogenous input quantity.
    pub exogenous_input_quantity: u32,
    /// Realized exogenous output quantity.
    pub exogenous_output_quantity: u32,
}

impl LimitResult {
    /// Units bought through negotiation.
    #[must_use]
    pub fn negotiated_input_quantity(&self) -> u64 {
        self.input_deals.iter().map(|d| u64::from(d.quantity)).sum()
    }

    /// Units sold through negotiation.
    #[must_use]
    pub fn negotiated_output_quantity(&self) -> u64 {
        self.output_deals.iter().map(|d| u64::from(d.quantity)).sum()
    }
}

/// Best and worst limits together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    /// Highest attainable utility.
    pub best: LimitResult,
    /// Lowest attainable utility.
    pub worst: LimitResult,
}

impl Limits {
    /// Spread between best and worst utility.
    #[must_use]
    pub fn spread(&self) -> f64 {
        self.best.utility - self.worst.utility
    }
}

/// Limit search over a utility function.
#[derive(Debug, Clone, Copy)]
pub struct LimitSearch<'a> {
    ufun: &'a OneShotUFun,
    max_outcomes: u128,
}

impl<'a> LimitSearch<'a> {
    /// Creates a search with the default brute-force cap.
    #[must_use]
    pub const fn new(ufun: &'a OneShotUFun) -> Self {
        Self {
            ufun,
            max_outcomes: DEFAULT_MAX_OUTCOMES,
        }
    }

    /// Overrides the brute-force cap.
    #[must_use]
    pub const fn with_max_outcomes(mut self, max_outcomes: u128) -> Self {
        self.max_outcomes = max_outcomes;
        self
    }

    /// Number of outcomes brute force would enumerate.
    #[must_use]
    pub fn outcome_space_size(&self) -> u128 {
        let ranges = self.ufun.ranges();
        let per_side = |n: usize, quantity: IssueRange, price: IssueRange| {
            let options = u128::from(quantity.count()) * u128::from(price.count()) + 1;
            options.saturating_pow(u32::try_from(n).unwrap_or(u32::MAX))
        };
        per_side(self.ufun.n_input_negs(), ranges.input_quantity, ranges.input_price)
            .saturating_mul(per_side(
                self.ufun.n_output_negs(),
                ranges.output_quantity,
                ranges.output_price,
            ))
            .saturating_mul(self.realizations().count())
    }

    /// Exhaustive search for one extreme.
    pub fn brute_force(&self, maximize: bool) -> Result<LimitResult, CoreError> {
        let limits = self.brute_force_both()?;
        Ok(if maximize { limits.best } else { limits.worst })
    }

    /// Exhaustive search for both extremes in a single pass.
    pub fn brute_force_both(&self) -> Result<Limits, CoreError> {
        let size = self.outcome_space_size();
        if size > self.max_outcomes {
            return Err(CoreError::OutcomeSpaceTooLarge {
                size,
                limit: self.max_outcomes,
            });
        }

        let ranges = self.ufun.ranges();
        let n_in = self.ufun.n_input_negs();
        let slots: Vec<(IssueRange, IssueRange)> = std::iter::repeat_n(
            (ranges.input_quantity, ranges.input_price),
            n_in,
        )
        .chain(std::iter::repeat_n(
            (ranges.output_quantity, ranges.output_price),
            self.ufun.n_output_negs(),
        ))
        .collect();
        let radices: Vec<usize> = slots
            .iter()
            .map(|(q, p)| (q.count() * p.count()) as usize + 1)
            .collect();

        let mut best = Enumerated::sentinel(true);
        let mut worst = Enumerated::sentinel(false);
        for (exogenous_input, exogenous_output) in self.realizations().iter() {
            let base = self.ufun.exogenous_aggregates(exogenous_input, exogenous_output);
            let mut digits = vec![0usize; slots.len()];
            loop {
                let mut aggregates = base;
                for (i, (&digit, &(quantity, price))) in digits.iter().zip(&slots).enumerate() {
                    if let Some((q, p)) = decode(digit, quantity, price) {
                        let money = f64::from(q) * f64::from(p);
                        if i < n_in {
                            aggregates.input_quantity += u64::from(q);
                            aggregates.input_payment += money;
                        } else {
                            aggregates.output_quantity += u64::from(q);
                            aggregates.output_revenue += money;
                        }
                    }
                }
                let utility = self.ufun.from_aggregates(&aggregates).utility;
                if utility > best.utility {
                    best = Enumerated::record(utility, &digits, exogenous_input, exogenous_output);
                }
                if utility < worst.utility {
                    worst = Enumerated::record(utility, &digits, exogenous_input, exogenous_output);
                }
                if !advance(&mut digits, &radices) {
                    break;
                }
            }
        }

        debug!(
            outcomes = size,
            best = best.utility,
            worst = worst.utility,
            "brute-force limits"
        );
        Ok(Limits {
            best: best.into_result(self.ufun.current_step(), &slots, n_in),
            worst: worst.into_result(self.ufun.current_step(), &slots, n_in),
        })
    }

    /// Analytic search for one extreme; requires exact exogenous contracts.
    pub fn optimal(&self, maximize: bool) -> Result<LimitResult, CoreError> {
        if !self.ufun.force_exogenous() {
            return Err(CoreError::AnalyticUnavailable);
        }
        Ok(self.aggregate_search(maximize, self.realizations()))
    }

    /// Best available search for one extreme.
    ///
    /// Uses the analytic search when exogenous contracts are exact, brute
    /// force when the space fits the cap, and the aggregate search over every
    /// exogenous realization otherwise.
    #[must_use]
    pub fn find(&self, maximize: bool) -> LimitResult {
        let realizations = self.realizations();
        let result = if self.ufun.force_exogenous() {
            self.aggregate_search(maximize, realizations)
        } else {
            self.brute_force(maximize)
                .unwrap_or_else(|_| self.aggregate_search(maximize, realizations))
        };

        #[cfg(debug_assertions)]
        self.debug_cross_check(maximize, &result);

        result
    }

    /// Both extremes via [`find`](Self::find).
    #[must_use]
    pub fn find_both(&self) -> Limits {
        Limits {
            best: self.find(true),
            worst: self.find(false),
        }
    }

    /// Compares brute force against the analytic search.
    pub fn cross_check(&self) -> Result<(), CoreError> {
        let brute = self.brute_force_both()?;
        for (kind, maximize, expected) in [("best", true, &brute.best), ("worst", false, &brute.worst)] {
            let analytic = self.optimal(maximize)?;
            if (analytic.utility - expected.utility).abs() > LIMIT_TOLERANCE {
                return Err(CoreError::LimitDisagreement {
                    kind,
                    brute_force: expected.utility,
                    analytic: analytic.utility,
                });
            }
        }
        Ok(())
    }

    #[cfg(debug_assertions)]
    fn debug_cross_check(&self, maximize: bool, result: &LimitResult) {
        if !self.ufun.force_exogenous()
            || self.outcome_space_size() > CROSS_CHECK_OUTCOMES.min(self.max_outcomes)
        {
            return;
        }
        if let Ok(brute) = self.brute_force(maximize) {
            let gap = (brute.utility - result.utility).abs();
            if gap > LIMIT_TOLERANCE {
                tracing::error!(
                    maximize,
                    brute_force = brute.utility,
                    analytic = result.utility,
                    "limit search disagreement"
                );
            }
            debug_assert!(
                gap <= LIMIT_TOLERANCE,
                "limit search disagreement: brute force {} vs analytic {}",
                brute.utility,
                result.utility
            );
        }
    }

    /// Exogenous realizations the search must consider.
    fn realizations(&self) -> Realizations {
        let exogenous = self.ufun.exogenous();
        Realizations {
            input: exogenous.input.quantity,
            output: exogenous.output.quantity,
            exact: self.ufun.force_exogenous(),
        }
    }

    fn aggregate_search(&self, maximize: bool, realizations: Realizations) -> LimitResult {
        let ranges = self.ufun.ranges();
        let (input_price, output_price) = if maximize {
            (ranges.input_price.min, ranges.output_price.max)
        } else {
            (ranges.input_price.max, ranges.output_price.min)
        };
        let supplies = QuantitySet::reachable(self.ufun.n_input_negs(), ranges.input_quantity);
        let sales = QuantitySet::reachable(self.ufun.n_output_negs(), ranges.output_quantity);
        let lines = u64::from(self.ufun.profile().n_lines);

        let mut chosen = Chosen {
            utility: if maximize { f64::NEG_INFINITY } else { f64::INFINITY },
            supplied: 0,
            sold: 0,
            exogenous_input: 0,
            exogenous_output: 0,
        };
        for (exogenous_input, exogenous_output) in realizations.iter() {
            let base = self.ufun.exogenous_aggregates(exogenous_input, exogenous_output);
            for sold in sales.iter() {
                let processable = lines.min(base.output_quantity + sold);
                let kink = processable.saturating_sub(base.input_quantity);
                let candidates = [
                    Some(supplies.min()),
                    Some(supplies.max()),
                    supplies.floor(kink),
                    supplies.ceil(kink),
                ];
                for supplied in candidates.into_iter().flatten() {
                    let aggregates = Aggregates {
                        input_quantity: base.input_quantity + supplied,
                        input_payment: base.input_payment + supplied as f64 * f64::from(input_price),
                        output_quantity: base.output_quantity + sold,
                        output_revenue: base.output_revenue + sold as f64 * f64::from(output_price),
                    };
                    let utility = self.ufun.from_aggregates(&aggregates).utility;
                    let better = if maximize {
                        utility > chosen.utility
                    } else {
                        utility < chosen.utility
                    };
                    if better {
                        chosen = Chosen {
                            utility,
                            supplied,
                            sold,
                            exogenous_input,
                            exogenous_output,
                        };
                    }
                }
            }
        }

        let step = self.ufun.current_step();
        let deals = |total: u64, n: usize, range: IssueRange, price: u32| -> Vec<Deal> {
            split_quantity(total, n, range)
                .into_iter()
                .map(|quantity| Deal {
                    quantity,
                    time: step,
                    unit_price: f64::from(price),
                })
                .collect()
        };
        LimitResult {
            utility: chosen.utility,
            input_deals: deals(
                chosen.supplied,
                self.ufun.n_input_negs(),
                ranges.input_quantity,
                input_price,
            ),
            output_deals: deals(
                chosen.sold,
                self.ufun.n_output_negs(),
                ranges.output_quantity,
                output_price,
            ),
            exogenous_input_quantity: chosen.exogenous_input,
            exogenous_output_quantity: chosen.exogenous_output,
        }
    }
}

/// Exogenous quantities to search over: the stated pair when exogenous
/// contracts are exact, every pair up to it otherwise.
#[derive(Debug, Clone, Copy)]
struct Realizations {
    input: u32,
    output: u32,
    exact: bool,
}

impl Realizations {
    fn count(self) -> u128 {
        if self.exact {
            1
        } else {
            (u128::from(self.input) + 1) * (u128::from(self.output) + 1)
        }
    }

    fn iter(self) -> impl Iterator<Item = (u32, u32)> {
        let (inputs, outputs) = if self.exact {
            (self.input..=self.input, self.output..=self.output)
        } else {
            (0..=self.input, 0..=self.output)
        };
        inputs.flat_map(move |i| outputs.clone().map(move |o| (i, o)))
    }
}

#[derive(Debug, Clone, Copy)]
struct Chosen {
    utility: f64,
    supplied: u64,
    sold: u64,
    exogenous_input: u32,
    exogenous_output: u32,
}

/// An extreme found by enumeration, kept as odometer digits.
#[derive(Debug, Clone)]
struct Enumerated {
    utility: f64,
    digits: Vec<usize>,
    exogenous_input: u32,
    exogenous_output: u32,
}

impl Enumerated {
    fn sentinel(maximize: bool) -> Self {
        Self {
            utility: if maximize { f64::NEG_INFINITY } else { f64::INFINITY },
            digits: Vec::new(),
            exogenous_input: 0,
            exogenous_output: 0,
        }
    }

    fn record(utility: f64, digits: &[usize], exogenous_input: u32, exogenous_output: u32) -> Self {
        Self {
            utility,
            digits: digits.to_vec(),
            exogenous_input,
            exogenous_output,
        }
    }

    fn into_result(self, step: usize, slots: &[(IssueRange, IssueRange)], n_in: usize) -> LimitResult {
        let mut input_deals = Vec::new();
        let mut output_deals = Vec::new();
        for (i, (&digit, &(quantity, price))) in self.digits.iter().zip(slots).enumerate() {
            if let Some((q, p)) = decode(digit, quantity, price) {
                let deal = Deal {
                    quantity: q,
                    time: step,
                    unit_price: f64::from(p),
                };
                if i < n_in {
                    input_deals.push(deal);
                } else {
                    output_deals.push(deal);
                }
            }
        }
        LimitResult {
            utility: self.utility,
            input_deals,
            output_deals,
            exogenous_input_quantity: self.exogenous_input,
            exogenous_output_quantity: self.exogenous_output,
        }
    }
}

/// Digit 0 is "no agreement"; the rest index quantity-major `(q, p)` pairs.
fn decode(digit: usize, quantity: IssueRange, price: IssueRange) -> Option<(u32, u32)> {
    let index = digit.checked_sub(1)?;
    let prices = price.count() as usize;
    Some((
        quantity.min + (index / prices) as u32,
        price.min + (index % prices) as u32,
    ))
}

fn advance(digits: &mut [usize], radices: &[usize]) -> bool {
    for (digit, &radix) in digits.iter_mut().zip(radices) {
        *digit += 1;
        if *digit < radix {
            return true;
        }
        *digit = 0;
    }
    false
}

/// Totals that up to `n` deals with quantities in a range can add up to,
/// as sorted disjoint inclusive intervals. Always contains zero.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QuantitySet {
    intervals: Vec<(u64, u64)>,
}

impl QuantitySet {
    fn reachable(n: usize, range: IssueRange) -> Self {
        let (lo, hi) = (u64::from(range.min), u64::from(range.max));
        let mut intervals = vec![(0, 0)];
        for k in 1..=n as u64 {
            let (start, end) = (k * lo, k * hi);
            match intervals.last_mut() {
                Some(last) if start <= last.1 + 1 => last.1 = last.1.max(end),
                _ => intervals.push((start, end)),
            }
        }
        Self { intervals }
    }

    fn min(&self) -> u64 {
        self.intervals.first().map_or(0, |&(start, _)| start)
    }

    fn max(&self) -> u64 {
        self.intervals.last().map_or(0, |&(_, end)| end)
    }

    /// Largest member not above `x`.
    fn floor(&self, x: u64) -> Option<u64> {
        self.intervals
            .iter()
            .rev()
            .find(|&&(start, _)| start <= x)
            .map(|&(_, end)| end.min(x))
    }

    /// Smallest member not below `x`.
    fn ceil(&self, x: u64) -> Option<u64> {
        self.intervals
            .iter()
            .find(|&&(_, end)| end >= x)
            .map(|&(start, _)| start.max(x))
    }

    fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.intervals.iter().flat_map(|&(start, end)| start..=end)
    }
}

/// Splits a reachable total into at most `n` quantities inside `range`.
fn split_quantity(total: u64, n: usize, range: IssueRange) -> Vec<u32> {
    let (lo, hi) = (u64::from(range.min), u64::from(range.max));
    if total == 0 || n == 0 || hi == 0 {
        return Vec::new();
    }
    let parts = total.div_ceil(hi).clamp(1, n as u64);
    let mut remainder = total.saturating_sub(parts * lo);
    (0..parts)
        .map(|_| {
            let extra = remainder.min(hi - lo);
            remainder -= extra;
            (lo + extra) as u32
        })
        .collect()
}
