//! Per-step capacity bookkeeping across concurrent negotiations.
//!
//! For every step the ledger tracks, separately for sales and supplies, how
//! much the agent plans to trade at most (`max`) and at least (`min`), and
//! how much of that capacity is committed:
//!
//! - *tentative*: offered to a partner but not yet agreed
//! - *accepted*: agreed in negotiation but not yet signed
//! - *secured*: signed contracts
//!
//! The invariant `tentative[t] + accepted[t] + secured[t] <= max[t]` holds
//! after every operation that succeeds. Quantities are per step; a unit
//! committed at step `t` consumes capacity at `t` only.
//!
//! Each partner holds at most one tentative reservation per category, so
//! releasing a reservation twice is a no-op.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use oneshot_core::{AgentId, Side};

use crate::error::LedgerError;

/// Which side of the ledger an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Units the agent sells.
    Sales,
    /// Units the agent buys.
    Supplies,
}

impl Category {
    /// The category of a negotiation in which the agent sells or buys.
    #[must_use]
    pub const fn for_selling(selling: bool) -> Self {
        if selling { Self::Sales } else { Self::Supplies }
    }
}

impl From<Side> for Category {
    fn from(side: Side) -> Self {
        Self::for_selling(side.is_output())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sales => f.write_str("sales"),
            Self::Supplies => f.write_str("supplies"),
        }
    }
}

/// Planned bounds for one category, indexed by step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerPlan {
    /// Most units to trade at each step.
    pub max: Vec<u32>,
    /// Fewest units to trade at each step.
    pub min: Vec<u32>,
}

impl LedgerPlan {
    /// A plan allowing nothing.
    #[must_use]
    pub fn closed(horizon: usize) -> Self {
        Self {
            max: vec![0; horizon],
            min: vec![0; horizon],
        }
    }

    /// A plan allowing `max` units at every step from `from` on.
    #[must_use]
    pub fn uniform(horizon: usize, from: usize, max: u32) -> Self {
        let mut plan = Self::closed(horizon);
        for slot in plan.max.iter_mut().skip(from) {
            *slot = max;
        }
        plan
    }

    fn validate(&self, category: Category, horizon: usize) -> Result<(), LedgerError> {
        if self.max.len() != horizon || self.min.len() != horizon {
            return Err(LedgerError::InvalidPlan {
                reason: format!(
                    "{category} plan covers {}/{} steps, expected {horizon}",
                    self.max.len(),
                    self.min.len()
                ),
            });
        }
        if let Some(t) = (0..horizon).find(|&t| self.min[t] > self.max[t]) {
            return Err(LedgerError::InvalidPlan {
                reason: format!(
                    "{category} min {} exceeds max {} at step {t}",
                    self.min[t], self.max[t]
                ),
            });
        }
        Ok(())
    }
}

/// A quantity held for a partner at one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reservation {
    /// Step index.
    pub time: usize,
    /// Units held.
    pub quantity: u32,
}

#[derive(Debug, Clone, Default)]
struct Book {
    max: Vec<u32>,
    min: Vec<u32>,
    tentative: Vec<u32>,
    accepted: Vec<u32>,
    secured: Vec<u32>,
    reservations: HashMap<AgentId, Reservation>,
    pending: HashMap<AgentId, Reservation>,
}

impl Book {
    fn new(horizon: usize) -> Self {
        Self {
            max: vec![0; horizon],
            min: vec![0; horizon],
            tentative: vec![0; horizon],
            accepted: vec![0; horizon],
            secured: vec![0; horizon],
            reservations: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    fn load(&self, t: usize) -> u64 {
        u64::from(self.tentative[t]) + u64::from(self.accepted[t]) + u64::from(self.secured[t])
    }

    fn available(&self, t: usize) -> u64 {
        u64::from(self.max[t]).saturating_sub(self.load(t))
    }

    fn release(&mut self, partner: &AgentId) -> Option<Reservation> {
        let reservation = self.reservations.remove(partner)?;
        let slot = &mut self.tentative[reservation.time];
        *slot = slot.saturating_sub(reservation.quantity);
        Some(reservation)
    }
}

/// Capacity ledger for sales and supplies over a fixed horizon of steps.
#[derive(Debug, Clone)]
pub struct CapacityLedger {
    horizon: usize,
    sales: Book,
    supplies: Book,
}

impl CapacityLedger {
    /// Creates an empty ledger (every `max` is zero) over `horizon` steps.
    #[must_use]
    pub fn new(horizon: usize) -> Self {
        Self {
            horizon,
            sales: Book::new(horizon),
            supplies: Book::new(horizon),
        }
    }

    /// Number of tracked steps.
    #[must_use]
    pub const fn horizon(&self) -> usize {
        self.horizon
    }

    const fn book(&self, category: Category) -> &Book {
        match category {
            Category::Sales => &self.sales,
            Category::Supplies => &self.supplies,
        }
    }

    const fn book_mut(&mut self, category: Category) -> &mut Book {
        match category {
            Category::Sales => &mut self.sales,
            Category::Supplies => &mut self.supplies,
        }
    }

    const fn check_time(&self, time: usize) -> Result<(), LedgerError> {
        if time < self.horizon {
            Ok(())
        } else {
            Err(LedgerError::OutOfHorizon {
                time,
                horizon: self.horizon,
            })
        }
    }

    /// Starts a new step: installs fresh plans and forgets every tentative
    /// and accepted quantity. Secured quantities persist, and each `max` is
    /// raised to at least what is already secured.
    pub fn reset_for_step(&mut self, sales: LedgerPlan, supplies: LedgerPlan) -> Result<(), LedgerError> {
        sales.validate(Category::Sales, self.horizon)?;
        supplies.validate(Category::Supplies, self.horizon)?;
        for (book, plan) in [(&mut self.sales, sales), (&mut self.supplies, supplies)] {
            book.max = plan
                .max
                .iter()
                .zip(&book.secured)
                .map(|(&max, &secured)| max.max(secured))
                .collect();
            book.min = plan.min;
            book.tentative.fill(0);
            book.accepted.fill(0);
            book.reservations.clear();
            book.pending.clear();
        }
        Ok(())
    }

    /// Holds `quantity` units at `time` for `partner`, replacing any previous
    /// reservation of that partner in this category.
    ///
    /// A zero quantity only releases the previous reservation.
    pub fn reserve_tentative(
        &mut self,
        category: Category,
        partner: &AgentId,
        time: usize,
        quantity: u32,
    ) -> Result<(), LedgerError> {
        self.check_time(time)?;
        let book = self.book_mut(category);
        book.release(partner);
        if quantity == 0 {
            return Ok(());
        }
        let available = book.available(time);
        if u64::from(quantity) > available {
            return Err(LedgerError::Overflow {
                category,
                time,
                requested: u64::from(quantity),
                available,
            });
        }
        book.tentative[time] += quantity;
        book.reservations
            .insert(partner.clone(), Reservation { time, quantity });
        debug!(%category, partner = %partner, time, quantity, "tentative reservation");
        Ok(())
    }

    /// Drops the partner's tentative reservation. Idempotent.
    pub fn release_tentative(&mut self, category: Category, partner: &AgentId) -> Option<Reservation> {
        self.book_mut(category).release(partner)
    }

    /// Records acceptance of a partner's offer, superseding their tentative
    /// reservation.
    pub fn accept(
        &mut self,
        category: Category,
        partner: &AgentId,
        time: usize,
        quantity: u32,
    ) -> Result<(), LedgerError> {
        self.check_time(time)?;
        let book = self.book_mut(category);
        let previous = book.release(partner);
        let stale = book.pending.remove(partner);
        if let Some(stale) = stale {
            warn!(%category, partner = %partner, time = stale.time, quantity = stale.quantity, "replacing pending acceptance");
            book.accepted[stale.time] = book.accepted[stale.time].saturating_sub(stale.quantity);
        }
        let available = book.available(time);
        if u64::from(quantity) > available {
            // A refusal leaves the book as it was.
            if let Some(reservation) = previous {
                book.tentative[reservation.time] += reservation.quantity;
                book.reservations.insert(partner.clone(), reservation);
            }
            if let Some(stale) = stale {
                book.accepted[stale.time] += stale.quantity;
                book.pending.insert(partner.clone(), stale);
            }
            return Err(LedgerError::Overflow {
                category,
                time,
                requested: u64::from(quantity),
                available,
            });
        }
        book.accepted[time] += quantity;
        book.pending
            .insert(partner.clone(), Reservation { time, quantity });
        debug!(%category, partner = %partner, time, quantity, "accepted");
        Ok(())
    }

    /// Records a concluded negotiation.
    ///
    /// If the agreement was already recorded by [`accept`](Self::accept) it
    /// is not counted again.
    pub fn on_success(
        &mut self,
        category: Category,
        partner: &AgentId,
        time: usize,
        quantity: u32,
    ) -> Result<(), LedgerError> {
        self.check_time(time)?;
        let book = self.book_mut(category);
        book.release(partner);
        match book.pending.remove(partner) {
            Some(pending) if pending == (Reservation { time, quantity }) => return Ok(()),
            Some(pending) => {
                warn!(%category, partner = %partner, "agreement differs from accepted offer");
                let slot = &mut book.accepted[pending.time];
                *slot = slot.saturating_sub(pending.quantity);
            }
            None => {}
        }
        let available = book.available(time);
        book.accepted[time] += quantity;
        if u64::from(quantity) > available {
            error!(%category, partner = %partner, time, quantity, available, "agreement exceeds planned capacity");
            return Err(LedgerError::Overflow {
                category,
                time,
                requested: u64::from(quantity),
                available,
            });
        }
        Ok(())
    }

    /// Records a failed negotiation, dropping anything held for the partner.
    pub fn on_failure(&mut self, category: Category, partner: &AgentId) {
        let book = self.book_mut(category);
        book.release(partner);
        if let Some(pending) = book.pending.remove(partner) {
            let slot = &mut book.accepted[pending.time];
            *slot = slot.saturating_sub(pending.quantity);
        }
    }

    /// Moves a signed contract from accepted to secured.
    ///
    /// A signed quantity that was never accepted is still secured. If it
    /// does not fit the day, the overflow is returned and the invariant check
    /// keeps reporting it until the next step lifts `max`.
    pub fn finalize(&mut self, category: Category, time: usize, quantity: u32) -> Result<(), LedgerError> {
        self.check_time(time)?;
        let book = self.book_mut(category);
        let consumed = book.accepted[time].min(quantity);
        let unaccepted = quantity - consumed;
        let available = book.available(time);
        book.accepted[time] -= consumed;
        book.secured[time] += quantity;
        if u64::from(unaccepted) > available {
            error!(%category, time, quantity, available, "signed contract exceeds planned capacity");
            return Err(LedgerError::Overflow {
                category,
                time,
                requested: u64::from(unaccepted),
                available,
            });
        }
        Ok(())
    }

    /// Forgets an accepted quantity whose contract was not signed.
    pub fn cancel(&mut self, category: Category, time: usize, quantity: u32) -> Result<(), LedgerError> {
        self.check_time(time)?;
        let book = self.book_mut(category);
        book.accepted[time] = book.accepted[time].saturating_sub(quantity);
        Ok(())
    }

    /// Uncommitted capacity at `time`; zero outside the horizon.
    #[must_use]
    pub fn available(&self, category: Category, time: usize) -> u32 {
        if time >= self.horizon {
            return 0;
        }
        clamp_u32(self.book(category).available(time))
    }

    /// Uncommitted capacity at `time`, counting `partner`'s own reservation
    /// and pending acceptance as free, since a new acceptance supersedes both.
    #[must_use]
    pub fn available_excluding(&self, category: Category, time: usize, partner: &AgentId) -> u32 {
        if time >= self.horizon {
            return 0;
        }
        let book = self.book(category);
        let own = [book.reservations.get(partner), book.pending.get(partner)]
            .into_iter()
            .flatten()
            .filter(|r| r.time == time)
            .map(|r| u64::from(r.quantity))
            .sum::<u64>();
        clamp_u32(book.available(time) + own)
    }

    /// Largest uncommitted capacity at any step from `start` on.
    #[must_use]
    pub fn max_available_from(&self, category: Category, start: usize) -> u32 {
        (start..self.horizon)
            .map(|t| self.available(category, t))
            .max()
            .unwrap_or(0)
    }

    /// Planned maximum at `time`.
    #[must_use]
    pub fn max(&self, category: Category, time: usize) -> u32 {
        self.book(category).max.get(time).copied().unwrap_or(0)
    }

    /// Planned minimum at `time`.
    #[must_use]
    pub fn min(&self, category: Category, time: usize) -> u32 {
        self.book(category).min.get(time).copied().unwrap_or(0)
    }

    /// Tentative quantity at `time`.
    #[must_use]
    pub fn tentative(&self, category: Category, time: usize) -> u32 {
        self.book(category).tentative.get(time).copied().unwrap_or(0)
    }

    /// Accepted quantity at `time`.
    #[must_use]
    pub fn accepted(&self, category: Category, time: usize) -> u32 {
        self.book(category).accepted.get(time).copied().unwrap_or(0)
    }

    /// Secured quantity at `time`.
    #[must_use]
    pub fn secured(&self, category: Category, time: usize) -> u32 {
        self.book(category).secured.get(time).copied().unwrap_or(0)
    }

    /// The partner's current tentative reservation, if any.
    #[must_use]
    pub fn reservation(&self, category: Category, partner: &AgentId) -> Option<Reservation> {
        self.book(category).reservations.get(partner).copied()
    }

    /// Verifies `tentative + accepted + secured <= max` at every step.
    pub fn check_invariant(&self) -> Result<(), LedgerError> {
        for category in [Category::Sales, Category::Supplies] {
            let book = self.book(category);
            for time in 0..self.horizon {
                let load = book.load(time);
                let max = u64::from(book.max[time]);
                if load > max {
                    return Err(LedgerError::Overflow {
                        category,
                        time,
                        requested: load,
                        available: max,
                    });
                }
            }
        }
        Ok(())
    }
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn partner(name: &str) -> AgentId {
        AgentId::from(name)
    }

    fn ledger_with(max: u32) -> CapacityLedger {
        let mut ledger = CapacityLedger::new(4);
        ledger
            .reset_for_step(LedgerPlan::uniform(4, 0, max), LedgerPlan::uniform(4, 0, max))
            .unwrap();
        ledger
    }

    // ==========================================================================
    // Reservations
    // ==========================================================================

    #[test]
    fn reservation_replaces_previous_offer() {
        let mut ledger = ledger_with(10);
        let a = partner("a");
        ledger.reserve_tentative(Category::Sales, &a, 1, 4).unwrap();
        ledger.reserve_tentative(Category::Sales, &a, 2, 3).unwrap();
        assert_eq!(ledger.tentative(Category::Sales, 1), 0);
        assert_eq!(ledger.tentative(Category::Sales, 2), 3);
        assert_eq!(
            ledger.reservation(Category::Sales, &a),
            Some(Reservation { time: 2, quantity: 3 })
        );
    }

    #[test]
    fn reservation_beyond_capacity_is_refused() {
        let mut ledger = ledger_with(5);
        ledger
            .reserve_tentative(Category::Supplies, &partner("a"), 0, 3)
            .unwrap();
        let err = ledger
            .reserve_tentative(Category::Supplies, &partner("b"), 0, 3)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::Overflow {
                category: Category::Supplies,
                time: 0,
                requested: 3,
                available: 2,
            }
        );
        assert!(ledger.check_invariant().is_ok());
    }

    #[test]
    fn double_release_never_undercounts() {
        let mut ledger = ledger_with(10);
        let (a, b) = (partner("a"), partner("b"));
        ledger.reserve_tentative(Category::Sales, &a, 1, 4).unwrap();
        ledger.reserve_tentative(Category::Sales, &b, 1, 2).unwrap();
        assert!(ledger.release_tentative(Category::Sales, &a).is_some());
        assert!(ledger.release_tentative(Category::Sales, &a).is_none());
        assert_eq!(ledger.tentative(Category::Sales, 1), 2);
    }

    #[test]
    fn out_of_horizon_is_an_error() {
        let mut ledger = ledger_with(10);
        assert_eq!(
            ledger.reserve_tentative(Category::Sales, &partner("a"), 9, 1),
            Err(LedgerError::OutOfHorizon { time: 9, horizon: 4 })
        );
        assert_eq!(ledger.available(Category::Sales, 9), 0);
    }

    // ==========================================================================
    // Acceptance and contracts
    // ==========================================================================

    #[test]
    fn accept_then_success_counts_once() {
        let mut ledger = ledger_with(10);
        let a = partner("a");
        ledger.reserve_tentative(Category::Sales, &a, 1, 4).unwrap();
        ledger.accept(Category::Sales, &a, 1, 3).unwrap();
        assert_eq!(ledger.tentative(Category::Sales, 1), 0);
        assert_eq!(ledger.accepted(Category::Sales, 1), 3);

        ledger.on_success(Category::Sales, &a, 1, 3).unwrap();
        assert_eq!(ledger.accepted(Category::Sales, 1), 3);
    }

    #[test]
    fn second_acceptance_replaces_the_first() {
        let mut ledger = ledger_with(6);
        let a = partner("a");
        ledger.accept(Category::Sales, &a, 1, 4).unwrap();
        assert_eq!(ledger.available_excluding(Category::Sales, 1, &a), 6);
        ledger.accept(Category::Sales, &a, 1, 5).unwrap();
        assert_eq!(ledger.accepted(Category::Sales, 1), 5);

        // A refused replacement keeps the earlier acceptance.
        assert!(ledger.accept(Category::Sales, &a, 1, 7).is_err());
        assert_eq!(ledger.accepted(Category::Sales, 1), 5);
        ledger.on_success(Category::Sales, &a, 1, 5).unwrap();
        assert_eq!(ledger.accepted(Category::Sales, 1), 5);
    }

    #[test]
    fn success_on_own_offer_converts_reservation() {
        let mut ledger = ledger_with(10);
        let a = partner("a");
        ledger.reserve_tentative(Category::Supplies, &a, 2, 5).unwrap();
        ledger.on_success(Category::Supplies, &a, 2, 5).unwrap();
        assert_eq!(ledger.tentative(Category::Supplies, 2), 0);
        assert_eq!(ledger.accepted(Category::Supplies, 2), 5);
    }

    #[test]
    fn refused_acceptance_keeps_reservation() {
        let mut ledger = ledger_with(4);
        let (a, b) = (partner("a"), partner("b"));
        ledger.reserve_tentative(Category::Sales, &a, 0, 2).unwrap();
        ledger.reserve_tentative(Category::Sales, &b, 0, 2).unwrap();
        assert!(ledger.accept(Category::Sales, &a, 0, 3).is_err());
        assert_eq!(
            ledger.reservation(Category::Sales, &a),
            Some(Reservation { time: 0, quantity: 2 })
        );
        assert_eq!(ledger.tentative(Category::Sales, 0), 4);
        // Accepting within the partner's own reservation succeeds.
        ledger.accept(Category::Sales, &a, 0, 2).unwrap();
        assert!(ledger.check_invariant().is_ok());
    }

    #[test]
    fn failure_restores_tentative() {
        let mut ledger = ledger_with(10);
        let a = partner("a");
        let before = ledger.tentative(Category::Sales, 1);
        ledger.reserve_tentative(Category::Sales, &a, 1, 4).unwrap();
        ledger.on_failure(Category::Sales, &a);
        assert_eq!(ledger.tentative(Category::Sales, 1), before);
        assert_eq!(ledger.available(Category::Sales, 1), 10);
    }

    #[test]
    fn finalize_and_cancel() {
        let mut ledger = ledger_with(10);
        let (a, b) = (partner("a"), partner("b"));
        ledger.accept(Category::Sales, &a, 1, 3).unwrap();
        ledger.accept(Category::Sales, &b, 1, 2).unwrap();
        ledger.finalize(Category::Sales, 1, 3).unwrap();
        ledger.cancel(Category::Sales, 1, 2).unwrap();
        assert_eq!(ledger.accepted(Category::Sales, 1), 0);
        assert_eq!(ledger.secured(Category::Sales, 1), 3);
        assert_eq!(ledger.available(Category::Sales, 1), 7);
    }

    #[test]
    fn finalizing_unaccepted_units_past_max_is_an_overflow() {
        let mut ledger = CapacityLedger::new(4);
        ledger
            .reset_for_step(LedgerPlan::uniform(4, 0, 5), LedgerPlan::closed(4))
            .unwrap();
        ledger.accept(Category::Sales, &partner("a"), 1, 2).unwrap();

        let result = ledger.finalize(Category::Sales, 1, 8);
        assert!(matches!(
            result,
            Err(LedgerError::Overflow { category: Category::Sales, time: 1, requested: 6, available: 3 })
        ));
        assert_eq!(ledger.secured(Category::Sales, 1), 8);
        assert_eq!(ledger.accepted(Category::Sales, 1), 0);
        assert_eq!(ledger.max(Category::Sales, 1), 5);
        assert!(ledger.check_invariant().is_err());

        // The next step plans around what is already secured.
        ledger
            .reset_for_step(LedgerPlan::uniform(4, 0, 5), LedgerPlan::closed(4))
            .unwrap();
        assert_eq!(ledger.max(Category::Sales, 1), 8);
        assert!(ledger.check_invariant().is_ok());
    }

    #[test]
    fn finalizing_unaccepted_units_within_max_is_fine() {
        let mut ledger = ledger_with(10);
        ledger.finalize(Category::Sales, 2, 4).unwrap();
        assert_eq!(ledger.secured(Category::Sales, 2), 4);
        assert_eq!(ledger.available(Category::Sales, 2), 6);
    }

    #[test]
    fn secured_survives_reset_and_lifts_max() {
        let mut ledger = ledger_with(10);
        ledger.accept(Category::Supplies, &partner("a"), 2, 6).unwrap();
        ledger.finalize(Category::Supplies, 2, 6).unwrap();

        ledger
            .reset_for_step(LedgerPlan::closed(4), LedgerPlan::uniform(4, 0, 2))
            .unwrap();
        assert_eq!(ledger.secured(Category::Supplies, 2), 6);
        assert_eq!(ledger.max(Category::Supplies, 2), 6);
        assert_eq!(ledger.available(Category::Supplies, 2), 0);
        assert_eq!(ledger.available(Category::Supplies, 1), 2);
        assert!(ledger.check_invariant().is_ok());
    }

    #[test]
    fn invalid_plans_are_rejected() {
        let mut ledger = CapacityLedger::new(3);
        assert!(matches!(
            ledger.reset_for_step(LedgerPlan::closed(2), LedgerPlan::closed(3)),
            Err(LedgerError::InvalidPlan { .. })
        ));
        let inverted = LedgerPlan {
            max: vec![1, 1, 1],
            min: vec![0, 2, 0],
        };
        assert!(matches!(
            ledger.reset_for_step(LedgerPlan::closed(3), inverted),
            Err(LedgerError::InvalidPlan { .. })
        ));
    }

    #[test]
    fn availability_queries() {
        let mut ledger = ledger_with(6);
        let a = partner("a");
        ledger.reserve_tentative(Category::Sales, &a, 3, 4).unwrap();
        assert_eq!(ledger.available(Category::Sales, 3), 2);
        assert_eq!(ledger.available_excluding(Category::Sales, 3, &a), 6);
        assert_eq!(ledger.available_excluding(Category::Sales, 2, &a), 6);
        assert_eq!(ledger.max_available_from(Category::Sales, 3), 2);
        assert_eq!(ledger.max_available_from(Category::Sales, 0), 6);
        assert_eq!(ledger.max_available_from(Category::Sales, 10), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(bool, u8, usize, u32),
        Release(bool, u8),
        Accept(bool, u8, usize, u32),
        Success(bool, u8),
        Failure(bool, u8),
        Finalize(bool, usize, u32),
        Cancel(bool, usize, u32),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (any::<bool>(), 0u8..4, 0usize..5, 0u32..6).prop_map(|(s, p, t, q)| Op::Reserve(s, p, t, q)),
            (any::<bool>(), 0u8..4).prop_map(|(s, p)| Op::Release(s, p)),
            (any::<bool>(), 0u8..4, 0usize..5, 0u32..6).prop_map(|(s, p, t, q)| Op::Accept(s, p, t, q)),
            (any::<bool>(), 0u8..4).prop_map(|(s, p)| Op::Success(s, p)),
            (any::<bool>(), 0u8..4).prop_map(|(s, p)| Op::Failure(s, p)),
            (any::<bool>(), 0usize..5, 0u32..6).prop_map(|(s, t, q)| Op::Finalize(s, t, q)),
            (any::<bool>(), 0usize..5, 0u32..6).prop_map(|(s, t, q)| Op::Cancel(s, t, q)),
        ]
    }

    proptest! {
        #[test]
        fn invariant_holds_under_clamped_operations(ops in prop::collection::vec(arb_op(), 0..60)) {
            let mut ledger = ledger_with(8);
            for op in ops {
                match op {
                    Op::Reserve(s, p, t, q) => {
                        let _ = ledger.reserve_tentative(Category::for_selling(s), &partner(&p.to_string()), t, q);
                    }
                    Op::Release(s, p) => {
                        ledger.release_tentative(Category::for_selling(s), &partner(&p.to_string()));
                    }
                    Op::Accept(s, p, t, q) => {
                        let _ = ledger.accept(Category::for_selling(s), &partner(&p.to_string()), t, q);
                    }
                    Op::Success(s, p) => {
                        // A mechanism only concludes on what was offered.
                        let category = Category::for_selling(s);
                        let who = partner(&p.to_string());
                        if let Some(r) = ledger.reservation(category, &who) {
                            ledger.on_success(category, &who, r.time, r.quantity).unwrap();
                        }
                    }
                    Op::Failure(s, p) => ledger.on_failure(Category::for_selling(s), &partner(&p.to_string())),
                    Op::Finalize(s, t, q) => {
                        let category = Category::for_selling(s);
                        let q = q.min(ledger.accepted(category, t));
                        let _ = ledger.finalize(category, t, q);
                    }
                    Op::Cancel(s, t, q) => {
                        let _ = ledger.cancel(Category::for_selling(s), t, q);
                    }
                }
                prop_assert!(ledger.check_invariant().is_ok());
            }
        }

        #[test]
        fn release_is_idempotent(q in 1u32..8, t in 0usize..4, repeats in 1usize..5) {
            let mut ledger = ledger_with(8);
            let a = partner("a");
            ledger.reserve_tentative(Category::Sales, &a, t, q).unwrap();
            ledger.reserve_tentative(Category::Sales, &partner("b"), t, 8 - q).unwrap();
            for _ in 0..repeats {
                ledger.release_tentative(Category::Sales, &a);
            }
            prop_assert_eq!(ledger.tentative(Category::Sales, t), 8 - q);
        }
    }
}
