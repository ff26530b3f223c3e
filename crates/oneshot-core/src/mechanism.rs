//! Values exchanged with the negotiation mechanism.
//!
//! The mechanism itself (turn taking, transport, lifecycle) lives outside
//! this workspace; strategies only see these read-only snapshots.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deal::{AgentId, Annotation, OutcomeSpace};
use crate::error::CoreError;

/// Progress of one negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MechanismState {
    /// Current round, starting at zero.
    pub step: usize,
    /// Total rounds the mechanism allows (at least one).
    pub n_rounds: usize,
}

impl MechanismState {
    /// Creates a state; a round budget of zero is treated as one.
    #[must_use]
    pub fn new(step: usize, n_rounds: usize) -> Self {
        Self {
            step,
            n_rounds: n_rounds.max(1),
        }
    }

    /// Fraction of the negotiation elapsed, in `[0, 1]`.
    #[must_use]
    pub fn relative_time(&self) -> f64 {
        Self::fraction(self.step, self.n_rounds)
    }

    /// Fraction elapsed at the previous round, in `[0, 1]`.
    #[must_use]
    pub fn previous_relative_time(&self) -> f64 {
        Self::fraction(self.step.saturating_sub(1), self.n_rounds)
    }

    /// Rounds left after the current one.
    #[must_use]
    pub const fn remaining_rounds(&self) -> usize {
        self.n_rounds.saturating_sub(self.step + 1)
    }

    fn fraction(step: usize, n_rounds: usize) -> f64 {
        let denominator = n_rounds.saturating_sub(1).max(1);
        (step as f64 / denominator as f64).min(1.0)
    }
}

/// Static description of one negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MechanismInfo {
    /// Negotiation identifier.
    pub id: Uuid,
    /// Participants.
    pub agent_ids: Vec<AgentId>,
    /// Legal outcomes.
    pub issues: OutcomeSpace,
    /// Parties, initiator, and product.
    pub annotation: Annotation,
}

impl MechanismInfo {
    /// Creates a bilateral negotiation between seller and buyer, rejecting
    /// inverted quantity or price ranges.
    pub fn bilateral(annotation: Annotation, issues: OutcomeSpace) -> Result<Self, CoreError> {
        issues.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            agent_ids: vec![annotation.seller.clone(), annotation.buyer.clone()],
            issues,
            annotation,
        })
    }

    /// The first participant that is not `me`.
    #[must_use]
    pub fn partner_of(&self, me: &AgentId) -> Option<&AgentId> {
        self.agent_ids.iter().find(|id| *id != me)
    }

    /// Returns true if `me` requested this negotiation.
    #[must_use]
    pub fn requested_by(&self, me: &AgentId) -> bool {
        &self.annotation.caller == me
    }
}

/// Answer to a partner's offer. There is no "wait".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Accept the offer as-is, concluding the negotiation.
    Accept,
    /// Reject the offer; the negotiation continues.
    Reject,
}

impl ResponseType {
    /// Returns true for acceptance.
    #[must_use]
    pub const fn is_accept(self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Which side of a negotiation an agent sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NegotiationRole {
    /// True when the agent sells in this negotiation.
    pub selling: bool,
    /// True when the agent initiated the negotiation.
    pub requested: bool,
}

impl NegotiationRole {
    /// Seller role.
    #[must_use]
    pub const fn seller(requested: bool) -> Self {
        Self {
            selling: true,
            requested,
        }
    }

    /// Buyer role.
    #[must_use]
    pub const fn buyer(requested: bool) -> Self {
        Self {
            selling: false,
            requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::{IssueRange, TimeRange};

    #[test]
    fn relative_time_spans_unit_interval() {
        let first = MechanismState::new(0, 20);
        let last = MechanismState::new(19, 20);
        let beyond = MechanismState::new(40, 20);
        assert!(first.relative_time().abs() < f64::EPSILON);
        assert!((last.relative_time() - 1.0).abs() < f64::EPSILON);
        assert!((beyond.relative_time() - 1.0).abs() < f64::EPSILON);
        assert_eq!(last.remaining_rounds(), 0);
    }

    #[test]
    fn previous_relative_time_lags_one_round() {
        let state = MechanismState::new(5, 11);
        assert!((state.relative_time() - 0.5).abs() < 1e-12);
        assert!((state.previous_relative_time() - 0.4).abs() < 1e-12);
        assert!(MechanismState::new(0, 11).previous_relative_time().abs() < f64::EPSILON);
    }

    #[test]
    fn single_round_budget_does_not_divide_by_zero() {
        let state = MechanismState::new(0, 0);
        assert_eq!(state.n_rounds, 1);
        assert!(state.relative_time().is_finite());
    }

    #[test]
    fn partner_and_caller() {
        let info = MechanismInfo::bilateral(
            Annotation {
                seller: "s".into(),
                buyer: "b".into(),
                caller: "b".into(),
                product: 1,
            },
            OutcomeSpace {
                quantity: IssueRange::fixed(1),
                time: TimeRange::at(0),
                unit_price: IssueRange::fixed(1),
            },
        ).unwrap();
        assert_eq!(info.partner_of(&"s".into()), Some(&AgentId::from("b")));
        assert!(info.requested_by(&"b".into()));
        assert!(!info.requested_by(&"s".into()));
    }

    #[test]
    fn inverted_price_range_is_rejected() {
        let annotation = Annotation {
            seller: "s".into(),
            buyer: "b".into(),
            caller: "b".into(),
            product: 1,
        };
        let result = MechanismInfo::bilateral(
            annotation,
            OutcomeSpace {
                quantity: IssueRange { min: 1, max: 10 },
                time: TimeRange::new(1, 5),
                unit_price: IssueRange { min: 36, max: 24 },
            },
        );
        assert!(matches!(
            result,
            Err(CoreError::InvalidRange { field: "unit_price", min: 36, max: 24 })
        ));
    }
}
