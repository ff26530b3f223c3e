//! Deals, issue ranges, and contracts.
//!
//! A [`Deal`] is the fixed-shape outcome of a bilateral negotiation: how many
//! units change hands, on which simulation step, and at what unit price.
//! Deals are validated when constructed or deserialized so malformed shapes
//! never reach the utility function.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, non_negative};

/// Identifier of an agent taking part in the simulation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Creates an identifier from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AgentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Which side of the agent's production process a deal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// A supply: the agent buys its input product.
    Input,
    /// A sale: the agent sells its output product.
    Output,
}

impl Side {
    /// Returns the side for a negotiation in which the agent sells or buys.
    #[must_use]
    pub const fn for_selling(selling: bool) -> Self {
        if selling { Self::Output } else { Self::Input }
    }

    /// Returns true for sales.
    #[must_use]
    pub const fn is_output(self) -> bool {
        matches!(self, Self::Output)
    }
}

/// A proposed or concluded trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DealRepr")]
pub struct Deal {
    /// Number of units traded.
    pub quantity: u32,
    /// Simulation step at which the units are delivered.
    pub time: usize,
    /// Price per unit.
    pub unit_price: f64,
}

#[derive(Deserialize)]
struct DealRepr {
    quantity: u32,
    time: usize,
    unit_price: f64,
}

impl TryFrom<DealRepr> for Deal {
    type Error = CoreError;

    fn try_from(repr: DealRepr) -> Result<Self, Self::Error> {
        Self::new(repr.quantity, repr.time, repr.unit_price)
    }
}

impl Deal {
    /// Creates a deal, rejecting negative or non-finite unit prices.
    pub fn new(quantity: u32, time: usize, unit_price: f64) -> Result<Self, CoreError> {
        let unit_price = non_negative("unit_price", unit_price)?;
        Ok(Self {
            quantity,
            time,
            unit_price,
        })
    }

    /// Total money exchanged for this deal.
    #[must_use]
    pub fn total_price(&self) -> f64 {
        f64::from(self.quantity) * self.unit_price
    }

    /// Returns true if the deal moves no goods.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.quantity == 0
    }

    /// Returns true if goods change hands for nothing.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.quantity > 0 && self.unit_price <= 0.0
    }
}

/// Inclusive integer range of a negotiation issue (quantity or unit price).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueRange {
    /// Smallest legal value.
    pub min: u32,
    /// Largest legal value.
    pub max: u32,
}

impl IssueRange {
    /// Creates a range, rejecting `min > max`.
    pub fn new(min: u32, max: u32) -> Result<Self, CoreError> {
        let range = Self { min, max };
        range.check("issue_range")?;
        Ok(range)
    }

    /// A range holding a single value.
    #[must_use]
    pub const fn fixed(value: u32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Validates the range, naming `field` in the error.
    pub fn check(&self, field: &'static str) -> Result<(), CoreError> {
        if self.min > self.max {
            return Err(CoreError::InvalidRange {
                field,
                min: u64::from(self.min),
                max: u64::from(self.max),
            });
        }
        Ok(())
    }

    /// Number of integer values in the range.
    #[must_use]
    pub const fn count(&self) -> u64 {
        if self.min > self.max {
            0
        } else {
            (self.max - self.min) as u64 + 1
        }
    }

    /// Returns true if `value` lies inside the range.
    #[must_use]
    pub const fn contains(&self, value: u32) -> bool {
        self.min <= value && value <= self.max
    }

    /// Clamps `value` into the range.
    #[must_use]
    pub fn clamp(&self, value: u32) -> u32 {
        value.clamp(self.min, self.max.max(self.min))
    }
}

/// Inclusive window of simulation steps. Empty when `first > last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// First legal delivery step.
    pub first: usize,
    /// Last legal delivery step.
    pub last: usize,
}

impl TimeRange {
    /// Creates a window; an inverted window is legal and simply empty.
    #[must_use]
    pub const fn new(first: usize, last: usize) -> Self {
        Self { first, last }
    }

    /// A window holding a single step.
    #[must_use]
    pub const fn at(step: usize) -> Self {
        Self::new(step, step)
    }

    /// Returns true if no step is legal.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first > self.last
    }

    /// Returns true if `step` lies in the window.
    #[must_use]
    pub const fn contains(&self, step: usize) -> bool {
        self.first <= step && step <= self.last
    }

    /// Iterates over the steps of the window.
    #[must_use]
    pub const fn steps(&self) -> RangeInclusive<usize> {
        self.first..=self.last
    }
}

/// The legal values of every issue in one negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "OutcomeSpaceRepr")]
pub struct OutcomeSpace {
    /// Legal quantities.
    pub quantity: IssueRange,
    /// Legal delivery steps.
    pub time: TimeRange,
    /// Legal unit prices.
    pub unit_price: IssueRange,
}

#[derive(Deserialize)]
struct OutcomeSpaceRepr {
    quantity: IssueRange,
    time: TimeRange,
    unit_price: IssueRange,
}

impl TryFrom<OutcomeSpaceRepr> for OutcomeSpace {
    type Error = CoreError;

    fn try_from(repr: OutcomeSpaceRepr) -> Result<Self, Self::Error> {
        let space = Self {
            quantity: repr.quantity,
            time: repr.time,
            unit_price: repr.unit_price,
        };
        space.validate()?;
        Ok(space)
    }
}

impl OutcomeSpace {
    /// Rejects inverted quantity or price ranges. An empty time window is
    /// legal.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.quantity.check("quantity")?;
        self.unit_price.check("unit_price")
    }

    /// Returns true if the deal lies within every issue range.
    #[must_use]
    pub fn contains(&self, deal: &Deal) -> bool {
        self.quantity.contains(deal.quantity)
            && self.time.contains(deal.time)
            && deal.unit_price >= f64::from(self.unit_price.min)
            && deal.unit_price <= f64::from(self.unit_price.max)
    }
}

/// Who is trading what in a negotiation or contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Annotation {
    /// The selling agent.
    pub seller: AgentId,
    /// The buying agent.
    pub buyer: AgentId,
    /// The agent that requested the negotiation.
    pub caller: AgentId,
    /// Index of the traded product.
    pub product: usize,
}

impl Annotation {
    /// Returns the counterparty of `me`, if `me` is part of the trade.
    #[must_use]
    pub fn partner_of(&self, me: &AgentId) -> Option<&AgentId> {
        if &self.seller == me {
            Some(&self.buyer)
        } else if &self.buyer == me {
            Some(&self.seller)
        } else {
            None
        }
    }
}

/// A concluded agreement awaiting (or past) signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Unique identifier.
    pub id: Uuid,
    /// Parties and product.
    pub annotation: Annotation,
    /// The agreed deal.
    pub agreement: Deal,
}

impl Contract {
    /// Creates a contract with a fresh identifier.
    #[must_use]
    pub fn new(annotation: Annotation, agreement: Deal) -> Self {
        Self {
            id: Uuid::new_v4(),
            annotation,
            agreement,
        }
    }

    /// Returns true if `me` is the seller.
    #[must_use]
    pub fn is_sale_for(&self, me: &AgentId) -> bool {
        &self.annotation.seller == me
    }

    /// Returns the counterparty of `me`.
    #[must_use]
    pub fn partner_of(&self, me: &AgentId) -> Option<&AgentId> {
        self.annotation.partner_of(me)
    }
}
