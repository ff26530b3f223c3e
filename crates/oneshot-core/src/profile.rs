//! Static production parameters, exogenous contracts, and balances.

use serde::{Deserialize, Serialize};

use crate::deal::IssueRange;
use crate::error::{CoreError, non_negative};

/// Position of an agent in the production chain.
///
/// Replaces the pair of `input_agent`/`output_agent` flags, which are
/// mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChainRole {
    /// First link: buys its input from the system through exogenous contracts.
    Input,
    /// Trades with other agents on both sides.
    #[default]
    Middle,
    /// Last link: sells its output to the system through exogenous contracts.
    Output,
}

impl ChainRole {
    /// Builds a role from the two boundary flags.
    pub const fn from_flags(input_agent: bool, output_agent: bool) -> Result<Self, CoreError> {
        match (input_agent, output_agent) {
            (true, true) => Err(CoreError::ConflictingRoles),
            (true, false) => Ok(Self::Input),
            (false, true) => Ok(Self::Output),
            (false, false) => Ok(Self::Middle),
        }
    }

    /// Derives the role from the agent's input product and the chain length.
    pub const fn for_level(input_product: usize, n_processes: usize) -> Result<Self, CoreError> {
        Self::from_flags(input_product == 0, input_product + 1 >= n_processes)
    }

    /// Returns true for the first link of the chain.
    #[must_use]
    pub const fn is_input_agent(self) -> bool {
        matches!(self, Self::Input)
    }

    /// Returns true for the last link of the chain.
    #[must_use]
    pub const fn is_output_agent(self) -> bool {
        matches!(self, Self::Output)
    }
}

/// Static per-agent production and penalty parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProductionProfile {
    /// Units the agent can process per step.
    pub n_lines: u32,
    /// Cost of processing one unit.
    pub production_cost: f64,
    /// Cost per unit of input bought but not processed.
    pub storage_cost: f64,
    /// Penalty per unit of output sold but not delivered.
    pub delivery_penalty: f64,
    /// Weight applied to the storage cost.
    pub input_penalty_scale: f64,
    /// Weight applied to the delivery penalty.
    pub output_penalty_scale: f64,
    /// Position in the chain.
    pub role: ChainRole,
}

impl Default for ProductionProfile {
    fn default() -> Self {
        Self {
            n_lines: 10,
            production_cost: 1.0,
            storage_cost: 0.5,
            delivery_penalty: 1.5,
            input_penalty_scale: 1.0,
            output_penalty_scale: 1.0,
            role: ChainRole::Middle,
        }
    }
}

impl ProductionProfile {
    /// Checks that every cost is finite and non-negative and that lines exist.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.n_lines == 0 {
            return Err(CoreError::NoProductionLines);
        }
        non_negative("production_cost", self.production_cost)?;
        non_negative("storage_cost", self.storage_cost)?;
        non_negative("delivery_penalty", self.delivery_penalty)?;
        non_negative("input_penalty_scale", self.input_penalty_scale)?;
        non_negative("output_penalty_scale", self.output_penalty_scale)?;
        Ok(())
    }

    /// Storage cost per unprocessed input unit, including its weight.
    #[must_use]
    pub fn unit_storage_cost(&self) -> f64 {
        self.storage_cost * self.input_penalty_scale
    }

    /// Delivery penalty per undelivered output unit, including its weight.
    #[must_use]
    pub fn unit_delivery_penalty(&self) -> f64 {
        self.delivery_penalty * self.output_penalty_scale
    }
}

/// A contract fixed outside negotiation for the current step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExogenousContract {
    /// Units to deliver or receive.
    pub quantity: u32,
    /// Total money for all units.
    pub total_price: f64,
}

impl ExogenousContract {
    /// Creates an exogenous contract, rejecting negative or non-finite prices.
    pub fn new(quantity: u32, total_price: f64) -> Result<Self, CoreError> {
        let total_price = non_negative("exogenous_total_price", total_price)?;
        Ok(Self {
            quantity,
            total_price,
        })
    }

    /// Average price per unit; zero when no units are traded.
    #[must_use]
    pub fn unit_price(&self) -> f64 {
        if self.quantity == 0 {
            0.0
        } else {
            self.total_price / f64::from(self.quantity)
        }
    }

    /// Money exchanged if only `quantity` units materialize.
    #[must_use]
    pub fn price_for(&self, quantity: u32) -> f64 {
        if quantity >= self.quantity {
            self.total_price
        } else {
            self.unit_price() * f64::from(quantity)
        }
    }
}

/// Exogenous supply and sale of the current step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExogenousContracts {
    /// Exogenous supply of the input product.
    pub input: ExogenousContract,
    /// Exogenous sale of the output product.
    pub output: ExogenousContract,
}

/// Legal quantity and price ranges of the negotiations open this step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationRanges {
    /// Quantities legal in supply negotiations.
    pub input_quantity: IssueRange,
    /// Unit prices legal in supply negotiations.
    pub input_price: IssueRange,
    /// Quantities legal in sale negotiations.
    pub output_quantity: IssueRange,
    /// Unit prices legal in sale negotiations.
    pub output_price: IssueRange,
}

impl Default for NegotiationRanges {
    fn default() -> Self {
        Self {
            input_quantity: IssueRange { min: 1, max: 10 },
            input_price: IssueRange { min: 1, max: 10 },
            output_quantity: IssueRange { min: 1, max: 10 },
            output_price: IssueRange { min: 1, max: 10 },
        }
    }
}

impl NegotiationRanges {
    /// Validates all four ranges.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.input_quantity.check("input_quantity")?;
        self.input_price.check("input_price")?;
        self.output_quantity.check("output_quantity")?;
        self.output_price.check("output_price")?;
        Ok(())
    }
}

/// Money available to an agent.
///
/// An infinite balance is a sentinel, kept out of arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Balance {
    /// No budget constraint.
    #[default]
    Unlimited,
    /// A finite amount of money.
    Finite(f64),
}

impl Balance {
    /// Maps a raw balance to the enum; infinities and NaN become `Unlimited`.
    #[must_use]
    pub fn from_raw(value: f64) -> Self {
        if value.is_finite() {
            Self::Finite(value)
        } else {
            Self::Unlimited
        }
    }

    /// Units affordable at `unit_price`, or `None` when there is no limit.
    ///
    /// A free good is always affordable; a negative balance affords nothing.
    #[must_use]
    pub fn affordable_units(&self, unit_price: f64) -> Option<u32> {
        match *self {
            Self::Unlimited => None,
            Self::Finite(_) if unit_price <= 0.0 || !unit_price.is_finite() => None,
            Self::Finite(amount) if amount <= 0.0 => Some(0),
            Self::Finite(amount) => {
                let units = (amount / unit_price).floor();
                Some(if units >= f64::from(u32::MAX) { u32::MAX } else { units as u32 })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(true, false, Some(ChainRole::Input) ; "input agent")]
    #[test_case(false, true, Some(ChainRole::Output) ; "output agent")]
    #[test_case(false, false, Some(ChainRole::Middle) ; "middle agent")]
    #[test_case(true, true, None ; "both flags")]
    fn chain_role_from_flags(input: bool, output: bool, expected: Option<ChainRole>) {
        assert_eq!(ChainRole::from_flags(input, output).ok(), expected);
    }

    #[test]
    fn chain_role_for_level() {
        assert_eq!(ChainRole::for_level(0, 3).unwrap(), ChainRole::Input);
        assert_eq!(ChainRole::for_level(1, 3).unwrap(), ChainRole::Middle);
        assert_eq!(ChainRole::for_level(2, 3).unwrap(), ChainRole::Output);
        assert!(ChainRole::for_level(0, 1).is_err());
    }

    #[test]
    fn profile_validation() {
        assert!(ProductionProfile::default().validate().is_ok());

        let no_lines = ProductionProfile {
            n_lines: 0,
            ..ProductionProfile::default()
        };
        assert_eq!(no_lines.validate(), Err(CoreError::NoProductionLines));

        let negative = ProductionProfile {
            storage_cost: -0.5,
            ..ProductionProfile::default()
        };
        assert!(matches!(
            negative.validate(),
            Err(CoreError::InvalidValue { field: "storage_cost", .. })
        ));
    }

    #[test]
    fn exogenous_unit_price_handles_zero_quantity() {
        let empty = ExogenousContract::new(0, 0.0).unwrap();
        assert!(empty.unit_price().abs() < f64::EPSILON);

        let contract = ExogenousContract::new(4, 20.0).unwrap();
        assert!((contract.unit_price() - 5.0).abs() < f64::EPSILON);
        assert!((contract.price_for(2) - 10.0).abs() < f64::EPSILON);
        assert!((contract.price_for(4) - 20.0).abs() < f64::EPSILON);
        assert!(ExogenousContract::new(1, -2.0).is_err());
    }

    #[test]
    fn balance_sentinel() {
        assert_eq!(Balance::from_raw(f64::INFINITY), Balance::Unlimited);
        assert_eq!(Balance::from_raw(f64::NAN), Balance::Unlimited);
        assert_eq!(Balance::Unlimited.affordable_units(10.0), None);
        assert_eq!(Balance::Finite(25.0).affordable_units(10.0), Some(2));
        assert_eq!(Balance::Finite(-5.0).affordable_units(10.0), Some(0));
        assert_eq!(Balance::Finite(25.0).affordable_units(0.0), None);
    }
}
