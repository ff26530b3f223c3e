//! Error types for oneshot-agent.

use thiserror::Error;

use oneshot_core::CoreError;

use crate::ledger::Category;

/// Errors that can occur in agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Building a utility function or searching its limits failed.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The capacity ledger refused an operation.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The agent configuration is malformed.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No strategy is registered under the requested name.
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    /// A strategy name was registered twice.
    #[error("strategy already registered: {0}")]
    DuplicateStrategy(String),

    /// The world does not describe a tradable position for this agent.
    #[error("world inconsistent: {0}")]
    World(String),
}

/// Errors from the per-step capacity ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The operation would exceed the planned maximum for a step.
    #[error("{category} capacity exceeded at step {time}: requested {requested}, available {available}")]
    Overflow {
        /// Sales or supplies.
        category: Category,
        /// Step index.
        time: usize,
        /// Quantity requested.
        requested: u64,
        /// Quantity still available.
        available: u64,
    },

    /// A plan does not cover the horizon or has `min > max`.
    #[error("invalid plan: {reason}")]
    InvalidPlan {
        /// What is wrong with the plan.
        reason: String,
    },

    /// A step index outside the tracked horizon.
    #[error("step {time} outside horizon of {horizon} steps")]
    OutOfHorizon {
        /// Step index.
        time: usize,
        /// Number of tracked steps.
        horizon: usize,
    },
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric parameter lies outside its legal range.
    #[error("{field} = {value} is out of range (expected {expected})")]
    OutOfRange {
        /// Name of the parameter.
        field: &'static str,
        /// The rejected value.
        value: f64,
        /// Description of the legal range.
        expected: &'static str,
    },

    /// The configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
