//! Error types for oneshot-core.

use thiserror::Error;

/// Errors that can occur while building or querying utility functions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A price, cost, or penalty was negative or not finite.
    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// An issue range with `min > max`.
    #[error("invalid range for {field}: min {min} > max {max}")]
    InvalidRange {
        /// Name of the offending range.
        field: &'static str,
        /// Lower bound.
        min: u64,
        /// Upper bound.
        max: u64,
    },

    /// An agent flagged as both the first and the last link of the chain.
    #[error("an agent cannot be both an input agent and an output agent")]
    ConflictingRoles,

    /// The production profile has no production lines.
    #[error("production profile must have at least one line")]
    NoProductionLines,

    /// Brute-force enumeration would exceed the configured outcome cap.
    #[error("outcome space too large for brute force: {size} > {limit}")]
    OutcomeSpaceTooLarge {
        /// Number of outcomes that would be enumerated.
        size: u128,
        /// Configured cap.
        limit: u128,
    },

    /// The analytic limit search requires fixed exogenous contracts.
    #[error("analytic limit search requires forced exogenous contracts")]
    AnalyticUnavailable,

    /// Brute-force and analytic limit search disagree beyond tolerance.
    #[error("limit search disagreement ({kind}): brute force {brute_force}, analytic {analytic}")]
    LimitDisagreement {
        /// Which limit disagreed ("best" or "worst").
        kind: &'static str,
        /// Utility found by enumeration.
        brute_force: f64,
        /// Utility found by the analytic search.
        analytic: f64,
    },
}

/// Ensures a real-valued parameter is finite and non-negative.
pub(crate) fn non_negative(field: &'static str, value: f64) -> Result<f64, CoreError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(CoreError::InvalidValue { field, value })
    }
}
