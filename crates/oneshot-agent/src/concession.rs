//! Time-based concession curves.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::check_positive;
use crate::error::ConfigError;

/// A concession curve `r(t) = 1 - t^exponent` over elapsed time `t` in `[0, 1]`.
///
/// The ratio starts at 1 (no concession) and falls to 0 (full concession).
/// Exponents above 1 concede late (boulware), below 1 concede early
/// (conceder).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConcessionCurve {
    exponent: f64,
}

impl ConcessionCurve {
    /// Creates a curve, rejecting non-positive or non-finite exponents.
    pub fn new(exponent: f64) -> Result<Self, ConfigError> {
        check_positive("concession exponent", exponent)?;
        Ok(Self { exponent })
    }

    /// The curve's exponent.
    #[must_use]
    pub const fn exponent(&self) -> f64 {
        self.exponent
    }

    /// Remaining ratio at `elapsed`, clamped to `[0, 1]`.
    #[must_use]
    pub fn ratio(&self, elapsed: f64) -> f64 {
        let elapsed = if elapsed.is_nan() { 0.0 } else { elapsed.clamp(0.0, 1.0) };
        (1.0 - elapsed.powf(self.exponent)).clamp(0.0, 1.0)
    }

    /// Moves from `start` (ratio 1) toward `end` (ratio 0).
    #[must_use]
    pub fn interpolate(&self, start: f64, end: f64, elapsed: f64) -> f64 {
        (start - end).mul_add(self.ratio(elapsed), end)
    }
}

impl Default for ConcessionCurve {
    fn default() -> Self {
        Self { exponent: 1.0 }
    }
}

/// The issue a proposal concedes on in a given round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcessionDimension {
    /// Concede on delivery time.
    Time,
    /// Concede on quantity.
    Quantity,
    /// Concede on unit price.
    Price,
}

impl ConcessionDimension {
    /// All dimensions.
    pub const ALL: [Self; 3] = [Self::Time, Self::Quantity, Self::Price];

    /// Picks a dimension uniformly at random.
    pub fn random(rng: &mut impl Rng) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}
