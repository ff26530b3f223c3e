//! Agent configuration.
//!
//! All structs carry defaults and deserialize with missing fields filled in,
//! so a JSON document only needs to name what it overrides. Call
//! [`AgentConfig::validate`] (or load through [`AgentConfig::from_json_str`])
//! before handing a configuration to a strategy.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Exponents of the satisficer's concession curves, one per issue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcessionExponents {
    /// Exponent for unit price.
    pub price: f64,
    /// Exponent for quantity.
    pub quantity: f64,
    /// Exponent for delivery time.
    pub time: f64,
}

impl Default for ConcessionExponents {
    fn default() -> Self {
        Self {
            price: 1.0,
            quantity: 1.0,
            time: 1.0,
        }
    }
}

/// Share of the market an agent expects to win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketShare {
    /// Expect `share / (n_competitors + share - 1)` of all trade.
    Share(u32),
    /// Expect to take all the trade.
    Everything,
}

impl Default for MarketShare {
    fn default() -> Self {
        Self::Share(1)
    }
}

impl MarketShare {
    /// Fraction of the market this share represents among `n_competitors`
    /// agents at the same level (the agent included).
    #[must_use]
    pub fn fraction(self, n_competitors: usize) -> f64 {
        match self {
            Self::Everything => 1.0,
            Self::Share(share) => {
                let denominator = (n_competitors + share as usize).saturating_sub(1);
                if denominator == 0 {
                    1.0
                } else {
                    (f64::from(share) / denominator as f64).min(1.0)
                }
            }
        }
    }
}

/// Parameters of the satisficer strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SatisficerConfig {
    /// Fraction of production lines the agent aims to keep busy.
    pub target_productivity: f64,
    /// Profit margin, as a fraction of the trading price, considered satisfactory.
    pub satisfying_profit: f64,
    /// How far past the trading price the agent will go while negotiating.
    pub acceptable_loss: f64,
    /// Width of requested price ranges, as a fraction of the trading price.
    pub price_range: f64,
    /// Concession curve exponents.
    pub concession: ConcessionExponents,
    /// Expected market share.
    pub market_share: MarketShare,
    /// Steps ahead the agent negotiates deliveries for.
    pub horizon: usize,
}

impl Default for SatisficerConfig {
    fn default() -> Self {
        Self {
            target_productivity: 1.0,
            satisfying_profit: 0.15,
            acceptable_loss: 0.02,
            price_range: 0.4,
            concession: ConcessionExponents::default(),
            market_share: MarketShare::default(),
            horizon: 5,
        }
    }
}

/// Parameters of the greedy, utility-driven strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreedyConfig {
    /// Fraction of the remaining utility gap an offer must close early on.
    pub aspiration: f64,
    /// Exponent of the aspiration decay over negotiation time.
    pub concession_exponent: f64,
}

impl Default for GreedyConfig {
    fn default() -> Self {
        Self {
            aspiration: 0.3,
            concession_exponent: 1.0,
        }
    }
}

/// Parameters of the random strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomConfig {
    /// Probability of accepting a feasible offer.
    pub accept_probability: f64,
}

impl Default for RandomConfig {
    fn default() -> Self {
        Self {
            accept_probability: 0.5,
        }
    }
}

/// Configuration shared by every built-in strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Seed of the agent's random number generator.
    pub seed: u64,
    /// Reject sales at a zero unit price.
    pub avoid_free_sales: bool,
    /// Satisficer settings.
    pub satisficer: SatisficerConfig,
    /// Greedy settings.
    pub greedy: GreedyConfig,
    /// Random settings.
    pub random: RandomConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            avoid_free_sales: true,
            satisficer: SatisficerConfig::default(),
            greedy: GreedyConfig::default(),
            random: RandomConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.satisficer;
        check_fraction("satisficer.target_productivity", s.target_productivity)?;
        check_fraction("satisficer.satisfying_profit", s.satisfying_profit)?;
        check_fraction("satisficer.acceptable_loss", s.acceptable_loss)?;
        check_non_negative("satisficer.price_range", s.price_range)?;
        check_positive("satisficer.concession.price", s.concession.price)?;
        check_positive("satisficer.concession.quantity", s.concession.quantity)?;
        check_positive("satisficer.concession.time", s.concession.time)?;
        if s.market_share == MarketShare::Share(0) {
            return Err(ConfigError::OutOfRange {
                field: "satisficer.market_share",
                value: 0.0,
                expected: "a positive share",
            });
        }
        check_fraction("greedy.aspiration", self.greedy.aspiration)?;
        check_positive("greedy.concession_exponent", self.greedy.concession_exponent)?;
        check_fraction("random.accept_probability", self.random.accept_probability)?;
        Ok(())
    }
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "[0, 1]",
        })
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "a finite value >= 0",
        })
    }
}

pub(crate) fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "a finite value > 0",
        })
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    config: AgentConfig,
}

impl AgentConfigBuilder {
    /// Set the random seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Set whether free sales are rejected.
    #[must_use]
    pub const fn avoid_free_sales(mut self, avoid: bool) -> Self {
        self.config.avoid_free_sales = avoid;
        self
    }

    /// Set satisficer configuration.
    #[must_use]
    pub const fn satisficer(mut self, config: SatisficerConfig) -> Self {
        self.config.satisficer = config;
        self
    }

    /// Set greedy configuration.
    #[must_use]
    pub const fn greedy(mut self, config: GreedyConfig) -> Self {
        self.config.greedy = config;
        self
    }

    /// Set random configuration.
    #[must_use]
    pub const fn random(mut self, config: RandomConfig) -> Self {
        self.config.random = config;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<AgentConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
