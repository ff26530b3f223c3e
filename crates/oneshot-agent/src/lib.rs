//! # oneshot-agent
//!
//! Negotiating agents for one-shot supply-chain trading.
//!
//! This crate provides:
//!
//! - **Capacity ledger**: [`CapacityLedger`] tracks tentative, accepted, and
//!   secured quantities per day so concurrent negotiations never overcommit
//! - **Strategies**: the rule-based [`SatisficerStrategy`], the utility-driven
//!   [`GreedyStrategy`], and [`RandomStrategy`], all behind [`OneShotStrategy`]
//! - **Registry**: [`StrategyRegistry`] builds strategies by name
//! - **Handles**: [`AgentHandle`] serializes every callback of one agent;
//!   [`PartnerNegotiator`] drives one negotiation
//!
//! ## Example
//!
//! ```rust
//! use oneshot_agent::{AgentConfig, StaticWorld, StrategyRegistry};
//!
//! let world = StaticWorld::new("me", 10, 3, 1).with_partners(&["s1"], &["c1"]);
//! let registry = StrategyRegistry::with_builtins();
//! let agent = registry.create_handle("satisficer", &AgentConfig::default()).unwrap();
//!
//! agent.init(&world).unwrap();
//! agent.before_step(&world).unwrap();
//! assert!(agent.check_ledger().is_ok());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod concession;
pub mod config;
pub mod error;
pub mod greedy;
pub mod ledger;
pub mod negotiator;
pub mod random;
pub mod registry;
pub mod satisficer;
pub mod strategy;
pub mod world;

pub use concession::{ConcessionCurve, ConcessionDimension};
pub use config::{
    AgentConfig, AgentConfigBuilder, ConcessionExponents, GreedyConfig, MarketShare, RandomConfig,
    SatisficerConfig,
};
pub use error::{AgentError, ConfigError, LedgerError};
pub use greedy::{GREEDY, GreedyStrategy};
pub use ledger::{CapacityLedger, Category, LedgerPlan, Reservation};
pub use negotiator::{AgentHandle, PartnerNegotiator};
pub use random::{RANDOM, RandomStrategy};
pub use registry::{StrategyFactory, StrategyRegistry};
pub use satisficer::{SATISFICER, SatisficerStrategy, StepPlan, TradeTargets};
pub use strategy::{NegotiationStatus, OneShotStrategy};
pub use world::{AgentWorld, NegotiationRequest, StaticWorld, make_ufun};
