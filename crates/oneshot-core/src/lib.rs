//! # oneshot-core
//!
//! Primitives for one-shot supply-chain negotiation.
//!
//! This crate provides:
//!
//! - [`Deal`] and [`Contract`]: validated, fixed-shape negotiation outcomes
//! - [`ProductionProfile`] and [`ExogenousContracts`]: what an agent can make
//!   and what it already has to buy or sell
//! - [`OneShotUFun`]: the per-step utility function
//! - [`LimitSearch`]: best and worst attainable utility
//! - [`MechanismState`] and [`MechanismInfo`]: read-only views of a negotiation
//!
//! Everything here is synchronous and pure; agents and their bookkeeping
//! live in `oneshot-agent`.
//!
//! ## Example
//!
//! ```
//! use oneshot_core::{Deal, OneShotUFun, ProductionProfile};
//!
//! let ufun = OneShotUFun::builder()
//!     .profile(ProductionProfile { n_lines: 5, ..ProductionProfile::default() })
//!     .negotiations(1, 1)
//!     .build()
//!     .unwrap();
//!
//! let sale = Deal::new(3, 0, 10.0).unwrap();
//! let supply = Deal::new(3, 0, 4.0).unwrap();
//! assert!(ufun.evaluate(&[supply], &[sale]) > ufun.evaluate(&[], &[]));
//!
//! let limits = ufun.limits();
//! assert!(limits.best.utility >= limits.worst.utility);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod deal;
pub mod error;
pub mod limits;
pub mod mechanism;
pub mod profile;
pub mod ufun;

pub use deal::{AgentId, Annotation, Contract, Deal, IssueRange, OutcomeSpace, Side, TimeRange};
pub use error::CoreError;
pub use limits::{DEFAULT_MAX_OUTCOMES, LIMIT_TOLERANCE, LimitResult, LimitSearch, Limits};
pub use mechanism::{MechanismInfo, MechanismState, NegotiationRole, ResponseType};
pub use profile::{
    Balance, ChainRole, ExogenousContract, ExogenousContracts, NegotiationRanges,
    ProductionProfile,
};
pub use ufun::{Aggregates, FreeSalePolicy, OneShotUFun, OneShotUFunBuilder, UtilityBreakdown};
