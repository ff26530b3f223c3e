//! Shared agent handles and per-partner negotiators.
//!
//! An [`AgentHandle`] owns one strategy behind a mutex, so every callback of
//! that agent (and with it every ledger update) is serialized even when the
//! mechanism drives several negotiations from different threads. Each
//! negotiation gets a [`PartnerNegotiator`] that forwards to the handle.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use oneshot_core::{
    Contract, Deal, MechanismInfo, MechanismState, NegotiationRole, ResponseType,
};

use crate::error::{AgentError, LedgerError};
use crate::ledger::CapacityLedger;
use crate::strategy::OneShotStrategy;
use crate::world::AgentWorld;

/// A cloneable, thread-safe handle to one agent's strategy.
#[derive(Clone)]
pub struct AgentHandle {
    strategy: Arc<Mutex<Box<dyn OneShotStrategy>>>,
}

impl fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentHandle")
            .field("strategy", &self.name())
            .finish()
    }
}

impl AgentHandle {
    /// Wraps a boxed strategy.
    #[must_use]
    pub fn new(strategy: Box<dyn OneShotStrategy>) -> Self {
        Self {
            strategy: Arc::new(Mutex::new(strategy)),
        }
    }

    /// Wraps a concrete strategy.
    #[must_use]
    pub fn from_strategy(strategy: impl OneShotStrategy + 'static) -> Self {
        Self::new(Box::new(strategy))
    }

    /// Name of the wrapped strategy.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.strategy.lock().name()
    }

    /// See [`OneShotStrategy::init`].
    pub fn init(&self, awi: &dyn AgentWorld) -> Result<(), AgentError> {
        self.strategy.lock().init(awi)
    }

    /// See [`OneShotStrategy::before_step`].
    pub fn before_step(&self, awi: &dyn AgentWorld) -> Result<(), AgentError> {
        self.strategy.lock().before_step(awi)
    }

    /// See [`OneShotStrategy::step`].
    pub fn step(&self, awi: &mut dyn AgentWorld) -> Result<(), AgentError> {
        self.strategy.lock().step(awi)
    }

    /// Creates the negotiator for a negotiation this agent requested.
    #[must_use]
    pub fn negotiator(&self, info: MechanismInfo, role: NegotiationRole) -> PartnerNegotiator {
        PartnerNegotiator {
            owner: self.clone(),
            info,
            role,
        }
    }

    /// Asks the strategy whether to join a negotiation requested by a
    /// partner; `None` declines.
    pub fn respond_to_negotiation_request(
        &self,
        awi: &dyn AgentWorld,
        info: &MechanismInfo,
    ) -> Option<PartnerNegotiator> {
        let role = self.strategy.lock().respond_to_negotiation_request(awi, info)?;
        debug!(negotiation = %info.id, selling = role.selling, "joining negotiation");
        Some(self.negotiator(info.clone(), role))
    }

    /// See [`OneShotStrategy::sign_all_contracts`].
    pub fn sign_all_contracts(&self, awi: &dyn AgentWorld, contracts: &[Contract]) -> Vec<bool> {
        self.strategy.lock().sign_all_contracts(awi, contracts)
    }

    /// See [`OneShotStrategy::on_contracts_finalized`].
    pub fn on_contracts_finalized(
        &self,
        awi: &dyn AgentWorld,
        signed: &[Contract],
        cancelled: &[Contract],
    ) {
        self.strategy
            .lock()
            .on_contracts_finalized(awi, signed, cancelled);
    }

    /// Runs `f` on the agent's ledger.
    pub fn with_ledger<R>(&self, f: impl FnOnce(&CapacityLedger) -> R) -> R {
        f(self.strategy.lock().ledger())
    }

    /// Checks the agent's ledger invariant.
    pub fn check_ledger(&self) -> Result<(), LedgerError> {
        self.with_ledger(CapacityLedger::check_invariant)
    }
}

/// One agent's side of one negotiation.
#[derive(Debug, Clone)]
pub struct PartnerNegotiator {
    owner: AgentHandle,
    info: MechanismInfo,
    role: NegotiationRole,
}

impl PartnerNegotiator {
    /// The negotiation.
    #[must_use]
    pub const fn info(&self) -> &MechanismInfo {
        &self.info
    }

    /// The agent's role in it.
    #[must_use]
    pub const fn role(&self) -> NegotiationRole {
        self.role
    }

    /// Asks the owning agent for an offer.
    pub fn propose(&self, awi: &dyn AgentWorld, state: &MechanismState) -> Option<Deal> {
        self.owner
            .strategy
            .lock()
            .propose(awi, &self.info, state, self.role)
    }

    /// Asks the owning agent to answer an offer.
    pub fn respond(&self, awi: &dyn AgentWorld, state: &MechanismState, offer: &Deal) -> ResponseType {
        self.owner
            .strategy
            .lock()
            .respond(awi, &self.info, state, offer, self.role)
    }

    /// Reports the agreement reached in this negotiation.
    pub fn on_success(&self, awi: &dyn AgentWorld, contract: &Contract) {
        self.owner
            .strategy
            .lock()
            .on_negotiation_success(awi, &self.info, contract);
    }

    /// Reports that this negotiation ended without agreement.
    pub fn on_failure(&self, awi: &dyn AgentWorld) {
        self.owner
            .strategy
            .lock()
            .on_negotiation_failure(awi, &self.info);
    }
}
