//! The strategy interface driven by the world and the negotiation mechanism.
//!
//! A strategy receives every callback for one agent. Implementations keep
//! their capacity bookkeeping in a [`CapacityLedger`]; the provided
//! callback defaults keep that ledger in step with negotiation outcomes and
//! contract signatures.

use serde::{Deserialize, Serialize};
use tracing::warn;

use oneshot_core::{
    AgentId, Contract, Deal, MechanismInfo, MechanismState, NegotiationRole, ResponseType,
};

use crate::error::AgentError;
use crate::ledger::{CapacityLedger, Category};
use crate::world::AgentWorld;

/// Lifecycle of one negotiation as seen by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    /// Offers are still being exchanged.
    Active,
    /// An agreement was reached.
    Accepted,
    /// The negotiation ended without agreement.
    Failed,
}

impl NegotiationStatus {
    /// Returns true once the negotiation has ended.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Callbacks of a one-shot trading agent.
///
/// The trait is object safe; agents are usually held as
/// `Box<dyn OneShotStrategy>` behind an [`AgentHandle`](crate::AgentHandle).
pub trait OneShotStrategy: Send {
    /// Name under which the strategy is registered.
    fn name(&self) -> &'static str;

    /// The strategy's capacity ledger.
    fn ledger(&self) -> &CapacityLedger;

    /// Mutable access to the capacity ledger.
    fn ledger_mut(&mut self) -> &mut CapacityLedger;

    /// Called once before the first step.
    fn init(&mut self, awi: &dyn AgentWorld) -> Result<(), AgentError>;

    /// Called at the beginning of every step.
    fn before_step(&mut self, awi: &dyn AgentWorld) -> Result<(), AgentError>;

    /// Called at the end of every step; may request negotiations and set
    /// production commands.
    fn step(&mut self, awi: &mut dyn AgentWorld) -> Result<(), AgentError> {
        let _ = awi;
        Ok(())
    }

    /// Produces the next offer, or `None` to offer nothing this round.
    fn propose(
        &mut self,
        awi: &dyn AgentWorld,
        info: &MechanismInfo,
        state: &MechanismState,
        role: NegotiationRole,
    ) -> Option<Deal>;

    /// Answers a partner's offer.
    fn respond(
        &mut self,
        awi: &dyn AgentWorld,
        info: &MechanismInfo,
        state: &MechanismState,
        offer: &Deal,
        role: NegotiationRole,
    ) -> ResponseType;

    /// Called when a negotiation concludes with an agreement.
    fn on_negotiation_success(
        &mut self,
        awi: &dyn AgentWorld,
        info: &MechanismInfo,
        contract: &Contract,
    ) {
        let _ = info;
        record_success(self.ledger_mut(), awi.agent_id(), contract);
    }

    /// Called when a negotiation ends without agreement.
    fn on_negotiation_failure(&mut self, awi: &dyn AgentWorld, info: &MechanismInfo) {
        record_failure(self.ledger_mut(), awi.agent_id(), info);
    }

    /// Decides whether to join a negotiation another agent requested.
    ///
    /// Accepts well-formed requests by default, taking the side named in
    /// the annotation.
    fn respond_to_negotiation_request(
        &mut self,
        awi: &dyn AgentWorld,
        info: &MechanismInfo,
    ) -> Option<NegotiationRole> {
        if !has_valid_issues(info) {
            return None;
        }
        Some(NegotiationRole {
            selling: &info.annotation.seller == awi.agent_id(),
            requested: false,
        })
    }

    /// Chooses which of the step's concluded contracts to sign; one flag per
    /// contract, in order.
    fn sign_all_contracts(&mut self, awi: &dyn AgentWorld, contracts: &[Contract]) -> Vec<bool>;

    /// Called with the final status of the step's contracts.
    fn on_contracts_finalized(
        &mut self,
        awi: &dyn AgentWorld,
        signed: &[Contract],
        cancelled: &[Contract],
    ) {
        record_finalized(self.ledger_mut(), awi.agent_id(), signed, cancelled);
    }
}

/// Returns false, with a warning, when a negotiation's quantity or price
/// range is inverted. Strategies offer nothing and accept nothing there.
pub(crate) fn has_valid_issues(info: &MechanismInfo) -> bool {
    match info.issues.validate() {
        Ok(()) => true,
        Err(err) => {
            warn!(negotiation = %info.id, error = %err, "malformed outcome space");
            false
        }
    }
}

/// Ledger category of a contract from `me`'s side.
pub(crate) fn contract_category(me: &AgentId, contract: &Contract) -> Category {
    Category::for_selling(contract.is_sale_for(me))
}

/// Applies a concluded negotiation to the ledger.
pub(crate) fn record_success(ledger: &mut CapacityLedger, me: &AgentId, contract: &Contract) {
    let Some(partner) = contract.partner_of(me) else {
        warn!(contract = %contract.id, agent = %me, "contract does not involve this agent");
        return;
    };
    let category = contract_category(me, contract);
    let deal = contract.agreement;
    if let Err(err) = ledger.on_success(category, partner, deal.time, deal.quantity) {
        warn!(contract = %contract.id, error = %err, "ledger rejected agreement");
    }
}

/// Applies a failed negotiation to the ledger.
pub(crate) fn record_failure(ledger: &mut CapacityLedger, me: &AgentId, info: &MechanismInfo) {
    let Some(partner) = info.partner_of(me) else {
        warn!(negotiation = %info.id, agent = %me, "negotiation has no partner");
        return;
    };
    let category = Category::for_selling(&info.annotation.seller == me);
    ledger.on_failure(category, partner);
}

/// Moves signed contracts to secured and drops cancelled ones.
pub(crate) fn record_finalized(
    ledger: &mut CapacityLedger,
    me: &AgentId,
    signed: &[Contract],
    cancelled: &[Contract],
) {
    for contract in signed {
        let deal = contract.agreement;
        if let Err(err) = ledger.finalize(contract_category(me, contract), deal.time, deal.quantity) {
            warn!(contract = %contract.id, error = %err, "cannot secure contract");
        }
    }
    for contract in cancelled {
        let deal = contract.agreement;
        if let Err(err) = ledger.cancel(contract_category(me, contract), deal.time, deal.quantity) {
            warn!(contract = %contract.id, error = %err, "cannot cancel contract");
        }
    }
}

/// Valid delivery steps of a negotiation and the quantity bounds at each.
///
/// A step is valid when `min(available, qmax) >= max(qmin, planned min, 1)`.
pub(crate) fn feasible_times(
    ledger: &CapacityLedger,
    category: Category,
    info: &MechanismInfo,
) -> Vec<(usize, u32, u32)> {
    let issues = &info.issues;
    issues
        .time
        .steps()
        .filter(|&t| t < ledger.horizon())
        .filter_map(|t| {
            let most = ledger.available(category, t).min(issues.quantity.max);
            let least = issues.quantity.min.max(ledger.min(category, t)).max(1);
            (most >= least).then_some((t, least, most))
        })
        .collect()
}

/// Checks the ledger after an operation that must preserve its invariant.
pub(crate) fn debug_check_ledger(ledger: &CapacityLedger) {
    let result = ledger.check_invariant();
    if let Err(err) = &result {
        tracing::error!(error = %err, "capacity ledger invariant violated");
    }
    debug_assert!(result.is_ok(), "capacity ledger invariant violated");
}
