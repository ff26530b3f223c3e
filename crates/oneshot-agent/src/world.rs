//! The agent's view of the world.
//!
//! The simulation engine is not part of this workspace. Strategies read the
//! world through [`AgentWorld`] and act on it only by requesting
//! negotiations and setting production commands. [`StaticWorld`] is an
//! in-memory snapshot used by tests and offline callers.

use serde::{Deserialize, Serialize};

use oneshot_core::{
    AgentId, Balance, CoreError, ExogenousContracts, IssueRange, NegotiationRanges, OneShotUFun,
    ProductionProfile, TimeRange,
};

/// A request to open negotiations with several partners over one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationRequest {
    /// True when the requesting agent sells.
    pub selling: bool,
    /// Product under negotiation.
    pub product: usize,
    /// Legal quantities.
    pub quantity: IssueRange,
    /// Legal unit prices.
    pub unit_price: IssueRange,
    /// Legal delivery steps.
    pub time: TimeRange,
    /// Partners to negotiate with, one negotiation each.
    pub partners: Vec<AgentId>,
}

/// Read access to the world plus the two actions an agent may take.
pub trait AgentWorld {
    /// This agent's identifier.
    fn agent_id(&self) -> &AgentId;

    /// Current simulation step.
    fn current_step(&self) -> usize;

    /// Number of simulation steps.
    fn n_steps(&self) -> usize;

    /// Number of production processes in the chain.
    fn n_processes(&self) -> usize;

    /// Production lines of this agent.
    fn n_lines(&self) -> u32;

    /// Product this agent consumes.
    fn my_input_product(&self) -> usize;

    /// Product this agent produces.
    fn my_output_product(&self) -> usize {
        self.my_input_product() + 1
    }

    /// Catalog price of every product.
    fn catalog_prices(&self) -> &[f64];

    /// Recent trading price of every product, when known.
    fn trading_prices(&self) -> Option<&[f64]>;

    /// Agents that sell to this agent.
    fn my_suppliers(&self) -> &[AgentId];

    /// Agents that buy from this agent.
    fn my_consumers(&self) -> &[AgentId];

    /// Returns true for the system agents behind exogenous contracts.
    fn is_system(&self, agent: &AgentId) -> bool;

    /// Agents at this agent's level of the chain, this agent included.
    fn n_competitors(&self) -> usize;

    /// Smallest number of consumers of any process.
    fn min_consumers_per_process(&self) -> usize;

    /// Units of `product` in storage.
    fn inventory(&self, product: usize) -> u32;

    /// Money available.
    fn balance(&self) -> Balance;

    /// Exogenous contracts of the current step.
    fn exogenous_contracts(&self) -> ExogenousContracts;

    /// Production and penalty parameters.
    fn profile(&self) -> ProductionProfile;

    /// Ranges of the negotiations open this step.
    fn negotiation_ranges(&self) -> NegotiationRanges;

    /// True when exogenous contracts are exact rather than expected values.
    fn force_exogenous(&self) -> bool;

    /// Supply negotiations this step; defaults to one per trading supplier.
    fn n_input_negotiations(&self) -> usize {
        let suppliers = self.my_suppliers();
        suppliers.iter().filter(|s| !self.is_system(s)).count()
    }

    /// Sale negotiations this step; defaults to one per trading consumer.
    fn n_output_negotiations(&self) -> usize {
        let consumers = self.my_consumers();
        consumers.iter().filter(|c| !self.is_system(c)).count()
    }

    /// Price of `product`: the trading price when known, else the catalog price.
    fn price_of(&self, product: usize) -> f64 {
        self.trading_prices()
            .and_then(|prices| prices.get(product).copied())
            .or_else(|| self.catalog_prices().get(product).copied())
            .unwrap_or(0.0)
    }

    /// Asks the world to open negotiations.
    fn request_negotiations(&mut self, request: NegotiationRequest);

    /// Sets one command per production line: `Some(process)` or idle.
    fn set_commands(&mut self, commands: Vec<Option<usize>>);
}

/// Builds this step's utility function from the world.
pub fn make_ufun(awi: &dyn AgentWorld) -> Result<OneShotUFun, CoreError> {
    OneShotUFun::builder()
        .profile(awi.profile())
        .exogenous(awi.exogenous_contracts())
        .ranges(awi.negotiation_ranges())
        .negotiations(awi.n_input_negotiations(), awi.n_output_negotiations())
        .force_exogenous(awi.force_exogenous())
        .current_step(awi.current_step())
        .build()
}

/// A fixed snapshot of the world that records the agent's actions.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticWorld {
    /// This agent.
    pub agent_id: AgentId,
    /// Current step.
    pub current_step: usize,
    /// Number of steps.
    pub n_steps: usize,
    /// Number of processes.
    pub n_processes: usize,
    /// Product consumed by this agent.
    pub input_product: usize,
    /// Catalog prices, indexed by product.
    pub catalog_prices: Vec<f64>,
    /// Trading prices, indexed by product.
    pub trading_prices: Option<Vec<f64>>,
    /// Suppliers.
    pub suppliers: Vec<AgentId>,
    /// Consumers.
    pub consumers: Vec<AgentId>,
    /// System agents.
    pub system_agents: Vec<AgentId>,
    /// Agents at this level.
    pub n_competitors: usize,
    /// Smallest consumer count of any process.
    pub min_consumers_per_process: usize,
    /// Inventory, indexed by product.
    pub inventory: Vec<u32>,
    /// Money available.
    pub balance: Balance,
    /// Exogenous contracts of the step.
    pub exogenous: ExogenousContracts,
    /// Production profile.
    pub profile: ProductionProfile,
    /// Negotiation ranges.
    pub ranges: NegotiationRanges,
    /// Exact exogenous contracts.
    pub force_exogenous: bool,
    /// Requests made by the agent.
    pub requests: Vec<NegotiationRequest>,
    /// Last production commands set by the agent.
    pub commands: Vec<Option<usize>>,
}

impl StaticWorld {
    /// A world of `n_steps` steps and `n_processes` processes in which the
    /// agent consumes `input_product`. Catalog prices rise by 10 per product
    /// and every partner list is empty.
    #[must_use]
    pub fn new(agent_id: impl Into<AgentId>, n_steps: usize, n_processes: usize, input_product: usize) -> Self {
        let n_products = n_processes + 1;
        let profile = ProductionProfile::default();
        Self {
            agent_id: agent_id.into(),
            current_step: 0,
            n_steps,
            n_processes,
            input_product,
            catalog_prices: (1..=n_products).map(|i| 10.0 * i as f64).collect(),
            trading_prices: None,
            suppliers: Vec::new(),
            consumers: Vec::new(),
            system_agents: Vec::new(),
            n_competitors: 1,
            min_consumers_per_process: 1,
            inventory: vec![0; n_products],
            balance: Balance::Unlimited,
            exogenous: ExogenousContracts::default(),
            profile,
            ranges: NegotiationRanges::default(),
            force_exogenous: true,
            requests: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Sets the trading partners.
    #[must_use]
    pub fn with_partners(mut self, suppliers: &[&str], consumers: &[&str]) -> Self {
        self.suppliers = suppliers.iter().map(|&s| AgentId::from(s)).collect();
        self.consumers = consumers.iter().map(|&c| AgentId::from(c)).collect();
        self
    }

    /// Advances to `step`, clearing recorded actions.
    pub fn advance_to(&mut self, step: usize) {
        self.current_step = step;
        self.requests.clear();
        self.commands.clear();
    }
}

impl AgentWorld for StaticWorld {
    fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    fn current_step(&self) -> usize {
        self.current_step
    }

    fn n_steps(&self) -> usize {
        self.n_steps
    }

    fn n_processes(&self) -> usize {
        self.n_processes
    }

    fn n_lines(&self) -> u32 {
        self.profile.n_lines
    }

    fn my_input_product(&self) -> usize {
        self.input_product
    }

    fn catalog_prices(&self) -> &[f64] {
        &self.catalog_prices
    }

    fn trading_prices(&self) -> Option<&[f64]> {
        self.trading_prices.as_deref()
    }

    fn my_suppliers(&self) -> &[AgentId] {
        &self.suppliers
    }

    fn my_consumers(&self) -> &[AgentId] {
        &self.consumers
    }

    fn is_system(&self, agent: &AgentId) -> bool {
        self.system_agents.contains(agent)
    }

    fn n_competitors(&self) -> usize {
        self.n_competitors
    }

    fn min_consumers_per_process(&self) -> usize {
        self.min_consumers_per_process
    }

    fn inventory(&self, product: usize) -> u32 {
        self.inventory.get(product).copied().unwrap_or(0)
    }

    fn balance(&self) -> Balance {
        self.balance
    }

    fn exogenous_contracts(&self) -> ExogenousContracts {
        self.exogenous
    }

    fn profile(&self) -> ProductionProfile {
        self.profile
    }

    fn negotiation_ranges(&self) -> NegotiationRanges {
        self.ranges
    }

    fn force_exogenous(&self) -> bool {
        self.force_exogenous
    }

    fn request_negotiations(&mut self, request: NegotiationRequest) {
        self.requests.push(request);
    }

    fn set_commands(&mut self, commands: Vec<Option<usize>>) {
        self.commands = commands;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_falls_back_to_catalog() {
        let mut world = StaticWorld::new("me", 10, 3, 1);
        world.catalog_prices = vec![5.0, 10.0, 20.0, 40.0];
        assert!((world.price_of(2) - 20.0).abs() < f64::EPSILON);

        world.trading_prices = Some(vec![6.0, 11.0, 22.0, 44.0]);
        assert!((world.price_of(2) - 22.0).abs() < f64::EPSILON);

        // Short trading price vectors fall back per product.
        world.trading_prices = Some(vec![6.0]);
        assert!((world.price_of(3) - 40.0).abs() < f64::EPSILON);
        assert!(world.price_of(99).abs() < f64::EPSILON);
    }

    #[test]
    fn negotiation_counts_skip_system_agents() {
        let mut world = StaticWorld::new("me", 10, 2, 0).with_partners(&["SELLER"], &["c1", "c2"]);
        world.system_agents = vec![AgentId::from("SELLER")];
        assert_eq!(world.n_input_negotiations(), 0);
        assert_eq!(world.n_output_negotiations(), 2);
        assert_eq!(world.my_output_product(), 1);
    }

    #[test]
    fn make_ufun_reads_the_snapshot() {
        let mut world = StaticWorld::new("me", 10, 3, 1).with_partners(&["s"], &["c"]);
        world.current_step = 4;
        let ufun = make_ufun(&world).unwrap();
        assert_eq!(ufun.current_step(), 4);
        assert_eq!(ufun.n_input_negs(), 1);
        assert_eq!(ufun.n_output_negs(), 1);
        assert!(ufun.force_exogenous());

        world.profile.n_lines = 0;
        assert_eq!(make_ufun(&world), Err(CoreError::NoProductionLines));
    }

    #[test]
    fn actions_are_recorded_and_cleared() {
        let mut world = StaticWorld::new("me", 10, 3, 1);
        world.set_commands(vec![Some(1), None]);
        world.request_negotiations(NegotiationRequest {
            selling: true,
            product: 2,
            quantity: IssueRange::fixed(1),
            unit_price: IssueRange::fixed(10),
            time: TimeRange::at(1),
            partners: vec![AgentId::from("c")],
        });
        assert_eq!(world.requests.len(), 1);
        world.advance_to(1);
        assert!(world.requests.is_empty());
        assert!(world.commands.is_empty());
    }
}
