//! Integration tests for complete negotiations between agents.
//!
//! A small alternating-offers driver plays the mechanism:
//! 1. The buyer requests a negotiation; the seller joins it
//! 2. Seller and buyer take turns proposing and responding
//! 3. The agreement is reported to both, signed, and finalized

use std::thread;

use oneshot_agent::{
    AgentConfig, AgentHandle, AgentWorld, Category, PartnerNegotiator, StaticWorld,
    StrategyRegistry,
};
use oneshot_core::{
    AgentId, Annotation, ChainRole, Contract, Deal, ExogenousContract, IssueRange, MechanismInfo,
    MechanismState, NegotiationRanges, NegotiationRole, OutcomeSpace, ResponseType, TimeRange,
};
use test_case::test_case;

// ============================================================================
// Helper Functions
// ============================================================================

const ROUNDS: usize = 20;

/// Seller turns product 0, ten units of which arrive from the system each
/// step, into 1; buyer turns 1 into 2.
fn worlds() -> (StaticWorld, StaticWorld) {
    let mut seller = StaticWorld::new("s", 10, 3, 0).with_partners(&["SELLER"], &["b"]);
    seller.system_agents = vec![AgentId::from("SELLER")];
    seller.profile.role = ChainRole::Input;
    seller.exogenous.input = ExogenousContract::new(10, 100.0).unwrap();
    seller.ranges = NegotiationRanges {
        output_quantity: IssueRange { min: 1, max: 10 },
        output_price: IssueRange { min: 16, max: 24 },
        ..NegotiationRanges::default()
    };

    let mut buyer = StaticWorld::new("b", 10, 3, 1).with_partners(&["s"], &["c"]);
    buyer.ranges = NegotiationRanges {
        input_quantity: IssueRange { min: 1, max: 10 },
        input_price: IssueRange { min: 16, max: 24 },
        output_quantity: IssueRange { min: 1, max: 10 },
        output_price: IssueRange { min: 24, max: 36 },
    };
    (seller, buyer)
}

fn agent(strategy: &str, world: &StaticWorld, seed: u64) -> AgentHandle {
    let config = AgentConfig::builder().seed(seed).build().unwrap();
    let handle = StrategyRegistry::with_builtins()
        .create_handle(strategy, &config)
        .unwrap();
    handle.init(world).unwrap();
    handle.before_step(world).unwrap();
    handle
}

fn supply_negotiation(seller: &str, buyer: &str) -> MechanismInfo {
    MechanismInfo::bilateral(
        Annotation {
            seller: seller.into(),
            buyer: buyer.into(),
            caller: buyer.into(),
            product: 1,
        },
        OutcomeSpace {
            quantity: IssueRange { min: 1, max: 10 },
            time: TimeRange::new(1, 5),
            unit_price: IssueRange { min: 16, max: 24 },
        },
    ).unwrap()
}

/// Runs alternating offers, seller first. Returns the agreement, if any.
fn run(
    seller: &PartnerNegotiator,
    seller_world: &dyn AgentWorld,
    buyer: &PartnerNegotiator,
    buyer_world: &dyn AgentWorld,
) -> Option<Deal> {
    for round in 0..ROUNDS {
        let state = MechanismState::new(round, ROUNDS);
        let (proposer, proposer_world, responder, responder_world) = if round % 2 == 0 {
            (seller, seller_world, buyer, buyer_world)
        } else {
            (buyer, buyer_world, seller, seller_world)
        };
        let Some(offer) = proposer.propose(proposer_world, &state) else {
            continue;
        };
        assert!(proposer.info().issues.contains(&offer));
        if responder.respond(responder_world, &state, &offer) == ResponseType::Accept {
            return Some(offer);
        }
    }
    None
}

// ============================================================================
// Full Negotiations
// ============================================================================

#[test_case("satisficer", "satisficer" ; "two satisficers")]
#[test_case("satisficer", "random" ; "satisficer sells to random")]
#[test_case("random", "satisficer" ; "random sells to satisficer")]
#[test_case("greedy", "satisficer" ; "greedy sells to satisficer")]
fn agents_reach_and_secure_an_agreement(seller_strategy: &str, buyer_strategy: &str) {
    let (seller_world, buyer_world) = worlds();
    let seller = agent(seller_strategy, &seller_world, 1);
    let buyer = agent(buyer_strategy, &buyer_world, 2);

    let info = supply_negotiation("s", "b");
    let buyer_side = buyer.negotiator(info.clone(), NegotiationRole::buyer(true));
    let seller_side = seller
        .respond_to_negotiation_request(&seller_world, &info)
        .unwrap();
    assert_eq!(seller_side.role(), NegotiationRole::seller(false));

    let agreement = run(&seller_side, &seller_world, &buyer_side, &buyer_world)
        .expect("agents should agree within the round budget");
    let contract = Contract::new(info.annotation.clone(), agreement);
    seller_side.on_success(&seller_world, &contract);
    buyer_side.on_success(&buyer_world, &contract);
    assert!(seller.check_ledger().is_ok());
    assert!(buyer.check_ledger().is_ok());

    let contracts = [contract];
    let seller_signs = seller.sign_all_contracts(&seller_world, &contracts);
    let buyer_signs = buyer.sign_all_contracts(&buyer_world, &contracts);
    let (signed, cancelled): (Vec<_>, Vec<_>) = if seller_signs[0] && buyer_signs[0] {
        (contracts.to_vec(), Vec::new())
    } else {
        (Vec::new(), contracts.to_vec())
    };
    seller.on_contracts_finalized(&seller_world, &signed, &cancelled);
    buyer.on_contracts_finalized(&buyer_world, &signed, &cancelled);

    let t = agreement.time;
    let expected = if signed.is_empty() { 0 } else { agreement.quantity };
    assert_eq!(seller.with_ledger(|l| l.secured(Category::Sales, t)), expected);
    assert_eq!(buyer.with_ledger(|l| l.secured(Category::Supplies, t)), expected);
    assert_eq!(seller.with_ledger(|l| l.accepted(Category::Sales, t)), 0);
    assert!(seller.check_ledger().is_ok());
    assert!(buyer.check_ledger().is_ok());
}

#[test]
fn satisficers_sign_fair_deals() {
    let (seller_world, buyer_world) = worlds();
    let seller = agent("satisficer", &seller_world, 3);
    let buyer = agent("satisficer", &buyer_world, 4);
    let info = supply_negotiation("s", "b");
    let contract = Contract::new(info.annotation, Deal::new(5, 3, 20.0).unwrap());

    assert_eq!(seller.sign_all_contracts(&seller_world, &[contract.clone()]), vec![true]);
    assert_eq!(buyer.sign_all_contracts(&buyer_world, &[contract]), vec![true]);
}

#[test]
fn failed_negotiation_leaves_ledgers_as_planned() {
    let (seller_world, buyer_world) = worlds();
    let seller = agent("satisficer", &seller_world, 5);
    let buyer = agent("satisficer", &buyer_world, 6);
    let info = supply_negotiation("s", "b");
    let seller_side = seller.negotiator(info.clone(), NegotiationRole::seller(false));
    let buyer_side = buyer.negotiator(info, NegotiationRole::buyer(true));

    let available = |handle: &AgentHandle, category| {
        handle.with_ledger(|l| (0..10).map(|t| l.available(category, t)).collect::<Vec<_>>())
    };
    let seller_before = available(&seller, Category::Sales);
    let buyer_before = available(&buyer, Category::Supplies);

    let state = MechanismState::new(0, ROUNDS);
    assert!(seller_side.propose(&seller_world, &state).is_some());
    assert!(buyer_side.propose(&buyer_world, &state).is_some());
    assert_ne!(available(&seller, Category::Sales), seller_before);

    seller_side.on_failure(&seller_world);
    buyer_side.on_failure(&buyer_world);
    assert_eq!(available(&seller, Category::Sales), seller_before);
    assert_eq!(available(&buyer, Category::Supplies), buyer_before);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_acceptances_never_overcommit_a_day() {
    let (seller_world, _) = worlds();
    let seller = agent("satisficer", &seller_world, 7);
    let buyers: Vec<String> = (0..8).map(|i| format!("b{i}")).collect();

    let accepted: usize = thread::scope(|scope| {
        let workers: Vec<_> = buyers
            .iter()
            .map(|buyer| {
                let negotiator = seller.negotiator(
                    supply_negotiation("s", buyer),
                    NegotiationRole::seller(false),
                );
                let world = &seller_world;
                scope.spawn(move || {
                    // Top of the range, so only capacity can stand in the way.
                    let offer = Deal::new(4, 3, 24.0).unwrap();
                    negotiator
                        .respond(world, &MechanismState::new(0, ROUNDS), &offer)
                        .is_accept()
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| usize::from(worker.join().unwrap()))
            .sum()
    });

    // Ten units a day fit two offers of four.
    assert_eq!(accepted, 2);
    assert_eq!(seller.with_ledger(|l| l.accepted(Category::Sales, 3)), 8);
    assert!(seller.check_ledger().is_ok());
}

#[test]
fn concurrent_proposals_share_capacity() {
    let (seller_world, _) = worlds();
    let seller = agent("satisficer", &seller_world, 8);
    let partners: Vec<AgentId> = (0..6).map(|i| AgentId::new(format!("b{i}"))).collect();

    let offered: u32 = thread::scope(|scope| {
        let workers: Vec<_> = partners
            .iter()
            .map(|partner| {
                let negotiator = seller.negotiator(
                    supply_negotiation("s", partner.as_str()),
                    NegotiationRole::seller(false),
                );
                let world = &seller_world;
                scope.spawn(move || {
                    negotiator
                        .propose(world, &MechanismState::new(0, ROUNDS))
                        .map_or(0, |offer| offer.quantity)
                })
            })
            .collect();
        workers.into_iter().map(|worker| worker.join().unwrap()).sum()
    });

    let held: u32 = seller.with_ledger(|l| (0..10).map(|t| l.tentative(Category::Sales, t)).sum());
    assert_eq!(offered, held);
    // Sales can be delivered on steps 1 to 5 of the window, ten a day.
    assert!(held <= 50);
    assert!(seller.check_ledger().is_ok());
}
