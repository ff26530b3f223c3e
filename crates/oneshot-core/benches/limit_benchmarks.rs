//! Benchmarks for oneshot-core.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use oneshot_core::{
    Deal, ExogenousContract, ExogenousContracts, IssueRange, LimitSearch, NegotiationRanges,
    OneShotUFun, ProductionProfile,
};

fn ufun(n_negs: usize, force: bool) -> OneShotUFun {
    OneShotUFun::builder()
        .profile(ProductionProfile::default())
        .exogenous(ExogenousContracts {
            input: ExogenousContract::new(3, 30.0).unwrap(),
            output: ExogenousContract::default(),
        })
        .ranges(NegotiationRanges {
            input_quantity: IssueRange::new(1, 3).unwrap(),
            input_price: IssueRange::new(8, 12).unwrap(),
            output_quantity: IssueRange::new(1, 3).unwrap(),
            output_price: IssueRange::new(18, 22).unwrap(),
        })
        .negotiations(n_negs, n_negs)
        .force_exogenous(force)
        .build()
        .unwrap()
}

fn benchmark_evaluate(c: &mut Criterion) {
    let ufun = ufun(4, true);
    let inputs: Vec<Deal> = (1..=4).map(|q| Deal::new(q, 0, 10.0).unwrap()).collect();
    let outputs: Vec<Deal> = (1..=4).map(|q| Deal::new(q, 0, 20.0).unwrap()).collect();

    c.bench_function("evaluate_8_deals", |b| {
        b.iter(|| ufun.evaluate(black_box(&inputs), black_box(&outputs)));
    });
}

fn benchmark_brute_force(c: &mut Criterion) {
    let mut group = c.benchmark_group("brute_force_both");
    for n_negs in 1..=2 {
        let ufun = ufun(n_negs, true);
        group.bench_with_input(BenchmarkId::from_parameter(n_negs), &ufun, |b, ufun| {
            b.iter(|| LimitSearch::new(ufun).brute_force_both().unwrap());
        });
    }
    group.finish();
}

fn benchmark_analytic(c: &mut Criterion) {
    let mut group = c.benchmark_group("analytic_find_both");
    for n_negs in [2, 8, 32] {
        let ufun = ufun(n_negs, true);
        group.bench_with_input(BenchmarkId::from_parameter(n_negs), &ufun, |b, ufun| {
            b.iter(|| LimitSearch::new(ufun).find_both());
        });
    }
    group.finish();
}

fn benchmark_unforced(c: &mut Criterion) {
    let ufun = ufun(8, false);
    c.bench_function("unforced_find_both_8", |b| {
        b.iter(|| LimitSearch::new(black_box(&ufun)).find_both());
    });
}

criterion_group!(
    benches,
    benchmark_evaluate,
    benchmark_brute_force,
    benchmark_analytic,
    benchmark_unforced
);
criterion_main!(benches);
