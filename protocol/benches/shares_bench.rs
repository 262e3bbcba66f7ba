// Share accounting benchmarks for the ARCA protocol.
//
// Covers the widened mul-div primitives, deposit/withdraw conversions at
// realistic vault sizes, and ledger mutation throughput with many holders.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use arca_protocol::vault::math::{mul_div_down, mul_div_up};
use arca_protocol::vault::ShareLedger;
use arca_protocol::Address;

fn seeded_ledger(holders: u64, shares_each: u64) -> ShareLedger {
    let mut ledger = ShareLedger::new();
    for i in 0..holders {
        ledger
            .mint(&Address::new(format!("holder-{i}")), shares_each)
            .unwrap();
    }
    ledger
}

fn bench_mul_div(c: &mut Criterion) {
    c.bench_function("math/mul_div_down", |b| {
        b.iter(|| {
            mul_div_down(
                black_box(987_654_321_987),
                black_box(123_456_789),
                black_box(999_999_937),
            )
        });
    });
    c.bench_function("math/mul_div_up", |b| {
        b.iter(|| {
            mul_div_up(
                black_box(987_654_321_987),
                black_box(123_456_789),
                black_box(999_999_937),
            )
        });
    });
}

fn bench_conversions(c: &mut Criterion) {
    let ledger = seeded_ledger(1_000, 1_000_000);
    let total_assets = 1_337_000_000;

    c.bench_function("shares/shares_for_deposit", |b| {
        b.iter(|| ledger.shares_for_deposit(black_box(25_000), total_assets));
    });
    c.bench_function("shares/shares_for_withdraw", |b| {
        b.iter(|| ledger.shares_for_withdraw(black_box(25_000), total_assets));
    });
}

fn bench_mint_burn(c: &mut Criterion) {
    let mut group = c.benchmark_group("shares/mint_burn");

    for holders in [10u64, 1_000, 100_000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(holders), &holders, |b, &n| {
            let mut ledger = seeded_ledger(n, 1_000);
            let who = Address::new(format!("holder-{}", n / 2));
            b.iter(|| {
                ledger.mint(&who, 10).unwrap();
                ledger.burn(&who, 10).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_mul_div, bench_conversions, bench_mint_burn);
criterion_main!(benches);
