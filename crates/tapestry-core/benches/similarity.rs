use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tapestry_core::{
    Intention, Ledger, Mnemosyne, Region, Sentinel, ThreadDraft, TimeOfDay, fixed_clock,
};

const TITLES: &[&str] = &[
    "Sunrise over the harbour walls",
    "Spice market at noon",
    "Silent dunes under the stars",
    "Old gate of the fortress",
    "Lanterns in the narrow alleys",
];

fn ledger(n: usize) -> Ledger {
    let mut ledger = Ledger::new().with_clock(fixed_clock(0));
    for i in 0..n {
        let draft = ThreadDraft::new(
            Intention::KNOWN[i % 4],
            TimeOfDay::KNOWN[(i / 4) % 4],
            Region::KNOWN[(i / 16) % 4],
        )
        .with_title(TITLES[i % TITLES.len()])
        .with_timestamp(i as u64 * 1_000);
        let _ = ledger.append(draft);
    }
    ledger
}

fn bench_query_1000(c: &mut Criterion) {
    let snapshot = ledger(1_000).snapshot();
    let target = snapshot[0].clone();
    c.bench_function("mnemosyne_query_1000", |b| {
        b.iter(|| Mnemosyne::query(black_box(&target), black_box(&snapshot), true))
    });
}

fn bench_assess_1000(c: &mut Criterion) {
    let snapshot = ledger(1_000).snapshot();
    let sentinel = Sentinel::default();
    c.bench_function("sentinel_assess_1000", |b| {
        b.iter(|| sentinel.assess(black_box(&snapshot)))
    });
}

criterion_group!(benches, bench_query_1000, bench_assess_1000);
criterion_main!(benches);
