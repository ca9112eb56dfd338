use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strand_core::{batch, Computed, Effect, Signal};

fn fan_out(c: &mut Criterion) {
    let source = Signal::new(0u64);
    let effects: Vec<Effect> = (0..1_000)
        .map(|_| {
            Effect::new(move || {
                black_box(source.get());
            })
        })
        .collect();

    let mut next = 0u64;
    c.bench_function("fan_out_1000_effects", |b| {
        b.iter(|| {
            next += 1;
            source.set(next);
        })
    });

    for effect in effects {
        effect.dispose();
    }
}

fn deep_chain(c: &mut Criterion) {
    let source = Signal::new(0u64);
    let mut tail = Computed::new(move || source.get());
    for _ in 0..100 {
        let prev = tail;
        tail = Computed::new(move || prev.get() + 1);
    }

    let mut next = 0u64;
    c.bench_function("deep_chain_100_read", |b| {
        b.iter(|| {
            next += 1;
            source.set(next);
            black_box(tail.get())
        })
    });
}

fn diamond(c: &mut Criterion) {
    let source = Signal::new(0u64);
    let left = Computed::new(move || source.get() + 1);
    let right = Computed::new(move || source.get() * 2);
    let sink = Computed::new(move || left.get() + right.get());
    let _effect = Effect::new(move || {
        black_box(sink.get());
    });

    let mut next = 0u64;
    c.bench_function("diamond_write", |b| {
        b.iter(|| {
            next += 1;
            source.set(next);
        })
    });
}

fn batched_writes(c: &mut Criterion) {
    let signals: Vec<Signal<u64>> = (0..100).map(Signal::new).collect();
    let readers = signals.clone();
    let _effect = Effect::new(move || {
        black_box(readers.iter().map(|s| s.get()).sum::<u64>());
    });

    let mut next = 0u64;
    c.bench_function("batch_100_writes", |b| {
        b.iter(|| {
            next += 1;
            batch(|| {
                for s in &signals {
                    s.set(next);
                }
            })
        })
    });
}

criterion_group!(benches, fan_out, deep_chain, diamond, batched_writes);
criterion_main!(benches);
