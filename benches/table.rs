use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sdntable::{NoopReporter, Options, Table64};
use std::sync::Arc;

fn names(n: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(0);
    (0..n)
        .map(|_| {
            let len = rng.gen_range(3..14);
            let label: String = (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
            format!("{}.example.com", label)
        })
        .collect()
}

fn bench_append(c: &mut Criterion) {
    let names = names(10_000);
    c.bench_function("append 10k + normalize", |b| {
        b.iter_batched(
            Table64::new,
            |mut t| {
                for (i, name) in names.iter().enumerate() {
                    t = t.append(name, i as u64).unwrap().0;
                }
                black_box(t.normalize())
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_get_memory(c: &mut Criterion) {
    let names = names(10_000);
    let mut t = Table64::new();
    for (i, name) in names.iter().enumerate() {
        t.inplace_insert(name, i as u64).unwrap();
    }
    let mut i = 0;
    c.bench_function("get resident", |b| {
        b.iter(|| {
            i = (i + 1) % names.len();
            black_box(t.get(&names[i]).unwrap())
        })
    });
}

fn bench_get_disk(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let names = names(50_000);
    let opts = Options::default()
        .with_path(dir.path())
        .with_limit(256 << 10)
        .with_reporter(Arc::new(NoopReporter));
    let mut t = Table64::open(opts).unwrap();
    for (i, name) in names.iter().enumerate() {
        t.inplace_insert(name, i as u64).unwrap();
    }
    t.flush_all().unwrap();
    let mut i = 0;
    c.bench_function("get on disk", |b| {
        b.iter(|| {
            i = (i + 7919) % names.len();
            black_box(t.get(&names[i]).unwrap())
        })
    });
    t.close().unwrap();
}

criterion_group!(benches, bench_append, bench_get_memory, bench_get_disk);
criterion_main!(benches);
