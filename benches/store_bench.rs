use criterion::{criterion_group, criterion_main, Criterion};
use hoard::Store;
use once_cell::sync::Lazy;
use rand::prelude::*;
use tempfile::TempDir;

static SEED_VALUES: Lazy<Vec<Vec<u8>>> = Lazy::new(|| {
    let mut rng = rand::thread_rng();
    (0..=100)
        .map(|_| (0..64).map(|_| rng.gen::<u8>()).collect())
        .collect()
});

// NOTE: These benchmarks are likely not very accurate, but serve to keep an
// eye on the relative cost of the append and seek-read paths.
pub fn hoard(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(temp_dir.path().join("bench")).unwrap();

    c.bench_function("write_store", |b| {
        b.iter(|| {
            for (i, seed) in SEED_VALUES.iter().enumerate() {
                store
                    .put(&i.to_string(), seed, "application/octet-stream")
                    .unwrap();
            }
        })
    });

    c.bench_function("read_store", |b| {
        b.iter(|| {
            for (i, seed) in SEED_VALUES.iter().enumerate() {
                let (value, _) = store.get(&i.to_string()).unwrap();
                assert_eq!(&value, seed);
            }
        })
    });

    c.bench_function("merge_store", |b| {
        b.iter(|| {
            store.merge().unwrap();
        })
    });
}

criterion_group!(benches, hoard);
criterion_main!(benches);
