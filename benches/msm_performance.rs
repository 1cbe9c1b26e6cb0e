//! Benchmark for fixed-base multiexponentiation throughput over
//! precomputed partition tables, varying generator count and scalar width.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use curve25519_dalek::ristretto::RistrettoPoint;
use fixed_msm::curve::Element;
use fixed_msm::msm::{async_multiexponentiate, block_on, multiexponentiate};
use fixed_msm::table::InMemoryPartitionTableAccessor;

fn generate_generators(n: usize, rng: &mut ChaCha20Rng) -> Vec<RistrettoPoint> {
    (0..n).map(|_| RistrettoPoint::random(rng)).collect()
}

fn bench_fixed_msm(c: &mut Criterion) {
    let mut group = c.benchmark_group("fixed_msm");
    group.sample_size(10);

    let mut rng = ChaCha20Rng::seed_from_u64(0xbeef);
    for &n in &[256usize, 1024, 4096] {
        let generators = generate_generators(n, &mut rng);
        let accessor = InMemoryPartitionTableAccessor::from_generators(&generators);
        let scalars: Vec<u8> = (0..n * 32).map(|_| rng.gen()).collect();
        let bit_table = [256u32];
        let lengths = [n as u32];

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("host", n), &n, |b, _| {
            b.iter(|| {
                let mut res = [RistrettoPoint::identity()];
                multiexponentiate(&mut res, &accessor, &bit_table, &lengths, &scalars);
                res
            })
        });
        group.bench_with_input(BenchmarkId::new("device", n), &n, |b, _| {
            b.iter(|| {
                let mut res = [RistrettoPoint::identity()];
                block_on(async_multiexponentiate(
                    &mut res, &accessor, &bit_table, &lengths, &scalars,
                ));
                res
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fixed_msm);
criterion_main!(benches);
