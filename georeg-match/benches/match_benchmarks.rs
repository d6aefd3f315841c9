use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use georeg_core::DescriptorSet;
use georeg_match::{BruteForceMatcher, DescriptorMatcher, MatchFilter, KNN_K};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_binary(n: usize, width: usize, seed: u64) -> DescriptorSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows: Vec<Vec<u8>> = (0..n).map(|_| (0..width).map(|_| rng.gen()).collect()).collect();
    DescriptorSet::from_binary_rows(width, &rows)
}

fn random_float(n: usize, width: usize, seed: u64) -> DescriptorSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows: Vec<Vec<f32>> = (0..n).map(|_| (0..width).map(|_| rng.gen::<f32>()).collect()).collect();
    DescriptorSet::from_float_rows(width, &rows)
}

/// Benchmark k=2 search for binary and float descriptors
fn bench_knn(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn_match");
    group.sample_size(10);
    let matcher = BruteForceMatcher::new();

    for &n in &[500usize, 2000] {
        let query = random_binary(n, 61, 1);
        let train = random_binary(n, 61, 2);
        group.bench_with_input(BenchmarkId::new("hamming_61", n), &n, |b, _| {
            b.iter(|| black_box(matcher.knn_match(black_box(&query), black_box(&train), KNN_K).unwrap()))
        });

        let query = random_float(n, 128, 3);
        let train = random_float(n, 128, 4);
        group.bench_with_input(BenchmarkId::new("l2_128", n), &n, |b, _| {
            b.iter(|| black_box(matcher.knn_match(black_box(&query), black_box(&train), KNN_K).unwrap()))
        });
    }
    group.finish();
}

/// Benchmark the three filter stages on real k=2 output
fn bench_filter(c: &mut Criterion) {
    let query = random_binary(2000, 32, 5);
    let train = random_binary(2000, 32, 6);
    let knn = BruteForceMatcher::new().knn_match(&query, &train, KNN_K).unwrap();
    let filter = MatchFilter::default();

    c.bench_function("filter_separation", |b| b.iter(|| black_box(filter.separation_test(black_box(&knn)))));

    let best: Vec<_> = knn.iter().filter_map(|l| l.first().copied()).collect();
    c.bench_function("filter_duplicates", |b| b.iter(|| black_box(filter.remove_duplicates(black_box(&best)))));
}

criterion_group!(benches, bench_knn, bench_filter);
criterion_main!(benches);
