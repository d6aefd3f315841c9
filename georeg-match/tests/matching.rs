use georeg_core::DescriptorSet;
use georeg_match::{BruteForceMatcher, DescriptorMatcher, FilterError, MatchFilter, KNN_K};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const WIDTH: usize = 32;

fn random_rows(n: usize, rng: &mut StdRng) -> Vec<[u8; WIDTH]> {
    (0..n)
        .map(|_| {
            let mut row = [0u8; WIDTH];
            rng.fill(&mut row[..]);
            row
        })
        .collect()
}

#[test]
fn test_permuted_noisy_copy_is_recovered() {
    let mut rng = StdRng::seed_from_u64(42);
    let query_rows = random_rows(300, &mut rng);

    // train[perm[i]] is query[i] with a few flipped bits
    let mut perm: Vec<usize> = (0..query_rows.len()).collect();
    perm.shuffle(&mut rng);
    let mut train_rows = vec![[0u8; WIDTH]; query_rows.len()];
    for (i, row) in query_rows.iter().enumerate() {
        let mut noisy = *row;
        for _ in 0..6 {
            let bit = rng.gen_range(0..WIDTH * 8);
            noisy[bit / 8] ^= 1 << (bit % 8);
        }
        train_rows[perm[i]] = noisy;
    }

    let query = DescriptorSet::from_binary_rows(WIDTH, &query_rows);
    let train = DescriptorSet::from_binary_rows(WIDTH, &train_rows);
    let knn = BruteForceMatcher::new().knn_match(&query, &train, KNN_K).unwrap();
    assert_eq!(knn.len(), 300);

    let outcome = MatchFilter::default().apply(&knn, query.len(), train.len()).unwrap();
    assert_eq!(outcome.good.len(), 300);
    for m in &outcome.good {
        assert_eq!(m.train_idx, perm[m.query_idx]);
        assert!(m.distance <= 6.0);
    }
}

#[test]
fn test_unrelated_descriptors_fail_separation() {
    let mut rng = StdRng::seed_from_u64(7);
    let query = DescriptorSet::from_binary_rows(WIDTH, &random_rows(200, &mut rng));
    let train = DescriptorSet::from_binary_rows(WIDTH, &random_rows(200, &mut rng));
    let knn = BruteForceMatcher::new().knn_match(&query, &train, KNN_K).unwrap();
    let result = MatchFilter::default().apply(&knn, query.len(), train.len());
    assert!(matches!(result, Err(FilterError::TooFewMatches { .. })));
}
