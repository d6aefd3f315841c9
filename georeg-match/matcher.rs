use crate::error::{MatchError, MatchResult};
use georeg_core::{Correspondence, DescriptorSet};
use rayon::prelude::*;

/// Nearest neighbours in the train set for every query row, best first
pub type KnnMatches = Vec<Vec<Correspondence>>;

/// k-nearest-neighbour search between two descriptor sets
pub trait DescriptorMatcher: Send + Sync {
    /// For every query row, up to `k` train rows ordered by increasing
    /// distance. A query row sees fewer than `k` neighbours only when the
    /// train set is smaller than `k`.
    fn knn_match(&self, query: &DescriptorSet, train: &DescriptorSet, k: usize) -> MatchResult<KnnMatches>;
}

/// Exhaustive search. Hamming popcount for binary rows, Euclidean distance
/// for float rows. Equal distances keep the lower train index first.
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceMatcher;

impl BruteForceMatcher {
    pub fn new() -> Self {
        Self
    }
}

impl DescriptorMatcher for BruteForceMatcher {
    fn knn_match(&self, query: &DescriptorSet, train: &DescriptorSet, k: usize) -> MatchResult<KnnMatches> {
        if k == 0 {
            return Err(MatchError::InvalidK);
        }
        if !query.is_empty() && !train.is_empty() && query.width() != train.width() {
            return Err(MatchError::WidthMismatch {
                query: query.width(),
                train: train.width(),
            });
        }

        let n_train = train.len();
        let matches = match (query, train) {
            (DescriptorSet::Binary { width, data: q }, DescriptorSet::Binary { data: t, .. }) => {
                search(q, t, *width, n_train, k, |a, b| hamming_distance(a, b) as f32)
            }
            (DescriptorSet::Float { width, data: q }, DescriptorSet::Float { data: t, .. }) => {
                search(q, t, *width, n_train, k, l2_distance)
            }
            _ => {
                return Err(MatchError::KindMismatch {
                    query: query.kind(),
                    train: train.kind(),
                })
            }
        };
        Ok(matches)
    }
}

fn search<T, F>(query: &[T], train: &[T], width: usize, n_train: usize, k: usize, distance: F) -> KnnMatches
where
    T: Sync,
    F: Fn(&[T], &[T]) -> f32 + Sync,
{
    if width == 0 {
        return Vec::new();
    }
    query
        .par_chunks(width)
        .enumerate()
        .map(|(query_idx, q)| {
            let mut best: Vec<Correspondence> = Vec::with_capacity(k + 1);
            for (train_idx, t) in train.chunks(width).take(n_train).enumerate() {
                let d = distance(q, t);
                if best.len() == k && d >= best[k - 1].distance {
                    continue;
                }
                // Insert after every equal distance so earlier rows win ties
                let pos = best.partition_point(|m| m.distance <= d);
                best.insert(pos, Correspondence::new(query_idx, train_idx, d));
                best.truncate(k);
            }
            best
        })
        .collect()
}

/// Number of differing bits
#[inline]
pub fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

#[inline]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}
