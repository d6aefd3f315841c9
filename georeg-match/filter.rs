use crate::error::{FilterError, FilterResult, FilterStage};
use georeg_core::{Correspondence, DistanceThreshold, FilterConfig};
use std::collections::HashMap;
use tracing::{debug, info};

/// Correspondences surviving each filter stage, in query order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    pub raw: usize,
    /// After the separation-ratio test
    pub separated: Vec<Correspondence>,
    /// After index validation and duplicate removal
    pub unique: Vec<Correspondence>,
    /// After the distance cut; input to the geometric fit
    pub good: Vec<Correspondence>,
    /// Distance bound used by the last stage
    pub threshold: f32,
}

/// Three stage filter over k=2 neighbour lists: separation ratio, duplicate
/// removal, distance threshold. The stages always run in that order.
#[derive(Debug, Clone)]
pub struct MatchFilter {
    config: FilterConfig,
}

impl MatchFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Keep the best neighbour of every list whose best distance is strictly
    /// below `ratio` times the second best. Lists with fewer than two
    /// neighbours carry no separation evidence and are dropped.
    pub fn separation_test(&self, knn: &[Vec<Correspondence>]) -> Vec<Correspondence> {
        let ratio = self.config.separation_ratio;
        knn.iter()
            .filter_map(|neighbours| match neighbours.as_slice() {
                [best, second, ..] if best.distance < ratio * second.distance => Some(*best),
                _ => None,
            })
            .collect()
    }

    /// Drop correspondences pointing outside either feature set
    pub fn validate_indices(matches: &[Correspondence], n_query: usize, n_train: usize) -> Vec<Correspondence> {
        matches
            .iter()
            .filter(|m| m.query_idx < n_query && m.train_idx < n_train)
            .copied()
            .collect()
    }

    /// Drop every correspondence that shares its query or train index with
    /// `duplicate_cutoff` or more of the others. Counts are taken over the
    /// whole input set, not updated as matches are removed.
    pub fn remove_duplicates(&self, matches: &[Correspondence]) -> Vec<Correspondence> {
        let mut by_query: HashMap<usize, usize> = HashMap::new();
        let mut by_train: HashMap<usize, usize> = HashMap::new();
        let mut by_pair: HashMap<(usize, usize), usize> = HashMap::new();
        for m in matches {
            *by_query.entry(m.query_idx).or_default() += 1;
            *by_train.entry(m.train_idx).or_default() += 1;
            *by_pair.entry((m.query_idx, m.train_idx)).or_default() += 1;
        }

        matches
            .iter()
            .filter(|m| {
                // Others sharing the query or the train index, each counted once
                let shared_query = by_query[&m.query_idx];
                let shared_train = by_train[&m.train_idx];
                let shared_both = by_pair[&(m.query_idx, m.train_idx)];
                let colliding = shared_query + shared_train - shared_both - 1;
                colliding < self.config.duplicate_cutoff
            })
            .copied()
            .collect()
    }

    /// Upper distance bound for the last stage, or `None` for an empty set
    pub fn threshold(&self, matches: &[Correspondence]) -> Option<f32> {
        let (min, max) = matches.iter().fold(None, |acc: Option<(f32, f32)>, m| match acc {
            None => Some((m.distance, m.distance)),
            Some((lo, hi)) => Some((lo.min(m.distance), hi.max(m.distance))),
        })?;
        Some(match self.config.distance_threshold {
            DistanceThreshold::MaxObserved => max,
            DistanceThreshold::Midpoint => (min + max) / 2.0,
            DistanceThreshold::Absolute(limit) => limit,
        })
    }

    /// Keep correspondences with distance at most `threshold`
    pub fn distance_cut(matches: &[Correspondence], threshold: f32) -> Vec<Correspondence> {
        matches.iter().filter(|m| m.distance <= threshold).copied().collect()
    }

    /// Run all stages. Fails when fewer than `min_legal_matches` survive the
    /// separation test or the final cut.
    pub fn apply(&self, knn: &[Vec<Correspondence>], n_query: usize, n_train: usize) -> FilterResult<FilterOutcome> {
        let required = self.config.min_legal_matches;

        let separated = self.separation_test(knn);
        info!(
            separated = separated.len(),
            raw = knn.len(),
            "after match separation"
        );
        if separated.len() < required {
            return Err(FilterError::TooFewMatches {
                stage: FilterStage::Separation,
                remaining: separated.len(),
                required,
            });
        }

        let valid = Self::validate_indices(&separated, n_query, n_train);
        if valid.len() != separated.len() {
            debug!(dropped = separated.len() - valid.len(), "dangling match indices");
        }
        let unique = self.remove_duplicates(&valid);
        let threshold = self.threshold(&unique).unwrap_or(0.0);
        let good = Self::distance_cut(&unique, threshold);
        info!(
            good = good.len(),
            separated = separated.len(),
            unique = unique.len(),
            threshold,
            "after score filtering"
        );
        if good.len() < required {
            return Err(FilterError::TooFewMatches {
                stage: FilterStage::Distance,
                remaining: good.len(),
                required,
            });
        }

        Ok(FilterOutcome {
            raw: knn.len(),
            separated,
            unique,
            good,
            threshold,
        })
    }
}

impl Default for MatchFilter {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn knn(query_idx: usize, best: (usize, f32), second: (usize, f32)) -> Vec<Correspondence> {
        vec![
            Correspondence::new(query_idx, best.0, best.1),
            Correspondence::new(query_idx, second.0, second.1),
        ]
    }

    #[test]
    fn test_separation_is_strict() {
        let filter = MatchFilter::default();
        let lists = vec![
            knn(0, (3, 10.0), (4, 20.0)),
            knn(1, (5, 8.0), (6, 10.0)),
            knn(2, (7, 9.0), (8, 10.0)),
            vec![Correspondence::new(3, 1, 0.0)],
            Vec::new(),
        ];
        let kept = filter.separation_test(&lists);
        // 8 < 0.8 * 10 fails because the test is strict
        assert_eq!(kept, vec![Correspondence::new(0, 3, 10.0)]);
    }

    #[test]
    fn test_duplicates_need_two_collisions() {
        let filter = MatchFilter::default();
        let matches = vec![
            Correspondence::new(0, 10, 1.0),
            Correspondence::new(1, 10, 1.0),
            Correspondence::new(2, 20, 1.0),
            Correspondence::new(3, 20, 1.0),
            Correspondence::new(4, 20, 1.0),
            Correspondence::new(5, 30, 1.0),
        ];
        let unique = filter.remove_duplicates(&matches);
        let queries: Vec<usize> = unique.iter().map(|m| m.query_idx).collect();
        // train 10 is shared by a pair (one collision each), train 20 by three
        assert_eq!(queries, vec![0, 1, 5]);
    }

    #[test]
    fn test_query_and_train_collisions_combine() {
        let filter = MatchFilter::default();
        let matches = vec![
            Correspondence::new(0, 10, 1.0),
            Correspondence::new(0, 11, 1.0),
            Correspondence::new(1, 10, 1.0),
        ];
        let unique = filter.remove_duplicates(&matches);
        // (0, 10) collides with both others
        assert_eq!(unique, vec![Correspondence::new(0, 11, 1.0), Correspondence::new(1, 10, 1.0)]);
    }

    #[test]
    fn test_dangling_indices_dropped() {
        let matches = vec![Correspondence::new(0, 0, 1.0), Correspondence::new(5, 0, 1.0), Correspondence::new(1, 9, 1.0)];
        let valid = MatchFilter::validate_indices(&matches, 3, 3);
        assert_eq!(valid, vec![Correspondence::new(0, 0, 1.0)]);
    }

    #[test]
    fn test_thresholds() {
        let matches = vec![Correspondence::new(0, 0, 2.0), Correspondence::new(1, 1, 10.0)];
        let mut config = FilterConfig::default();
        assert_eq!(MatchFilter::new(config.clone()).threshold(&matches), Some(10.0));
        config.distance_threshold = DistanceThreshold::Midpoint;
        assert_eq!(MatchFilter::new(config.clone()).threshold(&matches), Some(6.0));
        config.distance_threshold = DistanceThreshold::Absolute(3.5);
        assert_eq!(MatchFilter::new(config).threshold(&matches), Some(3.5));
        assert_eq!(MatchFilter::default().threshold(&[]), None);
    }

    #[test]
    fn test_max_observed_keeps_everything() {
        let matches: Vec<_> = (0..6).map(|i| Correspondence::new(i, i, i as f32)).collect();
        let filter = MatchFilter::default();
        let t = filter.threshold(&matches).unwrap();
        assert_eq!(MatchFilter::distance_cut(&matches, t), matches);
    }

    #[test]
    fn test_apply_reports_stages() {
        let lists: Vec<_> = (0..6).map(|i| knn(i, (i, 1.0 + i as f32), (i + 1, 100.0))).collect();
        let outcome = MatchFilter::default().apply(&lists, 6, 7).unwrap();
        assert_eq!(outcome.raw, 6);
        assert_eq!(outcome.separated.len(), 6);
        assert_eq!(outcome.unique.len(), 6);
        assert_eq!(outcome.good.len(), 6);
        assert_eq!(outcome.threshold, 6.0);
    }

    #[test]
    fn test_apply_fails_on_ambiguous_matches() {
        let lists: Vec<_> = (0..10).map(|i| knn(i, (i, 10.0), (i + 1, 11.0))).collect();
        let err = MatchFilter::default().apply(&lists, 10, 11).unwrap_err();
        assert!(matches!(
            err,
            FilterError::TooFewMatches {
                stage: FilterStage::Separation,
                remaining: 0,
                required: 3
            }
        ));
    }

    #[test]
    fn test_apply_fails_after_duplicates() {
        // Everything maps onto train 0
        let lists: Vec<_> = (0..5).map(|i| knn(i, (0, 1.0), (1, 50.0))).collect();
        let err = MatchFilter::default().apply(&lists, 5, 2).unwrap_err();
        assert!(matches!(
            err,
            FilterError::TooFewMatches {
                stage: FilterStage::Distance,
                remaining: 0,
                ..
            }
        ));
    }

    fn arb_lists() -> impl Strategy<Value = Vec<Vec<Correspondence>>> {
        prop::collection::vec((0usize..12, 0.0f32..100.0, 0usize..12, 0.0f32..100.0), 0..40).prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(q, (t1, d1, t2, d2))| {
                    let (a, b) = if d1 <= d2 { ((t1, d1), (t2, d2)) } else { ((t2, d2), (t1, d1)) };
                    knn(q, a, b)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_separation_keeps_exactly_the_separated(lists in arb_lists()) {
            let filter = MatchFilter::default();
            let kept = filter.separation_test(&lists);
            let expected: Vec<_> = lists
                .iter()
                .filter(|l| l[0].distance < 0.8 * l[1].distance)
                .map(|l| l[0])
                .collect();
            prop_assert_eq!(kept, expected);
        }

        #[test]
        fn prop_unique_indices_collide_at_most_once(lists in arb_lists()) {
            let filter = MatchFilter::default();
            let separated = filter.separation_test(&lists);
            let unique = filter.remove_duplicates(&separated);
            for (i, a) in unique.iter().enumerate() {
                let collisions = unique
                    .iter()
                    .enumerate()
                    .filter(|(j, b)| *j != i && (a.query_idx == b.query_idx || a.train_idx == b.train_idx))
                    .count();
                prop_assert!(collisions <= 1);
            }
        }

        #[test]
        fn prop_stages_only_shrink(lists in arb_lists()) {
            let filter = MatchFilter::default();
            if let Ok(outcome) = filter.apply(&lists, 40, 12) {
                prop_assert!(outcome.good.len() <= outcome.unique.len());
                prop_assert!(outcome.unique.len() <= outcome.separated.len());
                prop_assert!(outcome.separated.len() <= outcome.raw);
                for m in &outcome.good {
                    prop_assert!(outcome.unique.contains(m));
                    prop_assert!(m.distance <= outcome.threshold);
                }
            }
        }
    }
}
