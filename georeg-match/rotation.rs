use crate::error::RotationError;
use georeg_core::{Correspondence, Keypoint};
use tracing::debug;

/// Correspondences considered; pairs grow quadratically
const MAX_SAMPLES: usize = 200;
/// Pairs closer than this in either image give no stable direction
const MIN_PAIR_SPAN: f32 = 2.0;

/// Dominant rotation taking the match image onto the base map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationEstimate {
    /// Radians in (-pi, pi], counter-clockwise in image coordinates
    pub angle: f64,
    /// Mean resultant length of the pair angles, 1 when they all agree
    pub concentration: f64,
    /// Pairs that voted
    pub support: usize,
}

impl RotationEstimate {
    pub fn degrees(&self) -> f64 {
        self.angle.to_degrees()
    }
}

/// Circular mean of pairwise direction differences between the two images.
///
/// For every pair of correspondences the direction of the segment joining
/// them is measured in both images; under a similarity transform the
/// difference is the same for all pairs. Outlier pairs spread uniformly and
/// only lower the concentration.
#[derive(Debug, Clone)]
pub struct RotationEstimator {
    pub min_correspondences: usize,
    pub min_concentration: f64,
}

impl Default for RotationEstimator {
    fn default() -> Self {
        Self {
            min_correspondences: 3,
            min_concentration: 0.3,
        }
    }
}

impl RotationEstimator {
    pub fn new(min_correspondences: usize, min_concentration: f64) -> Self {
        Self {
            min_correspondences,
            min_concentration,
        }
    }

    /// `query` keypoints belong to the base map, `train` to the match image.
    /// Correspondences with dangling indices are ignored.
    pub fn estimate(
        &self,
        query: &[Keypoint],
        train: &[Keypoint],
        matches: &[Correspondence],
    ) -> Result<RotationEstimate, RotationError> {
        let points: Vec<(&Keypoint, &Keypoint)> = matches
            .iter()
            .filter_map(|m| Some((query.get(m.query_idx)?, train.get(m.train_idx)?)))
            .take(MAX_SAMPLES)
            .collect();
        let required = self.min_correspondences.max(2);
        if points.len() < required {
            return Err(RotationError::TooFewCorrespondences {
                found: points.len(),
                required,
            });
        }

        let (mut sum_cos, mut sum_sin, mut support) = (0.0f64, 0.0f64, 0usize);
        for (i, (qa, ta)) in points.iter().enumerate() {
            for (qb, tb) in &points[i + 1..] {
                let (qdx, qdy) = (qb.x - qa.x, qb.y - qa.y);
                let (tdx, tdy) = (tb.x - ta.x, tb.y - ta.y);
                if qdx.hypot(qdy) < MIN_PAIR_SPAN || tdx.hypot(tdy) < MIN_PAIR_SPAN {
                    continue;
                }
                let delta = (qdy as f64).atan2(qdx as f64) - (tdy as f64).atan2(tdx as f64);
                sum_cos += delta.cos();
                sum_sin += delta.sin();
                support += 1;
            }
        }
        if support == 0 {
            return Err(RotationError::TooFewCorrespondences {
                found: points.len(),
                required,
            });
        }

        let concentration = sum_cos.hypot(sum_sin) / support as f64;
        if concentration < self.min_concentration {
            return Err(RotationError::NoDominantDirection { concentration });
        }
        let angle = sum_sin.atan2(sum_cos);
        debug!(degrees = angle.to_degrees(), concentration, support, "rotation estimate");
        Ok(RotationEstimate {
            angle,
            concentration,
            support,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rotated_pairs(theta: f64, n: usize) -> (Vec<Keypoint>, Vec<Keypoint>, Vec<Correspondence>) {
        let (s, c) = theta.sin_cos();
        let mut train = Vec::new();
        let mut query = Vec::new();
        let mut matches = Vec::new();
        for i in 0..n {
            let x = (i * 37 % 200) as f64;
            let y = (i * 53 % 150) as f64;
            train.push(Keypoint::new(x as f32, y as f32));
            query.push(Keypoint::new((c * x - s * y + 40.0) as f32, (s * x + c * y - 10.0) as f32));
            matches.push(Correspondence::new(i, i, 1.0));
        }
        (query, train, matches)
    }

    #[test]
    fn test_recovers_rotation() {
        let theta = 30f64.to_radians();
        let (query, train, matches) = rotated_pairs(theta, 20);
        let estimate = RotationEstimator::default().estimate(&query, &train, &matches).unwrap();
        assert_relative_eq!(estimate.angle, theta, epsilon = 1e-3);
        assert!(estimate.concentration > 0.99);
        assert_eq!(estimate.support, 190);
    }

    #[test]
    fn test_identity_is_zero() {
        let (query, train, matches) = rotated_pairs(0.0, 10);
        let estimate = RotationEstimator::default().estimate(&query, &train, &matches).unwrap();
        assert_relative_eq!(estimate.angle, 0.0, epsilon = 1e-6);
        assert_relative_eq!(estimate.degrees(), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_too_few_correspondences() {
        let (query, train, matches) = rotated_pairs(0.5, 2);
        let err = RotationEstimator::default().estimate(&query, &train, &matches).unwrap_err();
        assert!(matches!(err, RotationError::TooFewCorrespondences { found: 2, required: 3 }));
    }

    #[test]
    fn test_dangling_indices_ignored() {
        let (query, train, mut matches) = rotated_pairs(0.2, 3);
        matches.push(Correspondence::new(99, 0, 1.0));
        let estimate = RotationEstimator::default().estimate(&query, &train, &matches).unwrap();
        assert_eq!(estimate.support, 3);
    }

    #[test]
    fn test_mirrored_triangle_has_no_dominant_angle() {
        let h = 8.660_254;
        let query = vec![Keypoint::new(0.0, 0.0), Keypoint::new(10.0, 0.0), Keypoint::new(5.0, -h)];
        let train = vec![Keypoint::new(0.0, 0.0), Keypoint::new(10.0, 0.0), Keypoint::new(5.0, h)];
        let matches: Vec<_> = (0..3).map(|i| Correspondence::new(i, i, 1.0)).collect();
        let err = RotationEstimator::default().estimate(&query, &train, &matches).unwrap_err();
        match err {
            RotationError::NoDominantDirection { concentration } => assert!(concentration < 1e-3),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
