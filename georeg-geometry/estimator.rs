use crate::error::{GeometryError, GeometryResult};
use crate::homography::Point;
use crate::ransac::{HomographyFit, HomographySolver, RansacSolver};
use georeg_core::{Correspondence, Keypoint, RansacConfig, Transform};
use tracing::info;

/// Fitted transform plus the correspondences that agree with it
#[derive(Debug, Clone, PartialEq)]
pub struct TransformEstimate {
    pub transform: Transform,
    /// Parallel to the input correspondences; entries with an index outside
    /// either keypoint set are `false`
    pub inlier_mask: Vec<bool>,
    pub inliers: Vec<Correspondence>,
}

impl TransformEstimate {
    pub fn inlier_count(&self) -> usize {
        self.inliers.len()
    }
}

/// Fits the homography taking match-image keypoints (train side) onto
/// base-map keypoints (query side).
pub struct TransformEstimator {
    solver: Box<dyn HomographySolver>,
    threshold_px: f64,
}

impl TransformEstimator {
    pub fn new(solver: Box<dyn HomographySolver>, threshold_px: f64) -> Self {
        Self { solver, threshold_px }
    }

    /// RANSAC solver with the given settings
    pub fn ransac(config: RansacConfig, threshold_px: f64) -> Self {
        Self::new(Box::new(RansacSolver::new(config)), threshold_px)
    }

    pub fn threshold_px(&self) -> f64 {
        self.threshold_px
    }

    pub fn estimate(
        &self,
        query: &[Keypoint],
        train: &[Keypoint],
        matches: &[Correspondence],
    ) -> GeometryResult<TransformEstimate> {
        // positions of the usable correspondences within `matches`
        let valid: Vec<usize> = matches
            .iter()
            .enumerate()
            .filter(|(_, m)| m.query_idx < query.len() && m.train_idx < train.len())
            .map(|(i, _)| i)
            .collect();

        let (src, dst): (Vec<Point>, Vec<Point>) = valid
            .iter()
            .map(|&i| {
                let m = &matches[i];
                let t = &train[m.train_idx];
                let q = &query[m.query_idx];
                ([t.x as f64, t.y as f64], [q.x as f64, q.y as f64])
            })
            .unzip();

        let HomographyFit {
            transform,
            inliers: mask,
            inlier_count,
        } = self.solver.fit_homography(&src, &dst, self.threshold_px)?;
        if mask.len() != valid.len() {
            return Err(GeometryError::LengthMismatch {
                src: valid.len(),
                dst: mask.len(),
            });
        }

        let mut inlier_mask = vec![false; matches.len()];
        for (&i, &keep) in valid.iter().zip(&mask) {
            inlier_mask[i] = keep;
        }
        let inliers: Vec<Correspondence> = matches
            .iter()
            .zip(&inlier_mask)
            .filter(|(_, &keep)| keep)
            .map(|(m, _)| *m)
            .collect();
        info!(inliers = inlier_count, matches = valid.len(), "homography computed");
        Ok(TransformEstimate {
            transform,
            inlier_mask,
            inliers,
        })
    }
}

impl Default for TransformEstimator {
    fn default() -> Self {
        Self::ransac(RansacConfig::default(), 30.0)
    }
}
