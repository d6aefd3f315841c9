use crate::error::{GeometryError, GeometryResult};
use crate::homography::{estimate_dlt, is_degenerate_sample, reprojection_error, Point};
use georeg_core::{RansacConfig, Transform};
use nalgebra::Matrix3;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use tracing::{debug, trace};

const SAMPLE_SIZE: usize = 4;
/// Redraws allowed for one degenerate minimal sample
const MAX_SAMPLE_RETRIES: usize = 50;

/// Homography with its per-correspondence inlier labels
#[derive(Debug, Clone, PartialEq)]
pub struct HomographyFit {
    pub transform: Transform,
    /// One flag per input correspondence
    pub inliers: Vec<bool>,
    pub inlier_count: usize,
}

impl HomographyFit {
    pub fn inlier_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.inliers.iter().enumerate().filter(|(_, &keep)| keep).map(|(i, _)| i)
    }
}

/// Outlier-tolerant fit of `dst ~ H * src`
pub trait HomographySolver: Send + Sync {
    /// Every point with reprojection error at most `threshold_px` under the
    /// returned transform is labelled an inlier, and no other.
    fn fit_homography(&self, src: &[Point], dst: &[Point], threshold_px: f64) -> GeometryResult<HomographyFit>;
}

/// Seeded RANSAC over four point DLT samples with an adaptive iteration
/// count and a least-squares refit on the best consensus set.
#[derive(Debug, Clone)]
pub struct RansacSolver {
    config: RansacConfig,
}

impl RansacSolver {
    pub fn new(config: RansacConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RansacConfig {
        &self.config
    }

    /// Iterations needed to draw an all-inlier sample with the configured
    /// confidence, given the current inlier ratio
    fn required_iterations(&self, inlier_ratio: f64) -> usize {
        let max = self.config.max_iterations;
        if inlier_ratio >= 1.0 {
            return 1;
        }
        let p_good = inlier_ratio.powi(SAMPLE_SIZE as i32);
        if p_good <= f64::EPSILON {
            return max;
        }
        let needed = (1.0 - self.config.confidence).ln() / (1.0 - p_good).ln();
        if needed.is_finite() && needed > 0.0 {
            (needed.ceil() as usize).min(max)
        } else {
            max
        }
    }

    fn draw_sample(&self, rng: &mut StdRng, src: &[Point], dst: &[Point]) -> Option<[usize; SAMPLE_SIZE]> {
        for _ in 0..MAX_SAMPLE_RETRIES {
            let picked = index::sample(rng, src.len(), SAMPLE_SIZE);
            let idx = [picked.index(0), picked.index(1), picked.index(2), picked.index(3)];
            let s = idx.map(|i| src[i]);
            let d = idx.map(|i| dst[i]);
            if !is_degenerate_sample(&s) && !is_degenerate_sample(&d) {
                return Some(idx);
            }
        }
        None
    }
}

impl Default for RansacSolver {
    fn default() -> Self {
        Self::new(RansacConfig::default())
    }
}

/// Inlier mask and count of `h` over all correspondences
fn consensus(h: &Matrix3<f64>, src: &[Point], dst: &[Point], threshold: f64) -> (Vec<bool>, usize) {
    let mask: Vec<bool> = src
        .iter()
        .zip(dst)
        .map(|(s, d)| reprojection_error(h, s, d) <= threshold)
        .collect();
    let count = mask.iter().filter(|&&m| m).count();
    (mask, count)
}

fn select(points: &[Point], mask: &[bool]) -> Vec<Point> {
    points.iter().zip(mask).filter(|(_, &m)| m).map(|(p, _)| *p).collect()
}

impl HomographySolver for RansacSolver {
    fn fit_homography(&self, src: &[Point], dst: &[Point], threshold_px: f64) -> GeometryResult<HomographyFit> {
        if src.len() != dst.len() {
            return Err(GeometryError::LengthMismatch {
                src: src.len(),
                dst: dst.len(),
            });
        }
        let n = src.len();
        if n < SAMPLE_SIZE {
            return Err(GeometryError::TooFewPoints {
                needed: SAMPLE_SIZE,
                got: n,
            });
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut best: Option<(Matrix3<f64>, usize)> = None;
        let mut budget = self.config.max_iterations.max(1);
        let mut iteration = 0;

        while iteration < budget {
            iteration += 1;
            let Some(idx) = self.draw_sample(&mut rng, src, dst) else {
                break;
            };
            let h = match estimate_dlt(&idx.map(|i| src[i]), &idx.map(|i| dst[i])) {
                Ok(h) => h,
                Err(_) => continue,
            };
            let (_, count) = consensus(&h, src, dst, threshold_px);
            if best.map_or(true, |(_, c)| count > c) {
                trace!(iteration, count, "new best consensus");
                best = Some((h, count));
                budget = budget.min(self.required_iterations(count as f64 / n as f64)).max(iteration);
            }
        }

        let (mut h, mut count) = match best {
            Some((h, count)) if count > 0 => (h, count),
            Some(_) => return Err(GeometryError::NoInliers),
            None => return Err(GeometryError::Degenerate),
        };

        let (mask, _) = consensus(&h, src, dst, threshold_px);
        if count > SAMPLE_SIZE {
            if let Ok(refit) = estimate_dlt(&select(src, &mask), &select(dst, &mask)) {
                let (_, refit_count) = consensus(&refit, src, dst, threshold_px);
                if refit_count >= count {
                    h = refit;
                    count = refit_count;
                }
            }
        }

        let transform = Transform::from_matrix(h).ok_or(GeometryError::Numerical("homography has zero scale"))?;
        let (inliers, inlier_count) = consensus(transform.matrix(), src, dst, threshold_px);
        if inlier_count == 0 {
            return Err(GeometryError::NoInliers);
        }
        debug!(iterations = iteration, inliers = inlier_count, total = n, best = count, "ransac finished");
        Ok(HomographyFit {
            transform,
            inliers,
            inlier_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homography::project;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn grid(n: usize) -> Vec<Point> {
        (0..n).map(|i| [((i * 37) % 300) as f64, ((i * 91) % 200) as f64]).collect()
    }

    fn warp(h: &Matrix3<f64>, pts: &[Point]) -> Vec<Point> {
        pts.iter().map(|p| project(h, p).unwrap()).collect()
    }

    #[test]
    fn test_exact_data_gives_all_inliers() {
        let truth = Matrix3::new(0.9, -0.1, 20.0, 0.12, 1.05, -15.0, 0.0, 0.0, 1.0);
        let src = grid(40);
        let dst = warp(&truth, &src);
        let fit = RansacSolver::default().fit_homography(&src, &dst, 30.0).unwrap();
        assert_eq!(fit.inlier_count, 40);
        assert!(fit.inliers.iter().all(|&m| m));
        let m = fit.transform.matrix();
        assert_relative_eq!(m[(0, 2)], 20.0, epsilon = 1e-6);
        assert_relative_eq!(m[(1, 1)], 1.05, epsilon = 1e-8);
    }

    #[test]
    fn test_outliers_rejected() {
        let truth = Matrix3::new(1.0, 0.0, 50.0, 0.0, 1.0, -30.0, 0.0, 0.0, 1.0);
        let src = grid(60);
        let mut dst = warp(&truth, &src);
        for (i, p) in dst.iter_mut().enumerate().filter(|(i, _)| i % 4 == 0) {
            p[0] += 150.0 + i as f64;
            p[1] -= 120.0;
        }
        let fit = RansacSolver::default().fit_homography(&src, &dst, 30.0).unwrap();
        assert_eq!(fit.inlier_count, 45);
        for (i, &m) in fit.inliers.iter().enumerate() {
            assert_eq!(m, i % 4 != 0);
        }
        assert_relative_eq!(fit.transform.matrix()[(0, 2)], 50.0, epsilon = 1e-6);
        assert_eq!(fit.inlier_indices().count(), 45);
    }

    #[test]
    fn test_same_seed_same_result() {
        let src = grid(30);
        let dst: Vec<Point> = src.iter().map(|p| [p[1] * 0.7 + 3.0, p[0] * 1.3]).collect();
        let solver = RansacSolver::default();
        assert_eq!(solver.fit_homography(&src, &dst, 30.0).unwrap(), solver.fit_homography(&src, &dst, 30.0).unwrap());
    }

    #[test]
    fn test_too_few_points() {
        let pts = grid(3);
        assert!(matches!(
            RansacSolver::default().fit_homography(&pts, &pts, 30.0),
            Err(GeometryError::TooFewPoints { needed: 4, got: 3 })
        ));
    }

    #[test]
    fn test_collinear_points_are_degenerate() {
        let src: Vec<Point> = (0..10).map(|i| [i as f64 * 10.0, i as f64 * 5.0]).collect();
        assert!(matches!(
            RansacSolver::default().fit_homography(&src, &src, 30.0),
            Err(GeometryError::Degenerate)
        ));
    }

    #[test]
    fn test_required_iterations() {
        let solver = RansacSolver::default();
        assert_eq!(solver.required_iterations(1.0), 1);
        assert_eq!(solver.required_iterations(0.0), 2000);
        let half = solver.required_iterations(0.5);
        assert!(half > 50 && half < 100, "{half}");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_inliers_within_threshold(
            offsets in prop::collection::vec((-80.0f64..80.0, -80.0f64..80.0), 20),
            threshold in 1.0f64..40.0,
        ) {
            let src = grid(20);
            let dst: Vec<Point> = src.iter().zip(&offsets).map(|(p, o)| [p[0] + o.0, p[1] + o.1]).collect();
            if let Ok(fit) = RansacSolver::default().fit_homography(&src, &dst, threshold) {
                prop_assert_eq!(fit.inliers.len(), src.len());
                prop_assert_eq!(fit.inlier_count, fit.inliers.iter().filter(|&&m| m).count());
                for i in fit.inlier_indices() {
                    prop_assert!(reprojection_error(fit.transform.matrix(), &src[i], &dst[i]) <= threshold);
                }
            }
        }
    }
}
