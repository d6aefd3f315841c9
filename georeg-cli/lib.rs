//! Robust registration of a captured image against a base map, its
//! confidence label and the result file.

pub mod confidence;
pub mod debug;
pub mod error;
pub mod robust;
pub mod writer;

pub use confidence::{evaluate, evaluate_with};
pub use debug::{AttemptView, DebugSink, ImageDumper, NoDebug};
pub use error::{AttemptError, ImageRole, OutputParseError, RegisterResult, RegistrationError};
pub use robust::{AttemptReport, RobustLoop, RobustOutcome};
pub use writer::{format_output, parse_output, read_output, write_output};

use georeg_core::{AttemptConfig, FeatureSet, Image, RegistrationConfig, RegistrationResult};
use georeg_features::{detect_and_describe, Preprocessor};
use georeg_geometry::TransformEstimator;
use georeg_match::{BruteForceMatcher, DescriptorMatcher, MatchFilter, RotationEstimator, KNN_K};
use image::DynamicImage;
use std::path::Path;
use tracing::{info, warn};

/// Accepted registration with the reports of every attempt tried
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub result: RegistrationResult,
    pub reports: Vec<AttemptReport>,
    pub accepted: usize,
}

impl Registration {
    pub fn accepted_report(&self) -> Option<&AttemptReport> {
        self.reports.get(self.accepted)
    }
}

/// High-level registration pipeline driven by a [`RegistrationConfig`]
pub struct Registrar {
    config: RegistrationConfig,
    matcher: Box<dyn DescriptorMatcher>,
    filter: MatchFilter,
    rotation: RotationEstimator,
    estimator: TransformEstimator,
}

impl Registrar {
    /// Create a registrar after validating `config`
    pub fn new(config: RegistrationConfig) -> RegisterResult<Self> {
        config.validate()?;
        let filter = MatchFilter::new(config.filter.clone());
        let estimator = TransformEstimator::ransac(config.ransac.clone(), config.inlier_threshold_px);
        let rotation = RotationEstimator {
            min_correspondences: config.filter.min_legal_matches,
            ..RotationEstimator::default()
        };
        Ok(Self {
            config,
            matcher: Box::new(BruteForceMatcher::new()),
            filter,
            rotation,
            estimator,
        })
    }

    /// Swap the descriptor matcher
    pub fn with_matcher(mut self, matcher: Box<dyn DescriptorMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Swap the transform estimator
    pub fn with_estimator(mut self, estimator: TransformEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Run the robust loop over both images. Fails when no attempt reaches
    /// the required inlier count.
    pub fn register(
        &self,
        reference: &DynamicImage,
        matched: &DynamicImage,
        sink: &mut dyn DebugSink,
    ) -> RegisterResult<Registration> {
        let robust = RobustLoop::new(self.config.desired_inliers, self.config.required_inliers);
        let outcome = robust.run(&self.config.attempts, |i, attempt| {
            self.run_attempt(i, attempt, reference, matched, sink)
        });

        let best_inliers = outcome.best_inliers();
        let accepted = outcome.accepted.ok_or(RegistrationError::Registration {
            best_inliers,
            required: self.config.required_inliers,
        })?;
        let report = &outcome.reports[accepted];
        let transform = report.transform.ok_or(RegistrationError::Registration {
            best_inliers,
            required: self.config.required_inliers,
        })?;

        let confidence = evaluate_with(report.inliers, &transform, &self.config.confidence);
        info!(
            confidence = %confidence,
            inliers = report.inliers,
            detector = %report.detector,
            "computed transform"
        );
        sink.registered(reference, matched, &transform);

        Ok(Registration {
            result: RegistrationResult::new(transform, report.inliers, confidence),
            reports: outcome.reports,
            accepted,
        })
    }

    /// One pass of preprocessing, extraction, matching, filtering and
    /// estimation. Every failure becomes a zero-score report.
    pub fn run_attempt(
        &self,
        index: usize,
        attempt: &AttemptConfig,
        reference: &DynamicImage,
        matched: &DynamicImage,
        sink: &mut dyn DebugSink,
    ) -> AttemptReport {
        let report = AttemptReport::new(index, attempt);
        let preprocessor = Preprocessor::for_attempt(attempt);
        let (ref_img, match_img) = rayon::join(|| preprocessor.process(reference), || preprocessor.process(matched));

        let (ref_features, match_features) = rayon::join(
            || detect_and_describe(&ref_img, &attempt.detector),
            || detect_and_describe(&match_img, &attempt.detector),
        );
        let (ref_features, match_features) = match (ref_features, match_features) {
            (Ok(r), Ok(m)) => (r, m),
            (Err(e), _) | (_, Err(e)) => return report.fail(AttemptError::from(e)),
        };

        let mut stages = Stages::default();
        let report = self.match_and_estimate(report, &ref_features, &match_features, &mut stages);

        sink.attempt(&AttemptView {
            report: &report,
            reference_input: reference,
            matched_input: matched,
            reference: &ref_img,
            matched: &match_img,
            ref_keypoints: &ref_features.keypoints,
            match_keypoints: &match_features.keypoints,
            separated: &stages.separated,
            good: &stages.good,
            inliers: &stages.inliers,
        });
        report
    }

    fn match_and_estimate(
        &self,
        mut report: AttemptReport,
        reference: &FeatureSet,
        matched: &FeatureSet,
        stages: &mut Stages,
    ) -> AttemptReport {
        report.ref_keypoints = reference.len();
        report.match_keypoints = matched.len();
        info!(
            reference = reference.len(),
            matched = matched.len(),
            "detected keypoints"
        );
        if reference.is_empty() {
            return report.fail(AttemptError::NoFeatures(ImageRole::Reference));
        }
        if matched.is_empty() {
            return report.fail(AttemptError::NoFeatures(ImageRole::Match));
        }

        let knn = match self.matcher.knn_match(&reference.descriptors, &matched.descriptors, KNN_K) {
            Ok(knn) => knn,
            Err(e) => return report.fail(AttemptError::from(e)),
        };
        report.raw_matches = knn.len();
        info!(matches = knn.len(), "initial matching");

        let filtered = match self.filter.apply(&knn, reference.len(), matched.len()) {
            Ok(outcome) => outcome,
            Err(e) => return report.fail(AttemptError::from(e)),
        };
        report.separated = filtered.separated.len();
        report.unique = filtered.unique.len();
        report.good = filtered.good.len();

        let rotation = self
            .rotation
            .estimate(&reference.keypoints, &matched.keypoints, &filtered.separated);
        if let Err(e) = &rotation {
            warn!(error = %e, "failed to compute a rotation alignment between the images");
        }
        report.rotation = Some(rotation.map_err(|e| e.to_string()));

        stages.separated = filtered.separated;
        stages.good = filtered.good;

        match self.estimator.estimate(&reference.keypoints, &matched.keypoints, &stages.good) {
            Ok(estimate) => {
                report.inliers = estimate.inlier_count();
                report.transform = Some(estimate.transform);
                stages.inliers = estimate.inliers;
                report
            }
            Err(e) => report.fail(AttemptError::from(e)),
        }
    }

    /// Load both images, register them and write the result file. With
    /// `debug` set, diagnostic images go next to `output`.
    pub fn register_files(
        &self,
        reference_path: &Path,
        match_path: &Path,
        output: &Path,
        debug: bool,
    ) -> RegisterResult<Registration> {
        let reference = load(reference_path, ImageRole::Reference)?;
        let matched = load(match_path, ImageRole::Match)?;
        info!(
            reference = %reference_path.display(),
            matched = %match_path.display(),
            "images loaded"
        );

        let registration = if debug {
            self.register(&reference, &matched, &mut ImageDumper::beside(output))?
        } else {
            self.register(&reference, &matched, &mut NoDebug)?
        };
        write_output(output, &registration.result, debug)?;
        info!(path = %output.display(), "result written");
        Ok(registration)
    }
}

/// Correspondence sets kept for the debug sink
#[derive(Default)]
struct Stages {
    separated: Vec<georeg_core::Correspondence>,
    good: Vec<georeg_core::Correspondence>,
    inliers: Vec<georeg_core::Correspondence>,
}

fn load(path: &Path, which: ImageRole) -> RegisterResult<DynamicImage> {
    image::open(path).map_err(|source| RegistrationError::Load {
        which,
        path: path.to_path_buf(),
        source,
    })
}

/// Preprocess a single image the way `attempt` would
pub fn preprocess(image: &DynamicImage, attempt: &AttemptConfig) -> Image {
    Preprocessor::for_attempt(attempt).process(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use georeg_core::{Correspondence, DescriptorKind, DetectorVariant};
    use georeg_geometry::{GeometryResult, HomographyFit, HomographySolver, Point};

    #[test]
    fn test_invalid_config_rejected() {
        let config = RegistrationConfig {
            attempts: Vec::new(),
            ..RegistrationConfig::default()
        };
        assert!(matches!(Registrar::new(config), Err(RegistrationError::Config(_))));
    }

    #[test]
    fn test_empty_features_score_zero() {
        let registrar = Registrar::new(RegistrationConfig::default()).unwrap();
        let attempt = AttemptConfig::new(5, DetectorVariant::orb());
        let empty = FeatureSet::empty(DescriptorKind::Binary, 32);
        let report = registrar.match_and_estimate(AttemptReport::new(0, &attempt), &empty, &empty, &mut Stages::default());
        assert_eq!(report.score(), 0);
        assert!(report.failure.unwrap().contains("reference"));
    }

    /// Solver that always fails, to check the attempt boundary
    struct Refuses;

    impl HomographySolver for Refuses {
        fn fit_homography(&self, _src: &[Point], _dst: &[Point], _t: f64) -> GeometryResult<HomographyFit> {
            Err(georeg_geometry::GeometryError::Degenerate)
        }
    }

    #[test]
    fn test_geometry_failure_scores_zero() {
        let registrar = Registrar::new(RegistrationConfig::default())
            .unwrap()
            .with_estimator(TransformEstimator::new(Box::new(Refuses), 30.0));
        let keypoints: Vec<_> = (0..8).map(|i| georeg_core::Keypoint::new(i as f32 * 10.0, (i * i) as f32)).collect();
        let rows: Vec<[u8; 1]> = (0..8).map(|i| [1u8 << i]).collect();
        let set = FeatureSet::new(keypoints, georeg_core::DescriptorSet::from_binary_rows(1, &rows));
        let mut stages = Stages::default();
        let attempt = AttemptConfig::new(1, DetectorVariant::orb());
        let report = registrar.match_and_estimate(AttemptReport::new(0, &attempt), &set, &set, &mut stages);
        assert_eq!(report.good, 8);
        assert_eq!(report.score(), 0);
        assert!(report.failure.is_some());
        assert!(report.rotation.is_some());
        assert!(stages.inliers.is_empty());
        assert_eq!(stages.good[0], Correspondence::new(0, 0, 0.0));
    }
}
