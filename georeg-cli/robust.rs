use georeg_core::{AttemptConfig, Transform};
use georeg_match::RotationEstimate;
use tracing::{info, warn};

/// What one (kernel size, detector) attempt produced at each stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptReport {
    pub index: usize,
    pub kernel_size: usize,
    pub detector: String,
    pub ref_keypoints: usize,
    pub match_keypoints: usize,
    pub raw_matches: usize,
    pub separated: usize,
    pub unique: usize,
    pub good: usize,
    pub inliers: usize,
    /// `None` when the filter stopped the attempt first, otherwise the
    /// estimate or why there is none
    pub rotation: Option<Result<RotationEstimate, String>>,
    pub transform: Option<Transform>,
    /// Why the attempt scored zero
    pub failure: Option<String>,
}

impl AttemptReport {
    pub fn new(index: usize, attempt: &AttemptConfig) -> Self {
        Self {
            index,
            kernel_size: attempt.kernel_size,
            detector: attempt.detector.name().to_string(),
            ..Self::default()
        }
    }

    /// Zero the score and record why
    pub fn fail(mut self, reason: impl ToString) -> Self {
        self.inliers = 0;
        self.transform = None;
        self.failure = Some(reason.to_string());
        self
    }

    /// Inliers that count towards acceptance; an attempt without a
    /// transform scores zero
    pub fn score(&self) -> usize {
        if self.transform.is_some() {
            self.inliers
        } else {
            0
        }
    }
}

/// Reports of every attempt tried and which one, if any, was accepted
#[derive(Debug, Clone, PartialEq)]
pub struct RobustOutcome {
    pub reports: Vec<AttemptReport>,
    pub accepted: Option<usize>,
}

impl RobustOutcome {
    pub fn accepted_report(&self) -> Option<&AttemptReport> {
        self.accepted.and_then(|i| self.reports.get(i))
    }

    pub fn best_inliers(&self) -> usize {
        self.reports.iter().map(AttemptReport::score).max().unwrap_or(0)
    }
}

/// Tries attempts in order. The first one reaching `desired` inliers wins
/// outright; otherwise the best one wins if it reaches `required`.
#[derive(Debug, Clone, Copy)]
pub struct RobustLoop {
    pub desired: usize,
    pub required: usize,
}

impl RobustLoop {
    pub fn new(desired: usize, required: usize) -> Self {
        Self { desired, required }
    }

    pub fn run<F>(&self, attempts: &[AttemptConfig], mut run_attempt: F) -> RobustOutcome
    where
        F: FnMut(usize, &AttemptConfig) -> AttemptReport,
    {
        let mut reports = Vec::with_capacity(attempts.len());
        let mut best: Option<usize> = None;

        for (i, attempt) in attempts.iter().enumerate() {
            info!(
                kernel_size = attempt.kernel_size,
                detector = %attempt.detector,
                "attempting transform"
            );
            let report = run_attempt(i, attempt);
            if let Some(reason) = &report.failure {
                warn!(detector = %attempt.detector, reason = %reason, "attempt scored zero");
            }
            let score = report.score();
            reports.push(report);

            if score >= self.desired {
                return RobustOutcome {
                    reports,
                    accepted: Some(i),
                };
            }
            if best.map_or(score > 0, |b| score > reports[b].score()) {
                best = Some(i);
            }
        }

        let accepted = best.filter(|&b| reports[b].score() >= self.required);
        RobustOutcome { reports, accepted }
    }
}
