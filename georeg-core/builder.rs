use crate::config::{AttemptConfig, DistanceThreshold, RegistrationConfig};
use crate::error::ConfigResult;
use crate::variant::DetectorVariant;

/// Fluent API builder for registration configuration
#[derive(Debug, Clone)]
pub struct RegistrationConfigBuilder {
    config: RegistrationConfig,
}

impl Default for RegistrationConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationConfigBuilder {
    /// Create a new builder with the production settings
    pub fn new() -> Self {
        Self {
            config: RegistrationConfig::default(),
        }
    }

    /// Create builder from existing configuration
    pub fn from_config(config: RegistrationConfig) -> Self {
        Self { config }
    }

    /// Replace the attempt list with a single attempt
    pub fn attempt(mut self, kernel_size: usize, detector: DetectorVariant) -> Self {
        self.config.attempts = vec![AttemptConfig::new(kernel_size, detector)];
        self
    }

    /// Append a fallback attempt tried after the existing ones
    pub fn then_attempt(mut self, kernel_size: usize, detector: DetectorVariant) -> Self {
        self.config.attempts.push(AttemptConfig::new(kernel_size, detector));
        self
    }

    /// Set the best/second-best separation ratio
    pub fn separation_ratio(mut self, ratio: f32) -> Self {
        self.config.filter.separation_ratio = ratio;
        self
    }

    /// Set the collision count at which a match is dropped
    pub fn duplicate_cutoff(mut self, cutoff: usize) -> Self {
        self.config.filter.duplicate_cutoff = cutoff;
        self
    }

    /// Set the last filter stage's upper bound
    pub fn distance_threshold(mut self, threshold: DistanceThreshold) -> Self {
        self.config.filter.distance_threshold = threshold;
        self
    }

    /// Set the inlier reprojection tolerance in pixels
    pub fn inlier_threshold_px(mut self, px: f64) -> Self {
        self.config.inlier_threshold_px = px;
        self
    }

    /// Set the desired and required inlier counts of the robust loop
    pub fn inlier_targets(mut self, desired: usize, required: usize) -> Self {
        self.config.desired_inliers = desired;
        self.config.required_inliers = required;
        self
    }

    /// Set RANSAC iteration cap and seed
    pub fn ransac(mut self, max_iterations: usize, seed: u64) -> Self {
        self.config.ransac.max_iterations = max_iterations;
        self.config.ransac.seed = seed;
        self
    }

    /// Set number of threads for parallel processing
    pub fn threads(mut self, n_threads: usize) -> Self {
        self.config.n_threads = n_threads;
        self
    }

    /// Apply the fallback preset (every detector in turn)
    pub fn preset_fallback(mut self) -> Self {
        self.config.attempts = RegistrationConfig::fallback_preset().attempts;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> ConfigResult<RegistrationConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Generate summary of current configuration
    pub fn summary(&self) -> String {
        self.config.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let cfg = RegistrationConfigBuilder::new()
            .attempt(3, DetectorVariant::orb())
            .then_attempt(1, DetectorVariant::sift())
            .separation_ratio(0.7)
            .inlier_targets(40, 15)
            .threads(2)
            .build()
            .unwrap();

        assert_eq!(cfg.attempts.len(), 2);
        assert_eq!(cfg.attempts[1].detector.name(), "SIFT");
        assert_eq!(cfg.filter.separation_ratio, 0.7);
        assert_eq!(cfg.desired_inliers, 40);
        assert_eq!(cfg.n_threads, 2);
    }

    #[test]
    fn test_builder_rejects_invalid() {
        let result = RegistrationConfigBuilder::new().inlier_targets(5, 10).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_round_trip_through_builder() {
        let preset = RegistrationConfig::fallback_preset();
        let rebuilt = preset.clone().to_builder().build().unwrap();
        assert_eq!(rebuilt, preset);
    }
}
