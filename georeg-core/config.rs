use crate::error::{ConfigError, ConfigResult};
use crate::variant::DetectorVariant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One entry of the robust loop: preprocessing kernel plus detector
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttemptConfig {
    /// Kernel size the attempt is labelled with
    pub kernel_size: usize,
    /// Box filter the image with `kernel_size` before the contrast stretch
    #[cfg_attr(feature = "serde", serde(default))]
    pub smooth: bool,
    pub detector: DetectorVariant,
}

impl AttemptConfig {
    /// Gray conversion and contrast stretch only
    pub fn new(kernel_size: usize, detector: DetectorVariant) -> Self {
        Self {
            kernel_size,
            smooth: false,
            detector,
        }
    }

    /// Same, with box smoothing switched on
    pub fn smoothed(kernel_size: usize, detector: DetectorVariant) -> Self {
        Self {
            smooth: true,
            ..Self::new(kernel_size, detector)
        }
    }
}

/// Upper bound applied by the last match filter stage
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(tag = "mode", content = "value", rename_all = "snake_case")
)]
pub enum DistanceThreshold {
    /// Largest distance among the surviving matches; keeps everything
    MaxObserved,
    /// Halfway between the smallest and largest surviving distance
    Midpoint,
    /// Fixed cut-off in descriptor distance units
    Absolute(f32),
}

impl Default for DistanceThreshold {
    fn default() -> Self {
        DistanceThreshold::MaxObserved
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct FilterConfig {
    /// Min separation between top two matches
    pub separation_ratio: f32,
    /// A match colliding with this many others is dropped
    pub duplicate_cutoff: usize,
    /// Fewest matches the geometric fit can work with
    pub min_legal_matches: usize,
    pub distance_threshold: DistanceThreshold,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            separation_ratio: 0.8,
            duplicate_cutoff: 2,
            min_legal_matches: 3,
            distance_threshold: DistanceThreshold::MaxObserved,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct RansacConfig {
    pub max_iterations: usize,
    /// Probability of drawing at least one outlier-free sample
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            confidence: 0.995,
            seed: 0,
        }
    }
}

/// Inlier-count cut points for the confidence label
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ConfidenceThresholds {
    /// Fewer inliers than this is NONE
    pub none_below: usize,
    /// More inliers than this is HIGH
    pub high_above: usize,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            none_below: 5,
            high_above: 25,
        }
    }
}

/// Complete registration configuration with all settings
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct RegistrationConfig {
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    /// Max reprojection error of an inlier, in pixels
    pub inlier_threshold_px: f64,
    /// An attempt with this many inliers is accepted immediately
    pub desired_inliers: usize,
    /// The best attempt must reach this many inliers to be accepted
    pub required_inliers: usize,
    pub n_threads: usize,
    /// Tried in order by the robust loop
    pub attempts: Vec<AttemptConfig>,
    pub filter: FilterConfig,
    pub ransac: RansacConfig,
    pub confidence: ConfidenceThresholds,
}

impl Default for RegistrationConfig {
    /// Production setup: a single AKAZE attempt with a 5 pixel kernel
    fn default() -> Self {
        Self {
            name: None,
            inlier_threshold_px: 30.0,
            desired_inliers: 20,
            required_inliers: 10,
            n_threads: num_cpus::get().max(1),
            attempts: vec![AttemptConfig::new(5, DetectorVariant::akaze())],
            filter: FilterConfig::default(),
            ransac: RansacConfig::default(),
            confidence: ConfidenceThresholds::default(),
        }
    }
}

impl RegistrationConfig {
    /// Every detector in turn, strongest first
    pub fn fallback_preset() -> Self {
        Self {
            attempts: vec![
                AttemptConfig::new(5, DetectorVariant::akaze()),
                AttemptConfig::new(5, DetectorVariant::sift()),
                AttemptConfig::new(5, DetectorVariant::orb()),
                AttemptConfig::new(5, DetectorVariant::brisk()),
            ],
            name: Some("Fallback".to_string()),
            ..Self::default()
        }
    }

    /// Convert to a builder for further customization
    pub fn to_builder(self) -> crate::builder::RegistrationConfigBuilder {
        crate::builder::RegistrationConfigBuilder::from_config(self)
    }

    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        let attempts: Vec<String> = self
            .attempts
            .iter()
            .map(|a| {
                let smooth = if a.smooth { "+box" } else { "" };
                format!("{}@k{}{}", a.detector, a.kernel_size, smooth)
            })
            .collect();
        format!(
            "RegistrationConfig: attempts=[{}], ratio={}, dup_cutoff={}, inlier_px={}, desired={}, required={}",
            attempts.join(", "),
            self.filter.separation_ratio,
            self.filter.duplicate_cutoff,
            self.inlier_threshold_px,
            self.desired_inliers,
            self.required_inliers
        )
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> ConfigResult<()> {
        if self.attempts.is_empty() {
            return Err(ConfigError::NoAttempts);
        }
        for attempt in &self.attempts {
            if attempt.kernel_size > 1 && attempt.kernel_size % 2 == 0 {
                return Err(ConfigError::InvalidKernelSize(attempt.kernel_size));
            }
            attempt.detector.validate()?;
        }

        let ratio = self.filter.separation_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::InvalidSeparationRatio(ratio));
        }
        if self.filter.duplicate_cutoff == 0 {
            return Err(ConfigError::InvalidValue {
                name: "filter.duplicate_cutoff",
                value: self.filter.duplicate_cutoff.to_string(),
            });
        }
        if let DistanceThreshold::Absolute(v) = self.filter.distance_threshold {
            if !(v >= 0.0 && v.is_finite()) {
                return Err(ConfigError::InvalidValue {
                    name: "filter.distance_threshold",
                    value: v.to_string(),
                });
            }
        }
        if !(self.inlier_threshold_px > 0.0 && self.inlier_threshold_px.is_finite()) {
            return Err(ConfigError::InvalidValue {
                name: "inlier_threshold_px",
                value: self.inlier_threshold_px.to_string(),
            });
        }
        if !(self.ransac.confidence > 0.0 && self.ransac.confidence < 1.0) {
            return Err(ConfigError::InvalidValue {
                name: "ransac.confidence",
                value: self.ransac.confidence.to_string(),
            });
        }
        if self.ransac.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                name: "ransac.max_iterations",
                value: "0".to_string(),
            });
        }
        if self.desired_inliers < self.required_inliers {
            return Err(ConfigError::InlierOrdering {
                desired: self.desired_inliers,
                required: self.required_inliers,
            });
        }
        if self.confidence.none_below > self.confidence.high_above {
            return Err(ConfigError::InvalidValue {
                name: "confidence",
                value: format!("{}..{}", self.confidence.none_below, self.confidence.high_above),
            });
        }
        if self.n_threads == 0 {
            return Err(ConfigError::InvalidValue {
                name: "n_threads",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Load JSON or TOML depending on the file extension (`.json` is JSON,
    /// anything else is read as TOML)
    #[cfg(feature = "serde")]
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> ConfigResult<Self> {
        let is_json = path
            .as_ref()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::load_json(path)
        } else {
            Self::load_toml(path)
        }
    }

    /// Save configuration to JSON file
    #[cfg(feature = "serde")]
    pub fn save_json<P: AsRef<std::path::Path>>(&self, path: P) -> ConfigResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load configuration from JSON file
    #[cfg(feature = "serde")]
    pub fn load_json<P: AsRef<std::path::Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Save configuration to TOML file
    #[cfg(feature = "serde")]
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> ConfigResult<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Load configuration from TOML file
    #[cfg(feature = "serde")]
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "serde")]
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_defaults() {
        let cfg = RegistrationConfig::default();
        assert_eq!(cfg.attempts.len(), 1);
        assert_eq!(cfg.attempts[0].kernel_size, 5);
        assert!(!cfg.attempts[0].smooth);
        assert_eq!(cfg.attempts[0].detector.name(), "AKAZE");
        assert_eq!(cfg.filter.separation_ratio, 0.8);
        assert_eq!(cfg.filter.duplicate_cutoff, 2);
        assert_eq!(cfg.filter.min_legal_matches, 3);
        assert_eq!(cfg.inlier_threshold_px, 30.0);
        assert_eq!(cfg.desired_inliers, 20);
        assert_eq!(cfg.required_inliers, 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_fallback_preset_covers_every_variant() {
        let cfg = RegistrationConfig::fallback_preset();
        let names: Vec<&str> = cfg.attempts.iter().map(|a| a.detector.name()).collect();
        assert_eq!(names, vec!["AKAZE", "SIFT", "ORB", "BRISK"]);
        assert!(cfg.attempts.iter().all(|a| !a.smooth));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut cfg = RegistrationConfig::default();
        cfg.attempts.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::NoAttempts)));

        let mut cfg = RegistrationConfig::default();
        cfg.attempts[0].kernel_size = 4;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidKernelSize(4))));

        let mut cfg = RegistrationConfig::default();
        cfg.filter.separation_ratio = 1.5;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidSeparationRatio(_))));

        let mut cfg = RegistrationConfig::default();
        cfg.required_inliers = 30;
        assert!(matches!(cfg.validate(), Err(ConfigError::InlierOrdering { .. })));
    }

    #[test]
    fn test_summary_mentions_attempts() {
        let summary = RegistrationConfig::fallback_preset().summary();
        assert!(summary.contains("AKAZE@k5"));
        assert!(summary.contains("BRISK@k5"));
        assert!(!summary.contains("+box"));

        let mut cfg = RegistrationConfig::default();
        cfg.attempts[0] = AttemptConfig::smoothed(3, DetectorVariant::orb());
        assert!(cfg.summary().contains("ORB@k3+box"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_toml_and_json_round_trip() {
        let mut cfg = RegistrationConfig::fallback_preset();
        cfg.filter.distance_threshold = DistanceThreshold::Absolute(42.0);

        let toml_str = cfg.to_toml().unwrap();
        assert_eq!(RegistrationConfig::from_toml(&toml_str).unwrap(), cfg);

        let json = cfg.to_json().unwrap();
        assert_eq!(RegistrationConfig::from_json(&json).unwrap(), cfg);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RegistrationConfig::default();

        let json_path = dir.path().join("config.json");
        cfg.save_json(&json_path).unwrap();
        assert_eq!(RegistrationConfig::load(&json_path).unwrap(), cfg);

        let toml_path = dir.path().join("config.toml");
        cfg.save_toml(&toml_path).unwrap();
        assert_eq!(RegistrationConfig::load(&toml_path).unwrap(), cfg);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg = RegistrationConfig::from_toml(
            r#"
desired_inliers = 30

[[attempts]]
kernel_size = 3

[attempts.detector]
kind = "orb"
n_features = 500
"#,
        )
        .unwrap();
        assert_eq!(cfg.desired_inliers, 30);
        assert_eq!(cfg.required_inliers, 10);
        assert!(!cfg.attempts[0].smooth);
        match &cfg.attempts[0].detector {
            DetectorVariant::Orb(p) => {
                assert_eq!(p.n_features, 500);
                assert_eq!(p.fast_threshold, 20);
            }
            other => panic!("unexpected variant {}", other),
        }
    }
}
