//! Shared data model and configuration for registering a captured image
//! against a reference base map.

pub mod builder;
pub mod config;
pub mod error;
pub mod types;
pub mod variant;

pub use builder::RegistrationConfigBuilder;
pub use config::{
    AttemptConfig, ConfidenceThresholds, DistanceThreshold, FilterConfig, RansacConfig,
    RegistrationConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use types::{
    Confidence, Correspondence, DescriptorKind, DescriptorSet, FeatureSet, Image, Keypoint,
    Metric, RegistrationResult, Transform,
};
pub use variant::{AkazeParams, BriskParams, DetectorVariant, OrbParams, SiftParams};

/// Initialize Rayon thread pool with the specified number of threads
pub fn init_thread_pool(n_threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
}
