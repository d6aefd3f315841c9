#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("invalid image dimensions: {width}x{height} (must be > 0)")]
    InvalidImageSize { width: u32, height: u32 },

    #[error("invalid detector parameters: {0}")]
    InvalidParams(#[from] georeg_core::ConfigError),

    #[error("descriptor count {descriptors} does not match keypoint count {keypoints}")]
    CountMismatch { keypoints: usize, descriptors: usize },
}

pub type FeatureResult<T> = Result<T, FeatureError>;
