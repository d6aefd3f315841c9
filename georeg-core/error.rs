#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no registration attempts configured")]
    NoAttempts,

    #[error("invalid kernel size {0} (must be odd or <= 1)")]
    InvalidKernelSize(usize),

    #[error("invalid separation ratio {0} (must be in (0, 1])")]
    InvalidSeparationRatio(f32),

    #[error("invalid {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("desired inliers ({desired}) below required inliers ({required})")]
    InlierOrdering { desired: usize, required: usize },

    #[error("unknown confidence label: {0}")]
    UnknownConfidence(String),

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "serde")]
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[cfg(feature = "serde")]
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
