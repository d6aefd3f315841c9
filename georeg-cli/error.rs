use georeg_features::FeatureError;
use georeg_geometry::GeometryError;
use georeg_match::{FilterError, MatchError};
use std::fmt;
use std::path::PathBuf;

/// Which of the two inputs an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Reference,
    Match,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::Reference => f.write_str("reference"),
            ImageRole::Match => f.write_str("match"),
        }
    }
}

/// Reasons a single attempt scores zero inliers
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("feature extraction failed: {0}")]
    Features(#[from] FeatureError),

    #[error("no features found in the {0} image")]
    NoFeatures(ImageRole),

    #[error("matching failed: {0}")]
    Match(#[from] MatchError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("transform estimation failed: {0}")]
    Geometry(#[from] GeometryError),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("failed to load {which} image {}: {source}", path.display())]
    Load {
        which: ImageRole,
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] georeg_core::ConfigError),

    #[error("registration failed: best attempt had {best_inliers} inliers, need {required}")]
    Registration { best_inliers: usize, required: usize },

    #[error("failed to write output: {0}")]
    Write(#[from] std::io::Error),
}

pub type RegisterResult<T> = Result<T, RegistrationError>;

/// Problems reading back a result file
#[derive(Debug, thiserror::Error)]
pub enum OutputParseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing line {0}")]
    MissingLine(usize),

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error(transparent)]
    Label(#[from] georeg_core::ConfigError),
}
