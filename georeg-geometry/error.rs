#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("too few points: need {needed}, got {got}")]
    TooFewPoints { needed: usize, got: usize },

    #[error("source and destination point counts differ: {src} vs {dst}")]
    LengthMismatch { src: usize, dst: usize },

    #[error("degenerate point configuration")]
    Degenerate,

    #[error("numerical failure: {0}")]
    Numerical(&'static str),

    #[error("no transform explains any correspondence")]
    NoInliers,
}

pub type GeometryResult<T> = Result<T, GeometryError>;
