use georeg_core::DescriptorKind;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("cannot match {query:?} descriptors against {train:?} descriptors")]
    KindMismatch {
        query: DescriptorKind,
        train: DescriptorKind,
    },

    #[error("descriptor width mismatch: query {query}, train {train}")]
    WidthMismatch { query: usize, train: usize },

    #[error("k must be at least 1")]
    InvalidK,
}

pub type MatchResult<T> = Result<T, MatchError>;

/// Filter stage after which a count check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    Separation,
    Distance,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterStage::Separation => f.write_str("separation ratio"),
            FilterStage::Distance => f.write_str("distance threshold"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("{remaining} matches left after {stage} stage, need {required}")]
    TooFewMatches {
        stage: FilterStage,
        remaining: usize,
        required: usize,
    },
}

pub type FilterResult<T> = Result<T, FilterError>;

#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("rotation needs at least {required} correspondences, got {found}")]
    TooFewCorrespondences { found: usize, required: usize },

    #[error("no dominant rotation (concentration {concentration:.3})")]
    NoDominantDirection { concentration: f64 },
}
