//! Descriptor matching and correspondence filtering between a base map and
//! a match image.

pub mod error;
pub mod filter;
pub mod matcher;
pub mod rotation;

pub use error::{FilterError, FilterResult, FilterStage, MatchError, MatchResult, RotationError};
pub use filter::{FilterOutcome, MatchFilter};
pub use matcher::{BruteForceMatcher, DescriptorMatcher, KnnMatches};
pub use rotation::{RotationEstimate, RotationEstimator};

/// Neighbours requested per query descriptor
pub const KNN_K: usize = 2;
