//! Robust homography estimation from filtered correspondences.

pub mod error;
pub mod estimator;
pub mod homography;
pub mod ransac;

pub use error::{GeometryError, GeometryResult};
pub use estimator::{TransformEstimate, TransformEstimator};
pub use homography::{estimate_dlt, project, reprojection_error, Point};
pub use ransac::{HomographyFit, HomographySolver, RansacSolver};
