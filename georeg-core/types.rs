use crate::error::ConfigError;
use nalgebra::{Matrix3, Vector3};
use std::fmt;
use std::str::FromStr;

/// Row-major 8-bit grayscale image
pub type Image = image::GrayImage;

/// Detected salient point, always in full-resolution image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Diameter of the described neighbourhood, in pixels
    pub size: f32,
    /// Orientation in radians
    pub angle: f32,
    pub response: f32,
    pub octave: u32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            size: 1.0,
            angle: 0.0,
            response: 0.0,
            octave: 0,
        }
    }

    pub fn with_size(mut self, size: f32) -> Self {
        self.size = size;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_response(mut self, response: f32) -> Self {
        self.response = response;
        self
    }

    pub fn with_octave(mut self, octave: u32) -> Self {
        self.octave = octave;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Binary,
    Float,
}

/// Distance used to compare two descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Hamming,
    L2,
}

/// Descriptors stored contiguously, one row per keypoint.
///
/// `width` is the number of elements per row: bytes for binary descriptors,
/// floats for float descriptors.
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorSet {
    Binary { width: usize, data: Vec<u8> },
    Float { width: usize, data: Vec<f32> },
}

impl DescriptorSet {
    pub fn empty(kind: DescriptorKind, width: usize) -> Self {
        match kind {
            DescriptorKind::Binary => DescriptorSet::Binary { width, data: Vec::new() },
            DescriptorKind::Float => DescriptorSet::Float { width, data: Vec::new() },
        }
    }

    /// Pack binary rows; every row must hold exactly `width` bytes.
    pub fn from_binary_rows<R: AsRef<[u8]>>(width: usize, rows: &[R]) -> Self {
        let mut data = Vec::with_capacity(width * rows.len());
        for row in rows {
            let row = row.as_ref();
            debug_assert_eq!(row.len(), width);
            data.extend_from_slice(row);
        }
        DescriptorSet::Binary { width, data }
    }

    /// Pack float rows; every row must hold exactly `width` values.
    pub fn from_float_rows<R: AsRef<[f32]>>(width: usize, rows: &[R]) -> Self {
        let mut data = Vec::with_capacity(width * rows.len());
        for row in rows {
            let row = row.as_ref();
            debug_assert_eq!(row.len(), width);
            data.extend_from_slice(row);
        }
        DescriptorSet::Float { width, data }
    }

    pub fn kind(&self) -> DescriptorKind {
        match self {
            DescriptorSet::Binary { .. } => DescriptorKind::Binary,
            DescriptorSet::Float { .. } => DescriptorKind::Float,
        }
    }

    /// Hamming for binary descriptors, L2 for everything else
    pub fn metric(&self) -> Metric {
        match self.kind() {
            DescriptorKind::Binary => Metric::Hamming,
            DescriptorKind::Float => Metric::L2,
        }
    }

    pub fn width(&self) -> usize {
        match self {
            DescriptorSet::Binary { width, .. } | DescriptorSet::Float { width, .. } => *width,
        }
    }

    pub fn len(&self) -> usize {
        let width = self.width();
        if width == 0 {
            return 0;
        }
        match self {
            DescriptorSet::Binary { data, .. } => data.len() / width,
            DescriptorSet::Float { data, .. } => data.len() / width,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn binary_row(&self, index: usize) -> Option<&[u8]> {
        match self {
            DescriptorSet::Binary { width, data } => data.get(index * width..(index + 1) * width),
            DescriptorSet::Float { .. } => None,
        }
    }

    pub fn float_row(&self, index: usize) -> Option<&[f32]> {
        match self {
            DescriptorSet::Float { width, data } => data.get(index * width..(index + 1) * width),
            DescriptorSet::Binary { .. } => None,
        }
    }
}

/// Keypoints and their descriptors for one image
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: DescriptorSet,
}

impl FeatureSet {
    pub fn new(keypoints: Vec<Keypoint>, descriptors: DescriptorSet) -> Self {
        debug_assert_eq!(keypoints.len(), descriptors.len());
        Self { keypoints, descriptors }
    }

    pub fn empty(kind: DescriptorKind, width: usize) -> Self {
        Self {
            keypoints: Vec::new(),
            descriptors: DescriptorSet::empty(kind, width),
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// A candidate pairing between a query feature (base map side) and a train
/// feature (match image side).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

impl Correspondence {
    pub fn new(query_idx: usize, train_idx: usize, distance: f32) -> Self {
        Self {
            query_idx,
            train_idx,
            distance,
        }
    }
}

/// 3x3 planar homography mapping match-image pixels onto base-map pixels,
/// normalised so that the bottom-right element is 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    matrix: Matrix3<f64>,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// Normalise `matrix` by its bottom-right element. Returns `None` when that
    /// element vanishes or the matrix holds non-finite values.
    pub fn from_matrix(matrix: Matrix3<f64>) -> Option<Self> {
        let scale = matrix[(2, 2)];
        if !scale.is_finite() || scale.abs() < 1e-12 {
            return None;
        }
        let matrix = matrix / scale;
        if matrix.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Self { matrix })
    }

    pub fn from_rows(rows: [[f64; 3]; 3]) -> Option<Self> {
        #[rustfmt::skip]
        let matrix = Matrix3::new(
            rows[0][0], rows[0][1], rows[0][2],
            rows[1][0], rows[1][1], rows[1][2],
            rows[2][0], rows[2][1], rows[2][2],
        );
        Self::from_matrix(matrix)
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn rows(&self) -> [[f64; 3]; 3] {
        let m = &self.matrix;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    /// Map a match-image point into base-map coordinates. `None` for points on
    /// the line at infinity.
    pub fn apply(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let p = self.matrix * Vector3::new(x, y, 1.0);
        if p[2].abs() < 1e-12 {
            return None;
        }
        Some((p[0] / p[2], p[1] / p[2]))
    }

    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().and_then(Self::from_matrix)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Coarse trust bucket for a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Confidence {
    None,
    Low,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::None => "CONFIDENCE_NONE",
            Confidence::Low => "CONFIDENCE_LOW",
            Confidence::High => "CONFIDENCE_HIGH",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "CONFIDENCE_NONE" => Ok(Confidence::None),
            "CONFIDENCE_LOW" => Ok(Confidence::Low),
            "CONFIDENCE_HIGH" => Ok(Confidence::High),
            other => Err(ConfigError::UnknownConfidence(other.to_string())),
        }
    }
}

/// Terminal artifact of one registration run
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationResult {
    transform: Transform,
    inliers: usize,
    confidence: Confidence,
}

impl RegistrationResult {
    pub fn new(transform: Transform, inliers: usize, confidence: Confidence) -> Self {
        Self {
            transform,
            inliers,
            confidence,
        }
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn inliers(&self) -> usize {
        self.inliers
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }
}
