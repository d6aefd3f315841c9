use crate::error::{ConfigError, ConfigResult};
use crate::types::{DescriptorKind, Metric};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// BRISK: FAST corners over a half-octave pyramid, ring-pattern binary descriptor
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct BriskParams {
    pub threshold: u8,
    pub octaves: usize,
    pub pattern_scale: f32,
}

impl Default for BriskParams {
    fn default() -> Self {
        Self {
            threshold: 30,
            octaves: 3,
            pattern_scale: 1.0,
        }
    }
}

/// ORB: oriented FAST + steered BRIEF
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct OrbParams {
    pub n_features: usize,
    pub scale_factor: f32,
    pub n_levels: usize,
    pub edge_threshold: usize,
    pub fast_threshold: u8,
    pub patch_size: usize,
}

impl Default for OrbParams {
    fn default() -> Self {
        Self {
            n_features: 2000,
            scale_factor: 1.2,
            n_levels: 8,
            edge_threshold: 31,
            fast_threshold: 20,
            patch_size: 31,
        }
    }
}

/// SIFT: difference-of-Gaussians extrema, gradient histogram float descriptor
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct SiftParams {
    pub n_features: usize,
    /// Output seems very sensitive to this value
    pub n_octave_layers: usize,
    pub contrast_threshold: f32,
    pub edge_threshold: f32,
    pub sigma: f32,
}

impl Default for SiftParams {
    fn default() -> Self {
        Self {
            n_features: 2000,
            n_octave_layers: 6,
            contrast_threshold: 0.04,
            edge_threshold: 15.0,
            sigma: 1.2,
        }
    }
}

/// AKAZE: Hessian extrema in a nonlinear diffusion scale space, MLDB descriptor
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct AkazeParams {
    /// Number of descriptor bits to keep, 0 keeps all of them
    pub descriptor_size: usize,
    /// 1 = intensity, 2 = intensity + x derivative, 3 = intensity + both derivatives
    pub descriptor_channels: usize,
    /// Controls number of points found
    pub threshold: f32,
    pub n_octaves: usize,
    /// Sublevels per octave
    pub n_sublevels: usize,
}

impl Default for AkazeParams {
    fn default() -> Self {
        Self {
            descriptor_size: 0,
            descriptor_channels: 3,
            threshold: 0.003,
            n_octaves: 8,
            n_sublevels: 5,
        }
    }
}

/// The closed set of detector/extractor configurations
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(tag = "kind", rename_all = "lowercase")
)]
pub enum DetectorVariant {
    Brisk(BriskParams),
    Orb(OrbParams),
    Sift(SiftParams),
    Akaze(AkazeParams),
}

impl DetectorVariant {
    pub fn brisk() -> Self {
        DetectorVariant::Brisk(BriskParams::default())
    }

    pub fn orb() -> Self {
        DetectorVariant::Orb(OrbParams::default())
    }

    pub fn sift() -> Self {
        DetectorVariant::Sift(SiftParams::default())
    }

    pub fn akaze() -> Self {
        DetectorVariant::Akaze(AkazeParams::default())
    }

    pub fn name(&self) -> &'static str {
        match self {
            DetectorVariant::Brisk(_) => "BRISK",
            DetectorVariant::Orb(_) => "ORB",
            DetectorVariant::Sift(_) => "SIFT",
            DetectorVariant::Akaze(_) => "AKAZE",
        }
    }

    pub fn descriptor_kind(&self) -> DescriptorKind {
        match self {
            DetectorVariant::Sift(_) => DescriptorKind::Float,
            _ => DescriptorKind::Binary,
        }
    }

    /// Hamming distance is used for binary descriptors
    pub fn metric(&self) -> Metric {
        match self.descriptor_kind() {
            DescriptorKind::Binary => Metric::Hamming,
            DescriptorKind::Float => Metric::L2,
        }
    }

    /// Float descriptors are L1-normalised and square-rooted after extraction
    pub fn requires_root_transform(&self) -> bool {
        matches!(self, DetectorVariant::Sift(_))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |name: &'static str, value: String| Err(ConfigError::InvalidValue { name, value });
        match self {
            DetectorVariant::Brisk(p) => {
                if p.threshold == 0 {
                    return invalid("brisk.threshold", p.threshold.to_string());
                }
                if p.pattern_scale <= 0.0 || !p.pattern_scale.is_finite() {
                    return invalid("brisk.pattern_scale", p.pattern_scale.to_string());
                }
            }
            DetectorVariant::Orb(p) => {
                if p.n_features == 0 {
                    return invalid("orb.n_features", p.n_features.to_string());
                }
                if p.scale_factor <= 1.0 || !p.scale_factor.is_finite() {
                    return invalid("orb.scale_factor", p.scale_factor.to_string());
                }
                if p.n_levels == 0 {
                    return invalid("orb.n_levels", p.n_levels.to_string());
                }
                if p.patch_size < 3 || p.patch_size % 2 == 0 {
                    return invalid("orb.patch_size", p.patch_size.to_string());
                }
                if p.fast_threshold == 0 {
                    return invalid("orb.fast_threshold", p.fast_threshold.to_string());
                }
            }
            DetectorVariant::Sift(p) => {
                if p.n_octave_layers == 0 {
                    return invalid("sift.n_octave_layers", p.n_octave_layers.to_string());
                }
                if p.contrast_threshold <= 0.0 || !p.contrast_threshold.is_finite() {
                    return invalid("sift.contrast_threshold", p.contrast_threshold.to_string());
                }
                if p.edge_threshold <= 0.0 || !p.edge_threshold.is_finite() {
                    return invalid("sift.edge_threshold", p.edge_threshold.to_string());
                }
                if p.sigma <= 0.0 || !p.sigma.is_finite() {
                    return invalid("sift.sigma", p.sigma.to_string());
                }
            }
            DetectorVariant::Akaze(p) => {
                if !(1..=3).contains(&p.descriptor_channels) {
                    return invalid("akaze.descriptor_channels", p.descriptor_channels.to_string());
                }
                if p.threshold <= 0.0 || !p.threshold.is_finite() {
                    return invalid("akaze.threshold", p.threshold.to_string());
                }
                if p.n_octaves == 0 || p.n_sublevels == 0 {
                    return invalid(
                        "akaze.n_octaves/n_sublevels",
                        format!("{}/{}", p.n_octaves, p.n_sublevels),
                    );
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for DetectorVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
