//! Preprocessing and the four keypoint detector/extractor variants.

pub mod akaze;
pub mod brief;
pub mod brisk;
pub mod descriptor;
pub mod error;
pub mod fast;
pub mod orb;
pub mod plane;
pub mod preprocessing;
pub mod pyramid;
pub mod sift;

pub use akaze::AkazeExtractor;
pub use brisk::BriskExtractor;
pub use descriptor::root_transform;
pub use error::{FeatureError, FeatureResult};
pub use orb::OrbExtractor;
pub use preprocessing::{stretch_contrast, Preprocessor};
pub use sift::SiftExtractor;

use georeg_core::{DescriptorKind, DetectorVariant, FeatureSet, Image};
use tracing::debug;

/// Keypoint detection plus description for one image
pub trait FeatureExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn descriptor_kind(&self) -> DescriptorKind;

    /// Row width of the produced descriptor set
    fn descriptor_width(&self) -> usize;

    /// Keypoints in full-resolution coordinates with one descriptor each.
    /// An image without usable structure yields an empty set.
    fn detect_and_describe(&self, image: &Image) -> FeatureResult<FeatureSet>;
}

/// Concrete extractor for a detector variant
pub fn extractor_for(variant: &DetectorVariant) -> Box<dyn FeatureExtractor> {
    match variant {
        DetectorVariant::Brisk(p) => Box::new(BriskExtractor::new(p.clone())),
        DetectorVariant::Orb(p) => Box::new(OrbExtractor::new(p.clone())),
        DetectorVariant::Sift(p) => Box::new(SiftExtractor::new(p.clone())),
        DetectorVariant::Akaze(p) => Box::new(AkazeExtractor::new(p.clone())),
    }
}

/// Run the variant's extractor, applying the root transform where the
/// variant requires it
pub fn detect_and_describe(image: &Image, variant: &DetectorVariant) -> FeatureResult<FeatureSet> {
    if image.width() == 0 || image.height() == 0 {
        return Err(FeatureError::InvalidImageSize {
            width: image.width(),
            height: image.height(),
        });
    }
    variant.validate()?;

    let extractor = extractor_for(variant);
    let mut features = extractor.detect_and_describe(image)?;
    if features.keypoints.len() != features.descriptors.len() {
        return Err(FeatureError::CountMismatch {
            keypoints: features.keypoints.len(),
            descriptors: features.descriptors.len(),
        });
    }
    if variant.requires_root_transform() {
        features.descriptors = root_transform(features.descriptors);
    }

    debug!(
        variant = extractor.name(),
        keypoints = features.len(),
        width = image.width(),
        height = image.height(),
        "features extracted"
    );
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use georeg_core::Metric;

    #[test]
    fn test_extractor_matches_variant() {
        for variant in [
            DetectorVariant::brisk(),
            DetectorVariant::orb(),
            DetectorVariant::sift(),
            DetectorVariant::akaze(),
        ] {
            let extractor = extractor_for(&variant);
            assert_eq!(extractor.name(), variant.name());
            assert_eq!(extractor.descriptor_kind(), variant.descriptor_kind());
        }
    }

    #[test]
    fn test_empty_image_is_an_error() {
        let result = detect_and_describe(&Image::new(0, 0), &DetectorVariant::orb());
        assert!(matches!(result, Err(FeatureError::InvalidImageSize { .. })));
    }

    #[test]
    fn test_flat_image_has_no_features() {
        let img = Image::from_pixel(120, 100, image::Luma([90]));
        for variant in [DetectorVariant::orb(), DetectorVariant::sift(), DetectorVariant::akaze()] {
            let features = detect_and_describe(&img, &variant).unwrap();
            assert!(features.is_empty(), "{} found features on a flat image", variant);
            assert_eq!(features.descriptors.metric() == Metric::L2, variant.requires_root_transform());
        }
    }
}
