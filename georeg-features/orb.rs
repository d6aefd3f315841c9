use crate::brief::{BriefPattern, BRIEF_BYTES};
use crate::error::FeatureResult;
use crate::fast;
use crate::pyramid::ImagePyramid;
use crate::FeatureExtractor;
use georeg_core::{DescriptorKind, DescriptorSet, FeatureSet, Image, Keypoint, OrbParams};
use imageproc::filter::gaussian_blur_f32;
use rayon::prelude::*;
use tracing::debug;

const HARRIS_BLOCK: u32 = 7;
const DESCRIPTOR_BLUR_SIGMA: f32 = 2.0;

/// Oriented FAST corners ranked by Harris response, described by steered BRIEF
pub struct OrbExtractor {
    params: OrbParams,
    pattern: BriefPattern,
}

impl OrbExtractor {
    pub fn new(params: OrbParams) -> Self {
        let pattern = BriefPattern::new(params.patch_size);
        Self { params, pattern }
    }

    /// Feature budget of each pyramid level; finer levels get more
    fn level_budgets(&self, n_levels: usize) -> Vec<usize> {
        let factor = 1.0 / self.params.scale_factor as f64;
        let total = self.params.n_features;
        let first = total as f64 * (1.0 - factor) / (1.0 - factor.powi(n_levels as i32));

        let mut budgets = Vec::with_capacity(n_levels);
        let mut assigned = 0usize;
        let mut desired = first;
        for _ in 0..n_levels.saturating_sub(1) {
            let n = (desired.round() as usize).min(total - assigned);
            budgets.push(n);
            assigned += n;
            desired *= factor;
        }
        if n_levels > 0 {
            budgets.push(total - assigned);
        }
        budgets
    }
}

impl FeatureExtractor for OrbExtractor {
    fn name(&self) -> &'static str {
        "ORB"
    }

    fn descriptor_kind(&self) -> DescriptorKind {
        DescriptorKind::Binary
    }

    fn descriptor_width(&self) -> usize {
        BRIEF_BYTES
    }

    fn detect_and_describe(&self, image: &Image) -> FeatureResult<FeatureSet> {
        let p = &self.params;
        let border = p.edge_threshold.max(p.patch_size / 2 + 1) as u32;
        let levels = ImagePyramid::geometric_levels(
            image.width(),
            image.height(),
            p.scale_factor,
            p.n_levels,
            2 * border + 1,
        );
        if levels.is_empty() {
            return Ok(FeatureSet::empty(DescriptorKind::Binary, BRIEF_BYTES));
        }

        let pyramid = ImagePyramid::build(image, &levels);
        let budgets = self.level_budgets(levels.len());
        let radius = (p.patch_size / 2) as i32;

        let per_level: Vec<(Vec<Keypoint>, Vec<[u8; BRIEF_BYTES]>)> = levels
            .par_iter()
            .zip(pyramid.par_iter())
            .zip(budgets.par_iter())
            .map(|((level, layer), &budget)| {
                let mut ranked: Vec<(fast::Corner, f32)> = fast::detect(layer, p.fast_threshold, border)
                    .into_iter()
                    .map(|c| (c, fast::harris_response(layer, c.x, c.y, HARRIS_BLOCK)))
                    .collect();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
                ranked.truncate(budget);

                let smoothed = gaussian_blur_f32(layer, DESCRIPTOR_BLUR_SIGMA);
                let mut keypoints = Vec::with_capacity(ranked.len());
                let mut descriptors = Vec::with_capacity(ranked.len());
                for (corner, harris) in ranked {
                    let angle = fast::intensity_centroid_angle(layer, corner.x, corner.y, radius);
                    let (lx, ly) = (corner.x as f32, corner.y as f32);
                    descriptors.push(self.pattern.describe(&smoothed, lx, ly, angle));

                    let (x, y) = level.to_base(lx, ly);
                    keypoints.push(
                        Keypoint::new(x, y)
                            .with_size(p.patch_size as f32 * level.scale)
                            .with_angle(angle)
                            .with_response(harris)
                            .with_octave(level.level as u32),
                    );
                }
                debug!(level = level.level, keypoints = keypoints.len(), "ORB level");
                (keypoints, descriptors)
            })
            .collect();

        let mut keypoints = Vec::new();
        let mut rows = Vec::new();
        for (kps, descs) in per_level {
            keypoints.extend(kps);
            rows.extend(descs);
        }
        Ok(FeatureSet::new(keypoints, DescriptorSet::from_binary_rows(BRIEF_BYTES, &rows)))
    }
}
