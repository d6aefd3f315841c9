use georeg_core::Image;
use image::imageops::{self, FilterType};

/// Scale information for pyramid levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleLevel {
    pub level: usize,
    /// Full-resolution pixels per level pixel
    pub scale: f32,
    pub width: u32,
    pub height: u32,
}

impl ScaleLevel {
    /// Map level coordinates back to the full-resolution image
    #[inline]
    pub fn to_base(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale, y * self.scale)
    }
}

/// Image pyramid operations for multi-scale feature detection
pub struct ImagePyramid;

impl ImagePyramid {
    /// Geometric scale levels `scale_factor^i`, stopping at `n_levels` or
    /// when a level would be smaller than `min_size` on either side
    pub fn geometric_levels(
        width: u32,
        height: u32,
        scale_factor: f32,
        n_levels: usize,
        min_size: u32,
    ) -> Vec<ScaleLevel> {
        let scales = (0..n_levels).map(|i| scale_factor.powi(i as i32));
        Self::levels_for_scales(width, height, scales, min_size)
    }

    /// Octaves interleaved with intra-octaves: 1, 1.5, 2, 3, 4, 6, ...
    pub fn half_octave_levels(width: u32, height: u32, octaves: usize, min_size: u32) -> Vec<ScaleLevel> {
        let scales = (0..octaves).flat_map(|o| {
            let base = 2f32.powi(o as i32);
            [base, base * 1.5]
        });
        Self::levels_for_scales(width, height, scales, min_size)
    }

    fn levels_for_scales(
        width: u32,
        height: u32,
        scales: impl Iterator<Item = f32>,
        min_size: u32,
    ) -> Vec<ScaleLevel> {
        let mut levels = Vec::new();
        for scale in scales {
            let scaled_width = (width as f32 / scale).round() as u32;
            let scaled_height = (height as f32 / scale).round() as u32;

            // Stop when image becomes too small for meaningful detection
            if scaled_width < min_size || scaled_height < min_size {
                break;
            }

            levels.push(ScaleLevel {
                level: levels.len(),
                scale,
                width: scaled_width,
                height: scaled_height,
            });
        }
        levels
    }

    /// Build image pyramid from base image
    pub fn build(img: &Image, levels: &[ScaleLevel]) -> Vec<Image> {
        levels
            .iter()
            .map(|level| {
                if level.width == img.width() && level.height == img.height() {
                    img.clone()
                } else {
                    imageops::resize(img, level.width, level.height, FilterType::Triangle)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometric_levels_stop_at_min_size() {
        let levels = ImagePyramid::geometric_levels(200, 100, 2.0, 8, 20);
        let sizes: Vec<(u32, u32)> = levels.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(200, 100), (100, 50), (50, 25)]);
        assert_eq!(levels[2].level, 2);
    }

    #[test]
    fn test_half_octave_scales() {
        let levels = ImagePyramid::half_octave_levels(600, 600, 3, 10);
        let scales: Vec<f32> = levels.iter().map(|l| l.scale).collect();
        assert_eq!(scales, vec![1.0, 1.5, 2.0, 3.0, 4.0, 6.0]);
        assert_eq!(levels[1].to_base(10.0, 4.0), (15.0, 6.0));
    }

    #[test]
    fn test_too_small_image_has_no_levels() {
        assert!(ImagePyramid::geometric_levels(10, 10, 1.2, 8, 32).is_empty());
    }

    #[test]
    fn test_build_matches_level_sizes() {
        let img = Image::new(64, 48);
        let levels = ImagePyramid::geometric_levels(64, 48, 1.5, 3, 8);
        let pyramid = ImagePyramid::build(&img, &levels);
        for (level, layer) in levels.iter().zip(&pyramid) {
            assert_eq!(layer.dimensions(), (level.width, level.height));
        }
    }
}
