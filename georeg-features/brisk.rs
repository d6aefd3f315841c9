use crate::error::FeatureResult;
use crate::fast;
use crate::pyramid::ImagePyramid;
use crate::FeatureExtractor;
use georeg_core::{BriskParams, DescriptorKind, DescriptorSet, FeatureSet, Image, Keypoint};
use rayon::prelude::*;
use std::f32::consts::PI;
use tracing::debug;

/// Bytes per BRISK descriptor (512 short-pair comparisons)
pub const BRISK_BYTES: usize = 64;
const BRISK_BITS: usize = BRISK_BYTES * 8;

const RING_RADII: [f32; 5] = [0.0, 2.9, 4.9, 7.4, 10.8];
const RING_COUNTS: [usize; 5] = [1, 10, 14, 15, 20];
/// Pairs closer than this are compared for the descriptor
const SHORT_PAIR_MAX: f32 = 9.75;
/// Pairs further apart than this estimate the orientation
const LONG_PAIR_MIN: f32 = 13.67;
/// Keypoint diameter at scale 1
const BASIC_SIZE: f32 = 12.0;
const MIN_LAYER_SIZE: u32 = 16;

#[derive(Debug, Clone, Copy)]
struct PatternPoint {
    x: f32,
    y: f32,
    sigma: f32,
}

/// Concentric sampling rings with the pair lists derived from them
#[derive(Debug, Clone)]
struct BriskPattern {
    points: Vec<PatternPoint>,
    short_pairs: Vec<(usize, usize)>,
    long_pairs: Vec<(usize, usize)>,
}

impl BriskPattern {
    fn new(pattern_scale: f32) -> Self {
        let mut points = Vec::with_capacity(RING_COUNTS.iter().sum());
        for (ring, (&radius, &count)) in RING_RADII.iter().zip(RING_COUNTS.iter()).enumerate() {
            // alternate rings are rotated half a step
            let phase = if ring > 0 && ring % 2 == 0 { PI / count as f32 } else { 0.0 };
            let sigma = if count > 1 {
                0.5 * 2.0 * PI * radius / count as f32
            } else {
                0.72
            };
            for j in 0..count {
                let a = 2.0 * PI * j as f32 / count as f32 + phase;
                points.push(PatternPoint {
                    x: radius * a.cos() * pattern_scale,
                    y: radius * a.sin() * pattern_scale,
                    sigma: sigma * pattern_scale,
                });
            }
        }

        let mut short_pairs = Vec::new();
        let mut long_pairs = Vec::new();
        for i in 1..points.len() {
            for j in 0..i {
                let d = (points[i].x - points[j].x).hypot(points[i].y - points[j].y);
                if d < SHORT_PAIR_MAX * pattern_scale {
                    short_pairs.push((i, j));
                } else if d > LONG_PAIR_MIN * pattern_scale {
                    long_pairs.push((i, j));
                }
            }
        }
        short_pairs.truncate(BRISK_BITS);

        Self {
            points,
            short_pairs,
            long_pairs,
        }
    }

    fn radius(&self) -> f32 {
        self.points
            .iter()
            .map(|p| p.x.hypot(p.y) + p.sigma)
            .fold(0.0, f32::max)
    }
}

/// Summed-area table for constant-time box means
struct IntegralImage {
    width: usize,
    height: usize,
    sums: Vec<u64>,
}

impl IntegralImage {
    fn new(img: &Image) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let mut sums = vec![0u64; (w + 1) * (h + 1)];
        for y in 0..h {
            let mut row = 0u64;
            for x in 0..w {
                row += img.get_pixel(x as u32, y as u32).0[0] as u64;
                sums[(y + 1) * (w + 1) + x + 1] = sums[y * (w + 1) + x + 1] + row;
            }
        }
        Self {
            width: w,
            height: h,
            sums,
        }
    }

    /// Mean over the square of half-width `r` centred on `(x, y)`, clipped to the image
    fn box_mean(&self, x: f32, y: f32, r: f32) -> f32 {
        let r = r.max(0.5);
        let x0 = ((x - r).round().max(0.0) as usize).min(self.width - 1);
        let y0 = ((y - r).round().max(0.0) as usize).min(self.height - 1);
        let x1 = ((x + r).round().max(0.0) as usize).clamp(x0 + 1, self.width);
        let y1 = ((y + r).round().max(0.0) as usize).clamp(y0 + 1, self.height);
        let stride = self.width + 1;
        let s = self.sums[y1 * stride + x1] + self.sums[y0 * stride + x0]
            - self.sums[y0 * stride + x1]
            - self.sums[y1 * stride + x0];
        s as f32 / ((x1 - x0) * (y1 - y0)) as f32
    }
}

/// FAST corners over a half-octave pyramid with the BRISK ring descriptor
pub struct BriskExtractor {
    params: BriskParams,
    pattern: BriskPattern,
}

impl BriskExtractor {
    pub fn new(params: BriskParams) -> Self {
        let pattern = BriskPattern::new(params.pattern_scale);
        Self { params, pattern }
    }

    fn sample(&self, integral: &IntegralImage, point: &PatternPoint, kp: &Keypoint, scale: f32, angle: f32) -> f32 {
        let (s, c) = angle.sin_cos();
        let (px, py) = (point.x * scale, point.y * scale);
        integral.box_mean(kp.x + c * px - s * py, kp.y + s * px + c * py, point.sigma * scale)
    }

    /// Orientation from the mean local gradient over the long pairs
    fn orientation(&self, integral: &IntegralImage, kp: &Keypoint, scale: f32) -> f32 {
        let values: Vec<f32> = self
            .pattern
            .points
            .iter()
            .map(|p| self.sample(integral, p, kp, scale, 0.0))
            .collect();
        let (mut gx, mut gy) = (0.0f32, 0.0f32);
        for &(i, j) in &self.pattern.long_pairs {
            let (pi, pj) = (&self.pattern.points[i], &self.pattern.points[j]);
            let (dx, dy) = (pj.x - pi.x, pj.y - pi.y);
            let norm2 = dx * dx + dy * dy;
            let diff = values[j] - values[i];
            gx += diff * dx / norm2;
            gy += diff * dy / norm2;
        }
        gy.atan2(gx)
    }

    fn describe(&self, integral: &IntegralImage, kp: &Keypoint, scale: f32) -> [u8; BRISK_BYTES] {
        let values: Vec<f32> = self
            .pattern
            .points
            .iter()
            .map(|p| self.sample(integral, p, kp, scale, kp.angle))
            .collect();
        let mut d = [0u8; BRISK_BYTES];
        for (bit, &(i, j)) in self.pattern.short_pairs.iter().enumerate() {
            if values[i] > values[j] {
                d[bit / 8] |= 1 << (bit % 8);
            }
        }
        d
    }
}

impl FeatureExtractor for BriskExtractor {
    fn name(&self) -> &'static str {
        "BRISK"
    }

    fn descriptor_kind(&self) -> DescriptorKind {
        DescriptorKind::Binary
    }

    fn descriptor_width(&self) -> usize {
        BRISK_BYTES
    }

    fn detect_and_describe(&self, image: &Image) -> FeatureResult<FeatureSet> {
        let levels = ImagePyramid::half_octave_levels(
            image.width(),
            image.height(),
            self.params.octaves.max(1),
            MIN_LAYER_SIZE,
        );
        if levels.is_empty() {
            return Ok(FeatureSet::empty(DescriptorKind::Binary, BRISK_BYTES));
        }
        let pyramid = ImagePyramid::build(image, &levels);

        let candidates: Vec<Keypoint> = levels
            .par_iter()
            .zip(pyramid.par_iter())
            .flat_map_iter(|(level, layer)| {
                fast::detect(layer, self.params.threshold, 3)
                    .into_iter()
                    .map(move |c| {
                        let (x, y) = level.to_base(c.x as f32, c.y as f32);
                        Keypoint::new(x, y)
                            .with_size(BASIC_SIZE * level.scale)
                            .with_response(c.score)
                            .with_octave(level.level as u32)
                    })
            })
            .collect();

        // the whole pattern must fit inside the full-resolution image
        let (w, h) = (image.width() as f32, image.height() as f32);
        let reach = self.pattern.radius();
        let integral = IntegralImage::new(image);
        let described: Vec<(Keypoint, [u8; BRISK_BYTES])> = candidates
            .into_par_iter()
            .filter_map(|mut kp| {
                let scale = kp.size / BASIC_SIZE;
                let r = reach * scale;
                if kp.x < r || kp.y < r || kp.x + r >= w || kp.y + r >= h {
                    return None;
                }
                kp.angle = self.orientation(&integral, &kp, scale);
                let d = self.describe(&integral, &kp, scale);
                Some((kp, d))
            })
            .collect();

        debug!(keypoints = described.len(), layers = levels.len(), "BRISK extraction");
        let (keypoints, rows): (Vec<Keypoint>, Vec<[u8; BRISK_BYTES]>) = described.into_iter().unzip();
        Ok(FeatureSet::new(keypoints, DescriptorSet::from_binary_rows(BRISK_BYTES, &rows)))
    }
}
