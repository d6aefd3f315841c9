use georeg_core::Image;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Bytes per steered BRIEF descriptor (256 tests)
pub const BRIEF_BYTES: usize = 32;
const BRIEF_TESTS: usize = BRIEF_BYTES * 8;
const PATTERN_SEED: u64 = 0x0b5e_55ed;

/// Point pairs `(x1, y1, x2, y2)` relative to the keypoint, drawn from an
/// isotropic Gaussian (sigma = patch / 5) with a fixed seed and clipped to
/// the patch.
#[derive(Debug, Clone, PartialEq)]
pub struct BriefPattern {
    pairs: Vec<(f32, f32, f32, f32)>,
}

impl BriefPattern {
    pub fn new(patch_size: usize) -> Self {
        Self {
            pairs: generate_pattern(patch_size, PATTERN_SEED),
        }
    }

    /// Steered BRIEF descriptor of a keypoint at level coordinates `(cx, cy)`.
    ///
    /// `img` should already be smoothed; samples are bilinear and clamp to the border.
    pub fn describe(&self, img: &Image, cx: f32, cy: f32, angle: f32) -> [u8; BRIEF_BYTES] {
        let (s, c) = angle.sin_cos();
        let mut d = [0u8; BRIEF_BYTES];
        for (i, &(x1, y1, x2, y2)) in self.pairs.iter().enumerate() {
            // Apply rotation and translation for subpixel coordinates
            let (rx1, ry1) = (cx + c * x1 - s * y1, cy + s * x1 + c * y1);
            let (rx2, ry2) = (cx + c * x2 - s * y2, cy + s * x2 + c * y2);

            let bit = (bilinear_sample(img, rx1, ry1) < bilinear_sample(img, rx2, ry2)) as u8;
            d[i / 8] |= bit << (i % 8);
        }
        d
    }
}

fn generate_pattern(patch_size: usize, seed: u64) -> Vec<(f32, f32, f32, f32)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let half = (patch_size / 2) as f32;
    let sigma = patch_size as f32 / 5.0;
    let mut gaussian = move || {
        // Box-Muller
        let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
        let u2: f32 = rng.gen_range(0.0..1.0);
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos();
        (z * sigma).round().clamp(-half, half)
    };
    (0..BRIEF_TESTS)
        .map(|_| (gaussian(), gaussian(), gaussian(), gaussian()))
        .collect()
}

/// Bilinear interpolation for subpixel sampling
pub fn bilinear_sample(img: &Image, x: f32, y: f32) -> f32 {
    let (w, h) = img.dimensions();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let dx = x - x0 as f32;
    let dy = y - y0 as f32;

    let p = |x: u32, y: u32| img.get_pixel(x, y).0[0] as f32;
    let top = p(x0, y0) * (1.0 - dx) + p(x1, y0) * dx;
    let bottom = p(x0, y1) * (1.0 - dx) + p(x1, y1) * dx;
    top * (1.0 - dy) + bottom * dy
}
