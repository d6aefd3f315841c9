use crate::error::FeatureResult;
use crate::plane::{Plane, PlaneExt};
use crate::FeatureExtractor;
use georeg_core::{DescriptorKind, DescriptorSet, FeatureSet, Image, Keypoint, SiftParams};
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use std::f32::consts::PI;
use tracing::debug;

/// Floats per descriptor: 4x4 spatial cells of 8 orientation bins
pub const SIFT_WIDTH: usize = DESCR_WIDTH * DESCR_WIDTH * DESCR_BINS;

const DESCR_WIDTH: usize = 4;
const DESCR_BINS: usize = 8;
const DESCR_SCALE: f32 = 3.0;
const DESCR_MAG_CLAMP: f32 = 0.2;
const ORI_BINS: usize = 36;
const ORI_SIGMA: f32 = 1.5;
const ORI_RADIUS: f32 = 3.0 * ORI_SIGMA;
const ORI_PEAK_RATIO: f32 = 0.8;
const IMG_BORDER: usize = 5;
const MAX_INTERP_STEPS: usize = 5;
/// Blur assumed present in the input image
const INITIAL_SIGMA: f32 = 0.5;
const MIN_OCTAVE_SIZE: usize = 16;

struct Octave {
    gauss: Vec<Plane>,
    dog: Vec<Plane>,
}

/// Extremum located in the DoG scale space
#[derive(Debug, Clone, Copy)]
struct Extremum {
    octave: usize,
    layer: usize,
    /// Sub-pixel position in octave pixels
    x: f32,
    y: f32,
    /// Sub-layer offset
    xi: f32,
    response: f32,
}

/// Difference-of-Gaussians detector with gradient histogram descriptors
pub struct SiftExtractor {
    params: SiftParams,
}

impl SiftExtractor {
    pub fn new(params: SiftParams) -> Self {
        Self { params }
    }

    fn octave_count(width: usize, height: usize) -> usize {
        let min_dim = width.min(height);
        if min_dim < MIN_OCTAVE_SIZE {
            return 0;
        }
        let mut n = 1;
        let mut dim = min_dim / 2;
        while dim >= MIN_OCTAVE_SIZE {
            n += 1;
            dim /= 2;
        }
        n
    }

    fn build_octaves(&self, image: &Image) -> Vec<Octave> {
        let s = self.params.n_octave_layers;
        let sigma = self.params.sigma;
        let base = Plane::from_gray(image);
        let (base_w, base_h) = base.size();
        let n_octaves = Self::octave_count(base_w, base_h);

        // incremental blur from layer i-1 to layer i
        let k = 2f32.powf(1.0 / s as f32);
        let mut increments = vec![0.0f32; s + 3];
        increments[0] = (sigma * sigma - INITIAL_SIGMA * INITIAL_SIGMA).max(0.01).sqrt();
        for (i, inc) in increments.iter_mut().enumerate().skip(1) {
            let prev = sigma * k.powi(i as i32 - 1);
            let total = prev * k;
            *inc = (total * total - prev * prev).sqrt();
        }

        let mut octaves = Vec::with_capacity(n_octaves);
        let mut seed = base.blurred(increments[0]);
        for o in 0..n_octaves {
            let mut gauss = Vec::with_capacity(s + 3);
            gauss.push(seed);
            for inc in &increments[1..] {
                let next = gauss[gauss.len() - 1].blurred(*inc);
                gauss.push(next);
            }
            let dog = gauss.windows(2).map(|w| w[1].subtract(&w[0])).collect();
            seed = decimate(&gauss[s]);
            octaves.push(Octave { gauss, dog });
            if o + 1 < n_octaves && seed.width().min(seed.height()) < MIN_OCTAVE_SIZE as u32 {
                break;
            }
        }
        octaves
    }

    fn find_extrema(&self, octaves: &[Octave]) -> Vec<Extremum> {
        let s = self.params.n_octave_layers;
        let threshold = 0.5 * self.params.contrast_threshold / s as f32;

        let mut extrema = Vec::new();
        for (o, octave) in octaves.iter().enumerate() {
            let (w, h) = octave.dog[0].size();
            if w <= 2 * IMG_BORDER || h <= 2 * IMG_BORDER {
                continue;
            }
            for layer in 1..=s {
                let found: Vec<Extremum> = (IMG_BORDER..h - IMG_BORDER)
                    .into_par_iter()
                    .flat_map_iter(|y| {
                        (IMG_BORDER..w - IMG_BORDER).filter_map(move |x| {
                            let v = octave.dog[layer].at(x, y);
                            if v.abs() <= threshold || !is_extremum(&octave.dog, layer, x, y, v) {
                                return None;
                            }
                            self.refine(octave, o, layer, x, y)
                        })
                    })
                    .collect();
                extrema.extend(found);
            }
        }
        extrema
    }

    /// 3-D quadratic interpolation of an extremum, with contrast and edge rejection
    fn refine(&self, octave: &Octave, o: usize, layer: usize, x: usize, y: usize) -> Option<Extremum> {
        let s = self.params.n_octave_layers;
        let (w, h) = octave.dog[0].size();
        let (mut x, mut y, mut layer) = (x as isize, y as isize, layer as isize);

        let mut offset = Vector3::zeros();
        let mut converged = false;
        for _ in 0..MAX_INTERP_STEPS {
            let (grad, hess) = derivatives(&octave.dog, layer as usize, x, y);
            offset = -(hess.try_inverse()? * grad);
            if offset.iter().all(|v: &f32| v.abs() < 0.5) {
                converged = true;
                break;
            }
            if offset.iter().any(|v: &f32| v.abs() > 1e3) {
                return None;
            }
            x += offset[0].round() as isize;
            y += offset[1].round() as isize;
            layer += offset[2].round() as isize;
            if layer < 1
                || layer > s as isize
                || x < IMG_BORDER as isize
                || y < IMG_BORDER as isize
                || x >= (w - IMG_BORDER) as isize
                || y >= (h - IMG_BORDER) as isize
            {
                return None;
            }
        }
        if !converged {
            return None;
        }

        let layer_u = layer as usize;
        let (grad, hess) = derivatives(&octave.dog, layer_u, x, y);
        let contrast = octave.dog[layer_u].clamped(x, y) + 0.5 * grad.dot(&offset);
        if contrast.abs() * (s as f32) < self.params.contrast_threshold {
            return None;
        }

        // principal curvature ratio
        let r = self.params.edge_threshold;
        let (dxx, dyy, dxy) = (hess[(0, 0)], hess[(1, 1)], hess[(0, 1)]);
        let trace = dxx + dyy;
        let det = dxx * dyy - dxy * dxy;
        if det <= 0.0 || trace * trace * r >= (r + 1.0) * (r + 1.0) * det {
            return None;
        }

        Some(Extremum {
            octave: o,
            layer: layer_u,
            x: x as f32 + offset[0],
            y: y as f32 + offset[1],
            xi: offset[2],
            response: contrast.abs(),
        })
    }

    /// Scale of an extremum in octave pixels
    fn octave_sigma(&self, e: &Extremum) -> f32 {
        self.params.sigma * 2f32.powf((e.layer as f32 + e.xi) / self.params.n_octave_layers as f32)
    }

    /// Dominant gradient directions around an extremum, in radians
    fn orientations(&self, octave: &Octave, e: &Extremum) -> Vec<f32> {
        let img = &octave.gauss[e.layer];
        let scl = self.octave_sigma(e);
        let radius = (ORI_RADIUS * scl).round() as isize;
        let weight_scale = -1.0 / (2.0 * (ORI_SIGMA * scl).powi(2));
        let (cx, cy) = (e.x.round() as isize, e.y.round() as isize);

        let mut hist = [0.0f32; ORI_BINS];
        for dy in -radius..=radius {
            let y = cy + dy;
            if y <= 0 || y >= img.height() as isize - 1 {
                continue;
            }
            for dx in -radius..=radius {
                let x = cx + dx;
                if x <= 0 || x >= img.width() as isize - 1 {
                    continue;
                }
                let (gx, gy) = img.gradient(x as usize, y as usize);
                let weight = (((dx * dx + dy * dy) as f32) * weight_scale).exp();
                let angle = gy.atan2(gx);
                let bin = ((angle + PI) / (2.0 * PI) * ORI_BINS as f32).floor() as isize;
                hist[bin.rem_euclid(ORI_BINS as isize) as usize] += weight * gx.hypot(gy);
            }
        }

        // [1 4 6 4 1] / 16 circular smoothing
        let mut smooth = [0.0f32; ORI_BINS];
        for (i, out) in smooth.iter_mut().enumerate() {
            let at = |k: isize| hist[(i as isize + k).rem_euclid(ORI_BINS as isize) as usize];
            *out = (at(-2) + at(2)) / 16.0 + (at(-1) + at(1)) * 4.0 / 16.0 + at(0) * 6.0 / 16.0;
        }

        let max = smooth.iter().cloned().fold(0.0f32, f32::max);
        if max <= 0.0 {
            return vec![0.0];
        }
        let mut angles = Vec::new();
        for i in 0..ORI_BINS {
            let left = smooth[(i + ORI_BINS - 1) % ORI_BINS];
            let right = smooth[(i + 1) % ORI_BINS];
            let v = smooth[i];
            if v > left && v > right && v >= ORI_PEAK_RATIO * max {
                let denom = left - 2.0 * v + right;
                let shift = if denom.abs() > f32::EPSILON { 0.5 * (left - right) / denom } else { 0.0 };
                let bin = i as f32 + 0.5 + shift;
                let angle = bin / ORI_BINS as f32 * 2.0 * PI - PI;
                angles.push(wrap_angle(angle));
            }
        }
        if angles.is_empty() {
            angles.push(0.0);
        }
        angles
    }

    /// 4x4x8 gradient histogram, normalised, clamped at 0.2 and renormalised
    fn describe(&self, octave: &Octave, e: &Extremum, angle: f32) -> [f32; SIFT_WIDTH] {
        let img = &octave.gauss[e.layer];
        let d = DESCR_WIDTH as f32;
        let hist_width = DESCR_SCALE * self.octave_sigma(e);
        let max_radius = (img.width() as f32).hypot(img.height() as f32);
        let radius = (hist_width * std::f32::consts::SQRT_2 * (d + 1.0) * 0.5).round().min(max_radius) as isize;
        let (sin_t, cos_t) = angle.sin_cos();
        let (cx, cy) = (e.x.round() as isize, e.y.round() as isize);
        let exp_scale = -1.0 / (d * d * 0.5);

        // padded histogram avoids bounds checks during trilinear interpolation
        let stride_r = (DESCR_WIDTH + 2) * (DESCR_BINS + 2);
        let stride_c = DESCR_BINS + 2;
        let mut hist = vec![0.0f32; (DESCR_WIDTH + 2) * stride_r];

        for i in -radius..=radius {
            for j in -radius..=radius {
                // offsets in the keypoint frame, in cell units
                let c_rot = (j as f32 * cos_t + i as f32 * sin_t) / hist_width;
                let r_rot = (-(j as f32) * sin_t + i as f32 * cos_t) / hist_width;
                let rbin = r_rot + d / 2.0 - 0.5;
                let cbin = c_rot + d / 2.0 - 0.5;
                if rbin <= -1.0 || rbin >= d || cbin <= -1.0 || cbin >= d {
                    continue;
                }
                let (x, y) = (cx + j, cy + i);
                if x <= 0 || y <= 0 || x >= img.width() as isize - 1 || y >= img.height() as isize - 1 {
                    continue;
                }
                let (gx, gy) = img.gradient(x as usize, y as usize);
                let mag = gx.hypot(gy) * ((c_rot * c_rot + r_rot * r_rot) * exp_scale).exp();
                let rel = (gy.atan2(gx) - angle).rem_euclid(2.0 * PI);
                let obin = rel * DESCR_BINS as f32 / (2.0 * PI);

                let (r0, c0, o0) = (rbin.floor(), cbin.floor(), obin.floor());
                let (dr, dc, d_o) = (rbin - r0, cbin - c0, obin - o0);
                let (r0, c0) = ((r0 as isize + 1) as usize, (c0 as isize + 1) as usize);
                let o0 = (o0 as usize) % DESCR_BINS;

                for (rr, wr) in [(r0, 1.0 - dr), (r0 + 1, dr)] {
                    for (cc, wc) in [(c0, 1.0 - dc), (c0 + 1, dc)] {
                        for (oo, wo) in [(o0, 1.0 - d_o), (o0 + 1, d_o)] {
                            hist[rr * stride_r + cc * stride_c + oo] += mag * wr * wc * wo;
                        }
                    }
                }
            }
        }

        let mut out = [0.0f32; SIFT_WIDTH];
        for r in 0..DESCR_WIDTH {
            for c in 0..DESCR_WIDTH {
                let base = (r + 1) * stride_r + (c + 1) * stride_c;
                let dst = (r * DESCR_WIDTH + c) * DESCR_BINS;
                for o in 0..DESCR_BINS {
                    out[dst + o] = hist[base + o];
                }
                // wrap the extra orientation bin around
                out[dst] += hist[base + DESCR_BINS];
            }
        }

        let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            let clamp = DESCR_MAG_CLAMP * norm;
            out.iter_mut().for_each(|v| *v = v.min(clamp));
            let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt().max(f32::EPSILON);
            out.iter_mut().for_each(|v| *v /= norm);
        }
        out
    }
}

impl FeatureExtractor for SiftExtractor {
    fn name(&self) -> &'static str {
        "SIFT"
    }

    fn descriptor_kind(&self) -> DescriptorKind {
        DescriptorKind::Float
    }

    fn descriptor_width(&self) -> usize {
        SIFT_WIDTH
    }

    fn detect_and_describe(&self, image: &Image) -> FeatureResult<FeatureSet> {
        let octaves = self.build_octaves(image);
        if octaves.is_empty() {
            return Ok(FeatureSet::empty(DescriptorKind::Float, SIFT_WIDTH));
        }

        let extrema = self.find_extrema(&octaves);
        let mut oriented: Vec<(Extremum, f32)> = extrema
            .par_iter()
            .flat_map_iter(|e| {
                self.orientations(&octaves[e.octave], e)
                    .into_iter()
                    .map(move |a| (*e, a))
            })
            .collect();

        // keep the strongest responses, stable for equal ones
        oriented.sort_by(|a, b| b.0.response.total_cmp(&a.0.response));
        oriented.truncate(self.params.n_features);

        let described: Vec<(Keypoint, [f32; SIFT_WIDTH])> = oriented
            .par_iter()
            .map(|(e, angle)| {
                let ratio = 2f32.powi(e.octave as i32);
                let kp = Keypoint::new(e.x * ratio, e.y * ratio)
                    .with_size(2.0 * self.octave_sigma(e) * ratio)
                    .with_angle(*angle)
                    .with_response(e.response)
                    .with_octave(e.octave as u32);
                (kp, self.describe(&octaves[e.octave], e, *angle))
            })
            .collect();

        debug!(
            extrema = extrema.len(),
            keypoints = described.len(),
            octaves = octaves.len(),
            "SIFT extraction"
        );
        let (keypoints, rows): (Vec<Keypoint>, Vec<[f32; SIFT_WIDTH]>) = described.into_iter().unzip();
        Ok(FeatureSet::new(keypoints, DescriptorSet::from_float_rows(SIFT_WIDTH, &rows)))
    }
}

/// Keep every second pixel
fn decimate(plane: &Plane) -> Plane {
    let (w, h) = ((plane.width() / 2).max(1), (plane.height() / 2).max(1));
    Plane::from_fn(w, h, |x, y| *plane.get_pixel(2 * x, 2 * y))
}

fn wrap_angle(a: f32) -> f32 {
    let a = (a + PI).rem_euclid(2.0 * PI) - PI;
    if a <= -PI {
        a + 2.0 * PI
    } else {
        a
    }
}

fn is_extremum(dog: &[Plane], layer: usize, x: usize, y: usize, v: f32) -> bool {
    let (x, y) = (x as isize, y as isize);
    let mut is_max = v > 0.0;
    let mut is_min = v < 0.0;
    for plane in &dog[layer - 1..=layer + 1] {
        for dy in -1..=1 {
            for dx in -1..=1 {
                let n = plane.clamped(x + dx, y + dy);
                if std::ptr::eq(plane, &dog[layer]) && dx == 0 && dy == 0 {
                    continue;
                }
                is_max &= v >= n;
                is_min &= v <= n;
                if !is_max && !is_min {
                    return false;
                }
            }
        }
    }
    is_max || is_min
}

/// Gradient and Hessian of the DoG in (x, y, layer)
fn derivatives(dog: &[Plane], layer: usize, x: isize, y: isize) -> (Vector3<f32>, Matrix3<f32>) {
    let (prev, cur, next) = (&dog[layer - 1], &dog[layer], &dog[layer + 1]);
    let v = cur.clamped(x, y);

    let dx = 0.5 * (cur.clamped(x + 1, y) - cur.clamped(x - 1, y));
    let dy = 0.5 * (cur.clamped(x, y + 1) - cur.clamped(x, y - 1));
    let ds = 0.5 * (next.clamped(x, y) - prev.clamped(x, y));

    let dxx = cur.clamped(x + 1, y) + cur.clamped(x - 1, y) - 2.0 * v;
    let dyy = cur.clamped(x, y + 1) + cur.clamped(x, y - 1) - 2.0 * v;
    let dss = next.clamped(x, y) + prev.clamped(x, y) - 2.0 * v;
    let dxy = 0.25 * (cur.clamped(x + 1, y + 1) - cur.clamped(x - 1, y + 1) - cur.clamped(x + 1, y - 1) + cur.clamped(x - 1, y - 1));
    let dxs = 0.25 * (next.clamped(x + 1, y) - next.clamped(x - 1, y) - prev.clamped(x + 1, y) + prev.clamped(x - 1, y));
    let dys = 0.25 * (next.clamped(x, y + 1) - next.clamped(x, y - 1) - prev.clamped(x, y + 1) + prev.clamped(x, y - 1));

    (
        Vector3::new(dx, dy, ds),
        Matrix3::new(dxx, dxy, dxs, dxy, dyy, dys, dxs, dys, dss),
    )
}
