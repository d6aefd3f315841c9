//! Accelerated-KAZE: Hessian extrema in a nonlinear diffusion scale space,
//! described by modified local difference binary (MLDB) strings.

use crate::error::FeatureResult;
use crate::plane::{Plane, PlaneExt};
use crate::FeatureExtractor;
use georeg_core::{AkazeParams, DescriptorKind, DescriptorSet, FeatureSet, Image, Keypoint};
use image::Luma;
use imageproc::filter::separable_filter;
use imageproc::map::map_colors2;
use rayon::prelude::*;
use std::f32::consts::PI;
use tracing::debug;

/// Base scale of the evolution, in pixels
const BASE_SIGMA: f32 = 1.6;
/// Derivative kernels are this many times the evolution scale
const DERIVATIVE_FACTOR: f32 = 1.5;
/// Largest stable explicit diffusion step
const TAU_MAX: f32 = 0.25;
const CONTRAST_PERCENTILE: f32 = 0.7;
const CONTRAST_BINS: usize = 300;
/// Half-size of the MLDB sampling square, in keypoint scale units
const PATTERN_SIZE: i32 = 10;
const GRIDS: [usize; 3] = [2, 3, 4];
const MIN_LEVEL_WIDTH: usize = 80;
const MIN_LEVEL_HEIGHT: usize = 40;

/// Full MLDB length for 1..=3 channels
pub fn mldb_bits(channels: usize) -> usize {
    let pairs: usize = GRIDS.iter().map(|g| g * g * (g * g - 1) / 2).sum();
    pairs * channels
}

struct EvolutionLevel {
    lt: Plane,
    lx: Plane,
    ly: Plane,
    ldet: Plane,
    /// Evolution scale in level pixels
    sigma: f32,
    octave: u32,
    /// Derivative kernel scale in level pixels
    sigma_size: usize,
}

impl EvolutionLevel {
    fn ratio(&self) -> f32 {
        2f32.powi(self.octave as i32)
    }

    /// Keypoint scale in level pixels used by orientation and description
    fn pattern_scale(&self) -> f32 {
        self.sigma.round().max(1.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Detection {
    level: usize,
    x: f32,
    y: f32,
    response: f32,
}

/// AKAZE detector with the full MLDB descriptor
pub struct AkazeExtractor {
    params: AkazeParams,
}

impl AkazeExtractor {
    pub fn new(params: AkazeParams) -> Self {
        Self { params }
    }

    fn descriptor_bits(&self) -> usize {
        let full = mldb_bits(self.params.descriptor_channels.clamp(1, 3));
        match self.params.descriptor_size {
            0 => full,
            n => n.min(full),
        }
    }

    fn build_evolution(&self, image: &Image) -> Vec<EvolutionLevel> {
        let sublevels = self.params.n_sublevels;
        let mut current = Plane::from_gray(image).blurred(BASE_SIGMA);
        let mut k = contrast_factor(&current);
        let mut time = 0.5 * BASE_SIGMA * BASE_SIGMA;

        let mut evolution = Vec::new();
        for octave in 0..self.params.n_octaves {
            if octave > 0 {
                current = current.downsample_half();
                time *= 0.25;
                k *= 0.75;
            }
            let (width, height) = current.size();
            if width < MIN_LEVEL_WIDTH || height < MIN_LEVEL_HEIGHT {
                break;
            }
            for sub in 0..sublevels {
                let sigma = BASE_SIGMA * 2f32.powf(sub as f32 / sublevels as f32);
                let target = 0.5 * sigma * sigma;
                let dt = target - time;
                if dt > 0.0 {
                    let conductivity = conductivity(&current.blurred(1.0), k);
                    let steps = (dt / TAU_MAX).ceil().max(1.0) as usize;
                    let tau = dt / steps as f32;
                    for _ in 0..steps {
                        current = diffusion_step(&current, &conductivity, tau);
                    }
                    time = target;
                }

                let sigma_size = (sigma * DERIVATIVE_FACTOR).round().max(1.0) as usize;
                let smooth = current.blurred(1.0);
                let s = sigma_size as f32;
                let lx = scale_plane(scharr(&smooth, Axis::X, sigma_size), s);
                let ly = scale_plane(scharr(&smooth, Axis::Y, sigma_size), s);
                let lxx = scale_plane(scharr(&lx, Axis::X, sigma_size), s);
                let lyy = scale_plane(scharr(&ly, Axis::Y, sigma_size), s);
                let lxy = scale_plane(scharr(&lx, Axis::Y, sigma_size), s);
                let ldet = Plane::from_fn(current.width(), current.height(), |x, y| {
                    let (xx, yy, xy) = (lxx.get_pixel(x, y)[0], lyy.get_pixel(x, y)[0], lxy.get_pixel(x, y)[0]);
                    Luma([xx * yy - xy * xy])
                });

                evolution.push(EvolutionLevel {
                    lt: current.clone(),
                    lx,
                    ly,
                    ldet,
                    sigma,
                    octave: octave as u32,
                    sigma_size,
                });
            }
        }
        evolution
    }

    /// Determinant-of-Hessian maxima over space and neighbouring sublevels
    fn find_extrema(&self, evolution: &[EvolutionLevel]) -> Vec<Detection> {
        let threshold = self.params.threshold;
        let mut detections = Vec::new();
        for (i, level) in evolution.iter().enumerate() {
            let det = &level.ldet;
            let border = ((PATTERN_SIZE as f32 * std::f32::consts::SQRT_2 * level.pattern_scale()).ceil() as usize + 1)
                .max(level.sigma_size + 1);
            let (width, height) = det.size();
            if width <= 2 * border || height <= 2 * border {
                continue;
            }
            let neighbours: Vec<&Plane> = [i.checked_sub(1), Some(i + 1)]
                .into_iter()
                .flatten()
                .filter_map(|j| evolution.get(j))
                .filter(|other| other.octave == level.octave)
                .map(|other| &other.ldet)
                .collect();

            let found: Vec<Detection> = (border..height - border)
                .into_par_iter()
                .flat_map_iter(|y| {
                    let neighbours = &neighbours;
                    (border..width - border).filter_map(move |x| {
                        let v = det.at(x, y);
                        if v <= threshold || !is_local_max(det, neighbours, x, y, v) {
                            return None;
                        }
                        let (ox, oy) = subpixel_offset(det, x, y);
                        Some(Detection {
                            level: i,
                            x: x as f32 + ox,
                            y: y as f32 + oy,
                            response: v,
                        })
                    })
                })
                .collect();
            detections.extend(found);
        }
        detections
    }

    /// Dominant direction of the weighted first derivatives in a sliding
    /// pi/3 window
    fn orientation(level: &EvolutionLevel, x: f32, y: f32) -> f32 {
        let s = level.pattern_scale();
        let mut samples = Vec::with_capacity(109);
        for i in -6i32..=6 {
            for j in -6i32..=6 {
                if i * i + j * j >= 36 {
                    continue;
                }
                let (sx, sy) = (x + j as f32 * s, y + i as f32 * s);
                let weight = (-((i * i + j * j) as f32) / (2.0 * 2.5 * 2.5)).exp();
                let rx = weight * level.lx.sample(sx, sy);
                let ry = weight * level.ly.sample(sx, sy);
                samples.push((ry.atan2(rx).rem_euclid(2.0 * PI), rx, ry));
            }
        }

        let mut best = (0.0f32, 0.0f32, 0.0f32);
        let mut start = 0.0f32;
        while start < 2.0 * PI {
            let end = start + PI / 3.0;
            let (mut sx, mut sy) = (0.0f32, 0.0f32);
            for &(a, rx, ry) in &samples {
                let inside = if end <= 2.0 * PI {
                    a >= start && a < end
                } else {
                    a >= start || a < end - 2.0 * PI
                };
                if inside {
                    sx += rx;
                    sy += ry;
                }
            }
            let norm = sx * sx + sy * sy;
            if norm > best.0 {
                best = (norm, sx, sy);
            }
            start += 0.15;
        }
        if best.0 > 0.0 {
            best.2.atan2(best.1)
        } else {
            0.0
        }
    }

    /// Binary comparisons of mean intensity and rotated derivatives over
    /// 2x2, 3x3 and 4x4 grids
    fn describe(&self, level: &EvolutionLevel, x: f32, y: f32, angle: f32, bits: usize) -> Vec<u8> {
        let channels = self.params.descriptor_channels.clamp(1, 3);
        let s = level.pattern_scale();
        let (si, co) = angle.sin_cos();
        let side = 2 * PATTERN_SIZE;

        let mut out = vec![0u8; bits.div_ceil(8)];
        let mut bit = 0usize;
        for &grid in &GRIDS {
            let step = (side as f32 / grid as f32).ceil() as i32;
            let mut cells: Vec<[f32; 3]> = Vec::with_capacity(grid * grid);
            for gy in 0..grid as i32 {
                for gx in 0..grid as i32 {
                    let (u0, v0) = (-PATTERN_SIZE + gx * step, -PATTERN_SIZE + gy * step);
                    let mut acc = [0.0f32; 3];
                    let mut n = 0.0f32;
                    for v in v0..(v0 + step).min(PATTERN_SIZE + 1) {
                        for u in u0..(u0 + step).min(PATTERN_SIZE + 1) {
                            let (u, v) = (u as f32 * s, v as f32 * s);
                            let (px, py) = (x + u * co - v * si, y + u * si + v * co);
                            let (rx, ry) = (level.lx.sample(px, py), level.ly.sample(px, py));
                            acc[0] += level.lt.sample(px, py);
                            acc[1] += rx * co + ry * si;
                            acc[2] += -rx * si + ry * co;
                            n += 1.0;
                        }
                    }
                    cells.push(acc.map(|v| v / n.max(1.0)));
                }
            }

            for a in 0..cells.len() {
                for b in (a + 1)..cells.len() {
                    for c in 0..channels {
                        if bit < bits && cells[a][c] > cells[b][c] {
                            out[bit / 8] |= 1 << (bit % 8);
                        }
                        bit += 1;
                    }
                }
            }
        }
        out
    }
}

impl FeatureExtractor for AkazeExtractor {
    fn name(&self) -> &'static str {
        "AKAZE"
    }

    fn descriptor_kind(&self) -> DescriptorKind {
        DescriptorKind::Binary
    }

    fn descriptor_width(&self) -> usize {
        self.descriptor_bits().div_ceil(8)
    }

    fn detect_and_describe(&self, image: &Image) -> FeatureResult<FeatureSet> {
        let width = self.descriptor_width();
        let evolution = self.build_evolution(image);
        if evolution.is_empty() {
            return Ok(FeatureSet::empty(DescriptorKind::Binary, width));
        }

        let detections = self.find_extrema(&evolution);
        let bits = self.descriptor_bits();
        let described: Vec<(Keypoint, Vec<u8>)> = detections
            .par_iter()
            .map(|d| {
                let level = &evolution[d.level];
                let angle = Self::orientation(level, d.x, d.y);
                let ratio = level.ratio();
                // pixel centres of the halved levels sit between base pixels
                let kp = Keypoint::new((d.x + 0.5) * ratio - 0.5, (d.y + 0.5) * ratio - 0.5)
                    .with_size(2.0 * DERIVATIVE_FACTOR * level.sigma * ratio)
                    .with_angle(angle)
                    .with_response(d.response)
                    .with_octave(level.octave);
                (kp, self.describe(level, d.x, d.y, angle, bits))
            })
            .collect();

        debug!(
            levels = evolution.len(),
            keypoints = described.len(),
            "AKAZE extraction"
        );
        let (keypoints, rows): (Vec<Keypoint>, Vec<Vec<u8>>) = described.into_iter().unzip();
        Ok(FeatureSet::new(keypoints, DescriptorSet::from_binary_rows(width, &rows)))
    }
}

#[derive(Clone, Copy)]
enum Axis {
    X,
    Y,
}

/// Scharr first derivative with taps `scale` pixels apart, normalised to
/// intensity per pixel
fn scharr(p: &Plane, axis: Axis, scale: usize) -> Plane {
    let norm = 1.0 / (2.0 * scale as f32 * 16.0);
    let mut diff = vec![0.0f32; 2 * scale + 1];
    diff[0] = -1.0;
    diff[2 * scale] = 1.0;
    let mut smooth = vec![0.0f32; 2 * scale + 1];
    smooth[0] = 3.0 * norm;
    smooth[scale] = 10.0 * norm;
    smooth[2 * scale] = 3.0 * norm;
    match axis {
        Axis::X => separable_filter(p, &diff, &smooth),
        Axis::Y => separable_filter(p, &smooth, &diff),
    }
}

fn scale_plane(mut p: Plane, factor: f32) -> Plane {
    p.iter_mut().for_each(|v| *v *= factor);
    p
}

/// Gradient magnitude at the given percentile of the non-zero gradients
fn contrast_factor(plane: &Plane) -> f32 {
    const FALLBACK: f32 = 0.03;
    let smooth = plane.blurred(1.0);
    let gx = scharr(&smooth, Axis::X, 1);
    let gy = scharr(&smooth, Axis::Y, 1);

    let (width, height) = plane.size();
    let mut magnitudes = Vec::with_capacity(plane.len());
    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            magnitudes.push(gx.at(x, y).hypot(gy.at(x, y)));
        }
    }
    let max = magnitudes.iter().cloned().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return FALLBACK;
    }

    let mut hist = [0usize; CONTRAST_BINS];
    let mut count = 0usize;
    for m in magnitudes.into_iter().filter(|&m| m > 0.0) {
        let bin = ((m / max * CONTRAST_BINS as f32) as usize).min(CONTRAST_BINS - 1);
        hist[bin] += 1;
        count += 1;
    }
    let target = (count as f32 * CONTRAST_PERCENTILE) as usize;
    let mut acc = 0usize;
    for (bin, &n) in hist.iter().enumerate() {
        acc += n;
        if acc >= target {
            let k = max * bin as f32 / CONTRAST_BINS as f32;
            return if k > 0.0 { k } else { max / CONTRAST_BINS as f32 };
        }
    }
    FALLBACK
}

/// Perona-Malik g2 conductivity: 1 / (1 + |grad|^2 / k^2)
fn conductivity(smooth: &Plane, k: f32) -> Plane {
    let gx = scharr(smooth, Axis::X, 1);
    let gy = scharr(smooth, Axis::Y, 1);
    let inv_k2 = 1.0 / (k * k);
    map_colors2(&gx, &gy, |dx: Luma<f32>, dy: Luma<f32>| {
        Luma([1.0 / (1.0 + (dx[0] * dx[0] + dy[0] * dy[0]) * inv_k2)])
    })
}

/// One explicit step of div(g grad L) with zero flux across the border
fn diffusion_step(l: &Plane, g: &Plane, tau: f32) -> Plane {
    let mut out = Plane::new(l.width(), l.height());
    let width = l.width() as usize;
    out.par_chunks_mut(width.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as isize;
            for (x, v) in row.iter_mut().enumerate() {
                let x = x as isize;
                let c = l.clamped(x, y);
                let gc = g.clamped(x, y);
                let flux = |nx: isize, ny: isize| 0.5 * (gc + g.clamped(nx, ny)) * (l.clamped(nx, ny) - c);
                let div = flux(x + 1, y) + flux(x - 1, y) + flux(x, y + 1) + flux(x, y - 1);
                *v = c + tau * div;
            }
        });
    out
}

fn is_local_max(det: &Plane, neighbours: &[&Plane], x: usize, y: usize, v: f32) -> bool {
    let (x, y) = (x as isize, y as isize);
    for dy in -1..=1 {
        for dx in -1..=1 {
            if (dx != 0 || dy != 0) && det.clamped(x + dx, y + dy) >= v {
                return false;
            }
        }
    }
    neighbours.iter().all(|n| {
        (-1..=1).all(|dy| (-1..=1).all(|dx| n.clamped(x + dx, y + dy) < v))
    })
}

/// Quadratic peak offset of the response, each axis clamped to half a pixel
fn subpixel_offset(det: &Plane, x: usize, y: usize) -> (f32, f32) {
    let (x, y) = (x as isize, y as isize);
    let c = det.clamped(x, y);
    let dx = 0.5 * (det.clamped(x + 1, y) - det.clamped(x - 1, y));
    let dy = 0.5 * (det.clamped(x, y + 1) - det.clamped(x, y - 1));
    let dxx = det.clamped(x + 1, y) - 2.0 * c + det.clamped(x - 1, y);
    let dyy = det.clamped(x, y + 1) - 2.0 * c + det.clamped(x, y - 1);
    let dxy = 0.25
        * (det.clamped(x + 1, y + 1) - det.clamped(x - 1, y + 1) - det.clamped(x + 1, y - 1) + det.clamped(x - 1, y - 1));

    let hdet = dxx * dyy - dxy * dxy;
    if hdet.abs() < 1e-12 {
        return (0.0, 0.0);
    }
    let ox = -(dyy * dx - dxy * dy) / hdet;
    let oy = -(dxx * dy - dxy * dx) / hdet;
    (ox.clamp(-0.5, 0.5), oy.clamp(-0.5, 0.5))
}
