//! Optional diagnostic images. Nothing here feeds back into the numeric
//! result; write failures are logged and dropped.

use crate::robust::AttemptReport;
use georeg_core::{Correspondence, Image, Keypoint, Transform};
use image::{imageops, DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PALETTE: [Rgb<u8>; 6] = [
    Rgb([255, 50, 50]),
    Rgb([0, 255, 0]),
    Rgb([50, 100, 255]),
    Rgb([255, 255, 0]),
    Rgb([0, 255, 255]),
    Rgb([255, 0, 255]),
];
const KEYPOINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Intermediate state of one attempt
pub struct AttemptView<'a> {
    pub report: &'a AttemptReport,
    /// Base map as decoded
    pub reference_input: &'a DynamicImage,
    /// Match image as decoded
    pub matched_input: &'a DynamicImage,
    /// Preprocessed base map
    pub reference: &'a Image,
    /// Preprocessed match image
    pub matched: &'a Image,
    pub ref_keypoints: &'a [Keypoint],
    pub match_keypoints: &'a [Keypoint],
    pub separated: &'a [Correspondence],
    pub good: &'a [Correspondence],
    pub inliers: &'a [Correspondence],
}

/// Receives pipeline state for visual inspection
pub trait DebugSink {
    fn attempt(&mut self, view: &AttemptView<'_>);

    /// Called once with the accepted transform
    fn registered(&mut self, reference: &DynamicImage, matched: &DynamicImage, transform: &Transform);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDebug;

impl DebugSink for NoDebug {
    fn attempt(&mut self, _view: &AttemptView<'_>) {}

    fn registered(&mut self, _reference: &DynamicImage, _matched: &DynamicImage, _transform: &Transform) {}
}

/// Writes PNG files into one directory. Later attempts overwrite the
/// images of earlier ones.
#[derive(Debug, Clone)]
pub struct ImageDumper {
    dir: PathBuf,
}

impl ImageDumper {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Dump next to the result file
    pub fn beside(output: &Path) -> Self {
        let dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn save<I: Into<DynamicImage>>(&self, name: &str, img: I) {
        let path = self.dir.join(name);
        match img.into().save(&path) {
            Ok(()) => debug!(path = %path.display(), "debug image written"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write debug image"),
        }
    }
}

impl DebugSink for ImageDumper {
    fn attempt(&mut self, view: &AttemptView<'_>) {
        self.save("basemap_processed.png", view.reference.clone());
        self.save("geocam_processed.png", view.matched.clone());
        self.save("ref_keypoints.png", draw_keypoints(&view.reference_input.to_rgb8(), view.ref_keypoints));
        self.save("match_keypoints.png", draw_keypoints(&view.matched_input.to_rgb8(), view.match_keypoints));

        let draw = |matches: &[Correspondence]| {
            draw_matches(view.reference, view.ref_keypoints, view.matched, view.match_keypoints, matches)
        };
        self.save("separated_matches.png", draw(view.separated));
        self.save("good_matches.png", draw(view.good));
        self.save("inlier_matches.png", draw(view.inliers));
    }

    fn registered(&mut self, reference: &DynamicImage, matched: &DynamicImage, transform: &Transform) {
        match warp_overlay(&reference.to_rgb8(), &matched.to_rgb8(), transform) {
            Some(overlay) => self.save("warped.png", overlay),
            None => warn!("transform cannot be used for warping"),
        }
    }
}

/// Circles at every keypoint over the colour input, scaled by keypoint size
pub fn draw_keypoints(img: &RgbImage, keypoints: &[Keypoint]) -> RgbImage {
    let mut out = img.clone();
    for kp in keypoints {
        let radius = (kp.size / 2.0).round().max(2.0) as i32;
        draw_hollow_circle_mut(&mut out, (kp.x.round() as i32, kp.y.round() as i32), radius, KEYPOINT_COLOR);
    }
    out
}

/// Base map on the left, match image on the right, one line per
/// correspondence. Dangling indices are skipped.
pub fn draw_matches(
    reference: &Image,
    ref_keypoints: &[Keypoint],
    matched: &Image,
    match_keypoints: &[Keypoint],
    matches: &[Correspondence],
) -> RgbImage {
    let (rw, rh) = reference.dimensions();
    let (mw, mh) = matched.dimensions();
    let mut canvas = RgbImage::new(rw + mw, rh.max(mh));
    imageops::replace(&mut canvas, &DynamicImage::ImageLuma8(reference.clone()).into_rgb8(), 0, 0);
    imageops::replace(&mut canvas, &DynamicImage::ImageLuma8(matched.clone()).into_rgb8(), rw as i64, 0);

    let offset = rw as f32;
    for (i, m) in matches.iter().enumerate() {
        let (Some(a), Some(b)) = (ref_keypoints.get(m.query_idx), match_keypoints.get(m.train_idx)) else {
            continue;
        };
        let color = PALETTE[i % PALETTE.len()];
        let end = (b.x + offset, b.y);
        draw_line_segment_mut(&mut canvas, (a.x, a.y), end, color);
        draw_hollow_circle_mut(&mut canvas, (a.x.round() as i32, a.y.round() as i32), 3, color);
        draw_hollow_circle_mut(&mut canvas, (end.0.round() as i32, end.1.round() as i32), 3, color);
    }
    canvas
}

/// Match image warped into the base map frame and blended 50/50 with it
pub fn warp_overlay(reference: &RgbImage, matched: &RgbImage, transform: &Transform) -> Option<RgbImage> {
    let rows = transform.rows();
    let mut flat = [0.0f32; 9];
    for (slot, v) in flat.iter_mut().zip(rows.iter().flatten()) {
        *slot = *v as f32;
    }
    let projection = Projection::from_matrix(flat)?;

    let (w, h) = reference.dimensions();
    let mut warped = RgbImage::new(w, h);
    warp_into(matched, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut warped);
    Some(blend(reference, &warped))
}

/// Per-channel average of two equally sized images
pub fn blend(a: &RgbImage, b: &RgbImage) -> RgbImage {
    RgbImage::from_fn(a.width(), a.height(), |x, y| {
        let pa = a.get_pixel(x, y);
        let pb = b.get_pixel_checked(x, y).copied().unwrap_or(Rgb([0, 0, 0]));
        Rgb([0, 1, 2].map(|c| ((pa[c] as u16 + pb[c] as u16) / 2) as u8))
    })
}
