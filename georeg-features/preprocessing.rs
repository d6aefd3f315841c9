use georeg_core::{AttemptConfig, Image};
use image::DynamicImage;
use imageproc::filter::box_filter;

/// Grayscale conversion followed by a full-range contrast stretch, with an
/// opt-in box filter in between
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preprocessor {
    box_filter: Option<usize>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smooth with a `kernel_size` box filter before stretching;
    /// `kernel_size <= 1` leaves smoothing off
    pub fn with_box_filter(kernel_size: usize) -> Self {
        Self {
            box_filter: (kernel_size > 1).then_some(kernel_size),
        }
    }

    /// Smoothing only when the attempt asks for it
    pub fn for_attempt(attempt: &AttemptConfig) -> Self {
        if attempt.smooth {
            Self::with_box_filter(attempt.kernel_size)
        } else {
            Self::new()
        }
    }

    pub fn box_filter(&self) -> Option<usize> {
        self.box_filter
    }

    /// Accepts any colour type; the result is always single channel
    pub fn process(&self, image: &DynamicImage) -> Image {
        self.process_gray(&image.to_luma8())
    }

    pub fn process_gray(&self, gray: &Image) -> Image {
        match self.box_filter {
            Some(k) => {
                let radius = (k / 2) as u32;
                stretch_contrast(&box_filter(gray, radius, radius))
            }
            None => stretch_contrast(gray),
        }
    }
}

/// Linearly map the observed intensity range onto 0..=255.
///
/// A uniform image has no range to stretch and is returned unchanged.
pub fn stretch_contrast(gray: &Image) -> Image {
    let (lo, hi) = intensity_range(gray);
    if hi <= lo {
        return gray.clone();
    }

    let span = (hi - lo) as u32;
    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate().skip(lo as usize).take(span as usize + 1) {
        let shifted = v as u32 - lo as u32;
        *out = ((shifted * 255 + span / 2) / span) as u8;
    }
    for v in (hi as usize + 1)..256 {
        lut[v] = 255;
    }

    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p.0[0] = lut[p.0[0] as usize];
    }
    out
}

/// Smallest and largest intensity; (255, 0) for an empty image
pub fn intensity_range(gray: &Image) -> (u8, u8) {
    gray.pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])))
}
