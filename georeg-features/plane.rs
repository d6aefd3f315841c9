use georeg_core::Image;
use image::{ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use imageproc::map::map_colors2;

/// Single channel floating point image
pub type Plane = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Scale-space helpers on top of [`Plane`]
pub trait PlaneExt: Sized {
    /// Intensities scaled into [0, 1]
    fn from_gray(img: &Image) -> Self;

    /// Back to 8 bits, assuming values in [0, 1]
    fn to_gray(&self) -> Image;

    /// (width, height) as indices
    fn size(&self) -> (usize, usize);

    fn at(&self, x: usize, y: usize) -> f32;

    fn put(&mut self, x: usize, y: usize, v: f32);

    /// Border-replicating access
    fn clamped(&self, x: isize, y: isize) -> f32;

    /// Bilinear sample at fractional coordinates
    fn sample(&self, x: f32, y: f32) -> f32;

    /// Gaussian blur; a non-positive sigma returns a copy
    fn blurred(&self, sigma: f32) -> Self;

    /// Halve both dimensions by averaging 2x2 blocks
    fn downsample_half(&self) -> Self;

    /// Element-wise `self - other`
    fn subtract(&self, other: &Self) -> Self;

    /// Central-difference gradient (dx, dy)
    fn gradient(&self, x: usize, y: usize) -> (f32, f32);
}

impl PlaneExt for Plane {
    fn from_gray(img: &Image) -> Self {
        Plane::from_fn(img.width(), img.height(), |x, y| Luma([img.get_pixel(x, y).0[0] as f32 / 255.0]))
    }

    fn to_gray(&self) -> Image {
        Image::from_fn(self.width(), self.height(), |x, y| {
            Luma([(self.get_pixel(x, y).0[0] * 255.0).round().clamp(0.0, 255.0) as u8])
        })
    }

    #[inline]
    fn size(&self) -> (usize, usize) {
        (self.width() as usize, self.height() as usize)
    }

    #[inline]
    fn at(&self, x: usize, y: usize) -> f32 {
        self.as_raw()[y * self.width() as usize + x]
    }

    #[inline]
    fn put(&mut self, x: usize, y: usize, v: f32) {
        self.put_pixel(x as u32, y as u32, Luma([v]));
    }

    #[inline]
    fn clamped(&self, x: isize, y: isize) -> f32 {
        let (w, h) = self.size();
        let x = x.clamp(0, w as isize - 1) as usize;
        let y = y.clamp(0, h as isize - 1) as usize;
        self.as_raw()[y * w + x]
    }

    fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as isize, y0 as isize);

        let top = self.clamped(x0, y0) * (1.0 - fx) + self.clamped(x0 + 1, y0) * fx;
        let bottom = self.clamped(x0, y0 + 1) * (1.0 - fx) + self.clamped(x0 + 1, y0 + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    fn blurred(&self, sigma: f32) -> Self {
        if sigma > 0.0 {
            gaussian_blur_f32(self, sigma)
        } else {
            self.clone()
        }
    }

    fn downsample_half(&self) -> Self {
        let w = (self.width() / 2).max(1);
        let h = (self.height() / 2).max(1);
        Plane::from_fn(w, h, |x, y| {
            let (sx, sy) = (2 * x as isize, 2 * y as isize);
            let v = self.clamped(sx, sy)
                + self.clamped(sx + 1, sy)
                + self.clamped(sx, sy + 1)
                + self.clamped(sx + 1, sy + 1);
            Luma([v * 0.25])
        })
    }

    fn subtract(&self, other: &Self) -> Self {
        map_colors2(self, other, |a: Luma<f32>, b: Luma<f32>| Luma([a.0[0] - b.0[0]]))
    }

    #[inline]
    fn gradient(&self, x: usize, y: usize) -> (f32, f32) {
        let (x, y) = (x as isize, y as isize);
        (
            0.5 * (self.clamped(x + 1, y) - self.clamped(x - 1, y)),
            0.5 * (self.clamped(x, y + 1) - self.clamped(x, y - 1)),
        )
    }
}
