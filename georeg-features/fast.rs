use georeg_core::Image;
use rayon::prelude::*;

/// Bresenham circle of radius 3 used by the segment test
pub const FAST_OFFSETS: [(i32, i32); 16] = [
    (0, -3), (1, -3), (2, -2), (3, -1),
    (3, 0), (3, 1), (2, 2), (1, 3),
    (0, 3), (-1, 3), (-2, 2), (-3, 1),
    (-3, 0), (-3, -1), (-2, -2), (-1, -3),
];

/// Contiguous arc length required by FAST-9
pub const ARC_LENGTH: usize = 9;

/// Corner candidate in level coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// True when the circular 16-bit mask holds a run of at least `min_count` set bits
pub fn has_consecutive_bits(mask: u16, min_count: usize) -> bool {
    if min_count > 16 || min_count == 0 {
        return false;
    }
    let mut test_mask = mask;
    for i in 1..min_count {
        test_mask &= mask.rotate_left(i as u32);
        if test_mask == 0 {
            return false;
        }
    }
    test_mask != 0
}

#[inline]
fn circle(img: &Image, x: u32, y: u32) -> [i16; 16] {
    let mut ring = [0i16; 16];
    for (v, &(dx, dy)) in ring.iter_mut().zip(FAST_OFFSETS.iter()) {
        *v = img.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32).0[0] as i16;
    }
    ring
}

/// Segment test score: the largest contrast by which a contiguous arc
/// exceeds the centre; 0 when `(x, y)` is not a corner at `threshold`.
/// `(x, y)` must lie at least 3 pixels inside the image.
pub fn corner_score(img: &Image, x: u32, y: u32, threshold: u8) -> f32 {
    let center = img.get_pixel(x, y).0[0] as i16;
    let ring = circle(img, x, y);
    let t = threshold as i16;

    let mut brighter: u16 = 0;
    let mut darker: u16 = 0;
    for (i, &p) in ring.iter().enumerate() {
        if p > center + t {
            brighter |= 1 << i;
        } else if p < center - t {
            darker |= 1 << i;
        }
    }
    let is_bright = has_consecutive_bits(brighter, ARC_LENGTH);
    let is_dark = has_consecutive_bits(darker, ARC_LENGTH);
    if !is_bright && !is_dark {
        return 0.0;
    }

    let mut best = 0i16;
    for start in 0..16 {
        let mut min_bright = i16::MAX;
        let mut min_dark = i16::MAX;
        for k in 0..ARC_LENGTH {
            let p = ring[(start + k) % 16];
            min_bright = min_bright.min(p - center);
            min_dark = min_dark.min(center - p);
        }
        if is_bright {
            best = best.max(min_bright);
        }
        if is_dark {
            best = best.max(min_dark);
        }
    }
    best as f32
}

/// FAST-9 detection with 3x3 non-maximum suppression on the score.
///
/// Rows are scanned in parallel; output order is row-major regardless.
pub fn detect(img: &Image, threshold: u8, border: u32) -> Vec<Corner> {
    let (w, h) = img.dimensions();
    let border = border.max(3);
    if w <= 2 * border || h <= 2 * border {
        return Vec::new();
    }

    let scores: Vec<Vec<f32>> = (0..h)
        .into_par_iter()
        .map(|y| {
            let mut row = vec![0.0f32; w as usize];
            if y >= border && y < h - border {
                for x in border..w - border {
                    row[x as usize] = corner_score(img, x, y, threshold);
                }
            }
            row
        })
        .collect();

    (border..h - border)
        .into_par_iter()
        .flat_map_iter(|y| {
            let scores = &scores;
            (border..w - border).filter_map(move |x| {
                let s = scores[y as usize][x as usize];
                if s <= 0.0 {
                    return None;
                }
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let n = scores[(y as i32 + dy) as usize][(x as i32 + dx) as usize];
                        // ties go to the earlier pixel in scan order
                        if n > s || (n == s && (dy < 0 || (dy == 0 && dx < 0))) {
                            return None;
                        }
                    }
                }
                Some(Corner { x, y, score: s })
            })
        })
        .collect()
}

/// Harris corner response over a `block x block` window of Sobel gradients
pub fn harris_response(img: &Image, x: u32, y: u32, block: u32) -> f32 {
    let (w, h) = img.dimensions();
    let r = (block / 2) as i32;
    if (x as i32) < r + 1 || (y as i32) < r + 1 || x as i32 + r + 1 >= w as i32 || y as i32 + r + 1 >= h as i32 {
        return 0.0;
    }

    let px = |x: i32, y: i32| img.get_pixel(x as u32, y as u32).0[0] as f32;
    let mut ixx = 0.0f64;
    let mut ixy = 0.0f64;
    let mut iyy = 0.0f64;
    for dy in -r..=r {
        for dx in -r..=r {
            let (cx, cy) = (x as i32 + dx, y as i32 + dy);
            let gx = px(cx + 1, cy - 1) + 2.0 * px(cx + 1, cy) + px(cx + 1, cy + 1)
                - px(cx - 1, cy - 1) - 2.0 * px(cx - 1, cy) - px(cx - 1, cy + 1);
            let gy = px(cx - 1, cy + 1) + 2.0 * px(cx, cy + 1) + px(cx + 1, cy + 1)
                - px(cx - 1, cy - 1) - 2.0 * px(cx, cy - 1) - px(cx + 1, cy - 1);
            let (gx, gy) = ((gx / 8.0) as f64, (gy / 8.0) as f64);
            ixx += gx * gx;
            ixy += gx * gy;
            iyy += gy * gy;
        }
    }

    // det(M) - k * trace(M)^2
    let k = 0.04f64;
    let det = ixx * iyy - ixy * ixy;
    let trace = ixx + iyy;
    (det - k * trace * trace) as f32
}

/// Orientation by the intensity centroid of a circular patch
pub fn intensity_centroid_angle(img: &Image, x: u32, y: u32, radius: i32) -> f32 {
    let (w, h) = img.dimensions();
    let mut m10 = 0i64;
    let mut m01 = 0i64;
    let r2 = radius * radius;
    for dy in -radius..=radius {
        let py = y as i32 + dy;
        if py < 0 || py >= h as i32 {
            continue;
        }
        for dx in -radius..=radius {
            let px = x as i32 + dx;
            if px < 0 || px >= w as i32 || dx * dx + dy * dy > r2 {
                continue;
            }
            let v = img.get_pixel(px as u32, py as u32).0[0] as i64;
            m10 += dx as i64 * v;
            m01 += dy as i64 * v;
        }
    }
    if m10 == 0 && m01 == 0 {
        0.0
    } else {
        (m01 as f32).atan2(m10 as f32)
    }
}
