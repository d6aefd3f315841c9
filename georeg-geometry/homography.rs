//! Normalised direct linear transform and reprojection helpers.

use crate::error::{GeometryError, GeometryResult};
use nalgebra::{DMatrix, Matrix3, Vector3};

pub type Point = [f64; 2];

/// Sine of the smallest angle three sample points may form
const COLLINEAR_EPS: f64 = 1e-3;

/// Project a point through `h`; `None` when it maps to infinity
pub fn project(h: &Matrix3<f64>, p: &Point) -> Option<Point> {
    let v = h * Vector3::new(p[0], p[1], 1.0);
    if v[2].abs() < 1e-12 {
        return None;
    }
    Some([v[0] / v[2], v[1] / v[2]])
}

/// Euclidean distance between `project(h, src)` and `dst`. Points sent to
/// infinity have infinite error.
pub fn reprojection_error(h: &Matrix3<f64>, src: &Point, dst: &Point) -> f64 {
    match project(h, src) {
        Some(p) => (p[0] - dst[0]).hypot(p[1] - dst[1]),
        None => f64::INFINITY,
    }
}

/// Similarity moving the centroid to the origin with mean distance sqrt(2)
fn normalize_points(pts: &[Point]) -> GeometryResult<(Matrix3<f64>, Vec<Point>)> {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_dist = pts.iter().map(|p| (p[0] - cx).hypot(p[1] - cy)).sum::<f64>() / n;
    if !mean_dist.is_finite() || mean_dist < 1e-12 {
        return Err(GeometryError::Degenerate);
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts.iter().map(|p| [s * (p[0] - cx), s * (p[1] - cy)]).collect();
    Ok((t, normalized))
}

/// Homography `h` with `dst ~ h * src` from four or more correspondences,
/// scaled so that `h[(2, 2)] == 1`.
pub fn estimate_dlt(src: &[Point], dst: &[Point]) -> GeometryResult<Matrix3<f64>> {
    if src.len() != dst.len() {
        return Err(GeometryError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    let n = src.len();
    if n < 4 {
        return Err(GeometryError::TooFewPoints { needed: 4, got: n });
    }

    let (t_src, src_n) = normalize_points(src)?;
    let (t_dst, dst_n) = normalize_points(dst)?;

    // Pad to at least 9 rows so the thin SVD keeps the null vector
    let rows = (2 * n).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (i, (s, d)) in src_n.iter().zip(&dst_n).enumerate() {
        let (x, y) = (s[0], s[1]);
        let (u, v) = (d[0], d[1]);
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(GeometryError::Numerical("SVD did not converge"))?;
    let smallest = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .ok_or(GeometryError::Numerical("empty SVD"))?;
    let h_vec = v_t.row(smallest);
    let h_norm = Matrix3::from_fn(|r, c| h_vec[3 * r + c]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or(GeometryError::Numerical("normalisation not invertible"))?;
    let h = t_dst_inv * h_norm * t_src;

    let scale = h[(2, 2)];
    if !scale.is_finite() || scale.abs() < 1e-12 {
        return Err(GeometryError::Numerical("homography has zero scale"));
    }
    Ok(h / scale)
}

/// True when any three of the points are (nearly) collinear or coincide
pub fn is_degenerate_sample(pts: &[Point]) -> bool {
    let n = pts.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let a = [pts[j][0] - pts[i][0], pts[j][1] - pts[i][1]];
                let b = [pts[k][0] - pts[i][0], pts[k][1] - pts[i][1]];
                let la = a[0].hypot(a[1]);
                let lb = b[0].hypot(b[1]);
                if la < 1e-9 || lb < 1e-9 {
                    return true;
                }
                let cross = a[0] * b[1] - a[1] * b[0];
                if cross.abs() < COLLINEAR_EPS * la * lb {
                    return true;
                }
            }
        }
    }
    false
}
