//! 2D geometry operations on the XZ plane
//!
//! Points are passed as `&[f32]` slices holding at least `[x, y, z]`, which
//! lets callers hand out sub-slices of flat vertex buffers without copying.
//! The Y component is ignored unless stated otherwise.

/// Twice the signed area of the triangle `abc` projected on the XZ plane.
///
/// Positive when `c` lies to the right of `a -> b` looking down the Y axis.
#[inline]
pub fn tri_area_2d(a: &[f32], b: &[f32], c: &[f32]) -> f32 {
    let abx = b[0] - a[0];
    let abz = b[2] - a[2];
    let acx = c[0] - a[0];
    let acz = c[2] - a[2];
    acx * abz - abx * acz
}

/// Check if two axis-aligned bounding boxes overlap. Touching boxes overlap.
#[inline]
pub fn overlap_bounds(amin: &[f32], amax: &[f32], bmin: &[f32], bmax: &[f32]) -> bool {
    amin[0] <= bmax[0]
        && amax[0] >= bmin[0]
        && amin[1] <= bmax[1]
        && amax[1] >= bmin[1]
        && amin[2] <= bmax[2]
        && amax[2] >= bmin[2]
}

/// Squared distance from `p` to segment `ab` on the XZ plane, along with the
/// parametric position of the closest point on the segment.
pub fn dist_point_segment_sqr_2d(p: &[f32], a: &[f32], b: &[f32]) -> (f32, f32) {
    let pqx = b[0] - a[0];
    let pqz = b[2] - a[2];
    let mut dx = p[0] - a[0];
    let mut dz = p[2] - a[2];
    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);
    dx = a[0] + t * pqx - p[0];
    dz = a[2] + t * pqz - p[2];
    (dx * dx + dz * dz, t)
}

/// Point-in-polygon test on the XZ plane using the crossing rule.
///
/// `verts` is a flat `[x, y, z]` buffer holding `nverts` vertices.
pub fn point_in_polygon_2d(p: &[f32], verts: &[f32], nverts: usize) -> bool {
    let mut inside = false;
    let mut j = nverts.wrapping_sub(1);
    for i in 0..nverts {
        let vi = &verts[i * 3..i * 3 + 3];
        let vj = &verts[j * 3..j * 3 + 3];
        if ((vi[2] > p[2]) != (vj[2] > p[2]))
            && (p[0] < (vj[0] - vi[0]) * (p[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Height of the triangle `abc` below or above `p`, if `p` projects inside it.
pub fn closest_height_point_triangle(p: &[f32], a: &[f32], b: &[f32], c: &[f32]) -> Option<f32> {
    const EPS: f32 = 1e-6;

    let v0 = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let v1 = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v2 = [p[0] - a[0], p[1] - a[1], p[2] - a[2]];

    // Barycentric coordinates on the XZ plane
    let denom = v0[0] * v1[2] - v0[2] * v1[0];
    if denom.abs() < EPS {
        return None;
    }

    let mut u = v1[2] * v2[0] - v1[0] * v2[2];
    let mut v = v0[0] * v2[2] - v0[2] * v2[0];

    if denom < 0.0 {
        u = -u;
        v = -v;
    }
    let denom = denom.abs();

    if u >= 0.0 && v >= 0.0 && (u + v) <= denom {
        Some(a[1] + (v0[1] * u + v1[1] * v) / denom)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: [f32; 12] = [0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 2.0, 0.0, 2.0, 2.0, 0.0, 0.0];

    #[test]
    fn test_point_in_polygon() {
        assert!(point_in_polygon_2d(&[1.0, 0.0, 1.0], &SQUARE, 4));
        assert!(!point_in_polygon_2d(&[3.0, 0.0, 1.0], &SQUARE, 4));
    }

    #[test]
    fn test_segment_distance_clamps() {
        let (d, t) = dist_point_segment_sqr_2d(&[-1.0, 5.0, 0.0], &[0.0, 0.0, 0.0], &[2.0, 0.0, 0.0]);
        assert_eq!(t, 0.0);
        assert!((d - 1.0).abs() < 1e-6);

        let (d, t) = dist_point_segment_sqr_2d(&[1.0, 0.0, 1.0], &[0.0, 0.0, 0.0], &[2.0, 0.0, 0.0]);
        assert!((t - 0.5).abs() < 1e-6);
        assert!((d - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_closest_height_on_sloped_triangle() {
        let a = [0.0, 0.0, 0.0];
        let b = [0.0, 2.0, 2.0];
        let c = [2.0, 0.0, 0.0];
        let h = closest_height_point_triangle(&[0.5, 10.0, 1.0], &a, &b, &c).unwrap();
        assert!((h - 1.0).abs() < 1e-5);
        assert!(closest_height_point_triangle(&[5.0, 0.0, 5.0], &a, &b, &c).is_none());
    }

    #[test]
    fn test_overlap_bounds_touching() {
        assert!(overlap_bounds(&[0.0; 3], &[1.0; 3], &[1.0; 3], &[2.0; 3]));
        assert!(!overlap_bounds(&[0.0; 3], &[1.0; 3], &[1.1, 0.0, 0.0], &[2.0; 3]));
    }
}
