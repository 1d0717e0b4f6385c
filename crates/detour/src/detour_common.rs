//! Common vector and polygon helpers for Detour
//!
//! Points are `[f32; 3]` or flat `[x, y, z]` slices. The `_2d` helpers work on
//! the XZ plane.

/// Returns the distance between two points
#[inline]
pub fn dt_vdist(v1: &[f32; 3], v2: &[f32; 3]) -> f32 {
    dt_vdist_sqr(v1, v2).sqrt()
}

/// Returns the square of the distance between two points
#[inline]
pub fn dt_vdist_sqr(v1: &[f32; 3], v2: &[f32; 3]) -> f32 {
    let dx = v2[0] - v1[0];
    let dy = v2[1] - v1[1];
    let dz = v2[2] - v1[2];
    dx * dx + dy * dy + dz * dz
}

/// Linear interpolation between `v1` and `v2`
#[inline]
pub fn dt_vlerp(v1: &[f32], v2: &[f32], t: f32) -> [f32; 3] {
    [
        v1[0] + (v2[0] - v1[0]) * t,
        v1[1] + (v2[1] - v1[1]) * t,
        v1[2] + (v2[2] - v1[2]) * t,
    ]
}

/// Performs a 'sloppy' colocation check of the specified points
#[inline]
pub fn dt_vequal(p0: &[f32; 3], p1: &[f32; 3]) -> bool {
    const THR: f32 = 1.0 / 16384.0;
    dt_vdist_sqr(p0, p1) < THR * THR
}

/// Copies the first three components of a slice
#[inline]
pub fn dt_vcopy(v: &[f32]) -> [f32; 3] {
    [v[0], v[1], v[2]]
}

/// Derives the signed xz-plane area of the triangle ABC
#[inline]
pub fn dt_tri_area_2d(a: &[f32], b: &[f32], c: &[f32]) -> f32 {
    recast_common::tri_area_2d(a, b, c)
}

/// Returns the opposite tile direction
#[inline]
pub fn dt_opposite_tile(side: i32) -> i32 {
    (side + 4) & 0x7
}

/// Neighbour tile offset for a compass side (0: +x, 2: +z, 4: -x, 6: -z)
#[inline]
pub(crate) fn dt_side_offset(side: i32) -> (i32, i32) {
    match side & 0x7 {
        0 => (1, 0),
        1 => (1, 1),
        2 => (0, 1),
        3 => (-1, 1),
        4 => (-1, 0),
        5 => (-1, -1),
        6 => (0, -1),
        _ => (1, -1),
    }
}

/// Determines if the specified point is inside the convex polygon on the xz-plane
#[inline]
pub fn dt_point_in_polygon(pt: &[f32], verts: &[f32], nverts: usize) -> bool {
    recast_common::point_in_polygon_2d(pt, verts, nverts)
}

/// Derives the centroid of a polygon
pub fn dt_calc_poly_center(idx: &[u16], verts: &[f32]) -> [f32; 3] {
    let mut c = [0.0; 3];
    for &i in idx {
        let v = &verts[i as usize * 3..i as usize * 3 + 3];
        c[0] += v[0];
        c[1] += v[1];
        c[2] += v[2];
    }
    let s = 1.0 / idx.len().max(1) as f32;
    [c[0] * s, c[1] * s, c[2] * s]
}

/// Slab end points of a portal edge, as `(u, y)` pairs sorted by `u`.
///
/// `u` runs along z for sides 0/4 and along x for sides 2/6.
pub(crate) fn dt_calc_slab_end_points(va: &[f32], vb: &[f32], side: i32) -> ([f32; 2], [f32; 2]) {
    let axis = if side == 0 || side == 4 { 2 } else { 0 };
    if va[axis] < vb[axis] {
        ([va[axis], va[1]], [vb[axis], vb[1]])
    } else {
        ([vb[axis], vb[1]], [va[axis], va[1]])
    }
}

/// Coordinate across the portal line: x for sides 0/4, z for sides 2/6
#[inline]
pub(crate) fn dt_get_slab_coord(va: &[f32], side: i32) -> f32 {
    if side == 0 || side == 4 {
        va[0]
    } else {
        va[2]
    }
}

/// Whether two portal slabs overlap along `u` by more than `px` and are within
/// `py` of each other vertically.
pub(crate) fn dt_overlap_slabs(amin: [f32; 2], amax: [f32; 2], bmin: [f32; 2], bmax: [f32; 2], px: f32, py: f32) -> bool {
    let minx = (amin[0] + px).max(bmin[0] + px);
    let maxx = (amax[0] - px).min(bmax[0] - px);
    if minx > maxx {
        return false;
    }

    let line = |lo: [f32; 2], hi: [f32; 2]| {
        let du = hi[0] - lo[0];
        let d = if du.abs() > f32::EPSILON { (hi[1] - lo[1]) / du } else { 0.0 };
        (d, lo[1] - d * lo[0])
    };
    let (ad, ak) = line(amin, amax);
    let (bd, bk) = line(bmin, bmax);
    let dmin = (bd * minx + bk) - (ad * minx + ak);
    let dmax = (bd * maxx + bk) - (ad * maxx + ak);

    // Crossing segments always overlap
    if dmin * dmax < 0.0 {
        return true;
    }
    let thr = (py * 2.0) * (py * 2.0);
    dmin * dmin <= thr || dmax * dmax <= thr
}
