//! Triangle rasterization into a heightfield
//!
//! Each triangle is clipped against the rows and then the columns of the grid
//! it overlaps. The vertical extent of every clipped piece becomes a span.

use glam::Vec3;
use recast_common::{Error, Result};

use crate::heightfield::{Heightfield, RC_SPAN_MAX_HEIGHT};

// A triangle clipped by two axis aligned planes has at most 7 vertices
const MAX_CLIP_VERTS: usize = 12;

type ClipBuf = [[f32; 3]; MAX_CLIP_VERTS];

/// Splits a convex polygon by the plane `v[axis] = x`.
///
/// Returns the vertex counts of the part below the plane (`out1`) and above
/// it (`out2`).
fn divide_poly(
    input: &ClipBuf,
    nin: usize,
    out1: &mut ClipBuf,
    out2: &mut ClipBuf,
    x: f32,
    axis: usize,
) -> (usize, usize) {
    let mut d = [0.0f32; MAX_CLIP_VERTS];
    for i in 0..nin {
        d[i] = x - input[i][axis];
    }

    let mut m = 0;
    let mut n = 0;
    let mut j = nin - 1;
    for i in 0..nin {
        let ina = d[j] >= 0.0;
        let inb = d[i] >= 0.0;
        if ina != inb {
            let s = d[j] / (d[j] - d[i]);
            let p = [
                input[j][0] + (input[i][0] - input[j][0]) * s,
                input[j][1] + (input[i][1] - input[j][1]) * s,
                input[j][2] + (input[i][2] - input[j][2]) * s,
            ];
            out1[m] = p;
            out2[n] = p;
            m += 1;
            n += 1;
            if d[i] > 0.0 {
                out1[m] = input[i];
                m += 1;
            } else if d[i] < 0.0 {
                out2[n] = input[i];
                n += 1;
            }
        } else {
            if d[i] >= 0.0 {
                out1[m] = input[i];
                m += 1;
                if d[i] != 0.0 {
                    j = i;
                    continue;
                }
            }
            out2[n] = input[i];
            n += 1;
        }
        j = i;
    }
    (m, n)
}

/// Rasterizes one triangle into the heightfield
pub fn rasterize_triangle(
    hf: &mut Heightfield,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    area: u8,
    flag_merge_thr: i32,
) {
    let bmin = hf.bmin;
    let bmax = hf.bmax;
    let cs = hf.cs;
    let ics = 1.0 / hf.cs;
    let ich = 1.0 / hf.ch;
    let w = hf.width;
    let h = hf.height;
    let by = bmax.y - bmin.y;

    let tmin = v0.min(v1).min(v2);
    let tmax = v0.max(v1).max(v2);
    if !recast_common::overlap_bounds(&tmin.to_array(), &tmax.to_array(), &bmin.to_array(), &bmax.to_array()) {
        return;
    }

    let z0 = (((tmin.z - bmin.z) * ics) as i32).clamp(-1, h - 1);
    let z1 = (((tmax.z - bmin.z) * ics) as i32).clamp(0, h - 1);

    let mut buf_in: ClipBuf = [[0.0; 3]; MAX_CLIP_VERTS];
    let mut buf_row: ClipBuf = [[0.0; 3]; MAX_CLIP_VERTS];
    let mut buf_rest: ClipBuf = [[0.0; 3]; MAX_CLIP_VERTS];
    let mut buf_cell: ClipBuf = [[0.0; 3]; MAX_CLIP_VERTS];
    let mut buf_tmp: ClipBuf = [[0.0; 3]; MAX_CLIP_VERTS];

    buf_in[0] = v0.to_array();
    buf_in[1] = v1.to_array();
    buf_in[2] = v2.to_array();
    let mut nv_in = 3;

    for z in z0..=z1 {
        let cz = bmin.z + z as f32 * cs;
        let (nv_row, nv_rest) = divide_poly(&buf_in, nv_in, &mut buf_row, &mut buf_rest, cz + cs, 2);
        std::mem::swap(&mut buf_in, &mut buf_rest);
        nv_in = nv_rest;

        if nv_row < 3 || z < 0 {
            continue;
        }

        let mut min_x = buf_row[0][0];
        let mut max_x = buf_row[0][0];
        for v in &buf_row[1..nv_row] {
            min_x = min_x.min(v[0]);
            max_x = max_x.max(v[0]);
        }
        let x0 = ((min_x - bmin.x) * ics) as i32;
        let x1 = ((max_x - bmin.x) * ics) as i32;
        if x1 < 0 || x0 >= w {
            continue;
        }
        let x0 = x0.clamp(-1, w - 1);
        let x1 = x1.clamp(0, w - 1);

        let mut nv_row_left = nv_row;
        for x in x0..=x1 {
            let cx = bmin.x + x as f32 * cs;
            let (nv_cell, nv_rest) =
                divide_poly(&buf_row, nv_row_left, &mut buf_cell, &mut buf_tmp, cx + cs, 0);
            std::mem::swap(&mut buf_row, &mut buf_tmp);
            nv_row_left = nv_rest;

            if nv_cell < 3 || x < 0 {
                continue;
            }

            let mut smin = buf_cell[0][1];
            let mut smax = buf_cell[0][1];
            for v in &buf_cell[1..nv_cell] {
                smin = smin.min(v[1]);
                smax = smax.max(v[1]);
            }
            smin -= bmin.y;
            smax -= bmin.y;
            if smax < 0.0 || smin > by {
                continue;
            }
            let smin = smin.max(0.0);
            let smax = smax.min(by);

            let ismin = ((smin * ich).floor() as i32).clamp(0, RC_SPAN_MAX_HEIGHT);
            let ismax = ((smax * ich).ceil() as i32).clamp(ismin + 1, RC_SPAN_MAX_HEIGHT);

            hf.add_span(x, z, ismin as u16, ismax as u16, area, flag_merge_thr);
        }
    }
}

/// Rasterizes an indexed triangle list with one area id per triangle
pub fn rasterize_triangles(
    hf: &mut Heightfield,
    verts: &[f32],
    tris: &[i32],
    areas: &[u8],
    flag_merge_thr: i32,
) -> Result<()> {
    if areas.len() * 3 != tris.len() {
        return Err(Error::Recast(format!(
            "{} area ids for {} triangles",
            areas.len(),
            tris.len() / 3
        )));
    }
    let nverts = verts.len() / 3;
    for (tri, &area) in tris.chunks_exact(3).zip(areas) {
        if tri.iter().any(|&i| i < 0 || i as usize >= nverts) {
            return Err(Error::Recast("triangle index out of range".to_string()));
        }
        let v = |i: i32| Vec3::from_slice(&verts[i as usize * 3..i as usize * 3 + 3]);
        rasterize_triangle(hf, v(tri[0]), v(tri[1]), v(tri[2]), area, flag_merge_thr);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RC_WALKABLE_AREA;

    #[test]
    fn test_flat_quad_fills_every_cell() {
        let mut hf = Heightfield::new(4, 4, Vec3::ZERO, Vec3::new(4.0, 2.0, 4.0), 1.0, 0.5);
        let verts = [0.0, 1.0, 0.0, 0.0, 1.0, 4.0, 4.0, 1.0, 4.0, 4.0, 1.0, 0.0];
        let tris = [0, 1, 2, 0, 2, 3];
        rasterize_triangles(&mut hf, &verts, &tris, &[RC_WALKABLE_AREA; 2], 1).unwrap();

        for z in 0..4 {
            for x in 0..4 {
                let spans: Vec<_> = hf.column(x, z).collect();
                assert_eq!(spans.len(), 1, "cell {x},{z}");
                assert_eq!(spans[0].smin, 2);
                assert_eq!(spans[0].smax, 3);
                assert_eq!(spans[0].area, RC_WALKABLE_AREA);
            }
        }
    }

    #[test]
    fn test_triangle_outside_bounds_is_ignored() {
        let mut hf = Heightfield::new(2, 2, Vec3::ZERO, Vec3::new(2.0, 2.0, 2.0), 1.0, 0.5);
        let verts = [10.0, 0.0, 10.0, 10.0, 0.0, 11.0, 11.0, 0.0, 10.0];
        rasterize_triangles(&mut hf, &verts, &[0, 1, 2], &[RC_WALKABLE_AREA], 1).unwrap();
        assert_eq!(hf.span_count(), 0);
    }

    #[test]
    fn test_area_count_mismatch_is_an_error() {
        let mut hf = Heightfield::new(2, 2, Vec3::ZERO, Vec3::new(2.0, 2.0, 2.0), 1.0, 0.5);
        let verts = [0.0; 9];
        assert!(rasterize_triangles(&mut hf, &verts, &[0, 1, 2], &[], 1).is_err());
    }

    #[test]
    fn test_divide_poly_splits_triangle() {
        let mut input: ClipBuf = [[0.0; 3]; MAX_CLIP_VERTS];
        input[0] = [0.0, 0.0, 0.0];
        input[1] = [2.0, 0.0, 0.0];
        input[2] = [0.0, 0.0, 2.0];
        let mut a: ClipBuf = [[0.0; 3]; MAX_CLIP_VERTS];
        let mut b: ClipBuf = [[0.0; 3]; MAX_CLIP_VERTS];
        let (m, n) = divide_poly(&input, 3, &mut a, &mut b, 1.0, 0);
        assert_eq!(m, 4);
        assert_eq!(n, 3);
    }
}
