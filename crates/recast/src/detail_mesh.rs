//! Detail mesh: per polygon triangle meshes that follow the sampled surface
//! height more closely than the convex polygons do.

use std::collections::VecDeque;

use recast_common::{Error, Result};

use crate::polymesh::count_poly_verts;
use crate::{
    get_dir_for_offset, get_dir_offset_x, get_dir_offset_y, CompactHeightfield, PolyMesh, RC_MESH_NULL_IDX,
    RC_MULTIPLE_REGS, RC_NOT_CONNECTED,
};

const RC_UNSET_HEIGHT: u16 = 0xffff;
const MAX_VERTS: usize = 127;
const MAX_TRIS: usize = 255;
const MAX_VERTS_PER_EDGE: usize = 32;

const EV_UNDEF: i32 = -1;
const EV_HULL: i32 = -2;

/// Flag set on detail triangle edges that lie on the polygon boundary
pub const RC_DETAIL_EDGE_BOUNDARY: u8 = 0x1;

/// Detail triangles of every polygon of a [`PolyMesh`]
#[derive(Debug, Clone, Default)]
pub struct PolyMeshDetail {
    /// Sub-mesh per polygon: `[vert base, vert count, tri base, tri count]`
    pub meshes: Vec<u32>,
    /// Vertices in world units, `[x, y, z]` each
    pub verts: Vec<f32>,
    /// Triangles, `[a, b, c, edge flags]` each, indices local to the sub-mesh
    pub tris: Vec<u8>,
}

impl PolyMeshDetail {
    /// Number of sub-meshes
    pub fn nmeshes(&self) -> usize {
        self.meshes.len() / 4
    }

    /// Number of vertices
    pub fn nverts(&self) -> usize {
        self.verts.len() / 3
    }

    /// Number of triangles
    pub fn ntris(&self) -> usize {
        self.tris.len() / 4
    }

    /// Sub-mesh header of polygon `i`
    pub fn mesh(&self, i: usize) -> [u32; 4] {
        [self.meshes[i * 4], self.meshes[i * 4 + 1], self.meshes[i * 4 + 2], self.meshes[i * 4 + 3]]
    }
}

struct HeightPatch {
    data: Vec<u16>,
    xmin: i32,
    zmin: i32,
    width: i32,
    height: i32,
}

impl HeightPatch {
    #[inline]
    fn at(&self, x: i32, z: i32) -> u16 {
        self.data[(x + z * self.width) as usize]
    }

    #[inline]
    fn set(&mut self, x: i32, z: i32, h: u16) {
        self.data[(x + z * self.width) as usize] = h;
    }

    fn reset(&mut self, value: u16) {
        let n = (self.width * self.height) as usize;
        self.data.clear();
        self.data.resize(n, value);
    }
}

#[inline]
fn vdot2(a: &[f32], b: &[f32]) -> f32 {
    a[0] * b[0] + a[2] * b[2]
}

#[inline]
fn vdist_sq2(p: &[f32], q: &[f32]) -> f32 {
    let dx = q[0] - p[0];
    let dz = q[2] - p[2];
    dx * dx + dz * dz
}

#[inline]
fn vdist2(p: &[f32], q: &[f32]) -> f32 {
    vdist_sq2(p, q).sqrt()
}

#[inline]
fn vcross2(p1: &[f32], p2: &[f32], p3: &[f32]) -> f32 {
    let u1 = p2[0] - p1[0];
    let v1 = p2[2] - p1[2];
    let u2 = p3[0] - p1[0];
    let v2 = p3[2] - p1[2];
    u1 * v2 - v1 * u2
}

#[inline]
fn pt(verts: &[f32], i: usize) -> &[f32] {
    &verts[i * 3..i * 3 + 3]
}

fn circum_circle(p1: &[f32], p2: &[f32], p3: &[f32]) -> ([f32; 3], f32) {
    const EPS: f32 = 1e-6;
    // Relative to p1 for precision
    let v1 = [0.0f32; 3];
    let v2 = [p2[0] - p1[0], p2[1] - p1[1], p2[2] - p1[2]];
    let v3 = [p3[0] - p1[0], p3[1] - p1[1], p3[2] - p1[2]];

    let cp = vcross2(&v1, &v2, &v3);
    if cp.abs() > EPS {
        let v1_sq = vdot2(&v1, &v1);
        let v2_sq = vdot2(&v2, &v2);
        let v3_sq = vdot2(&v3, &v3);
        let mut c = [
            (v1_sq * (v2[2] - v3[2]) + v2_sq * (v3[2] - v1[2]) + v3_sq * (v1[2] - v2[2])) / (2.0 * cp),
            0.0,
            (v1_sq * (v3[0] - v2[0]) + v2_sq * (v1[0] - v3[0]) + v3_sq * (v2[0] - v1[0])) / (2.0 * cp),
        ];
        let r = vdist2(&c, &v1);
        c[0] += p1[0];
        c[1] += p1[1];
        c[2] += p1[2];
        return (c, r);
    }
    ([p1[0], p1[1], p1[2]], 0.0)
}

fn dist_pt_tri(p: &[f32], a: &[f32], b: &[f32], c: &[f32]) -> f32 {
    let v0 = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let v1 = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v2 = [p[0] - a[0], p[1] - a[1], p[2] - a[2]];

    let dot00 = vdot2(&v0, &v0);
    let dot01 = vdot2(&v0, &v1);
    let dot02 = vdot2(&v0, &v2);
    let dot11 = vdot2(&v1, &v1);
    let dot12 = vdot2(&v1, &v2);

    let inv_denom = 1.0 / (dot00 * dot11 - dot01 * dot01);
    let u = (dot11 * dot02 - dot01 * dot12) * inv_denom;
    let v = (dot00 * dot12 - dot01 * dot02) * inv_denom;

    const EPS: f32 = 1e-4;
    if u >= -EPS && v >= -EPS && (u + v) <= 1.0 + EPS {
        let y = a[1] + v0[1] * u + v1[1] * v;
        return (y - p[1]).abs();
    }
    f32::MAX
}

fn distance_pt_seg(p: &[f32], a: &[f32], b: &[f32]) -> f32 {
    let pq = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let d = [p[0] - a[0], p[1] - a[1], p[2] - a[2]];
    let len = pq[0] * pq[0] + pq[1] * pq[1] + pq[2] * pq[2];
    let mut t = pq[0] * d[0] + pq[1] * d[1] + pq[2] * d[2];
    if len > 0.0 {
        t /= len;
    }
    let t = t.clamp(0.0, 1.0);
    let dx = a[0] + t * pq[0] - p[0];
    let dy = a[1] + t * pq[1] - p[1];
    let dz = a[2] + t * pq[2] - p[2];
    dx * dx + dy * dy + dz * dz
}

fn distance_pt_seg_2d(p: &[f32], a: &[f32], b: &[f32]) -> f32 {
    let pqx = b[0] - a[0];
    let pqz = b[2] - a[2];
    let dx = p[0] - a[0];
    let dz = p[2] - a[2];
    let len = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if len > 0.0 {
        t /= len;
    }
    let t = t.clamp(0.0, 1.0);
    let dx = a[0] + t * pqx - p[0];
    let dz = a[2] + t * pqz - p[2];
    dx * dx + dz * dz
}

fn dist_to_tri_mesh(p: &[f32], verts: &[f32], tris: &[i32]) -> Option<f32> {
    let dmin = tris
        .chunks_exact(4)
        .map(|t| {
            dist_pt_tri(
                p,
                pt(verts, t[0] as usize),
                pt(verts, t[1] as usize),
                pt(verts, t[2] as usize),
            )
        })
        .fold(f32::MAX, f32::min);
    (dmin != f32::MAX).then_some(dmin)
}

/// Signed 2D distance to the polygon outline, negative inside
fn dist_to_poly(nvert: usize, verts: &[f32], p: &[f32]) -> f32 {
    let mut dmin = f32::MAX;
    let mut inside = false;
    let mut j = nvert - 1;
    for i in 0..nvert {
        let vi = pt(verts, i);
        let vj = pt(verts, j);
        if (vi[2] > p[2]) != (vj[2] > p[2])
            && p[0] < (vj[0] - vi[0]) * (p[2] - vi[2]) / (vj[2] - vi[2]) + vi[0]
        {
            inside = !inside;
        }
        dmin = dmin.min(distance_pt_seg_2d(p, vj, vi));
        j = i;
    }
    if inside {
        -dmin
    } else {
        dmin
    }
}

fn get_height(fx: f32, fy: f32, fz: f32, ics: f32, ch: f32, radius: i32, hp: &HeightPatch) -> u16 {
    let ix = ((fx * ics + 0.01).floor() as i32 - hp.xmin).clamp(0, hp.width - 1);
    let iz = ((fz * ics + 0.01).floor() as i32 - hp.zmin).clamp(0, hp.height - 1);
    let mut h = hp.at(ix, iz);
    if h != RC_UNSET_HEIGHT {
        return h;
    }

    // Spiral outwards until a ring contains a sample, keep the closest height
    let (mut x, mut z, mut dx, mut dz) = (1i32, 0i32, 1i32, 0i32);
    let max_size = radius * 2 + 1;
    let max_iter = max_size * max_size - 1;
    let mut next_ring_iter_start = 8;
    let mut next_ring_iters = 16;
    let mut dmin = f32::MAX;

    for i in 0..max_iter {
        let nx = ix + x;
        let nz = iz + z;
        if nx >= 0 && nz >= 0 && nx < hp.width && nz < hp.height {
            let nh = hp.at(nx, nz);
            if nh != RC_UNSET_HEIGHT {
                let d = (nh as f32 * ch - fy).abs();
                if d < dmin {
                    h = nh;
                    dmin = d;
                }
            }
        }

        if i + 1 == next_ring_iter_start {
            if h != RC_UNSET_HEIGHT {
                break;
            }
            next_ring_iter_start += next_ring_iters;
            next_ring_iters += 8;
        }

        if x == z || (x < 0 && x == -z) || (x > 0 && x == 1 - z) {
            let tmp = dx;
            dx = -dz;
            dz = tmp;
        }
        x += dx;
        z += dz;
    }
    h
}

fn find_edge(edges: &[[i32; 4]], s: i32, t: i32) -> Option<usize> {
    edges
        .iter()
        .position(|e| (e[0] == s && e[1] == t) || (e[0] == t && e[1] == s))
}

fn add_edge(edges: &mut Vec<[i32; 4]>, max_edges: usize, s: i32, t: i32, l: i32, r: i32) -> Result<()> {
    if edges.len() >= max_edges {
        return Err(Error::Recast(format!("too many detail edges ({} / {max_edges})", edges.len())));
    }
    if find_edge(edges, s, t).is_none() {
        edges.push([s, t, l, r]);
    }
    Ok(())
}

fn update_left_face(e: &mut [i32; 4], s: i32, t: i32, f: i32) {
    if e[0] == s && e[1] == t && e[2] == EV_UNDEF {
        e[2] = f;
    } else if e[1] == s && e[0] == t && e[3] == EV_UNDEF {
        e[3] = f;
    }
}

fn overlap_seg_seg_2d(a: &[f32], b: &[f32], c: &[f32], d: &[f32]) -> bool {
    let a1 = vcross2(a, b, d);
    let a2 = vcross2(a, b, c);
    if a1 * a2 < 0.0 {
        let a3 = vcross2(c, d, a);
        let a4 = a3 + a2 - a1;
        if a3 * a4 < 0.0 {
            return true;
        }
    }
    false
}

fn overlap_edges(pts: &[f32], edges: &[[i32; 4]], s1: i32, t1: i32) -> bool {
    edges.iter().any(|e| {
        let (s0, t0) = (e[0], e[1]);
        if s0 == s1 || s0 == t1 || t0 == s1 || t0 == t1 {
            return false;
        }
        overlap_seg_seg_2d(
            pt(pts, s0 as usize),
            pt(pts, t0 as usize),
            pt(pts, s1 as usize),
            pt(pts, t1 as usize),
        )
    })
}

fn complete_facet(
    pts: &[f32],
    npts: usize,
    edges: &mut Vec<[i32; 4]>,
    max_edges: usize,
    nfaces: &mut i32,
    e: usize,
) -> Result<()> {
    const EPS: f32 = 1e-5;

    let edge = edges[e];
    let (s, t) = if edge[2] == EV_UNDEF {
        (edge[0], edge[1])
    } else if edge[3] == EV_UNDEF {
        (edge[1], edge[0])
    } else {
        return Ok(());
    };

    // Find the best point on the left of the edge
    let mut best = npts;
    let mut c = [0.0f32; 3];
    let mut r = -1.0f32;
    for u in 0..npts {
        if u as i32 == s || u as i32 == t {
            continue;
        }
        let (ps, pt_t, pu) = (pt(pts, s as usize), pt(pts, t as usize), pt(pts, u));
        if vcross2(ps, pt_t, pu) > EPS {
            if r < 0.0 {
                best = u;
                (c, r) = circum_circle(ps, pt_t, pu);
                continue;
            }
            let d = vdist2(&c, pu);
            let tol = 0.001;
            if d > r * (1.0 + tol) {
                continue;
            } else if d < r * (1.0 - tol) {
                best = u;
                (c, r) = circum_circle(ps, pt_t, pu);
            } else {
                // On the circle, pick the point that does not create
                // overlapping edges
                if overlap_edges(pts, edges, s, u as i32) || overlap_edges(pts, edges, t, u as i32) {
                    continue;
                }
                best = u;
                (c, r) = circum_circle(ps, pt_t, pu);
            }
        }
    }

    if best < npts {
        let p = best as i32;
        update_left_face(&mut edges[e], s, t, *nfaces);

        match find_edge(edges, p, s) {
            None => add_edge(edges, max_edges, p, s, *nfaces, EV_UNDEF)?,
            Some(ei) => update_left_face(&mut edges[ei], p, s, *nfaces),
        }
        match find_edge(edges, t, p) {
            None => add_edge(edges, max_edges, t, p, *nfaces, EV_UNDEF)?,
            Some(ei) => update_left_face(&mut edges[ei], t, p, *nfaces),
        }
        *nfaces += 1;
    } else {
        update_left_face(&mut edges[e], s, t, EV_HULL);
    }
    Ok(())
}

fn delaunay_hull(npts: usize, pts: &[f32], hull: &[usize], tris: &mut Vec<i32>, edges: &mut Vec<[i32; 4]>) -> Result<()> {
    let mut nfaces = 0i32;
    let max_edges = npts * 10;
    edges.clear();

    let nhull = hull.len();
    let mut j = nhull - 1;
    for i in 0..nhull {
        add_edge(edges, max_edges, hull[j] as i32, hull[i] as i32, EV_HULL, EV_UNDEF)?;
        j = i;
    }

    let mut current = 0;
    while current < edges.len() {
        if edges[current][2] == EV_UNDEF {
            complete_facet(pts, npts, edges, max_edges, &mut nfaces, current)?;
        }
        if edges[current][3] == EV_UNDEF {
            complete_facet(pts, npts, edges, max_edges, &mut nfaces, current)?;
        }
        current += 1;
    }

    tris.clear();
    tris.resize(nfaces as usize * 4, -1);
    for e in edges.iter() {
        if e[3] >= 0 {
            let t = &mut tris[e[3] as usize * 4..e[3] as usize * 4 + 4];
            if t[0] == -1 {
                t[0] = e[0];
                t[1] = e[1];
            } else if t[0] == e[1] {
                t[2] = e[0];
            } else if t[1] == e[0] {
                t[2] = e[1];
            }
        }
        if e[2] >= 0 {
            let t = &mut tris[e[2] as usize * 4..e[2] as usize * 4 + 4];
            if t[0] == -1 {
                t[0] = e[1];
                t[1] = e[0];
            } else if t[0] == e[0] {
                t[2] = e[1];
            } else if t[1] == e[1] {
                t[2] = e[0];
            }
        }
    }

    let mut i = 0;
    while i < tris.len() / 4 {
        let t = &tris[i * 4..i * 4 + 4];
        if t[0] == -1 || t[1] == -1 || t[2] == -1 {
            log::warn!("removing dangling face {i} [{}, {}, {}]", t[0], t[1], t[2]);
            let last = tris.len() - 4;
            tris.copy_within(last..last + 4, i * 4);
            tris.truncate(last);
        } else {
            i += 1;
        }
    }
    Ok(())
}

/// Smallest over all edges of the largest distance of a vertex to that edge
fn poly_min_extent(verts: &[f32], nverts: usize) -> f32 {
    let mut min_dist = f32::MAX;
    for i in 0..nverts {
        let ni = (i + 1) % nverts;
        let p1 = pt(verts, i);
        let p2 = pt(verts, ni);
        let max_edge_dist = (0..nverts)
            .filter(|&j| j != i && j != ni)
            .map(|j| distance_pt_seg_2d(pt(verts, j), p1, p2))
            .fold(0.0f32, f32::max);
        min_dist = min_dist.min(max_edge_dist);
    }
    min_dist.sqrt()
}

#[inline]
fn prev(i: usize, n: usize) -> usize {
    if i == 0 {
        n - 1
    } else {
        i - 1
    }
}

#[inline]
fn next(i: usize, n: usize) -> usize {
    if i + 1 >= n {
        0
    } else {
        i + 1
    }
}

fn triangulate_hull(verts: &[f32], hull: &[usize], nin: usize, tris: &mut Vec<i32>) {
    let nhull = hull.len();
    let mut start = 0;
    let mut left = 1;
    let mut right = nhull - 1;

    // Start from the ear with the shortest perimeter, ears have an
    // original vertex in the middle
    let mut dmin = f32::MAX;
    for i in 0..nhull {
        if hull[i] >= nin {
            continue;
        }
        let pi = prev(i, nhull);
        let ni = next(i, nhull);
        let pv = pt(verts, hull[pi]);
        let cv = pt(verts, hull[i]);
        let nv = pt(verts, hull[ni]);
        let d = vdist2(pv, cv) + vdist2(cv, nv) + vdist2(nv, pv);
        if d < dmin {
            start = i;
            left = ni;
            right = pi;
            dmin = d;
        }
    }

    tris.extend_from_slice(&[hull[start] as i32, hull[left] as i32, hull[right] as i32, 0]);

    // Grow the fan from whichever side gives the shorter new edge
    while next(left, nhull) != right {
        let nleft = next(left, nhull);
        let nright = prev(right, nhull);

        let cvleft = pt(verts, hull[left]);
        let nvleft = pt(verts, hull[nleft]);
        let cvright = pt(verts, hull[right]);
        let nvright = pt(verts, hull[nright]);
        let dleft = vdist2(cvleft, nvleft) + vdist2(nvleft, cvright);
        let dright = vdist2(cvright, nvright) + vdist2(cvleft, nvright);

        if dleft < dright {
            tris.extend_from_slice(&[hull[left] as i32, hull[nleft] as i32, hull[right] as i32, 0]);
            left = nleft;
        } else {
            tris.extend_from_slice(&[hull[left] as i32, hull[nright] as i32, hull[right] as i32, 0]);
            right = nright;
        }
    }
}

#[inline]
fn jitter_x(i: usize) -> f32 {
    ((i as u32).wrapping_mul(0x8da6_b343) & 0xffff) as f32 / 65535.0 * 2.0 - 1.0
}

#[inline]
fn jitter_z(i: usize) -> f32 {
    ((i as u32).wrapping_mul(0xd816_3841) & 0xffff) as f32 / 65535.0 * 2.0 - 1.0
}

fn on_hull(a: i32, b: i32, hull: &[usize]) -> bool {
    let nhull = hull.len() as i32;
    // Interior samples come after the hull vertices
    if a >= nhull || b >= nhull {
        return false;
    }
    let mut j = hull.len() - 1;
    for i in 0..hull.len() {
        if a == hull[j] as i32 && b == hull[i] as i32 {
            return true;
        }
        j = i;
    }
    false
}

fn set_tri_flags(tris: &mut [i32], hull: &[usize]) {
    for t in tris.chunks_exact_mut(4) {
        let (a, b, c) = (t[0], t[1], t[2]);
        let mut flags = 0;
        if on_hull(a, b, hull) {
            flags |= RC_DETAIL_EDGE_BOUNDARY as i32;
        }
        if on_hull(b, c, hull) {
            flags |= (RC_DETAIL_EDGE_BOUNDARY as i32) << 2;
        }
        if on_hull(c, a, hull) {
            flags |= (RC_DETAIL_EDGE_BOUNDARY as i32) << 4;
        }
        t[3] = flags;
    }
}

struct DetailScratch {
    verts: Vec<f32>,
    tris: Vec<i32>,
    edges: Vec<[i32; 4]>,
    samples: Vec<i32>,
    hull: Vec<usize>,
}

#[allow(clippy::too_many_arguments)]
fn build_poly_detail(
    input: &[f32],
    nin: usize,
    sample_dist: f32,
    sample_max_error: f32,
    height_search_radius: i32,
    chf: &CompactHeightfield,
    hp: &HeightPatch,
    scratch: &mut DetailScratch,
) -> Result<()> {
    let DetailScratch {
        verts,
        tris,
        edges,
        samples,
        hull,
    } = scratch;

    verts.clear();
    verts.extend_from_slice(&input[..nin * 3]);
    edges.clear();
    tris.clear();
    hull.clear();

    let cs = chf.cs;
    let ics = 1.0 / cs;
    let min_extent = poly_min_extent(verts, nin);

    let mut edge = [0.0f32; (MAX_VERTS_PER_EDGE + 1) * 3];

    if sample_dist > 0.0 {
        let mut j = nin - 1;
        for i in 0..nin {
            let mut vj = pt(input, j);
            let mut vi = pt(input, i);
            let mut swapped = false;
            // Handle shared edges in the same order from both sides
            if (vj[0] - vi[0]).abs() < 1e-6 {
                if vj[2] > vi[2] {
                    std::mem::swap(&mut vj, &mut vi);
                    swapped = true;
                }
            } else if vj[0] > vi[0] {
                std::mem::swap(&mut vj, &mut vi);
                swapped = true;
            }

            let dx = vi[0] - vj[0];
            let dy = vi[1] - vj[1];
            let dz = vi[2] - vj[2];
            let d = (dx * dx + dz * dz).sqrt();
            let mut nn = 1 + (d / sample_dist).floor() as usize;
            if nn >= MAX_VERTS_PER_EDGE {
                nn = MAX_VERTS_PER_EDGE - 1;
            }
            let nverts = verts.len() / 3;
            if nverts + nn >= MAX_VERTS {
                nn = (MAX_VERTS - 1).saturating_sub(nverts).max(1);
            }

            for k in 0..=nn {
                let u = k as f32 / nn as f32;
                let x = vj[0] + dx * u;
                let y = vj[1] + dy * u;
                let z = vj[2] + dz * u;
                edge[k * 3] = x;
                edge[k * 3 + 1] = get_height(x, y, z, ics, chf.ch, height_search_radius, hp) as f32 * chf.ch;
                edge[k * 3 + 2] = z;
            }

            // Simplify the samples
            let mut idx = vec![0usize, nn];
            let mut k = 0;
            while k + 1 < idx.len() {
                let a = idx[k];
                let b = idx[k + 1];
                let va = pt(&edge, a);
                let vb = pt(&edge, b);
                let mut maxd = 0.0;
                let mut maxi = None;
                for m in a + 1..b {
                    let dev = distance_pt_seg(pt(&edge, m), va, vb);
                    if dev > maxd {
                        maxd = dev;
                        maxi = Some(m);
                    }
                }
                match maxi {
                    Some(m) if maxd > sample_max_error * sample_max_error => idx.insert(k + 1, m),
                    _ => k += 1,
                }
            }

            hull.push(j);
            let inner = &idx[1..idx.len() - 1];
            let mut push_vert = |k: usize| {
                hull.push(verts.len() / 3);
                verts.extend_from_slice(pt(&edge, k));
            };
            if swapped {
                inner.iter().rev().for_each(|&k| push_vert(k));
            } else {
                inner.iter().for_each(|&k| push_vert(k));
            }

            j = i;
        }
    } else {
        hull.extend(0..nin);
    }

    // Slivers and small triangles get no interior samples
    if min_extent < sample_dist * 2.0 {
        triangulate_hull(verts, hull, nin, tris);
        set_tri_flags(tris, hull);
        return Ok(());
    }

    triangulate_hull(verts, hull, nin, tris);
    if tris.is_empty() {
        log::warn!("could not triangulate polygon ({} verts)", verts.len() / 3);
        return Ok(());
    }

    if sample_dist > 0.0 {
        let mut bmin = [input[0], input[1], input[2]];
        let mut bmax = bmin;
        for i in 1..nin {
            for a in 0..3 {
                bmin[a] = bmin[a].min(input[i * 3 + a]);
                bmax[a] = bmax[a].max(input[i * 3 + a]);
            }
        }
        let x0 = (bmin[0] / sample_dist).floor() as i32;
        let x1 = (bmax[0] / sample_dist).ceil() as i32;
        let z0 = (bmin[2] / sample_dist).floor() as i32;
        let z1 = (bmax[2] / sample_dist).ceil() as i32;

        samples.clear();
        for z in z0..z1 {
            for x in x0..x1 {
                let p = [x as f32 * sample_dist, (bmax[1] + bmin[1]) * 0.5, z as f32 * sample_dist];
                // Keep samples away from the edges
                if dist_to_poly(nin, input, &p) > -sample_dist / 2.0 {
                    continue;
                }
                let h = get_height(p[0], p[1], p[2], ics, chf.ch, height_search_radius, hp);
                samples.extend_from_slice(&[x, h as i32, z, 0]);
            }
        }

        // Add the sample with the largest error until all are within the
        // tolerance
        let nsamples = samples.len() / 4;
        for _ in 0..nsamples {
            if verts.len() / 3 >= MAX_VERTS {
                break;
            }

            let mut bestpt = [0.0f32; 3];
            let mut bestd = 0.0f32;
            let mut besti = None;
            for i in 0..nsamples {
                let s = &samples[i * 4..i * 4 + 4];
                if s[3] != 0 {
                    continue;
                }
                let p = [
                    s[0] as f32 * sample_dist + jitter_x(i) * cs * 0.1,
                    s[1] as f32 * chf.ch,
                    s[2] as f32 * sample_dist + jitter_z(i) * cs * 0.1,
                ];
                let Some(d) = dist_to_tri_mesh(&p, verts, tris) else {
                    continue;
                };
                if d > bestd {
                    bestd = d;
                    besti = Some(i);
                    bestpt = p;
                }
            }

            let Some(besti) = besti else { break };
            if bestd <= sample_max_error {
                break;
            }

            samples[besti * 4 + 3] = 1;
            verts.extend_from_slice(&bestpt);

            let npts = verts.len() / 3;
            delaunay_hull(npts, verts, hull, tris, edges)?;
        }
    }

    let ntris = tris.len() / 4;
    if ntris > MAX_TRIS {
        log::warn!("shrinking detail triangle count from {ntris} to max {MAX_TRIS}");
        tris.truncate(MAX_TRIS * 4);
    }

    set_tri_flags(tris, hull);
    Ok(())
}

/// Seeds the height patch at the span closest to the polygon center, for
/// polygons without a usable region sample.
fn seed_with_poly_center(
    chf: &CompactHeightfield,
    poly: &[u16],
    mesh_verts: &[u16],
    bs: i32,
    hp: &mut HeightPatch,
    queue: &mut VecDeque<(i32, i32, usize)>,
) {
    const OFFSET: [(i32, i32); 9] = [(0, 0), (-1, -1), (0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0)];

    // Span closest to one of the polygon vertices
    let mut start: Option<(i32, i32, usize)> = None;
    let mut dmin = RC_UNSET_HEIGHT as i32;
    'search: for &pv in poly {
        for (ox, oz) in OFFSET {
            let v = &mesh_verts[pv as usize * 3..pv as usize * 3 + 3];
            let ax = v[0] as i32 + ox;
            let ay = v[1] as i32;
            let az = v[2] as i32 + oz;
            if ax < hp.xmin || ax >= hp.xmin + hp.width || az < hp.zmin || az >= hp.zmin + hp.height {
                continue;
            }
            for i in chf.cell(ax + bs, az + bs).spans() {
                let d = (ay - chf.spans[i].y as i32).abs();
                if d < dmin {
                    start = Some((ax, az, i));
                    dmin = d;
                }
                if dmin == 0 {
                    break 'search;
                }
            }
        }
    }
    let Some(start) = start else {
        return;
    };

    let npoly = poly.len() as i32;
    let pcx = poly.iter().map(|&p| mesh_verts[p as usize * 3] as i32).sum::<i32>() / npoly;
    let pcz = poly.iter().map(|&p| mesh_verts[p as usize * 3 + 2] as i32).sum::<i32>() / npoly;

    // Depth first walk towards the center, the visited cells are recorded
    // so contour simplification cannot trap the walk
    let mut stack = vec![start];
    let mut dirs = [0usize, 1, 2, 3];
    hp.reset(0);

    let mut current = start;
    loop {
        let Some(c) = stack.pop() else {
            log::warn!("walk towards polygon center failed to reach center");
            break;
        };
        current = c;
        let (cx, cz, ci) = c;
        if cx == pcx && cz == pcz {
            break;
        }

        let direct_dir = if cx == pcx {
            get_dir_for_offset(0, if pcz > cz { 1 } else { -1 })
        } else {
            get_dir_for_offset(if pcx > cx { 1 } else { -1 }, 0)
        };
        let direct_dir = direct_dir as usize;

        // Push the direct direction last so it is explored first
        dirs.swap(direct_dir, 3);
        let cs = chf.spans[ci];
        for &dir in &dirs {
            let con = cs.get_con(dir as i32);
            if con == RC_NOT_CONNECTED {
                continue;
            }
            let nx = cx + get_dir_offset_x(dir as i32);
            let nz = cz + get_dir_offset_y(dir as i32);
            let hpx = nx - hp.xmin;
            let hpz = nz - hp.zmin;
            if hpx < 0 || hpx >= hp.width || hpz < 0 || hpz >= hp.height {
                continue;
            }
            if hp.at(hpx, hpz) != 0 {
                continue;
            }
            hp.set(hpx, hpz, 1);
            stack.push((nx, nz, chf.cell(nx + bs, nz + bs).index as usize + con as usize));
        }
        dirs.swap(direct_dir, 3);
    }

    let (cx, cz, ci) = current;
    queue.clear();
    queue.push_back((cx + bs, cz + bs, ci));
    hp.reset(RC_UNSET_HEIGHT);
    hp.set(cx - hp.xmin, cz - hp.zmin, chf.spans[ci].y);
}

/// Fills the height patch with the floor heights reachable from inside the
/// polygon.
fn get_height_data(
    chf: &CompactHeightfield,
    poly: &[u16],
    mesh_verts: &[u16],
    bs: i32,
    hp: &mut HeightPatch,
    queue: &mut VecDeque<(i32, i32, usize)>,
    region: u16,
) {
    queue.clear();
    hp.reset(RC_UNSET_HEIGHT);

    let mut empty = true;

    // Polygons merged from several regions may overlap others, only sample
    // single region polygons from their own region
    if region != RC_MULTIPLE_REGS {
        for hz in 0..hp.height {
            let z = hp.zmin + hz + bs;
            for hx in 0..hp.width {
                let x = hp.xmin + hx + bs;
                for i in chf.cell(x, z).spans() {
                    let s = chf.spans[i];
                    if s.reg != region {
                        continue;
                    }
                    hp.set(hx, hz, s.y);
                    empty = false;

                    // Region border cells seed the flood fill
                    let border = (0..4).any(|dir| {
                        chf.neighbour(x, z, i, dir)
                            .is_some_and(|(_, _, ai)| chf.spans[ai].reg != region)
                    });
                    if border {
                        queue.push_back((x, z, i));
                    }
                    break;
                }
            }
        }
    }

    if empty {
        seed_with_poly_center(chf, poly, mesh_verts, bs, hp, queue);
    }

    // Breadth first fill so the patch never crosses onto overlapping floors
    while let Some((cx, cz, ci)) = queue.pop_front() {
        for dir in 0..4 {
            let Some((ax, az, ai)) = chf.neighbour(cx, cz, ci, dir) else {
                continue;
            };
            let hx = ax - hp.xmin - bs;
            let hz = az - hp.zmin - bs;
            if hx < 0 || hz < 0 || hx >= hp.width || hz >= hp.height {
                continue;
            }
            if hp.at(hx, hz) != RC_UNSET_HEIGHT {
                continue;
            }
            hp.set(hx, hz, chf.spans[ai].y);
            queue.push_back((ax, az, ai));
        }
    }
}

/// Builds the detail mesh of `mesh`, sampling heights from `chf`.
///
/// `sample_dist` is in world units, zero disables interior sampling.
pub fn build_poly_mesh_detail(
    mesh: &PolyMesh,
    chf: &CompactHeightfield,
    sample_dist: f32,
    sample_max_error: f32,
) -> Result<PolyMeshDetail> {
    let mut dmesh = PolyMeshDetail::default();
    if mesh.nverts() == 0 || mesh.npolys() == 0 {
        return Ok(dmesh);
    }

    let nvp = mesh.nvp;
    let cs = mesh.cs;
    let ch = mesh.ch;
    let orig = mesh.bmin;
    let border_size = mesh.border_size;
    let height_search_radius = (mesh.max_edge_error.ceil() as i32).max(1);

    // Height patch bounds per polygon
    let mut bounds = Vec::with_capacity(mesh.npolys());
    let mut maxhw = 0;
    let mut maxhh = 0;
    for i in 0..mesh.npolys() {
        let p = &mesh.poly(i)[..nvp];
        let mut xmin = chf.width;
        let mut xmax = 0;
        let mut zmin = chf.height;
        let mut zmax = 0;
        for &v in p.iter().take_while(|&&v| v != RC_MESH_NULL_IDX) {
            let v = mesh.vert(v as usize);
            xmin = xmin.min(v[0] as i32);
            xmax = xmax.max(v[0] as i32);
            zmin = zmin.min(v[2] as i32);
            zmax = zmax.max(v[2] as i32);
        }
        xmin = (xmin - 1).max(0);
        xmax = (xmax + 1).min(chf.width);
        zmin = (zmin - 1).max(0);
        zmax = (zmax + 1).min(chf.height);
        if xmin >= xmax || zmin >= zmax {
            bounds.push(None);
            continue;
        }
        maxhw = maxhw.max(xmax - xmin);
        maxhh = maxhh.max(zmax - zmin);
        bounds.push(Some((xmin, xmax, zmin, zmax)));
    }

    let mut hp = HeightPatch {
        data: Vec::with_capacity((maxhw * maxhh) as usize),
        xmin: 0,
        zmin: 0,
        width: 0,
        height: 0,
    };
    let mut queue = VecDeque::with_capacity(512);
    let mut scratch = DetailScratch {
        verts: Vec::with_capacity(MAX_VERTS * 3),
        tris: Vec::with_capacity(MAX_TRIS * 4),
        edges: Vec::with_capacity(64),
        samples: Vec::with_capacity(512),
        hull: Vec::with_capacity(MAX_VERTS),
    };
    let mut poly_verts = vec![0.0f32; nvp * 3];

    for i in 0..mesh.npolys() {
        let p = &mesh.poly(i)[..nvp];
        let npoly = count_poly_verts(p);

        for (j, &v) in p[..npoly].iter().enumerate() {
            let v = mesh.vert(v as usize);
            poly_verts[j * 3] = v[0] as f32 * cs;
            poly_verts[j * 3 + 1] = v[1] as f32 * ch;
            poly_verts[j * 3 + 2] = v[2] as f32 * cs;
        }

        match bounds[i] {
            Some((xmin, xmax, zmin, zmax)) => {
                hp.xmin = xmin;
                hp.zmin = zmin;
                hp.width = xmax - xmin;
                hp.height = zmax - zmin;
                get_height_data(chf, &p[..npoly], &mesh.verts, border_size, &mut hp, &mut queue, mesh.regs[i]);
                build_poly_detail(
                    &poly_verts,
                    npoly,
                    sample_dist,
                    sample_max_error,
                    height_search_radius,
                    chf,
                    &hp,
                    &mut scratch,
                )?;
            }
            None => {
                // Degenerate footprint, fan the polygon as is
                scratch.verts.clear();
                scratch.verts.extend_from_slice(&poly_verts[..npoly * 3]);
                scratch.tris.clear();
                for k in 2..npoly {
                    scratch.tris.extend_from_slice(&[0, k as i32 - 1, k as i32, 0]);
                }
            }
        }

        let nverts = scratch.verts.len() / 3;
        let ntris = scratch.tris.len() / 4;
        dmesh.meshes.extend_from_slice(&[
            dmesh.nverts() as u32,
            nverts as u32,
            dmesh.ntris() as u32,
            ntris as u32,
        ]);

        // Detail vertices to world space, lifted by one cell
        for v in scratch.verts.chunks_exact(3) {
            dmesh.verts.push(v[0] + orig.x);
            dmesh.verts.push(v[1] + orig.y + chf.ch);
            dmesh.verts.push(v[2] + orig.z);
        }
        for t in scratch.tris.chunks_exact(4) {
            dmesh.tris.extend_from_slice(&[t[0] as u8, t[1] as u8, t[2] as u8, t[3] as u8]);
        }
    }

    log::debug!(
        "detail mesh: {} sub-meshes, {} vertices, {} triangles",
        dmesh.nmeshes(),
        dmesh.nverts(),
        dmesh.ntris()
    );
    Ok(dmesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::build_contours;
    use crate::{build_distance_field, build_regions_watershed, Heightfield, RC_WALKABLE_AREA};
    use glam::Vec3;

    fn floor_chf(size: i32, height_at: impl Fn(i32, i32) -> u16) -> CompactHeightfield {
        let mut hf = Heightfield::new(size, size, Vec3::ZERO, Vec3::new(size as f32, 20.0, size as f32), 1.0, 0.5);
        for z in 0..size {
            for x in 0..size {
                let top = height_at(x, z);
                hf.add_span(x, z, 0, top, RC_WALKABLE_AREA, 1);
            }
        }
        let mut chf = CompactHeightfield::build_from_heightfield(&hf, 4, 2).unwrap();
        build_distance_field(&mut chf);
        build_regions_watershed(&mut chf, 0, 1, 0).unwrap();
        chf
    }

    fn detail_for(chf: &CompactHeightfield, sample_dist: f32) -> (PolyMesh, PolyMeshDetail) {
        let cset = build_contours(chf, 1.3, 12).unwrap();
        let mesh = PolyMesh::build_from_contour_set(&cset, 6).unwrap();
        let dmesh = build_poly_mesh_detail(&mesh, chf, sample_dist, 1.0).unwrap();
        (mesh, dmesh)
    }

    #[test]
    fn test_one_sub_mesh_per_polygon() {
        let chf = floor_chf(12, |_, _| 2);
        let (mesh, dmesh) = detail_for(&chf, 6.0);
        assert_eq!(dmesh.nmeshes(), mesh.npolys());
        for i in 0..dmesh.nmeshes() {
            let [vb, vn, tb, tn] = dmesh.mesh(i);
            assert!(vn as usize >= mesh.poly_vert_count(i));
            assert!(tn >= 1);
            assert!((vb + vn) as usize <= dmesh.nverts());
            assert!((tb + tn) as usize <= dmesh.ntris());
            for t in 0..tn as usize {
                let tri = &dmesh.tris[(tb as usize + t) * 4..(tb as usize + t) * 4 + 3];
                assert!(tri.iter().all(|&v| (v as u32) < vn));
            }
        }
    }

    #[test]
    fn test_flat_floor_heights_are_lifted_one_cell() {
        let chf = floor_chf(10, |_, _| 4);
        let (_, dmesh) = detail_for(&chf, 0.0);
        for v in dmesh.verts.chunks_exact(3) {
            assert!((v[1] - (4.0 * 0.5 + 0.5)).abs() < 1e-4, "y = {}", v[1]);
        }
    }

    #[test]
    fn test_boundary_edges_are_flagged() {
        let chf = floor_chf(8, |_, _| 2);
        let (_, dmesh) = detail_for(&chf, 0.0);
        let flagged = dmesh.tris.chunks_exact(4).filter(|t| t[3] != 0).count();
        assert!(flagged > 0);
    }

    #[test]
    fn test_circum_circle_of_right_triangle() {
        let (c, r) = circum_circle(&[0.0, 0.0, 0.0], &[2.0, 0.0, 0.0], &[0.0, 0.0, 2.0]);
        assert!((c[0] - 1.0).abs() < 1e-5);
        assert!((c[2] - 1.0).abs() < 1e-5);
        assert!((r - 2.0f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_triangulate_hull_covers_polygon() {
        let verts = [0.0, 0.0, 0.0, 0.0, 0.0, 4.0, 4.0, 0.0, 4.0, 4.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        let hull = [0, 1, 2, 3, 4];
        let mut tris = Vec::new();
        triangulate_hull(&verts, &hull, 4, &mut tris);
        assert_eq!(tris.len() / 4, 3);
    }

    #[test]
    fn test_delaunay_adds_interior_point() {
        let pts = [0.0, 0.0, 0.0, 0.0, 0.0, 4.0, 4.0, 0.0, 4.0, 4.0, 0.0, 0.0, 2.0, 1.0, 2.0];
        let hull = [0usize, 1, 2, 3];
        let mut tris = Vec::new();
        let mut edges = Vec::new();
        delaunay_hull(5, &pts, &hull, &mut tris, &mut edges).unwrap();
        assert_eq!(tris.len() / 4, 4);
        assert!(tris.chunks_exact(4).all(|t| t[..3].contains(&4)));
    }

    #[test]
    fn test_poly_min_extent_of_square() {
        let verts = [0.0, 0.0, 0.0, 0.0, 0.0, 3.0, 3.0, 0.0, 3.0, 3.0, 0.0, 0.0];
        assert!((poly_min_extent(&verts, 4) - 3.0).abs() < 1e-5);
    }
}
