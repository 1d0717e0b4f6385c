//! Convex polygon mesh built from a contour set
//!
//! Every contour is ear-clipped into triangles, triangles are greedily merged
//! into convex polygons of at most `nvp` vertices, and vertices that only
//! exist because of the tile border are removed again. Edges on the tile
//! boundary are tagged as portals so neighbouring tiles can be stitched.

use glam::Vec3;
use recast_common::{Error, Result};

use crate::contour::{intersect, intersect_prop, left, left_on, next, prev, vequal_2d, ContourSet};
use crate::{RC_BORDER_VERTEX, RC_MESH_NULL_IDX, RC_MULTIPLE_REGS};

const VERTEX_BUCKET_COUNT: usize = 1 << 12;
const DIAGONAL_FLAG: u32 = 0x8000_0000;
const INDEX_MASK: u32 = 0x0fff_ffff;

/// Portal edge marker, combined with the side the edge lies on
pub const RC_PORTAL_FLAG: u16 = 0x8000;

/// A mesh of convex polygons in voxel coordinates
#[derive(Debug, Clone, Default)]
pub struct PolyMesh {
    /// Vertices, `[x, y, z]` each
    pub verts: Vec<u16>,
    /// Polygons, `2 * nvp` entries each: vertex indices followed by
    /// neighbour polygon indices, both padded with `RC_MESH_NULL_IDX`
    pub polys: Vec<u16>,
    /// Region id per polygon
    pub regs: Vec<u16>,
    /// User flags per polygon
    pub flags: Vec<u16>,
    /// Area id per polygon
    pub areas: Vec<u8>,
    /// Maximum vertices per polygon
    pub nvp: usize,
    /// Bounds with the border removed
    pub bmin: Vec3,
    /// Bounds with the border removed
    pub bmax: Vec3,
    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,
    /// Border size of the source field
    pub border_size: i32,
    /// Contour simplification error the mesh was built with
    pub max_edge_error: f32,
}

impl PolyMesh {
    /// Number of vertices
    #[inline]
    pub fn nverts(&self) -> usize {
        self.verts.len() / 3
    }

    /// Number of polygons
    #[inline]
    pub fn npolys(&self) -> usize {
        self.areas.len()
    }

    /// Vertex indices and neighbour links of polygon `i`
    #[inline]
    pub fn poly(&self, i: usize) -> &[u16] {
        &self.polys[i * self.nvp * 2..(i + 1) * self.nvp * 2]
    }

    /// Number of vertices used by polygon `i`
    pub fn poly_vert_count(&self, i: usize) -> usize {
        count_poly_verts(&self.poly(i)[..self.nvp])
    }

    /// Vertex `i` in voxel coordinates
    #[inline]
    pub fn vert(&self, i: usize) -> [u16; 3] {
        [self.verts[i * 3], self.verts[i * 3 + 1], self.verts[i * 3 + 2]]
    }

    /// Builds the polygon mesh of `cset` with at most `nvp` vertices per
    /// polygon.
    pub fn build_from_contour_set(cset: &ContourSet, nvp: usize) -> Result<Self> {
        if !(3..=6).contains(&nvp) {
            return Err(Error::Recast(format!("invalid vertices per polygon {nvp}")));
        }

        let mut max_vertices = 0;
        let mut max_tris = 0;
        let mut max_verts_per_cont = 0;
        for c in &cset.contours {
            let n = c.nverts();
            if n < 3 {
                continue;
            }
            max_vertices += n;
            max_tris += n - 2;
            max_verts_per_cont = max_verts_per_cont.max(n);
        }
        if max_vertices >= 0xfffe {
            return Err(Error::Recast(format!("too many vertices {max_vertices}")));
        }

        let mut mesh = PolyMesh {
            nvp,
            bmin: cset.bmin,
            bmax: cset.bmax,
            cs: cset.cs,
            ch: cset.ch,
            border_size: cset.border_size,
            max_edge_error: cset.max_error,
            ..Default::default()
        };

        let mut vflags: Vec<bool> = Vec::with_capacity(max_vertices);
        let mut first_vert = vec![-1i32; VERTEX_BUCKET_COUNT];
        let mut next_vert: Vec<i32> = Vec::with_capacity(max_vertices);

        let mut indices: Vec<u32> = Vec::with_capacity(max_verts_per_cont);
        let mut tris: Vec<u32> = Vec::with_capacity(max_verts_per_cont * 3);
        let mut polys: Vec<u16> = Vec::with_capacity((max_verts_per_cont + 1) * nvp);
        let mut tmp_poly = vec![RC_MESH_NULL_IDX; nvp];

        for cont in &cset.contours {
            let n = cont.nverts();
            if n < 3 {
                continue;
            }

            indices.clear();
            indices.extend(0..n as u32);
            let ok = triangulate(n, &cont.verts, &mut indices, &mut tris);
            if !ok {
                log::warn!("bad triangulation for contour of region {}", cont.reg);
            }

            // Map contour vertices to mesh vertices
            let mut vmap = Vec::with_capacity(n);
            for j in 0..n {
                let v = &cont.verts[j * 4..j * 4 + 4];
                let idx = add_vertex(v[0], v[1], v[2], &mut mesh.verts, &mut first_vert, &mut next_vert);
                if idx as usize >= vflags.len() {
                    vflags.resize(idx as usize + 1, false);
                }
                if v[3] & RC_BORDER_VERTEX != 0 {
                    vflags[idx as usize] = true;
                }
                vmap.push(idx);
            }

            polys.clear();
            for t in tris.chunks_exact(3) {
                if t[0] != t[1] && t[0] != t[2] && t[1] != t[2] {
                    let start = polys.len();
                    polys.resize(start + nvp, RC_MESH_NULL_IDX);
                    polys[start] = vmap[t[0] as usize];
                    polys[start + 1] = vmap[t[1] as usize];
                    polys[start + 2] = vmap[t[2] as usize];
                }
            }
            if polys.is_empty() {
                continue;
            }

            if nvp > 3 {
                merge_polys(&mut polys, None, &mesh.verts, nvp, &mut tmp_poly);
            }

            for p in polys.chunks_exact(nvp) {
                mesh.polys.extend_from_slice(p);
                mesh.polys.extend(std::iter::repeat(RC_MESH_NULL_IDX).take(nvp));
                mesh.regs.push(cont.reg);
                mesh.areas.push(cont.area);
                if mesh.npolys() > max_tris {
                    return Err(Error::Recast(format!(
                        "too many polygons {} (max: {max_tris})",
                        mesh.npolys()
                    )));
                }
            }
        }

        // Remove vertices that only exist because of the tile border
        let mut i = 0;
        while i < mesh.nverts() {
            if vflags.get(i).copied().unwrap_or(false) {
                if !mesh.can_remove_vertex(i as u16) {
                    i += 1;
                    continue;
                }
                mesh.remove_vertex(i as u16, max_tris)?;
                vflags.remove(i);
                continue;
            }
            i += 1;
        }

        mesh.build_adjacency();

        if cset.border_size > 0 {
            mesh.mark_portal_edges(cset.width, cset.height);
        }

        mesh.flags = vec![0; mesh.npolys()];

        if mesh.nverts() > 0xffff {
            return Err(Error::Recast(format!("too many vertices {} (max: 65535)", mesh.nverts())));
        }
        if mesh.npolys() > 0xffff {
            return Err(Error::Recast(format!("too many polygons {} (max: 65535)", mesh.npolys())));
        }

        log::debug!("poly mesh: {} vertices, {} polygons", mesh.nverts(), mesh.npolys());
        Ok(mesh)
    }

    fn mark_portal_edges(&mut self, w: i32, h: i32) {
        let nvp = self.nvp;
        for i in 0..self.npolys() {
            let base = i * nvp * 2;
            for j in 0..nvp {
                let p = &self.polys[base..base + nvp * 2];
                if p[j] == RC_MESH_NULL_IDX {
                    break;
                }
                if p[nvp + j] != RC_MESH_NULL_IDX {
                    continue;
                }
                let nj = if j + 1 >= nvp || p[j + 1] == RC_MESH_NULL_IDX { 0 } else { j + 1 };
                let va = self.vert(p[j] as usize);
                let vb = self.vert(p[nj] as usize);
                let (w, h) = (w as u16, h as u16);

                let side = if va[0] == 0 && vb[0] == 0 {
                    Some(0)
                } else if va[2] == h && vb[2] == h {
                    Some(1)
                } else if va[0] == w && vb[0] == w {
                    Some(2)
                } else if va[2] == 0 && vb[2] == 0 {
                    Some(3)
                } else {
                    None
                };
                if let Some(side) = side {
                    self.polys[base + nvp + j] = RC_PORTAL_FLAG | side;
                }
            }
        }
    }

    fn can_remove_vertex(&self, rem: u16) -> bool {
        let nvp = self.nvp;

        let mut num_touched_verts = 0;
        let mut num_remaining_edges = 0;
        for i in 0..self.npolys() {
            let p = &self.poly(i)[..nvp];
            let nv = count_poly_verts(p);
            let num_removed = p[..nv].iter().filter(|&&v| v == rem).count();
            if num_removed > 0 {
                num_touched_verts += num_removed;
                num_remaining_edges += nv - (num_removed + 1);
            }
        }

        // Removal would leave fewer than a triangle
        if num_remaining_edges <= 2 {
            return false;
        }

        // Edges touching the vertex, with the number of polygons sharing them
        let mut edges: Vec<(u16, u16, u32)> = Vec::with_capacity(num_touched_verts * 2);
        for i in 0..self.npolys() {
            let p = &self.poly(i)[..nvp];
            let nv = count_poly_verts(p);
            let mut k = nv - 1;
            for j in 0..nv {
                if p[j] == rem || p[k] == rem {
                    let (mut a, mut b) = (p[j], p[k]);
                    if b == rem {
                        std::mem::swap(&mut a, &mut b);
                    }
                    match edges.iter_mut().find(|e| e.1 == b) {
                        Some(e) => e.2 += 1,
                        None => edges.push((a, b, 1)),
                    }
                }
                k = j;
            }
        }

        // More than two open edges means the vertex joins separate parts
        let num_open_edges = edges.iter().filter(|e| e.2 < 2).count();
        num_open_edges <= 2
    }

    fn remove_vertex(&mut self, rem: u16, max_tris: usize) -> Result<()> {
        let nvp = self.nvp;

        // Collect the boundary edges of the polygons touching the vertex and
        // drop those polygons
        let mut edges: Vec<[u16; 4]> = Vec::new();
        let mut i = 0;
        while i < self.npolys() {
            let p = self.poly(i)[..nvp].to_vec();
            let nv = count_poly_verts(&p);
            if !p[..nv].contains(&rem) {
                i += 1;
                continue;
            }
            let mut k = nv - 1;
            for j in 0..nv {
                if p[j] != rem && p[k] != rem {
                    edges.push([p[k], p[j], self.regs[i], self.areas[i] as u16]);
                }
                k = j;
            }
            self.swap_remove_poly(i);
        }

        self.verts.drain(rem as usize * 3..rem as usize * 3 + 3);

        for p in self.polys.chunks_exact_mut(nvp * 2) {
            let nv = count_poly_verts(&p[..nvp]);
            for v in &mut p[..nv] {
                if *v > rem {
                    *v -= 1;
                }
            }
        }
        for e in &mut edges {
            if e[0] > rem {
                e[0] -= 1;
            }
            if e[1] > rem {
                e[1] -= 1;
            }
        }

        if edges.is_empty() {
            return Ok(());
        }

        // Chain the edges into the outline of the hole
        let mut hole: std::collections::VecDeque<u16> = std::collections::VecDeque::new();
        let mut hreg: std::collections::VecDeque<u16> = std::collections::VecDeque::new();
        let mut harea: std::collections::VecDeque<u8> = std::collections::VecDeque::new();
        hole.push_back(edges[0][0]);
        hreg.push_back(edges[0][2]);
        harea.push_back(edges[0][3] as u8);

        while !edges.is_empty() {
            let mut matched = false;
            let mut i = 0;
            while i < edges.len() {
                let [ea, eb, r, a] = edges[i];
                let added = if hole.front() == Some(&eb) {
                    hole.push_front(ea);
                    hreg.push_front(r);
                    harea.push_front(a as u8);
                    true
                } else if hole.back() == Some(&ea) {
                    hole.push_back(eb);
                    hreg.push_back(r);
                    harea.push_back(a as u8);
                    true
                } else {
                    false
                };
                if added {
                    edges.swap_remove(i);
                    matched = true;
                } else {
                    i += 1;
                }
            }
            if !matched {
                break;
            }
        }

        let nhole = hole.len();
        let mut tverts = Vec::with_capacity(nhole * 4);
        for &pi in &hole {
            let v = self.vert(pi as usize);
            tverts.extend_from_slice(&[v[0] as i32, v[1] as i32, v[2] as i32, 0]);
        }
        let mut thole: Vec<u32> = (0..nhole as u32).collect();
        let mut tris = Vec::with_capacity(nhole * 3);
        if !triangulate(nhole, &tverts, &mut thole, &mut tris) {
            log::warn!("hole triangulation failed while removing vertex {rem}");
        }

        let mut polys: Vec<u16> = Vec::with_capacity((tris.len() / 3 + 1) * nvp);
        let mut pregs: Vec<u16> = Vec::new();
        let mut pareas: Vec<u8> = Vec::new();
        for t in tris.chunks_exact(3) {
            let (t0, t1, t2) = (t[0] as usize, t[1] as usize, t[2] as usize);
            if t0 != t1 && t0 != t2 && t1 != t2 {
                let start = polys.len();
                polys.resize(start + nvp, RC_MESH_NULL_IDX);
                polys[start] = hole[t0];
                polys[start + 1] = hole[t1];
                polys[start + 2] = hole[t2];
                // A polygon covering several regions gets no single region
                if hreg[t0] != hreg[t1] || hreg[t1] != hreg[t2] {
                    pregs.push(RC_MULTIPLE_REGS);
                } else {
                    pregs.push(hreg[t0]);
                }
                pareas.push(harea[t0]);
            }
        }
        if polys.is_empty() {
            return Ok(());
        }

        if nvp > 3 {
            let mut tmp = vec![RC_MESH_NULL_IDX; nvp];
            merge_polys(&mut polys, Some((&mut pregs, &mut pareas)), &self.verts, nvp, &mut tmp);
        }

        for (i, p) in polys.chunks_exact(nvp).enumerate() {
            if self.npolys() >= max_tris {
                break;
            }
            self.polys.extend_from_slice(p);
            self.polys.extend(std::iter::repeat(RC_MESH_NULL_IDX).take(nvp));
            self.regs.push(pregs[i]);
            self.areas.push(pareas[i]);
        }
        Ok(())
    }

    fn swap_remove_poly(&mut self, i: usize) {
        let stride = self.nvp * 2;
        let last = self.npolys() - 1;
        if i != last {
            let (head, tail) = self.polys.split_at_mut(last * stride);
            head[i * stride..(i + 1) * stride].copy_from_slice(&tail[..stride]);
        }
        self.polys.truncate(last * stride);
        self.regs.swap_remove(i);
        self.areas.swap_remove(i);
    }

    fn build_adjacency(&mut self) {
        struct Edge {
            vert: [u16; 2],
            poly_edge: [usize; 2],
            poly: [usize; 2],
        }

        let nvp = self.nvp;
        let npolys = self.npolys();
        let mut first_edge: Vec<Option<usize>> = vec![None; self.nverts()];
        let mut next_edge: Vec<Option<usize>> = Vec::with_capacity(npolys * nvp);
        let mut edges: Vec<Edge> = Vec::with_capacity(npolys * nvp);

        let edge_verts = |p: &[u16], j: usize| -> Option<(u16, u16)> {
            if p[j] == RC_MESH_NULL_IDX {
                return None;
            }
            let v1 = if j + 1 >= nvp || p[j + 1] == RC_MESH_NULL_IDX { p[0] } else { p[j + 1] };
            Some((p[j], v1))
        };

        for i in 0..npolys {
            let p = &self.polys[i * nvp * 2..i * nvp * 2 + nvp];
            for j in 0..nvp {
                let Some((v0, v1)) = edge_verts(p, j) else { break };
                if v0 < v1 {
                    edges.push(Edge {
                        vert: [v0, v1],
                        poly: [i, i],
                        poly_edge: [j, 0],
                    });
                    next_edge.push(first_edge[v0 as usize]);
                    first_edge[v0 as usize] = Some(edges.len() - 1);
                }
            }
        }

        for i in 0..npolys {
            let p = &self.polys[i * nvp * 2..i * nvp * 2 + nvp];
            for j in 0..nvp {
                let Some((v0, v1)) = edge_verts(p, j) else { break };
                if v0 > v1 {
                    let mut e = first_edge[v1 as usize];
                    while let Some(ei) = e {
                        let edge = &mut edges[ei];
                        if edge.vert[1] == v0 && edge.poly[0] == edge.poly[1] {
                            edge.poly[1] = i;
                            edge.poly_edge[1] = j;
                            break;
                        }
                        e = next_edge[ei];
                    }
                }
            }
        }

        for e in &edges {
            if e.poly[0] != e.poly[1] {
                self.polys[e.poly[0] * nvp * 2 + nvp + e.poly_edge[0]] = e.poly[1] as u16;
                self.polys[e.poly[1] * nvp * 2 + nvp + e.poly_edge[1]] = e.poly[0] as u16;
            }
        }
    }
}

fn compute_vertex_hash(x: i32, z: i32) -> usize {
    const H1: u32 = 0x8da6_b343;
    const H3: u32 = 0xcb1a_b31f;
    let n = H1.wrapping_mul(x as u32).wrapping_add(H3.wrapping_mul(z as u32));
    (n as usize) & (VERTEX_BUCKET_COUNT - 1)
}

/// Returns the index of the vertex at `(x, y, z)`, adding it when no vertex
/// within two voxels vertically exists.
fn add_vertex(
    x: i32,
    y: i32,
    z: i32,
    verts: &mut Vec<u16>,
    first_vert: &mut [i32],
    next_vert: &mut Vec<i32>,
) -> u16 {
    let bucket = compute_vertex_hash(x, z);
    let mut i = first_vert[bucket];
    while i != -1 {
        let v = &verts[i as usize * 3..i as usize * 3 + 3];
        if v[0] as i32 == x && (v[1] as i32 - y).abs() <= 2 && v[2] as i32 == z {
            return i as u16;
        }
        i = next_vert[i as usize];
    }

    let idx = verts.len() / 3;
    verts.extend_from_slice(&[x as u16, y as u16, z as u16]);
    next_vert.push(first_vert[bucket]);
    first_vert[bucket] = idx as i32;
    idx as u16
}

fn tri_vert<'a>(verts: &'a [i32], indices: &[u32], i: usize) -> &'a [i32] {
    let v = (indices[i] & INDEX_MASK) as usize;
    &verts[v * 4..v * 4 + 4]
}

fn in_cone(i: usize, j: usize, n: usize, verts: &[i32], indices: &[u32], loose: bool) -> bool {
    let pi = tri_vert(verts, indices, i);
    let pj = tri_vert(verts, indices, j);
    let pi1 = tri_vert(verts, indices, next(i, n));
    let pin1 = tri_vert(verts, indices, prev(i, n));

    if left_on(pin1, pi, pi1) {
        if loose {
            return left_on(pi, pj, pin1) && left_on(pj, pi, pi1);
        }
        return left(pi, pj, pin1) && left(pj, pi, pi1);
    }
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

fn diagonalie(i: usize, j: usize, n: usize, verts: &[i32], indices: &[u32], loose: bool) -> bool {
    let d0 = tri_vert(verts, indices, i);
    let d1 = tri_vert(verts, indices, j);
    for k in 0..n {
        let k1 = next(k, n);
        if k == i || k1 == i || k == j || k1 == j {
            continue;
        }
        let p0 = tri_vert(verts, indices, k);
        let p1 = tri_vert(verts, indices, k1);
        if vequal_2d(d0, p0) || vequal_2d(d1, p0) || vequal_2d(d0, p1) || vequal_2d(d1, p1) {
            continue;
        }
        let hit = if loose { intersect_prop(d0, d1, p0, p1) } else { intersect(d0, d1, p0, p1) };
        if hit {
            return false;
        }
    }
    true
}

fn diagonal(i: usize, j: usize, n: usize, verts: &[i32], indices: &[u32], loose: bool) -> bool {
    in_cone(i, j, n, verts, indices, loose) && diagonalie(i, j, n, verts, indices, loose)
}

/// Ear-clips the polygon `indices` into `tris`.
///
/// Returns false when the polygon could not be fully triangulated; the
/// triangles found so far are kept.
fn triangulate(mut n: usize, verts: &[i32], indices: &mut Vec<u32>, tris: &mut Vec<u32>) -> bool {
    tris.clear();

    for i in 0..n {
        let i1 = next(i, n);
        let i2 = next(i1, n);
        if diagonal(i, i2, n, verts, indices, false) {
            indices[i1] |= DIAGONAL_FLAG;
        }
    }

    let ear_len = |indices: &[u32], a: usize, b: usize| -> i32 {
        let p0 = tri_vert(verts, indices, a);
        let p2 = tri_vert(verts, indices, b);
        let dx = p2[0] - p0[0];
        let dz = p2[2] - p0[2];
        dx * dx + dz * dz
    };

    while n > 3 {
        // Clip the ear with the shortest diagonal
        let mut best: Option<(usize, i32)> = None;
        for i in 0..n {
            let i1 = next(i, n);
            if indices[i1] & DIAGONAL_FLAG != 0 {
                let len = ear_len(indices, i, next(i1, n));
                if best.map_or(true, |(_, l)| len < l) {
                    best = Some((i, len));
                }
            }
        }

        if best.is_none() {
            // Overlapping segments can hide every ear, retry with the loose test
            for i in 0..n {
                let i1 = next(i, n);
                let i2 = next(i1, n);
                if diagonal(i, i2, n, verts, indices, true) {
                    let len = ear_len(indices, i, next(i2, n));
                    if best.map_or(true, |(_, l)| len < l) {
                        best = Some((i, len));
                    }
                }
            }
        }

        let Some((i, _)) = best else {
            return false;
        };

        let i1 = next(i, n);
        let i2 = next(i1, n);
        tris.extend_from_slice(&[indices[i] & INDEX_MASK, indices[i1] & INDEX_MASK, indices[i2] & INDEX_MASK]);

        indices.remove(i1);
        n -= 1;
        let i1 = if i1 >= n { 0 } else { i1 };
        let i = prev(i1, n);

        if diagonal(prev(i, n), i1, n, verts, indices, false) {
            indices[i] |= DIAGONAL_FLAG;
        } else {
            indices[i] &= INDEX_MASK;
        }
        if diagonal(i, next(i1, n), n, verts, indices, false) {
            indices[i1] |= DIAGONAL_FLAG;
        } else {
            indices[i1] &= INDEX_MASK;
        }
    }

    tris.extend_from_slice(&[indices[0] & INDEX_MASK, indices[1] & INDEX_MASK, indices[2] & INDEX_MASK]);
    true
}

pub(crate) fn count_poly_verts(p: &[u16]) -> usize {
    p.iter().position(|&v| v == RC_MESH_NULL_IDX).unwrap_or(p.len())
}

fn uleft(a: &[u16], b: &[u16], c: &[u16]) -> bool {
    (b[0] as i32 - a[0] as i32) * (c[2] as i32 - a[2] as i32)
        - (c[0] as i32 - a[0] as i32) * (b[2] as i32 - a[2] as i32)
        < 0
}

/// Length of the shared edge when `pa` and `pb` can be merged into a convex
/// polygon, together with the edge index in each polygon.
fn poly_merge_value(pa: &[u16], pb: &[u16], verts: &[u16], nvp: usize) -> Option<(i32, usize, usize)> {
    let na = count_poly_verts(pa);
    let nb = count_poly_verts(pb);
    if na + nb - 2 > nvp {
        return None;
    }

    let mut shared = None;
    'outer: for i in 0..na {
        let (mut va0, mut va1) = (pa[i], pa[(i + 1) % na]);
        if va0 > va1 {
            std::mem::swap(&mut va0, &mut va1);
        }
        for j in 0..nb {
            let (mut vb0, mut vb1) = (pb[j], pb[(j + 1) % nb]);
            if vb0 > vb1 {
                std::mem::swap(&mut vb0, &mut vb1);
            }
            if va0 == vb0 && va1 == vb1 {
                shared = Some((i, j));
                break 'outer;
            }
        }
    }
    let (ea, eb) = shared?;

    let v = |i: u16| &verts[i as usize * 3..i as usize * 3 + 3];

    // The merged polygon must stay convex at both ends of the shared edge
    let va = pa[(ea + na - 1) % na];
    let vb = pa[ea];
    let vc = pb[(eb + 2) % nb];
    if !uleft(v(va), v(vb), v(vc)) {
        return None;
    }
    let va = pb[(eb + nb - 1) % nb];
    let vb = pb[eb];
    let vc = pa[(ea + 2) % na];
    if !uleft(v(va), v(vb), v(vc)) {
        return None;
    }

    let a = v(pa[ea]);
    let b = v(pa[(ea + 1) % na]);
    let dx = a[0] as i32 - b[0] as i32;
    let dz = a[2] as i32 - b[2] as i32;
    Some((dx * dx + dz * dz, ea, eb))
}

fn merge_poly_verts(pa: &mut [u16], pb: &[u16], ea: usize, eb: usize, tmp: &mut [u16]) {
    let na = count_poly_verts(pa);
    let nb = count_poly_verts(pb);
    tmp.fill(RC_MESH_NULL_IDX);
    let mut n = 0;
    for i in 0..na - 1 {
        tmp[n] = pa[(ea + 1 + i) % na];
        n += 1;
    }
    for i in 0..nb - 1 {
        tmp[n] = pb[(eb + 1 + i) % nb];
        n += 1;
    }
    pa.copy_from_slice(tmp);
}

/// Greedily merges the polygons in `polys` (stride `nvp`) along their
/// longest shared edges. Region and area arrays, when given, follow the
/// polygons.
fn merge_polys(
    polys: &mut Vec<u16>,
    mut attrs: Option<(&mut Vec<u16>, &mut Vec<u8>)>,
    verts: &[u16],
    nvp: usize,
    tmp: &mut [u16],
) {
    loop {
        let npolys = polys.len() / nvp;
        let mut best: Option<(i32, usize, usize, usize, usize)> = None;
        for j in 0..npolys.saturating_sub(1) {
            for k in j + 1..npolys {
                let pj = &polys[j * nvp..(j + 1) * nvp];
                let pk = &polys[k * nvp..(k + 1) * nvp];
                if let Some((value, ea, eb)) = poly_merge_value(pj, pk, verts, nvp) {
                    if best.map_or(true, |b| value > b.0) {
                        best = Some((value, j, k, ea, eb));
                    }
                }
            }
        }

        let Some((_, pa, pb, ea, eb)) = best else {
            break;
        };

        let (head, tail) = polys.split_at_mut(pb * nvp);
        merge_poly_verts(&mut head[pa * nvp..(pa + 1) * nvp], &tail[..nvp], ea, eb, tmp);

        if let Some((regs, _)) = attrs.as_mut() {
            if regs[pa] != regs[pb] {
                regs[pa] = RC_MULTIPLE_REGS;
            }
        }

        // Move the last polygon into the slot of the merged one
        let last = npolys - 1;
        if pb != last {
            let (head, tail) = polys.split_at_mut(last * nvp);
            head[pb * nvp..(pb + 1) * nvp].copy_from_slice(&tail[..nvp]);
        }
        polys.truncate(last * nvp);
        if let Some((regs, areas)) = attrs.as_mut() {
            regs.swap_remove(pb);
            areas.swap_remove(pb);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::{build_contours, Contour};
    use crate::{build_distance_field, build_regions_watershed, CompactHeightfield, Heightfield, RC_WALKABLE_AREA};

    fn square_contour(size: i32, reg: u16) -> Contour {
        Contour {
            verts: vec![0, 0, 0, 0, 0, 0, size, 0, size, 0, size, 0, size, 0, 0, 0],
            rverts: Vec::new(),
            reg,
            area: RC_WALKABLE_AREA,
        }
    }

    fn cset_of(contours: Vec<Contour>, size: i32, border_size: i32) -> ContourSet {
        ContourSet {
            contours,
            bmin: Vec3::ZERO,
            bmax: Vec3::new(size as f32, 1.0, size as f32),
            cs: 1.0,
            ch: 1.0,
            width: size,
            height: size,
            border_size,
            max_error: 1.3,
        }
    }

    #[test]
    fn test_square_merges_into_single_quad() {
        let mesh = PolyMesh::build_from_contour_set(&cset_of(vec![square_contour(4, 1)], 4, 0), 6).unwrap();
        assert_eq!(mesh.nverts(), 4);
        assert_eq!(mesh.npolys(), 1);
        assert_eq!(mesh.poly_vert_count(0), 4);
        assert_eq!(mesh.regs, vec![1]);
        assert_eq!(mesh.flags, vec![0]);
    }

    #[test]
    fn test_triangles_only_with_nvp_three() {
        let mesh = PolyMesh::build_from_contour_set(&cset_of(vec![square_contour(4, 1)], 4, 0), 3).unwrap();
        assert_eq!(mesh.npolys(), 2);
        // The two triangles share the diagonal
        let p0 = mesh.poly(0);
        assert!(p0[3..].iter().any(|&n| n == 1));
    }

    #[test]
    fn test_portal_edges_on_tile_border() {
        let mesh = PolyMesh::build_from_contour_set(&cset_of(vec![square_contour(4, 1)], 4, 2), 6).unwrap();
        let p = mesh.poly(0);
        let nv = mesh.poly_vert_count(0);
        let mut sides: Vec<u16> = p[6..6 + nv].iter().map(|&n| n & !RC_PORTAL_FLAG).collect();
        assert!(p[6..6 + nv].iter().all(|&n| n & RC_PORTAL_FLAG != 0));
        sides.sort_unstable();
        assert_eq!(sides, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_invalid_nvp_is_rejected() {
        assert!(PolyMesh::build_from_contour_set(&cset_of(Vec::new(), 4, 0), 7).is_err());
    }

    #[test]
    fn test_vertices_are_welded() {
        let mut verts = Vec::new();
        let mut first = vec![-1; VERTEX_BUCKET_COUNT];
        let mut next_vert = Vec::new();
        let a = add_vertex(3, 10, 4, &mut verts, &mut first, &mut next_vert);
        let b = add_vertex(3, 12, 4, &mut verts, &mut first, &mut next_vert);
        let c = add_vertex(3, 13, 4, &mut verts, &mut first, &mut next_vert);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(verts.len(), 6);
    }

    #[test]
    fn test_triangulate_concave_polygon() {
        // L shape
        let verts = [
            0, 0, 0, 0, 0, 0, 4, 0, 2, 0, 4, 0, 2, 0, 2, 0, 4, 0, 2, 0, 4, 0, 0, 0,
        ];
        let mut indices: Vec<u32> = (0..6).collect();
        let mut tris = Vec::new();
        assert!(triangulate(6, &verts, &mut indices, &mut tris));
        assert_eq!(tris.len(), 12);
    }

    #[test]
    fn test_mesh_from_rasterized_floor() {
        let mut hf = Heightfield::new(16, 16, Vec3::ZERO, Vec3::new(16.0, 4.0, 16.0), 1.0, 0.5);
        for z in 0..16 {
            for x in 0..16 {
                hf.add_span(x, z, 0, 2, RC_WALKABLE_AREA, 1);
            }
        }
        let mut chf = CompactHeightfield::build_from_heightfield(&hf, 4, 1).unwrap();
        build_distance_field(&mut chf);
        build_regions_watershed(&mut chf, 0, 1, 0).unwrap();
        let cset = build_contours(&chf, 1.3, 12).unwrap();
        let mesh = PolyMesh::build_from_contour_set(&cset, 6).unwrap();
        assert!(mesh.npolys() > 0);
        for i in 0..mesh.npolys() {
            assert!(mesh.poly_vert_count(i) >= 3);
            for &n in &mesh.poly(i)[6..6 + mesh.poly_vert_count(i)] {
                assert!(n == RC_MESH_NULL_IDX || (n as usize) < mesh.npolys());
            }
        }
    }
}
