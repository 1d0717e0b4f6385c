//! Contour tracing and simplification of region boundaries
//!
//! Raw contours follow the voxel edges of each region. They are simplified to
//! the vertices where the neighbouring region changes, then refined until the
//! raw outline lies within `max_error` and no wall edge exceeds
//! `max_edge_len`. Holes are stitched into their outline with the shortest
//! non-crossing diagonal.

use glam::Vec3;
use recast_common::Result;

use crate::{CompactHeightfield, RC_AREA_BORDER, RC_BORDER_REG, RC_BORDER_VERTEX, RC_CONTOUR_REG_MASK};

/// A simplified region outline. Vertices are `[x, y, z, flags]` in voxel
/// coordinates relative to the tile, border removed.
#[derive(Debug, Clone, Default)]
pub struct Contour {
    /// Simplified vertices, 4 values each
    pub verts: Vec<i32>,
    /// Raw vertices, 4 values each
    pub rverts: Vec<i32>,
    /// Region id
    pub reg: u16,
    /// Area id
    pub area: u8,
}

impl Contour {
    /// Number of simplified vertices
    #[inline]
    pub fn nverts(&self) -> usize {
        self.verts.len() / 4
    }
}

/// All contours of a tile
#[derive(Debug, Clone, Default)]
pub struct ContourSet {
    /// The contours
    pub contours: Vec<Contour>,
    /// Bounds with the border removed
    pub bmin: Vec3,
    /// Bounds with the border removed
    pub bmax: Vec3,
    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,
    /// Width without the border
    pub width: i32,
    /// Height without the border
    pub height: i32,
    /// Border size of the source field
    pub border_size: i32,
    /// Simplification error the set was built with
    pub max_error: f32,
}

fn get_corner_height(chf: &CompactHeightfield, x: i32, z: i32, i: usize, dir: i32) -> (i32, bool) {
    let s = chf.spans[i];
    let mut ch = s.y as i32;
    let dirp = (dir + 1) & 0x3;

    let mut regs = [0u32; 4];
    regs[0] = s.reg as u32 | ((chf.areas[i] as u32) << 16);

    if let Some((ax, az, ai)) = chf.neighbour(x, z, i, dir) {
        ch = ch.max(chf.spans[ai].y as i32);
        regs[1] = chf.spans[ai].reg as u32 | ((chf.areas[ai] as u32) << 16);
        if let Some((_, _, ai2)) = chf.neighbour(ax, az, ai, dirp) {
            ch = ch.max(chf.spans[ai2].y as i32);
            regs[2] = chf.spans[ai2].reg as u32 | ((chf.areas[ai2] as u32) << 16);
        }
    }
    if let Some((ax, az, ai)) = chf.neighbour(x, z, i, dirp) {
        ch = ch.max(chf.spans[ai].y as i32);
        regs[3] = chf.spans[ai].reg as u32 | ((chf.areas[ai] as u32) << 16);
        if let Some((_, _, ai2)) = chf.neighbour(ax, az, ai, dir) {
            ch = ch.max(chf.spans[ai2].y as i32);
            regs[2] = chf.spans[ai2].reg as u32 | ((chf.areas[ai2] as u32) << 16);
        }
    }

    // A vertex between two exterior border cells and two interior cells of
    // the same area is removed later
    let border = RC_BORDER_REG as u32;
    let mut is_border_vertex = false;
    for j in 0..4 {
        let a = j;
        let b = (j + 1) & 0x3;
        let c = (j + 2) & 0x3;
        let d = (j + 3) & 0x3;

        let two_same_exts = (regs[a] & regs[b] & border) != 0 && regs[a] == regs[b];
        let two_ints = ((regs[c] | regs[d]) & border) == 0;
        let ints_same_area = (regs[c] >> 16) == (regs[d] >> 16);
        let no_zeros = regs.iter().all(|&r| r != 0);
        if two_same_exts && two_ints && ints_same_area && no_zeros {
            is_border_vertex = true;
            break;
        }
    }

    (ch, is_border_vertex)
}

fn walk_contour(
    chf: &CompactHeightfield,
    mut x: i32,
    mut z: i32,
    mut i: usize,
    flags: &mut [u8],
    points: &mut Vec<i32>,
) {
    let mut dir = 0;
    while flags[i] & (1 << dir) == 0 {
        dir += 1;
    }
    let start_dir = dir;
    let start_i = i;
    let area = chf.areas[i];

    for _ in 1..40000 {
        if flags[i] & (1 << dir) != 0 {
            let (py, is_border_vertex) = get_corner_height(chf, x, z, i, dir);
            let mut px = x;
            let mut pz = z;
            match dir {
                0 => pz += 1,
                1 => {
                    px += 1;
                    pz += 1;
                }
                2 => px += 1,
                _ => {}
            }

            let mut r = 0i32;
            let mut is_area_border = false;
            if let Some((_, _, ai)) = chf.neighbour(x, z, i, dir) {
                r = chf.spans[ai].reg as i32;
                if area != chf.areas[ai] {
                    is_area_border = true;
                }
            }
            if is_border_vertex {
                r |= RC_BORDER_VERTEX;
            }
            if is_area_border {
                r |= RC_AREA_BORDER;
            }
            points.extend_from_slice(&[px, py, pz, r]);

            flags[i] &= !(1 << dir);
            dir = (dir + 1) & 0x3;
        } else {
            let Some((nx, nz, ni)) = chf.neighbour(x, z, i, dir) else {
                return;
            };
            x = nx;
            z = nz;
            i = ni;
            dir = (dir + 3) & 0x3;
        }

        if start_i == i && start_dir == dir {
            break;
        }
    }
}

fn distance_pt_seg(x: i32, z: i32, px: i32, pz: i32, qx: i32, qz: i32) -> f32 {
    let pqx = (qx - px) as f32;
    let pqz = (qz - pz) as f32;
    let dx = (x - px) as f32;
    let dz = (z - pz) as f32;
    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    let t = t.clamp(0.0, 1.0);
    let dx = px as f32 + t * pqx - x as f32;
    let dz = pz as f32 + t * pqz - z as f32;
    dx * dx + dz * dz
}

fn simplify_contour(points: &[i32], simplified: &mut Vec<i32>, max_error: f32, max_edge_len: i32) {
    let pn = points.len() / 4;

    let has_connections = points
        .chunks_exact(4)
        .any(|p| p[3] & RC_CONTOUR_REG_MASK != 0);

    if has_connections {
        // Keep the vertices where the neighbour region or area changes
        for i in 0..pn {
            let ii = (i + 1) % pn;
            let different_regs =
                (points[i * 4 + 3] & RC_CONTOUR_REG_MASK) != (points[ii * 4 + 3] & RC_CONTOUR_REG_MASK);
            let area_borders =
                (points[i * 4 + 3] & RC_AREA_BORDER) != (points[ii * 4 + 3] & RC_AREA_BORDER);
            if different_regs || area_borders {
                simplified.extend_from_slice(&[points[i * 4], points[i * 4 + 1], points[i * 4 + 2], i as i32]);
            }
        }
    }

    if simplified.is_empty() {
        // No connections, seed with the lower-left and upper-right vertices
        let mut ll = (points[0], points[1], points[2], 0usize);
        let mut ur = ll;
        for i in 0..pn {
            let (x, y, z) = (points[i * 4], points[i * 4 + 1], points[i * 4 + 2]);
            if x < ll.0 || (x == ll.0 && z < ll.2) {
                ll = (x, y, z, i);
            }
            if x > ur.0 || (x == ur.0 && z > ur.2) {
                ur = (x, y, z, i);
            }
        }
        simplified.extend_from_slice(&[ll.0, ll.1, ll.2, ll.3 as i32]);
        simplified.extend_from_slice(&[ur.0, ur.1, ur.2, ur.3 as i32]);
    }

    // Add points until all raw points are within the error tolerance
    let mut i = 0;
    while i < simplified.len() / 4 {
        let ii = (i + 1) % (simplified.len() / 4);

        let mut ax = simplified[i * 4];
        let mut az = simplified[i * 4 + 2];
        let ai = simplified[i * 4 + 3] as usize;
        let mut bx = simplified[ii * 4];
        let mut bz = simplified[ii * 4 + 2];
        let bi = simplified[ii * 4 + 3] as usize;

        let mut maxd = 0.0f32;
        let mut maxi: Option<usize> = None;

        // Traverse the segment in lexicographic order so shared edges
        // simplify identically on both sides
        let (cinc, mut ci, endi) = if bx > ax || (bx == ax && bz > az) {
            (1, (ai + 1) % pn, bi)
        } else {
            std::mem::swap(&mut ax, &mut bx);
            std::mem::swap(&mut az, &mut bz);
            (pn - 1, (bi + pn - 1) % pn, ai)
        };

        // Tessellate only outer edges or edges between areas
        if points[ci * 4 + 3] & RC_CONTOUR_REG_MASK == 0 || points[ci * 4 + 3] & RC_AREA_BORDER != 0 {
            while ci != endi {
                let d = distance_pt_seg(points[ci * 4], points[ci * 4 + 2], ax, az, bx, bz);
                if d > maxd {
                    maxd = d;
                    maxi = Some(ci);
                }
                ci = (ci + cinc) % pn;
            }
        }

        match maxi {
            Some(m) if maxd > max_error * max_error => {
                let at = (i + 1) * 4;
                simplified.splice(
                    at..at,
                    [points[m * 4], points[m * 4 + 1], points[m * 4 + 2], m as i32],
                );
            }
            _ => i += 1,
        }
    }

    // Split too long wall edges
    if max_edge_len > 0 {
        let mut i = 0;
        while i < simplified.len() / 4 {
            let ii = (i + 1) % (simplified.len() / 4);

            let ax = simplified[i * 4];
            let az = simplified[i * 4 + 2];
            let ai = simplified[i * 4 + 3] as usize;
            let bx = simplified[ii * 4];
            let bz = simplified[ii * 4 + 2];
            let bi = simplified[ii * 4 + 3] as usize;

            let mut maxi: Option<usize> = None;
            let ci = (ai + 1) % pn;

            if points[ci * 4 + 3] & RC_CONTOUR_REG_MASK == 0 {
                let dx = bx - ax;
                let dz = bz - az;
                if dx * dx + dz * dz > max_edge_len * max_edge_len {
                    let n = if bi < ai { bi + pn - ai } else { bi - ai };
                    if n > 1 {
                        maxi = Some(if bx > ax || (bx == ax && bz > az) {
                            (ai + n / 2) % pn
                        } else {
                            (ai + (n + 1) / 2) % pn
                        });
                    }
                }
            }

            match maxi {
                Some(m) => {
                    let at = (i + 1) * 4;
                    simplified.splice(
                        at..at,
                        [points[m * 4], points[m * 4 + 1], points[m * 4 + 2], m as i32],
                    );
                }
                None => i += 1,
            }
        }
    }

    for i in 0..simplified.len() / 4 {
        // The edge vertex flag is taken from the current raw point, the
        // neighbour region from the next raw point
        let ai = (simplified[i * 4 + 3] as usize + 1) % pn;
        let bi = simplified[i * 4 + 3] as usize;
        simplified[i * 4 + 3] = (points[ai * 4 + 3] & (RC_CONTOUR_REG_MASK | RC_AREA_BORDER))
            | (points[bi * 4 + 3] & RC_BORDER_VERTEX);
    }
}

fn remove_degenerate_segments(simplified: &mut Vec<i32>) {
    let mut npts = simplified.len() / 4;
    let mut i = 0;
    while i < npts {
        let ni = (i + 1) % npts;
        if simplified[i * 4] == simplified[ni * 4] && simplified[i * 4 + 2] == simplified[ni * 4 + 2] {
            simplified.drain(i * 4..i * 4 + 4);
            npts -= 1;
        }
        i += 1;
    }
}

fn calc_area_of_polygon_2d(verts: &[i32]) -> i32 {
    let n = verts.len() / 4;
    let mut area = 0;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let vi = &verts[i * 4..];
        let vj = &verts[j * 4..];
        area += vi[0] * vj[2] - vj[0] * vi[2];
        j = i;
    }
    (area + 1) / 2
}

#[inline]
pub(crate) fn prev(i: usize, n: usize) -> usize {
    if i == 0 {
        n - 1
    } else {
        i - 1
    }
}

#[inline]
pub(crate) fn next(i: usize, n: usize) -> usize {
    if i + 1 >= n {
        0
    } else {
        i + 1
    }
}

pub(crate) fn area2(a: &[i32], b: &[i32], c: &[i32]) -> i32 {
    (b[0] - a[0]) * (c[2] - a[2]) - (c[0] - a[0]) * (b[2] - a[2])
}

pub(crate) fn left(a: &[i32], b: &[i32], c: &[i32]) -> bool {
    area2(a, b, c) < 0
}

pub(crate) fn left_on(a: &[i32], b: &[i32], c: &[i32]) -> bool {
    area2(a, b, c) <= 0
}

fn collinear(a: &[i32], b: &[i32], c: &[i32]) -> bool {
    area2(a, b, c) == 0
}

pub(crate) fn vequal_2d(a: &[i32], b: &[i32]) -> bool {
    a[0] == b[0] && a[2] == b[2]
}

/// Proper intersection: the segments cross at a point interior to both
pub(crate) fn intersect_prop(a: &[i32], b: &[i32], c: &[i32], d: &[i32]) -> bool {
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }
    (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
}

fn between(a: &[i32], b: &[i32], c: &[i32]) -> bool {
    if !collinear(a, b, c) {
        return false;
    }
    if a[0] != b[0] {
        (a[0] <= c[0] && c[0] <= b[0]) || (a[0] >= c[0] && c[0] >= b[0])
    } else {
        (a[2] <= c[2] && c[2] <= b[2]) || (a[2] >= c[2] && c[2] >= b[2])
    }
}

/// Segments `ab` and `cd` intersect, properly or improperly
pub(crate) fn intersect(a: &[i32], b: &[i32], c: &[i32], d: &[i32]) -> bool {
    intersect_prop(a, b, c, d)
        || between(a, b, c)
        || between(a, b, d)
        || between(c, d, a)
        || between(c, d, b)
}

fn intersect_seg_contour(d0: &[i32], d1: &[i32], skip: Option<usize>, verts: &[i32]) -> bool {
    let n = verts.len() / 4;
    for k in 0..n {
        let k1 = next(k, n);
        if skip == Some(k) || skip == Some(k1) {
            continue;
        }
        let p0 = &verts[k * 4..k * 4 + 4];
        let p1 = &verts[k1 * 4..k1 * 4 + 4];
        if vequal_2d(d0, p0) || vequal_2d(d1, p0) || vequal_2d(d0, p1) || vequal_2d(d1, p1) {
            continue;
        }
        if intersect(d0, d1, p0, p1) {
            return true;
        }
    }
    false
}

fn in_cone(i: usize, verts: &[i32], pj: &[i32]) -> bool {
    let n = verts.len() / 4;
    let pi = &verts[i * 4..i * 4 + 4];
    let pi1 = &verts[next(i, n) * 4..next(i, n) * 4 + 4];
    let pin1 = &verts[prev(i, n) * 4..prev(i, n) * 4 + 4];

    if left_on(pin1, pi, pi1) {
        return left(pi, pj, pin1) && left(pj, pi, pi1);
    }
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

fn merge_contours(ca: &mut Contour, cb: &mut Contour, ia: usize, ib: usize) {
    let na = ca.nverts();
    let nb = cb.nverts();
    let mut verts = Vec::with_capacity((na + nb + 2) * 4);
    for i in 0..=na {
        let src = ((ia + i) % na) * 4;
        verts.extend_from_slice(&ca.verts[src..src + 4]);
    }
    for i in 0..=nb {
        let src = ((ib + i) % nb) * 4;
        verts.extend_from_slice(&cb.verts[src..src + 4]);
    }
    ca.verts = verts;
    cb.verts.clear();
}

fn find_left_most_vertex(contour: &Contour) -> (i32, i32, usize) {
    let mut minx = contour.verts[0];
    let mut minz = contour.verts[2];
    let mut leftmost = 0;
    for i in 1..contour.nverts() {
        let x = contour.verts[i * 4];
        let z = contour.verts[i * 4 + 2];
        if x < minx || (x == minx && z < minz) {
            minx = x;
            minz = z;
            leftmost = i;
        }
    }
    (minx, minz, leftmost)
}

fn merge_region_holes(contours: &mut [Contour], outline: usize, holes: &[usize]) {
    // Sort holes from left to right
    let mut holes: Vec<(usize, i32, i32, usize)> = holes
        .iter()
        .map(|&h| {
            let (minx, minz, leftmost) = find_left_most_vertex(&contours[h]);
            (h, minx, minz, leftmost)
        })
        .collect();
    holes.sort_by(|a, b| (a.1, a.2).cmp(&(b.1, b.2)));

    let mut diags: Vec<(usize, i32)> = Vec::new();

    for hi in 0..holes.len() {
        let (hole, _, _, leftmost) = holes[hi];
        let hole_nverts = contours[hole].nverts();
        let mut index = None;
        let mut best_vertex = leftmost;

        for _ in 0..hole_nverts {
            // Find potential diagonals, closest first
            diags.clear();
            let corner = contours[hole].verts[best_vertex * 4..best_vertex * 4 + 4].to_vec();
            let outline_verts = &contours[outline].verts;
            for j in 0..outline_verts.len() / 4 {
                if in_cone(j, outline_verts, &corner) {
                    let dx = outline_verts[j * 4] - corner[0];
                    let dz = outline_verts[j * 4 + 2] - corner[2];
                    diags.push((j, dx * dx + dz * dz));
                }
            }
            diags.sort_by_key(|d| d.1);

            // Take the closest diagonal that does not cross any edge
            for &(vert, _) in &diags {
                let pt = &outline_verts[vert * 4..vert * 4 + 4];
                let mut crosses = intersect_seg_contour(pt, &corner, Some(vert), outline_verts);
                for &(other, _, _, _) in &holes[hi..] {
                    if crosses {
                        break;
                    }
                    crosses |= intersect_seg_contour(pt, &corner, None, &contours[other].verts);
                }
                if !crosses {
                    index = Some(vert);
                    break;
                }
            }
            if index.is_some() {
                break;
            }
            best_vertex = (best_vertex + 1) % hole_nverts;
        }

        let Some(index) = index else {
            log::warn!(
                "failed to find merge points for outline region {} and hole {hole}",
                contours[outline].reg
            );
            continue;
        };

        let (ca, cb) = if outline < hole {
            let (lo, hi_part) = contours.split_at_mut(hole);
            (&mut lo[outline], &mut hi_part[0])
        } else {
            let (lo, hi_part) = contours.split_at_mut(outline);
            (&mut hi_part[0], &mut lo[hole])
        };
        merge_contours(ca, cb, index, best_vertex);
    }
}

/// Traces and simplifies the boundary of every region in `chf`.
pub fn build_contours(chf: &CompactHeightfield, max_error: f32, max_edge_len: i32) -> Result<ContourSet> {
    let w = chf.width;
    let h = chf.height;
    let border_size = chf.border_size;

    let mut cset = ContourSet {
        contours: Vec::new(),
        bmin: chf.bmin,
        bmax: chf.bmax,
        cs: chf.cs,
        ch: chf.ch,
        width: w - border_size * 2,
        height: h - border_size * 2,
        border_size,
        max_error,
    };
    if border_size > 0 {
        let pad = border_size as f32 * chf.cs;
        cset.bmin.x += pad;
        cset.bmin.z += pad;
        cset.bmax.x -= pad;
        cset.bmax.z -= pad;
    }

    // Mark boundaries: one bit per direction whose neighbour is in another region
    let mut flags = vec![0u8; chf.span_count()];
    for z in 0..h {
        for x in 0..w {
            for i in chf.cell(x, z).spans() {
                let s = chf.spans[i];
                if s.reg == 0 || s.reg & RC_BORDER_REG != 0 {
                    flags[i] = 0;
                    continue;
                }
                let mut res = 0u8;
                for dir in 0..4 {
                    let r = chf
                        .neighbour(x, z, i, dir)
                        .map_or(0, |(_, _, ai)| chf.spans[ai].reg);
                    if r == s.reg {
                        res |= 1 << dir;
                    }
                }
                flags[i] = res ^ 0xf;
            }
        }
    }

    let mut verts: Vec<i32> = Vec::with_capacity(256);
    let mut simplified: Vec<i32> = Vec::with_capacity(64);

    for z in 0..h {
        for x in 0..w {
            for i in chf.cell(x, z).spans() {
                if flags[i] == 0 || flags[i] == 0xf {
                    flags[i] = 0;
                    continue;
                }
                let reg = chf.spans[i].reg;
                if reg == 0 || reg & RC_BORDER_REG != 0 {
                    continue;
                }
                let area = chf.areas[i];

                verts.clear();
                simplified.clear();

                walk_contour(chf, x, z, i, &mut flags, &mut verts);
                simplify_contour(&verts, &mut simplified, max_error, max_edge_len);
                remove_degenerate_segments(&mut simplified);

                if simplified.len() / 4 >= 3 {
                    let mut contour = Contour {
                        verts: simplified.clone(),
                        rverts: verts.clone(),
                        reg,
                        area,
                    };
                    if border_size > 0 {
                        for v in contour.verts.chunks_exact_mut(4) {
                            v[0] -= border_size;
                            v[2] -= border_size;
                        }
                        for v in contour.rverts.chunks_exact_mut(4) {
                            v[0] -= border_size;
                            v[2] -= border_size;
                        }
                    }
                    cset.contours.push(contour);
                }
            }
        }
    }

    // Merge holes into their outlines
    let winding: Vec<i32> = cset
        .contours
        .iter()
        .map(|c| if calc_area_of_polygon_2d(&c.verts) < 0 { -1 } else { 1 })
        .collect();
    if winding.iter().any(|&w| w < 0) {
        let nregions = chf.max_regions as usize + 1;
        let mut outlines: Vec<Option<usize>> = vec![None; nregions];
        let mut holes: Vec<Vec<usize>> = vec![Vec::new(); nregions];

        for (i, c) in cset.contours.iter().enumerate() {
            let reg = c.reg as usize;
            if reg >= nregions {
                continue;
            }
            if winding[i] > 0 {
                if outlines[reg].is_some() {
                    log::warn!("multiple outlines for region {reg}");
                }
                outlines[reg] = Some(i);
            } else {
                holes[reg].push(i);
            }
        }

        for reg in 0..nregions {
            if holes[reg].is_empty() {
                continue;
            }
            match outlines[reg] {
                Some(outline) => merge_region_holes(&mut cset.contours, outline, &holes[reg]),
                None => log::warn!("bad outline for region {reg}, contour simplification is likely too aggressive"),
            }
        }
        cset.contours.retain(|c| c.nverts() >= 3);
    }

    Ok(cset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_distance_field, build_regions_watershed, Heightfield, RC_NULL_AREA, RC_WALKABLE_AREA};

    fn regions_for(w: i32, h: i32, hole: Option<(i32, i32, i32, i32)>) -> CompactHeightfield {
        let mut hf = Heightfield::new(w, h, Vec3::ZERO, Vec3::new(w as f32, 10.0, h as f32), 1.0, 0.5);
        for z in 0..h {
            for x in 0..w {
                let in_hole = hole.is_some_and(|(x0, z0, x1, z1)| x >= x0 && x < x1 && z >= z0 && z < z1);
                hf.add_span(x, z, 0, 2, if in_hole { RC_NULL_AREA } else { RC_WALKABLE_AREA }, 1);
            }
        }
        let mut chf = CompactHeightfield::build_from_heightfield(&hf, 4, 1).unwrap();
        build_distance_field(&mut chf);
        build_regions_watershed(&mut chf, 0, 1, 0).unwrap();
        chf
    }

    #[test]
    fn test_square_contour_has_corners() {
        let chf = regions_for(8, 8, None);
        let cset = build_contours(&chf, 1.3, 12).unwrap();
        assert!(!cset.contours.is_empty());
        for c in &cset.contours {
            assert!(c.nverts() >= 3);
            assert!(c.rverts.len() >= c.verts.len());
        }
        let all: Vec<(i32, i32)> = cset
            .contours
            .iter()
            .flat_map(|c| c.verts.chunks_exact(4).map(|v| (v[0], v[2])).collect::<Vec<_>>())
            .collect();
        for corner in [(0, 0), (8, 0), (8, 8), (0, 8)] {
            assert!(all.contains(&corner), "missing corner {corner:?}");
        }
    }

    #[test]
    fn test_long_edges_are_split() {
        let chf = regions_for(20, 4, None);
        let cset = build_contours(&chf, 1.3, 5).unwrap();
        for c in &cset.contours {
            let n = c.nverts();
            for i in 0..n {
                let a = &c.verts[i * 4..];
                let b = &c.verts[((i + 1) % n) * 4..];
                let dx = b[0] - a[0];
                let dz = b[2] - a[2];
                assert!(dx * dx + dz * dz <= 25 || (a[3] & RC_CONTOUR_REG_MASK) != 0);
            }
        }
    }

    #[test]
    fn test_hole_is_merged_into_outline() {
        let chf = regions_for(12, 12, Some((5, 5, 7, 7)));
        let cset = build_contours(&chf, 1.3, 0).unwrap();
        assert!(!cset.contours.is_empty());
        for c in &cset.contours {
            assert!(c.nverts() >= 3);
            assert!(calc_area_of_polygon_2d(&c.verts) > 0);
        }
    }

    #[test]
    fn test_area_of_polygon() {
        let square = [0, 0, 0, 0, 0, 0, 2, 0, 2, 0, 2, 0, 2, 0, 0, 0];
        assert_eq!(calc_area_of_polygon_2d(&square), 4);
    }

    #[test]
    fn test_intersection_predicates() {
        let a = [0, 0, 0, 0];
        let b = [4, 0, 4, 0];
        let c = [0, 0, 4, 0];
        let d = [4, 0, 0, 0];
        assert!(intersect_prop(&a, &b, &c, &d));
        let e = [2, 0, 2, 0];
        assert!(!intersect_prop(&a, &b, &e, &d));
        assert!(intersect(&a, &b, &e, &d));
    }
}
