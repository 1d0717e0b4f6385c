//! Heightfield layers
//!
//! A compact heightfield is split into horizontal layers in which every
//! column holds at most one walkable span. Layers are the unit the tile cache
//! stores and rebuilds, so a bridge over a road ends up as two layers of the
//! same tile.

use glam::Vec3;
use recast_common::{Error, Result};

use crate::{
    get_dir_offset_x, get_dir_offset_y, CompactCell, CompactHeightfield, CompactSpan, RC_NOT_CONNECTED,
    RC_NULL_AREA,
};

const MAX_LAYER_OVERLAPS: usize = 63;
const MAX_NEIGHBOURS: usize = 16;
const NO_REGION: u8 = 0xff;
const MAX_STACK: usize = 64;

/// Height value of an empty layer cell
pub const RC_LAYER_EMPTY: u8 = 0xff;

/// One layer of a tile: at most one floor per column, heights relative to
/// `hmin`
#[derive(Debug, Clone, PartialEq)]
pub struct HeightfieldLayer {
    /// Bounds, `bmin.y` is the floor of `hmin`
    pub bmin: Vec3,
    /// Bounds, `bmax.y` is the floor of `hmax`
    pub bmax: Vec3,
    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,
    /// Grid width
    pub width: i32,
    /// Grid height
    pub height: i32,
    /// Used area of the grid, inclusive
    pub minx: i32,
    pub maxx: i32,
    pub minz: i32,
    pub maxz: i32,
    /// Height range of the layer in voxels
    pub hmin: i32,
    pub hmax: i32,
    /// Floor height per cell, `RC_LAYER_EMPTY` when the cell is empty
    pub heights: Vec<u8>,
    /// Area id per cell
    pub areas: Vec<u8>,
    /// Walkable connection bit per direction to a cell of the same layer
    pub cons: Vec<u8>,
}

impl HeightfieldLayer {
    /// Builds a compact heightfield with one span per non-empty cell so the
    /// layer can run through region partitioning and the mesh builders.
    pub fn to_compact_heightfield(&self, walkable_height: i32, walkable_climb: i32) -> CompactHeightfield {
        let w = self.width;
        let h = self.height;
        let mut cells = vec![CompactCell::default(); (w * h) as usize];
        let mut spans = Vec::new();
        let mut areas = Vec::new();

        for (idx, cell) in cells.iter_mut().enumerate() {
            cell.index = spans.len() as u32;
            if self.heights[idx] == RC_LAYER_EMPTY {
                continue;
            }
            let mut span = CompactSpan {
                y: self.heights[idx] as u16,
                reg: 0,
                con: 0,
                h: 0xff,
            };
            for dir in 0..4 {
                let con = if self.cons[idx] & (1 << dir) != 0 { 0 } else { RC_NOT_CONNECTED };
                span.set_con(dir, con);
            }
            spans.push(span);
            areas.push(self.areas[idx]);
            cell.count = 1;
        }

        CompactHeightfield {
            width: w,
            height: h,
            walkable_height,
            walkable_climb,
            border_size: 0,
            max_distance: 0,
            max_regions: 0,
            bmin: self.bmin,
            bmax: self.bmax,
            cs: self.cs,
            ch: self.ch,
            cells,
            spans,
            dist: Vec::new(),
            areas,
        }
    }

    /// Number of non-empty cells
    pub fn cell_count(&self) -> usize {
        self.heights.iter().filter(|&&h| h != RC_LAYER_EMPTY).count()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SweepSpan {
    // Samples connected to the neighbour
    ns: u32,
    id: u8,
    nei: u8,
}

#[derive(Debug, Clone)]
struct LayerRegion {
    layers: Vec<u8>,
    neis: Vec<u8>,
    ymin: u16,
    ymax: u16,
    layer_id: u8,
    base: bool,
}

impl Default for LayerRegion {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            neis: Vec::new(),
            ymin: 0xffff,
            ymax: 0,
            layer_id: NO_REGION,
            base: false,
        }
    }
}

fn add_unique(a: &mut Vec<u8>, max: usize, v: u8) -> bool {
    if a.contains(&v) {
        return true;
    }
    if a.len() >= max {
        return false;
    }
    a.push(v);
    true
}

#[inline]
fn overlap_range(amin: u16, amax: u16, bmin: u16, bmax: u16) -> bool {
    !(amin > bmax || amax < bmin)
}

fn layer_overflow() -> Error {
    Error::Recast("layer overflow, too many overlapping walkable platforms".to_string())
}

/// Partitions the walkable spans into monotone regions, one id per span
fn partition_monotone(chf: &CompactHeightfield) -> Result<(Vec<u8>, usize)> {
    let w = chf.width;
    let h = chf.height;
    let mut src_reg = vec![NO_REGION; chf.span_count()];
    let mut sweeps = vec![SweepSpan::default(); w as usize];
    let mut prev_count = [0u32; 256];
    let mut reg_id: usize = 0;

    for z in 0..h {
        prev_count[..reg_id].fill(0);
        let mut sweep_id = 0usize;

        for x in 0..w {
            for i in chf.cell(x, z).spans() {
                if chf.areas[i] == RC_NULL_AREA {
                    continue;
                }

                let mut sid = NO_REGION;
                // -x
                if let Some((_, _, ai)) = chf.neighbour(x, z, i, 0) {
                    if chf.areas[ai] != RC_NULL_AREA && src_reg[ai] != NO_REGION {
                        sid = src_reg[ai];
                    }
                }
                if sid == NO_REGION {
                    if sweep_id >= NO_REGION as usize {
                        return Err(Error::Recast("layer sweep id overflow".to_string()));
                    }
                    if sweep_id >= sweeps.len() {
                        sweeps.push(SweepSpan::default());
                    }
                    sid = sweep_id as u8;
                    sweep_id += 1;
                    sweeps[sid as usize] = SweepSpan { ns: 0, id: 0, nei: NO_REGION };
                }

                // -z
                if let Some((_, _, ai)) = chf.neighbour(x, z, i, 3) {
                    let nr = src_reg[ai];
                    if nr != NO_REGION {
                        let sweep = &mut sweeps[sid as usize];
                        if sweep.ns == 0 {
                            sweep.nei = nr;
                        }
                        if sweep.nei == nr {
                            sweep.ns += 1;
                            prev_count[nr as usize] += 1;
                        } else {
                            // More than one neighbour, start a new region
                            sweep.nei = NO_REGION;
                        }
                    }
                }

                src_reg[i] = sid;
            }
        }

        // A sweep continues the region below when it is its only contact
        for sweep in sweeps.iter_mut().take(sweep_id) {
            if sweep.nei != NO_REGION && prev_count[sweep.nei as usize] == sweep.ns {
                sweep.id = sweep.nei;
            } else {
                if reg_id == 255 {
                    return Err(Error::Recast("layer region id overflow".to_string()));
                }
                sweep.id = reg_id as u8;
                reg_id += 1;
            }
        }

        for x in 0..w {
            for i in chf.cell(x, z).spans() {
                if src_reg[i] != NO_REGION {
                    src_reg[i] = sweeps[src_reg[i] as usize].id;
                }
            }
        }
    }

    Ok((src_reg, reg_id))
}

/// Splits `chf` into layers of non-overlapping walkable spans.
///
/// Regions that overlap vertically never share a layer; regions are merged
/// into a layer while its height range stays below 255 voxels.
pub fn build_heightfield_layers(chf: &CompactHeightfield, walkable_height: i32) -> Result<Vec<HeightfieldLayer>> {
    let w = chf.width;
    let h = chf.height;

    let (src_reg, nregs) = partition_monotone(chf)?;
    let mut regs = vec![LayerRegion::default(); nregs];

    // Region neighbours and vertically overlapping regions
    let mut lregs: Vec<u8> = Vec::with_capacity(MAX_LAYER_OVERLAPS);
    for z in 0..h {
        for x in 0..w {
            lregs.clear();
            for i in chf.cell(x, z).spans() {
                let ri = src_reg[i];
                if ri == NO_REGION {
                    continue;
                }
                let y = chf.spans[i].y;
                let reg = &mut regs[ri as usize];
                reg.ymin = reg.ymin.min(y);
                reg.ymax = reg.ymax.max(y);

                if lregs.len() < MAX_LAYER_OVERLAPS {
                    lregs.push(ri);
                }

                for dir in 0..4 {
                    if let Some((_, _, ai)) = chf.neighbour(x, z, i, dir) {
                        let rai = src_reg[ai];
                        if rai != NO_REGION && rai != ri {
                            // A full list only costs a few extra layers
                            add_unique(&mut regs[ri as usize].neis, MAX_NEIGHBOURS, rai);
                        }
                    }
                }
            }

            for a in 0..lregs.len() {
                for b in a + 1..lregs.len() {
                    let (ra, rb) = (lregs[a], lregs[b]);
                    if ra == rb {
                        continue;
                    }
                    if !add_unique(&mut regs[ra as usize].layers, MAX_LAYER_OVERLAPS, rb)
                        || !add_unique(&mut regs[rb as usize].layers, MAX_LAYER_OVERLAPS, ra)
                    {
                        return Err(layer_overflow());
                    }
                }
            }
        }
    }

    // Flood neighbouring regions into layers
    let mut layer_id: u16 = 0;
    let mut stack: std::collections::VecDeque<usize> = std::collections::VecDeque::with_capacity(MAX_STACK);
    for i in 0..nregs {
        if regs[i].layer_id != NO_REGION {
            continue;
        }
        if layer_id >= NO_REGION as u16 {
            return Err(Error::Recast("too many layers".to_string()));
        }
        regs[i].layer_id = layer_id as u8;
        regs[i].base = true;

        stack.clear();
        stack.push_back(i);
        while let Some(cur) = stack.pop_front() {
            let neis = regs[cur].neis.clone();
            for nei in neis {
                let n = nei as usize;
                if regs[n].layer_id != NO_REGION {
                    continue;
                }
                // Never put overlapping regions in the same layer
                if regs[i].layers.contains(&nei) {
                    continue;
                }
                let ymin = regs[i].ymin.min(regs[n].ymin);
                let ymax = regs[i].ymax.max(regs[n].ymax);
                if ymax - ymin >= 255 {
                    continue;
                }
                if stack.len() < MAX_STACK {
                    stack.push_back(n);
                    regs[n].layer_id = layer_id as u8;
                    let overlaps = regs[n].layers.clone();
                    for l in overlaps {
                        if !add_unique(&mut regs[i].layers, MAX_LAYER_OVERLAPS, l) {
                            return Err(layer_overflow());
                        }
                    }
                    regs[i].ymin = ymin;
                    regs[i].ymax = ymax;
                }
            }
        }
        layer_id += 1;
    }

    // Merge layers that are close in height and do not overlap
    let merge_height = (walkable_height * 4).clamp(0, 0xffff) as u16;
    for i in 0..nregs {
        if !regs[i].base {
            continue;
        }
        let new_id = regs[i].layer_id;

        loop {
            let mut old_id = NO_REGION;
            for j in 0..nregs {
                if i == j || !regs[j].base {
                    continue;
                }
                let (ri, rj) = (&regs[i], &regs[j]);
                if !overlap_range(
                    ri.ymin,
                    ri.ymax.saturating_add(merge_height),
                    rj.ymin,
                    rj.ymax.saturating_add(merge_height),
                ) {
                    continue;
                }
                let ymin = ri.ymin.min(rj.ymin);
                let ymax = ri.ymax.max(rj.ymax);
                if ymax - ymin >= 255 {
                    continue;
                }
                // No region of the other layer may overlap this one
                let overlap = (0..nregs).any(|k| regs[k].layer_id == rj.layer_id && ri.layers.contains(&(k as u8)));
                if overlap {
                    continue;
                }
                old_id = rj.layer_id;
                break;
            }

            if old_id == NO_REGION {
                break;
            }

            for j in 0..nregs {
                if regs[j].layer_id != old_id {
                    continue;
                }
                regs[j].base = false;
                regs[j].layer_id = new_id;
                let overlaps = regs[j].layers.clone();
                for l in overlaps {
                    if !add_unique(&mut regs[i].layers, MAX_LAYER_OVERLAPS, l) {
                        return Err(layer_overflow());
                    }
                }
                regs[i].ymin = regs[i].ymin.min(regs[j].ymin);
                regs[i].ymax = regs[i].ymax.max(regs[j].ymax);
            }
        }
    }

    // Compact the layer ids
    let mut remap = [NO_REGION; 256];
    for r in &regs {
        remap[r.layer_id as usize] = 0;
    }
    let mut nlayers = 0usize;
    for slot in remap.iter_mut() {
        if *slot == 0 {
            *slot = nlayers as u8;
            nlayers += 1;
        }
    }
    for r in &mut regs {
        r.layer_id = remap[r.layer_id as usize];
    }

    let mut layers = Vec::with_capacity(nlayers);
    for cur in 0..nlayers {
        let cur_id = cur as u8;
        let (hmin, hmax) = regs
            .iter()
            .filter(|r| r.base && r.layer_id == cur_id)
            .last()
            .map_or((0, 0), |r| (r.ymin as i32, r.ymax as i32));

        let grid = (w * h) as usize;
        let mut layer = HeightfieldLayer {
            bmin: Vec3::new(chf.bmin.x, chf.bmin.y + hmin as f32 * chf.ch, chf.bmin.z),
            bmax: Vec3::new(chf.bmax.x, chf.bmin.y + hmax as f32 * chf.ch, chf.bmax.z),
            cs: chf.cs,
            ch: chf.ch,
            width: w,
            height: h,
            minx: w,
            maxx: 0,
            minz: h,
            maxz: 0,
            hmin,
            hmax,
            heights: vec![RC_LAYER_EMPTY; grid],
            areas: vec![RC_NULL_AREA; grid],
            cons: vec![0; grid],
        };

        for z in 0..h {
            for x in 0..w {
                for j in chf.cell(x, z).spans() {
                    if src_reg[j] == NO_REGION {
                        continue;
                    }
                    let lid = regs[src_reg[j] as usize].layer_id;
                    if lid != cur_id {
                        continue;
                    }

                    layer.minx = layer.minx.min(x);
                    layer.maxx = layer.maxx.max(x);
                    layer.minz = layer.minz.min(z);
                    layer.maxz = layer.maxz.max(z);

                    let idx = (x + z * w) as usize;
                    layer.heights[idx] = (chf.spans[j].y as i32 - hmin).clamp(0, 254) as u8;
                    layer.areas[idx] = chf.areas[j];

                    let mut con = 0u8;
                    for dir in 0..4 {
                        if let Some((_, _, ai)) = chf.neighbour(x, z, j, dir) {
                            let alid = if src_reg[ai] != NO_REGION {
                                regs[src_reg[ai] as usize].layer_id
                            } else {
                                NO_REGION
                            };
                            if chf.areas[ai] != RC_NULL_AREA && lid == alid {
                                let nx = x + get_dir_offset_x(dir);
                                let nz = z + get_dir_offset_y(dir);
                                if nx >= 0 && nz >= 0 && nx < w && nz < h {
                                    con |= 1 << dir;
                                }
                            }
                        }
                    }
                    layer.cons[idx] = con;
                }
            }
        }

        if layer.minx > layer.maxx {
            layer.minx = 0;
            layer.maxx = 0;
        }
        if layer.minz > layer.maxz {
            layer.minz = 0;
            layer.maxz = 0;
        }
        layers.push(layer);
    }

    log::debug!("heightfield layers: {} regions in {} layers", nregs, layers.len());
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Heightfield, RC_WALKABLE_AREA};

    fn chf_from(hf: &Heightfield) -> CompactHeightfield {
        CompactHeightfield::build_from_heightfield(hf, 4, 2).unwrap()
    }

    fn flat(size: i32, top: u16) -> Heightfield {
        let mut hf = Heightfield::new(size, size, Vec3::ZERO, Vec3::new(size as f32, 40.0, size as f32), 1.0, 0.5);
        for z in 0..size {
            for x in 0..size {
                hf.add_span(x, z, 0, top, RC_WALKABLE_AREA, 1);
            }
        }
        hf
    }

    #[test]
    fn test_flat_floor_is_one_layer() {
        let chf = chf_from(&flat(8, 2));
        let layers = build_heightfield_layers(&chf, 4).unwrap();
        assert_eq!(layers.len(), 1);
        let layer = &layers[0];
        assert_eq!(layer.cell_count(), 64);
        assert_eq!(layer.hmin, 2);
        assert_eq!((layer.minx, layer.maxx, layer.minz, layer.maxz), (0, 7, 0, 7));
        assert!(layer.heights.iter().all(|&h| h == 0));
        // Interior cells connect in all four directions
        assert_eq!(layer.cons[(3 + 3 * 8) as usize], 0xf);
        // Grid edge cells do not connect outwards
        assert_eq!(layer.cons[0] & 0x1, 0);
    }

    #[test]
    fn test_bridge_splits_into_two_layers() {
        let mut hf = flat(8, 2);
        // Deck high above the floor across the middle rows
        for z in 3..5 {
            for x in 0..8 {
                hf.add_span(x, z, 30, 32, RC_WALKABLE_AREA, 1);
            }
        }
        let chf = chf_from(&hf);
        let layers = build_heightfield_layers(&chf, 4).unwrap();
        assert_eq!(layers.len(), 2);
        let total: usize = layers.iter().map(|l| l.cell_count()).sum();
        assert_eq!(total, 64 + 16);
        let deck = layers.iter().find(|l| l.hmin == 32).expect("deck layer");
        assert_eq!(deck.cell_count(), 16);
        assert!((deck.bmin.y - 16.0).abs() < 1e-5);
    }

    #[test]
    fn test_layer_round_trips_through_compact_heightfield() {
        let chf = chf_from(&flat(6, 4));
        let layers = build_heightfield_layers(&chf, 4).unwrap();
        let lchf = layers[0].to_compact_heightfield(4, 2);
        assert_eq!(lchf.span_count(), 36);
        assert_eq!(lchf.walkable_span_count(), 36);
        let centre = lchf.cell(2, 2).index as usize;
        assert!((0..4).all(|dir| lchf.spans[centre].is_connected(dir)));
        assert!(!lchf.spans[lchf.cell(0, 0).index as usize].is_connected(0));
        assert_eq!(lchf.spans[centre].y, 0);
    }

    #[test]
    fn test_empty_field_has_no_layers() {
        let hf = Heightfield::new(4, 4, Vec3::ZERO, Vec3::splat(4.0), 1.0, 0.5);
        let chf = chf_from(&hf);
        assert!(build_heightfield_layers(&chf, 4).unwrap().is_empty());
    }
}
