//! Region partitioning of the compact heightfield
//!
//! Two strategies are provided: watershed flooding over the distance field
//! and a sweep-line monotone partition. Both paint the tile border with
//! dedicated border regions and finish with the same filter and merge pass.

use recast_common::{Error, Result};

use crate::{CompactHeightfield, RC_BORDER_REG, RC_NULL_AREA};

const NB_STACKS: usize = 8;
const EXPAND_ITERS: i32 = 8;
const NULL_NEI: u16 = 0xffff;

#[derive(Debug, Clone, Copy)]
struct LevelStackEntry {
    x: i32,
    z: i32,
    index: i64,
}

fn paint_rect_region(
    chf: &CompactHeightfield,
    minx: i32,
    maxx: i32,
    minz: i32,
    maxz: i32,
    reg_id: u16,
    src_reg: &mut [u16],
) {
    for z in minz..maxz {
        for x in minx..maxx {
            for i in chf.cell(x, z).spans() {
                if chf.areas[i] != RC_NULL_AREA {
                    src_reg[i] = reg_id;
                }
            }
        }
    }
}

fn paint_border(chf: &CompactHeightfield, border_size: i32, src_reg: &mut [u16]) -> u16 {
    let mut id = 1u16;
    if border_size > 0 {
        let w = chf.width;
        let h = chf.height;
        let bw = w.min(border_size);
        let bh = h.min(border_size);
        paint_rect_region(chf, 0, bw, 0, h, id | RC_BORDER_REG, src_reg);
        id += 1;
        paint_rect_region(chf, w - bw, w, 0, h, id | RC_BORDER_REG, src_reg);
        id += 1;
        paint_rect_region(chf, 0, w, 0, bh, id | RC_BORDER_REG, src_reg);
        id += 1;
        paint_rect_region(chf, 0, w, h - bh, h, id | RC_BORDER_REG, src_reg);
        id += 1;
    }
    id
}

fn flood_region(
    chf: &CompactHeightfield,
    entry: LevelStackEntry,
    level: u16,
    r: u16,
    src_reg: &mut [u16],
    src_dist: &mut [u16],
    stack: &mut Vec<LevelStackEntry>,
) -> bool {
    let i = entry.index as usize;
    let area = chf.areas[i];

    stack.clear();
    stack.push(entry);
    src_reg[i] = r;
    src_dist[i] = 0;

    let lev = level.saturating_sub(2);
    let mut count = 0;

    while let Some(back) = stack.pop() {
        let (cx, cz, ci) = (back.x, back.z, back.index as usize);

        // Stop at cells already claimed by another region
        let mut ar = 0u16;
        for dir in 0..4 {
            let Some((ax, az, ai)) = chf.neighbour(cx, cz, ci, dir) else {
                continue;
            };
            if chf.areas[ai] != area {
                continue;
            }
            let nr = src_reg[ai];
            if nr & RC_BORDER_REG != 0 {
                continue;
            }
            if nr != 0 && nr != r {
                ar = nr;
                break;
            }
            let dir2 = (dir + 1) & 0x3;
            if let Some((_, _, ai2)) = chf.neighbour(ax, az, ai, dir2) {
                if chf.areas[ai2] != area {
                    continue;
                }
                let nr2 = src_reg[ai2];
                if nr2 != 0 && nr2 != r {
                    ar = nr2;
                    break;
                }
            }
        }
        if ar != 0 {
            src_reg[ci] = 0;
            continue;
        }

        count += 1;

        for dir in 0..4 {
            if let Some((ax, az, ai)) = chf.neighbour(cx, cz, ci, dir) {
                if chf.areas[ai] != area {
                    continue;
                }
                if chf.dist[ai] >= lev && src_reg[ai] == 0 {
                    src_reg[ai] = r;
                    src_dist[ai] = 0;
                    stack.push(LevelStackEntry {
                        x: ax,
                        z: az,
                        index: ai as i64,
                    });
                }
            }
        }
    }

    count > 0
}

fn expand_regions(
    chf: &CompactHeightfield,
    max_iter: i32,
    level: u16,
    src_reg: &mut [u16],
    src_dist: &mut [u16],
    stack: &mut Vec<LevelStackEntry>,
    fill_stack: bool,
) {
    if fill_stack {
        stack.clear();
        for z in 0..chf.height {
            for x in 0..chf.width {
                for i in chf.cell(x, z).spans() {
                    if chf.dist[i] >= level && src_reg[i] == 0 && chf.areas[i] != RC_NULL_AREA {
                        stack.push(LevelStackEntry {
                            x,
                            z,
                            index: i as i64,
                        });
                    }
                }
            }
        }
    } else {
        for entry in stack.iter_mut() {
            if entry.index >= 0 && src_reg[entry.index as usize] != 0 {
                entry.index = -1;
            }
        }
    }

    let mut dirty: Vec<(usize, u16, u16)> = Vec::new();
    let mut iter = 0;
    while !stack.is_empty() {
        let mut failed = 0;
        dirty.clear();

        for entry in stack.iter_mut() {
            if entry.index < 0 {
                failed += 1;
                continue;
            }
            let i = entry.index as usize;
            let mut r = src_reg[i];
            let mut d2 = 0xffffu16;
            let area = chf.areas[i];
            for dir in 0..4 {
                let Some((_, _, ai)) = chf.neighbour(entry.x, entry.z, i, dir) else {
                    continue;
                };
                if chf.areas[ai] != area {
                    continue;
                }
                let nr = src_reg[ai];
                let nd = src_dist[ai];
                if nr > 0 && nr & RC_BORDER_REG == 0 && (nd as u32 + 2) < d2 as u32 {
                    r = nr;
                    d2 = nd + 2;
                }
            }
            if r != 0 {
                entry.index = -1;
                dirty.push((i, r, d2));
            } else {
                failed += 1;
            }
        }

        for &(i, r, d) in &dirty {
            src_reg[i] = r;
            src_dist[i] = d;
        }

        if failed == stack.len() {
            break;
        }
        if level > 0 {
            iter += 1;
            if iter >= max_iter {
                break;
            }
        }
    }
}

fn sort_cells_by_level(
    chf: &CompactHeightfield,
    start_level: u16,
    src_reg: &[u16],
    stacks: &mut [Vec<LevelStackEntry>],
) {
    let start_level = (start_level >> 1) as i32;
    for stack in stacks.iter_mut() {
        stack.clear();
    }

    for z in 0..chf.height {
        for x in 0..chf.width {
            for i in chf.cell(x, z).spans() {
                if chf.areas[i] == RC_NULL_AREA || src_reg[i] != 0 {
                    continue;
                }
                let level = (chf.dist[i] >> 1) as i32;
                let sid = (start_level - level).max(0) as usize;
                if sid >= stacks.len() {
                    continue;
                }
                stacks[sid].push(LevelStackEntry {
                    x,
                    z,
                    index: i as i64,
                });
            }
        }
    }
}

/// Partitions the walkable surface with watershed flooding.
///
/// Requires the distance field; see [`crate::build_distance_field`].
pub fn build_regions_watershed(
    chf: &mut CompactHeightfield,
    border_size: i32,
    min_region_area: i32,
    merge_region_area: i32,
) -> Result<()> {
    if chf.dist.len() != chf.span_count() {
        return Err(Error::Recast("distance field has not been built".to_string()));
    }

    let span_count = chf.span_count();
    let mut src_reg = vec![0u16; span_count];
    let mut src_dist = vec![0u16; span_count];

    let mut region_id = paint_border(chf, border_size, &mut src_reg);
    chf.border_size = border_size;

    let mut level = ((chf.max_distance as u32 + 1) & !1) as u16;
    let mut lvl_stacks: Vec<Vec<LevelStackEntry>> = vec![Vec::new(); NB_STACKS];
    let mut stack = Vec::new();
    let mut s_id: i32 = -1;

    while level > 0 {
        level = level.saturating_sub(2);
        s_id = (s_id + 1) & (NB_STACKS as i32 - 1);

        if s_id == 0 {
            sort_cells_by_level(chf, level, &src_reg, &mut lvl_stacks);
        } else {
            let (prev, cur) = lvl_stacks.split_at_mut(s_id as usize);
            let src = &prev[s_id as usize - 1];
            for entry in src {
                if entry.index >= 0 && src_reg[entry.index as usize] == 0 {
                    cur[0].push(*entry);
                }
            }
        }

        let cur = s_id as usize;
        expand_regions(
            chf,
            EXPAND_ITERS,
            level,
            &mut src_reg,
            &mut src_dist,
            &mut lvl_stacks[cur],
            false,
        );

        for j in 0..lvl_stacks[cur].len() {
            let entry = lvl_stacks[cur][j];
            if entry.index >= 0 && src_reg[entry.index as usize] == 0 {
                if flood_region(
                    chf,
                    entry,
                    level,
                    region_id,
                    &mut src_reg,
                    &mut src_dist,
                    &mut stack,
                ) {
                    if region_id == 0xffff {
                        return Err(Error::Recast("region id overflow".to_string()));
                    }
                    region_id += 1;
                }
            }
        }
    }

    // Expand to cover the remaining spans
    expand_regions(
        chf,
        EXPAND_ITERS * 8,
        0,
        &mut src_reg,
        &mut src_dist,
        &mut stack,
        true,
    );

    chf.max_regions = region_id;
    let mut max_region_id = region_id;
    merge_and_filter_regions(
        chf,
        min_region_area,
        merge_region_area,
        &mut max_region_id,
        &mut src_reg,
    )?;
    chf.max_regions = max_region_id;

    for (span, reg) in chf.spans.iter_mut().zip(&src_reg) {
        span.reg = *reg;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
struct SweepSpan {
    id: u16,
    ns: u16,
    nei: u16,
}

/// Partitions the walkable surface into monotone regions with a sweep line.
pub fn build_regions_monotone(
    chf: &mut CompactHeightfield,
    border_size: i32,
    min_region_area: i32,
    merge_region_area: i32,
) -> Result<()> {
    let w = chf.width;
    let h = chf.height;
    let mut src_reg = vec![0u16; chf.span_count()];

    let mut id = paint_border(chf, border_size, &mut src_reg);
    chf.border_size = border_size;

    let mut sweeps: Vec<SweepSpan> = Vec::new();
    let mut prev: Vec<u16> = Vec::new();

    for z in border_size..h - border_size {
        prev.clear();
        prev.resize(id as usize + 1, 0);
        let mut rid: u16 = 1;

        for x in border_size..w - border_size {
            for i in chf.cell(x, z).spans() {
                if chf.areas[i] == RC_NULL_AREA {
                    continue;
                }

                // -x
                let mut previd = 0u16;
                if let Some((_, _, ai)) = chf.neighbour(x, z, i, 0) {
                    if src_reg[ai] & RC_BORDER_REG == 0 && chf.areas[i] == chf.areas[ai] {
                        previd = src_reg[ai];
                    }
                }
                if previd == 0 {
                    previd = rid;
                    rid = rid
                        .checked_add(1)
                        .ok_or_else(|| Error::Recast("sweep id overflow".to_string()))?;
                    if sweeps.len() <= previd as usize {
                        sweeps.resize(previd as usize + 1, SweepSpan::default());
                    }
                    sweeps[previd as usize] = SweepSpan::default();
                }

                // -z
                if let Some((_, _, ai)) = chf.neighbour(x, z, i, 3) {
                    let nr = src_reg[ai];
                    if nr != 0 && nr & RC_BORDER_REG == 0 && chf.areas[i] == chf.areas[ai] {
                        let sweep = &mut sweeps[previd as usize];
                        if sweep.nei == 0 || sweep.nei == nr {
                            sweep.nei = nr;
                            sweep.ns += 1;
                            prev[nr as usize] += 1;
                        } else {
                            sweep.nei = NULL_NEI;
                        }
                    }
                }

                src_reg[i] = previd;
            }
        }

        // Sweeps that fully continue a region of the previous row inherit its id
        for sweep in sweeps.iter_mut().take(rid as usize).skip(1) {
            if sweep.nei != NULL_NEI && sweep.nei != 0 && prev[sweep.nei as usize] == sweep.ns {
                sweep.id = sweep.nei;
            } else {
                sweep.id = id;
                id = id
                    .checked_add(1)
                    .ok_or_else(|| Error::Recast("region id overflow".to_string()))?;
            }
        }

        for x in border_size..w - border_size {
            for i in chf.cell(x, z).spans() {
                if src_reg[i] > 0 && src_reg[i] < rid {
                    src_reg[i] = sweeps[src_reg[i] as usize].id;
                }
            }
        }
    }

    chf.max_regions = id;
    let mut max_region_id = id;
    merge_and_filter_regions(
        chf,
        min_region_area,
        merge_region_area,
        &mut max_region_id,
        &mut src_reg,
    )?;
    chf.max_regions = max_region_id;

    for (span, reg) in chf.spans.iter_mut().zip(&src_reg) {
        span.reg = *reg;
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct Region {
    span_count: i32,
    id: u16,
    area_type: u8,
    remap: bool,
    visited: bool,
    overlap: bool,
    connections: Vec<u16>,
    floors: Vec<u16>,
}

impl Region {
    fn new(id: u16) -> Self {
        Self {
            span_count: 0,
            id,
            area_type: 0,
            remap: false,
            visited: false,
            overlap: false,
            connections: Vec::new(),
            floors: Vec::new(),
        }
    }

    fn remove_adjacent_neighbours(&mut self) {
        let mut i = 0;
        while i < self.connections.len() && self.connections.len() > 1 {
            let ni = (i + 1) % self.connections.len();
            if self.connections[i] == self.connections[ni] {
                self.connections.remove(i);
            } else {
                i += 1;
            }
        }
    }

    fn replace_neighbour(&mut self, old_id: u16, new_id: u16) {
        let mut nei_changed = false;
        for c in self.connections.iter_mut() {
            if *c == old_id {
                *c = new_id;
                nei_changed = true;
            }
        }
        for f in self.floors.iter_mut() {
            if *f == old_id {
                *f = new_id;
            }
        }
        if nei_changed {
            self.remove_adjacent_neighbours();
        }
    }

    fn add_unique_floor(&mut self, n: u16) {
        if !self.floors.contains(&n) {
            self.floors.push(n);
        }
    }

    fn is_connected_to_border(&self) -> bool {
        self.connections.contains(&0)
    }
}

fn can_merge_with_region(rega: &Region, regb: &Region) -> bool {
    if rega.area_type != regb.area_type {
        return false;
    }
    let n = rega.connections.iter().filter(|&&c| c == regb.id).count();
    if n > 1 {
        return false;
    }
    !rega.floors.contains(&regb.id)
}

fn merge_regions(regions: &mut [Region], a: usize, b: usize) -> bool {
    let aid = regions[a].id;
    let bid = regions[b].id;

    let acon = regions[a].connections.clone();
    let bcon = regions[b].connections.clone();

    let Some(insa) = acon.iter().position(|&c| c == bid) else {
        return false;
    };
    let Some(insb) = bcon.iter().position(|&c| c == aid) else {
        return false;
    };

    let mut merged = Vec::with_capacity(acon.len() + bcon.len());
    for i in 0..acon.len() - 1 {
        merged.push(acon[(insa + 1 + i) % acon.len()]);
    }
    for i in 0..bcon.len() - 1 {
        merged.push(bcon[(insb + 1 + i) % bcon.len()]);
    }
    regions[a].connections = merged;
    regions[a].remove_adjacent_neighbours();

    let bfloors = regions[b].floors.clone();
    for f in bfloors {
        regions[a].add_unique_floor(f);
    }
    regions[a].span_count += regions[b].span_count;
    regions[b].span_count = 0;
    regions[b].connections.clear();
    true
}

fn is_solid_edge(chf: &CompactHeightfield, src_reg: &[u16], x: i32, z: i32, i: usize, dir: i32) -> bool {
    let r = chf
        .neighbour(x, z, i, dir)
        .map_or(0, |(_, _, ai)| src_reg[ai]);
    r != src_reg[i]
}

fn walk_contour(
    chf: &CompactHeightfield,
    src_reg: &[u16],
    mut x: i32,
    mut z: i32,
    mut i: usize,
    mut dir: i32,
    cont: &mut Vec<u16>,
) {
    let start_dir = dir;
    let start_i = i;

    let mut cur_reg = chf
        .neighbour(x, z, i, dir)
        .map_or(0, |(_, _, ai)| src_reg[ai]);
    cont.push(cur_reg);

    for _ in 1..40000 {
        if is_solid_edge(chf, src_reg, x, z, i, dir) {
            let r = chf
                .neighbour(x, z, i, dir)
                .map_or(0, |(_, _, ai)| src_reg[ai]);
            if r != cur_reg {
                cur_reg = r;
                cont.push(cur_reg);
            }
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

    // Remove adjacent duplicates
    if cont.len() > 1 {
        let mut j = 0;
        while j < cont.len() {
            let nj = (j + 1) % cont.len();
            if cont[j] == cont[nj] {
                cont.remove(j);
            } else {
                j += 1;
            }
        }
    }
}

fn merge_and_filter_regions(
    chf: &CompactHeightfield,
    min_region_area: i32,
    merge_region_size: i32,
    max_region_id: &mut u16,
    src_reg: &mut [u16],
) -> Result<()> {
    let nreg = *max_region_id as usize + 1;
    let mut regions: Vec<Region> = (0..nreg).map(|i| Region::new(i as u16)).collect();

    // Find edge of a region and find connections around the contour
    for z in 0..chf.height {
        for x in 0..chf.width {
            let cell = chf.cell(x, z);
            for i in cell.spans() {
                let r = src_reg[i] as usize;
                if r == 0 || r >= nreg {
                    continue;
                }
                regions[r].span_count += 1;

                // Update floors
                for j in cell.spans() {
                    if i == j {
                        continue;
                    }
                    let floor_id = src_reg[j] as usize;
                    if floor_id == 0 || floor_id >= nreg {
                        continue;
                    }
                    if floor_id == r {
                        regions[r].overlap = true;
                    }
                    regions[r].add_unique_floor(floor_id as u16);
                }

                if !regions[r].connections.is_empty() {
                    continue;
                }
                regions[r].area_type = chf.areas[i];

                if let Some(ndir) = (0..4).find(|&dir| is_solid_edge(chf, src_reg, x, z, i, dir)) {
                    let mut connections = Vec::new();
                    walk_contour(chf, src_reg, x, z, i, ndir, &mut connections);
                    regions[r].connections = connections;
                }
            }
        }
    }

    // Remove too small regions
    let mut stack: Vec<usize> = Vec::new();
    let mut trace: Vec<usize> = Vec::new();
    for i in 0..nreg {
        let reg = &regions[i];
        if reg.id == 0 || reg.id & RC_BORDER_REG != 0 || reg.span_count == 0 || reg.visited {
            continue;
        }

        let mut connects_to_border = false;
        let mut span_count = 0;
        stack.clear();
        trace.clear();

        regions[i].visited = true;
        stack.push(i);

        while let Some(ri) = stack.pop() {
            span_count += regions[ri].span_count;
            trace.push(ri);
            for k in 0..regions[ri].connections.len() {
                let c = regions[ri].connections[k];
                if c & RC_BORDER_REG != 0 {
                    connects_to_border = true;
                    continue;
                }
                let nei = &mut regions[c as usize];
                if nei.visited || nei.id == 0 || nei.id & RC_BORDER_REG != 0 {
                    continue;
                }
                stack.push(nei.id as usize);
                nei.visited = true;
            }
        }

        if span_count < min_region_area && !connects_to_border {
            for &t in &trace {
                regions[t].span_count = 0;
                regions[t].id = 0;
            }
        }
    }

    // Merge too small regions into neighbour regions
    loop {
        let mut merge_count = 0;
        for i in 0..nreg {
            let reg = &regions[i];
            if reg.id == 0 || reg.id & RC_BORDER_REG != 0 || reg.overlap || reg.span_count == 0 {
                continue;
            }
            if reg.span_count > merge_region_size && reg.is_connected_to_border() {
                continue;
            }

            let mut smallest = i32::MAX;
            let mut merge_id = reg.id;
            for &c in &reg.connections {
                if c & RC_BORDER_REG != 0 {
                    continue;
                }
                let mreg = &regions[c as usize];
                if mreg.id == 0 || mreg.id & RC_BORDER_REG != 0 || mreg.overlap {
                    continue;
                }
                if mreg.span_count < smallest
                    && can_merge_with_region(reg, mreg)
                    && can_merge_with_region(mreg, reg)
                {
                    smallest = mreg.span_count;
                    merge_id = mreg.id;
                }
            }

            if merge_id != reg.id {
                let old_id = reg.id;
                if merge_regions(&mut regions, merge_id as usize, i) {
                    for region in regions.iter_mut() {
                        if region.id == 0 || region.id & RC_BORDER_REG != 0 {
                            continue;
                        }
                        if region.id == old_id {
                            region.id = merge_id;
                        }
                        region.replace_neighbour(old_id, merge_id);
                    }
                    merge_count += 1;
                }
            }
        }
        if merge_count == 0 {
            break;
        }
    }

    // Compress region ids
    for region in regions.iter_mut() {
        region.remap = region.id != 0 && region.id & RC_BORDER_REG == 0;
    }
    let mut reg_id_gen: u16 = 0;
    for i in 0..nreg {
        if !regions[i].remap {
            continue;
        }
        let old_id = regions[i].id;
        reg_id_gen += 1;
        for region in regions.iter_mut().skip(i) {
            if region.id == old_id {
                region.id = reg_id_gen;
                region.remap = false;
            }
        }
    }
    *max_region_id = reg_id_gen;

    // Remap regions
    for reg in src_reg.iter_mut() {
        if *reg & RC_BORDER_REG == 0 {
            let idx = *reg as usize;
            if idx >= nreg {
                return Err(Error::Recast(format!("region id {idx} out of range")));
            }
            *reg = regions[idx].id;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_distance_field, Heightfield, RC_WALKABLE_AREA};
    use glam::Vec3;

    fn plane(w: i32, h: i32, hole: Option<(i32, i32, i32, i32)>) -> CompactHeightfield {
        let mut hf = Heightfield::new(w, h, Vec3::ZERO, Vec3::new(w as f32, 10.0, h as f32), 1.0, 0.5);
        for z in 0..h {
            for x in 0..w {
                let in_hole = hole.is_some_and(|(x0, z0, x1, z1)| x >= x0 && x < x1 && z >= z0 && z < z1);
                let area = if in_hole { RC_NULL_AREA } else { RC_WALKABLE_AREA };
                hf.add_span(x, z, 0, 2, area, 1);
            }
        }
        // Null area spans are dropped by the compact build, the hole stays empty
        CompactHeightfield::build_from_heightfield(&hf, 4, 1).unwrap()
    }

    fn regions_of(chf: &CompactHeightfield) -> Vec<u16> {
        let mut regs: Vec<u16> = chf.spans.iter().map(|s| s.reg).filter(|&r| r != 0 && r & RC_BORDER_REG == 0).collect();
        regs.sort_unstable();
        regs.dedup();
        regs
    }

    #[test]
    fn test_watershed_single_region_on_plane() {
        let mut chf = plane(12, 12, None);
        build_distance_field(&mut chf);
        build_regions_watershed(&mut chf, 0, 2, 20).unwrap();
        let regs = regions_of(&chf);
        assert!(!regs.is_empty());
        assert_eq!(chf.max_regions as usize, regs.len());
        assert!(chf.spans.iter().all(|s| s.reg != 0));
    }

    #[test]
    fn test_border_cells_get_border_regions() {
        let mut chf = plane(12, 12, None);
        build_distance_field(&mut chf);
        build_regions_watershed(&mut chf, 2, 2, 20).unwrap();
        let corner = chf.cell(0, 0).index as usize;
        assert_ne!(chf.spans[corner].reg & RC_BORDER_REG, 0);
        let centre = chf.cell(6, 6).index as usize;
        assert_ne!(chf.spans[centre].reg, 0);
        assert_eq!(chf.spans[centre].reg & RC_BORDER_REG, 0);
    }

    #[test]
    fn test_small_island_is_removed() {
        let mut chf = plane(3, 3, None);
        build_distance_field(&mut chf);
        build_regions_watershed(&mut chf, 0, 20, 20).unwrap();
        assert!(regions_of(&chf).is_empty());
    }

    #[test]
    fn test_monotone_partition_covers_plane() {
        let mut chf = plane(10, 10, Some((4, 4, 6, 6)));
        build_regions_monotone(&mut chf, 0, 2, 20).unwrap();
        assert!(!regions_of(&chf).is_empty());
        assert!(chf.spans.iter().all(|s| s.reg != 0));
    }

    #[test]
    fn test_watershed_requires_distance_field() {
        let mut chf = plane(4, 4, None);
        assert!(build_regions_watershed(&mut chf, 0, 1, 1).is_err());
    }
}
