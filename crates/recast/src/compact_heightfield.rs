//! Compact heightfield: the open space above every walkable span
//!
//! Where the [`Heightfield`] stores solid spans, the compact form stores the
//! walkable floor of each span together with the clearance above it and the
//! index of the connected span in each of the four neighbouring columns.

use glam::Vec3;
use recast_common::{Error, Result};

use crate::{get_dir_offset_x, get_dir_offset_y, Heightfield, RC_NOT_CONNECTED, RC_NULL_AREA};

const MAX_HEIGHT: i32 = 0xffff;
const MAX_LAYERS: usize = RC_NOT_CONNECTED as usize - 1;

/// A column of the compact heightfield
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactCell {
    /// Index of the first span of the column
    pub index: u32,
    /// Number of spans in the column
    pub count: u32,
}

impl CompactCell {
    /// Range of span indices owned by the column
    #[inline]
    pub fn spans(&self) -> std::ops::Range<usize> {
        self.index as usize..(self.index + self.count) as usize
    }
}

/// A walkable floor with its clearance and neighbour links
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactSpan {
    /// Floor height
    pub y: u16,
    /// Region id, 0 when unassigned
    pub reg: u16,
    /// Packed neighbour links, 6 bits per direction
    pub con: u32,
    /// Clearance above the floor
    pub h: u8,
}

impl CompactSpan {
    /// Layer index of the connected span in direction `dir`, or
    /// `RC_NOT_CONNECTED`
    #[inline]
    pub fn get_con(&self, dir: i32) -> i32 {
        let shift = dir * 6;
        ((self.con >> shift) & 0x3f) as i32
    }

    /// Sets the link in direction `dir`
    #[inline]
    pub fn set_con(&mut self, dir: i32, i: i32) {
        let shift = dir * 6;
        self.con = (self.con & !(0x3f << shift)) | (((i as u32) & 0x3f) << shift);
    }

    /// Whether the span has a walkable link in direction `dir`
    #[inline]
    pub fn is_connected(&self, dir: i32) -> bool {
        self.get_con(dir) != RC_NOT_CONNECTED
    }
}

/// Compact heightfield structure
#[derive(Debug, Clone)]
pub struct CompactHeightfield {
    /// Width of the field along x, border included
    pub width: i32,
    /// Height of the field along z, border included
    pub height: i32,
    /// Agent height in voxels used to build the links
    pub walkable_height: i32,
    /// Agent climb in voxels used to build the links
    pub walkable_climb: i32,
    /// Border size set by region partitioning
    pub border_size: i32,
    /// Largest value in the distance field
    pub max_distance: u16,
    /// One past the largest region id
    pub max_regions: u16,
    /// The minimum bounds of the field
    pub bmin: Vec3,
    /// The maximum bounds of the field
    pub bmax: Vec3,
    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,
    /// Columns, `width * height`
    pub cells: Vec<CompactCell>,
    /// Spans, grouped by column
    pub spans: Vec<CompactSpan>,
    /// Distance to the nearest border, per span
    pub dist: Vec<u16>,
    /// Area id per span
    pub areas: Vec<u8>,
}

impl CompactHeightfield {
    /// Builds the compact form of `hf`, keeping only walkable spans and
    /// linking neighbours that an agent of the given size can step between.
    pub fn build_from_heightfield(
        hf: &Heightfield,
        walkable_height: i32,
        walkable_climb: i32,
    ) -> Result<Self> {
        let w = hf.width;
        let h = hf.height;

        let mut cells = vec![CompactCell::default(); (w * h) as usize];
        let mut spans = Vec::new();
        let mut areas = Vec::new();

        for z in 0..h {
            for x in 0..w {
                let cell = &mut cells[(x + z * w) as usize];
                cell.index = spans.len() as u32;
                let mut cur = hf.first_span(x, z);
                while let Some(idx) = cur {
                    let s = hf.span(idx);
                    cur = s.next;
                    if s.area == RC_NULL_AREA {
                        continue;
                    }
                    let bot = s.smax as i32;
                    let top = s.next.map_or(MAX_HEIGHT, |n| hf.span(n).smin as i32);
                    spans.push(CompactSpan {
                        y: bot.clamp(0, 0xffff) as u16,
                        reg: 0,
                        con: 0,
                        h: (top - bot).clamp(0, 0xff) as u8,
                    });
                    areas.push(s.area);
                    cell.count += 1;
                }
            }
        }

        let mut chf = Self {
            width: w,
            height: h,
            walkable_height,
            walkable_climb,
            border_size: 0,
            max_distance: 0,
            max_regions: 0,
            bmin: hf.bmin,
            bmax: Vec3::new(hf.bmax.x, hf.bmax.y + walkable_height as f32 * hf.ch, hf.bmax.z),
            cs: hf.cs,
            ch: hf.ch,
            dist: Vec::new(),
            cells,
            spans,
            areas,
        };
        chf.build_connections()?;
        Ok(chf)
    }

    fn build_connections(&mut self) -> Result<()> {
        let w = self.width;
        let h = self.height;
        let mut too_high_neighbour = 0usize;

        for z in 0..h {
            for x in 0..w {
                let cell = self.cells[(x + z * w) as usize];
                for i in cell.spans() {
                    for dir in 0..4 {
                        self.spans[i].set_con(dir, RC_NOT_CONNECTED);
                        let nx = x + get_dir_offset_x(dir);
                        let nz = z + get_dir_offset_y(dir);
                        if nx < 0 || nz < 0 || nx >= w || nz >= h {
                            continue;
                        }

                        let s = self.spans[i];
                        let ncell = self.cells[(nx + nz * w) as usize];
                        for k in ncell.spans() {
                            let ns = self.spans[k];
                            let bot = s.y.max(ns.y) as i32;
                            let top = (s.y as i32 + s.h as i32).min(ns.y as i32 + ns.h as i32);
                            if top - bot >= self.walkable_height
                                && (ns.y as i32 - s.y as i32).abs() <= self.walkable_climb
                            {
                                let lidx = k - ncell.index as usize;
                                if lidx > MAX_LAYERS {
                                    too_high_neighbour = too_high_neighbour.max(lidx);
                                    continue;
                                }
                                self.spans[i].set_con(dir, lidx as i32);
                                break;
                            }
                        }
                    }
                }
            }
        }

        if too_high_neighbour > MAX_LAYERS {
            return Err(Error::Recast(format!(
                "heightfield has too many layers {too_high_neighbour} (max: {MAX_LAYERS})"
            )));
        }
        Ok(())
    }

    /// Number of spans
    #[inline]
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// The column at `(x, z)`
    #[inline]
    pub fn cell(&self, x: i32, z: i32) -> CompactCell {
        self.cells[(x + z * self.width) as usize]
    }

    /// Index of the span linked from span `i` at `(x, z)` in direction `dir`
    #[inline]
    pub fn neighbour(&self, x: i32, z: i32, i: usize, dir: i32) -> Option<(i32, i32, usize)> {
        let con = self.spans[i].get_con(dir);
        if con == RC_NOT_CONNECTED {
            return None;
        }
        let nx = x + get_dir_offset_x(dir);
        let nz = z + get_dir_offset_y(dir);
        Some((nx, nz, self.cell(nx, nz).index as usize + con as usize))
    }

    /// Number of walkable spans
    pub fn walkable_span_count(&self) -> usize {
        self.areas.iter().filter(|&&a| a != RC_NULL_AREA).count()
    }
}
