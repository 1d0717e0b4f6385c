//! Heightfield representation for Recast
//!
//! The heightfield is the first data structure in the Recast pipeline.
//! It's a 2D grid of span columns that represents a voxelized 3D environment.
//! Spans live in a single pool and each column is a singly linked list of
//! pool indices sorted bottom to top.

use glam::Vec3;

use crate::{get_dir_offset_x, get_dir_offset_y, RC_NULL_AREA};

/// Largest representable span height
pub const RC_SPAN_MAX_HEIGHT: i32 = (1 << 13) - 1;

const MAX_HEIGHT: i32 = 0xffff;

/// A solid span in the heightfield
#[derive(Debug, Clone, Copy)]
pub struct Span {
    /// The lower limit of the span
    pub smin: u16,
    /// The upper limit of the span
    pub smax: u16,
    /// Area ID (0 = not walkable)
    pub area: u8,
    /// Next span in the column
    pub next: Option<u32>,
}

/// Heightfield structure holding a grid of span columns
#[derive(Debug)]
pub struct Heightfield {
    /// Width of the heightfield along the x-axis
    pub width: i32,
    /// Height (depth) of the heightfield along the z-axis
    pub height: i32,
    /// The minimum bounds of the heightfield's AABB
    pub bmin: Vec3,
    /// The maximum bounds of the heightfield's AABB
    pub bmax: Vec3,
    /// Cell size (horizontal resolution)
    pub cs: f32,
    /// Cell height (vertical resolution)
    pub ch: f32,

    columns: Vec<Option<u32>>,
    pool: Vec<Span>,
    free: Option<u32>,
}

impl Heightfield {
    /// Creates a new empty heightfield
    pub fn new(width: i32, height: i32, bmin: Vec3, bmax: Vec3, cs: f32, ch: f32) -> Self {
        Self {
            width,
            height,
            bmin,
            bmax,
            cs,
            ch,
            columns: vec![None; (width.max(0) * height.max(0)) as usize],
            pool: Vec::new(),
            free: None,
        }
    }

    #[inline]
    fn column_index(&self, x: i32, z: i32) -> usize {
        (x + z * self.width) as usize
    }

    /// First span of the column at `(x, z)`
    #[inline]
    pub fn first_span(&self, x: i32, z: i32) -> Option<u32> {
        self.columns[self.column_index(x, z)]
    }

    /// Span stored at pool index `idx`
    #[inline]
    pub fn span(&self, idx: u32) -> &Span {
        &self.pool[idx as usize]
    }

    /// Iterates over the spans of a column, bottom to top
    pub fn column(&self, x: i32, z: i32) -> impl Iterator<Item = &Span> + '_ {
        let mut cur = self.first_span(x, z);
        std::iter::from_fn(move || {
            let idx = cur?;
            let span = &self.pool[idx as usize];
            cur = span.next;
            Some(span)
        })
    }

    /// Number of spans in the heightfield, walkable or not
    pub fn span_count(&self) -> usize {
        (0..self.height)
            .flat_map(|z| (0..self.width).map(move |x| (x, z)))
            .map(|(x, z)| self.column(x, z).count())
            .sum()
    }

    fn alloc_span(&mut self, span: Span) -> u32 {
        match self.free {
            Some(idx) => {
                self.free = self.pool[idx as usize].next;
                self.pool[idx as usize] = span;
                idx
            }
            None => {
                self.pool.push(span);
                (self.pool.len() - 1) as u32
            }
        }
    }

    fn free_span(&mut self, idx: u32) {
        self.pool[idx as usize].next = self.free;
        self.free = Some(idx);
    }

    /// Adds a span to column `(x, z)`, merging it with every span it overlaps.
    ///
    /// When the merged top lies within `flag_merge_thr` of an existing top,
    /// the higher area id wins.
    pub fn add_span(&mut self, x: i32, z: i32, smin: u16, smax: u16, area: u8, flag_merge_thr: i32) {
        let col = self.column_index(x, z);
        let mut new_min = smin;
        let mut new_max = smax;
        let mut new_area = area;

        let mut prev: Option<u32> = None;
        let mut cur = self.columns[col];

        while let Some(ci) = cur {
            let c = self.pool[ci as usize];
            if c.smin > new_max {
                break;
            }
            if c.smax < new_min {
                prev = cur;
                cur = c.next;
                continue;
            }

            // Overlap, merge into the new span
            new_min = new_min.min(c.smin);
            new_max = new_max.max(c.smax);
            if (new_max as i32 - c.smax as i32).abs() <= flag_merge_thr {
                new_area = new_area.max(c.area);
            }

            let next = c.next;
            self.free_span(ci);
            match prev {
                Some(p) => self.pool[p as usize].next = next,
                None => self.columns[col] = next,
            }
            cur = next;
        }

        let idx = self.alloc_span(Span {
            smin: new_min,
            smax: new_max,
            area: new_area,
            next: None,
        });
        match prev {
            Some(p) => {
                self.pool[idx as usize].next = self.pool[p as usize].next;
                self.pool[p as usize].next = Some(idx);
            }
            None => {
                self.pool[idx as usize].next = self.columns[col];
                self.columns[col] = Some(idx);
            }
        }
    }

    /// Marks non-walkable spans as walkable when their top is within
    /// `walkable_climb` of a walkable span directly below, so curbs and
    /// stair steps become walkable.
    pub fn filter_low_hanging_walkable_obstacles(&mut self, walkable_climb: i32) {
        for z in 0..self.height {
            for x in 0..self.width {
                let mut prev_walkable = false;
                let mut prev_area = RC_NULL_AREA;
                let mut prev_smax = 0i32;
                let mut cur = self.first_span(x, z);

                while let Some(idx) = cur {
                    let span = &mut self.pool[idx as usize];
                    let walkable = span.area != RC_NULL_AREA;
                    if !walkable
                        && prev_walkable
                        && (span.smax as i32 - prev_smax).abs() <= walkable_climb
                    {
                        span.area = prev_area;
                    }
                    prev_walkable = walkable;
                    prev_area = span.area;
                    prev_smax = span.smax as i32;
                    cur = span.next;
                }
            }
        }
    }

    /// Removes walkable spans that sit at a ledge higher than `walkable_climb`,
    /// or whose accessible neighbours span a height range above `walkable_climb`.
    pub fn filter_ledge_spans(&mut self, walkable_height: i32, walkable_climb: i32) {
        for z in 0..self.height {
            for x in 0..self.width {
                let mut cur = self.first_span(x, z);
                while let Some(idx) = cur {
                    let span = self.pool[idx as usize];
                    cur = span.next;
                    if span.area == RC_NULL_AREA {
                        continue;
                    }

                    let bot = span.smax as i32;
                    let top = span
                        .next
                        .map_or(MAX_HEIGHT, |n| self.pool[n as usize].smin as i32);

                    let mut min_neighbor_height = MAX_HEIGHT;
                    let mut accessible_min = bot;
                    let mut accessible_max = bot;

                    for dir in 0..4 {
                        let dx = x + get_dir_offset_x(dir);
                        let dz = z + get_dir_offset_y(dir);
                        if dx < 0 || dz < 0 || dx >= self.width || dz >= self.height {
                            min_neighbor_height = min_neighbor_height.min(-walkable_climb - bot);
                            continue;
                        }

                        // Space below the first neighbour span
                        let first = self.first_span(dx, dz);
                        let nbot = -walkable_climb;
                        let ntop = first.map_or(MAX_HEIGHT, |n| self.pool[n as usize].smin as i32);
                        if top.min(ntop) - bot.max(nbot) > walkable_height {
                            min_neighbor_height = min_neighbor_height.min(nbot - bot);
                        }

                        for ns in self.column(dx, dz) {
                            let nbot = ns.smax as i32;
                            let ntop =
                                ns.next.map_or(MAX_HEIGHT, |n| self.pool[n as usize].smin as i32);
                            if top.min(ntop) - bot.max(nbot) > walkable_height {
                                min_neighbor_height = min_neighbor_height.min(nbot - bot);
                                if (nbot - bot).abs() <= walkable_climb {
                                    accessible_min = accessible_min.min(nbot);
                                    accessible_max = accessible_max.max(nbot);
                                }
                            }
                        }
                    }

                    if min_neighbor_height < -walkable_climb
                        || accessible_max - accessible_min > walkable_climb
                    {
                        self.pool[idx as usize].area = RC_NULL_AREA;
                    }
                }
            }
        }
    }

    /// Removes walkable spans without enough clearance above them.
    pub fn filter_walkable_low_height_spans(&mut self, walkable_height: i32) {
        for z in 0..self.height {
            for x in 0..self.width {
                let mut cur = self.first_span(x, z);
                while let Some(idx) = cur {
                    let span = self.pool[idx as usize];
                    let bot = span.smax as i32;
                    let top = span
                        .next
                        .map_or(MAX_HEIGHT, |n| self.pool[n as usize].smin as i32);
                    if top - bot < walkable_height {
                        self.pool[idx as usize].area = RC_NULL_AREA;
                    }
                    cur = span.next;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RC_WALKABLE_AREA;

    fn field(w: i32, h: i32) -> Heightfield {
        Heightfield::new(w, h, Vec3::ZERO, Vec3::new(w as f32, 10.0, h as f32), 1.0, 0.5)
    }

    #[test]
    fn test_add_span_keeps_columns_sorted() {
        let mut hf = field(1, 1);
        hf.add_span(0, 0, 10, 12, RC_WALKABLE_AREA, 1);
        hf.add_span(0, 0, 0, 2, RC_WALKABLE_AREA, 1);
        hf.add_span(0, 0, 5, 6, RC_NULL_AREA, 1);
        let mins: Vec<u16> = hf.column(0, 0).map(|s| s.smin).collect();
        assert_eq!(mins, vec![0, 5, 10]);
    }

    #[test]
    fn test_add_span_merges_overlaps() {
        let mut hf = field(1, 1);
        hf.add_span(0, 0, 0, 4, RC_NULL_AREA, 1);
        hf.add_span(0, 0, 6, 8, RC_NULL_AREA, 1);
        hf.add_span(0, 0, 3, 7, RC_WALKABLE_AREA, 1);
        let spans: Vec<_> = hf.column(0, 0).map(|s| (s.smin, s.smax, s.area)).collect();
        assert_eq!(spans, vec![(0, 8, RC_WALKABLE_AREA)]);
        assert_eq!(hf.span_count(), 1);
    }

    #[test]
    fn test_merge_area_only_within_threshold() {
        let mut hf = field(1, 1);
        hf.add_span(0, 0, 0, 10, RC_WALKABLE_AREA, 1);
        hf.add_span(0, 0, 0, 4, RC_NULL_AREA, 1);
        assert_eq!(hf.column(0, 0).next().unwrap().area, RC_WALKABLE_AREA);

        let mut hf = field(1, 1);
        hf.add_span(0, 0, 0, 4, RC_WALKABLE_AREA, 1);
        hf.add_span(0, 0, 0, 10, RC_NULL_AREA, 1);
        assert_eq!(hf.column(0, 0).next().unwrap().area, RC_NULL_AREA);
    }

    #[test]
    fn test_freed_spans_are_reused() {
        let mut hf = field(1, 1);
        hf.add_span(0, 0, 0, 1, RC_WALKABLE_AREA, 1);
        hf.add_span(0, 0, 0, 2, RC_WALKABLE_AREA, 1);
        hf.add_span(0, 0, 0, 3, RC_WALKABLE_AREA, 1);
        assert!(hf.pool.len() <= 2);
    }

    #[test]
    fn test_low_hanging_obstacle_becomes_walkable() {
        let mut hf = field(1, 1);
        hf.add_span(0, 0, 0, 4, RC_WALKABLE_AREA, 0);
        hf.add_span(0, 0, 5, 6, RC_NULL_AREA, 0);
        hf.filter_low_hanging_walkable_obstacles(2);
        assert!(hf.column(0, 0).all(|s| s.area == RC_WALKABLE_AREA));
    }

    #[test]
    fn test_low_height_span_removed() {
        let mut hf = field(1, 1);
        hf.add_span(0, 0, 0, 4, RC_WALKABLE_AREA, 0);
        hf.add_span(0, 0, 6, 20, RC_WALKABLE_AREA, 0);
        hf.filter_walkable_low_height_spans(5);
        let areas: Vec<u8> = hf.column(0, 0).map(|s| s.area).collect();
        assert_eq!(areas, vec![RC_NULL_AREA, RC_WALKABLE_AREA]);
    }

    #[test]
    fn test_ledge_filter_clears_grid_edge() {
        let mut hf = field(3, 3);
        for z in 0..3 {
            for x in 0..3 {
                hf.add_span(x, z, 0, 2, RC_WALKABLE_AREA, 0);
            }
        }
        hf.filter_ledge_spans(4, 1);
        // Every cell touching the grid edge is a ledge, only the centre survives
        assert_eq!(hf.column(1, 1).next().unwrap().area, RC_WALKABLE_AREA);
        assert_eq!(hf.column(0, 1).next().unwrap().area, RC_NULL_AREA);
    }
}
