//! Distance to the nearest region boundary for every span
//!
//! Drives the flooding order of watershed partitioning: regions grow outwards
//! from the spans furthest from any boundary.

use crate::CompactHeightfield;

fn calculate_distance_field(chf: &CompactHeightfield, src: &mut [u16]) -> u16 {
    let w = chf.width;
    let h = chf.height;
    src.fill(0xffff);

    // Mark boundary cells
    for z in 0..h {
        for x in 0..w {
            for i in chf.cell(x, z).spans() {
                let area = chf.areas[i];
                let same_area = (0..4)
                    .filter_map(|dir| chf.neighbour(x, z, i, dir))
                    .filter(|&(_, _, ai)| chf.areas[ai] == area)
                    .count();
                if same_area != 4 {
                    src[i] = 0;
                }
            }
        }
    }

    let relax = |src: &mut [u16], i: usize, ai: usize, cost: u16| {
        let nd = src[ai].saturating_add(cost);
        if nd < src[i] {
            src[i] = nd;
        }
    };

    // Pass 1
    for z in 0..h {
        for x in 0..w {
            for i in chf.cell(x, z).spans() {
                if let Some((ax, az, ai)) = chf.neighbour(x, z, i, 0) {
                    relax(src, i, ai, 2);
                    if let Some((_, _, aai)) = chf.neighbour(ax, az, ai, 3) {
                        relax(src, i, aai, 3);
                    }
                }
                if let Some((ax, az, ai)) = chf.neighbour(x, z, i, 3) {
                    relax(src, i, ai, 2);
                    if let Some((_, _, aai)) = chf.neighbour(ax, az, ai, 2) {
                        relax(src, i, aai, 3);
                    }
                }
            }
        }
    }

    // Pass 2
    for z in (0..h).rev() {
        for x in (0..w).rev() {
            for i in chf.cell(x, z).spans() {
                if let Some((ax, az, ai)) = chf.neighbour(x, z, i, 2) {
                    relax(src, i, ai, 2);
                    if let Some((_, _, aai)) = chf.neighbour(ax, az, ai, 1) {
                        relax(src, i, aai, 3);
                    }
                }
                if let Some((ax, az, ai)) = chf.neighbour(x, z, i, 1) {
                    relax(src, i, ai, 2);
                    if let Some((_, _, aai)) = chf.neighbour(ax, az, ai, 0) {
                        relax(src, i, aai, 3);
                    }
                }
            }
        }
    }

    src.iter().copied().max().unwrap_or(0)
}

fn box_blur(chf: &CompactHeightfield, thr: u16, src: &[u16], dst: &mut [u16]) {
    let thr = thr * 2;
    for z in 0..chf.height {
        for x in 0..chf.width {
            for i in chf.cell(x, z).spans() {
                let cd = src[i];
                if cd <= thr {
                    dst[i] = cd;
                    continue;
                }

                let mut d = cd as u32;
                for dir in 0..4 {
                    match chf.neighbour(x, z, i, dir) {
                        Some((ax, az, ai)) => {
                            d += src[ai] as u32;
                            let dir2 = (dir + 1) & 0x3;
                            match chf.neighbour(ax, az, ai, dir2) {
                                Some((_, _, ai2)) => d += src[ai2] as u32,
                                None => d += cd as u32,
                            }
                        }
                        None => d += cd as u32 * 2,
                    }
                }
                dst[i] = ((d + 5) / 9) as u16;
            }
        }
    }
}

/// Computes the blurred distance field into `chf.dist` and `chf.max_distance`.
pub fn build_distance_field(chf: &mut CompactHeightfield) {
    let mut src = vec![0u16; chf.span_count()];
    let mut dst = vec![0u16; chf.span_count()];
    chf.max_distance = calculate_distance_field(chf, &mut src);
    box_blur(chf, 1, &src, &mut dst);
    chf.dist = dst;
}
