//! Area classification: slope marking of input triangles and erosion of the
//! walkable surface by the agent radius

use crate::{CompactHeightfield, RC_NULL_AREA, RC_WALKABLE_AREA};

/// Returns one area id per triangle: `RC_WALKABLE_AREA` when the slope of the
/// triangle is at most `walkable_slope_angle` degrees, `RC_NULL_AREA`
/// otherwise.
///
/// The test uses the absolute vertical component of the face normal, so
/// triangle winding does not matter.
pub fn mark_walkable_triangles(walkable_slope_angle: f32, verts: &[f32], tris: &[i32]) -> Vec<u8> {
    let walkable_thr = walkable_slope_angle.to_radians().cos();
    tris.chunks_exact(3)
        .map(|tri| {
            let v = |i: i32| glam::Vec3::from_slice(&verts[i as usize * 3..i as usize * 3 + 3]);
            let (v0, v1, v2) = (v(tri[0]), v(tri[1]), v(tri[2]));
            let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
            if normal.y.abs() >= walkable_thr && normal != glam::Vec3::ZERO {
                RC_WALKABLE_AREA
            } else {
                RC_NULL_AREA
            }
        })
        .collect()
}

/// Erodes the walkable area by `radius` voxels using a two pass chamfer
/// distance transform.
pub fn erode_walkable_area(chf: &mut CompactHeightfield, radius: i32) {
    let w = chf.width;
    let h = chf.height;
    let mut dist = vec![0xffu8; chf.span_count()];

    // Seed boundary spans
    for z in 0..h {
        for x in 0..w {
            for i in chf.cell(x, z).spans() {
                if chf.areas[i] == RC_NULL_AREA {
                    dist[i] = 0;
                    continue;
                }
                let walkable_neighbours = (0..4)
                    .filter_map(|dir| chf.neighbour(x, z, i, dir))
                    .filter(|&(_, _, ai)| chf.areas[ai] != RC_NULL_AREA)
                    .count();
                if walkable_neighbours != 4 {
                    dist[i] = 0;
                }
            }
        }
    }

    let relax = |dist: &mut [u8], i: usize, ai: usize, cost: u8| {
        let nd = dist[ai].saturating_add(cost);
        if nd < dist[i] {
            dist[i] = nd;
        }
    };

    // Pass 1
    for z in 0..h {
        for x in 0..w {
            for i in chf.cell(x, z).spans() {
                if let Some((ax, az, ai)) = chf.neighbour(x, z, i, 0) {
                    // (-1,0)
                    relax(&mut dist, i, ai, 2);
                    // (-1,-1)
                    if let Some((_, _, aai)) = chf.neighbour(ax, az, ai, 3) {
                        relax(&mut dist, i, aai, 3);
                    }
                }
                if let Some((ax, az, ai)) = chf.neighbour(x, z, i, 3) {
                    // (0,-1)
                    relax(&mut dist, i, ai, 2);
                    // (1,-1)
                    if let Some((_, _, aai)) = chf.neighbour(ax, az, ai, 2) {
                        relax(&mut dist, i, aai, 3);
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
                    // (1,0)
                    relax(&mut dist, i, ai, 2);
                    // (1,1)
                    if let Some((_, _, aai)) = chf.neighbour(ax, az, ai, 1) {
                        relax(&mut dist, i, aai, 3);
                    }
                }
                if let Some((ax, az, ai)) = chf.neighbour(x, z, i, 1) {
                    // (0,1)
                    relax(&mut dist, i, ai, 2);
                    // (-1,1)
                    if let Some((_, _, aai)) = chf.neighbour(ax, az, ai, 0) {
                        relax(&mut dist, i, aai, 3);
                    }
                }
            }
        }
    }

    let thr = (radius * 2).min(255) as u8;
    for (area, d) in chf.areas.iter_mut().zip(&dist) {
        if *d < thr {
            *area = RC_NULL_AREA;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Heightfield;
    use glam::Vec3;

    #[test]
    fn test_slope_marking_ignores_winding() {
        let verts = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let areas = mark_walkable_triangles(45.0, &verts, &[0, 1, 2, 0, 2, 1, 0, 1, 3]);
        assert_eq!(areas, vec![RC_WALKABLE_AREA, RC_WALKABLE_AREA, RC_NULL_AREA]);
    }

    #[test]
    fn test_degenerate_triangle_is_not_walkable() {
        let verts = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        assert_eq!(mark_walkable_triangles(45.0, &verts, &[0, 1, 2]), vec![RC_NULL_AREA]);
    }

    #[test]
    fn test_erode_removes_border_ring() {
        let mut hf = Heightfield::new(7, 7, Vec3::ZERO, Vec3::new(7.0, 10.0, 7.0), 1.0, 0.5);
        for z in 0..7 {
            for x in 0..7 {
                hf.add_span(x, z, 0, 2, RC_WALKABLE_AREA, 1);
            }
        }
        let mut chf = CompactHeightfield::build_from_heightfield(&hf, 4, 1).unwrap();
        erode_walkable_area(&mut chf, 2);

        let walkable: Vec<(i32, i32)> = (0..7)
            .flat_map(|z| (0..7).map(move |x| (x, z)))
            .filter(|&(x, z)| chf.areas[chf.cell(x, z).index as usize] != RC_NULL_AREA)
            .collect();
        // Cells at distance >= 2 from the edge survive
        assert!(walkable.iter().all(|&(x, z)| (2..5).contains(&x) && (2..5).contains(&z)));
        assert!(walkable.contains(&(3, 3)));
        assert_eq!(walkable.len(), 9);
    }
}
