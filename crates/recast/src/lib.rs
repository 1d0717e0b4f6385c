//! Recast component for navigation mesh generation
//!
//! Recast turns triangle soup into a walkable polygon mesh for one tile:
//! rasterize into a heightfield, filter and compact it, partition the
//! walkable surface into regions, trace and simplify region contours,
//! triangulate them into convex polygons and finally sample a detail mesh.
//! The compact heightfield can also be split into heightfield layers for the
//! tile cache.

mod area;
mod compact_heightfield;
mod config;
mod context;
mod contour;
mod detail_mesh;
mod distance_field;
mod heightfield;
mod heightfield_layers;
mod polymesh;
mod rasterization;
mod region;

pub use area::{erode_walkable_area, mark_walkable_triangles};
pub use compact_heightfield::{CompactCell, CompactHeightfield, CompactSpan};
pub use config::{PartitionType, RecastConfig};
pub use context::{RecastContext, TimerCategory};
pub use contour::{build_contours, Contour, ContourSet};
pub use detail_mesh::{build_poly_mesh_detail, PolyMeshDetail, RC_DETAIL_EDGE_BOUNDARY};
pub use distance_field::build_distance_field;
pub use heightfield::{Heightfield, Span, RC_SPAN_MAX_HEIGHT};
pub use heightfield_layers::{build_heightfield_layers, HeightfieldLayer, RC_LAYER_EMPTY};
pub use polymesh::{PolyMesh, RC_PORTAL_FLAG};
pub use rasterization::{rasterize_triangle, rasterize_triangles};
pub use region::{build_regions_monotone, build_regions_watershed};

use recast_common::Result;

/// Area id of unwalkable spans
pub const RC_NULL_AREA: u8 = 0;
/// Default area id of walkable spans
pub const RC_WALKABLE_AREA: u8 = 63;
/// Neighbour link value of an unconnected span side
pub const RC_NOT_CONNECTED: i32 = 0x3f;
/// Region id bit marking the tile border regions
pub const RC_BORDER_REG: u16 = 0x8000;
/// Contour vertex flag: the vertex sits on the tile border and may be removed
pub const RC_BORDER_VERTEX: i32 = 0x10000;
/// Contour vertex flag: the edge separates two areas
pub const RC_AREA_BORDER: i32 = 0x20000;
/// Mask of the neighbour region id in a contour vertex
pub const RC_CONTOUR_REG_MASK: i32 = 0xffff;
/// Unused polygon vertex or neighbour slot
pub const RC_MESH_NULL_IDX: u16 = 0xffff;
/// Region id of polygons merged from several regions
pub const RC_MULTIPLE_REGS: u16 = 0;

const DIR_OFFSET_X: [i32; 4] = [-1, 0, 1, 0];
const DIR_OFFSET_Y: [i32; 4] = [0, 1, 0, -1];

/// X offset of the neighbour in direction `dir` (0: -x, 1: +z, 2: +x, 3: -z)
#[inline]
pub fn get_dir_offset_x(dir: i32) -> i32 {
    DIR_OFFSET_X[(dir & 0x3) as usize]
}

/// Z offset of the neighbour in direction `dir`
#[inline]
pub fn get_dir_offset_y(dir: i32) -> i32 {
    DIR_OFFSET_Y[(dir & 0x3) as usize]
}

/// Direction of a unit offset along one axis
#[inline]
pub fn get_dir_for_offset(x: i32, y: i32) -> i32 {
    const DIRS: [i32; 5] = [3, 0, -1, 2, 1];
    usize::try_from(((y + 1) << 1) + x)
        .ok()
        .and_then(|i| DIRS.get(i).copied())
        .unwrap_or(-1)
}

/// Runs the Recast pipeline for one tile
#[derive(Debug)]
pub struct RecastBuilder {
    config: RecastConfig,
}

impl RecastBuilder {
    /// Creates a builder for `config`
    pub fn new(config: RecastConfig) -> Self {
        Self { config }
    }

    /// The build configuration
    pub fn config(&self) -> &RecastConfig {
        &self.config
    }

    /// Rasterizes `verts`/`tris`, filters the spans and returns the eroded
    /// compact heightfield.
    pub fn build_compact_heightfield(
        &self,
        ctx: &mut RecastContext,
        verts: &[f32],
        tris: &[i32],
    ) -> Result<CompactHeightfield> {
        let cfg = &self.config;
        cfg.validate()?;

        ctx.start_timer(TimerCategory::Rasterization);
        let mut hf = Heightfield::new(cfg.width, cfg.height, cfg.bmin, cfg.bmax, cfg.cs, cfg.ch);
        let areas = mark_walkable_triangles(cfg.walkable_slope_angle, verts, tris);
        rasterize_triangles(&mut hf, verts, tris, &areas, cfg.walkable_climb)?;
        ctx.stop_timer(TimerCategory::Rasterization);

        ctx.start_timer(TimerCategory::Filtering);
        hf.filter_low_hanging_walkable_obstacles(cfg.walkable_climb);
        hf.filter_ledge_spans(cfg.walkable_height, cfg.walkable_climb);
        hf.filter_walkable_low_height_spans(cfg.walkable_height);
        ctx.stop_timer(TimerCategory::Filtering);

        ctx.start_timer(TimerCategory::CompactHeightfield);
        let mut chf = CompactHeightfield::build_from_heightfield(&hf, cfg.walkable_height, cfg.walkable_climb)?;
        erode_walkable_area(&mut chf, cfg.walkable_radius);
        ctx.stop_timer(TimerCategory::CompactHeightfield);

        Ok(chf)
    }

    /// Partitions `chf` into regions and builds the polygon and detail meshes.
    ///
    /// Returns `None` when no polygon survives, which is a valid empty tile.
    pub fn build_meshes(
        &self,
        ctx: &mut RecastContext,
        chf: &mut CompactHeightfield,
    ) -> Result<Option<(PolyMesh, PolyMeshDetail)>> {
        let cfg = &self.config;

        ctx.start_timer(TimerCategory::Regions);
        match cfg.partition_type {
            PartitionType::Watershed => {
                build_distance_field(chf);
                build_regions_watershed(chf, cfg.border_size, cfg.min_region_area, cfg.merge_region_area)?;
            }
            PartitionType::Monotone => {
                build_regions_monotone(chf, cfg.border_size, cfg.min_region_area, cfg.merge_region_area)?;
            }
        }
        ctx.stop_timer(TimerCategory::Regions);

        ctx.start_timer(TimerCategory::Contours);
        let cset = build_contours(chf, cfg.max_simplification_error, cfg.max_edge_len)?;
        ctx.stop_timer(TimerCategory::Contours);
        if cset.contours.is_empty() {
            return Ok(None);
        }

        ctx.start_timer(TimerCategory::PolyMesh);
        let pmesh = PolyMesh::build_from_contour_set(&cset, cfg.max_vertices_per_polygon as usize)?;
        ctx.stop_timer(TimerCategory::PolyMesh);
        if pmesh.npolys() == 0 {
            return Ok(None);
        }

        ctx.start_timer(TimerCategory::DetailMesh);
        let dmesh = build_poly_mesh_detail(&pmesh, chf, cfg.detail_sample_dist, cfg.detail_sample_max_error)?;
        ctx.stop_timer(TimerCategory::DetailMesh);

        Ok(Some((pmesh, dmesh)))
    }

    /// Splits `chf` into heightfield layers
    pub fn build_layers(&self, ctx: &mut RecastContext, chf: &CompactHeightfield) -> Result<Vec<HeightfieldLayer>> {
        ctx.start_timer(TimerCategory::Layers);
        let layers = build_heightfield_layers(chf, self.config.walkable_height);
        ctx.stop_timer(TimerCategory::Layers);
        layers
    }

    /// Runs the whole pipeline from triangles to meshes
    pub fn build_mesh(
        &self,
        ctx: &mut RecastContext,
        verts: &[f32],
        tris: &[i32],
    ) -> Result<Option<(PolyMesh, PolyMeshDetail)>> {
        let mut chf = self.build_compact_heightfield(ctx, verts, tris)?;
        self.build_meshes(ctx, &mut chf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn quad(size: f32, y: f32) -> (Vec<f32>, Vec<i32>) {
        let verts = vec![0.0, y, 0.0, 0.0, y, size, size, y, size, size, y, 0.0];
        (verts, vec![0, 1, 2, 0, 2, 3])
    }

    fn config_for(size: f32, border_size: i32) -> RecastConfig {
        let mut cfg = RecastConfig {
            cs: 0.5,
            ch: 0.25,
            walkable_height: 8,
            walkable_climb: 3,
            walkable_radius: 1,
            max_edge_len: 24,
            min_region_area: 4,
            merge_region_area: 16,
            detail_sample_dist: 3.0,
            detail_sample_max_error: 0.25,
            border_size,
            ..RecastConfig::default()
        };
        cfg.calculate_grid_size(Vec3::new(0.0, -1.0, 0.0), Vec3::new(size, 2.0, size));
        cfg
    }

    #[test]
    fn test_dir_helpers() {
        for dir in 0..4 {
            let dx = get_dir_offset_x(dir);
            let dy = get_dir_offset_y(dir);
            assert_eq!(get_dir_for_offset(dx, dy), dir);
        }
    }

    #[test]
    fn test_flat_quad_builds_polygons() {
        let (verts, tris) = quad(10.0, 0.0);
        let builder = RecastBuilder::new(config_for(10.0, 0));
        let mut ctx = RecastContext::new();
        let (pmesh, dmesh) = builder.build_mesh(&mut ctx, &verts, &tris).unwrap().expect("polygons");
        assert!(pmesh.npolys() > 0);
        assert_eq!(dmesh.nmeshes(), pmesh.npolys());
        // Detail heights stay on the floor
        for v in dmesh.verts.chunks_exact(3) {
            assert!(v[1].abs() < 0.6, "detail y {}", v[1]);
        }
        assert!(ctx.get_timer_count(TimerCategory::Regions) == 1);
    }

    #[test]
    fn test_no_geometry_is_empty() {
        let builder = RecastBuilder::new(config_for(10.0, 0));
        let mut ctx = RecastContext::new();
        assert!(builder.build_mesh(&mut ctx, &[], &[]).unwrap().is_none());
    }

    #[test]
    fn test_steep_geometry_is_empty() {
        // A wall
        let verts = vec![0.0, 0.0, 5.0, 10.0, 0.0, 5.0, 10.0, 2.0, 5.0, 0.0, 2.0, 5.0];
        let tris = vec![0, 1, 2, 0, 2, 3];
        let builder = RecastBuilder::new(config_for(10.0, 0));
        let mut ctx = RecastContext::new();
        assert!(builder.build_mesh(&mut ctx, &verts, &tris).unwrap().is_none());
    }

    #[test]
    fn test_monotone_partition_builds_polygons() {
        let (verts, tris) = quad(8.0, 0.0);
        let mut cfg = config_for(8.0, 0);
        cfg.partition_type = PartitionType::Monotone;
        let builder = RecastBuilder::new(cfg);
        let mut ctx = RecastContext::new();
        let result = builder.build_mesh(&mut ctx, &verts, &tris).unwrap();
        assert!(result.is_some_and(|(p, _)| p.npolys() > 0));
    }

    #[test]
    fn test_layers_rebuild_the_same_surface() {
        let (verts, tris) = quad(10.0, 0.0);
        let builder = RecastBuilder::new(config_for(10.0, 4));
        let mut ctx = RecastContext::new();
        let mut chf = builder.build_compact_heightfield(&mut ctx, &verts, &tris).unwrap();
        let layers = builder.build_layers(&mut ctx, &chf).unwrap();
        assert_eq!(layers.len(), 1);

        let cfg = builder.config();
        let mut lchf = layers[0].to_compact_heightfield(cfg.walkable_height, cfg.walkable_climb);
        let from_layer = builder.build_meshes(&mut ctx, &mut lchf).unwrap().expect("layer polygons");
        let direct = builder.build_meshes(&mut ctx, &mut chf).unwrap().expect("direct polygons");
        assert!(from_layer.0.npolys() > 0);
        assert!(direct.0.npolys() > 0);
        // Both meshes cover the same footprint
        let max_x = |m: &PolyMesh| m.verts.iter().step_by(3).copied().max();
        assert_eq!(max_x(&from_layer.0), max_x(&direct.0));
    }
}
