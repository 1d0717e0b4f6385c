//! Configuration for the Recast navigation mesh generation process

use glam::Vec3;
use recast_common::{Error, Result};

/// Strategy used to partition the walkable surface into regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PartitionType {
    /// Distance field followed by watershed flooding. Best quality, slowest.
    #[default]
    Watershed,
    /// Sweep-line monotone partition. Fast, tends to produce long thin polygons.
    Monotone,
}

/// Configuration parameters for Recast navigation mesh generation
///
/// All `walkable_*`, `max_edge_len` and `*_region_area` values are in voxel
/// units. World-unit conversion happens in the caller.
#[derive(Debug, Clone)]
pub struct RecastConfig {
    /// The width of the field along the x-axis, border included
    pub width: i32,
    /// The height of the field along the z-axis, border included
    pub height: i32,
    /// Size of a tile along x and z, in cells, not counting the border
    pub tile_size: i32,
    /// Number of cells added around the tile to avoid seams
    pub border_size: i32,

    /// The width/depth resolution of the field (cell size)
    pub cs: f32,
    /// The height resolution of the field (cell height)
    pub ch: f32,

    /// The minimum bounds of the field's AABB
    pub bmin: Vec3,
    /// The maximum bounds of the field's AABB
    pub bmax: Vec3,

    /// The maximum slope in degrees that is considered walkable
    pub walkable_slope_angle: f32,
    /// Minimum floor to ceiling height that will still allow the floor area to be considered walkable
    pub walkable_height: i32,
    /// The maximum ledge height that is considered traversable
    pub walkable_climb: i32,
    /// The distance to erode the walkable area away from obstructions
    pub walkable_radius: i32,

    /// The maximum allowed length for contour edges along the border of the mesh
    pub max_edge_len: i32,
    /// The maximum distance a simplified contour's border edges should deviate from the raw contour
    pub max_simplification_error: f32,
    /// The minimum number of cells allowed to form isolated island areas
    pub min_region_area: i32,
    /// Regions smaller than this are merged with larger neighbours when possible
    pub merge_region_area: i32,

    /// Maximum vertices per polygon produced by the contour to polygon step
    pub max_vertices_per_polygon: i32,

    /// Sampling distance used when generating the detail mesh
    pub detail_sample_dist: f32,
    /// The maximum distance the detail mesh surface should deviate from the heightfield
    pub detail_sample_max_error: f32,

    /// Region partitioning strategy
    pub partition_type: PartitionType,
}

impl Default for RecastConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            tile_size: 0,
            border_size: 0,
            cs: 0.3,
            ch: 0.2,
            bmin: Vec3::ZERO,
            bmax: Vec3::ZERO,
            walkable_slope_angle: 45.0,
            walkable_height: 10,
            walkable_climb: 4,
            walkable_radius: 2,
            max_edge_len: 40,
            max_simplification_error: 1.3,
            min_region_area: 8,
            merge_region_area: 20,
            max_vertices_per_polygon: 6,
            detail_sample_dist: 1.8,
            detail_sample_max_error: 0.2,
            partition_type: PartitionType::Watershed,
        }
    }
}

impl RecastConfig {
    /// Creates a new RecastConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bounds and derives the grid size from them
    pub fn calculate_grid_size(&mut self, bmin: Vec3, bmax: Vec3) {
        self.bmin = bmin;
        self.bmax = bmax;
        let (w, h) = recast_common::calc_grid_size(bmin.to_array(), bmax.to_array(), self.cs);
        self.width = w;
        self.height = h;
    }

    /// Validates the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.width <= 0 || self.height <= 0 {
            return Err(Error::Recast(format!(
                "invalid grid size {}x{}",
                self.width, self.height
            )));
        }
        if !(self.cs > 0.0) || !(self.ch > 0.0) {
            return Err(Error::Recast("cell size and height must be positive".to_string()));
        }
        if !(0.0..=90.0).contains(&self.walkable_slope_angle) {
            return Err(Error::Recast(format!(
                "walkable slope {} outside 0..=90 degrees",
                self.walkable_slope_angle
            )));
        }
        if self.walkable_height < 3 {
            return Err(Error::Recast("walkable height must be at least 3 voxels".to_string()));
        }
        if self.walkable_climb < 0 || self.walkable_radius < 0 || self.border_size < 0 {
            return Err(Error::Recast("negative voxel distance".to_string()));
        }
        if !(3..=6).contains(&self.max_vertices_per_polygon) {
            return Err(Error::Recast(format!(
                "vertices per polygon {} outside 3..=6",
                self.max_vertices_per_polygon
            )));
        }
        Ok(())
    }
}
