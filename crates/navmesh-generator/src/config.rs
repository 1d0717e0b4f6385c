//! Build parameters of a tiled navmesh
//!
//! [`BuildParameters`] holds the world-unit settings a caller tunes. The
//! voxel-unit [`RecastConfig`] and the [`TileCacheParams`] of a tile are
//! derived from it.

use detour_tilecache::{TileCacheParams, MAX_OBSTACLES};
use recast::{PartitionType, RecastConfig};
use recast_common::{Error, Result};

/// Maximum vertices per navigation polygon
pub const VERTS_PER_POLY: i32 = 6;

/// World-unit settings of a navmesh build
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct BuildParameters {
    /// Horizontal voxel size
    pub cell_size: f32,
    /// Vertical voxel size
    pub cell_height: f32,
    /// Minimum clearance the agent needs
    pub agent_height: f32,
    /// Distance kept from walls and ledges
    pub agent_radius: f32,
    /// Highest step the agent climbs
    pub agent_max_climb: f32,
    /// Steepest walkable slope in degrees
    pub agent_max_slope: f32,
    /// Regions smaller than this many cells (squared size) are dropped
    pub region_min_size: f32,
    /// Regions smaller than this many cells (squared size) are merged
    pub region_merge_size: f32,
    /// Longest contour edge along the mesh border
    pub edge_max_length: f32,
    /// Largest deviation of a simplified contour from the raw one
    pub edge_max_error: f32,
    /// Detail mesh sampling distance, in cells
    pub detail_sample_distance: f32,
    /// Largest deviation of the detail mesh from the heightfield, in cell heights
    pub detail_sample_max_error: f32,
    /// Tile edge length in cells
    pub tile_size: i32,
    pub partition_type: PartitionType,
    /// Layers kept per tile by the tile cache
    pub max_layers: i32,
    /// Obstacle slots of the tile cache
    pub max_obstacles: i32,
}

impl Default for BuildParameters {
    fn default() -> Self {
        Self {
            cell_size: 0.3,
            cell_height: 0.2,
            agent_height: 2.0,
            agent_radius: 0.6,
            agent_max_climb: 0.9,
            agent_max_slope: 45.0,
            region_min_size: 8.0,
            region_merge_size: 20.0,
            edge_max_length: 12.0,
            edge_max_error: 1.3,
            detail_sample_distance: 6.0,
            detail_sample_max_error: 1.0,
            tile_size: 64,
            partition_type: PartitionType::Watershed,
            max_layers: 8,
            max_obstacles: 1024,
        }
    }
}

impl BuildParameters {
    pub fn with_cell_size(mut self, cell_size: f32, cell_height: f32) -> Self {
        self.cell_size = cell_size;
        self.cell_height = cell_height;
        self
    }

    /// Sets the agent height, radius and max climb
    pub fn with_agent(mut self, height: f32, radius: f32, max_climb: f32) -> Self {
        self.agent_height = height;
        self.agent_radius = radius;
        self.agent_max_climb = max_climb;
        self
    }

    pub fn with_max_slope(mut self, degrees: f32) -> Self {
        self.agent_max_slope = degrees;
        self
    }

    pub fn with_region_sizes(mut self, min_size: f32, merge_size: f32) -> Self {
        self.region_min_size = min_size;
        self.region_merge_size = merge_size;
        self
    }

    pub fn with_edge_limits(mut self, max_length: f32, max_error: f32) -> Self {
        self.edge_max_length = max_length;
        self.edge_max_error = max_error;
        self
    }

    pub fn with_detail_sampling(mut self, distance: f32, max_error: f32) -> Self {
        self.detail_sample_distance = distance;
        self.detail_sample_max_error = max_error;
        self
    }

    pub fn with_tile_size(mut self, cells: i32) -> Self {
        self.tile_size = cells;
        self
    }

    pub fn with_partition_type(mut self, partition_type: PartitionType) -> Self {
        self.partition_type = partition_type;
        self
    }

    /// Sets the tile cache limits
    pub fn with_cache_limits(mut self, max_layers: i32, max_obstacles: i32) -> Self {
        self.max_layers = max_layers;
        self.max_obstacles = max_obstacles;
        self
    }

    /// Rejects non-positive sizes and non-finite values
    pub fn validate(&self) -> Result<()> {
        let values = [
            ("cell_size", self.cell_size),
            ("cell_height", self.cell_height),
            ("agent_height", self.agent_height),
            ("agent_radius", self.agent_radius),
            ("agent_max_climb", self.agent_max_climb),
            ("agent_max_slope", self.agent_max_slope),
            ("region_min_size", self.region_min_size),
            ("region_merge_size", self.region_merge_size),
            ("edge_max_length", self.edge_max_length),
            ("edge_max_error", self.edge_max_error),
            ("detail_sample_distance", self.detail_sample_distance),
            ("detail_sample_max_error", self.detail_sample_max_error),
        ];
        if let Some((name, value)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::NavMeshGeneration(format!("{name} is not finite: {value}")));
        }
        for (name, value) in [
            ("cell_size", self.cell_size),
            ("cell_height", self.cell_height),
            ("agent_height", self.agent_height),
        ] {
            if value <= 0.0 {
                return Err(Error::NavMeshGeneration(format!("{name} must be positive, got {value}")));
            }
        }
        if let Some((name, value)) = values.iter().find(|(_, v)| *v < 0.0) {
            return Err(Error::NavMeshGeneration(format!("{name} must not be negative, got {value}")));
        }
        if self.agent_max_slope > 90.0 {
            return Err(Error::NavMeshGeneration(format!(
                "agent_max_slope {} exceeds 90 degrees",
                self.agent_max_slope
            )));
        }
        if self.tile_size <= 0 || self.max_layers <= 0 || self.max_obstacles <= 0 {
            return Err(Error::NavMeshGeneration(format!(
                "tile_size {}, max_layers {} and max_obstacles {} must be positive",
                self.tile_size, self.max_layers, self.max_obstacles
            )));
        }
        if self.max_obstacles > MAX_OBSTACLES {
            return Err(Error::NavMeshGeneration(format!(
                "max_obstacles {} exceeds {}",
                self.max_obstacles, MAX_OBSTACLES
            )));
        }
        if self.walkable_height() < 3 {
            return Err(Error::NavMeshGeneration(format!(
                "agent_height {} is under 3 cell heights",
                self.agent_height
            )));
        }
        Ok(())
    }

    /// World length of a tile edge
    pub fn tile_edge_length(&self) -> f32 {
        self.tile_size as f32 * self.cell_size
    }

    pub fn walkable_height(&self) -> i32 {
        (self.agent_height / self.cell_height).ceil() as i32
    }

    pub fn walkable_climb(&self) -> i32 {
        (self.agent_max_climb / self.cell_height).floor() as i32
    }

    pub fn walkable_radius(&self) -> i32 {
        (self.agent_radius / self.cell_size).ceil() as i32
    }

    /// Cells added around a tile so neighbouring tiles meet without seams
    pub fn border_size(&self) -> i32 {
        self.walkable_radius() + 3
    }

    /// Voxel settings of one tile. Bounds are left for the caller to set.
    pub fn to_recast_config(&self) -> RecastConfig {
        let border_size = self.border_size();
        RecastConfig {
            width: self.tile_size + border_size * 2,
            height: self.tile_size + border_size * 2,
            tile_size: self.tile_size,
            border_size,
            cs: self.cell_size,
            ch: self.cell_height,
            walkable_slope_angle: self.agent_max_slope,
            walkable_height: self.walkable_height(),
            walkable_climb: self.walkable_climb(),
            walkable_radius: self.walkable_radius(),
            max_edge_len: (self.edge_max_length / self.cell_size).floor() as i32,
            max_simplification_error: self.edge_max_error,
            min_region_area: self.region_min_size.sqrt().floor() as i32,
            merge_region_area: self.region_merge_size.sqrt().floor() as i32,
            max_vertices_per_polygon: VERTS_PER_POLY,
            detail_sample_dist: if self.detail_sample_distance < 0.9 {
                0.0
            } else {
                self.cell_size * self.detail_sample_distance
            },
            detail_sample_max_error: self.cell_height * self.detail_sample_max_error,
            partition_type: self.partition_type,
            ..RecastConfig::default()
        }
    }

    /// Tile cache settings for a grid at `origin` holding `tile_count` tiles
    pub fn tile_cache_params(&self, origin: [f32; 3], tile_count: i32) -> TileCacheParams {
        TileCacheParams {
            origin,
            cs: self.cell_size,
            ch: self.cell_height,
            width: self.tile_size,
            height: self.tile_size,
            walkable_height: self.agent_height,
            walkable_radius: self.agent_radius,
            walkable_climb: self.agent_max_climb,
            max_simplification_error: self.edge_max_error,
            max_tiles: tile_count.saturating_mul(self.max_layers),
            max_obstacles: self.max_obstacles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = BuildParameters::default();
        params.validate().unwrap();
        assert!((params.tile_edge_length() - 19.2).abs() < 1e-4);
    }

    #[test]
    fn test_recast_derivation() {
        let cfg = BuildParameters::default().to_recast_config();
        assert_eq!(cfg.walkable_height, 10);
        assert_eq!(cfg.walkable_climb, 4);
        assert_eq!(cfg.walkable_radius, 2);
        assert_eq!(cfg.border_size, 5);
        assert_eq!(cfg.width, 74);
        assert_eq!(cfg.height, 74);
        assert!((39..=40).contains(&cfg.max_edge_len));
        assert_eq!(cfg.min_region_area, 2);
        assert_eq!(cfg.merge_region_area, 4);
        assert_eq!(cfg.max_vertices_per_polygon, 6);
        assert!((cfg.detail_sample_dist - 1.8).abs() < 1e-5);
        assert!((cfg.detail_sample_max_error - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_small_detail_distance_disables_sampling() {
        let cfg = BuildParameters::default().with_detail_sampling(0.5, 1.0).to_recast_config();
        assert_eq!(cfg.detail_sample_dist, 0.0);
    }

    #[test]
    fn test_builders_chain() {
        let params = BuildParameters::default()
            .with_cell_size(0.5, 0.25)
            .with_agent(1.8, 0.4, 0.5)
            .with_tile_size(32)
            .with_partition_type(PartitionType::Monotone)
            .with_cache_limits(4, 16);
        assert_eq!(params.cell_size, 0.5);
        assert_eq!(params.walkable_radius(), 1);
        assert_eq!(params.tile_size, 32);
        assert_eq!(params.partition_type, PartitionType::Monotone);

        let tc = params.tile_cache_params([1.0, 2.0, 3.0], 6);
        assert_eq!(tc.max_tiles, 24);
        assert_eq!(tc.max_obstacles, 16);
        assert_eq!(tc.width, 32);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(BuildParameters::default().with_cell_size(0.0, 0.2).validate().is_err());
        assert!(BuildParameters::default().with_agent(f32::NAN, 0.6, 0.9).validate().is_err());
        assert!(BuildParameters::default().with_agent(2.0, -1.0, 0.9).validate().is_err());
        assert!(BuildParameters::default().with_tile_size(0).validate().is_err());
        assert!(BuildParameters::default().with_max_slope(120.0).validate().is_err());
        assert!(BuildParameters::default().with_agent(0.3, 0.6, 0.9).validate().is_err());
        assert!(BuildParameters::default().with_cache_limits(8, i32::MAX).validate().is_err());
        assert!(BuildParameters::default().with_cache_limits(8, MAX_OBSTACLES).validate().is_ok());
    }

    #[cfg(feature = "serialization")]
    #[test]
    fn test_serde_round_trip() {
        let params = BuildParameters::default().with_tile_size(48);
        let json = serde_json::to_string(&params).unwrap();
        let back: BuildParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }
}
