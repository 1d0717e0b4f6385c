//! Tile cache builder for real-time mesh rebuilding
//!
//! Rebuilds navigation mesh tiles from cached layers. Obstacles are stamped
//! into a copy of the layer as null area, then the layer runs through region
//! partitioning, contours, the polygon and detail meshes, and tile packing.
//! Raw geometry is never touched.

use glam::Vec3;

use detour::{NavMeshBuilder, NavMeshCreateParams, PolyFlags};
use recast::{HeightfieldLayer, RecastBuilder, RecastConfig, RecastContext, RC_LAYER_EMPTY, RC_NULL_AREA};
use recast_common::Result;

use super::tile_cache::TileCacheParams;
use super::tile_cache_data::TileCacheLayer;

/// Obstacle footprint in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObstacleShape {
    /// Upright cylinder standing on `pos`
    Cylinder { pos: Vec3, radius: f32, height: f32 },
    /// Box around `center`, rotated by `yaw` radians about the Y axis
    Box { center: Vec3, half_extents: Vec3, yaw: f32 },
}

impl ObstacleShape {
    /// World-space bounds of the shape
    pub fn bounds(&self) -> (Vec3, Vec3) {
        match *self {
            ObstacleShape::Cylinder { pos, radius, height } => (
                Vec3::new(pos.x - radius, pos.y, pos.z - radius),
                Vec3::new(pos.x + radius, pos.y + height, pos.z + radius),
            ),
            ObstacleShape::Box {
                center,
                half_extents,
                yaw,
            } => {
                let (s, c) = yaw.sin_cos();
                let (s, c) = (s.abs(), c.abs());
                let ext = Vec3::new(
                    c * half_extents.x + s * half_extents.z,
                    half_extents.y,
                    s * half_extents.x + c * half_extents.z,
                );
                (center - ext, center + ext)
            }
        }
    }

    /// Whether the world point `p` lies inside the shape
    fn contains(&self, p: Vec3) -> bool {
        match *self {
            ObstacleShape::Cylinder { pos, radius, height } => {
                if p.y < pos.y || p.y > pos.y + height {
                    return false;
                }
                let (dx, dz) = (p.x - pos.x, p.z - pos.z);
                dx * dx + dz * dz <= radius * radius
            }
            ObstacleShape::Box {
                center,
                half_extents,
                yaw,
            } => {
                let d = p - center;
                if d.y.abs() > half_extents.y {
                    return false;
                }
                let (s, c) = yaw.sin_cos();
                let lx = c * d.x + s * d.z;
                let lz = -s * d.x + c * d.z;
                lx.abs() <= half_extents.x && lz.abs() <= half_extents.z
            }
        }
    }
}

/// Hook run on every tile's meshes right before packing
pub trait MeshProcess: std::fmt::Debug {
    /// Adjusts polygon flags or areas of the tile about to be packed
    fn process(&self, params: &mut NavMeshCreateParams);
}

/// Sets [`PolyFlags::WALK`] on every polygon with a walkable area
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkableFlags;

impl MeshProcess for WalkableFlags {
    fn process(&self, params: &mut NavMeshCreateParams) {
        for (flags, &area) in params.poly_flags.iter_mut().zip(&params.poly_areas) {
            if area != RC_NULL_AREA {
                *flags |= PolyFlags::WALK;
            }
        }
    }
}

/// Stamps `shape` into `layer` as null area. Returns the number of cells
/// changed.
pub fn mark_obstacle(layer: &mut HeightfieldLayer, shape: &ObstacleShape) -> usize {
    let (omin, omax) = shape.bounds();
    let cs = layer.cs;

    let to_cell = |v: f32, origin: f32| ((v - origin) / cs).floor() as i32;
    let x0 = to_cell(omin.x, layer.bmin.x).max(0);
    let x1 = to_cell(omax.x, layer.bmin.x).min(layer.width - 1);
    let z0 = to_cell(omin.z, layer.bmin.z).max(0);
    let z1 = to_cell(omax.z, layer.bmin.z).min(layer.height - 1);

    let mut marked = 0;
    for z in z0..=z1 {
        for x in x0..=x1 {
            let idx = (x + z * layer.width) as usize;
            if layer.heights[idx] == RC_LAYER_EMPTY || layer.areas[idx] == RC_NULL_AREA {
                continue;
            }
            let p = Vec3::new(
                layer.bmin.x + (x as f32 + 0.5) * cs,
                layer.bmin.y + layer.heights[idx] as f32 * layer.ch,
                layer.bmin.z + (z as f32 + 0.5) * cs,
            );
            if shape.contains(p) {
                layer.areas[idx] = RC_NULL_AREA;
                marked += 1;
            }
        }
    }
    marked
}

/// Converts cached layers into navigation mesh tile blobs
#[derive(Debug, Clone)]
pub struct TileCacheBuilder {
    config: RecastConfig,
    walkable_height: f32,
    walkable_radius: f32,
    walkable_climb: f32,
}

impl TileCacheBuilder {
    /// Creates a builder. Cell sizes and agent values come from `params`;
    /// region, contour and detail settings from `config`.
    pub fn new(params: &TileCacheParams, config: RecastConfig) -> Self {
        let mut config = config;
        config.cs = params.cs;
        config.ch = params.ch;
        config.walkable_height = (params.walkable_height / params.ch).ceil() as i32;
        config.walkable_climb = (params.walkable_climb / params.ch).floor() as i32;
        config.walkable_radius = (params.walkable_radius / params.cs).ceil() as i32;
        config.max_simplification_error = params.max_simplification_error;
        config.tile_size = params.width;

        Self {
            config,
            walkable_height: params.walkable_height,
            walkable_radius: params.walkable_radius,
            walkable_climb: params.walkable_climb,
        }
    }

    /// The Recast settings used for the rebuild
    pub fn config(&self) -> &RecastConfig {
        &self.config
    }

    /// Builds the tile blob of `layer` with `obstacles` cut out.
    ///
    /// Returns `None` when no polygon survives, which is a valid empty tile.
    pub fn build_tile_from_layer(
        &self,
        ctx: &mut RecastContext,
        layer: &TileCacheLayer,
        obstacles: &[ObstacleShape],
        process: &dyn MeshProcess,
    ) -> Result<Option<Vec<u8>>> {
        let header = &layer.header;
        let mut hf_layer = layer.to_heightfield_layer(self.config.cs, self.config.ch);

        let marked: usize = obstacles.iter().map(|o| mark_obstacle(&mut hf_layer, o)).sum();
        if marked > 0 {
            log::debug!(
                "layer ({}, {}, {}): {} cells blocked by obstacles",
                header.tx,
                header.ty,
                header.tlayer,
                marked
            );
        }

        let mut chf = hf_layer.to_compact_heightfield(self.config.walkable_height, self.config.walkable_climb);
        // Room for the agent above the highest floor of the layer
        chf.bmax.y += self.config.walkable_height as f32 * self.config.ch;

        let mut cfg = self.config.clone();
        cfg.width = hf_layer.width;
        cfg.height = hf_layer.height;
        cfg.bmin = chf.bmin;
        cfg.bmax = chf.bmax;
        cfg.border_size = ((hf_layer.width - cfg.tile_size) / 2).max(0);

        let Some((pmesh, dmesh)) = RecastBuilder::new(cfg).build_meshes(ctx, &mut chf)? else {
            return Ok(None);
        };

        let mut params = NavMeshCreateParams::from_meshes(&pmesh, &dmesh)
            .with_tile(header.tx, header.ty, header.tlayer)
            .with_agent(self.walkable_height, self.walkable_radius, self.walkable_climb);
        process.process(&mut params);

        NavMeshBuilder::create_nav_mesh_data(&params).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_layer_helpers::{plane_layers, test_config, test_params};
    use detour::load_tile_from_binary;

    fn builder() -> TileCacheBuilder {
        TileCacheBuilder::new(&test_params(), test_config())
    }

    #[test]
    fn test_builder_derives_voxel_agent() {
        let b = builder();
        assert_eq!(b.config().walkable_height, 8);
        assert_eq!(b.config().walkable_climb, 3);
        assert_eq!(b.config().walkable_radius, 1);
        assert_eq!(b.config().tile_size, 16);
    }

    #[test]
    fn test_obstacle_bounds() {
        let cyl = ObstacleShape::Cylinder {
            pos: Vec3::new(1.0, 0.0, 2.0),
            radius: 0.5,
            height: 2.0,
        };
        assert_eq!(cyl.bounds(), (Vec3::new(0.5, 0.0, 1.5), Vec3::new(1.5, 2.0, 2.5)));

        let rotated = ObstacleShape::Box {
            center: Vec3::ZERO,
            half_extents: Vec3::new(2.0, 1.0, 1.0),
            yaw: std::f32::consts::FRAC_PI_2,
        };
        let (bmin, bmax) = rotated.bounds();
        assert!((bmax.x - 1.0).abs() < 1e-5);
        assert!((bmax.z - 2.0).abs() < 1e-5);
        assert!((bmin.y + 1.0).abs() < 1e-5);
        assert!(rotated.contains(Vec3::new(0.0, 0.0, 1.9)));
        assert!(!rotated.contains(Vec3::new(1.9, 0.0, 0.0)));
    }

    #[test]
    fn test_mark_obstacle_clears_cells() {
        let layer = plane_layers(0, 0, 8.0).remove(0);
        let mut hf = layer.to_heightfield_layer(0.5, 0.25);
        let walkable_before = hf.areas.iter().filter(|&&a| a != RC_NULL_AREA).count();

        let marked = mark_obstacle(
            &mut hf,
            &ObstacleShape::Cylinder {
                pos: Vec3::new(4.0, -0.5, 4.0),
                radius: 1.0,
                height: 2.0,
            },
        );
        assert!(marked > 0);
        let walkable_after = hf.areas.iter().filter(|&&a| a != RC_NULL_AREA).count();
        assert_eq!(walkable_before - walkable_after, marked);

        // Above the floor the cylinder misses
        let marked = mark_obstacle(
            &mut hf,
            &ObstacleShape::Cylinder {
                pos: Vec3::new(2.0, 5.0, 2.0),
                radius: 1.0,
                height: 2.0,
            },
        );
        assert_eq!(marked, 0);
    }

    #[test]
    fn test_build_tile_from_layer() {
        let layer = plane_layers(0, 0, 8.0).remove(0);
        let data = builder()
            .build_tile_from_layer(&mut RecastContext::new(), &layer, &[], &WalkableFlags)
            .unwrap()
            .expect("walkable plane yields polygons");

        let tile = load_tile_from_binary(&data).unwrap();
        assert_eq!((tile.header.x, tile.header.y, tile.header.layer), (0, 0, 0));
        assert!(!tile.polys.is_empty());
        assert!(tile.polys.iter().all(|p| p.flags.contains(PolyFlags::WALK)));
        assert_eq!(tile.header.walkable_height, 2.0);
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let layer = plane_layers(1, 0, 16.0).remove(0);
        let b = builder();
        let first = b.build_tile_from_layer(&mut RecastContext::new(), &layer, &[], &WalkableFlags).unwrap();
        let second = b.build_tile_from_layer(&mut RecastContext::new(), &layer, &[], &WalkableFlags).unwrap();
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn test_obstacle_cuts_hole() {
        let layer = plane_layers(0, 0, 8.0).remove(0);
        let b = builder();
        let mut ctx = RecastContext::new();

        let open = b.build_tile_from_layer(&mut ctx, &layer, &[], &WalkableFlags).unwrap().unwrap();
        let cylinder = ObstacleShape::Cylinder {
            pos: Vec3::new(4.0, -0.5, 4.0),
            radius: 1.0,
            height: 2.0,
        };
        let holed = b.build_tile_from_layer(&mut ctx, &layer, &[cylinder], &WalkableFlags).unwrap().unwrap();

        let open = load_tile_from_binary(&open).unwrap();
        let holed = load_tile_from_binary(&holed).unwrap();
        assert!(holed.polys.len() > open.polys.len());
    }

    #[test]
    fn test_covering_obstacle_leaves_empty_tile() {
        let layer = plane_layers(0, 0, 8.0).remove(0);
        let cover = ObstacleShape::Box {
            center: Vec3::new(4.0, 0.0, 4.0),
            half_extents: Vec3::new(20.0, 1.0, 20.0),
            yaw: 0.0,
        };
        let data = builder()
            .build_tile_from_layer(&mut RecastContext::new(), &layer, &[cover], &WalkableFlags)
            .unwrap();
        assert!(data.is_none());
    }
}
