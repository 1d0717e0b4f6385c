//! Scenario tests for the generation session

use std::sync::Arc;

use glam::{Affine3A, Vec3};

use detour::{NavMesh, QueryFilter};
use recast_common::Error;

use crate::generator::{NavMeshGenerator, TileStrategy};
use crate::input::InputRecord;
use crate::test_geometry::{block, square_record, test_params};

fn generator_with(strategy: TileStrategy, records: Vec<InputRecord>) -> NavMeshGenerator {
    let mut generator = NavMeshGenerator::new(test_params(), strategy).unwrap();
    generator.add_geometry(records);
    generator.build().unwrap();
    generator
}

fn tile_blobs(nav_mesh: &NavMesh) -> Vec<((i32, i32, i32), Vec<u8>)> {
    nav_mesh
        .tiles()
        .map(|(_, t)| ((t.header.x, t.header.y, t.header.layer), t.data.clone()))
        .collect()
}

#[test]
fn test_build_without_geometry_fails() {
    let mut generator = NavMeshGenerator::new(test_params(), TileStrategy::Direct).unwrap();
    assert!(generator.build().is_err());
    assert!(generator.nav_mesh().is_none());
    assert!(generator.recalculate_tiles().is_err());
    assert!(!generator.build_tile(0, 0));
}

#[test]
fn test_invalid_parameters_rejected() {
    let params = test_params().with_tile_size(0);
    assert!(NavMeshGenerator::new(params, TileStrategy::Direct).is_err());
}

#[test]
fn test_build_covers_geometry() {
    for strategy in [TileStrategy::Direct, TileStrategy::Cached] {
        let generator = generator_with(strategy, vec![square_record(Vec3::ZERO, 20.0, 1)]);
        // 40 cells of 0.5 in tiles of 16 cells
        assert_eq!(generator.tile_counts(), Some((3, 3)));
        assert_eq!(generator.nav_mesh().unwrap().tile_count(), 9);
        assert!(generator.dirty_tiles().is_empty());
        assert_eq!(generator.tile_cache().is_some(), strategy == TileStrategy::Cached);
    }
}

#[test]
fn test_rebuild_is_idempotent() {
    for strategy in [TileStrategy::Direct, TileStrategy::Cached] {
        let mut generator = generator_with(strategy, vec![square_record(Vec3::ZERO, 20.0, 1)]);
        let before = tile_blobs(generator.nav_mesh().unwrap());

        assert!(generator.build_tile(1, 1));
        assert_eq!(generator.build_tiles(0, 0, 2, 2).unwrap(), 9);

        assert_eq!(tile_blobs(generator.nav_mesh().unwrap()), before);
    }
}

#[test]
fn test_empty_tile_succeeds_without_tile() {
    for strategy in [TileStrategy::Direct, TileStrategy::Cached] {
        let mut generator = generator_with(
            strategy,
            vec![
                square_record(Vec3::ZERO, 4.0, 1),
                square_record(Vec3::new(30.0, 0.0, 30.0), 4.0, 2),
            ],
        );
        // Tile (2, 2) spans 14..22 on both axes
        assert!(generator.build_tile(2, 2));
        assert!(generator.nav_mesh().unwrap().tiles_at(2, 2).is_empty());
        if let Some(cache) = generator.tile_cache() {
            assert!(cache.tiles_at(2, 2).is_empty());
        }
    }
}

#[test]
fn test_out_of_grid_tile_fails() {
    let mut generator = generator_with(TileStrategy::Direct, vec![square_record(Vec3::ZERO, 20.0, 1)]);
    assert!(!generator.build_tile(3, 0));
    assert!(!generator.build_tile(0, -1));
}

#[test]
fn test_added_geometry_marks_only_its_tile() {
    let mut generator = generator_with(TileStrategy::Direct, vec![square_record(Vec3::ZERO, 40.0, 1)]);
    assert_eq!(generator.tile_counts(), Some((5, 5)));

    // Tile (2, 3) spans x -4..4 and z 4..12
    let range = generator.add_geometry([square_record(Vec3::new(0.0, 0.5, 8.0), 1.0, 2)]);
    assert_eq!(range, 1..2);
    assert_eq!(generator.dirty_tiles(), vec![(2, 3)]);

    assert_eq!(generator.recalculate_tiles().unwrap(), 1);
    assert!(generator.dirty_tiles().is_empty());
}

#[test]
fn test_mark_dirty_ranges() {
    let mut generator = generator_with(TileStrategy::Direct, vec![square_record(Vec3::ZERO, 20.0, 1)]);

    generator.mark_dirty(1..);
    assert!(generator.dirty_tiles().is_empty());

    generator.mark_dirty(..);
    assert_eq!(generator.dirty_tiles().len(), 9);
    assert_eq!(generator.recalculate_tiles().unwrap(), 9);
    assert!(generator.dirty_tiles().is_empty());
}

#[test]
fn test_remove_collision_shape() {
    let mut generator = generator_with(
        TileStrategy::Direct,
        vec![square_record(Vec3::ZERO, 40.0, 1), square_record(Vec3::new(0.0, 0.5, 8.0), 1.0, 7)],
    );
    let before = tile_blobs(generator.nav_mesh().unwrap());

    assert_eq!(generator.remove_collision_shape(7), 1);
    assert_eq!(generator.remove_collision_shape(7), 0);
    assert_eq!(generator.batch().len(), 1);
    assert_eq!(generator.dirty_tiles(), vec![(2, 3)]);

    generator.recalculate_tiles().unwrap();
    let after = tile_blobs(generator.nav_mesh().unwrap());
    assert_eq!(after.len(), before.len());
}

#[test]
fn test_removed_shape_refreshes_border_neighbours() {
    for strategy in [TileStrategy::Direct, TileStrategy::Cached] {
        // Tiles span 0..8, 8..16 and 16..24; the wall sits in tile 1 but
        // within the border that tile 0 gathers
        let wall = InputRecord::new(
            Arc::new(block(Vec3::new(8.2, 0.0, 0.0), Vec3::new(9.0, 2.0, 24.0))),
            Affine3A::IDENTITY,
            2,
        );
        let mut generator = generator_with(strategy, vec![square_record(Vec3::new(12.0, 0.0, 12.0), 24.0, 1), wall]);
        assert_eq!(generator.tile_counts(), Some((3, 3)));

        assert_eq!(generator.remove_collision_shape(2), 1);
        let dirty = generator.dirty_tiles();
        assert!(dirty.contains(&(0, 1)));
        assert!(dirty.contains(&(1, 1)));
        assert!(!dirty.contains(&(2, 1)));
        generator.recalculate_tiles().unwrap();
        let mut incremental = tile_blobs(generator.nav_mesh().unwrap());

        generator.build_tiles(0, 0, 2, 2).unwrap();
        let mut rebuilt = tile_blobs(generator.nav_mesh().unwrap());

        incremental.sort();
        rebuilt.sort();
        assert_eq!(incremental, rebuilt);
    }
}

#[test]
fn test_cached_tiles_stack_layers() {
    let mut generator = generator_with(
        TileStrategy::Cached,
        vec![
            square_record(Vec3::ZERO, 8.0, 1),
            square_record(Vec3::new(0.0, 4.0, 0.0), 8.0, 2),
        ],
    );
    assert_eq!(generator.tile_counts(), Some((1, 1)));

    let nav_mesh = generator.nav_mesh().unwrap();
    assert!(nav_mesh.params().max_tiles >= 2);
    let mut layers: Vec<i32> = nav_mesh.tiles_at(0, 0).iter().map(|t| t.header.layer).collect();
    layers.sort();
    assert_eq!(layers, vec![0, 1]);

    // Rebuilding the cell replaces both layers rather than adding more
    assert!(generator.build_tile(0, 0));
    assert_eq!(generator.nav_mesh().unwrap().tiles_at(0, 0).len(), 2);
}

#[test]
fn test_direct_strategy_rejects_obstacles() {
    let mut generator = generator_with(TileStrategy::Direct, vec![square_record(Vec3::ZERO, 20.0, 1)]);
    assert!(matches!(
        generator.add_box_obstacle(Vec3::ZERO, Vec3::ONE, 0.0),
        Err(Error::TileCache(_))
    ));
    assert!(generator.add_cylinder_obstacle(Vec3::ZERO, 1.0, 2.0).is_err());
    assert!(generator.update(0.1).is_err());
}

#[test]
fn test_obstacle_round_trip() {
    let mut generator = generator_with(TileStrategy::Cached, vec![square_record(Vec3::ZERO, 20.0, 1)]);
    let shape = |g: &NavMeshGenerator| -> Vec<(usize, Vec<f32>)> {
        g.nav_mesh()
            .unwrap()
            .tiles()
            .map(|(_, t)| (t.polys.len(), t.verts.clone()))
            .collect()
    };
    let before = shape(&generator);

    let obstacle = generator
        .add_box_obstacle(Vec3::new(0.0, 0.5, 0.0), Vec3::ONE, 0.0)
        .unwrap();
    let mut drained = false;
    for _ in 0..32 {
        if generator.update(0.1).unwrap() {
            drained = true;
            break;
        }
    }
    assert!(drained);
    assert_ne!(shape(&generator), before);

    generator.remove_obstacle(obstacle).unwrap();
    while !generator.update(0.1).unwrap() {}
    assert_eq!(shape(&generator), before);
}

#[test]
fn test_find_path_across_quad() {
    for strategy in [TileStrategy::Direct, TileStrategy::Cached] {
        let generator = generator_with(strategy, vec![square_record(Vec3::ZERO, 20.0, 1)]);
        let start = Vec3::new(-9.0, 0.0, -9.0);
        let end = Vec3::new(9.0, 0.0, 9.0);
        let extents = Vec3::ONE;

        let path = generator
            .find_path(start, end, extents, &QueryFilter::default())
            .unwrap();
        assert!(!path.is_empty());
        let first = path.points[0];
        let last = path.points[path.points.len() - 1];
        assert!(((first - start).abs() - extents).max_element() <= 0.0);
        assert!(((last - end).abs() - extents).max_element() <= 0.0);
        assert_eq!(path.points.len(), path.flags.len());
    }
}

#[test]
fn test_cross_island_query_is_empty() {
    let generator = generator_with(TileStrategy::Direct, vec![square_record(Vec3::new(-10.0, 0.0, 0.0), 6.0, 1)]);
    let other = generator_with(TileStrategy::Direct, vec![square_record(Vec3::new(10.0, 0.0, 0.0), 6.0, 2)]);
    let start = Vec3::new(-10.0, 0.0, 0.0);
    let end = Vec3::new(10.0, 0.0, 0.0);
    assert!(other.query().unwrap().find_nearest_poly(end, Vec3::ONE, &QueryFilter::default()).is_some());

    let path = generator
        .find_path(start, end, Vec3::ONE, &QueryFilter::default())
        .unwrap();
    assert!(path.is_empty());
}

#[test]
fn test_unreachable_end_stops_on_start_island() {
    let generator = generator_with(
        TileStrategy::Direct,
        vec![
            square_record(Vec3::new(-10.0, 0.0, 0.0), 6.0, 1),
            square_record(Vec3::new(10.0, 0.0, 0.0), 6.0, 2),
        ],
    );
    let path = generator
        .find_path(
            Vec3::new(-10.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::ONE,
            &QueryFilter::default(),
        )
        .unwrap();
    assert!(!path.is_empty());
    let last = path.points[path.points.len() - 1];
    assert!(last.x < -6.0);
}

#[test]
fn test_transformed_navmesh() {
    let transform = Affine3A::from_translation(Vec3::new(100.0, 5.0, 0.0));
    let mut generator = NavMeshGenerator::new(test_params(), TileStrategy::Direct)
        .unwrap()
        .with_transform(transform);
    generator.add_geometry([square_record(Vec3::new(100.0, 5.0, 0.0), 20.0, 1)]);
    generator.build().unwrap();

    // Navmesh space is centred on the origin
    let origin = generator.nav_mesh().unwrap().params().origin;
    assert!(origin[0] > -11.0 && origin[0] < -9.0);

    let start = Vec3::new(92.0, 5.0, -8.0);
    let end = Vec3::new(108.0, 5.0, 8.0);
    let path = generator
        .find_path(start, end, Vec3::ONE, &QueryFilter::default())
        .unwrap();
    assert!(!path.is_empty());
    assert!(path.points[0].distance(start) < 1.5);
    assert!(path.points[path.points.len() - 1].distance(end) < 1.5);
}

#[test]
fn test_bytes_round_trip() {
    for strategy in [TileStrategy::Direct, TileStrategy::Cached] {
        let generator = generator_with(strategy, vec![square_record(Vec3::ZERO, 20.0, 1)]);
        let bytes = generator.to_bytes().unwrap();

        let loaded = NavMeshGenerator::from_bytes(test_params(), &bytes).unwrap();
        assert_eq!(loaded.strategy(), strategy);
        assert_eq!(loaded.tile_counts(), generator.tile_counts());
        assert_eq!(loaded.nav_mesh().unwrap().params(), generator.nav_mesh().unwrap().params());
        assert_eq!(
            tile_blobs(loaded.nav_mesh().unwrap()),
            tile_blobs(generator.nav_mesh().unwrap())
        );
        assert!(loaded.batch().is_empty());
    }
}

#[test]
fn test_file_round_trip() {
    let generator = generator_with(TileStrategy::Cached, vec![square_record(Vec3::ZERO, 20.0, 1)]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("level.tset");

    generator.save_to_file(&path).unwrap();
    let loaded = NavMeshGenerator::load_from_file(test_params(), &path).unwrap();
    assert_eq!(
        tile_blobs(loaded.nav_mesh().unwrap()),
        tile_blobs(generator.nav_mesh().unwrap())
    );
    assert!(NavMeshGenerator::load_from_file(test_params(), dir.path().join("missing")).is_err());
}

#[test]
fn test_loaded_cache_accepts_obstacles() {
    let generator = generator_with(TileStrategy::Cached, vec![square_record(Vec3::ZERO, 20.0, 1)]);
    let mut loaded = NavMeshGenerator::from_bytes(test_params(), &generator.to_bytes().unwrap()).unwrap();

    let obstacle = loaded.add_cylinder_obstacle(Vec3::ZERO, 1.0, 2.0).unwrap();
    while !loaded.update(0.0).unwrap() {}
    loaded.remove_obstacle(obstacle).unwrap();
    while !loaded.update(0.0).unwrap() {}
    assert_eq!(
        tile_blobs(loaded.nav_mesh().unwrap()),
        tile_blobs(generator.nav_mesh().unwrap())
    );
}
