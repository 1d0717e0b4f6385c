//! World-space path queries
//!
//! [`NavigationQuery`] wraps a [`NavMeshQuery`] with the placement of the
//! navmesh. Points go into navmesh space on the way in and back into world
//! space on the way out. The query keeps its search buffers between calls.

use glam::{Affine3A, Vec3};

use detour::{NavMesh, NavMeshQuery, PolyRef, QueryFilter, StraightPathFlags, DT_MAX_PATH_POLYS};
use recast_common::Result;

/// Straight path in world space
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathResult {
    pub points: Vec<Vec3>,
    /// Flags of each point
    pub flags: Vec<StraightPathFlags>,
    /// Polygon entered at each point, null at the end point
    pub polys: Vec<PolyRef>,
}

impl PathResult {
    /// Whether no path was found
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Reusable path query over a placed navmesh
#[derive(Debug)]
pub struct NavigationQuery<'a> {
    query: NavMeshQuery<'a>,
    to_world: Affine3A,
    to_local: Affine3A,
}

impl<'a> NavigationQuery<'a> {
    /// Creates a query over `nav_mesh` placed at `transform` in the world
    pub fn new(nav_mesh: &'a NavMesh, transform: Affine3A) -> Self {
        Self {
            query: NavMeshQuery::new(nav_mesh),
            to_world: transform,
            to_local: transform.inverse(),
        }
    }

    /// Nearest polygon to a world point and the closest point on it, in world
    /// space
    pub fn find_nearest_poly(&self, pos: Vec3, extents: Vec3, filter: &QueryFilter) -> Option<(PolyRef, Vec3)> {
        let local = self.to_local.transform_point3(pos);
        let (poly, nearest) = self
            .query
            .find_nearest_poly(&local.to_array(), &extents.to_array(), filter)?;
        Some((poly, self.to_world.transform_point3(Vec3::from_array(nearest))))
    }

    /// Finds a straight path between two world points.
    ///
    /// An empty result means one of the points has no polygon within
    /// `extents`. When the end cannot be reached the path stops at the point
    /// closest to it on the last reachable polygon.
    pub fn find_path(&mut self, start: Vec3, end: Vec3, extents: Vec3, filter: &QueryFilter) -> Result<PathResult> {
        let start = self.to_local.transform_point3(start).to_array();
        let end = self.to_local.transform_point3(end).to_array();
        let ext = extents.to_array();

        let Some((start_ref, start_pos)) = self.query.find_nearest_poly(&start, &ext, filter) else {
            log::debug!("no polygon near path start {:?}", start);
            return Ok(PathResult::default());
        };
        let Some((end_ref, end_pos)) = self.query.find_nearest_poly(&end, &ext, filter) else {
            log::debug!("no polygon near path end {:?}", end);
            return Ok(PathResult::default());
        };

        let corridor = self.query.find_path(start_ref, end_ref, &start_pos, &end_pos, filter)?;
        let Some(&last) = corridor.last() else {
            return Ok(PathResult::default());
        };
        let end_pos = if last == end_ref {
            end_pos
        } else {
            let (closest, _) = self.query.closest_point_on_poly(last, &end_pos)?;
            closest
        };

        let points = self
            .query
            .find_straight_path(&start_pos, &end_pos, &corridor, DT_MAX_PATH_POLYS)?;

        let mut result = PathResult::default();
        for p in points {
            result.points.push(self.to_world.transform_point3(Vec3::from_array(p.pos)));
            result.flags.push(p.flags);
            result.polys.push(p.poly);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{NavMeshGenerator, TileStrategy};
    use crate::test_geometry::{square_record, test_params};
    use glam::Quat;

    fn quad_generator(transform: Affine3A) -> NavMeshGenerator {
        let mut generator = NavMeshGenerator::new(test_params(), TileStrategy::Direct)
            .unwrap()
            .with_transform(transform);
        generator.add_geometry([square_record(transform.transform_point3(Vec3::ZERO), 20.0, 1)]);
        generator.build().unwrap();
        generator
    }

    #[test]
    fn test_nearest_poly_in_world_space() {
        let generator = quad_generator(Affine3A::from_translation(Vec3::new(0.0, 10.0, 0.0)));
        let query = generator.query().unwrap();

        let (poly, nearest) = query
            .find_nearest_poly(Vec3::new(1.0, 10.5, 1.0), Vec3::ONE, &QueryFilter::default())
            .unwrap();
        assert!(!poly.is_null());
        assert!((nearest.y - 10.0).abs() < 0.5);
        assert!((nearest.x - 1.0).abs() < 1e-3);

        assert!(query
            .find_nearest_poly(Vec3::new(1.0, 0.0, 1.0), Vec3::ONE, &QueryFilter::default())
            .is_none());
    }

    #[test]
    fn test_path_flags() {
        let generator = quad_generator(Affine3A::IDENTITY);
        let mut query = generator.query().unwrap();
        let path = query
            .find_path(
                Vec3::new(-8.0, 0.0, 0.0),
                Vec3::new(8.0, 0.0, 0.0),
                Vec3::ONE,
                &QueryFilter::default(),
            )
            .unwrap();

        assert!(path.points.len() >= 2);
        assert!(path.flags[0].contains(StraightPathFlags::START));
        assert!(path.flags[path.flags.len() - 1].contains(StraightPathFlags::END));
        assert_eq!(path.polys.len(), path.points.len());

        // The query object is reusable
        let back = query
            .find_path(
                Vec3::new(8.0, 0.0, 0.0),
                Vec3::new(-8.0, 0.0, 0.0),
                Vec3::ONE,
                &QueryFilter::default(),
            )
            .unwrap();
        assert_eq!(back.points.len(), path.points.len());
    }

    #[test]
    fn test_same_polygon_path() {
        let generator = quad_generator(Affine3A::IDENTITY);
        let path = generator
            .find_path(Vec3::new(1.0, 0.0, 1.0), Vec3::new(1.5, 0.0, 1.0), Vec3::ONE, &QueryFilter::default())
            .unwrap();
        assert_eq!(path.points.len(), 2);
    }

    #[test]
    fn test_filter_excludes_everything() {
        let generator = quad_generator(Affine3A::IDENTITY);
        let mut filter = QueryFilter::default();
        filter.include_flags = detour::PolyFlags::empty();
        let path = generator
            .find_path(Vec3::new(-8.0, 0.0, 0.0), Vec3::new(8.0, 0.0, 0.0), Vec3::ONE, &filter)
            .unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn test_rotated_navmesh_path_in_world_space() {
        let transform = Affine3A::from_rotation_translation(
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::new(50.0, 0.0, -20.0),
        );
        let generator = quad_generator(transform);

        let start = transform.transform_point3(Vec3::new(-8.0, 0.0, -8.0));
        let end = transform.transform_point3(Vec3::new(8.0, 0.0, 8.0));
        let path = generator
            .find_path(start, end, Vec3::ONE, &QueryFilter::default())
            .unwrap();
        assert!(!path.is_empty());
        assert!(path.points[0].distance(start) < 1.0);
        assert!(path.points[path.points.len() - 1].distance(end) < 1.0);
    }
}
