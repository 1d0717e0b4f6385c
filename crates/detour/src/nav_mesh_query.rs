//! Navigation mesh query implementation for Detour
//!
//! [`NavMeshQuery`] owns the scratch state of the corridor search so one
//! query object can serve many [`find_path`](NavMeshQuery::find_path) calls.

use super::detour_common::{dt_calc_poly_center, dt_tri_area_2d, dt_vdist, dt_vequal};
use super::nav_mesh::NavMesh;
use super::node_pool::{NodePool, NodeQueue, NodeState};
use super::{PolyRef, QueryFilter, Status, StraightPathFlags};
use recast_common::{dist_point_segment_sqr_2d, point_in_polygon_2d, Error, Result};

/// Maximum length of a polygon corridor and of a straight path
pub const DT_MAX_PATH_POLYS: usize = 2048;

/// Default number of search nodes
const DT_MAX_NODES: usize = 4096;

/// Heuristic scale, slightly below one to keep the search admissible
const H_SCALE: f32 = 0.999;

/// One vertex of a straight path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StraightPathPoint {
    /// Position of the vertex
    pub pos: [f32; 3],
    /// Vertex flags
    pub flags: StraightPathFlags,
    /// Polygon entered at this vertex, null for the end vertex
    pub poly: PolyRef,
}

/// Navigation mesh query structure
#[derive(Debug)]
pub struct NavMeshQuery<'a> {
    /// Reference to the navigation mesh
    nav_mesh: &'a NavMesh,
    /// Node pool for A* search
    node_pool: NodePool,
    /// Open list for A* search
    open_list: NodeQueue,
}

impl<'a> NavMeshQuery<'a> {
    /// Creates a new navigation mesh query
    pub fn new(nav_mesh: &'a NavMesh) -> Self {
        Self {
            nav_mesh,
            node_pool: NodePool::new(DT_MAX_NODES),
            open_list: NodeQueue::default(),
        }
    }

    /// Creates a query with a custom search node budget
    pub fn with_max_nodes(nav_mesh: &'a NavMesh, max_nodes: usize) -> Result<Self> {
        if max_nodes == 0 || max_nodes > u16::MAX as usize {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        Ok(Self {
            nav_mesh,
            node_pool: NodePool::new(max_nodes),
            open_list: NodeQueue::default(),
        })
    }

    /// Gets a reference to the navigation mesh
    pub fn nav_mesh(&self) -> &NavMesh {
        self.nav_mesh
    }

    /// Finds the polygon nearest to `center` within `half_extents`
    pub fn find_nearest_poly(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &QueryFilter,
    ) -> Option<(PolyRef, [f32; 3])> {
        self.nav_mesh.find_nearest_poly(center, half_extents, filter)
    }

    /// Closest point on a polygon, with whether `pos` lies over it
    pub fn closest_point_on_poly(&self, poly_ref: PolyRef, pos: &[f32; 3]) -> Result<([f32; 3], bool)> {
        self.nav_mesh.closest_point_on_poly(poly_ref, pos)
    }

    /// `pos` itself when it lies inside the polygon on the XZ plane,
    /// otherwise the closest point on its outline
    pub fn closest_point_on_poly_boundary(&self, poly_ref: PolyRef, pos: &[f32; 3]) -> Result<[f32; 3]> {
        let (tile, poly) = self.nav_mesh.get_tile_and_poly_by_ref(poly_ref)?;
        let verts = tile.poly_verts(poly);
        if point_in_polygon_2d(pos, &verts, poly.vert_count as usize) {
            return Ok(*pos);
        }
        Ok(tile.closest_point_on_poly_boundary(poly, pos))
    }

    /// Finds a polygon corridor from `start_ref` to `end_ref`.
    ///
    /// When the end cannot be reached, or the node budget runs out, the
    /// corridor leads to the visited polygon closest to `end_pos` instead;
    /// callers detect this by the last polygon not being `end_ref`. The
    /// corridor holds at most [`DT_MAX_PATH_POLYS`] polygons.
    pub fn find_path(
        &mut self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
    ) -> Result<Vec<PolyRef>> {
        let nav_mesh = self.nav_mesh;
        if !nav_mesh.is_valid_poly_ref(start_ref) || !nav_mesh.is_valid_poly_ref(end_ref) {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        if start_ref == end_ref {
            return Ok(vec![start_ref]);
        }

        self.node_pool.clear();
        self.open_list.clear();

        let start_h = dt_vdist(start_pos, end_pos) * H_SCALE;
        let (start_idx, _) = self
            .node_pool
            .get_or_alloc(start_ref)
            .ok_or(Error::Detour(Status::OutOfMemory.to_string()))?;
        {
            let node = self.node_pool.node_mut(start_idx);
            node.pos = *start_pos;
            node.cost = 0.0;
            node.total = start_h;
        }
        self.open_list.push(start_idx, start_h);

        let mut best_idx = start_idx;
        let mut best_h = start_h;
        let mut out_of_nodes = false;

        while let Some(current_idx) = self.open_list.pop(&self.node_pool) {
            self.node_pool.node_mut(current_idx).state = NodeState::Closed;
            let current = self.node_pool.node(current_idx).clone();

            if current.poly == end_ref {
                best_idx = current_idx;
                break;
            }

            let (tile, poly) = nav_mesh.get_tile_and_poly_by_ref(current.poly)?;
            let parent_ref = current.parent.map(|p| self.node_pool.node(p).poly);

            for link in tile.poly_links(poly) {
                let neighbour_ref = link.reference;
                if neighbour_ref.is_null() || Some(neighbour_ref) == parent_ref {
                    continue;
                }
                let Ok((_, neighbour_poly)) = nav_mesh.get_tile_and_poly_by_ref(neighbour_ref) else {
                    continue;
                };
                if !filter.pass_filter(neighbour_poly.flags) {
                    continue;
                }

                let Some((neighbour_idx, is_new)) = self.node_pool.get_or_alloc(neighbour_ref) else {
                    out_of_nodes = true;
                    continue;
                };

                let pos = if is_new {
                    nav_mesh.get_edge_mid_point(current.poly, neighbour_ref)?
                } else {
                    self.node_pool.node(neighbour_idx).pos
                };

                let mut cost = current.cost + filter.get_cost(&current.pos, &pos, poly.area);
                let heuristic = if neighbour_ref == end_ref {
                    cost += filter.get_cost(&pos, end_pos, neighbour_poly.area);
                    0.0
                } else {
                    dt_vdist(&pos, end_pos) * H_SCALE
                };
                let total = cost + heuristic;

                if !is_new && total >= self.node_pool.node(neighbour_idx).total {
                    continue;
                }

                let node = self.node_pool.node_mut(neighbour_idx);
                node.pos = pos;
                node.parent = Some(current_idx);
                node.cost = cost;
                node.total = total;
                node.state = NodeState::Open;
                self.open_list.push(neighbour_idx, total);

                if heuristic < best_h {
                    best_h = heuristic;
                    best_idx = neighbour_idx;
                }
            }
        }

        let mut path = self.node_pool.path_to(best_idx);
        if path.last() != Some(&end_ref) {
            if out_of_nodes {
                log::debug!(
                    "partial corridor of {} polys, all {} search nodes used",
                    path.len(),
                    self.node_pool.max_nodes()
                );
            } else {
                log::debug!(
                    "partial corridor of {} polys after {} nodes, end not reachable",
                    path.len(),
                    self.node_pool.len()
                );
            }
        }
        path.truncate(DT_MAX_PATH_POLYS);
        Ok(path)
    }

    /// Portal between two corridor polygons, ordered so that `right` lies to
    /// the right of the travel direction.
    fn portal(&self, from: PolyRef, to: PolyRef) -> Result<([f32; 3], [f32; 3])> {
        let (left, right) = self.nav_mesh.get_portal_points(from, to)?;
        let (tile, poly) = self.nav_mesh.get_tile_and_poly_by_ref(from)?;
        let center = dt_calc_poly_center(poly.vert_indices(), &tile.verts);
        if dt_tri_area_2d(&center, &left, &right) < 0.0 {
            Ok((right, left))
        } else {
            Ok((left, right))
        }
    }

    /// String-pulls a corridor into a straight path of at most `max_points`
    /// vertices (capped at [`DT_MAX_PATH_POLYS`]).
    pub fn find_straight_path(
        &self,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        path: &[PolyRef],
        max_points: usize,
    ) -> Result<Vec<StraightPathPoint>> {
        let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        };
        let max_points = max_points.clamp(1, DT_MAX_PATH_POLYS);

        let closest_start = self.closest_point_on_poly_boundary(first, start_pos)?;
        let closest_end = self.closest_point_on_poly_boundary(last, end_pos)?;

        let mut out = StraightPath {
            points: Vec::new(),
            max_points,
        };
        if !out.append(closest_start, StraightPathFlags::START, first) {
            return Ok(out.points);
        }

        if path.len() > 1 {
            let mut portal_apex = closest_start;
            let mut portal_left = portal_apex;
            let mut portal_right = portal_apex;
            let mut left_index = 0;
            let mut right_index = 0;
            let mut left_poly = first;
            let mut right_poly = first;

            let mut i = 0;
            while i < path.len() {
                let (left, right) = if i + 1 < path.len() {
                    let (left, right) = self.portal(path[i], path[i + 1])?;
                    // Starting on the first portal
                    if i == 0 && dist_point_segment_sqr_2d(&portal_apex, &left, &right).0 < 0.001 * 0.001 {
                        i += 1;
                        continue;
                    }
                    (left, right)
                } else {
                    (closest_end, closest_end)
                };
                let next_poly = path.get(i + 1).copied().unwrap_or_default();

                // Right vertex
                if dt_tri_area_2d(&portal_apex, &portal_right, &right) <= 0.0 {
                    if dt_vequal(&portal_apex, &portal_right) || dt_tri_area_2d(&portal_apex, &portal_left, &right) > 0.0 {
                        portal_right = right;
                        right_poly = next_poly;
                        right_index = i;
                    } else {
                        portal_apex = portal_left;
                        let apex_index = left_index;
                        let flags = if left_poly.is_null() {
                            StraightPathFlags::END
                        } else {
                            StraightPathFlags::empty()
                        };
                        if !out.append(portal_apex, flags, left_poly) {
                            return Ok(out.points);
                        }

                        portal_left = portal_apex;
                        portal_right = portal_apex;
                        left_index = apex_index;
                        right_index = apex_index;
                        i = apex_index + 1;
                        continue;
                    }
                }

                // Left vertex
                if dt_tri_area_2d(&portal_apex, &portal_left, &left) >= 0.0 {
                    if dt_vequal(&portal_apex, &portal_left) || dt_tri_area_2d(&portal_apex, &portal_right, &left) < 0.0 {
                        portal_left = left;
                        left_poly = next_poly;
                        left_index = i;
                    } else {
                        portal_apex = portal_right;
                        let apex_index = right_index;
                        let flags = if right_poly.is_null() {
                            StraightPathFlags::END
                        } else {
                            StraightPathFlags::empty()
                        };
                        if !out.append(portal_apex, flags, right_poly) {
                            return Ok(out.points);
                        }

                        portal_left = portal_apex;
                        portal_right = portal_apex;
                        left_index = apex_index;
                        right_index = apex_index;
                        i = apex_index + 1;
                        continue;
                    }
                }

                i += 1;
            }
        }

        out.append(closest_end, StraightPathFlags::END, PolyRef::default());
        Ok(out.points)
    }
}

/// Bounded straight path output
struct StraightPath {
    points: Vec<StraightPathPoint>,
    max_points: usize,
}

impl StraightPath {
    /// Appends a vertex, merging it into the previous one when both are at
    /// the same spot. Returns false once the path is full.
    fn append(&mut self, pos: [f32; 3], flags: StraightPathFlags, poly: PolyRef) -> bool {
        if let Some(prev) = self.points.last_mut() {
            if dt_vequal(&prev.pos, &pos) {
                prev.flags = flags;
                prev.poly = poly;
                return true;
            }
        }
        if self.points.len() >= self.max_points {
            return false;
        }
        self.points.push(StraightPathPoint { pos, flags, poly });
        self.points.len() < self.max_points && !flags.contains(StraightPathFlags::END)
    }
}
