//! High-level path queries: `find_path` (nearest-poly snap + A* + funnel in one call) and
//! `find_smooth_path` (the same, but walking the node path step by step and re-pulling the
//! string as each off-mesh connection is crossed, so the output tracks detail-mesh height).

use glam::Vec3;

use crate::error::Status;
use crate::filter::QueryFilter;
use crate::navmesh::NavMesh;
use crate::noderef::{NodeKind, NodeRef};
use crate::query::closest_point::closest_point_on_poly;
use crate::query::straight_path::{find_straight_path, StraightPathOptions};
use crate::query::surface::move_along_surface;
use crate::query::{astar, nearest, Waypoint, WaypointKind};

#[derive(Clone, Debug, Default)]
pub struct FindPathResult {
    pub status: Status,
    pub start_ref: Option<NodeRef>,
    pub end_ref: Option<NodeRef>,
    /// The nearest-poly-snapped start position, once `start_ref` resolved.
    pub start_point: Option<Vec3>,
    /// The straight-path target: `end`'s snapped position, or (for a partial path) the point on
    /// the last reached polygon closest to it.
    pub end_point: Option<Vec3>,
    pub node_path: Vec<NodeRef>,
    pub waypoints: Vec<Waypoint>,
}

/// Snaps `start`/`end` onto the mesh within `half_extents`, searches the node path between them,
/// then string-pulls it into a waypoint corridor. Combines what Detour exposes as three separate
/// calls (`findNearestPoly` twice, `findPath`, `findStraightPath`) into the one shape most callers
/// actually want.
pub fn find_path(
    nm: &NavMesh,
    scratch: &mut astar::Scratch,
    start: Vec3,
    end: Vec3,
    half_extents: Vec3,
    filter: &QueryFilter,
    max_points: usize,
) -> FindPathResult {
    let start_nearest = nearest::find_nearest_poly(nm, start, half_extents, filter);
    let end_nearest = nearest::find_nearest_poly(nm, end, half_extents, filter);
    // Nearest-poly finding nothing within `half_extents` is the NotFound condition, distinct
    // from InvalidInput (malformed arguments); propagate the status `find_nearest_poly` itself
    // already reports rather than overwriting it.
    let (start_ref, start_pos) = match (start_nearest.node_ref, start_nearest.position) {
        (Some(r), Some(p)) => (r, p),
        _ => return FindPathResult { status: start_nearest.status, ..Default::default() },
    };
    let (end_ref, end_pos) = match (end_nearest.node_ref, end_nearest.position) {
        (Some(r), Some(p)) => (r, p),
        _ => return FindPathResult { status: end_nearest.status, start_ref: Some(start_ref), ..Default::default() },
    };

    let node_result = astar::find_node_path(nm, scratch, start_ref, end_ref, start_pos, end_pos, filter);
    if node_result.path.is_empty() {
        return FindPathResult {
            status: node_result.status,
            start_ref: Some(start_ref),
            end_ref: Some(end_ref),
            start_point: Some(start_pos),
            end_point: Some(end_pos),
            node_path: Vec::new(),
            waypoints: Vec::new(),
        };
    }

    // A partial node path (target unreachable) still yields a usable straight path, but it must
    // be pulled toward the last polygon actually reached rather than the unreachable `end_pos` -
    // otherwise the final waypoint lands off the mesh instead of against the wall that stopped it.
    let straight_target = if node_result.status.contains(Status::PARTIAL_PATH) {
        let last = *node_result.path.last().expect("non-empty node path");
        closest_point_on_poly(nm, last, end_pos).unwrap_or(end_pos)
    } else {
        end_pos
    };
    let straight = find_straight_path(nm, &node_result.path, start_pos, straight_target, StraightPathOptions::empty(), max_points);

    // `straight.status` carries its own bits (e.g. `MAX_POINTS_REACHED`) that must survive
    // alongside `PARTIAL_PATH` from the node search - neither source may clobber the other.
    let status = node_result.status.intersection(Status::PARTIAL_PATH) | straight.status;

    FindPathResult {
        status,
        start_ref: Some(start_ref),
        end_ref: Some(end_ref),
        start_point: Some(start_pos),
        end_point: Some(straight_target),
        node_path: node_result.path,
        waypoints: straight.waypoints,
    }
}

/// Walks the straight-path corridor in fixed-length steps, at each step projecting the stride
/// onto the surface via [`move_along_surface`] (the same technique the Detour navmesh tester uses
/// to turn a polygon corridor into a fully surface-projected polyline) so the result tracks
/// detail-mesh height rather than the straight corridor's flat chords.
pub fn find_smooth_path(
    nm: &NavMesh,
    scratch: &mut astar::Scratch,
    start: Vec3,
    end: Vec3,
    half_extents: Vec3,
    filter: &QueryFilter,
    max_points: usize,
    step_size: f32,
) -> FindPathResult {
    let base = find_path(nm, scratch, start, end, half_extents, filter, max_points);
    if !base.status.succeeded() || base.waypoints.is_empty() {
        return base;
    }

    let mut smoothed = Vec::with_capacity(base.waypoints.len() * 4);
    let mut cursor_pos = base.waypoints[0].pos;
    let mut cursor_ref = base.waypoints[0].node_ref;
    smoothed.push(Waypoint { pos: cursor_pos, kind: WaypointKind::Start, node_ref: cursor_ref });

    let mut target_idx = 1usize;
    let mut iterations = 0usize;
    const MAX_ITERATIONS: usize = 4096;

    while target_idx < base.waypoints.len() && iterations < MAX_ITERATIONS {
        iterations += 1;
        let target = base.waypoints[target_idx];

        if target.node_ref.kind() == NodeKind::OffMesh || target.kind == WaypointKind::OffMeshConnection {
            smoothed.push(Waypoint { pos: target.pos, kind: WaypointKind::OffMeshConnection, node_ref: target.node_ref });
            cursor_pos = target.pos;
            cursor_ref = target.node_ref;
            target_idx += 1;
            if smoothed.len() >= max_points {
                return FindPathResult { status: Status::MAX_POINTS_REACHED, waypoints: smoothed, ..base };
            }
            continue;
        }

        let to_target = target.pos - cursor_pos;
        let dist = to_target.length();
        if dist <= step_size {
            let moved = move_along_surface(nm, cursor_ref, cursor_pos, target.pos, filter);
            cursor_pos = moved.result_pos;
            cursor_ref = moved.result_ref.unwrap_or(cursor_ref);
            target_idx += 1;
        } else {
            let stride_target = cursor_pos + to_target * (step_size / dist);
            let moved = move_along_surface(nm, cursor_ref, cursor_pos, stride_target, filter);
            cursor_pos = moved.result_pos;
            cursor_ref = moved.result_ref.unwrap_or(cursor_ref);
        }

        if smoothed.last().map(|w| w.pos.distance(cursor_pos) > 1e-4).unwrap_or(true) {
            smoothed.push(Waypoint { pos: cursor_pos, kind: WaypointKind::Corner, node_ref: cursor_ref });
            if smoothed.len() >= max_points {
                return FindPathResult { status: Status::MAX_POINTS_REACHED, waypoints: smoothed, ..base };
            }
        }
    }

    if smoothed.last().map(|w| w.pos.distance(end) > 1e-4).unwrap_or(true) {
        smoothed.push(Waypoint { pos: end, kind: WaypointKind::End, node_ref: cursor_ref });
    } else if let Some(last) = smoothed.last_mut() {
        last.kind = WaypointKind::End;
    }

    FindPathResult { status: base.status, waypoints: smoothed, ..base }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::PortalSide;
    use crate::math::Aabb;
    use crate::navmesh::NavMeshParams;
    use crate::tile::{BvTree, DetailMesh, Poly, Tile, EXT_LINK};

    fn boundary_neis() -> smallvec::SmallVec<[u16; 6]> {
        smallvec::smallvec![
            EXT_LINK | PortalSide::MinusZ.as_u8() as u16,
            EXT_LINK | PortalSide::PlusX.as_u8() as u16,
            EXT_LINK | PortalSide::PlusZ.as_u8() as u16,
            EXT_LINK | PortalSide::MinusX.as_u8() as u16,
        ]
    }

    fn strip_navmesh(n: i32) -> NavMesh {
        let mut nm = NavMesh::new(NavMeshParams { origin: Vec3::ZERO, tile_width: 2.0, tile_height: 2.0 });
        for i in 0..n {
            let origin = Vec3::new(i as f32 * 2.0, 0.0, 0.0);
            let verts = vec![
                origin,
                origin + Vec3::new(2.0, 0.0, 0.0),
                origin + Vec3::new(2.0, 0.0, 2.0),
                origin + Vec3::new(0.0, 0.0, 2.0),
            ];
            let poly = Poly { verts: smallvec::smallvec![0, 1, 2, 3], neis: boundary_neis(), area: 0, flags: 1 };
            let tile = Tile {
                id: 0, sequence: 0, tile_x: i, tile_y: 0, tile_layer: 0,
                bounds: Aabb::from_points(&verts),
                vertices: verts, polys: vec![poly],
                detail_meshes: vec![DetailMesh::default()],
                detail_vertices: vec![], detail_triangles: vec![],
                bv_tree: BvTree::default(),
                cell_size: 0.5, cell_height: 0.5, walkable_height: 2.0, walkable_radius: 0.5, walkable_climb: 0.5,
            };
            nm.add_tile(tile).unwrap();
        }
        nm
    }

    #[test]
    fn finds_full_path_across_tiles() {
        let nm = strip_navmesh(3);
        let mut scratch = astar::Scratch::default();
        let res = find_path(
            &nm,
            &mut scratch,
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(5.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            &QueryFilter::default(),
            64,
        );
        assert_eq!(res.status, Status::SUCCESS);
        assert_eq!(res.waypoints.first().map(|w| w.kind), Some(WaypointKind::Start));
        assert_eq!(res.waypoints.last().map(|w| w.kind), Some(WaypointKind::End));
    }

    #[test]
    fn not_found_when_nothing_near_start() {
        let nm = strip_navmesh(1);
        let mut scratch = astar::Scratch::default();
        let res = find_path(
            &nm,
            &mut scratch,
            Vec3::new(100.0, 0.0, 100.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(0.1, 0.1, 0.1),
            &QueryFilter::default(),
            64,
        );
        assert_eq!(res.status, Status::FAILURE);
    }

    #[test]
    fn smooth_path_reaches_end() {
        let nm = strip_navmesh(3);
        let mut scratch = astar::Scratch::default();
        let res = find_smooth_path(
            &nm,
            &mut scratch,
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(5.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            &QueryFilter::default(),
            256,
            0.5,
        );
        assert!(res.status.succeeded());
        assert!(res.waypoints.last().unwrap().pos.distance(Vec3::new(5.0, 0.0, 1.0)) < 1e-2);
    }
}
