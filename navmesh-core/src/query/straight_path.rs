//! Straight-path extraction (Simple Stupid Funnel algorithm) over a node-path's portal sequence.

use bitflags::bitflags;
use glam::Vec3;

use crate::error::Status;
use crate::navmesh::NavMesh;
use crate::noderef::{NodeKind, NodeRef};
use crate::query::{Waypoint, WaypointKind};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct StraightPathOptions: u32 {
        const AREA_CROSSINGS = 1 << 0;
        const ALL_CROSSINGS  = 1 << 1;
    }
}

#[inline]
fn area2(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    (b.x - a.x) * (c.z - a.z) - (b.z - a.z) * (c.x - a.x)
}

#[inline]
fn ordered_lr(apex: Vec3, l: Vec3, r: Vec3) -> (Vec3, Vec3) {
    if (r.x - apex.x) * (l.z - apex.z) - (r.z - apex.z) * (l.x - apex.x) > 0.0 {
        (l, r)
    } else {
        (r, l)
    }
}

#[derive(Clone, Debug, Default)]
pub struct StraightPathResult {
    pub status: Status,
    pub waypoints: Vec<Waypoint>,
}

/// Converts a node-path (as returned by [`crate::query::astar::find_node_path`]) into a
/// string-pulled corridor of waypoints, with their owning node ref attached.
pub fn find_straight_path(
    nm: &NavMesh,
    node_path: &[NodeRef],
    start: Vec3,
    end: Vec3,
    options: StraightPathOptions,
    max_points: usize,
) -> StraightPathResult {
    if node_path.is_empty() {
        return StraightPathResult { status: Status::INVALID_INPUT, waypoints: Vec::new() };
    }

    let (portals, clamp_at) = build_portals(nm, node_path);
    // A portal that couldn't be computed clamps the target to wherever the path is still
    // reliable: the position of the last node the funnel can trust, rather than the caller's
    // original end point (which may lie beyond a break in the link chain).
    let (target, target_ref, base_status) = match clamp_at {
        Some(idx) => {
            let node_ref = node_path[idx];
            let pos = nm.node_position(node_ref).unwrap_or(start);
            (pos, node_ref, Status::PARTIAL_PATH)
        }
        None => (end, *node_path.last().unwrap(), Status::SUCCESS),
    };

    let mut out = Vec::with_capacity(portals.len() + 2);
    let push = |out: &mut Vec<Waypoint>, pos: Vec3, kind: WaypointKind, node_ref: NodeRef| -> bool {
        out.push(Waypoint { pos, kind, node_ref });
        out.len() < max_points
    };

    if !push(&mut out, start, WaypointKind::Start, node_path[0]) {
        return StraightPathResult { status: Status::MAX_POINTS_REACHED, waypoints: out };
    }

    if portals.is_empty() {
        push(&mut out, target, WaypointKind::End, target_ref);
        return StraightPathResult { status: base_status, waypoints: out };
    }

    let mut apex = start;
    let (mut left, mut right) = ordered_lr(apex, portals[0].left, portals[0].right);
    let mut left_idx = 0usize;
    let mut right_idx = 0usize;
    const EPS: f32 = 1e-5;

    let mut i = 1usize;
    while i <= portals.len() {
        let (pl, pr, node_ref) = if i < portals.len() {
            (portals[i].left, portals[i].right, portals[i].to)
        } else {
            (target, target, target_ref)
        };
        let (pl, pr) = ordered_lr(apex, pl, pr);

        if area2(apex, right, pr) <= EPS {
            if area2(apex, left, pr) < -EPS {
                if !push(&mut out, left, corner_kind(nm, left_idx, &portals), portals.get(left_idx).map(|p| p.to).unwrap_or(node_ref)) {
                    return StraightPathResult { status: Status::MAX_POINTS_REACHED, waypoints: out };
                }
                apex = left;
                i = left_idx + 1;
                right_idx = left_idx;
                left = apex;
                right = apex;
                continue;
            }
            right = pr;
            right_idx = i;
        }

        if area2(apex, left, pl) >= -EPS {
            if area2(apex, right, pl) > EPS {
                if !push(&mut out, right, corner_kind(nm, right_idx, &portals), portals.get(right_idx).map(|p| p.to).unwrap_or(node_ref)) {
                    return StraightPathResult { status: Status::MAX_POINTS_REACHED, waypoints: out };
                }
                apex = right;
                i = right_idx + 1;
                left_idx = right_idx;
                left = apex;
                right = apex;
                continue;
            }
            left = pl;
            left_idx = i;
        }

        // Emit portal crossings the caller asked for.
        if i < portals.len() && should_emit_crossing(options, &portals, i) {
            push(&mut out, (pl + pr) * 0.5, WaypointKind::Corner, portals[i].to);
        }

        i += 1;
    }

    let last_is_target = out.last().map(|w| (w.pos - target).length() < EPS).unwrap_or(false);
    if !last_is_target {
        push(&mut out, target, WaypointKind::End, target_ref);
    } else if let Some(last) = out.last_mut() {
        last.kind = WaypointKind::End;
    }

    StraightPathResult { status: base_status, waypoints: out }
}

struct Portal {
    left: Vec3,
    right: Vec3,
    /// Node on the far side of this portal (used to tag emitted corners).
    to: NodeRef,
    is_off_mesh: bool,
    crosses_area: bool,
}

/// Builds the portal sequence for `node_path`. If a link or its portal points cannot be
/// resolved at window `i` (a stale ref, a removed tile), building stops there and the second
/// return value carries that window's starting node-path index so the caller can clamp its
/// target instead of failing outright.
fn build_portals(nm: &NavMesh, node_path: &[NodeRef]) -> (Vec<Portal>, Option<usize>) {
    let mut portals = Vec::with_capacity(node_path.len().saturating_sub(1));
    for (i, w) in node_path.windows(2).enumerate() {
        let (from, to) = (w[0], w[1]);
        let link = match find_link(nm, from, to) {
            Some(l) => l,
            None => {
                // An any-angle search can record a neighbour's parent as its grandparent when a
                // raycast already proved line of sight, leaving no direct link between consecutive
                // node-path entries. The funnel still needs a point to pass through at that hop;
                // treat it as a zero-width portal at `to`'s position rather than failing the whole
                // path the way a genuinely broken link chain would.
                match nm.node_position(to) {
                    Some(pos) => {
                        portals.push(Portal { left: pos, right: pos, to, is_off_mesh: false, crosses_area: false });
                        continue;
                    }
                    None => return (portals, Some(i)),
                }
            }
        };
        let (l, r) = match nm.get_portal_points(link) {
            Some(v) => v,
            None => return (portals, Some(i)),
        };
        let is_off_mesh = from.kind() == NodeKind::OffMesh || to.kind() == NodeKind::OffMesh;
        let crosses_area = match (nm.poly_of(from), nm.poly_of(to)) {
            (Some((ft, fi)), Some((tt, ti))) => ft.polys[fi].area != tt.polys[ti].area,
            _ => false,
        };
        portals.push(Portal { left: l, right: r, to, is_off_mesh, crosses_area });
    }
    (portals, None)
}

fn find_link<'a>(nm: &'a NavMesh, from: NodeRef, to: NodeRef) -> Option<&'a crate::link::Link> {
    nm.node_links(from).iter().filter_map(|&li| nm.link(li)).find(|l| l.to == to)
}

fn corner_kind(_nm: &NavMesh, portal_idx: usize, portals: &[Portal]) -> WaypointKind {
    if portals.get(portal_idx).map(|p| p.is_off_mesh).unwrap_or(false) {
        WaypointKind::OffMeshConnection
    } else {
        WaypointKind::Corner
    }
}

fn should_emit_crossing(options: StraightPathOptions, portals: &[Portal], i: usize) -> bool {
    if options.contains(StraightPathOptions::ALL_CROSSINGS) {
        return true;
    }
    if options.contains(StraightPathOptions::AREA_CROSSINGS) {
        return portals[i].crosses_area;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Aabb;
    use crate::navmesh::NavMeshParams;
    use crate::tile::{BvTree, DetailMesh, Poly, Tile};

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
            let poly = Poly { verts: smallvec::smallvec![0, 1, 2, 3], neis: smallvec::smallvec![0, 0, 0, 0], area: 0, flags: 1 };
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
    fn straight_corridor_has_no_corners() {
        let nm = strip_navmesh(3);
        let path = vec![nm.poly_node_ref(1, 0).unwrap(), nm.poly_node_ref(2, 0).unwrap(), nm.poly_node_ref(3, 0).unwrap()];
        let res = find_straight_path(&nm, &path, Vec3::new(1.0, 0.0, 1.0), Vec3::new(5.0, 0.0, 1.0), StraightPathOptions::empty(), 64);
        assert_eq!(res.status, Status::SUCCESS);
        assert_eq!(res.waypoints.len(), 2);
    }

    #[test]
    fn any_angle_gap_between_nonadjacent_nodes_still_succeeds() {
        // Simulates the node path an any-angle search can hand back: the middle tile's ref is
        // skipped because a raycast already proved start and end see each other directly.
        let nm = strip_navmesh(3);
        let path = vec![nm.poly_node_ref(1, 0).unwrap(), nm.poly_node_ref(3, 0).unwrap()];
        let res = find_straight_path(&nm, &path, Vec3::new(1.0, 0.0, 1.0), Vec3::new(5.0, 0.0, 1.0), StraightPathOptions::empty(), 64);
        assert_eq!(res.status, Status::SUCCESS);
        assert_eq!(res.waypoints.last().unwrap().pos, Vec3::new(5.0, 0.0, 1.0));
    }

    #[test]
    fn empty_node_path_is_invalid() {
        let nm = strip_navmesh(1);
        let res = find_straight_path(&nm, &[], Vec3::ZERO, Vec3::ONE, StraightPathOptions::empty(), 64);
        assert_eq!(res.status, Status::INVALID_INPUT);
    }

    #[test]
    fn saturates_at_max_points() {
        let nm = strip_navmesh(3);
        let path = vec![nm.poly_node_ref(1, 0).unwrap(), nm.poly_node_ref(2, 0).unwrap(), nm.poly_node_ref(3, 0).unwrap()];
        let res = find_straight_path(&nm, &path, Vec3::new(1.0, 0.0, 1.0), Vec3::new(5.0, 0.0, 1.0), StraightPathOptions::empty(), 1);
        assert_eq!(res.status, Status::MAX_POINTS_REACHED);
        assert_eq!(res.waypoints.len(), 1);
    }
}
