//! Local neighbourhood discovery and per-polygon wall segment extraction.

use std::collections::{HashSet, VecDeque};

use glam::Vec3;

use crate::error::Status;
use crate::filter::QueryFilter;
use crate::navmesh::NavMesh;
use crate::noderef::NodeRef;

#[derive(Clone, Debug, Default)]
pub struct LocalNeighbourhoodResult {
    pub status: Status,
    pub refs: Vec<NodeRef>,
}

pub fn find_local_neighbourhood(nm: &NavMesh, start_ref: NodeRef, center: Vec3, radius: f32, filter: &QueryFilter) -> LocalNeighbourhoodResult {
    if nm.poly_of(start_ref).is_none() {
        return LocalNeighbourhoodResult { status: Status::INVALID_INPUT, refs: Vec::new() };
    }

    let mut accepted_bounds: Vec<crate::math::Aabb> = Vec::new();
    let mut accepted = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(start_ref);
    seen.insert(start_ref);

    while let Some(cur) = queue.pop_front() {
        let (tile, poly_index) = match nm.poly_of(cur) {
            Some(v) => v,
            None => continue,
        };
        let verts = tile.poly_verts_world(&tile.polys[poly_index]);
        let bounds = crate::math::Aabb::from_points(&verts);

        if accepted_bounds.iter().any(|b| b.overlaps(&bounds)) && cur != start_ref {
            continue;
        }
        accepted.push(cur);
        accepted_bounds.push(bounds);

        for &link_idx in nm.node_links(cur) {
            let link = match nm.link(link_idx) {
                Some(l) => l,
                None => continue,
            };
            if link.to.kind() == crate::noderef::NodeKind::OffMesh {
                continue;
            }
            let passes = match nm.poly_of(link.to) {
                Some((t, i)) => filter.passes(t.polys[i].flags, link.to, nm),
                None => false,
            };
            if !passes || seen.contains(&link.to) {
                continue;
            }
            if let Some((l, r)) = nm.get_portal_points(link) {
                let mid = (l + r) * 0.5;
                if center.distance(mid) <= radius {
                    seen.insert(link.to);
                    queue.push_back(link.to);
                }
            }
        }
    }

    LocalNeighbourhoodResult { status: Status::SUCCESS, refs: accepted }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WallSegmentKind {
    Wall,
    Portal,
}

#[derive(Clone, Copy, Debug)]
pub struct WallSegment {
    pub a: Vec3,
    pub b: Vec3,
    pub kind: WallSegmentKind,
    pub neighbour: Option<NodeRef>,
}

pub fn get_poly_wall_segments(nm: &NavMesh, poly_ref: NodeRef, filter: &QueryFilter, include_portals: bool) -> Vec<WallSegment> {
    let (tile, poly_index) = match nm.poly_of(poly_ref) {
        Some(v) => v,
        None => return Vec::new(),
    };
    let poly = &tile.polys[poly_index];
    let verts = tile.poly_verts_world(poly);
    let n = verts.len();
    let mut out = Vec::new();

    for edge in 0..n {
        let a = verts[edge];
        let b = verts[(edge + 1) % n];

        let mut links_on_edge: Vec<&crate::link::Link> = nm
            .node_links(poly_ref)
            .iter()
            .filter_map(|&li| nm.link(li))
            .filter(|l| l.edge as usize == edge)
            .collect();
        links_on_edge.sort_by_key(|l| l.bmin);

        if links_on_edge.is_empty() {
            out.push(WallSegment { a, b, kind: WallSegmentKind::Wall, neighbour: None });
            continue;
        }

        let mut cursor: u8 = 0;
        for link in &links_on_edge {
            let passes = match nm.poly_of(link.to) {
                Some((t, i)) => filter.passes(t.polys[i].flags, link.to, nm),
                None => true,
            };
            if link.bmin > cursor {
                let t0 = cursor as f32 / 255.0;
                let t1 = link.bmin as f32 / 255.0;
                out.push(WallSegment { a: a + (b - a) * t0, b: a + (b - a) * t1, kind: WallSegmentKind::Wall, neighbour: None });
            }
            if include_portals && passes {
                let t0 = link.bmin as f32 / 255.0;
                let t1 = link.bmax as f32 / 255.0;
                out.push(WallSegment {
                    a: a + (b - a) * t0,
                    b: a + (b - a) * t1,
                    kind: WallSegmentKind::Portal,
                    neighbour: Some(link.to),
                });
            }
            cursor = link.bmax.max(cursor);
        }
        if cursor < 255 {
            let t0 = cursor as f32 / 255.0;
            out.push(WallSegment { a: a + (b - a) * t0, b, kind: WallSegmentKind::Wall, neighbour: None });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Aabb;
    use crate::navmesh::NavMeshParams;
    use crate::tile::{BvTree, DetailMesh, Poly, Tile};

    fn quad_navmesh() -> NavMesh {
        let mut nm = NavMesh::new(NavMeshParams { origin: Vec3::ZERO, tile_width: 2.0, tile_height: 2.0 });
        let verts = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 2.0),
            Vec3::new(0.0, 0.0, 2.0),
        ];
        let poly = Poly { verts: smallvec::smallvec![0, 1, 2, 3], neis: smallvec::smallvec![0, 0, 0, 0], area: 0, flags: 1 };
        let tile = Tile {
            id: 0, sequence: 0, tile_x: 0, tile_y: 0, tile_layer: 0,
            bounds: Aabb::from_points(&verts),
            vertices: verts, polys: vec![poly],
            detail_meshes: vec![DetailMesh::default()],
            detail_vertices: vec![], detail_triangles: vec![],
            bv_tree: BvTree::default(),
            cell_size: 0.5, cell_height: 0.5, walkable_height: 2.0, walkable_radius: 0.5, walkable_climb: 0.5,
        };
        nm.add_tile(tile).unwrap();
        nm
    }

    #[test]
    fn isolated_tile_is_all_walls() {
        let nm = quad_navmesh();
        let r = nm.poly_node_ref(1, 0).unwrap();
        let segs = get_poly_wall_segments(&nm, r, &QueryFilter::default(), true);
        assert_eq!(segs.len(), 4);
        assert!(segs.iter().all(|s| s.kind == WallSegmentKind::Wall));
    }

    #[test]
    fn neighbourhood_contains_start() {
        let nm = quad_navmesh();
        let r = nm.poly_node_ref(1, 0).unwrap();
        let res = find_local_neighbourhood(&nm, r, Vec3::new(1.0, 0.0, 1.0), 3.0, &QueryFilter::default());
        assert_eq!(res.status, Status::SUCCESS);
        assert_eq!(res.refs, vec![r]);
    }
}
