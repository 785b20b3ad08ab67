//! Random point sampling: unconstrained (uniform over the whole navmesh) and constrained to a
//! Dijkstra-bounded disk around a starting polygon.

use std::collections::{BinaryHeap, HashMap};

use glam::Vec3;
use rand::Rng;

use crate::error::Status;
use crate::filter::QueryFilter;
use crate::math::{random_point_in_convex_poly, tri_area2d_xz};
use crate::navmesh::NavMesh;
use crate::noderef::NodeRef;

#[derive(Clone, Debug, Default)]
pub struct RandomPointResult {
    pub status: Status,
    pub node_ref: Option<NodeRef>,
    pub position: Option<Vec3>,
}

fn poly_area_xz(verts: &[Vec3]) -> f32 {
    if verts.len() < 3 {
        return 0.0;
    }
    let mut total = 0.0f32;
    for i in 1..verts.len() - 1 {
        total += tri_area2d_xz(verts[0], verts[i], verts[i + 1]).abs();
    }
    total
}

pub fn find_random_point(nm: &NavMesh, filter: &QueryFilter, rng: &mut impl Rng) -> RandomPointResult {
    let tiles: Vec<&crate::tile::Tile> = nm.tiles().collect();
    if tiles.is_empty() {
        return RandomPointResult { status: Status::FAILURE, ..Default::default() };
    }

    // Stage 1: reservoir-sample a tile with constant weight (skipping tiles with nothing the
    // filter allows), so tile count and polygon density don't skew which tile gets picked.
    let mut chosen_tile: Option<&crate::tile::Tile> = None;
    let mut tile_count = 0u32;
    for tile in &tiles {
        let has_passing_poly = tile.polys.iter().enumerate().any(|(i, poly)| {
            nm.poly_node_ref(tile.id, i).map(|r| filter.passes(poly.flags, r, nm)).unwrap_or(false)
        });
        if !has_passing_poly {
            continue;
        }
        tile_count += 1;
        if rng.gen::<f32>() < 1.0 / tile_count as f32 {
            chosen_tile = Some(tile);
        }
    }
    let tile = match chosen_tile {
        Some(t) => t,
        None => return RandomPointResult { status: Status::FAILURE, ..Default::default() },
    };

    // Stage 2: reservoir-sample a polygon within that tile, weighted by triangulated area.
    let mut total_area = 0.0f32;
    let mut chosen_poly: Option<usize> = None;
    for (poly_index, poly) in tile.polys.iter().enumerate() {
        let node_ref = match nm.poly_node_ref(tile.id, poly_index) {
            Some(r) => r,
            None => continue,
        };
        if !filter.passes(poly.flags, node_ref, nm) {
            continue;
        }
        let verts = tile.poly_verts_world(poly);
        let area = poly_area_xz(&verts).max(1e-6);
        total_area += area;
        if chosen_poly.is_none() || rng.gen::<f32>() < area / total_area {
            chosen_poly = Some(poly_index);
        }
    }
    let poly_index = match chosen_poly {
        Some(p) => p,
        None => return RandomPointResult { status: Status::FAILURE, ..Default::default() },
    };

    let poly = &tile.polys[poly_index];
    let verts = tile.poly_verts_world(poly);
    let point = random_point_in_convex_poly(&verts, rng.gen(), rng.gen());
    let node_ref = nm.poly_node_ref(tile.id, poly_index);

    RandomPointResult { status: Status::SUCCESS, node_ref, position: Some(point) }
}

pub fn find_random_point_around_circle(
    nm: &NavMesh,
    start_ref: NodeRef,
    center: Vec3,
    radius: f32,
    filter: &QueryFilter,
    rng: &mut impl Rng,
) -> RandomPointResult {
    if nm.poly_of(start_ref).is_none() {
        return RandomPointResult { status: Status::INVALID_INPUT, ..Default::default() };
    }

    let mut dist: HashMap<NodeRef, f32> = HashMap::new();
    dist.insert(start_ref, 0.0);
    let mut heap = BinaryHeap::new();
    heap.push(std::cmp::Reverse(OrderedDist(0.0, start_ref)));

    let mut visited: Vec<(NodeRef, f32)> = Vec::new();

    while let Some(std::cmp::Reverse(OrderedDist(d, cur))) = heap.pop() {
        if dist.get(&cur).map(|&bd| d > bd).unwrap_or(false) {
            continue;
        }
        let (tile, poly_index) = match nm.poly_of(cur) {
            Some(v) => v,
            None => continue,
        };
        let poly = &tile.polys[poly_index];
        let area = poly_area_xz(&tile.poly_verts_world(poly)).max(1e-6);
        visited.push((cur, area));

        for &link_idx in nm.node_links(cur) {
            let link = match nm.link(link_idx) {
                Some(l) => l,
                None => continue,
            };
            let (passes, edge_pos) = match nm.poly_of(link.to) {
                Some((t, i)) => (filter.passes(t.polys[i].flags, link.to, nm), nm.get_portal_points(link).map(|(l, r)| (l + r) * 0.5)),
                None => (false, None),
            };
            if !passes {
                continue;
            }
            let edge_pos = match edge_pos {
                Some(p) => p,
                None => continue,
            };
            if center.distance(edge_pos) > radius {
                continue;
            }
            let step = center.distance(edge_pos).min(radius);
            let nd = d + step;
            if dist.get(&link.to).map(|&bd| nd < bd).unwrap_or(true) {
                dist.insert(link.to, nd);
                heap.push(std::cmp::Reverse(OrderedDist(nd, link.to)));
            }
        }
    }

    if visited.is_empty() {
        return RandomPointResult { status: Status::FAILURE, ..Default::default() };
    }

    let total_area: f32 = visited.iter().map(|(_, a)| a).sum();
    let mut target = rng.gen::<f32>() * total_area;
    let mut chosen = visited[0].0;
    for &(r, a) in &visited {
        if target <= a {
            chosen = r;
            break;
        }
        target -= a;
        chosen = r;
    }

    let (tile, poly_index) = nm.poly_of(chosen).unwrap();
    let verts = tile.poly_verts_world(&tile.polys[poly_index]);
    let point = random_point_in_convex_poly(&verts, rng.gen(), rng.gen());

    RandomPointResult { status: Status::SUCCESS, node_ref: Some(chosen), position: Some(point) }
}

#[derive(Clone, Copy, PartialEq)]
struct OrderedDist(f32, NodeRef);
impl Eq for OrderedDist {}
impl PartialOrd for OrderedDist {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OrderedDist {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Aabb;
    use crate::navmesh::NavMeshParams;
    use crate::tile::{BvTree, DetailMesh, Poly, Tile};
    use rand::SeedableRng;

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
    fn finds_a_point_on_the_only_tile() {
        let nm = quad_navmesh();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let res = find_random_point(&nm, &QueryFilter::default(), &mut rng);
        assert_eq!(res.status, Status::SUCCESS);
        assert!(res.position.is_some());
    }

    #[test]
    fn circle_sample_stays_within_radius_of_start_poly() {
        let nm = quad_navmesh();
        let start = nm.poly_node_ref(1, 0).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let res = find_random_point_around_circle(&nm, start, Vec3::new(1.0, 0.0, 1.0), 5.0, &QueryFilter::default(), &mut rng);
        assert_eq!(res.status, Status::SUCCESS);
    }
}
