//! Walkability raycast: walks polygon-to-polygon along a straight ray, stopping at the first
//! wall it cannot cross.

use glam::{Vec2, Vec3};

use crate::filter::QueryFilter;
use crate::math::segment_poly_intersect_xz;
use crate::navmesh::NavMesh;
use crate::noderef::NodeRef;

#[derive(Clone, Debug)]
pub struct RaycastResult {
    /// Parametric hit distance along `start..end`, in `[0,1]`. `f32::MAX` means the end point
    /// lies inside a polygon (no wall was hit).
    pub t: f32,
    pub hit_normal: Option<Vec2>,
    pub hit_edge_index: Option<usize>,
    pub path: Vec<NodeRef>,
}

pub fn raycast(nm: &NavMesh, start_ref: NodeRef, start_pos: Vec3, end_pos: Vec3, filter: &QueryFilter) -> RaycastResult {
    let mut path = vec![start_ref];
    let mut current_ref = start_ref;
    let a = Vec2::new(start_pos.x, start_pos.z);
    let b = Vec2::new(end_pos.x, end_pos.z);

    // A straight ray can cross at most a handful of polygons per tile edge; this bounds runaway
    // loops from a malformed graph (a link cycle along the same edge) without affecting any
    // legitimate query.
    for _ in 0..4096 {
        let (tile, poly_index) = match nm.poly_of(current_ref) {
            Some(v) => v,
            None => return RaycastResult { t: 0.0, hit_normal: None, hit_edge_index: None, path },
        };
        let poly = &tile.polys[poly_index];
        let verts = tile.poly_verts_world(poly);
        let n = verts.len();

        let hit = segment_poly_intersect_xz(a, b, &verts);

        let (best_t, edge) = match hit {
            Some((t, e)) => (t, e),
            None => {
                // No boundary crossing: the end point is inside this polygon.
                return RaycastResult { t: f32::MAX, hit_normal: None, hit_edge_index: None, path };
            }
        };

        // Find a link on this edge that the filter allows and whose sub-range contains the hit.
        let mut advanced = None;
        for &link_idx in nm.node_links(current_ref) {
            let link = match nm.link(link_idx) {
                Some(l) => l,
                None => continue,
            };
            if link.edge as usize != edge {
                continue;
            }
            if let Some((tile_n, poly_idx_n)) = nm.poly_of(link.to) {
                if !filter.passes(tile_n.polys[poly_idx_n].flags, link.to, nm) {
                    continue;
                }
            } else {
                continue; // off-mesh connections are treated as walls for raycast purposes
            }
            if !link.is_internal() {
                // bmin/bmax gate which portion of the edge the neighbour actually covers; the
                // hit point's position along the edge must fall within it.
                let ea = verts[edge];
                let eb = verts[(edge + 1) % n];
                let hit_point = ea + (eb - ea) * best_t;
                let edge_t = {
                    let span = (eb - ea).length();
                    if span < 1e-6 { 0.0 } else { (hit_point - ea).length() / span }
                };
                let lo = link.bmin as f32 / 255.0;
                let hi = link.bmax as f32 / 255.0;
                if edge_t < lo || edge_t > hi {
                    continue;
                }
            }
            advanced = Some(link.to);
            break;
        }

        match advanced {
            Some(next_ref) => {
                path.push(next_ref);
                current_ref = next_ref;
            }
            None => {
                let ea = verts[edge];
                let eb = verts[(edge + 1) % n];
                let dir = (eb - ea).normalize_or_zero();
                let normal = Vec2::new(dir.z, -dir.x);
                return RaycastResult { t: best_t, hit_normal: Some(normal), hit_edge_index: Some(edge), path };
            }
        }
    }
    RaycastResult { t: f32::MAX, hit_normal: None, hit_edge_index: None, path }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Aabb;
    use crate::navmesh::{NavMesh, NavMeshParams};
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
    fn unobstructed_ray_reports_max_t() {
        let nm = strip_navmesh(3);
        let start = nm.poly_node_ref(1, 0).unwrap();
        let res = raycast(&nm, start, Vec3::new(1.0, 0.0, 1.0), Vec3::new(5.0, 0.0, 1.0), &QueryFilter::default());
        assert_eq!(res.t, f32::MAX);
    }

    #[test]
    fn ray_toward_outer_wall_hits() {
        let nm = strip_navmesh(1);
        let start = nm.poly_node_ref(1, 0).unwrap();
        let res = raycast(&nm, start, Vec3::new(1.0, 0.0, 1.0), Vec3::new(10.0, 0.0, 1.0), &QueryFilter::default());
        assert!(res.t < f32::MAX);
        assert!(res.hit_normal.is_some());
    }
}
