//! Closest-point-on-polygon: resolves the detail-mesh height when the query point projects
//! inside the polygon, else clamps to the nearest boundary (and detail) edge.

use glam::Vec3;

use crate::math::{closest_height_point_triangle, closest_pt_on_poly_boundary_xz, dist_to_tri_mesh, point_in_poly_xz};
use crate::navmesh::NavMesh;
use crate::noderef::NodeRef;
use crate::tile::Tile;

/// Finds the closest point to `pt` that lies on `poly_ref`'s polygon (boundary-clamped if `pt`
/// projects outside it in xz, height-correct via the detail mesh otherwise).
pub fn closest_point_on_poly(nm: &NavMesh, poly_ref: NodeRef, pt: Vec3) -> Option<Vec3> {
    let (tile, poly_index) = nm.poly_of(poly_ref)?;
    let poly = &tile.polys[poly_index];
    let verts = tile.poly_verts_world(poly);
    Some(closest_point_on_poly_raw(tile, poly_index, &verts, pt))
}

/// Same computation as [`closest_point_on_poly`] but taking the tile/poly/verts directly, so
/// callers that already hold them (e.g. nearest-poly scoring, which walks the BV tree over a
/// tile's polygons) don't need to round-trip through a `NodeRef`.
pub fn closest_point_on_poly_raw(tile: &Tile, poly_index: usize, verts: &[Vec3], pt: Vec3) -> Vec3 {
    let poly = &tile.polys[poly_index];

    if point_in_poly_xz(pt, verts) {
        if let Some(h) = height_via_detail_mesh(tile, poly_index, pt) {
            return Vec3::new(pt.x, h, pt.z);
        }
        // All detail triangles degenerate: fall back to the nearest boundary edge's height.
        let (closest, _, _) = closest_pt_on_poly_boundary_xz(pt, verts);
        return Vec3::new(pt.x, closest.y, pt.z);
    }

    let (boundary_pt, _edge_idx, boundary_d2) = closest_pt_on_poly_boundary_xz(pt, verts);
    if let Some(mesh) = tile.detail_meshes.get(poly_index) {
        if let Some((detail_pt, detail_d2)) = nearest_detail_edge_point(tile, poly, mesh, pt) {
            if detail_d2 < boundary_d2 {
                return detail_pt;
            }
        }
    }
    boundary_pt
}

fn height_via_detail_mesh(tile: &Tile, poly_index: usize, pt: Vec3) -> Option<f32> {
    let mesh = tile.detail_meshes.get(poly_index)?;
    let poly = &tile.polys[poly_index];
    for tri in tile.detail_triangles_for(mesh) {
        let a = tile.detail_vertex_world(poly, mesh, tri.a);
        let b = tile.detail_vertex_world(poly, mesh, tri.b);
        let c = tile.detail_vertex_world(poly, mesh, tri.c);
        if let Some(h) = closest_height_point_triangle(pt, a, b, c) {
            return Some(h);
        }
    }
    None
}

fn nearest_detail_edge_point(tile: &Tile, poly: &crate::tile::Poly, mesh: &crate::tile::DetailMesh, pt: Vec3) -> Option<(Vec3, f32)> {
    let triangles: Vec<(Vec3, Vec3, Vec3)> = tile
        .detail_triangles_for(mesh)
        .map(|tri| {
            (
                tile.detail_vertex_world(poly, mesh, tri.a),
                tile.detail_vertex_world(poly, mesh, tri.b),
                tile.detail_vertex_world(poly, mesh, tri.c),
            )
        })
        .collect();
    dist_to_tri_mesh(pt, &triangles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navmesh::{NavMesh, NavMeshParams};
    use crate::tile::{BvTree, DetailMesh, Poly, Tile};
    use crate::math::Aabb;

    fn single_quad() -> (NavMesh, NodeRef) {
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
        let r = crate::query::nearest::find_nearest_poly(&nm, Vec3::new(1.0, 0.0, 1.0), Vec3::ONE, &Default::default());
        (nm, r.node_ref.unwrap())
    }

    #[test]
    fn inside_point_clamps_to_zero_height_plane() {
        let (nm, r) = single_quad();
        let p = closest_point_on_poly(&nm, r, Vec3::new(1.0, 5.0, 1.0)).unwrap();
        assert!((p.y - 0.0).abs() < 1e-5);
    }

    #[test]
    fn outside_point_clamps_to_boundary() {
        let (nm, r) = single_quad();
        let p = closest_point_on_poly(&nm, r, Vec3::new(5.0, 0.0, 1.0)).unwrap();
        assert!((p.x - 2.0).abs() < 1e-5);
    }
}
