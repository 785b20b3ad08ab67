//! Nearest-polygon lookup via the per-tile bounding-volume tree.

use glam::Vec3;

use crate::error::Status;
use crate::filter::QueryFilter;
use crate::math::Aabb;
use crate::navmesh::NavMesh;
use crate::noderef::NodeRef;
use crate::query::closest_point::closest_point_on_poly_raw;
use crate::tile::{Poly, Tile};

#[derive(Clone, Copy, Debug, Default)]
pub struct NearestPolyResult {
    pub status: Status,
    pub node_ref: Option<NodeRef>,
    pub position: Option<Vec3>,
}

pub fn find_nearest_poly(nm: &NavMesh, center: Vec3, half_extents: Vec3, filter: &QueryFilter) -> NearestPolyResult {
    let query_bounds = Aabb::new(center - half_extents, center + half_extents);
    let mut best: Option<(NodeRef, Vec3, f32)> = None;

    for (cx, cy) in nm.tile_coords_overlapping(&query_bounds) {
        for &tile_id in nm.tile_ids_at_column(cx, cy) {
            let tile = match nm.tile(tile_id) {
                Some(t) => t,
                None => continue,
            };
            if !tile.bounds.overlaps(&query_bounds) {
                continue;
            }
            visit_candidate_polys(tile, &query_bounds, |poly_index, poly| {
                let node_ref = match nm.poly_node_ref(tile.id, poly_index) {
                    Some(r) => r,
                    None => return,
                };
                if !filter.passes(poly.flags, node_ref, nm) {
                    return;
                }
                let verts = tile.poly_verts_world(poly);
                let closest = closest_point_on_poly_raw(tile, poly_index, &verts, center);
                let in_poly = crate::math::point_in_poly_xz(center, &verts);
                let (score, point) = if in_poly {
                    let dy = (center.y - closest.y).abs() - tile.walkable_climb;
                    (dy.max(0.0).powi(2), Vec3::new(center.x, closest.y, center.z))
                } else {
                    let dx = center.x - closest.x;
                    let dz = center.z - closest.z;
                    let dy = center.y - closest.y;
                    (dx * dx + dz * dz + dy * dy, closest)
                };
                if best.map(|(_, _, bs)| score < bs).unwrap_or(true) {
                    best = Some((node_ref, point, score));
                }
            });
        }
    }

    match best {
        Some((r, p, _)) => NearestPolyResult { status: Status::SUCCESS, node_ref: Some(r), position: Some(p) },
        None => NearestPolyResult { status: Status::FAILURE, node_ref: None, position: None },
    }
}

#[inline]
fn quant_floor_even(v: f32) -> u16 {
    let q = v.max(0.0) as u16;
    q & !1
}

#[inline]
fn quant_ceil_odd(v: f32) -> u16 {
    let q = v.max(0.0).ceil() as u16;
    q | 1
}

fn visit_candidate_polys(tile: &Tile, query_bounds: &Aabb, mut visit: impl FnMut(usize, &Poly)) {
    if tile.bv_tree.nodes.is_empty() {
        for (i, poly) in tile.polys.iter().enumerate() {
            visit(i, poly);
        }
        return;
    }
    let qf = tile.bv_tree.quant_factor;
    let local_min = (query_bounds.min - tile.bounds.min) * qf;
    let local_max = (query_bounds.max - tile.bounds.min) * qf;
    // Quantizing min down and max up could still miss a leaf whose true bound rounds to a value
    // just inside the query range, so min is floored to the nearest even integer and max is
    // ceiled to the nearest odd one, guaranteeing the query range never shrinks relative to the
    // tree's own quantization.
    let bmin = [quant_floor_even(local_min.x), quant_floor_even(local_min.y), quant_floor_even(local_min.z)];
    let bmax = [quant_ceil_odd(local_max.x), quant_ceil_odd(local_max.y), quant_ceil_odd(local_max.z)];
    let mut leaves = Vec::new();
    tile.bv_tree.query(bmin, bmax, |poly_index| leaves.push(poly_index));
    for poly_index in leaves {
        if let Some(poly) = tile.polys.get(poly_index) {
            visit(poly_index, poly);
        }
    }
}
