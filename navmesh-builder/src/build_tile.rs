//! Implements the build-pipeline contract (`buildTile`): turns a set of already-extracted convex
//! polygons into an immutable [`navmesh_core::tile::Tile`] ready for `NavMesh::add_tile`.
//!
//! Voxelization and contour extraction are out of scope (they are assumed to have already
//! happened upstream); this module only classifies polygon adjacency, fills in a detail mesh when
//! none is supplied, and builds the per-tile bounding-volume tree.

use glam::Vec3;
use smallvec::SmallVec;

use navmesh_core::error::BuildTileError;
use navmesh_core::math::Aabb;
use navmesh_core::tile::{BvNode, BvTree, DetailMesh, DetailTriangle, Poly, Tile, EXT_LINK};

/// One input polygon: vertex indices into `BuildTileParams::vertices`, plus its user-assigned
/// area/flags classification.
#[derive(Clone, Debug)]
pub struct PolyInput {
    pub vertices: Vec<u16>,
    pub area: u8,
    pub flags: u16,
}

/// Optional pre-computed detail submesh for one polygon. When a tile's `detail` field is absent,
/// [`build_tile`] fills in a trivial fan triangulation per §6.1.
#[derive(Clone, Debug)]
pub struct DetailMeshInput {
    /// Extra vertices beyond the polygon's own, in tile-local order.
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<(u8, u8, u8, u8)>,
}

#[derive(Clone, Debug)]
pub struct BuildTileParams {
    pub bounds: Aabb,
    pub vertices: Vec<Vec3>,
    pub polys: Vec<PolyInput>,
    /// One entry per polygon, or empty to request trivial fan triangulation for all polygons.
    pub detail: Vec<DetailMeshInput>,
    pub tile_x: i32,
    pub tile_y: i32,
    pub tile_layer: i32,
    pub cell_size: f32,
    pub cell_height: f32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
}

const EPS: f32 = 1e-3;

pub fn build_tile(params: BuildTileParams) -> Result<Tile, BuildTileError> {
    if params.cell_size <= 0.0 || params.cell_height <= 0.0 {
        return Err(BuildTileError::InvalidCellDimensions { cell_size: params.cell_size, cell_height: params.cell_height });
    }
    for (index, poly) in params.polys.iter().enumerate() {
        if poly.vertices.len() < 3 {
            return Err(BuildTileError::DegeneratePolygon { index, got: poly.vertices.len() });
        }
        for &v in &poly.vertices {
            if v as usize >= params.vertices.len() {
                return Err(BuildTileError::VertexOutOfRange { index, vertex: v as u32, len: params.vertices.len() });
            }
        }
    }

    let neis = classify_edges(&params);

    let polys: Vec<Poly> = params
        .polys
        .iter()
        .zip(neis.into_iter())
        .map(|(p, edge_neis)| Poly {
            verts: p.vertices.iter().copied().collect::<SmallVec<[u16; 6]>>(),
            neis: edge_neis,
            area: p.area,
            flags: p.flags,
        })
        .collect();

    let (detail_meshes, detail_vertices, detail_triangles) = build_detail_meshes(&params, &polys);

    let bv_tree = build_bv_tree(&params, &polys);

    Ok(Tile {
        id: 0,
        sequence: 0,
        tile_x: params.tile_x,
        tile_y: params.tile_y,
        tile_layer: params.tile_layer,
        bounds: params.bounds,
        vertices: params.vertices,
        polys,
        detail_meshes,
        detail_vertices,
        detail_triangles,
        bv_tree,
        cell_size: params.cell_size,
        cell_height: params.cell_height,
        walkable_height: params.walkable_height,
        walkable_radius: params.walkable_radius,
        walkable_climb: params.walkable_climb,
    })
}

/// For each polygon edge, finds the shared internal neighbour (a polygon with the same two
/// vertex indices in reverse order), else classifies the edge as a tile-boundary portal when both
/// endpoints lie on the tile's world bounds, else leaves it a wall (`0`).
fn classify_edges(params: &BuildTileParams) -> Vec<SmallVec<[u16; 6]>> {
    let mut shared: std::collections::HashMap<(u16, u16), (usize, usize)> = std::collections::HashMap::new();
    for (poly_index, poly) in params.polys.iter().enumerate() {
        let n = poly.vertices.len();
        for edge in 0..n {
            let a = poly.vertices[edge];
            let b = poly.vertices[(edge + 1) % n];
            shared.insert((a, b), (poly_index, edge));
        }
    }

    params
        .polys
        .iter()
        .map(|poly| {
            let n = poly.vertices.len();
            let mut out = SmallVec::<[u16; 6]>::new();
            for edge in 0..n {
                let a = poly.vertices[edge];
                let b = poly.vertices[(edge + 1) % n];
                if let Some(&(other_index, _)) = shared.get(&(b, a)) {
                    out.push((other_index + 1) as u16);
                    continue;
                }
                match boundary_side(params, a, b) {
                    Some(side) => out.push(EXT_LINK | side.as_u8() as u16),
                    None => out.push(0),
                }
            }
            out
        })
        .collect()
}

fn boundary_side(params: &BuildTileParams, a: u16, b: u16) -> Option<navmesh_core::link::PortalSide> {
    use navmesh_core::link::PortalSide;
    let pa = params.vertices[a as usize];
    let pb = params.vertices[b as usize];
    if (pa.x - params.bounds.max.x).abs() < EPS && (pb.x - params.bounds.max.x).abs() < EPS {
        return Some(PortalSide::PlusX);
    }
    if (pa.z - params.bounds.max.z).abs() < EPS && (pb.z - params.bounds.max.z).abs() < EPS {
        return Some(PortalSide::PlusZ);
    }
    if (pa.x - params.bounds.min.x).abs() < EPS && (pb.x - params.bounds.min.x).abs() < EPS {
        return Some(PortalSide::MinusX);
    }
    if (pa.z - params.bounds.min.z).abs() < EPS && (pb.z - params.bounds.min.z).abs() < EPS {
        return Some(PortalSide::MinusZ);
    }
    None
}

fn build_detail_meshes(params: &BuildTileParams, polys: &[Poly]) -> (Vec<DetailMesh>, Vec<Vec3>, Vec<DetailTriangle>) {
    let mut meshes = Vec::with_capacity(polys.len());
    let mut vertices = Vec::new();
    let mut triangles = Vec::new();

    for (poly_index, poly) in polys.iter().enumerate() {
        if let Some(input) = params.detail.get(poly_index) {
            let vertex_base = vertices.len() as u32;
            let triangle_base = triangles.len() as u32;
            vertices.extend(input.vertices.iter().copied());
            triangles.extend(input.triangles.iter().map(|&(a, b, c, f)| DetailTriangle { a, b, c, edge_flags: f }));
            meshes.push(DetailMesh {
                vertex_base,
                vertex_count: input.vertices.len() as u32,
                triangle_base,
                triangle_count: input.triangles.len() as u32,
            });
        } else {
            // Trivial fan triangulation from vertex 0; no extra detail vertices needed, so every
            // triangle index refers back into the polygon's own vertex list.
            let n = poly.verts.len();
            let triangle_base = triangles.len() as u32;
            for i in 1..n - 1 {
                triangles.push(DetailTriangle { a: 0, b: i as u8, c: (i + 1) as u8, edge_flags: 0 });
            }
            meshes.push(DetailMesh {
                vertex_base: 0,
                vertex_count: 0,
                triangle_base,
                triangle_count: (n - 2) as u32,
            });
        }
    }

    (meshes, vertices, triangles)
}

struct BvItem {
    bmin: [u16; 3],
    bmax: [u16; 3],
    poly_index: usize,
}

fn build_bv_tree(params: &BuildTileParams, polys: &[Poly]) -> BvTree {
    let quant_factor = 1.0 / params.cell_size;
    let mut items: Vec<BvItem> = Vec::with_capacity(polys.len());
    for (poly_index, poly) in polys.iter().enumerate() {
        let world_verts: SmallVec<[Vec3; 6]> = poly.verts.iter().map(|&vi| params.vertices[vi as usize]).collect();
        let aabb = Aabb::from_points(&world_verts);
        let local_min = (aabb.min - params.bounds.min) * quant_factor;
        let local_max = (aabb.max - params.bounds.min) * quant_factor;
        items.push(BvItem {
            bmin: [local_min.x.floor().max(0.0) as u16, local_min.y.floor().max(0.0) as u16, local_min.z.floor().max(0.0) as u16],
            bmax: [local_max.x.ceil().max(0.0) as u16, local_max.y.ceil().max(0.0) as u16, local_max.z.ceil().max(0.0) as u16],
            poly_index,
        });
    }

    let mut nodes = Vec::with_capacity(items.len() * 2);
    if !items.is_empty() {
        subdivide(&mut items, &mut nodes);
    }
    BvTree { nodes, quant_factor }
}

/// Classic top-down BV-tree build: split the longest axis at the median of item centers, and
/// record each internal node's escape index (total descendant-node count including itself) so a
/// query can skip the whole subtree in one step when it misses the bounds.
fn subdivide(items: &mut [BvItem], nodes: &mut Vec<BvNode>) -> usize {
    if items.len() == 1 {
        let it = &items[0];
        nodes.push(BvNode { bmin: it.bmin, bmax: it.bmax, i: it.poly_index as i32 });
        return 1;
    }

    let (bmin, bmax) = calc_extents(items);
    let extent = [bmax[0] - bmin[0], bmax[1] - bmin[1], bmax[2] - bmin[2]];
    let axis = if extent[0] >= extent[1] && extent[0] >= extent[2] {
        0
    } else if extent[1] >= extent[2] {
        1
    } else {
        2
    };
    items.sort_by_key(|it| it.bmin[axis] as u32 + it.bmax[axis] as u32);

    let node_index = nodes.len();
    nodes.push(BvNode { bmin, bmax, i: 0 });

    let split = items.len() / 2;
    let (left, right) = items.split_at_mut(split);
    let left_count = subdivide(left, nodes);
    let right_count = subdivide(right, nodes);

    let total = 1 + left_count + right_count;
    nodes[node_index].i = -(total as i32);
    total
}

fn calc_extents(items: &[BvItem]) -> ([u16; 3], [u16; 3]) {
    let mut bmin = items[0].bmin;
    let mut bmax = items[0].bmax;
    for it in &items[1..] {
        for a in 0..3 {
            bmin[a] = bmin[a].min(it.bmin[a]);
            bmax[a] = bmax[a].max(it.bmax[a]);
        }
    }
    (bmin, bmax)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_params() -> BuildTileParams {
        BuildTileParams {
            bounds: Aabb::new(Vec3::ZERO, Vec3::new(4.0, 0.0, 2.0)),
            vertices: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(2.0, 0.0, 0.0),
                Vec3::new(2.0, 0.0, 2.0),
                Vec3::new(0.0, 0.0, 2.0),
                Vec3::new(4.0, 0.0, 0.0),
                Vec3::new(4.0, 0.0, 2.0),
            ],
            polys: vec![
                PolyInput { vertices: vec![0, 1, 2, 3], area: 0, flags: 1 },
                PolyInput { vertices: vec![1, 4, 5, 2], area: 0, flags: 1 },
            ],
            detail: Vec::new(),
            tile_x: 0,
            tile_y: 0,
            tile_layer: 0,
            cell_size: 0.5,
            cell_height: 0.5,
            walkable_height: 2.0,
            walkable_radius: 0.5,
            walkable_climb: 0.5,
        }
    }

    #[test]
    fn shared_edge_becomes_internal_neighbour() {
        let tile = build_tile(quad_params()).unwrap();
        assert_eq!(tile.polys[0].neis[1], 2); // poly 0 edge (1,2) -> poly index 1 (1-based)
        assert_eq!(tile.polys[1].neis[3], 1); // poly 1 edge (2,1) -> poly index 0 (1-based)
    }

    #[test]
    fn outer_edges_are_walls_or_boundary() {
        let tile = build_tile(quad_params()).unwrap();
        // poly 0 edge (0,1) lies on z=min boundary and x isn't constant, so this is a wall
        // (MinusZ side) since both endpoints share z == bounds.min.z.
        assert_eq!(tile.polys[0].neis[0] & EXT_LINK, EXT_LINK);
    }

    #[test]
    fn trivial_fan_triangulation_fills_missing_detail() {
        let tile = build_tile(quad_params()).unwrap();
        assert_eq!(tile.detail_meshes.len(), 2);
        assert_eq!(tile.detail_meshes[0].triangle_count, 2);
    }

    #[test]
    fn bv_tree_has_one_leaf_per_polygon() {
        let tile = build_tile(quad_params()).unwrap();
        let leaves = tile.bv_tree.nodes.iter().filter(|n| n.i >= 0).count();
        assert_eq!(leaves, tile.polys.len());
    }

    #[test]
    fn rejects_degenerate_polygon() {
        let mut params = quad_params();
        params.polys[0].vertices = vec![0, 1];
        let err = build_tile(params).unwrap_err();
        assert!(matches!(err, BuildTileError::DegeneratePolygon { .. }));
    }

    #[test]
    fn rejects_out_of_range_vertex() {
        let mut params = quad_params();
        params.polys[0].vertices = vec![0, 1, 99];
        let err = build_tile(params).unwrap_err();
        assert!(matches!(err, BuildTileError::VertexOutOfRange { .. }));
    }
}
