//! Tile value types: the immutable-once-added bundle of vertices, polygons, detail mesh, and
//! bounding-volume tree that the build pipeline produces and `NavMesh::add_tile` consumes.

use glam::Vec3;
use smallvec::SmallVec;

use crate::math::Aabb;

/// Bit set (OR'd into a `neis` entry) marking a polygon edge as a tile-boundary portal rather
/// than an internal neighbour index.
pub const EXT_LINK: u16 = 0x8000;

pub type PolyVerts = SmallVec<[u16; 6]>;

#[derive(Clone, Debug)]
pub struct Poly {
    /// Indices into the tile's vertex buffer.
    pub verts: PolyVerts,
    /// Parallel to `verts`: `neis[i]` describes the edge from `verts[i]` to `verts[i+1]`.
    /// `0` = wall, `EXT_LINK | side` = tile-boundary portal, otherwise `1 + internal_poly_index`.
    pub neis: SmallVec<[u16; 6]>,
    pub area: u8,
    pub flags: u16,
}

impl Poly {
    pub fn vertex_count(&self) -> usize {
        self.verts.len()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DetailTriangle {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub edge_flags: u8,
}

#[derive(Clone, Debug, Default)]
pub struct DetailMesh {
    /// Extra vertices beyond the polygon's own, in tile-local order.
    pub vertex_base: u32,
    pub vertex_count: u32,
    pub triangle_base: u32,
    pub triangle_count: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct BvNode {
    pub bmin: [u16; 3],
    pub bmax: [u16; 3],
    /// `>= 0`: leaf referencing this polygon index. `< 0`: internal node; `-i` is this
    /// subtree's escape index (number of nodes to skip to reach the next sibling).
    pub i: i32,
}

#[derive(Clone, Debug, Default)]
pub struct BvTree {
    pub nodes: Vec<BvNode>,
    /// `1 / cellSize`, used to quantize query AABBs into the same integer space as the tree.
    pub quant_factor: f32,
}

impl BvTree {
    /// Visits every leaf polygon index whose AABB overlaps `local_bmin..local_bmax` (already
    /// quantized into the tree's integer space).
    pub fn query(&self, local_bmin: [u16; 3], local_bmax: [u16; 3], mut visit: impl FnMut(usize)) {
        if self.nodes.is_empty() {
            return;
        }
        let mut idx = 0usize;
        while idx < self.nodes.len() {
            let node = &self.nodes[idx];
            let overlap = (0..3).all(|a| node.bmin[a] <= local_bmax[a] && node.bmax[a] >= local_bmin[a]);
            let is_leaf = node.i >= 0;
            if overlap && is_leaf {
                visit(node.i as usize);
            }
            if overlap || is_leaf {
                idx += 1;
            } else {
                idx += (-node.i) as usize;
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Tile {
    pub id: u32,
    pub sequence: u64,
    pub tile_x: i32,
    pub tile_y: i32,
    pub tile_layer: i32,
    pub bounds: Aabb,
    pub vertices: Vec<Vec3>,
    pub polys: Vec<Poly>,
    pub detail_meshes: Vec<DetailMesh>,
    pub detail_vertices: Vec<Vec3>,
    pub detail_triangles: Vec<DetailTriangle>,
    pub bv_tree: BvTree,
    pub cell_size: f32,
    pub cell_height: f32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
}

impl Tile {
    pub fn poly_verts_world(&self, poly: &Poly) -> SmallVec<[Vec3; 6]> {
        poly.verts.iter().map(|&vi| self.vertices[vi as usize]).collect()
    }

    /// World-space detail triangle vertices. `local` indices `< poly.vertex_count()` index the
    /// polygon's own vertices; higher indices index `detail_vertices` starting at the mesh's
    /// `vertex_base`.
    pub fn detail_vertex_world(&self, poly: &Poly, mesh: &DetailMesh, local_index: u8) -> Vec3 {
        let local_index = local_index as usize;
        if local_index < poly.vertex_count() {
            self.vertices[poly.verts[local_index] as usize]
        } else {
            self.detail_vertices[(mesh.vertex_base as usize) + local_index - poly.vertex_count()]
        }
    }

    pub fn detail_triangles_for(&self, mesh: &DetailMesh) -> &[DetailTriangle] {
        let start = mesh.triangle_base as usize;
        let end = start + mesh.triangle_count as usize;
        &self.detail_triangles[start..end]
    }
}
