//! JSON scene description consumed by the builder CLI: one [`NavMeshParams`](navmesh_core::NavMeshParams)
//! plus a list of per-tile build-pipeline inputs, each shaped like [`build_tile::BuildTileParams`]
//! but with plain arrays in place of `glam`/`smallvec` types so it round-trips through `serde_json`
//! without a custom (de)serializer.

use glam::Vec3;
use serde::Deserialize;

use navmesh_core::math::Aabb;

use crate::build_tile::{BuildTileParams, DetailMeshInput, PolyInput};

#[derive(Clone, Debug, Deserialize)]
pub struct Scene {
    pub origin: [f32; 3],
    pub tile_width: f32,
    pub tile_height: f32,
    pub tiles: Vec<SceneTile>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SceneTile {
    pub tile_x: i32,
    pub tile_y: i32,
    #[serde(default)]
    pub tile_layer: i32,
    pub cell_size: f32,
    pub cell_height: f32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub vertices: Vec<[f32; 3]>,
    pub polys: Vec<ScenePoly>,
    /// One entry per polygon, or omitted entirely to request trivial fan triangulation.
    #[serde(default)]
    pub detail: Vec<SceneDetailMesh>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ScenePoly {
    pub vertices: Vec<u16>,
    #[serde(default)]
    pub area: u8,
    #[serde(default = "default_flags")]
    pub flags: u16,
}

fn default_flags() -> u16 {
    1
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SceneDetailMesh {
    #[serde(default)]
    pub vertices: Vec<[f32; 3]>,
    /// `(a, b, c, edge_flags)` indices, counting the polygon's own vertices first.
    #[serde(default)]
    pub triangles: Vec<(u8, u8, u8, u8)>,
}

impl SceneTile {
    /// Converts this scene tile into the build-pipeline's own input shape. The tile's AABB is
    /// derived from its vertex set since the scene format doesn't carry one explicitly.
    pub fn into_build_params(self) -> BuildTileParams {
        let vertices: Vec<Vec3> = self.vertices.iter().map(|v| Vec3::from_array(*v)).collect();
        let bounds = Aabb::from_points(&vertices);
        let polys = self
            .polys
            .into_iter()
            .map(|p| PolyInput { vertices: p.vertices, area: p.area, flags: p.flags })
            .collect();
        let detail = self
            .detail
            .into_iter()
            .map(|d| DetailMeshInput { vertices: d.vertices.into_iter().map(Vec3::from_array).collect(), triangles: d.triangles })
            .collect();

        BuildTileParams {
            bounds,
            vertices,
            polys,
            detail,
            tile_x: self.tile_x,
            tile_y: self.tile_y,
            tile_layer: self.tile_layer,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            walkable_height: self.walkable_height,
            walkable_radius: self.walkable_radius,
            walkable_climb: self.walkable_climb,
        }
    }
}
