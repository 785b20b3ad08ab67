//! The query engine: nearest-poly lookup, A* node-path search, string-pulling, surface walk,
//! raycast, random-point sampling, local neighbourhood, and wall-segment extraction.
//!
//! Every entry point takes a `&NavMesh` plus whatever scratch state it needs for that one call;
//! `NavMeshQuery` bundles a `&NavMesh` with the scratch handle each call threads through. An
//! embedder wanting query parallelism constructs one `NavMeshQuery` per thread.

pub mod astar;
pub mod closest_point;
pub mod nearest;
pub mod neighbourhood;
pub mod path;
pub mod random_point;
pub mod raycast;
pub mod straight_path;
pub mod surface;

use glam::Vec3;

use crate::filter::QueryFilter;
use crate::navmesh::NavMesh;
use crate::noderef::NodeRef;

/// A waypoint emitted by [`path::find_path`] / [`path::find_smooth_path`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Waypoint {
    pub pos: Vec3,
    pub kind: WaypointKind,
    pub node_ref: NodeRef,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaypointKind {
    Start,
    Corner,
    OffMeshConnection,
    End,
}

/// A borrowed navmesh plus the scratch handle its query entry points need, bundled so an embedder
/// can hold one `NavMeshQuery` per worker thread.
pub struct NavMeshQuery<'a> {
    pub nm: &'a NavMesh,
    scratch_open: astar::Scratch,
}

impl<'a> NavMeshQuery<'a> {
    pub fn new(nm: &'a NavMesh) -> Self {
        Self { nm, scratch_open: astar::Scratch::default() }
    }

    pub fn find_nearest_poly(&self, center: Vec3, half_extents: Vec3, filter: &QueryFilter) -> nearest::NearestPolyResult {
        nearest::find_nearest_poly(self.nm, center, half_extents, filter)
    }

    pub fn find_node_path(&mut self, start: NodeRef, end: NodeRef, start_pos: Vec3, end_pos: Vec3, filter: &QueryFilter) -> astar::NodePathResult {
        astar::find_node_path(self.nm, &mut self.scratch_open, start, end, start_pos, end_pos, filter)
    }

    pub fn find_path(&mut self, start: Vec3, end: Vec3, half_extents: Vec3, filter: &QueryFilter, max_points: usize) -> path::FindPathResult {
        path::find_path(self.nm, &mut self.scratch_open, start, end, half_extents, filter, max_points)
    }

    pub fn find_smooth_path(
        &mut self,
        start: Vec3,
        end: Vec3,
        half_extents: Vec3,
        filter: &QueryFilter,
        max_points: usize,
        step_size: f32,
    ) -> path::FindPathResult {
        path::find_smooth_path(self.nm, &mut self.scratch_open, start, end, half_extents, filter, max_points, step_size)
    }
}
