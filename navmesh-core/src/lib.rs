//! navmesh-core: a tiled navigation-mesh runtime.
//!
//! Given a walkable polygonal surface partitioned into tiles, this crate answers the spatial
//! queries autonomous agents need: nearest-polygon lookup, graph pathfinding, string-pulling into
//! straight-line corridors, surface-constrained movement, walkability raycasts, random point
//! sampling, and local-neighbourhood/wall-segment extraction. Tiles can be added and removed at
//! runtime with cross-tile links stitched automatically; the [`scheduler`] module provides the
//! orchestration an embedder needs to keep the mesh in sync with moving obstacles.
//!
//! The engine is single-threaded cooperative: queries never block or suspend, and mutation
//! (`add_tile`/`remove_tile`/off-mesh connection management) must be serialized by the caller
//! against queries on the same [`NavMesh`]. [`NodeRef`] is a weak, salted handle — it is revalidated
//! on every query entry point rather than guaranteed live by construction.

pub mod error;
pub mod filter;
pub mod link;
pub mod math;
pub mod navmesh;
pub mod noderef;
pub mod offmesh;
pub mod pool;
pub mod query;
pub mod scheduler;
pub mod tile;

pub use error::{BuildTileError, NavMeshError, Status};
pub use filter::QueryFilter;
pub use navmesh::{NavMesh, NavMeshParams};
pub use noderef::{NodeKind, NodeRef};
pub use offmesh::{OffMeshConnectionParams, OffMeshDirection};
pub use query::{NavMeshQuery, Waypoint, WaypointKind};
pub use scheduler::{DynamicTileScheduler, TileRebuildSource};
pub use tile::Tile;

/// Returns the crate version for basic linkage diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn version_is_non_empty() {
        assert!(!version().is_empty());
    }

    #[test]
    fn core_types_are_constructible() {
        let nm = NavMesh::new(NavMeshParams { origin: Vec3::ZERO, tile_width: 10.0, tile_height: 10.0 });
        let filter = QueryFilter::default();
        let status = Status::SUCCESS;
        assert!(status.succeeded());
        assert_eq!(nm.tiles().count(), 0);
        let _ = filter;
    }
}
