//! Error taxonomy and the `Status` result bitmask.
//!
//! Expected run-time conditions (not found, partial path, saturated output buffer) are
//! communicated through `Status`, never through `Result::Err`. `Result::Err` is reserved for
//! programmer-class errors: calling a mutation API against state that violates its preconditions.

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Outcome flags attached to every query result. Mirrors the historical Detour `dtStatus`
    /// shape: a bitmask rather than an exhaustive enum, so a result can carry both a completion
    /// state and qualifiers (e.g. `SUCCESS | PARTIAL_PATH`).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Status: u32 {
        const SUCCESS           = 1 << 0;
        const FAILURE            = 1 << 1;
        const IN_PROGRESS        = 1 << 2;
        const NOT_INITIALIZED    = 1 << 3;
        const OUT_OF_NODES       = 1 << 4;
        const PARTIAL_PATH       = 1 << 5;
        const MAX_POINTS_REACHED = 1 << 6;
        const INVALID_INPUT      = 1 << 7;
    }
}

impl Status {
    #[inline]
    pub fn succeeded(self) -> bool {
        self.contains(Status::SUCCESS)
    }

    #[inline]
    pub fn failed(self) -> bool {
        self.contains(Status::FAILURE)
    }
}

/// Errors raised by graph mutation APIs (`NavMesh::add_tile`, `remove_tile`, off-mesh
/// registration). These represent misuse of the API, not expected query outcomes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavMeshError {
    #[error("a tile already exists at ({x}, {y}, layer {layer})")]
    TileAlreadyExists { x: i32, y: i32, layer: i32 },

    #[error("no tile exists at ({x}, {y}, layer {layer})")]
    TileNotFound { x: i32, y: i32, layer: i32 },

    #[error("off-mesh connection id {0} is unknown")]
    InvalidOffMeshConnectionId(u32),

    #[error("tile exceeds the maximum of {max} polygons ({got} given)")]
    TooManyPolygons { max: usize, got: usize },
}

/// Errors raised by the external build-pipeline contract (`navmesh-builder::build_tile`).
#[derive(Debug, Error)]
pub enum BuildTileError {
    #[error("polygon {index} has {got} vertices, fewer than the minimum of 3")]
    DegeneratePolygon { index: usize, got: usize },

    #[error("polygon {index} references out-of-range vertex {vertex} (buffer has {len})")]
    VertexOutOfRange { index: usize, vertex: u32, len: usize },

    #[error("cell_size and cell_height must be positive, got ({cell_size}, {cell_height})")]
    InvalidCellDimensions { cell_size: f32, cell_height: f32 },
}
