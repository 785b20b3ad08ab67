//! Off-mesh connections: user-declared jump/teleport links between two world positions, plus
//! their runtime attachment state.

use glam::Vec3;

use crate::noderef::NodeRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffMeshDirection {
    StartToEnd,
    Bidirectional,
}

#[derive(Clone, Copy, Debug)]
pub struct OffMeshConnectionParams {
    pub start: Vec3,
    pub end: Vec3,
    pub radius: f32,
    pub direction: OffMeshDirection,
    pub flags: u16,
    pub area: u8,
    pub cost_override: Option<f32>,
}

/// Which polygons (if any) this connection is currently stitched to. A connection always has a
/// registry entry; being unattached just means both fields are `None`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Attachment {
    pub start_poly_node: Option<NodeRef>,
    pub end_poly_node: Option<NodeRef>,
    pub off_mesh_node: Option<NodeRef>,
}

impl Attachment {
    /// True once the connection has a live off-mesh node *and* an end polygon to link onward to —
    /// a start-only stitch (end position not yet over any tile) stays unattached so it keeps
    /// getting retried as tiles are added.
    pub fn is_attached(&self) -> bool {
        self.off_mesh_node.is_some() && self.end_poly_node.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct OffMeshConnection {
    pub id: u32,
    pub params: OffMeshConnectionParams,
    pub attachment: Attachment,
}
