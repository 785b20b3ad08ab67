//! Per-query polygon filter: which polygons a query is allowed to consider, and how to cost
//! moving between them. Generalizes the defaults-plus-override shape used for search tuning.

use std::sync::Arc;

use glam::Vec3;

use crate::navmesh::NavMesh;
use crate::noderef::NodeRef;

pub type CostFn = fn(from_pos: Vec3, to_pos: Vec3, nm: &NavMesh, prev_ref: NodeRef, cur_ref: NodeRef, next_ref: NodeRef) -> f32;

/// Caller-supplied predicate consulted on top of the flag mask; rejecting a ref here keeps it
/// out of every query result regardless of its flags.
pub type PassFilterFn = Arc<dyn Fn(NodeRef, &NavMesh) -> bool + Send + Sync>;

fn default_cost(from_pos: Vec3, to_pos: Vec3, nm: &NavMesh, _prev_ref: NodeRef, _cur_ref: NodeRef, next_ref: NodeRef) -> f32 {
    if let Some(over) = nm.off_mesh_cost_override(next_ref) {
        return over;
    }
    from_pos.distance(to_pos)
}

/// Controls which polygons a query may traverse and what each crossing costs.
#[derive(Clone)]
pub struct QueryFilter {
    pub include_flags: u16,
    pub exclude_flags: u16,
    pub pass_filter: Option<PassFilterFn>,
    pub get_cost: CostFn,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self { include_flags: 0xffff, exclude_flags: 0, pass_filter: None, get_cost: default_cost }
    }
}

impl QueryFilter {
    pub fn passes(&self, poly_flags: u16, node_ref: NodeRef, nm: &NavMesh) -> bool {
        if (poly_flags & self.include_flags) == 0 || (poly_flags & self.exclude_flags) != 0 {
            return false;
        }
        self.pass_filter.as_ref().map(|f| f(node_ref, nm)).unwrap_or(true)
    }
}
