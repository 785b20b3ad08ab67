//! A* node-path search, plus its sliced (cooperative, budgeted) variant with an optional
//! any-angle post-processing pass via raycast shortcutting.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use bitflags::bitflags;
use glam::Vec3;

use crate::error::Status;
use crate::filter::QueryFilter;
use crate::navmesh::NavMesh;
use crate::noderef::NodeRef;
use crate::query::raycast;

const HEURISTIC_SCALE: f32 = 0.999;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FindPathOptions: u32 {
        const ANY_ANGLE = 1 << 0;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct SearchKey {
    node: NodeRef,
    state: u8,
}

/// Folds a link's crossing side into a small state space so the same polygon can be explored
/// independently depending on which side it was entered from (Invariant-preserving tie-break
/// state, not a distinct graph node).
fn crossing_state(side: u8) -> u8 {
    if side == crate::link::SIDE_INTERNAL {
        0
    } else {
        ((side & 0x6) >> 1) as u8 + 1
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct F32Key(f32);
impl Eq for F32Key {}
impl PartialOrd for F32Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for F32Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct QueueEntry {
    f: F32Key,
    h: F32Key,
    g: F32Key,
    seq: u64,
    key: SearchKey,
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the lowest (f, h, g, seq) pops first. Insertion
        // sequence breaks ties deterministically regardless of hash-map iteration order.
        (other.f, other.h, other.g, other.seq).cmp(&(self.f, self.h, self.g, self.seq))
    }
}

#[derive(Clone, Debug)]
struct NodeInfo {
    g: f32,
    pos: Vec3,
    parent: Option<SearchKey>,
    parent_detached: bool,
}

/// Placeholder for per-`NavMeshQuery` A* state. `SlicedFindNodePath` currently builds its open
/// list, node table, and closed set fresh on every call rather than reusing buffers through this
/// struct; it exists so `find_node_path`'s signature doesn't need to change the day that changes.
#[derive(Default)]
pub struct Scratch;

#[derive(Clone, Debug, Default)]
pub struct NodePathResult {
    pub status: Status,
    pub path: Vec<NodeRef>,
}

pub fn find_node_path(
    nm: &NavMesh,
    _scratch: &mut Scratch,
    start: NodeRef,
    end: NodeRef,
    start_pos: Vec3,
    end_pos: Vec3,
    filter: &QueryFilter,
) -> NodePathResult {
    let mut sliced = SlicedFindNodePath::init(start, end, start_pos, end_pos, FindPathOptions::empty());
    loop {
        let status = sliced.update(nm, filter, usize::MAX);
        if !status.contains(Status::IN_PROGRESS) {
            break;
        }
    }
    sliced.finalize()
}

/// Cooperative, budgeted A*: call `update(max_iter)` repeatedly until it stops returning
/// `IN_PROGRESS`, then call `finalize` (or `finalize_partial` to accept the best-effort path).
pub struct SlicedFindNodePath {
    start: NodeRef,
    end: NodeRef,
    start_pos: Vec3,
    end_pos: Vec3,
    options: FindPathOptions,
    open: BinaryHeap<QueueEntry>,
    nodes: HashMap<SearchKey, NodeInfo>,
    closed: std::collections::HashSet<SearchKey>,
    seq: u64,
    status: Status,
    last_best: Option<SearchKey>,
    last_best_h: f32,
}

impl SlicedFindNodePath {
    pub fn init(start: NodeRef, end: NodeRef, start_pos: Vec3, end_pos: Vec3, options: FindPathOptions) -> Self {
        let start_key = SearchKey { node: start, state: 0 };
        let h0 = start_pos.distance(end_pos) * HEURISTIC_SCALE;
        let mut nodes = HashMap::new();
        nodes.insert(start_key, NodeInfo { g: 0.0, pos: start_pos, parent: None, parent_detached: false });
        let mut open = BinaryHeap::new();
        open.push(QueueEntry { f: F32Key(h0), h: F32Key(h0), g: F32Key(0.0), seq: 0, key: start_key });
        Self {
            start,
            end,
            start_pos,
            end_pos,
            options,
            open,
            nodes,
            closed: std::collections::HashSet::new(),
            seq: 1,
            status: Status::IN_PROGRESS,
            last_best: Some(start_key),
            last_best_h: h0,
        }
    }

    pub fn update(&mut self, nm: &NavMesh, filter: &QueryFilter, max_iter: usize) -> Status {
        if !self.status.contains(Status::IN_PROGRESS) {
            return self.status;
        }
        if self.start == self.end {
            self.status = Status::SUCCESS;
            return self.status;
        }

        let mut iters = 0usize;
        while let Some(entry) = self.open.pop() {
            if self.closed.contains(&entry.key) {
                continue;
            }
            self.closed.insert(entry.key);
            iters += 1;

            if entry.key.node == self.end {
                self.status = Status::SUCCESS;
                return self.status;
            }

            let current_info = self.nodes.get(&entry.key).cloned().unwrap();
            if entry.h.0 < self.last_best_h {
                self.last_best_h = entry.h.0;
                self.last_best = Some(entry.key);
            }

            for &link_idx in nm.node_links(entry.key.node) {
                let link = match nm.link(link_idx) {
                    Some(l) => l,
                    None => continue,
                };
                let neighbour_ref = link.to;
                if !self.passes_filter(nm, filter, neighbour_ref) {
                    continue;
                }
                let state = crossing_state(link.side);
                let neighbour_key = SearchKey { node: neighbour_ref, state };
                if self.closed.contains(&neighbour_key) {
                    continue;
                }

                let neighbour_pos = if neighbour_ref == self.end {
                    self.end_pos
                } else if let Some((l, r)) = nm.get_portal_points(link) {
                    (l + r) * 0.5
                } else {
                    nm.node_position(neighbour_ref).unwrap_or(current_info.pos)
                };

                // Any-angle shortcut: try to skip straight to the grandparent if it sees the
                // neighbour directly.
                let mut parent_key = entry.key;
                let mut parent_pos = current_info.pos;
                let mut parent_detached = false;
                if self.options.contains(FindPathOptions::ANY_ANGLE) {
                    if let Some(grandparent_key) = current_info.parent {
                        if let Some(grandparent_info) = self.nodes.get(&grandparent_key) {
                            let hit = raycast::raycast(nm, entry.key.node, grandparent_info.pos, neighbour_pos, filter);
                            if hit.t >= 1.0 {
                                parent_key = grandparent_key;
                                parent_pos = grandparent_info.pos;
                                parent_detached = true;
                            }
                        }
                    }
                }

                let cost = (filter.get_cost)(parent_pos, neighbour_pos, nm, self.start, entry.key.node, neighbour_ref);
                let parent_g = if parent_detached { self.nodes.get(&parent_key).map(|n| n.g).unwrap_or(current_info.g) } else { current_info.g };
                let tentative_g = parent_g + cost;

                let improve = self.nodes.get(&neighbour_key).map(|n| tentative_g < n.g).unwrap_or(true);
                if improve {
                    self.nodes.insert(neighbour_key, NodeInfo {
                        g: tentative_g,
                        pos: neighbour_pos,
                        parent: Some(parent_key),
                        parent_detached,
                    });
                    let h = if neighbour_ref == self.end { 0.0 } else { neighbour_pos.distance(self.end_pos) * HEURISTIC_SCALE };
                    self.seq += 1;
                    self.open.push(QueueEntry {
                        f: F32Key(tentative_g + h),
                        h: F32Key(h),
                        g: F32Key(tentative_g),
                        seq: self.seq,
                        key: neighbour_key,
                    });
                }
            }

            if iters >= max_iter {
                return self.status;
            }
        }

        self.status = Status::FAILURE;
        self.status
    }

    fn passes_filter(&self, nm: &NavMesh, filter: &QueryFilter, node_ref: NodeRef) -> bool {
        if let Some((tile, poly_index)) = nm.poly_of(node_ref) {
            return filter.passes(tile.polys[poly_index].flags, node_ref, nm);
        }
        if let crate::noderef::NodeRefData::OffMesh { connection_id, .. } = node_ref.unpack() {
            if let Some(conn) = nm.off_mesh_connection(connection_id) {
                return filter.passes(conn.params.flags, node_ref, nm);
            }
        }
        false
    }

    pub fn finalize(&mut self) -> NodePathResult {
        if self.status.contains(Status::SUCCESS) {
            let end_key = SearchKey { node: self.end, state: self.closed_state_for(self.end) };
            NodePathResult { status: Status::SUCCESS, path: self.reconstruct(end_key) }
        } else {
            self.finalize_partial(Vec::new())
        }
    }

    /// Accepts the best-effort path toward the lowest-heuristic node visited, prefixed by
    /// `existing_path` (refs already committed by a previous partial finalize).
    pub fn finalize_partial(&mut self, existing_path: Vec<NodeRef>) -> NodePathResult {
        let best_key = match self.last_best {
            Some(k) => k,
            None => return NodePathResult { status: Status::FAILURE, path: existing_path },
        };
        let mut path = self.reconstruct(best_key);
        let mut combined = existing_path;
        combined.append(&mut path);
        let status = if best_key.node == self.end { Status::SUCCESS } else { Status::PARTIAL_PATH };
        NodePathResult { status, path: combined }
    }

    fn closed_state_for(&self, node: NodeRef) -> u8 {
        self.closed
            .iter()
            .find(|k| k.node == node)
            .map(|k| k.state)
            .unwrap_or(0)
    }

    fn reconstruct(&self, mut key: SearchKey) -> Vec<NodeRef> {
        let mut out = vec![key.node];
        while let Some(info) = self.nodes.get(&key) {
            match info.parent {
                Some(p) => {
                    out.push(p.node);
                    key = p;
                }
                None => break,
            }
        }
        out.reverse();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::PortalSide;
    use crate::math::Aabb;
    use crate::navmesh::NavMeshParams;
    use crate::tile::{BvTree, DetailMesh, Poly, Tile, EXT_LINK};

    /// Every edge is tagged as a potential tile-boundary portal; stitching only actually links an
    /// edge when a real neighbour tile exists on that side, so marking all four is harmless for a
    /// strip that only ever grows along x.
    fn boundary_neis() -> smallvec::SmallVec<[u16; 6]> {
        smallvec::smallvec![
            EXT_LINK | PortalSide::MinusZ.as_u8() as u16,
            EXT_LINK | PortalSide::PlusX.as_u8() as u16,
            EXT_LINK | PortalSide::PlusZ.as_u8() as u16,
            EXT_LINK | PortalSide::MinusX.as_u8() as u16,
        ]
    }

    fn strip_navmesh(n: i32) -> NavMesh {
        let mut nm = NavMesh::new(NavMeshParams { origin: Vec3::ZERO, tile_width: 2.0, tile_height: 2.0 });
        for i in 0..n {
            let origin = Vec3::new(i as f32 * 2.0, 0.0, 0.0);
            let verts = vec![
                origin,
                origin + Vec3::new(2.0, 0.0, 0.0),
                origin + Vec3::new(2.0, 0.0, 2.0),
                origin + Vec3::new(0.0, 0.0, 2.0),
            ];
            let poly = Poly { verts: smallvec::smallvec![0, 1, 2, 3], neis: boundary_neis(), area: 0, flags: 1 };
            let tile = Tile {
                id: 0, sequence: 0, tile_x: i, tile_y: 0, tile_layer: 0,
                bounds: Aabb::from_points(&verts),
                vertices: verts, polys: vec![poly],
                detail_meshes: vec![DetailMesh::default()],
                detail_vertices: vec![], detail_triangles: vec![],
                bv_tree: BvTree::default(),
                cell_size: 0.5, cell_height: 0.5, walkable_height: 2.0, walkable_radius: 0.5, walkable_climb: 0.5,
            };
            nm.add_tile(tile).unwrap();
        }
        nm
    }

    #[test]
    fn finds_path_across_adjacent_tiles() {
        let nm = strip_navmesh(3);
        let start = nm.poly_node_ref(1, 0).unwrap();
        let end = nm.poly_node_ref(3, 0).unwrap();
        let mut scratch = Scratch::default();
        let res = find_node_path(&nm, &mut scratch, start, end, Vec3::new(1.0, 0.0, 1.0), Vec3::new(5.0, 0.0, 1.0), &QueryFilter::default());
        assert_eq!(res.status, Status::SUCCESS);
        assert_eq!(res.path.first().copied(), Some(start));
        assert_eq!(res.path.last().copied(), Some(end));
    }

    #[test]
    fn deterministic_across_runs() {
        let nm = strip_navmesh(3);
        let start = nm.poly_node_ref(1, 0).unwrap();
        let end = nm.poly_node_ref(3, 0).unwrap();
        let mut scratch = Scratch::default();
        let r1 = find_node_path(&nm, &mut scratch, start, end, Vec3::new(1.0, 0.0, 1.0), Vec3::new(5.0, 0.0, 1.0), &QueryFilter::default());
        let r2 = find_node_path(&nm, &mut scratch, start, end, Vec3::new(1.0, 0.0, 1.0), Vec3::new(5.0, 0.0, 1.0), &QueryFilter::default());
        assert_eq!(r1.path, r2.path);
    }
}
