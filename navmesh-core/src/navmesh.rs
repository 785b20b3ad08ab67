//! The navmesh graph: the set of live tiles, the node/link pools, and the off-mesh connection
//! registry. Owns tile insertion/removal with cross-tile link stitching.

use std::collections::HashMap;

use glam::Vec3;
use tracing::{instrument, trace, warn};

use crate::error::NavMeshError;
use crate::link::{Link, PortalSide, SIDE_INTERNAL};
use crate::math::Aabb;
use crate::noderef::{NodeKind, NodeRef, NodeRefData};
use crate::offmesh::{Attachment, OffMeshConnection, OffMeshConnectionParams, OffMeshDirection};
use crate::pool::Pool;
use crate::tile::{Tile, EXT_LINK};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum NodeKindData {
    Poly { tile_id: u32, poly_index: u32 },
    OffMesh { connection_id: u32, side: bool },
}

struct Node {
    kind: NodeKindData,
    position: Vec3,
    links: Vec<u32>,
}

struct TileEntry {
    tile: Tile,
    /// `poly_node_slots[i]` is the node-pool slot backing polygon `i` of this tile.
    poly_node_slots: Vec<u32>,
}

struct OffMeshEntry {
    connection: OffMeshConnection,
    /// Node-pool slot backing the off-mesh node, once attached.
    node_slot: Option<u32>,
}

#[derive(Clone, Copy, Debug)]
pub struct NavMeshParams {
    pub origin: Vec3,
    pub tile_width: f32,
    pub tile_height: f32,
}

pub struct NavMesh {
    params: NavMeshParams,
    nodes: Pool<Node>,
    links: Pool<Link>,
    tiles: HashMap<u32, TileEntry>,
    tile_ids_by_column: HashMap<(i32, i32), Vec<u32>>,
    off_mesh: HashMap<u32, OffMeshEntry>,
    next_tile_id: u32,
    next_sequence: u64,
    next_off_mesh_id: u32,
}

impl NavMesh {
    pub fn new(params: NavMeshParams) -> Self {
        Self {
            params,
            nodes: Pool::new(true),
            links: Pool::new(false),
            tiles: HashMap::new(),
            tile_ids_by_column: HashMap::new(),
            off_mesh: HashMap::new(),
            next_tile_id: 1,
            next_sequence: 0,
            next_off_mesh_id: 1,
        }
    }

    pub fn params(&self) -> NavMeshParams {
        self.params
    }

    // ---- lookups used by the query engine ----

    pub fn tile(&self, id: u32) -> Option<&Tile> {
        self.tiles.get(&id).map(|e| &e.tile)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values().map(|e| &e.tile)
    }

    pub fn tile_ids_at_column(&self, x: i32, y: i32) -> &[u32] {
        self.tile_ids_by_column.get(&(x, y)).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn tile_coords_overlapping(&self, bounds: &Aabb) -> Vec<(i32, i32)> {
        let min_x = ((bounds.min.x - self.params.origin.x) / self.params.tile_width).floor() as i32;
        let max_x = ((bounds.max.x - self.params.origin.x) / self.params.tile_width).floor() as i32;
        let min_y = ((bounds.min.z - self.params.origin.z) / self.params.tile_height).floor() as i32;
        let max_y = ((bounds.max.z - self.params.origin.z) / self.params.tile_height).floor() as i32;
        let mut out = Vec::new();
        for x in min_x..=max_x {
            for y in min_y..=max_y {
                out.push((x, y));
            }
        }
        out
    }

    pub fn is_valid_node_ref(&self, r: NodeRef) -> bool {
        self.resolve_slot(r).is_some()
    }

    pub fn node_position(&self, r: NodeRef) -> Option<Vec3> {
        let slot = self.resolve_slot(r)?;
        self.nodes.get(slot).map(|n| n.position)
    }

    pub fn node_links(&self, r: NodeRef) -> &[u32] {
        self.resolve_slot(r)
            .and_then(|slot| self.nodes.get(slot))
            .map(|n| n.links.as_slice())
            .unwrap_or(&[])
    }

    pub fn link(&self, link_idx: u32) -> Option<&Link> {
        self.links.get(link_idx)
    }

    pub fn poly_of(&self, r: NodeRef) -> Option<(&Tile, usize)> {
        match r.unpack() {
            NodeRefData::Poly { tile_id, poly_index, .. } => {
                let entry = self.tiles.get(&tile_id)?;
                Some((&entry.tile, poly_index as usize))
            }
            NodeRefData::OffMesh { .. } => None,
        }
    }

    pub fn off_mesh_connection(&self, connection_id: u32) -> Option<&OffMeshConnection> {
        self.off_mesh.get(&connection_id).map(|e| &e.connection)
    }

    /// The current, correctly salted ref for a tile's polygon. Returns `None` if the tile or
    /// polygon index is unknown (it cannot be stale by construction: it's read fresh from the
    /// live tile table).
    pub fn poly_node_ref(&self, tile_id: u32, poly_index: usize) -> Option<NodeRef> {
        let entry = self.tiles.get(&tile_id)?;
        let slot = *entry.poly_node_slots.get(poly_index)?;
        Some(self.node_ref_of_slot(slot))
    }

    pub fn off_mesh_cost_override(&self, r: NodeRef) -> Option<f32> {
        if let NodeRefData::OffMesh { connection_id, .. } = r.unpack() {
            self.off_mesh.get(&connection_id)?.connection.params.cost_override
        } else {
            None
        }
    }

    fn resolve_slot(&self, r: NodeRef) -> Option<u32> {
        match r.unpack() {
            NodeRefData::Poly { tile_id, poly_index, salt } => {
                let entry = self.tiles.get(&tile_id)?;
                let slot = *entry.poly_node_slots.get(poly_index as usize)?;
                (self.nodes.salt(slot)? == salt).then_some(slot)
            }
            NodeRefData::OffMesh { connection_id, salt, .. } => {
                let entry = self.off_mesh.get(&connection_id)?;
                let slot = entry.node_slot?;
                (self.nodes.salt(slot)? == salt).then_some(slot)
            }
        }
    }

    fn node_ref_of_slot(&self, slot: u32) -> NodeRef {
        let node = self.nodes.get(slot).expect("node_ref_of_slot on empty slot");
        let salt = self.nodes.salt(slot).unwrap_or(0);
        match node.kind {
            NodeKindData::Poly { tile_id, poly_index } => NodeRef::pack_poly(tile_id, poly_index, salt),
            NodeKindData::OffMesh { connection_id, side } => NodeRef::pack_offmesh(connection_id, side, salt),
        }
    }

    // ---- portal points ----

    /// Returns the world-space `(left, right)` endpoints of the portal a link crosses.
    pub fn get_portal_points(&self, link: &Link) -> Option<(Vec3, Vec3)> {
        match (link.from.kind(), link.to.kind()) {
            (NodeKind::Poly, NodeKind::Poly) => {
                let (tile, poly_idx) = self.poly_of(link.from)?;
                let poly = &tile.polys[poly_idx];
                let n = poly.vertex_count();
                let a = tile.vertices[poly.verts[link.edge as usize % n] as usize];
                let b = tile.vertices[poly.verts[(link.edge as usize + 1) % n] as usize];
                if link.bmin == 0 && link.bmax == 255 {
                    Some((a, b))
                } else {
                    let tmin = link.bmin as f32 / 255.0;
                    let tmax = link.bmax as f32 / 255.0;
                    Some((a + (b - a) * tmin, a + (b - a) * tmax))
                }
            }
            _ => {
                // Either side touches an off-mesh node: the portal degenerates to a point at
                // whichever endpoint belongs to the off-mesh connection.
                let off_ref = if link.from.kind() == NodeKind::OffMesh { link.from } else { link.to };
                let p = self.node_position(off_ref)?;
                Some((p, p))
            }
        }
    }

    // ---- mutation: tiles ----

    #[instrument(skip(self, tile), fields(x = tile.tile_x, y = tile.tile_y, layer = tile.tile_layer))]
    pub fn add_tile(&mut self, mut tile: Tile) -> Result<u32, NavMeshError> {
        let key = (tile.tile_x, tile.tile_y);
        if self.tile_ids_by_column.get(&key).into_iter().flatten().any(|&id| {
            self.tiles.get(&id).map(|e| e.tile.tile_layer == tile.tile_layer).unwrap_or(false)
        }) {
            return Err(NavMeshError::TileAlreadyExists { x: tile.tile_x, y: tile.tile_y, layer: tile.tile_layer });
        }

        let tile_id = self.next_tile_id;
        self.next_tile_id += 1;
        tile.id = tile_id;
        tile.sequence = self.next_sequence;
        self.next_sequence += 1;

        let poly_count = tile.polys.len();
        let mut poly_node_slots = Vec::with_capacity(poly_count);
        for poly_index in 0..poly_count {
            let poly = &tile.polys[poly_index];
            let verts = tile.poly_verts_world(poly);
            let centroid = verts.iter().copied().fold(Vec3::ZERO, |a, b| a + b) / verts.len() as f32;
            let (slot, _salt) = self.nodes.allocate(Node {
                kind: NodeKindData::Poly { tile_id, poly_index: poly_index as u32 },
                position: centroid,
                links: Vec::new(),
            });
            poly_node_slots.push(slot);
        }

        // Internal links, both directions.
        for poly_index in 0..poly_count {
            let neis = tile.polys[poly_index].neis.clone();
            for (edge, &nei) in neis.iter().enumerate() {
                if nei == 0 || (nei & EXT_LINK) != 0 {
                    continue;
                }
                let other_index = (nei - 1) as usize;
                let from_ref = self.node_ref_of_slot(poly_node_slots[poly_index]);
                let to_ref = self.node_ref_of_slot(poly_node_slots[other_index]);
                self.add_link(poly_node_slots[poly_index], Link::internal(from_ref, to_ref, edge as u8));
            }
        }

        self.tiles.insert(tile_id, TileEntry { tile, poly_node_slots });
        self.tile_ids_by_column.entry(key).or_default().push(tile_id);

        self.stitch_external_links_for_tile(tile_id);
        self.retry_off_mesh_attachments();

        trace!(tile_id, "tile added");
        Ok(tile_id)
    }

    #[instrument(skip(self))]
    pub fn remove_tile(&mut self, x: i32, y: i32, layer: i32) -> Result<Tile, NavMeshError> {
        let ids = self.tile_ids_by_column.get(&(x, y)).cloned().unwrap_or_default();
        let tile_id = ids
            .into_iter()
            .find(|&id| self.tiles.get(&id).map(|e| e.tile.tile_layer == layer).unwrap_or(false))
            .ok_or(NavMeshError::TileNotFound { x, y, layer })?;

        // Detach off-mesh connections anchored to this tile.
        let affected: Vec<u32> = self
            .off_mesh
            .iter()
            .filter(|(_, e)| {
                [e.connection.attachment.start_poly_node, e.connection.attachment.end_poly_node]
                    .into_iter()
                    .flatten()
                    .any(|r| matches!(r.unpack(), NodeRefData::Poly { tile_id: t, .. } if t == tile_id))
            })
            .map(|(&id, _)| id)
            .collect();
        for id in affected {
            self.detach_off_mesh(id);
        }

        let entry = self.tiles.remove(&tile_id).expect("tile_id came from the index");

        // Free every link touching this tile's nodes, on both sides.
        let local_slots: Vec<u32> = entry.poly_node_slots.clone();
        for &slot in &local_slots {
            let link_indices = self.nodes.get(slot).map(|n| n.links.clone()).unwrap_or_default();
            for link_idx in link_indices {
                if let Some(link) = self.links.get(link_idx) {
                    let to_slot = self.resolve_slot(link.to);
                    if let Some(to_slot) = to_slot {
                        if let Some(to_node) = self.nodes.get_mut(to_slot) {
                            to_node.links.retain(|&l| l != link_idx);
                        }
                    }
                }
                self.links.free(link_idx);
            }
        }
        // Also free any remote links that pointed into this tile (the other side's accounting
        // above only cleans links owned by this tile's own node list; external links created by
        // the neighbour also live in the neighbour's node list and must be pruned there).
        let local_refs: std::collections::HashSet<NodeRef> =
            local_slots.iter().map(|&s| self.node_ref_of_slot_checked(s)).flatten().collect();
        for other_entry in self.tiles.values() {
            for &other_slot in &other_entry.poly_node_slots {
                if let Some(node) = self.nodes.get(other_slot) {
                    let to_remove: Vec<u32> = node
                        .links
                        .iter()
                        .copied()
                        .filter(|&li| self.links.get(li).map(|l| local_refs.contains(&l.to)).unwrap_or(false))
                        .collect();
                    for li in to_remove {
                        self.links.free(li);
                    }
                }
            }
        }
        for other_entry in self.tiles.values_mut() {
            for &other_slot in &other_entry.poly_node_slots {
                if let Some(node) = self.nodes.get_mut(other_slot) {
                    node.links.retain(|&li| self.links.is_allocated(li));
                }
            }
        }

        for &slot in &local_slots {
            self.nodes.free(slot);
        }

        if let Some(v) = self.tile_ids_by_column.get_mut(&(x, y)) {
            v.retain(|&id| id != tile_id);
        }

        trace!(tile_id, "tile removed");
        Ok(entry.tile)
    }

    fn node_ref_of_slot_checked(&self, slot: u32) -> Option<NodeRef> {
        if self.nodes.get(slot).is_some() {
            Some(self.node_ref_of_slot(slot))
        } else {
            None
        }
    }

    fn add_link(&mut self, from_slot: u32, link: Link) -> u32 {
        let (idx, _) = self.links.allocate(link);
        if let Some(node) = self.nodes.get_mut(from_slot) {
            node.links.push(idx);
        }
        idx
    }

    fn stitch_external_links_for_tile(&mut self, tile_id: u32) {
        let (tile_x, tile_y, poly_count, bounds_y) = {
            let entry = &self.tiles[&tile_id];
            (entry.tile.tile_x, entry.tile.tile_y, entry.tile.polys.len(), (entry.tile.bounds.min.y, entry.tile.bounds.max.y))
        };

        for side in [PortalSide::PlusX, PortalSide::PlusZ, PortalSide::MinusX, PortalSide::MinusZ] {
            let (dx, dy) = match side {
                PortalSide::PlusX => (1, 0),
                PortalSide::PlusZ => (0, 1),
                PortalSide::MinusX => (-1, 0),
                PortalSide::MinusZ => (0, -1),
            };
            let neighbour_col = (tile_x + dx, tile_y + dy);
            let neighbour_ids: Vec<u32> = self.tile_ids_by_column.get(&neighbour_col).cloned().unwrap_or_default();

            for &nb_id in &neighbour_ids {
                if nb_id == tile_id {
                    continue;
                }
                let overlaps_vertically = self
                    .tiles
                    .get(&nb_id)
                    .map(|e| e.tile.bounds.min.y <= bounds_y.1 && e.tile.bounds.max.y >= bounds_y.0)
                    .unwrap_or(false);
                if !overlaps_vertically {
                    continue;
                }
                self.stitch_tile_pair(tile_id, nb_id, side, poly_count);
            }
        }
    }

    fn stitch_tile_pair(&mut self, tile_id: u32, nb_id: u32, side: PortalSide, poly_count: usize) {
        let opposite = side.opposite();
        for poly_index in 0..poly_count {
            let maybe = self.external_edges_of(tile_id, poly_index, side);
            for (edge, a, b) in maybe {
                let nb_poly_count = self.tiles[&nb_id].tile.polys.len();
                for nb_poly_index in 0..nb_poly_count {
                    let nb_edges = self.external_edges_of(nb_id, nb_poly_index, opposite);
                    for (nb_edge, c, d) in nb_edges {
                        if let Some((bmin, bmax)) = overlap_interval(side, a, b, c, d) {
                            let from_ref = self.node_ref_of_slot(self.tiles[&tile_id].poly_node_slots[poly_index]);
                            let to_ref = self.node_ref_of_slot(self.tiles[&nb_id].poly_node_slots[nb_poly_index]);
                            let from_slot = self.tiles[&tile_id].poly_node_slots[poly_index];
                            self.add_link(from_slot, Link::external(from_ref, to_ref, edge as u8, side, bmin, bmax));

                            let (rbmin, rbmax) = overlap_interval(opposite, c, d, a, b).unwrap_or((bmin, bmax));
                            let to_slot = self.tiles[&nb_id].poly_node_slots[nb_poly_index];
                            self.add_link(to_slot, Link::external(to_ref, from_ref, nb_edge as u8, opposite, rbmin, rbmax));
                        }
                    }
                }
            }
        }
    }

    fn external_edges_of(&self, tile_id: u32, poly_index: usize, side: PortalSide) -> Vec<(usize, Vec3, Vec3)> {
        let entry = &self.tiles[&tile_id];
        let poly = &entry.tile.polys[poly_index];
        let n = poly.vertex_count();
        let mut out = Vec::new();
        for edge in 0..n {
            let nei = poly.neis[edge];
            if nei & EXT_LINK == 0 {
                continue;
            }
            let edge_side = (nei & !EXT_LINK) as u8;
            if PortalSide::from_u8(edge_side) != Some(side) {
                continue;
            }
            let a = entry.tile.vertices[poly.verts[edge] as usize];
            let b = entry.tile.vertices[poly.verts[(edge + 1) % n] as usize];
            out.push((edge, a, b));
        }
        out
    }

    // ---- mutation: off-mesh connections ----

    #[instrument(skip(self, params))]
    pub fn add_off_mesh_connection(&mut self, params: OffMeshConnectionParams) -> u32 {
        let id = self.next_off_mesh_id;
        self.next_off_mesh_id += 1;
        self.off_mesh.insert(id, OffMeshEntry {
            connection: OffMeshConnection { id, params, attachment: Attachment::default() },
            node_slot: None,
        });
        self.try_attach_off_mesh(id);
        id
    }

    pub fn remove_off_mesh_connection(&mut self, id: u32) -> Result<(), NavMeshError> {
        if !self.off_mesh.contains_key(&id) {
            return Err(NavMeshError::InvalidOffMeshConnectionId(id));
        }
        self.detach_off_mesh(id);
        self.off_mesh.remove(&id);
        Ok(())
    }

    fn retry_off_mesh_attachments(&mut self) {
        let unattached: Vec<u32> = self
            .off_mesh
            .iter()
            .filter(|(_, e)| !e.connection.attachment.is_attached())
            .map(|(&id, _)| id)
            .collect();
        for id in unattached {
            self.try_attach_off_mesh(id);
        }
    }

    fn try_attach_off_mesh(&mut self, id: u32) {
        let params = match self.off_mesh.get(&id) {
            Some(e) => e.connection.params,
            None => return,
        };

        let filter = crate::filter::QueryFilter::default();
        let vertical = self.tiles.values().next().map(|e| e.tile.walkable_climb).unwrap_or(params.radius);
        let half_extents = Vec3::new(params.radius, vertical, params.radius);

        let start_hit = crate::query::nearest::find_nearest_poly(&*self, params.start, half_extents, &filter).node_ref;
        let start_ref = match start_hit {
            Some(r) => r,
            None => return,
        };
        let end_ref = if params.direction == OffMeshDirection::Bidirectional {
            match crate::query::nearest::find_nearest_poly(&*self, params.end, half_extents, &filter).node_ref {
                Some(r) => Some(r),
                None => return,
            }
        } else {
            crate::query::nearest::find_nearest_poly(&*self, params.end, half_extents, &filter).node_ref
        };

        let off_pos = (params.start + params.end) * 0.5;
        let (slot, _salt) = self.nodes.allocate(Node {
            kind: NodeKindData::OffMesh { connection_id: id, side: false },
            position: off_pos,
            links: Vec::new(),
        });
        let off_ref = self.node_ref_of_slot(slot);

        let start_slot = match self.resolve_slot(start_ref) {
            Some(s) => s,
            None => return,
        };
        self.add_link(start_slot, Link { from: start_ref, to: off_ref, edge: 0, side: SIDE_INTERNAL, bmin: 0, bmax: 255 });

        let mut end_attached = None;
        if let Some(end_ref) = end_ref {
            self.add_link(slot, Link { from: off_ref, to: end_ref, edge: 0, side: SIDE_INTERNAL, bmin: 0, bmax: 255 });
            end_attached = Some(end_ref);
            if params.direction == OffMeshDirection::Bidirectional {
                if let Some(end_slot) = self.resolve_slot(end_ref) {
                    self.add_link(end_slot, Link { from: end_ref, to: off_ref, edge: 1, side: SIDE_INTERNAL, bmin: 0, bmax: 255 });
                }
                self.add_link(slot, Link { from: off_ref, to: start_ref, edge: 1, side: SIDE_INTERNAL, bmin: 0, bmax: 255 });
            }
        }

        if let Some(entry) = self.off_mesh.get_mut(&id) {
            entry.node_slot = Some(slot);
            entry.connection.attachment = Attachment {
                start_poly_node: Some(start_ref),
                end_poly_node: end_attached,
                off_mesh_node: Some(off_ref),
            };
        }
    }

    fn detach_off_mesh(&mut self, id: u32) {
        let slot = match self.off_mesh.get(&id).and_then(|e| e.node_slot) {
            Some(s) => s,
            None => return,
        };
        let off_ref = self.node_ref_of_slot(slot);
        let link_indices = self.nodes.get(slot).map(|n| n.links.clone()).unwrap_or_default();
        for li in link_indices {
            self.links.free(li);
        }
        // Remove the links that point *into* the off-mesh node from whichever polys hold them.
        for entry in self.tiles.values() {
            for &poly_slot in &entry.poly_node_slots {
                if let Some(node) = self.nodes.get(poly_slot) {
                    let to_remove: Vec<u32> = node
                        .links
                        .iter()
                        .copied()
                        .filter(|&li| self.links.get(li).map(|l| l.to == off_ref).unwrap_or(false))
                        .collect();
                    for li in to_remove {
                        self.links.free(li);
                    }
                }
            }
        }
        for entry in self.tiles.values_mut() {
            for &poly_slot in &entry.poly_node_slots {
                if let Some(node) = self.nodes.get_mut(poly_slot) {
                    node.links.retain(|&li| self.links.is_allocated(li));
                }
            }
        }
        self.nodes.free(slot);
        if let Some(entry) = self.off_mesh.get_mut(&id) {
            entry.node_slot = None;
            entry.connection.attachment = Attachment::default();
        }
        warn!(connection_id = id, "off-mesh connection detached");
    }

}

/// Computes the overlap sub-range, expressed as `bmin..bmax` over `[0,255]` parameterizing edge
/// `a..b`, between edge `a..b` and edge `c..d` along the axis the given side faces across.
fn overlap_interval(side: PortalSide, a: Vec3, b: Vec3, c: Vec3, d: Vec3) -> Option<(u8, u8)> {
    let axis = match side {
        PortalSide::PlusX | PortalSide::MinusX => 2, // edges run along z
        PortalSide::PlusZ | PortalSide::MinusZ => 0, // edges run along x
    };
    let av = [a.x, a.y, a.z][axis];
    let bv = [b.x, b.y, b.z][axis];
    let cv = [c.x, c.y, c.z][axis];
    let dv = [d.x, d.y, d.z][axis];

    let (from_min, from_max) = (av.min(bv), av.max(bv));
    let (to_min, to_max) = (cv.min(dv), cv.max(dv));
    let overlap_min = from_min.max(to_min);
    let overlap_max = from_max.min(to_max);
    if overlap_max <= overlap_min {
        return None;
    }

    let span = bv - av;
    if span.abs() < 1e-6 {
        return Some((0, 255));
    }
    let t1 = (overlap_min - av) / span;
    let t2 = (overlap_max - av) / span;
    let (t_lo, t_hi) = (t1.min(t2).clamp(0.0, 1.0), t1.max(t2).clamp(0.0, 1.0));
    Some(((t_lo * 255.0) as u8, (t_hi * 255.0) as u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{BvTree, DetailMesh, Poly};

    fn quad_tile(tile_x: i32, tile_y: i32, origin: Vec3) -> Tile {
        let verts = vec![
            origin,
            origin + Vec3::new(2.0, 0.0, 0.0),
            origin + Vec3::new(2.0, 0.0, 2.0),
            origin + Vec3::new(0.0, 0.0, 2.0),
        ];
        let poly = Poly {
            verts: smallvec::smallvec![0, 1, 2, 3],
            neis: smallvec::smallvec![0, 0, 0, 0],
            area: 0,
            flags: 1,
        };
        Tile {
            id: 0,
            sequence: 0,
            tile_x,
            tile_y,
            tile_layer: 0,
            bounds: Aabb::from_points(&verts),
            vertices: verts,
            polys: vec![poly],
            detail_meshes: vec![DetailMesh::default()],
            detail_vertices: vec![],
            detail_triangles: vec![],
            bv_tree: BvTree::default(),
            cell_size: 0.5,
            cell_height: 0.5,
            walkable_height: 2.0,
            walkable_radius: 0.5,
            walkable_climb: 0.5,
        }
    }

    #[test]
    fn add_then_remove_tile_invalidates_refs() {
        let mut nm = NavMesh::new(NavMeshParams { origin: Vec3::ZERO, tile_width: 2.0, tile_height: 2.0 });
        let tile_id = nm.add_tile(quad_tile(0, 0, Vec3::ZERO)).unwrap();
        let r = nm.node_ref_of_slot(nm.tiles[&tile_id].poly_node_slots[0]);
        assert!(nm.is_valid_node_ref(r));
        nm.remove_tile(0, 0, 0).unwrap();
        assert!(!nm.is_valid_node_ref(r));
    }

    #[test]
    fn readding_tile_yields_different_salt() {
        let mut nm = NavMesh::new(NavMeshParams { origin: Vec3::ZERO, tile_width: 2.0, tile_height: 2.0 });
        nm.add_tile(quad_tile(0, 0, Vec3::ZERO)).unwrap();
        let first_slot = nm.tiles.values().next().unwrap().poly_node_slots[0];
        let first_ref = nm.node_ref_of_slot(first_slot);
        nm.remove_tile(0, 0, 0).unwrap();
        nm.add_tile(quad_tile(0, 0, Vec3::ZERO)).unwrap();
        let second_slot = nm.tiles.values().next().unwrap().poly_node_slots[0];
        let second_ref = nm.node_ref_of_slot(second_slot);
        assert_ne!(first_ref, second_ref);
    }

    #[test]
    fn duplicate_tile_coordinate_is_rejected() {
        let mut nm = NavMesh::new(NavMeshParams { origin: Vec3::ZERO, tile_width: 2.0, tile_height: 2.0 });
        nm.add_tile(quad_tile(0, 0, Vec3::ZERO)).unwrap();
        let err = nm.add_tile(quad_tile(0, 0, Vec3::ZERO)).unwrap_err();
        assert!(matches!(err, NavMeshError::TileAlreadyExists { .. }));
    }

    #[test]
    fn off_mesh_connection_attaches_between_two_tiles() {
        let mut nm = NavMesh::new(NavMeshParams { origin: Vec3::ZERO, tile_width: 2.0, tile_height: 2.0 });
        nm.add_tile(quad_tile(0, 0, Vec3::ZERO)).unwrap();
        nm.add_tile(quad_tile(10, 10, Vec3::new(20.0, 0.0, 20.0))).unwrap();
        let id = nm.add_off_mesh_connection(OffMeshConnectionParams {
            start: Vec3::new(1.0, 0.0, 1.0),
            end: Vec3::new(21.0, 0.0, 21.0),
            radius: 0.5,
            direction: OffMeshDirection::StartToEnd,
            flags: 1,
            area: 0,
            cost_override: None,
        });
        let conn = nm.off_mesh_connection(id).unwrap();
        assert!(conn.attachment.is_attached());
        assert!(conn.attachment.end_poly_node.is_some());
    }

    #[test]
    fn start_to_end_offmesh_retries_once_end_tile_arrives() {
        let mut nm = NavMesh::new(NavMeshParams { origin: Vec3::ZERO, tile_width: 2.0, tile_height: 2.0 });
        nm.add_tile(quad_tile(0, 0, Vec3::ZERO)).unwrap();
        let id = nm.add_off_mesh_connection(OffMeshConnectionParams {
            start: Vec3::new(1.0, 0.0, 1.0),
            end: Vec3::new(21.0, 0.0, 21.0),
            radius: 0.5,
            direction: OffMeshDirection::StartToEnd,
            flags: 1,
            area: 0,
            cost_override: None,
        });

        // End platform isn't tiled yet: the connection must stay unattached and thus eligible
        // for retry, not get stuck reporting attached with no onward polygon.
        let conn = nm.off_mesh_connection(id).unwrap();
        assert!(!conn.attachment.is_attached());
        assert!(conn.attachment.end_poly_node.is_none());

        nm.add_tile(quad_tile(10, 10, Vec3::new(20.0, 0.0, 20.0))).unwrap();

        let conn = nm.off_mesh_connection(id).unwrap();
        assert!(conn.attachment.is_attached());
        assert!(conn.attachment.end_poly_node.is_some());
    }
}
