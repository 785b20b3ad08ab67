//! Dynamic tile scheduler: thin orchestration around [`NavMesh::add_tile`]/[`NavMesh::remove_tile`]
//! that tracks which tiles obstacles are currently standing in, enqueues the ones whose occupancy
//! changed, and throttles how often any one tile is actually rebuilt.
//!
//! The scheduler never builds geometry itself — it calls back into a [`TileRebuildSource`]
//! supplied by the embedder, which is expected to wrap the build-pipeline contract (static
//! geometry plus the triangles contributed by current occupants).

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use glam::Vec3;
use tracing::{instrument, warn};

use crate::math::Aabb;
use crate::navmesh::NavMesh;
use crate::tile::Tile;

pub type TileKey = (i32, i32);

/// Tunables for [`DynamicTileScheduler::process_queue`]: how long a tile must sit untouched
/// before it's eligible to rebuild again, and how many rebuilds one call is allowed to attempt.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    pub throttle: Duration,
    pub max_rebuilds_per_tick: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { throttle: Duration::from_millis(250), max_rebuilds_per_tick: 4 }
    }
}

/// Produces a replacement tile for `(x, y, layer)` given the current set of occupant obstacles
/// (`pose`, `radius`) standing in it. Returns `None` if the build pipeline failed, in which case
/// the scheduler logs and leaves the previous tile (if any) in place — matching `RebuildFailed`.
pub trait TileRebuildSource {
    fn rebuild_tile(&mut self, x: i32, y: i32, layer: i32, occupants: &[(Vec3, f32)]) -> Option<Tile>;
}

#[derive(Clone, Copy, Debug)]
struct ObstacleState {
    pose: Vec3,
    radius: f32,
    awake: bool,
}

/// Tracks obstacle→tile residency and the rebuild queue. Does not own a [`NavMesh`]; callers pass
/// one in to [`DynamicTileScheduler::process_queue`] each time they want to drain ready rebuilds.
pub struct DynamicTileScheduler {
    origin: Vec3,
    tile_width: f32,
    tile_height: f32,
    config: SchedulerConfig,
    obstacles: HashMap<u32, ObstacleState>,
    obstacle_tiles: HashMap<u32, HashSet<TileKey>>,
    tile_occupants: HashMap<TileKey, HashSet<u32>>,
    last_rebuild: HashMap<TileKey, Instant>,
    queue: VecDeque<TileKey>,
    queued: HashSet<TileKey>,
    next_obstacle_id: u32,
}

impl DynamicTileScheduler {
    pub fn new(origin: Vec3, tile_width: f32, tile_height: f32, config: SchedulerConfig) -> Self {
        Self {
            origin,
            tile_width,
            tile_height,
            config,
            obstacles: HashMap::new(),
            obstacle_tiles: HashMap::new(),
            tile_occupants: HashMap::new(),
            last_rebuild: HashMap::new(),
            queue: VecDeque::new(),
            queued: HashSet::new(),
            next_obstacle_id: 1,
        }
    }

    /// Registers a new obstacle at `pose` and enqueues the tiles it starts out occupying (if
    /// `awake`). Returns the obstacle id used by [`update_obstacle`](Self::update_obstacle) and
    /// [`remove_obstacle`](Self::remove_obstacle).
    pub fn add_obstacle(&mut self, pose: Vec3, radius: f32, awake: bool) -> u32 {
        let id = self.next_obstacle_id;
        self.next_obstacle_id += 1;
        self.obstacles.insert(id, ObstacleState { pose, radius, awake });

        let tiles = self.tiles_touched(pose, pose, radius);
        if awake {
            for &key in &tiles {
                self.enqueue(key);
            }
        }
        for &key in &tiles {
            self.tile_occupants.entry(key).or_default().insert(id);
        }
        self.obstacle_tiles.insert(id, tiles);
        id
    }

    /// Removes an obstacle, enqueuing every tile it was standing in so the static geometry gets
    /// rebuilt without it.
    pub fn remove_obstacle(&mut self, id: u32) {
        self.obstacles.remove(&id);
        if let Some(tiles) = self.obstacle_tiles.remove(&id) {
            for key in tiles {
                if let Some(occ) = self.tile_occupants.get_mut(&key) {
                    occ.remove(&id);
                }
                self.enqueue(key);
            }
        }
    }

    /// Advances one obstacle to `new_pose`, computing the swept AABB between its last and current
    /// position (expanded by `radius`) and diffing the tile columns it overlaps against the ones
    /// it overlapped last call. Tiles the obstacle has left are always enqueued; tiles it now
    /// overlaps are enqueued only while `awake` is true (a sleeping obstacle already baked into a
    /// tile does not force a rebuild merely by existing there).
    pub fn update_obstacle(&mut self, id: u32, new_pose: Vec3, awake: bool) {
        let (old_pose, radius) = match self.obstacles.get(&id) {
            Some(s) => (s.pose, s.radius),
            None => return,
        };

        let new_tiles = self.tiles_touched(old_pose, new_pose, radius);
        let old_tiles = self.obstacle_tiles.get(&id).cloned().unwrap_or_default();

        for key in old_tiles.difference(&new_tiles) {
            self.enqueue(*key);
            if let Some(occ) = self.tile_occupants.get_mut(key) {
                occ.remove(&id);
            }
        }
        if awake {
            for &key in &new_tiles {
                self.enqueue(key);
            }
        }
        for &key in &new_tiles {
            self.tile_occupants.entry(key).or_default().insert(id);
        }

        self.obstacle_tiles.insert(id, new_tiles);
        if let Some(state) = self.obstacles.get_mut(&id) {
            state.pose = new_pose;
            state.awake = awake;
        }
    }

    fn tiles_touched(&self, from: Vec3, to: Vec3, radius: f32) -> HashSet<TileKey> {
        let r = Vec3::splat(radius.max(0.0));
        let swept = Aabb::new(from.min(to) - r, from.max(to) + r);
        let min_x = ((swept.min.x - self.origin.x) / self.tile_width).floor() as i32;
        let max_x = ((swept.max.x - self.origin.x) / self.tile_width).floor() as i32;
        let min_y = ((swept.min.z - self.origin.z) / self.tile_height).floor() as i32;
        let max_y = ((swept.max.z - self.origin.z) / self.tile_height).floor() as i32;
        let mut out = HashSet::new();
        for x in min_x..=max_x {
            for y in min_y..=max_y {
                out.insert((x, y));
            }
        }
        out
    }

    fn enqueue(&mut self, key: TileKey) {
        if self.queued.insert(key) {
            self.queue.push_back(key);
        }
    }

    /// Current occupants of a tile as `(pose, radius)` pairs, for handing to the rebuild source.
    pub fn occupants_of(&self, key: TileKey) -> Vec<(Vec3, f32)> {
        self.tile_occupants
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.obstacles.get(id).map(|o| (o.pose, o.radius)))
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Drains the rebuild queue once: every key enqueued before this call is tried at most once,
    /// up to [`SchedulerConfig::max_rebuilds_per_tick`] actual rebuild attempts. A key still
    /// inside its throttle window is re-queued for a later call rather than dropped, and doesn't
    /// count against the per-tick cap. On success the tile is atomically removed (if present) and
    /// re-added; on a build failure the previous tile, if any, is left in place and the attempt is
    /// logged.
    #[instrument(skip(self, nm, source))]
    pub fn process_queue(&mut self, nm: &mut NavMesh, now: Instant, layer: i32, source: &mut dyn TileRebuildSource) -> usize {
        let rounds = self.queue.len();
        let mut rebuilt = 0;
        let mut attempted = 0usize;

        for _ in 0..rounds {
            if attempted >= self.config.max_rebuilds_per_tick {
                break;
            }
            let key = match self.queue.pop_front() {
                Some(k) => k,
                None => break,
            };

            let ready = self.last_rebuild.get(&key).map(|&t| now.duration_since(t) >= self.config.throttle).unwrap_or(true);
            if !ready {
                self.queue.push_back(key);
                continue;
            }
            self.queued.remove(&key);
            attempted += 1;

            let occupants = self.occupants_of(key);
            match source.rebuild_tile(key.0, key.1, layer, &occupants) {
                Some(new_tile) => {
                    let _ = nm.remove_tile(key.0, key.1, layer);
                    if let Err(err) = nm.add_tile(new_tile) {
                        warn!(x = key.0, y = key.1, layer, %err, "rebuilt tile rejected by navmesh");
                    } else {
                        rebuilt += 1;
                    }
                    self.last_rebuild.insert(key, now);
                }
                None => {
                    warn!(x = key.0, y = key.1, layer, "tile rebuild failed, stale tile retained");
                    self.last_rebuild.insert(key, now);
                }
            }
        }

        rebuilt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Aabb;
    use crate::navmesh::NavMeshParams;
    use crate::tile::{BvTree, DetailMesh, Poly};

    fn flat_tile(x: i32, y: i32, size: f32) -> Tile {
        let origin = Vec3::new(x as f32 * size, 0.0, y as f32 * size);
        let verts = vec![
            origin,
            origin + Vec3::new(size, 0.0, 0.0),
            origin + Vec3::new(size, 0.0, size),
            origin + Vec3::new(0.0, 0.0, size),
        ];
        let poly = Poly { verts: smallvec::smallvec![0, 1, 2, 3], neis: smallvec::smallvec![0, 0, 0, 0], area: 0, flags: 1 };
        Tile {
            id: 0,
            sequence: 0,
            tile_x: x,
            tile_y: y,
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

    struct StubSource {
        calls: Vec<TileKey>,
    }

    impl TileRebuildSource for StubSource {
        fn rebuild_tile(&mut self, x: i32, y: i32, layer: i32, _occupants: &[(Vec3, f32)]) -> Option<Tile> {
            self.calls.push((x, y));
            let _ = layer;
            Some(flat_tile(x, y, 2.0))
        }
    }

    #[test]
    fn moving_obstacle_enqueues_entered_and_left_tiles() {
        let mut nm = NavMesh::new(NavMeshParams { origin: Vec3::ZERO, tile_width: 2.0, tile_height: 2.0 });
        let mut sched = DynamicTileScheduler::new(
            Vec3::ZERO,
            2.0,
            2.0,
            SchedulerConfig { throttle: Duration::from_millis(0), max_rebuilds_per_tick: 4 },
        );
        let id = sched.add_obstacle(Vec3::new(1.0, 0.0, 1.0), 0.1, true);
        assert_eq!(sched.pending_count(), 1);

        // Drain the initial enqueue from registration before observing the move.
        let mut source = StubSource { calls: Vec::new() };
        sched.process_queue(&mut nm, Instant::now(), 0, &mut source);
        assert_eq!(sched.pending_count(), 0);

        sched.update_obstacle(id, Vec3::new(3.0, 0.0, 1.0), true);
        // The obstacle left tile (0,0) and entered tile (1,0): both must be queued.
        assert_eq!(sched.pending_count(), 2);
    }

    #[test]
    fn throttled_rebuild_is_requeued_not_dropped() {
        let mut nm = NavMesh::new(NavMeshParams { origin: Vec3::ZERO, tile_width: 2.0, tile_height: 2.0 });
        let mut sched = DynamicTileScheduler::new(
            Vec3::ZERO,
            2.0,
            2.0,
            SchedulerConfig { throttle: Duration::from_secs(3600), max_rebuilds_per_tick: 4 },
        );
        sched.add_obstacle(Vec3::new(1.0, 0.0, 1.0), 0.1, true);
        let mut source = StubSource { calls: Vec::new() };

        let now = Instant::now();
        let rebuilt = sched.process_queue(&mut nm, now, 0, &mut source);
        assert_eq!(rebuilt, 1);
        assert_eq!(source.calls, vec![(0, 0)]);

        // Obstacle moves within the same tile; throttle window has not elapsed, so the second
        // drain must re-queue rather than call the source again.
        sched.update_obstacle(1, Vec3::new(1.2, 0.0, 1.2), true);
        let rebuilt_again = sched.process_queue(&mut nm, now, 0, &mut source);
        assert_eq!(rebuilt_again, 0);
        assert_eq!(source.calls.len(), 1);
        assert_eq!(sched.pending_count(), 1);
    }

    #[test]
    fn failed_rebuild_leaves_stale_tile_and_logs() {
        struct FailingSource;
        impl TileRebuildSource for FailingSource {
            fn rebuild_tile(&mut self, _x: i32, _y: i32, _layer: i32, _occupants: &[(Vec3, f32)]) -> Option<Tile> {
                None
            }
        }

        let mut nm = NavMesh::new(NavMeshParams { origin: Vec3::ZERO, tile_width: 2.0, tile_height: 2.0 });
        nm.add_tile(flat_tile(0, 0, 2.0)).unwrap();
        let mut sched = DynamicTileScheduler::new(
            Vec3::ZERO,
            2.0,
            2.0,
            SchedulerConfig { throttle: Duration::from_millis(0), max_rebuilds_per_tick: 4 },
        );
        sched.add_obstacle(Vec3::new(1.0, 0.0, 1.0), 0.1, true);

        let mut source = FailingSource;
        let rebuilt = sched.process_queue(&mut nm, Instant::now(), 0, &mut source);
        assert_eq!(rebuilt, 0);
        assert!(nm.tile_ids_at_column(0, 0).len() == 1);
    }
}
