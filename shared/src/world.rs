//! Sparse chunked voxel world.
//!
//! The world is a map from integer chunk coordinates to dense 16^3 byte
//! grids. A voxel value of 0 is empty air; 1..=127 index a palette color.
//! Only the tick loop mutates the world; everything else reads.

use crate::math::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Chunk edge length in voxels.
pub const CHUNK_SIZE: i32 = 16;
/// Voxels per chunk.
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as usize;

/// Integer chunk coordinate.
pub type ChunkCoord = (i32, i32, i32);
/// Integer voxel coordinate.
pub type BlockCoord = (i32, i32, i32);

/// Dense 16^3 voxel grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    voxels: Vec<u8>,
}

impl Chunk {
    pub fn empty() -> Self {
        Self {
            voxels: vec![0; CHUNK_VOLUME],
        }
    }

    /// Builds a chunk from raw voxel bytes. Returns None unless exactly
    /// 16^3 bytes are supplied.
    pub fn from_bytes(voxels: Vec<u8>) -> Option<Self> {
        if voxels.len() == CHUNK_VOLUME {
            Some(Self { voxels })
        } else {
            None
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.voxels
    }

    fn index(x: i32, y: i32, z: i32) -> usize {
        ((y * CHUNK_SIZE + z) * CHUNK_SIZE + x) as usize
    }

    /// Voxel at chunk-local coordinates (each in 0..16).
    pub fn get(&self, x: i32, y: i32, z: i32) -> u8 {
        self.voxels[Self::index(x, y, z)]
    }

    pub fn set(&mut self, x: i32, y: i32, z: i32, value: u8) {
        self.voxels[Self::index(x, y, z)] = value;
    }

    /// FNV-1a hash of the voxel contents, used for cheap divergence checks
    /// on the connectionless channel.
    pub fn content_hash(&self) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for &b in &self.voxels {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }
}

/// Result of a reach ray march: the first solid cell hit and the last empty
/// cell the ray crossed before it (the placement target).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayHit {
    pub cell: BlockCoord,
    pub previous: BlockCoord,
}

/// The voxel world: loaded chunks, named spawn points, and bounds derived
/// from the loaded chunk set.
#[derive(Debug, Clone, Default)]
pub struct World {
    chunks: HashMap<ChunkCoord, Chunk>,
    spawns: HashMap<String, Vec3>,
    min_block: BlockCoord,
    max_block: BlockCoord,
}

fn chunk_of(x: i32, y: i32, z: i32) -> ChunkCoord {
    (
        x.div_euclid(CHUNK_SIZE),
        y.div_euclid(CHUNK_SIZE),
        z.div_euclid(CHUNK_SIZE),
    )
}

/// Chunk coordinate owning a voxel coordinate.
pub fn chunk_containing(cell: BlockCoord) -> ChunkCoord {
    chunk_of(cell.0, cell.1, cell.2)
}

fn local_of(x: i32, y: i32, z: i32) -> (i32, i32, i32) {
    (
        x.rem_euclid(CHUNK_SIZE),
        y.rem_euclid(CHUNK_SIZE),
        z.rem_euclid(CHUNK_SIZE),
    )
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a flat test world: a solid floor at y = -1 spanning
    /// `radius_chunks` chunks in every horizontal direction, air above.
    pub fn flat(radius_chunks: i32) -> Self {
        let mut world = Self::new();
        for cx in -radius_chunks..=radius_chunks {
            for cz in -radius_chunks..=radius_chunks {
                let mut chunk = Chunk::empty();
                for x in 0..CHUNK_SIZE {
                    for z in 0..CHUNK_SIZE {
                        chunk.set(x, CHUNK_SIZE - 1, z, 1);
                    }
                }
                world.insert_chunk((cx, -1, cz), chunk);
                world.insert_chunk((cx, 0, cz), Chunk::empty());
            }
        }
        world.add_spawn("alpha", Vec3::new(-8.0, 0.0, -8.0));
        world.add_spawn("bravo", Vec3::new(8.0, 0.0, 8.0));
        world
    }

    pub fn insert_chunk(&mut self, coord: ChunkCoord, chunk: Chunk) {
        self.chunks.insert(coord, chunk);
        self.recompute_bounds();
    }

    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    pub fn chunks(&self) -> impl Iterator<Item = (&ChunkCoord, &Chunk)> {
        self.chunks.iter()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn add_spawn(&mut self, name: &str, position: Vec3) {
        self.spawns.insert(name.to_string(), position);
    }

    pub fn spawn(&self, name: &str) -> Option<Vec3> {
        self.spawns.get(name).copied()
    }

    pub fn spawns(&self) -> impl Iterator<Item = (&String, &Vec3)> {
        self.spawns.iter()
    }

    /// Owned copy of the spawn-point table. Spawns are fixed after load, so
    /// connection tasks can hold this without touching the live world.
    pub fn spawn_table(&self) -> HashMap<String, Vec3> {
        self.spawns.clone()
    }

    fn recompute_bounds(&mut self) {
        let mut min = (i32::MAX, i32::MAX, i32::MAX);
        let mut max = (i32::MIN, i32::MIN, i32::MIN);
        for &(cx, cy, cz) in self.chunks.keys() {
            min.0 = min.0.min(cx * CHUNK_SIZE);
            min.1 = min.1.min(cy * CHUNK_SIZE);
            min.2 = min.2.min(cz * CHUNK_SIZE);
            max.0 = max.0.max((cx + 1) * CHUNK_SIZE);
            max.1 = max.1.max((cy + 1) * CHUNK_SIZE);
            max.2 = max.2.max((cz + 1) * CHUNK_SIZE);
        }
        self.min_block = min;
        self.max_block = max;
    }

    /// Lowest loaded voxel coordinate on each axis.
    pub fn min_block(&self) -> BlockCoord {
        self.min_block
    }

    /// One past the highest loaded voxel coordinate on each axis.
    pub fn max_block(&self) -> BlockCoord {
        self.max_block
    }

    /// Voxel value at world coordinates; outside loaded chunks reads as air.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> u8 {
        let (lx, ly, lz) = local_of(x, y, z);
        match self.chunks.get(&chunk_of(x, y, z)) {
            Some(chunk) => chunk.get(lx, ly, lz),
            None => 0,
        }
    }

    pub fn is_solid(&self, x: i32, y: i32, z: i32) -> bool {
        self.get_block(x, y, z) != 0
    }

    /// Writes a voxel. Returns true if a loaded chunk was modified and the
    /// value actually changed; writes outside loaded chunks are rejected.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, value: u8) -> bool {
        let (lx, ly, lz) = local_of(x, y, z);
        match self.chunks.get_mut(&chunk_of(x, y, z)) {
            Some(chunk) => {
                if chunk.get(lx, ly, lz) == value {
                    false
                } else {
                    chunk.set(lx, ly, lz, value);
                    true
                }
            }
            None => false,
        }
    }

    /// True when the position has left the loaded world by more than
    /// `margin` on any axis (the safety net that kills fallen players).
    pub fn outside_bounds(&self, position: &Vec3, margin: f32) -> bool {
        if self.chunks.is_empty() {
            return false;
        }
        position.x < self.min_block.0 as f32 - margin
            || position.x > self.max_block.0 as f32 + margin
            || position.z < self.min_block.2 as f32 - margin
            || position.z > self.max_block.2 as f32 + margin
            || position.y < self.min_block.1 as f32 - margin
            || position.y > self.max_block.1 as f32 + margin
    }

    /// Marches a ray through the grid and returns the first solid cell,
    /// together with the empty cell crossed just before it.
    pub fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit> {
        let dir = direction.normalize();
        if dir.magnitude() == 0.0 {
            return None;
        }
        let step = 0.05_f32;
        let mut travelled = 0.0_f32;
        let mut previous = (
            origin.x.floor() as i32,
            origin.y.floor() as i32,
            origin.z.floor() as i32,
        );
        while travelled <= max_distance {
            let p = origin.add(&dir.scale(travelled));
            let cell = (p.x.floor() as i32, p.y.floor() as i32, p.z.floor() as i32);
            if self.is_solid(cell.0, cell.1, cell.2) {
                return Some(RayHit { cell, previous });
            }
            previous = cell;
            travelled += step;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_roundtrip() {
        let mut chunk = Chunk::empty();
        chunk.set(3, 7, 11, 42);
        assert_eq!(chunk.get(3, 7, 11), 42);
        assert_eq!(chunk.get(0, 0, 0), 0);
    }

    #[test]
    fn test_chunk_from_bytes_rejects_bad_length() {
        assert!(Chunk::from_bytes(vec![0; 17]).is_none());
        assert!(Chunk::from_bytes(vec![0; CHUNK_VOLUME]).is_some());
    }

    #[test]
    fn test_content_hash_changes_with_contents() {
        let mut a = Chunk::empty();
        let b = Chunk::empty();
        assert_eq!(a.content_hash(), b.content_hash());
        a.set(0, 0, 0, 1);
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_world_block_addressing_across_chunks() {
        let mut world = World::new();
        world.insert_chunk((0, 0, 0), Chunk::empty());
        world.insert_chunk((-1, 0, 0), Chunk::empty());

        assert!(world.set_block(5, 5, 5, 7));
        assert_eq!(world.get_block(5, 5, 5), 7);

        // Negative coordinates land in the (-1, 0, 0) chunk.
        assert!(world.set_block(-1, 0, 0, 9));
        assert_eq!(world.get_block(-1, 0, 0), 9);
    }

    #[test]
    fn test_set_block_outside_loaded_chunks_is_rejected() {
        let mut world = World::new();
        world.insert_chunk((0, 0, 0), Chunk::empty());
        assert!(!world.set_block(100, 0, 0, 1));
        assert_eq!(world.get_block(100, 0, 0), 0);
    }

    #[test]
    fn test_set_block_same_value_reports_unchanged() {
        let mut world = World::new();
        world.insert_chunk((0, 0, 0), Chunk::empty());
        assert!(world.set_block(1, 1, 1, 3));
        assert!(!world.set_block(1, 1, 1, 3));
    }

    #[test]
    fn test_bounds_follow_loaded_chunks() {
        let mut world = World::new();
        world.insert_chunk((0, 0, 0), Chunk::empty());
        world.insert_chunk((1, 0, 0), Chunk::empty());
        assert_eq!(world.min_block(), (0, 0, 0));
        assert_eq!(world.max_block(), (32, 16, 16));
    }

    #[test]
    fn test_outside_bounds_margin() {
        let world = World::flat(1);
        assert!(!world.outside_bounds(&Vec3::new(0.0, 1.0, 0.0), 4.0));
        assert!(world.outside_bounds(&Vec3::new(0.0, -40.0, 0.0), 4.0));
        assert!(world.outside_bounds(&Vec3::new(100.0, 1.0, 0.0), 4.0));
    }

    #[test]
    fn test_raycast_hits_floor() {
        let world = World::flat(1);
        let hit = world
            .raycast(Vec3::new(0.5, 2.5, 0.5), Vec3::new(0.0, -1.0, 0.0), 10.0)
            .expect("ray should hit the floor");
        assert_eq!(hit.cell.1, -1);
        assert_eq!(hit.previous.1, 0);
    }

    #[test]
    fn test_raycast_miss_returns_none() {
        let world = World::flat(1);
        let up = world.raycast(Vec3::new(0.5, 2.5, 0.5), Vec3::new(0.0, 1.0, 0.0), 10.0);
        assert!(up.is_none());
    }
}
