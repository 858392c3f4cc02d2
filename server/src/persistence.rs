//! World snapshot persistence.
//!
//! Fixed binary layout: magic and version, the spawn-point table, then every
//! chunk as its coordinate plus the raw 16^3 voxel bytes. Called at startup
//! load and on admin-triggered saves; the simulation core only ever sees a
//! `World` value in memory.

use shared::world::{Chunk, CHUNK_VOLUME};
use shared::{Vec3, World};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

const MAGIC: &[u8; 4] = b"VXWF";
const FORMAT_VERSION: u32 = 1;

const MAX_NAME_LEN: usize = 256;
const MAX_CHUNKS: u32 = 1_000_000;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a world file (bad magic)")]
    BadMagic,
    #[error("unsupported world format version {0}")]
    UnsupportedVersion(u32),
    #[error("corrupt world file: {0}")]
    Corrupt(&'static str),
}

fn write_u32(w: &mut impl Write, value: u32) -> Result<(), PersistenceError> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_i32(w: &mut impl Write, value: i32) -> Result<(), PersistenceError> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_f32(w: &mut impl Write, value: f32) -> Result<(), PersistenceError> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn read_u32(r: &mut impl Read) -> Result<u32, PersistenceError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32(r: &mut impl Read) -> Result<i32, PersistenceError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f32(r: &mut impl Read) -> Result<f32, PersistenceError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

/// Writes the world snapshot to `path`.
pub fn save(world: &World, path: &Path) -> Result<(), PersistenceError> {
    let mut w = BufWriter::new(File::create(path)?);

    w.write_all(MAGIC)?;
    write_u32(&mut w, FORMAT_VERSION)?;

    let spawns: Vec<_> = world.spawns().collect();
    write_u32(&mut w, spawns.len() as u32)?;
    for (name, position) in spawns {
        write_u32(&mut w, name.len() as u32)?;
        w.write_all(name.as_bytes())?;
        write_f32(&mut w, position.x)?;
        write_f32(&mut w, position.y)?;
        write_f32(&mut w, position.z)?;
    }

    write_u32(&mut w, world.chunk_count() as u32)?;
    for (coord, chunk) in world.chunks() {
        write_i32(&mut w, coord.0)?;
        write_i32(&mut w, coord.1)?;
        write_i32(&mut w, coord.2)?;
        w.write_all(chunk.as_bytes())?;
    }

    w.flush()?;
    Ok(())
}

/// Reads a world snapshot from `path`.
pub fn load(path: &Path) -> Result<World, PersistenceError> {
    let mut r = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(PersistenceError::BadMagic);
    }
    let version = read_u32(&mut r)?;
    if version != FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion(version));
    }

    let mut world = World::new();

    let spawn_count = read_u32(&mut r)?;
    for _ in 0..spawn_count {
        let name_len = read_u32(&mut r)? as usize;
        if name_len == 0 || name_len > MAX_NAME_LEN {
            return Err(PersistenceError::Corrupt("spawn name length"));
        }
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        let name =
            String::from_utf8(name).map_err(|_| PersistenceError::Corrupt("spawn name utf-8"))?;
        let position = Vec3::new(read_f32(&mut r)?, read_f32(&mut r)?, read_f32(&mut r)?);
        world.add_spawn(&name, position);
    }

    let chunk_count = read_u32(&mut r)?;
    if chunk_count > MAX_CHUNKS {
        return Err(PersistenceError::Corrupt("chunk count"));
    }
    for _ in 0..chunk_count {
        let coord = (read_i32(&mut r)?, read_i32(&mut r)?, read_i32(&mut r)?);
        let mut voxels = vec![0u8; CHUNK_VOLUME];
        r.read_exact(&mut voxels)?;
        let chunk =
            Chunk::from_bytes(voxels).ok_or(PersistenceError::Corrupt("chunk payload"))?;
        world.insert_chunk(coord, chunk);
    }

    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("voxelfront-{}-{}.world", tag, std::process::id()))
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut world = World::flat(1);
        world.set_block(3, 2, 1, 42);
        let path = temp_path("roundtrip");

        save(&world, &path).unwrap();
        let loaded = load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.chunk_count(), world.chunk_count());
        assert_eq!(loaded.get_block(3, 2, 1), 42);
        assert_eq!(loaded.get_block(0, -1, 0), 1);
        assert_eq!(loaded.spawn("alpha"), world.spawn("alpha"));
        assert_eq!(loaded.spawn("bravo"), world.spawn("bravo"));
        assert_eq!(loaded.min_block(), world.min_block());
        assert_eq!(loaded.max_block(), world.max_block());
    }

    #[test]
    fn test_load_rejects_bad_magic() {
        let path = temp_path("badmagic");
        std::fs::write(&path, b"NOPE....").unwrap();

        let result = load(&path);
        std::fs::remove_file(&path).ok();
        match result {
            Err(PersistenceError::BadMagic) => {}
            other => panic!("expected BadMagic, got {:?}", other),
        }
    }

    #[test]
    fn test_load_rejects_future_version() {
        let path = temp_path("badversion");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&99u32.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        let result = load(&path);
        std::fs::remove_file(&path).ok();
        match result {
            Err(PersistenceError::UnsupportedVersion(99)) => {}
            other => panic!("expected UnsupportedVersion, got {:?}", other),
        }
    }

    #[test]
    fn test_load_rejects_truncated_chunk() {
        let world = World::flat(0);
        let path = temp_path("truncated");
        save(&world, &path).unwrap();

        // Chop the file mid-chunk.
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 100]).unwrap();

        let result = load(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
