//! Identity and coordinate value types shared by every chunkmeta crate.

use serde::{Deserialize, Serialize};

/// Chunk edge length in blocks.
pub const CHUNK_SIZE: i32 = 16;

/// Legacy vertical range `[0, 255]`, used for worlds with no explicit range.
pub const LEGACY_MIN_Y: i32 = 0;
pub const LEGACY_MAX_Y: i32 = 255;

/// Compact per-process world identifier, persisted next to the world's durable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldId(pub u16);

/// Durable identifier of a registered consumer plugin. Scopes every storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PluginId(pub u16);

impl std::fmt::Display for WorldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for PluginId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one chunk column: `(world, chunk_x, chunk_z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub world: WorldId,
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub fn new(world: WorldId, x: i32, z: i32) -> Self {
        Self { world, x, z }
    }

    pub fn xzw(&self) -> XzwCoord {
        XzwCoord {
            x: self.x,
            z: self.z,
            world: self.world,
        }
    }
}

/// Chunk key in `(x, z, world)` order, as enumerated by storage engines and
/// used to group fallback-tracker entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct XzwCoord {
    pub x: i32,
    pub z: i32,
    pub world: WorldId,
}

impl XzwCoord {
    pub fn new(x: i32, z: i32, world: WorldId) -> Self {
        Self { x, z, world }
    }

    pub fn chunk_coord(&self) -> ChunkCoord {
        ChunkCoord::new(self.world, self.x, self.z)
    }
}

impl From<ChunkCoord> for XzwCoord {
    fn from(coord: ChunkCoord) -> Self {
        coord.xzw()
    }
}

/// Absolute block position inside one world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockLocation {
    pub world: WorldId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockLocation {
    pub fn new(world: WorldId, x: i32, y: i32, z: i32) -> Self {
        Self { world, x, y, z }
    }

    /// The chunk column containing this block.
    pub fn chunk(&self) -> ChunkCoord {
        ChunkCoord::new(
            self.world,
            self.x.div_euclid(CHUNK_SIZE),
            self.z.div_euclid(CHUNK_SIZE),
        )
    }

    /// Position relative to the containing chunk.
    pub fn local(&self) -> LocalPos {
        LocalPos {
            x: self.x.rem_euclid(CHUNK_SIZE) as u8,
            y: self.y,
            z: self.z.rem_euclid(CHUNK_SIZE) as u8,
        }
    }
}

/// Intra-chunk position. `x`/`z` are in `[0, 15]`, `y` is the absolute level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalPos {
    pub x: u8,
    pub y: i32,
    pub z: u8,
}

impl LocalPos {
    /// Absolute location of this position within `chunk`.
    pub fn to_location(self, chunk: ChunkCoord) -> BlockLocation {
        BlockLocation::new(
            chunk.world,
            chunk.x * CHUNK_SIZE + self.x as i32,
            self.y,
            chunk.z * CHUNK_SIZE + self.z as i32,
        )
    }
}

/// Inclusive vertical range valid for a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightRange {
    pub min_y: i32,
    pub max_y: i32,
}

impl HeightRange {
    pub fn new(min_y: i32, max_y: i32) -> Self {
        Self { min_y, max_y }
    }

    pub fn contains(&self, y: i32) -> bool {
        y >= self.min_y && y <= self.max_y
    }
}

impl Default for HeightRange {
    fn default() -> Self {
        Self::new(LEGACY_MIN_Y, LEGACY_MAX_Y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_of_positive_block() {
        let loc = BlockLocation::new(WorldId(3), 5, 64, 9);
        assert_eq!(loc.chunk(), ChunkCoord::new(WorldId(3), 0, 0));
        assert_eq!(loc.local(), LocalPos { x: 5, y: 64, z: 9 });
    }

    #[test]
    fn chunk_of_negative_block() {
        // -1 belongs to chunk -1 at local 15, not chunk 0
        let loc = BlockLocation::new(WorldId(0), -1, 10, -17);
        assert_eq!(loc.chunk(), ChunkCoord::new(WorldId(0), -1, -2));
        assert_eq!(loc.local(), LocalPos { x: 15, y: 10, z: 15 });
    }

    #[test]
    fn local_back_to_location() {
        let loc = BlockLocation::new(WorldId(1), -33, 200, 47);
        assert_eq!(loc.local().to_location(loc.chunk()), loc);
    }

    #[test]
    fn xzw_matches_chunk() {
        let coord = ChunkCoord::new(WorldId(2), -4, 7);
        let xzw = XzwCoord::from(coord);
        assert_eq!(xzw, XzwCoord::new(-4, 7, WorldId(2)));
        assert_eq!(xzw.chunk_coord(), coord);
    }

    #[test]
    fn legacy_height_range() {
        let range = HeightRange::default();
        assert!(range.contains(0));
        assert!(range.contains(255));
        assert!(!range.contains(-1));
        assert!(!range.contains(256));
    }
}
