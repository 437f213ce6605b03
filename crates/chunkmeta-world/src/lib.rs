//! World identity, coordinates and the persistent key/value layer.

pub mod coords;
pub mod error;
pub mod id_table;
pub mod storage;
pub mod world_ids;

pub use coords::{
    BlockLocation, ChunkCoord, HeightRange, LocalPos, PluginId, WorldId, XzwCoord, CHUNK_SIZE,
};
pub use error::StorageError;
pub use id_table::{IdStore, IdTable};
pub use storage::LevelDbProvider;
pub use world_ids::{HostWorld, WorldIdRegistry};
