//! Per-plugin, chunk-scoped metadata cache.
//!
//! Consumer plugins register with the [`GlobalChunkMetaManager`], then work
//! through a [`ChunkMetaView`] or [`BlockBasedChunkMetaView`]. Host lifecycle
//! events reach the manager through [`chunkmeta_host_api::ChunkLifecycle`].

pub mod block_meta;
pub mod block_view;
pub mod engine;
pub mod error;
pub mod loader;
pub mod manager;
pub mod meta;
pub mod record;
pub mod stats;
pub mod tracker;
pub mod view;

pub use block_meta::{BlockBasedChunkMeta, RecordState};
pub use block_view::BlockBasedChunkMetaView;
pub use engine::{BlockStorageEngine, LevelDbBlockEngine, MemoryBlockEngine};
pub use error::{ChunkMetaError, Result};
pub use loader::ChunkLoader;
pub use manager::{FlushSummary, GlobalChunkMetaManager, ManagerOptions, PluginHooks};
pub use meta::{ChunkMeta, ChunkMetaHandle, ChunkProducer};
pub use record::BlockDataObject;
pub use stats::{LoadStatistics, LoadStatsSnapshot};
pub use tracker::SingleBlockTracker;
pub use view::ChunkMetaView;
