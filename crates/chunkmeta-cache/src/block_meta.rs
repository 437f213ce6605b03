//! Chunk meta holding one record per block.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chunkmeta_world::{BlockLocation, ChunkCoord, HeightRange, LocalPos, PluginId, StorageError};

use crate::engine::BlockStorageEngine;
use crate::error::ChunkMetaError;
use crate::meta::ChunkMeta;
use crate::record::BlockDataObject;

/// Write state of one cached record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Matches storage.
    Clean,
    /// Must be upserted on the next flush.
    Pending,
}

struct StoredRecord<D> {
    record: Arc<D>,
    state: RecordState,
}

pub struct BlockBasedChunkMeta<D: BlockDataObject> {
    plugin: PluginId,
    coord: ChunkCoord,
    engine: Arc<dyn BlockStorageEngine<D>>,
    height: HeightRange,
    records: HashMap<LocalPos, StoredRecord<D>>,
    /// Positions removed since the last flush; deleted from storage on flush.
    removed: HashSet<LocalPos>,
    dirty: bool,
}

impl<D: BlockDataObject> BlockBasedChunkMeta<D> {
    pub fn new(plugin: PluginId, coord: ChunkCoord, engine: Arc<dyn BlockStorageEngine<D>>) -> Self {
        Self {
            plugin,
            coord,
            engine,
            height: HeightRange::default(),
            records: HashMap::new(),
            removed: HashSet::new(),
            dirty: false,
        }
    }

    /// Valid y-levels for writes. Defaults to the legacy range.
    pub fn with_height_range(mut self, height: HeightRange) -> Self {
        self.height = height;
        self
    }

    fn check_chunk(&self, location: BlockLocation) -> Result<LocalPos, ChunkMetaError> {
        if location.chunk() != self.coord {
            return Err(ChunkMetaError::InvalidArgument(format!(
                "location ({},{},{}) is outside chunk ({},{})",
                location.x, location.y, location.z, self.coord.x, self.coord.z
            )));
        }
        Ok(location.local())
    }

    pub fn get(&self, location: BlockLocation) -> Option<Arc<D>> {
        if location.chunk() != self.coord {
            return None;
        }
        self.get_local(location.local())
    }

    pub fn get_local(&self, pos: LocalPos) -> Option<Arc<D>> {
        self.records.get(&pos).map(|r| r.record.clone())
    }

    /// Insert or overwrite the record at its own location. Returns the replaced record.
    ///
    /// `is_bulk_load` marks data restored from storage: it is stored clean and
    /// does not dirty the chunk. Other writes must lie within the height range.
    pub fn put(&mut self, record: Arc<D>, is_bulk_load: bool) -> Result<Option<Arc<D>>, ChunkMetaError> {
        let location = record.location();
        let pos = self.check_chunk(location)?;
        if !is_bulk_load && !self.height.contains(location.y) {
            return Err(ChunkMetaError::HeightOutOfRange {
                y: location.y,
                min: self.height.min_y,
                max: self.height.max_y,
            });
        }
        // A put supersedes any delete still waiting for the next flush
        self.removed.remove(&pos);
        let state = if is_bulk_load {
            RecordState::Clean
        } else {
            self.dirty = true;
            RecordState::Pending
        };
        Ok(self
            .records
            .insert(pos, StoredRecord { record, state })
            .map(|old| old.record))
    }

    /// Remove the record at `location`, scheduling a storage delete.
    pub fn remove(&mut self, location: BlockLocation) -> Option<Arc<D>> {
        if location.chunk() != self.coord {
            return None;
        }
        let pos = location.local();
        let stored = self.records.remove(&pos)?;
        self.removed.insert(pos);
        self.dirty = true;
        Some(stored.record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn record_state(&self, location: BlockLocation) -> Option<RecordState> {
        if location.chunk() != self.coord {
            return None;
        }
        self.records.get(&location.local()).map(|r| r.state)
    }

    /// All records currently cached for this chunk.
    pub fn records(&self) -> impl Iterator<Item = &Arc<D>> + '_ {
        self.records.values().map(|r| &r.record)
    }
}

impl<D: BlockDataObject> ChunkMeta for BlockBasedChunkMeta<D> {
    fn chunk_coord(&self) -> ChunkCoord {
        self.coord
    }

    fn plugin_id(&self) -> PluginId {
        self.plugin
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn populate(&mut self) -> Result<usize, StorageError> {
        let loaded = self.engine.load_chunk(self.plugin, self.coord)?;
        let count = loaded.len();
        for record in loaded {
            let location = record.location();
            if location.chunk() != self.coord {
                return Err(StorageError::Backend(format!(
                    "stored record at ({},{},{}) does not belong to chunk ({},{})",
                    location.x, location.y, location.z, self.coord.x, self.coord.z
                )));
            }
            self.records.insert(
                location.local(),
                StoredRecord {
                    record: Arc::new(record),
                    state: RecordState::Clean,
                },
            );
        }
        Ok(count)
    }

    fn persist(&mut self) -> Result<(), StorageError> {
        let pending: Vec<LocalPos> = self
            .records
            .iter()
            .filter(|(_, r)| r.state == RecordState::Pending)
            .map(|(pos, _)| *pos)
            .collect();
        for pos in pending {
            if let Some(stored) = self.records.get_mut(&pos) {
                self.engine
                    .persist(&stored.record, self.coord.world, self.plugin)?;
                stored.state = RecordState::Clean;
            }
        }

        let removed: Vec<LocalPos> = self.removed.iter().copied().collect();
        for pos in removed {
            self.engine.delete(pos.to_location(self.coord), self.plugin)?;
            self.removed.remove(&pos);
        }

        self.dirty = false;
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
