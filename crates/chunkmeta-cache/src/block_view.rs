//! Block-level view: per-block get/put/remove on top of a plugin's chunk
//! metas, with a fallback tracker for writes to chunks that are not resident.
//!
//! Resolution order for every location-based operation:
//!
//! 1. validate the y-level against the world's height range;
//! 2. if the chunk is resident, use its chunk meta (hydrating it on first use);
//! 3. otherwise use the tracker, then storage directly.
//!
//! Tracker entries are merged into a chunk meta when it is hydrated, and
//! written straight to storage when the plugin is disabled.

use std::sync::{Arc, Weak};

use chunkmeta_world::{BlockLocation, ChunkCoord, PluginId};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::block_meta::BlockBasedChunkMeta;
use crate::engine::BlockStorageEngine;
use crate::error::{ChunkMetaError, Result};
use crate::manager::{FlushSummary, GlobalChunkMetaManager, PluginHooks};
use crate::meta::{ChunkMeta, ChunkMetaHandle};
use crate::record::BlockDataObject;
use crate::tracker::SingleBlockTracker;
use crate::view::ChunkMetaView;

// ─── Shared state ───────────────────────────────────────────────────────────

/// State shared between the view and the manager's lifecycle hooks.
struct BlockViewShared<D: BlockDataObject> {
    plugin: PluginId,
    engine: Arc<dyn BlockStorageEngine<D>>,
    tracker: Mutex<SingleBlockTracker<D>>,
    manager: Weak<GlobalChunkMetaManager>,
}

impl<D: BlockDataObject> BlockViewShared<D> {
    /// Move tracked records into a chunk meta. They are written to storage
    /// first and inserted clean; if that write fails they stay pending.
    fn merge(&self, meta: &mut BlockBasedChunkMeta<D>, records: Vec<Arc<D>>) {
        if records.is_empty() {
            return;
        }
        let chunk = meta.chunk_coord();
        let persisted = match self.engine.persist_batch(&records, self.plugin) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to persist {} tracked records for chunk ({},{}), keeping them pending: {e}",
                    records.len(),
                    chunk.x,
                    chunk.z
                );
                false
            }
        };
        let count = records.len();
        for record in records {
            if let Err(e) = meta.put(record, persisted) {
                error!("Tracked record does not belong to chunk ({},{}): {e}", chunk.x, chunk.z);
            }
        }
        debug!(
            "Migrated {count} tracked records into chunk ({},{}) for plugin {}",
            chunk.x, chunk.z, self.plugin
        );
        if let Some(manager) = self.manager.upgrade() {
            if let Some(stats) = manager.stats() {
                stats.record_migration(self.plugin, count);
            }
        }
    }
}

impl<D: BlockDataObject> PluginHooks for BlockViewShared<D> {
    fn post_load(&self, meta: &mut dyn ChunkMeta) -> Result<()> {
        let meta = meta
            .as_any_mut()
            .downcast_mut::<BlockBasedChunkMeta<D>>()
            .ok_or(ChunkMetaError::TypeMismatch {
                plugin: self.plugin,
            })?;
        let records = self.tracker.lock().take_chunk(meta.chunk_coord().xzw());
        self.merge(meta, records);
        Ok(())
    }

    fn disable(&self) -> Result<()> {
        let records = self.tracker.lock().drain_all();
        if records.is_empty() {
            return Ok(());
        }
        let mut result = self.engine.persist_batch(&records, self.plugin);
        if let Err(e) = &result {
            warn!(
                "Failed to persist {} tracked records for plugin {}, retrying: {e}",
                records.len(),
                self.plugin
            );
            result = self.engine.persist_batch(&records, self.plugin);
        }
        match result {
            Ok(()) => {
                info!(
                    "Persisted {} tracked records for plugin {} on disable",
                    records.len(),
                    self.plugin
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to persist {} tracked records for plugin {} on disable, keeping them tracked: {e}",
                    records.len(),
                    self.plugin
                );
                let mut tracker = self.tracker.lock();
                for record in records {
                    // Anything written since the drain is newer
                    if tracker.get_block(record.location()).is_none() {
                        tracker.put_block(record);
                    }
                }
                Err(e.into())
            }
        }
    }
}

// ─── View ───────────────────────────────────────────────────────────────────

pub struct BlockBasedChunkMetaView<D: BlockDataObject> {
    view: ChunkMetaView<BlockBasedChunkMeta<D>>,
    shared: Arc<BlockViewShared<D>>,
}

impl<D: BlockDataObject> BlockBasedChunkMetaView<D> {
    /// Create the view for `plugin`.
    ///
    /// With `eager_load_all`, every chunk holding stored data is hydrated
    /// up front, at most `eager_limit` of them when the limit is non-zero.
    pub fn create(
        manager: &Arc<GlobalChunkMetaManager>,
        plugin: PluginId,
        engine: Arc<dyn BlockStorageEngine<D>>,
        eager_load_all: bool,
        eager_limit: usize,
    ) -> Result<Self> {
        let shared = Arc::new(BlockViewShared {
            plugin,
            engine: engine.clone(),
            tracker: Mutex::new(SingleBlockTracker::new()),
            manager: Arc::downgrade(manager),
        });
        let hooks: Arc<dyn PluginHooks> = shared.clone();
        let producer_engine = engine.clone();
        let worlds = manager.worlds().clone();
        let view = ChunkMetaView::create(
            manager.clone(),
            plugin,
            move |plugin, chunk| {
                let height = worlds.height_range(chunk.world).unwrap_or_default();
                BlockBasedChunkMeta::new(plugin, chunk, producer_engine.clone()).with_height_range(height)
            },
            Some(hooks),
        )?;
        let this = Self { view, shared };
        if eager_load_all {
            this.load_all(eager_limit)?;
        }
        Ok(this)
    }

    fn load_all(&self, limit: usize) -> Result<()> {
        let mut chunks = self.shared.engine.all_data_chunks(self.plugin_id())?;
        if limit > 0 && chunks.len() > limit {
            warn!(
                "Plugin {} has {} chunks with data, eagerly loading only the first {limit}",
                self.plugin_id(),
                chunks.len()
            );
            chunks.truncate(limit);
        }
        for coord in &chunks {
            self.view.compute_if_absent(coord.world, coord.x, coord.z)?;
        }
        info!(
            "Eagerly loaded {} chunks for plugin {}",
            chunks.len(),
            self.plugin_id()
        );
        Ok(())
    }

    pub fn plugin_id(&self) -> PluginId {
        self.view.plugin_id()
    }

    pub fn chunk_view(&self) -> &ChunkMetaView<BlockBasedChunkMeta<D>> {
        &self.view
    }

    fn validate_y(&self, location: BlockLocation) -> Result<()> {
        let range = self
            .view
            .manager()
            .worlds()
            .height_range(location.world)
            .ok_or(ChunkMetaError::UnknownWorld(location.world))?;
        if !range.contains(location.y) {
            return Err(ChunkMetaError::HeightOutOfRange {
                y: location.y,
                min: range.min_y,
                max: range.max_y,
            });
        }
        Ok(())
    }

    fn resident_meta(&self, chunk: ChunkCoord) -> Result<Option<ChunkMetaHandle>> {
        self.view.compute_if_loaded(chunk)
    }

    /// The record at `location`, if any. Does not load a non-resident chunk.
    pub fn get(&self, location: BlockLocation) -> Result<Option<Arc<D>>> {
        self.validate_y(location)?;
        if let Some(handle) = self.resident_meta(location.chunk())? {
            return handle.with(|meta: &mut BlockBasedChunkMeta<D>| meta.get(location));
        }
        if let Some(record) = self.shared.tracker.lock().get_block(location) {
            return Ok(Some(record));
        }
        let stored = self.shared.engine.get_for_location(
            location.x,
            location.y,
            location.z,
            location.world,
            self.plugin_id(),
        )?;
        Ok(stored.map(Arc::new))
    }

    /// Store `record` at its own location. Returns the cached record it
    /// replaced; for a non-resident chunk only the tracker is consulted.
    pub fn put(&self, record: Arc<D>) -> Result<Option<Arc<D>>> {
        let location = record.location();
        self.validate_y(location)?;
        let chunk = location.chunk();
        if let Some(handle) = self.resident_meta(chunk)? {
            return handle.with(|meta: &mut BlockBasedChunkMeta<D>| meta.put(record, false))?;
        }
        let previous = self.shared.tracker.lock().put_block(record);
        self.settle(chunk)?;
        Ok(previous)
    }

    // The chunk may have been hydrated between the residency check and the
    // tracker write. Move anything left behind into the live meta.
    fn settle(&self, chunk: ChunkCoord) -> Result<()> {
        let Some(handle) = self.view.get_chunk_meta(chunk) else {
            return Ok(());
        };
        let records = self.shared.tracker.lock().take_chunk(chunk.xzw());
        if !records.is_empty() {
            handle.with(|meta: &mut BlockBasedChunkMeta<D>| self.shared.merge(meta, records))?;
        }
        Ok(())
    }

    /// Remove whatever record is at `location`. For a non-resident chunk the
    /// stored copy is deleted as well, so later lookups cannot return it.
    pub fn remove(&self, location: BlockLocation) -> Result<Option<Arc<D>>> {
        self.validate_y(location)?;
        let chunk = location.chunk();
        if let Some(handle) = self.resident_meta(chunk)? {
            return handle.with(|meta: &mut BlockBasedChunkMeta<D>| meta.remove(location));
        }

        let plugin = self.plugin_id();
        let stored = self
            .shared
            .engine
            .get_for_location(location.x, location.y, location.z, location.world, plugin)?;
        self.shared.engine.delete(location, plugin)?;
        let tracked = self.shared.tracker.lock().remove_block(location);

        if let Some(handle) = self.view.get_chunk_meta(chunk) {
            let live = handle.with(|meta: &mut BlockBasedChunkMeta<D>| meta.remove(location))?;
            if live.is_some() {
                return Ok(live);
            }
        }
        Ok(tracked.or_else(|| stored.map(Arc::new)))
    }

    /// Remove exactly `record`. Fails with an inconsistency error, removing
    /// nothing, when the cache holds no record at that location or holds a
    /// different one.
    pub fn remove_record(&self, record: &Arc<D>) -> Result<()> {
        let location = record.location();
        self.validate_y(location)?;
        let chunk = location.chunk();

        if let Some(handle) = self.resident_meta(chunk)? {
            return handle.with(|meta: &mut BlockBasedChunkMeta<D>| -> Result<()> {
                check_identity(meta.get(location), record, location)?;
                meta.remove(location);
                Ok(())
            })?;
        }

        {
            let tracker = self.shared.tracker.lock();
            check_identity(tracker.get_block(location), record, location)?;
        }
        self.shared.engine.delete(location, self.plugin_id())?;
        let mut tracker = self.shared.tracker.lock();
        if let Some(current) = tracker.get_block(location) {
            if Arc::ptr_eq(&current, record) {
                tracker.remove_block(location);
            }
        }
        Ok(())
    }

    /// Number of records waiting in the fallback tracker.
    pub fn tracked_len(&self) -> usize {
        self.shared.tracker.lock().len()
    }

    pub fn save_all(&self) -> FlushSummary {
        self.view.save_all()
    }

    /// Persist tracked records, then flush and evict every chunk meta of this plugin.
    pub fn disable(&self) -> FlushSummary {
        self.view.disable()
    }
}

fn check_identity<D>(current: Option<Arc<D>>, wanted: &Arc<D>, location: BlockLocation) -> Result<()> {
    match current {
        Some(current) if Arc::ptr_eq(&current, wanted) => Ok(()),
        Some(_) => Err(ChunkMetaError::Inconsistency(format!(
            "record at ({},{},{}) is not the one requested for removal",
            location.x, location.y, location.z
        ))),
        None => Err(ChunkMetaError::Inconsistency(format!(
            "no cached record at ({},{},{}) to remove",
            location.x, location.y, location.z
        ))),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
