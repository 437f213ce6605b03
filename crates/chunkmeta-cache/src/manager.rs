//! Global chunk metadata manager: the single registry of live chunk metas
//! across all plugins and worlds.
//!
//! Each `(plugin, chunk)` key owns a slot with its own mutex. The slot is
//! locked for the whole of hydration, so concurrent callers for one key wait
//! for the first and observe its result, while unrelated keys never contend.
//! A slot that was torn down is marked `Vacated` before it leaves the map;
//! callers holding a stale slot retry against the map.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;

use chunkmeta_host_api::ChunkLifecycle;
use chunkmeta_world::{ChunkCoord, IdStore, IdTable, PluginId, StorageError, WorldIdRegistry};
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ChunkMetaError, Result};
use crate::loader::ChunkLoader;
use crate::meta::{ChunkMeta, ChunkMetaHandle, ChunkProducer};
use crate::stats::LoadStatistics;

const PLUGIN_NAMESPACE: &str = "plugin_ids";

// ─── Plugin hooks ───────────────────────────────────────────────────────────

/// Callbacks a view registers with the manager for its plugin.
pub trait PluginHooks: Send + Sync {
    /// Runs after a chunk meta is hydrated and before it becomes visible.
    /// An error aborts the load.
    fn post_load(&self, meta: &mut dyn ChunkMeta) -> Result<()>;

    /// Runs when the plugin is disabled, before its entries are flushed.
    /// An error means state was kept in memory; the manager calls it again
    /// on the next disable of the same plugin and at shutdown.
    fn disable(&self) -> Result<()>;
}

struct PluginEntry {
    name: String,
    producer: Option<ChunkProducer>,
    hooks: Option<Arc<dyn PluginHooks>>,
}

// ─── Slots ──────────────────────────────────────────────────────────────────

enum SlotState {
    Empty,
    Resident(ChunkMetaHandle),
    Vacated,
}

struct Slot {
    state: Mutex<SlotState>,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Empty),
        }
    }
}

type Key = (PluginId, ChunkCoord);

/// Outcome of a flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Dirty entries written successfully.
    pub flushed: usize,
    /// Entries that could not be written and remain in memory.
    pub failed: usize,
    pub evicted: usize,
}

#[derive(Default)]
pub struct ManagerOptions {
    pub load_statistics: bool,
    pub loader: Option<ChunkLoader>,
}

// ─── Manager ────────────────────────────────────────────────────────────────

pub struct GlobalChunkMetaManager {
    registry: DashMap<Key, Arc<Slot>>,
    loaded: DashSet<ChunkCoord>,
    worlds: Arc<WorldIdRegistry>,
    plugin_ids: IdTable,
    plugins: RwLock<HashMap<PluginId, PluginEntry>>,
    /// Hooks of disabled plugins whose disable hook failed.
    retired: Mutex<HashMap<PluginId, Arc<dyn PluginHooks>>>,
    loader: Option<ChunkLoader>,
    stats: Option<LoadStatistics>,
    this: Weak<GlobalChunkMetaManager>,
}

impl GlobalChunkMetaManager {
    pub fn new(
        worlds: Arc<WorldIdRegistry>,
        id_store: Arc<dyn IdStore>,
        options: ManagerOptions,
    ) -> std::result::Result<Arc<Self>, StorageError> {
        let plugin_ids = IdTable::load(PLUGIN_NAMESPACE, id_store)?;
        let ManagerOptions {
            load_statistics,
            loader,
        } = options;
        Ok(Arc::new_cyclic(|this| Self {
            registry: DashMap::new(),
            loaded: DashSet::new(),
            worlds,
            plugin_ids,
            plugins: RwLock::new(HashMap::new()),
            retired: Mutex::new(HashMap::new()),
            loader,
            stats: load_statistics.then(LoadStatistics::new),
            this: this.clone(),
        }))
    }

    pub fn worlds(&self) -> &Arc<WorldIdRegistry> {
        &self.worlds
    }

    pub fn stats(&self) -> Option<&LoadStatistics> {
        self.stats.as_ref()
    }

    // ─── Plugins ────────────────────────────────────────────────────────

    /// Enable a consumer plugin, returning its durable id.
    pub fn register_plugin(&self, name: &str) -> Result<PluginId> {
        if name.is_empty() {
            return Err(ChunkMetaError::InvalidArgument(
                "plugin name must not be empty".into(),
            ));
        }
        let id = PluginId(self.plugin_ids.resolve(name)?);
        let mut plugins = self.plugins.write();
        if plugins.contains_key(&id) {
            return Err(ChunkMetaError::InvalidArgument(format!(
                "plugin {name} is already registered"
            )));
        }
        plugins.insert(
            id,
            PluginEntry {
                name: name.to_string(),
                producer: None,
                hooks: None,
            },
        );
        info!("Registered plugin {name} as id {id}");
        Ok(id)
    }

    /// Attach the producer used for pre-warming and the plugin's lifecycle hooks.
    pub fn attach(
        &self,
        plugin: PluginId,
        producer: ChunkProducer,
        hooks: Option<Arc<dyn PluginHooks>>,
    ) -> Result<()> {
        let mut plugins = self.plugins.write();
        let entry = plugins
            .get_mut(&plugin)
            .ok_or_else(|| not_registered(plugin))?;
        entry.producer = Some(producer);
        entry.hooks = hooks;
        Ok(())
    }

    pub fn is_enabled(&self, plugin: PluginId) -> bool {
        self.plugins.read().contains_key(&plugin)
    }

    pub fn plugin_name(&self, plugin: PluginId) -> Option<String> {
        self.plugins
            .read()
            .get(&plugin)
            .map(|p| p.name.clone())
            .or_else(|| self.plugin_ids.name_of(plugin.0))
    }

    fn enabled_plugins(&self) -> Vec<PluginId> {
        let mut ids: Vec<PluginId> = self.plugins.read().keys().copied().collect();
        ids.sort();
        ids
    }

    fn hooks_for(&self, plugin: PluginId) -> Option<Arc<dyn PluginHooks>> {
        self.plugins.read().get(&plugin).and_then(|p| p.hooks.clone())
    }

    // ─── Lookup and insertion ───────────────────────────────────────────

    /// Return the entry for `(plugin, chunk)`, creating and hydrating it with
    /// `producer` if absent. The producer runs at most once per key while the
    /// entry lives; concurrent callers receive the same handle.
    pub fn compute_if_absent(
        &self,
        plugin: PluginId,
        chunk: ChunkCoord,
        producer: &ChunkProducer,
    ) -> Result<ChunkMetaHandle> {
        self.compute(plugin, chunk, producer, false)?
            .ok_or_else(|| ChunkMetaError::Inconsistency("unconditional load yielded no entry".into()))
    }

    /// Like [`compute_if_absent`](Self::compute_if_absent), but only for resident
    /// chunks: returns `None` without touching storage when the chunk is
    /// neither loaded by the host nor already cached.
    pub fn compute_if_loaded(
        &self,
        plugin: PluginId,
        chunk: ChunkCoord,
        producer: &ChunkProducer,
    ) -> Result<Option<ChunkMetaHandle>> {
        self.compute(plugin, chunk, producer, true)
    }

    fn compute(
        &self,
        plugin: PluginId,
        chunk: ChunkCoord,
        producer: &ChunkProducer,
        require_loaded: bool,
    ) -> Result<Option<ChunkMetaHandle>> {
        if !self.is_enabled(plugin) {
            return Err(not_registered(plugin));
        }
        let key = (plugin, chunk);
        loop {
            let slot = self
                .registry
                .entry(key)
                .or_insert_with(|| Arc::new(Slot::new()))
                .value()
                .clone();
            let mut state = slot.state.lock();
            match &*state {
                SlotState::Resident(handle) => return Ok(Some(handle.clone())),
                SlotState::Vacated => continue,
                SlotState::Empty => {}
            }

            // Disable may have run since the check above; its eviction pass
            // only sees slots that were in the map when it started
            if !self.is_enabled(plugin) {
                *state = SlotState::Vacated;
                self.release(&key, &slot);
                return Err(not_registered(plugin));
            }

            if require_loaded && !self.loaded.contains(&chunk) {
                *state = SlotState::Vacated;
                self.release(&key, &slot);
                return Ok(None);
            }

            return match self.hydrate(plugin, chunk, producer) {
                Ok(handle) => {
                    *state = SlotState::Resident(handle.clone());
                    Ok(Some(handle))
                }
                Err(e) => {
                    *state = SlotState::Vacated;
                    self.release(&key, &slot);
                    warn!(
                        "Failed to load chunk ({},{}) in world {} for plugin {plugin}: {e}",
                        chunk.x, chunk.z, chunk.world
                    );
                    Err(e)
                }
            };
        }
    }

    fn hydrate(
        &self,
        plugin: PluginId,
        chunk: ChunkCoord,
        producer: &ChunkProducer,
    ) -> Result<ChunkMetaHandle> {
        let started = Instant::now();
        let mut meta = producer(plugin, chunk);
        if meta.plugin_id() != plugin || meta.chunk_coord() != chunk {
            return Err(ChunkMetaError::Inconsistency(format!(
                "producer for plugin {plugin} built a meta for plugin {} at ({},{})",
                meta.plugin_id(),
                meta.chunk_coord().x,
                meta.chunk_coord().z
            )));
        }
        let records = meta.populate()?;
        if let Some(hooks) = self.hooks_for(plugin) {
            hooks.post_load(&mut *meta)?;
        }
        if let Some(stats) = &self.stats {
            stats.record_hydration(plugin, records, started.elapsed());
        }
        debug!(
            "Hydrated chunk ({},{}) in world {} for plugin {plugin}: {records} records",
            chunk.x, chunk.z, chunk.world
        );
        Ok(ChunkMetaHandle::new(meta))
    }

    /// Drop `slot` from the map unless another slot has replaced it.
    fn release(&self, key: &Key, slot: &Arc<Slot>) {
        self.registry.remove_if(key, |_, current| Arc::ptr_eq(current, slot));
    }

    /// The resident entry for `(plugin, chunk)`, without loading.
    pub fn get_chunk_meta(&self, plugin: PluginId, chunk: ChunkCoord) -> Option<ChunkMetaHandle> {
        let slot = self.registry.get(&(plugin, chunk))?.value().clone();
        let state = slot.state.lock();
        match &*state {
            SlotState::Resident(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    pub fn is_chunk_loaded(&self, chunk: ChunkCoord) -> bool {
        self.loaded.contains(&chunk)
    }

    /// Loaded by the host or holding a cached entry for `plugin`.
    pub fn is_resident(&self, plugin: PluginId, chunk: ChunkCoord) -> bool {
        self.is_chunk_loaded(chunk) || self.get_chunk_meta(plugin, chunk).is_some()
    }

    /// Number of live entries across all plugins.
    pub fn resident_count(&self) -> usize {
        self.snapshot(None)
            .iter()
            .filter(|(_, slot)| matches!(*slot.state.lock(), SlotState::Resident(_)))
            .count()
    }

    // Slots are collected before locking so no map shard is held while
    // waiting on a slot.
    fn snapshot(&self, plugin: Option<PluginId>) -> Vec<(Key, Arc<Slot>)> {
        self.registry
            .iter()
            .filter(|e| plugin.map_or(true, |p| e.key().0 == p))
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    // ─── Flushing and eviction ──────────────────────────────────────────

    /// Persist `handle` if dirty, retrying once. Returns whether it is clean.
    fn flush_with_retry(&self, handle: &ChunkMetaHandle) -> bool {
        let mut meta = handle.lock();
        if !meta.is_dirty() {
            return true;
        }
        let plugin = handle.plugin_id();
        let chunk = handle.chunk_coord();
        let first = match meta.persist() {
            Ok(()) => {
                self.count_flush(plugin, true);
                return true;
            }
            Err(e) => e,
        };
        self.count_flush(plugin, false);
        warn!(
            "Failed to flush chunk ({},{}) in world {} for plugin {plugin}, retrying: {first}",
            chunk.x, chunk.z, chunk.world
        );
        match meta.persist() {
            Ok(()) => {
                self.count_flush(plugin, true);
                true
            }
            Err(e) => {
                self.count_flush(plugin, false);
                warn!(
                    "Failed to flush chunk ({},{}) in world {} for plugin {plugin} again, keeping it in memory: {e}",
                    chunk.x, chunk.z, chunk.world
                );
                false
            }
        }
    }

    fn count_flush(&self, plugin: PluginId, ok: bool) {
        if let Some(stats) = &self.stats {
            stats.record_flush(plugin, ok);
        }
    }

    /// Flush then evict one slot. The entry stays if the flush fails.
    fn flush_and_evict(&self, key: &Key, slot: &Arc<Slot>, summary: &mut FlushSummary) {
        let mut state = slot.state.lock();
        let SlotState::Resident(handle) = &*state else {
            return;
        };
        let was_dirty = handle.lock().is_dirty();
        if !self.flush_with_retry(handle) {
            summary.failed += 1;
            return;
        }
        if was_dirty {
            summary.flushed += 1;
        }
        *state = SlotState::Vacated;
        self.release(key, slot);
        summary.evicted += 1;
        if let Some(stats) = &self.stats {
            stats.record_eviction(key.0);
        }
    }

    /// Flush every dirty entry without evicting anything.
    pub fn save_all(&self) -> FlushSummary {
        self.save(None)
    }

    /// Flush the dirty entries of one plugin without evicting them.
    pub fn save_plugin(&self, plugin: PluginId) -> FlushSummary {
        self.save(Some(plugin))
    }

    fn save(&self, plugin: Option<PluginId>) -> FlushSummary {
        let mut summary = FlushSummary::default();
        for (_, slot) in self.snapshot(plugin) {
            let handle = match &*slot.state.lock() {
                SlotState::Resident(handle) => handle.clone(),
                _ => continue,
            };
            if !handle.lock().is_dirty() {
                continue;
            }
            if self.flush_with_retry(&handle) {
                summary.flushed += 1;
            } else {
                summary.failed += 1;
            }
        }
        summary
    }

    /// Handle a chunk leaving residency: flush and evict every plugin's entry.
    pub fn unload_chunk(&self, chunk: ChunkCoord) -> FlushSummary {
        self.loaded.remove(&chunk);
        let mut summary = FlushSummary::default();
        for plugin in self.enabled_plugins() {
            let key = (plugin, chunk);
            let Some(slot) = self.registry.get(&key).map(|e| e.value().clone()) else {
                continue;
            };
            self.flush_and_evict(&key, &slot, &mut summary);
        }
        summary
    }

    /// Handle a chunk becoming resident: mark it loaded and pre-warm entries
    /// for every plugin with a producer. Returns the scheduled tasks.
    pub fn load_chunk(&self, chunk: ChunkCoord) -> Vec<JoinHandle<()>> {
        self.loaded.insert(chunk);
        let Some(loader) = &self.loader else {
            return Vec::new();
        };
        let producers: Vec<(PluginId, ChunkProducer)> = self
            .plugins
            .read()
            .iter()
            .filter_map(|(id, p)| p.producer.clone().map(|f| (*id, f)))
            .collect();

        producers
            .into_iter()
            .map(|(plugin, producer)| {
                let this = self.this.clone();
                let label = format!("chunk ({},{}) plugin {plugin}", chunk.x, chunk.z);
                loader.schedule(label, move || {
                    let Some(manager) = this.upgrade() else {
                        return;
                    };
                    // Residency is re-checked under the slot lock
                    if let Err(e) = manager.compute_if_loaded(plugin, chunk, &producer) {
                        debug!("Pre-warm of chunk ({},{}) for plugin {plugin} abandoned: {e}", chunk.x, chunk.z);
                    }
                })
            })
            .collect()
    }

    /// Disable one plugin: run its disable hook, then flush and evict all of
    /// its entries. Disabling an unknown or already disabled plugin is a no-op,
    /// except that a disable hook which failed earlier is retried.
    pub fn disable_plugin(&self, plugin: PluginId) -> FlushSummary {
        let entry = self.plugins.write().remove(&plugin);
        let hooks = match &entry {
            Some(entry) => entry.hooks.clone(),
            None => self.retired.lock().remove(&plugin),
        };
        if entry.is_none() && hooks.is_none() {
            return FlushSummary::default();
        }

        let mut summary = FlushSummary::default();
        if let Some(hooks) = hooks {
            if let Err(e) = hooks.disable() {
                warn!("Disable hook of plugin {plugin} failed, will retry: {e}");
                self.retired.lock().insert(plugin, hooks);
                summary.failed += 1;
            }
        }
        let evicted = self.evict_all(Some(plugin));
        summary.flushed += evicted.flushed;
        summary.evicted += evicted.evicted;
        summary.failed += evicted.failed;
        info!(
            "Disabled plugin {} ({plugin}): flushed {}, evicted {}, failed {}",
            entry.map(|e| e.name).unwrap_or_default(),
            summary.flushed,
            summary.evicted,
            summary.failed
        );
        summary
    }

    /// Shut down: disable every plugin, then flush and evict whatever remains.
    /// State that still cannot be written is dropped with an error.
    pub fn disable_worlds(&self) -> FlushSummary {
        if let Some(loader) = &self.loader {
            loader.close();
        }
        self.loaded.clear();

        let mut summary = FlushSummary::default();
        let mut plugins = self.enabled_plugins();
        plugins.extend(self.retired.lock().keys().copied());
        for plugin in plugins {
            let s = self.disable_plugin(plugin);
            summary.flushed += s.flushed;
            summary.evicted += s.evicted;
        }

        let rest = self.evict_all(None);
        summary.flushed += rest.flushed;
        summary.evicted += rest.evicted;
        let retired: Vec<PluginId> = self.retired.lock().drain().map(|(id, _)| id).collect();
        summary.failed = rest.failed + retired.len();
        if rest.failed > 0 {
            error!(
                "Dropping {} chunk metas that could not be saved at shutdown",
                rest.failed
            );
            self.registry.clear();
        }
        for plugin in retired {
            error!("Dropping tracked state of plugin {plugin} that could not be saved at shutdown");
        }
        info!(
            "Shutdown flush complete: flushed {}, evicted {}, lost {}",
            summary.flushed, summary.evicted, summary.failed
        );
        summary
    }

    fn evict_all(&self, plugin: Option<PluginId>) -> FlushSummary {
        let mut summary = FlushSummary::default();
        for (key, slot) in self.snapshot(plugin) {
            self.flush_and_evict(&key, &slot, &mut summary);
        }
        summary
    }
}

fn not_registered(plugin: PluginId) -> ChunkMetaError {
    ChunkMetaError::InvalidArgument(format!("plugin {plugin} is not registered"))
}

// ─── Host lifecycle ─────────────────────────────────────────────────────────

impl ChunkLifecycle for GlobalChunkMetaManager {
    fn on_chunk_load(&self, chunk: ChunkCoord) {
        self.load_chunk(chunk);
    }

    fn on_chunk_unload(&self, chunk: ChunkCoord) {
        let summary = self.unload_chunk(chunk);
        if summary.failed > 0 {
            warn!(
                "Chunk ({},{}) in world {} unloaded with {} unsaved chunk metas kept in memory",
                chunk.x, chunk.z, chunk.world, summary.failed
            );
        }
    }

    fn on_plugin_disable(&self, plugin: PluginId) {
        self.disable_plugin(plugin);
    }

    fn on_server_stopping(&self) {
        self.disable_worlds();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
