//! Durable name → compact id tables.
//!
//! Ids are handed out monotonically per namespace and written to the backing
//! store before they are returned, so a crash right after assignment can never
//! leave stored data pointing at an id that was not recorded.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::error::StorageError;
use crate::storage::{table_prefix, LevelDbProvider};

/// Persistence contract for id tables.
pub trait IdStore: Send + Sync {
    /// Every `(name, id)` pair recorded under `namespace`.
    fn load_ids(&self, namespace: &str) -> Result<Vec<(String, u16)>, StorageError>;

    /// Durably record `name → id`. Must not return before the write is stored.
    fn store_id(&self, namespace: &str, name: &str, id: u16) -> Result<(), StorageError>;
}

impl IdStore for LevelDbProvider {
    fn load_ids(&self, namespace: &str) -> Result<Vec<(String, u16)>, StorageError> {
        let prefix = table_prefix(namespace);
        let mut ids = Vec::new();
        for (key, value) in self.scan_prefix(&prefix)? {
            let name = String::from_utf8(key[prefix.len()..].to_vec()).map_err(|_| {
                StorageError::MalformedKey {
                    table: namespace.to_string(),
                    len: key.len(),
                }
            })?;
            let id: [u8; 2] = value.as_slice().try_into().map_err(|_| {
                StorageError::Backend(format!("bad id value for {name} in {namespace}"))
            })?;
            ids.push((name, u16::from_le_bytes(id)));
        }
        Ok(ids)
    }

    fn store_id(&self, namespace: &str, name: &str, id: u16) -> Result<(), StorageError> {
        let mut key = table_prefix(namespace);
        key.extend_from_slice(name.as_bytes());
        self.put(&key, &id.to_le_bytes())?;
        self.flush()
    }
}

#[derive(Default)]
struct IdMaps {
    by_name: HashMap<String, u16>,
    by_id: HashMap<u16, String>,
    next: u32,
}

/// In-memory view of one namespace, populated from the store at startup.
pub struct IdTable {
    namespace: String,
    store: Arc<dyn IdStore>,
    maps: RwLock<IdMaps>,
}

impl IdTable {
    /// Load every id recorded under `namespace`.
    pub fn load(namespace: &str, store: Arc<dyn IdStore>) -> Result<Self, StorageError> {
        let mut maps = IdMaps::default();
        for (name, id) in store.load_ids(namespace)? {
            maps.next = maps.next.max(id as u32 + 1);
            maps.by_id.insert(id, name.clone());
            maps.by_name.insert(name, id);
        }
        Ok(Self {
            namespace: namespace.to_string(),
            store,
            maps: RwLock::new(maps),
        })
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.maps.read().by_name.get(name).copied()
    }

    pub fn name_of(&self, id: u16) -> Option<String> {
        self.maps.read().by_id.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.maps.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the id for `name`, assigning and persisting a fresh one on first sight.
    pub fn resolve(&self, name: &str) -> Result<u16, StorageError> {
        if let Some(id) = self.get(name) {
            return Ok(id);
        }

        let mut maps = self.maps.write();
        // Another caller may have assigned it while we waited for the lock
        if let Some(&id) = maps.by_name.get(name) {
            return Ok(id);
        }
        let id = u16::try_from(maps.next).map_err(|_| StorageError::IdSpaceExhausted {
            namespace: self.namespace.clone(),
        })?;

        self.store.store_id(&self.namespace, name, id)?;

        maps.next += 1;
        maps.by_name.insert(name.to_string(), id);
        maps.by_id.insert(id, name.to_string());
        info!("Assigned {} id {id} to {name}", self.namespace);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn memory_store() -> Arc<dyn IdStore> {
        Arc::new(LevelDbProvider::open_in_memory().unwrap())
    }

    #[test]
    fn resolve_assigns_sequential_ids() {
        let table = IdTable::load("world_ids", memory_store()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.resolve("overworld").unwrap(), 0);
        assert_eq!(table.resolve("nether").unwrap(), 1);
        assert_eq!(table.resolve("overworld").unwrap(), 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.name_of(1).as_deref(), Some("nether"));
        assert!(table.name_of(7).is_none());
    }

    #[test]
    fn namespaces_are_independent() {
        let store = memory_store();
        let worlds = IdTable::load("world_ids", store.clone()).unwrap();
        let plugins = IdTable::load("plugin_ids", store).unwrap();
        worlds.resolve("overworld").unwrap();
        worlds.resolve("nether").unwrap();
        assert_eq!(plugins.resolve("bastions").unwrap(), 0);
    }

    #[test]
    fn ids_survive_reload() {
        let dir = std::env::temp_dir().join(format!("chunkmeta_ids_{}", rand::random::<u64>()));
        let path: PathBuf = dir.clone();
        std::fs::create_dir_all(&path).unwrap();
        {
            let store: Arc<dyn IdStore> = Arc::new(LevelDbProvider::open(&path).unwrap());
            let table = IdTable::load("world_ids", store).unwrap();
            table.resolve("a").unwrap();
            table.resolve("b").unwrap();
        }
        let store: Arc<dyn IdStore> = Arc::new(LevelDbProvider::open(&path).unwrap());
        let table = IdTable::load("world_ids", store).unwrap();
        assert_eq!(table.get("b"), Some(1));
        // Never reuses an id after a reload
        assert_eq!(table.resolve("c").unwrap(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    struct FailingStore;

    impl IdStore for FailingStore {
        fn load_ids(&self, _namespace: &str) -> Result<Vec<(String, u16)>, StorageError> {
            Ok(Vec::new())
        }
        fn store_id(&self, _namespace: &str, _name: &str, _id: u16) -> Result<(), StorageError> {
            Err(StorageError::Backend("disk full".into()))
        }
    }

    #[test]
    fn failed_persist_hands_out_nothing() {
        let table = IdTable::load("world_ids", Arc::new(FailingStore)).unwrap();
        assert!(table.resolve("overworld").is_err());
        assert!(table.get("overworld").is_none());
    }
}
