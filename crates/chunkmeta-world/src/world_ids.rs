//! World identity registry: durable world name ↔ compact [`WorldId`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::coords::{HeightRange, WorldId};
use crate::error::StorageError;
use crate::id_table::{IdStore, IdTable};

const WORLD_NAMESPACE: &str = "world_ids";

/// A world as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostWorld {
    /// Durable identifier (name or UUID string).
    pub name: String,
    pub height: HeightRange,
}

impl HostWorld {
    pub fn new(name: impl Into<String>, height: HeightRange) -> Self {
        Self {
            name: name.into(),
            height,
        }
    }

    /// A world with the legacy `[0, 255]` range.
    pub fn legacy(name: impl Into<String>) -> Self {
        Self::new(name, HeightRange::default())
    }
}

/// Resolves worlds to their compact ids and back.
///
/// Lookups are served from memory. A miss assigns an id and persists it
/// synchronously before returning.
pub struct WorldIdRegistry {
    ids: IdTable,
    worlds: RwLock<HashMap<WorldId, HostWorld>>,
}

impl WorldIdRegistry {
    pub fn load(store: Arc<dyn IdStore>) -> Result<Self, StorageError> {
        Ok(Self {
            ids: IdTable::load(WORLD_NAMESPACE, store)?,
            worlds: RwLock::new(HashMap::new()),
        })
    }

    /// Return the id of `world`, assigning one if the world was never seen.
    pub fn resolve(&self, world: &HostWorld) -> Result<WorldId, StorageError> {
        let id = WorldId(self.ids.resolve(&world.name)?);
        self.worlds.write().insert(id, world.clone());
        Ok(id)
    }

    /// Id of an already known world name, without assigning.
    pub fn id_of(&self, name: &str) -> Option<WorldId> {
        self.ids.get(name).map(WorldId)
    }

    /// The world behind `id`, if it has been resolved during this process run.
    pub fn world_for(&self, id: WorldId) -> Option<HostWorld> {
        self.worlds.read().get(&id).cloned()
    }

    pub fn height_range(&self, id: WorldId) -> Option<HeightRange> {
        self.worlds.read().get(&id).map(|w| w.height)
    }

    /// Durable name recorded for `id`, including worlds not seen this run.
    pub fn stored_name(&self, id: WorldId) -> Option<String> {
        self.ids.name_of(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LevelDbProvider;

    fn registry() -> WorldIdRegistry {
        WorldIdRegistry::load(Arc::new(LevelDbProvider::open_in_memory().unwrap())).unwrap()
    }

    #[test]
    fn resolve_and_lookup() {
        let reg = registry();
        let world = HostWorld::new("world", HeightRange::new(-64, 319));
        let id = reg.resolve(&world).unwrap();
        assert_eq!(reg.resolve(&world).unwrap(), id);
        assert_eq!(reg.id_of("world"), Some(id));
        assert_eq!(reg.world_for(id), Some(world));
        assert_eq!(reg.height_range(id), Some(HeightRange::new(-64, 319)));
    }

    #[test]
    fn unknown_id_is_none() {
        let reg = registry();
        assert!(reg.world_for(WorldId(42)).is_none());
        assert!(reg.height_range(WorldId(42)).is_none());
        assert!(reg.id_of("nowhere").is_none());
    }

    #[test]
    fn stored_but_unseen_world() {
        let store: Arc<dyn IdStore> = Arc::new(LevelDbProvider::open_in_memory().unwrap());
        {
            let reg = WorldIdRegistry::load(store.clone()).unwrap();
            reg.resolve(&HostWorld::legacy("old")).unwrap();
        }
        let reg = WorldIdRegistry::load(store).unwrap();
        let id = reg.id_of("old").unwrap();
        assert_eq!(reg.stored_name(id).as_deref(), Some("old"));
        // Not reported by the host in this run yet
        assert!(reg.world_for(id).is_none());
    }
}
