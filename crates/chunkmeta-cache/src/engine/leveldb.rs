//! LevelDB block storage engine.
//!
//! Key: `[table][0x00][plugin:u16][world:u16][cx:i32][cz:i32][x:i32][y:i32][z:i32]`,
//! integers order-preserving big-endian. Value: the record as JSON.

use std::marker::PhantomData;
use std::sync::Arc;

use chunkmeta_world::storage::{push_i32, push_u16, read_i32, read_u16, table_prefix};
use chunkmeta_world::{
    BlockLocation, ChunkCoord, LevelDbProvider, PluginId, StorageError, WorldId, XzwCoord,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::BlockStorageEngine;
use crate::record::BlockDataObject;

/// Length of `[plugin][world][cx][cz]` after the table prefix.
const CHUNK_KEY_LEN: usize = 2 + 2 + 4 + 4;
const BLOCK_KEY_LEN: usize = CHUNK_KEY_LEN + 12;

pub struct LevelDbBlockEngine<D> {
    db: Arc<LevelDbProvider>,
    table: String,
    _record: PhantomData<fn() -> D>,
}

impl<D> LevelDbBlockEngine<D> {
    /// Engine storing its records under `table` in `db`.
    pub fn new(db: Arc<LevelDbProvider>, table: &str) -> Self {
        Self {
            db,
            table: table.to_string(),
            _record: PhantomData,
        }
    }

    fn plugin_prefix(&self, plugin: PluginId) -> Vec<u8> {
        let mut key = table_prefix(&self.table);
        push_u16(&mut key, plugin.0);
        key
    }

    fn chunk_prefix(&self, plugin: PluginId, chunk: ChunkCoord) -> Vec<u8> {
        let mut key = self.plugin_prefix(plugin);
        push_u16(&mut key, chunk.world.0);
        push_i32(&mut key, chunk.x);
        push_i32(&mut key, chunk.z);
        key
    }

    fn block_key(&self, plugin: PluginId, location: BlockLocation) -> Vec<u8> {
        let mut key = self.chunk_prefix(plugin, location.chunk());
        push_i32(&mut key, location.x);
        push_i32(&mut key, location.y);
        push_i32(&mut key, location.z);
        key
    }

    fn malformed(&self, key: &[u8]) -> StorageError {
        StorageError::MalformedKey {
            table: self.table.clone(),
            len: key.len(),
        }
    }
}

impl<D> BlockStorageEngine<D> for LevelDbBlockEngine<D>
where
    D: BlockDataObject + Serialize + DeserializeOwned,
{
    fn all_data_chunks(&self, plugin: PluginId) -> Result<Vec<XzwCoord>, StorageError> {
        let prefix = self.plugin_prefix(plugin);
        let base = prefix.len() - 2;
        let mut coords = Vec::new();
        for (key, _) in self.db.scan_prefix(&prefix)? {
            if key.len() != base + BLOCK_KEY_LEN {
                return Err(self.malformed(&key));
            }
            let world = read_u16(&key, base + 2).ok_or_else(|| self.malformed(&key))?;
            let cx = read_i32(&key, base + 4).ok_or_else(|| self.malformed(&key))?;
            let cz = read_i32(&key, base + 8).ok_or_else(|| self.malformed(&key))?;
            coords.push(XzwCoord::new(cx, cz, WorldId(world)));
        }
        // Records of one chunk are adjacent in key order
        coords.dedup();
        Ok(coords)
    }

    fn load_chunk(&self, plugin: PluginId, chunk: ChunkCoord) -> Result<Vec<D>, StorageError> {
        let prefix = self.chunk_prefix(plugin, chunk);
        self.db
            .scan_prefix(&prefix)?
            .into_iter()
            .map(|(_, value)| serde_json::from_slice(&value).map_err(StorageError::from))
            .collect()
    }

    fn persist(&self, record: &D, _world: WorldId, plugin: PluginId) -> Result<(), StorageError> {
        let key = self.block_key(plugin, record.location());
        let value = serde_json::to_vec(record)?;
        self.db.put(&key, &value)
    }

    fn persist_batch(&self, records: &[Arc<D>], plugin: PluginId) -> Result<(), StorageError> {
        for record in records {
            let key = self.block_key(plugin, record.location());
            self.db.put(&key, &serde_json::to_vec(record.as_ref())?)?;
        }
        self.db.flush()
    }

    fn get_for_location(
        &self,
        x: i32,
        y: i32,
        z: i32,
        world: WorldId,
        plugin: PluginId,
    ) -> Result<Option<D>, StorageError> {
        let key = self.block_key(plugin, BlockLocation::new(world, x, y, z));
        match self.db.get(&key) {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, location: BlockLocation, plugin: PluginId) -> Result<(), StorageError> {
        self.db.delete(&self.block_key(plugin, location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Marker {
        location: BlockLocation,
        label: String,
    }

    impl BlockDataObject for Marker {
        fn location(&self) -> BlockLocation {
            self.location
        }
    }

    fn marker(world: u16, x: i32, y: i32, z: i32, label: &str) -> Marker {
        Marker {
            location: BlockLocation::new(WorldId(world), x, y, z),
            label: label.into(),
        }
    }

    fn engine() -> LevelDbBlockEngine<Marker> {
        LevelDbBlockEngine::new(Arc::new(LevelDbProvider::open_in_memory().unwrap()), "markers")
    }

    #[test]
    fn persist_and_point_lookup() {
        let engine = engine();
        let m = marker(0, 5, 64, 9, "a");
        engine.persist(&m, WorldId(0), PluginId(1)).unwrap();
        assert_eq!(
            engine.get_for_location(5, 64, 9, WorldId(0), PluginId(1)).unwrap(),
            Some(m)
        );
        // Other plugin sees nothing
        assert!(engine
            .get_for_location(5, 64, 9, WorldId(0), PluginId(2))
            .unwrap()
            .is_none());
    }

    #[test]
    fn load_chunk_returns_only_that_chunk() {
        let engine = engine();
        let plugin = PluginId(3);
        let inside = [marker(1, 0, 1, 0, "a"), marker(1, 15, 255, 15, "b")];
        let outside = [marker(1, 16, 1, 0, "c"), marker(1, -1, 1, 0, "d"), marker(2, 0, 1, 0, "e")];
        for m in inside.iter().chain(outside.iter()) {
            engine.persist(m, m.location.world, plugin).unwrap();
        }

        let mut loaded = engine
            .load_chunk(plugin, ChunkCoord::new(WorldId(1), 0, 0))
            .unwrap();
        loaded.sort_by(|a, b| a.label.cmp(&b.label));
        assert_eq!(loaded, inside.to_vec());

        assert!(engine
            .load_chunk(plugin, ChunkCoord::new(WorldId(1), 5, 5))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn all_data_chunks_deduplicates() {
        let engine = engine();
        let plugin = PluginId(0);
        let records = vec![
            Arc::new(marker(0, 1, 1, 1, "a")),
            Arc::new(marker(0, 2, 2, 2, "b")),
            Arc::new(marker(0, -20, 2, 40, "c")),
        ];
        engine.persist_batch(&records, plugin).unwrap();

        let mut chunks = engine.all_data_chunks(plugin).unwrap();
        chunks.sort();
        assert_eq!(
            chunks,
            vec![XzwCoord::new(-2, 2, WorldId(0)), XzwCoord::new(0, 0, WorldId(0))]
        );
        assert!(engine.all_data_chunks(PluginId(1)).unwrap().is_empty());
    }

    #[test]
    fn delete_and_delete_missing() {
        let engine = engine();
        let m = marker(0, 3, 3, 3, "x");
        engine.persist(&m, WorldId(0), PluginId(0)).unwrap();
        engine.delete(m.location, PluginId(0)).unwrap();
        assert!(engine
            .get_for_location(3, 3, 3, WorldId(0), PluginId(0))
            .unwrap()
            .is_none());
        engine.delete(m.location, PluginId(0)).unwrap();
    }

    #[test]
    fn persist_overwrites() {
        let engine = engine();
        engine
            .persist(&marker(0, 1, 2, 3, "old"), WorldId(0), PluginId(0))
            .unwrap();
        engine
            .persist(&marker(0, 1, 2, 3, "new"), WorldId(0), PluginId(0))
            .unwrap();
        let got = engine
            .get_for_location(1, 2, 3, WorldId(0), PluginId(0))
            .unwrap()
            .unwrap();
        assert_eq!(got.label, "new");
    }
}
