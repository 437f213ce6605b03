//! LevelDB-backed key/value store shared by the id tables and the block
//! storage engines.
//!
//! Every logical table lives under its own key prefix: `[table][0x00][...]`.
//! Signed integers inside keys are written big-endian with the sign bit
//! flipped so that LevelDB's byte ordering matches numeric ordering and all
//! keys sharing a prefix are contiguous.

use std::path::Path;

use parking_lot::Mutex;
use rusty_leveldb::{LdbIterator, DB};
use tracing::debug;

use crate::error::StorageError;

// ─── Key builders ───────────────────────────────────────────────────────────

/// Start a key for `table`: `[table bytes][0x00]`.
pub fn table_prefix(table: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(table.len() + 16);
    key.extend_from_slice(table.as_bytes());
    key.push(0);
    key
}

/// Append an order-preserving encoding of `v`.
pub fn push_i32(key: &mut Vec<u8>, v: i32) {
    key.extend_from_slice(&((v as u32) ^ 0x8000_0000).to_be_bytes());
}

pub fn push_u16(key: &mut Vec<u8>, v: u16) {
    key.extend_from_slice(&v.to_be_bytes());
}

/// Read an `i32` written by [`push_i32`] at `offset`.
pub fn read_i32(key: &[u8], offset: usize) -> Option<i32> {
    let bytes: [u8; 4] = key.get(offset..offset + 4)?.try_into().ok()?;
    Some((u32::from_be_bytes(bytes) ^ 0x8000_0000) as i32)
}

pub fn read_u16(key: &[u8], offset: usize) -> Option<u16> {
    let bytes: [u8; 2] = key.get(offset..offset + 2)?.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}

// ─── LevelDB provider ──────────────────────────────────────────────────────

/// Wraps a `rusty_leveldb::DB` behind a mutex so it can be shared between the
/// simulation thread and loader workers.
pub struct LevelDbProvider {
    db: Mutex<DB>,
}

impl LevelDbProvider {
    /// Open or create a LevelDB database at the given path.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let opts = rusty_leveldb::Options {
            create_if_missing: true,
            ..rusty_leveldb::Options::default()
        };

        let db = DB::open(path, opts)
            .map_err(|e| StorageError::Backend(format!("Failed to open LevelDB: {e}")))?;
        debug!("Opened LevelDB at {}", path.display());
        Ok(Self { db: Mutex::new(db) })
    }

    /// Open a database that lives entirely in memory. Data is lost on drop.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let db = DB::open("chunkmeta-mem", rusty_leveldb::in_memory())
            .map_err(|e| StorageError::Backend(format!("Failed to open in-memory LevelDB: {e}")))?;
        Ok(Self { db: Mutex::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.db.lock().get(key).map(|v| v.to_vec())
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db
            .lock()
            .put(key, value)
            .map_err(|e| StorageError::Backend(format!("put: {e}")))
    }

    /// Delete a key. Deleting a missing key is not an error.
    pub fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.db
            .lock()
            .delete(key)
            .map_err(|e| StorageError::Backend(format!("delete: {e}")))
    }

    /// Collect every `(key, value)` pair whose key starts with `prefix`.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut db = self.db.lock();
        let mut iter = db
            .new_iter()
            .map_err(|e| StorageError::Backend(format!("iter: {e}")))?;

        // Position at the first key >= prefix; advancing after seek would skip it
        iter.seek(prefix);
        let mut out = Vec::new();
        let (mut key, mut value) = (Vec::new(), Vec::new());
        while iter.valid() && iter.current(&mut key, &mut value) {
            if !key.starts_with(prefix) {
                break;
            }
            out.push((std::mem::take(&mut key), std::mem::take(&mut value)));
            if !iter.advance() {
                break;
            }
        }
        Ok(out)
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db
            .lock()
            .flush()
            .map_err(|e| StorageError::Backend(format!("flush: {e}")))
    }
}
