//! Contract for per-block data records.

use chunkmeta_world::BlockLocation;

/// A typed record attached to one block.
///
/// Records are shared as `Arc<D>`; the cache compares handles by pointer to
/// detect two records aliasing the same location.
pub trait BlockDataObject: Send + Sync + 'static {
    /// The block this record belongs to. Must not change over the record's lifetime.
    fn location(&self) -> BlockLocation;
}
