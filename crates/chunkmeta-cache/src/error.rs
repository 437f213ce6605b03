//! Cache error types.

use chunkmeta_world::{PluginId, StorageError, WorldId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkMetaError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("y-level {y} outside valid range [{min}, {max}]")]
    HeightOutOfRange { y: i32, min: i32, max: i32 },

    #[error("unknown world id {0}")]
    UnknownWorld(WorldId),

    #[error("inconsistent cache state: {0}")]
    Inconsistency(String),

    #[error("chunk meta registered for plugin {plugin} has an unexpected type")]
    TypeMismatch { plugin: PluginId },

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl ChunkMetaError {
    /// Malformed input from the caller. Never changes any state.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            ChunkMetaError::InvalidArgument(_)
                | ChunkMetaError::HeightOutOfRange { .. }
                | ChunkMetaError::UnknownWorld(_)
        )
    }

    /// Programming error in consumer code or the cache itself.
    pub fn is_inconsistency(&self) -> bool {
        matches!(
            self,
            ChunkMetaError::Inconsistency(_) | ChunkMetaError::TypeMismatch { .. }
        )
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, ChunkMetaError::Storage(_))
    }
}

pub type Result<T, E = ChunkMetaError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let bounds = ChunkMetaError::HeightOutOfRange {
            y: 256,
            min: 0,
            max: 255,
        };
        assert!(bounds.is_invalid_argument());
        assert!(!bounds.is_inconsistency());
        assert!(ChunkMetaError::UnknownWorld(WorldId(9)).is_invalid_argument());
        assert!(ChunkMetaError::Inconsistency("x".into()).is_inconsistency());
        assert!(ChunkMetaError::TypeMismatch {
            plugin: PluginId(1)
        }
        .is_inconsistency());
        let storage: ChunkMetaError = StorageError::Backend("down".into()).into();
        assert!(storage.is_storage());
        assert_eq!(
            bounds.to_string(),
            "y-level 256 outside valid range [0, 255]"
        );
    }
}
