use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct ChunkMetaConfig {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub world: WorldSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
pub struct StorageSection {
    /// LevelDB directory. `"memory"` selects a throwaway in-memory database.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_path() -> String {
    "chunkmeta-db".into()
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl StorageSection {
    pub fn is_memory(&self) -> bool {
        self.path == "memory"
    }
}

#[derive(Debug, Deserialize)]
pub struct CacheSection {
    /// Concurrent pre-warm loads on chunk-load events. 0 = disabled.
    #[serde(default = "default_chunk_loading_threads")]
    pub chunk_loading_threads: usize,
    #[serde(default)]
    pub load_statistics: bool,
    /// Seconds between save passes. 0 = disabled. Default: 300 (5 minutes).
    #[serde(default = "default_auto_save_interval")]
    pub auto_save_interval: u64,
    /// Hydrate every chunk with stored data when the view is created.
    #[serde(default)]
    pub eager_load: bool,
    /// Cap on eagerly loaded chunks. 0 = unbounded.
    #[serde(default)]
    pub eager_load_limit: usize,
}

fn default_chunk_loading_threads() -> usize {
    2
}

fn default_auto_save_interval() -> u64 {
    300
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            chunk_loading_threads: default_chunk_loading_threads(),
            load_statistics: false,
            auto_save_interval: default_auto_save_interval(),
            eager_load: false,
            eager_load_limit: 0,
        }
    }
}

/// Height range given to worlds first seen through the console.
#[derive(Debug, Deserialize)]
pub struct WorldSection {
    #[serde(default)]
    pub min_y: i32,
    #[serde(default = "default_max_y")]
    pub max_y: i32,
}

fn default_max_y() -> i32 {
    255
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            min_y: 0,
            max_y: default_max_y(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    pub level: String,
}

impl ChunkMetaConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        if config.world.min_y > config.world.max_y {
            return Err(format!(
                "world.min_y ({}) is above world.max_y ({})",
                config.world.min_y, config.world.max_y
            )
            .into());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml_str = r#"
            [logging]
            level = "debug"
        "#;
        let config: ChunkMetaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.logging.level, "debug");
        // every other section defaults when absent
        assert_eq!(config.storage.path, "chunkmeta-db");
        assert!(!config.storage.is_memory());
        assert_eq!(config.cache.chunk_loading_threads, 2);
        assert!(!config.cache.load_statistics);
        assert_eq!(config.cache.auto_save_interval, 300);
        assert!(!config.cache.eager_load);
        assert_eq!(config.cache.eager_load_limit, 0);
        assert_eq!(config.world.min_y, 0);
        assert_eq!(config.world.max_y, 255);
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            [storage]
            path = "memory"

            [cache]
            chunk_loading_threads = 0
            load_statistics = true
            auto_save_interval = 30
            eager_load = true
            eager_load_limit = 64

            [world]
            min_y = -64
            max_y = 319

            [logging]
            level = "info"
        "#;
        let config: ChunkMetaConfig = toml::from_str(toml_str).unwrap();
        assert!(config.storage.is_memory());
        assert_eq!(config.cache.chunk_loading_threads, 0);
        assert!(config.cache.load_statistics);
        assert_eq!(config.cache.auto_save_interval, 30);
        assert!(config.cache.eager_load);
        assert_eq!(config.cache.eager_load_limit, 64);
        assert_eq!(config.world.min_y, -64);
        assert_eq!(config.world.max_y, 319);
    }

    #[test]
    fn missing_logging_is_an_error() {
        assert!(toml::from_str::<ChunkMetaConfig>("[storage]\npath = \"x\"").is_err());
    }

    #[test]
    fn inverted_height_range_is_rejected() {
        let path = std::env::temp_dir().join(format!("chunkmeta_cfg_{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[world]\nmin_y = 10\nmax_y = 0\n[logging]\nlevel = \"info\"\n",
        )
        .unwrap();
        assert!(ChunkMetaConfig::load(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
