mod config;
mod console;
mod reinforcement;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chunkmeta_cache::{
    BlockBasedChunkMetaView, ChunkLoader, GlobalChunkMetaManager, LevelDbBlockEngine,
    ManagerOptions,
};
use chunkmeta_host_api::ChunkLifecycle;
use chunkmeta_world::{HeightRange, LevelDbProvider, StorageError, WorldIdRegistry};
use config::ChunkMetaConfig;
use console::Console;
use reinforcement::Reinforcement;
use tokio::io::AsyncBufReadExt;
use tracing::{error, info, warn};

fn open_storage(config: &ChunkMetaConfig) -> Result<LevelDbProvider, StorageError> {
    if config.storage.is_memory() {
        warn!("Using in-memory storage, nothing will survive a restart");
        LevelDbProvider::open_in_memory()
    } else {
        LevelDbProvider::open(Path::new(&config.storage.path))
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "chunkmeta.toml".into());
    let config = match ChunkMetaConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        "chunkmeta server v{} starting (storage: {})",
        env!("CARGO_PKG_VERSION"),
        config.storage.path
    );

    let db = match open_storage(&config) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to open storage: {e}");
            std::process::exit(1);
        }
    };
    let worlds = match WorldIdRegistry::load(db.clone()) {
        Ok(w) => Arc::new(w),
        Err(e) => {
            error!("Failed to load world ids: {e}");
            std::process::exit(1);
        }
    };

    let loader = ChunkLoader::new(
        tokio::runtime::Handle::current(),
        config.cache.chunk_loading_threads,
    );
    match &loader {
        Some(l) => info!("Chunk pre-warm enabled with {} loaders", l.threads()),
        None => info!("Chunk pre-warm disabled"),
    }
    let manager = match GlobalChunkMetaManager::new(
        worlds,
        db.clone(),
        ManagerOptions {
            load_statistics: config.cache.load_statistics,
            loader,
        },
    ) {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to load plugin ids: {e}");
            std::process::exit(1);
        }
    };

    let view = match manager
        .register_plugin(reinforcement::PLUGIN_NAME)
        .and_then(|plugin| {
            let engine = Arc::new(LevelDbBlockEngine::<Reinforcement>::new(
                db.clone(),
                reinforcement::TABLE,
            ));
            BlockBasedChunkMetaView::<Reinforcement>::create(
                &manager,
                plugin,
                engine,
                config.cache.eager_load,
                config.cache.eager_load_limit,
            )
        }) {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to enable {}: {e}", reinforcement::PLUGIN_NAME);
            std::process::exit(1);
        }
    };

    let console = Console::new(
        manager.clone(),
        view,
        HeightRange::new(config.world.min_y, config.world.max_y),
    );

    // Console REPL: read lines from stdin
    let (console_tx, mut console_rx) = tokio::sync::mpsc::channel::<String>(32);
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    // Interval of 0 disables autosave; never tick in that case
    let autosave_secs = config.cache.auto_save_interval;
    let mut autosave = tokio::time::interval(Duration::from_secs(autosave_secs.max(1)));
    autosave.tick().await;

    info!("Ready. Type 'help' for commands.");
    loop {
        tokio::select! {
            Some(line) = console_rx.recv() => {
                let out = console.execute_line(&line);
                for message in &out.messages {
                    info!("{message}");
                }
                if out.should_stop {
                    break;
                }
            }
            _ = autosave.tick(), if autosave_secs > 0 => {
                let summary = manager.save_all();
                if summary.flushed > 0 || summary.failed > 0 {
                    info!("Autosave: flushed {} chunks ({} failed)", summary.flushed, summary.failed);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Saving chunk metadata before shutdown...");
    console.view().disable();
    manager.on_server_stopping();
    if let Err(e) = db.flush() {
        error!("Failed to flush storage: {e}");
    }
    info!("Server shut down.");
}
