//! Host lifecycle API: the events a game server delivers to the chunk
//! metadata core, and the handler trait the core implements.
//!
//! This crate has no dependency on chunkmeta-cache. Hosts depend on it to
//! drive the cache without knowing its internals.

use chunkmeta_world::{ChunkCoord, PluginId, WorldId};

// ─── Events ──────────────────────────────────────────────────────────────────

/// Lifecycle events delivered serially by the host on its simulation thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// A chunk became resident.
    ChunkLoad { world: WorldId, x: i32, z: i32 },
    /// A chunk is about to stop being resident.
    ChunkUnload { world: WorldId, x: i32, z: i32 },
    /// A consumer plugin is shutting down.
    PluginDisable { plugin: PluginId },
    /// The whole server is stopping. Last event before the process exits.
    ServerStopping,
}

impl HostEvent {
    /// The chunk this event concerns, if any.
    pub fn chunk(&self) -> Option<ChunkCoord> {
        match *self {
            HostEvent::ChunkLoad { world, x, z } | HostEvent::ChunkUnload { world, x, z } => {
                Some(ChunkCoord::new(world, x, z))
            }
            _ => None,
        }
    }
}

// ─── Handler trait ───────────────────────────────────────────────────────────

/// Implemented by the metadata core, invoked by the host.
///
/// The default `handle_event` routes each event to its dedicated hook.
pub trait ChunkLifecycle {
    fn on_chunk_load(&self, chunk: ChunkCoord);

    fn on_chunk_unload(&self, chunk: ChunkCoord);

    fn on_plugin_disable(&self, plugin: PluginId);

    fn on_server_stopping(&self);

    fn handle_event(&self, event: &HostEvent) {
        match *event {
            HostEvent::ChunkLoad { world, x, z } => {
                self.on_chunk_load(ChunkCoord::new(world, x, z))
            }
            HostEvent::ChunkUnload { world, x, z } => {
                self.on_chunk_unload(ChunkCoord::new(world, x, z))
            }
            HostEvent::PluginDisable { plugin } => self.on_plugin_disable(plugin),
            HostEvent::ServerStopping => self.on_server_stopping(),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    // Records every hook invocation in order.
    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
    }

    impl ChunkLifecycle for Recorder {
        fn on_chunk_load(&self, chunk: ChunkCoord) {
            self.calls
                .borrow_mut()
                .push(format!("load {} {} {}", chunk.world, chunk.x, chunk.z));
        }
        fn on_chunk_unload(&self, chunk: ChunkCoord) {
            self.calls
                .borrow_mut()
                .push(format!("unload {} {} {}", chunk.world, chunk.x, chunk.z));
        }
        fn on_plugin_disable(&self, plugin: PluginId) {
            self.calls.borrow_mut().push(format!("disable {plugin}"));
        }
        fn on_server_stopping(&self) {
            self.calls.borrow_mut().push("stopping".into());
        }
    }

    #[test]
    fn handle_event_routes_to_hooks() {
        let recorder = Recorder::default();
        let events = [
            HostEvent::ChunkLoad {
                world: WorldId(3),
                x: 0,
                z: -1,
            },
            HostEvent::ChunkUnload {
                world: WorldId(3),
                x: 0,
                z: -1,
            },
            HostEvent::PluginDisable {
                plugin: PluginId(7),
            },
            HostEvent::ServerStopping,
        ];
        for event in &events {
            recorder.handle_event(event);
        }
        assert_eq!(
            *recorder.calls.borrow(),
            vec!["load 3 0 -1", "unload 3 0 -1", "disable 7", "stopping"]
        );
    }

    #[test]
    fn chunk_accessor() {
        let load = HostEvent::ChunkLoad {
            world: WorldId(1),
            x: 4,
            z: 5,
        };
        assert_eq!(load.chunk(), Some(ChunkCoord::new(WorldId(1), 4, 5)));
        assert_eq!(HostEvent::ServerStopping.chunk(), None);
        assert_eq!(
            HostEvent::PluginDisable {
                plugin: PluginId(0)
            }
            .chunk(),
            None
        );
    }
}
