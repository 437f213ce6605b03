//! Console commands: parsing and execution against the cache.

use std::sync::Arc;

use chunkmeta_cache::{BlockBasedChunkMetaView, GlobalChunkMetaManager};
use chunkmeta_host_api::{ChunkLifecycle, HostEvent};
use chunkmeta_world::{BlockLocation, HeightRange, HostWorld, WorldId};

use crate::reinforcement::Reinforcement;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Load { world: String, x: i32, z: i32 },
    Unload { world: String, x: i32, z: i32 },
    Put { world: String, x: i32, y: i32, z: i32, health: u32 },
    Get { world: String, x: i32, y: i32, z: i32 },
    Remove { world: String, x: i32, y: i32, z: i32 },
    Disable,
    Save,
    Stats,
    Stop,
    Help,
}

const USAGE: &[(&str, &str)] = &[
    ("load <world> <x> <z>", "Mark a chunk as loaded"),
    ("unload <world> <x> <z>", "Flush and evict a chunk"),
    ("put <world> <x> <y> <z> <health>", "Store a reinforcement"),
    ("get <world> <x> <y> <z>", "Look up a reinforcement"),
    ("remove <world> <x> <y> <z>", "Remove a reinforcement"),
    ("disable", "Disable the reinforcements plugin"),
    ("save", "Flush every dirty chunk"),
    ("stats", "Show load statistics"),
    ("stop", "Save everything and exit"),
    ("help", "List commands"),
];

fn int<T: std::str::FromStr>(args: &[&str], i: usize, name: &str) -> Result<T, String> {
    let raw = args.get(i).ok_or_else(|| format!("missing <{name}>"))?;
    raw.parse()
        .map_err(|_| format!("<{name}> must be a number, got '{raw}'"))
}

fn world(args: &[&str]) -> Result<String, String> {
    args.first()
        .map(|w| w.to_string())
        .ok_or_else(|| "missing <world>".to_string())
}

fn expect_args(args: &[&str], n: usize, usage: &str) -> Result<(), String> {
    if args.len() != n {
        return Err(format!("usage: {usage}"));
    }
    Ok(())
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let name = parts
            .next()
            .ok_or_else(|| "empty command".to_string())?
            .to_lowercase();
        let args: Vec<&str> = parts.collect();

        match name.as_str() {
            "load" | "unload" => {
                expect_args(&args, 3, &format!("{name} <world> <x> <z>"))?;
                let (world, x, z) = (world(&args)?, int(&args, 1, "x")?, int(&args, 2, "z")?);
                Ok(if name == "load" {
                    ConsoleCommand::Load { world, x, z }
                } else {
                    ConsoleCommand::Unload { world, x, z }
                })
            }
            "put" => {
                expect_args(&args, 5, "put <world> <x> <y> <z> <health>")?;
                Ok(ConsoleCommand::Put {
                    world: world(&args)?,
                    x: int(&args, 1, "x")?,
                    y: int(&args, 2, "y")?,
                    z: int(&args, 3, "z")?,
                    health: int(&args, 4, "health")?,
                })
            }
            "get" | "remove" => {
                expect_args(&args, 4, &format!("{name} <world> <x> <y> <z>"))?;
                let world = world(&args)?;
                let (x, y, z) = (int(&args, 1, "x")?, int(&args, 2, "y")?, int(&args, 3, "z")?);
                Ok(if name == "get" {
                    ConsoleCommand::Get { world, x, y, z }
                } else {
                    ConsoleCommand::Remove { world, x, y, z }
                })
            }
            "disable" => Ok(ConsoleCommand::Disable),
            "save" => Ok(ConsoleCommand::Save),
            "stats" => Ok(ConsoleCommand::Stats),
            "stop" => Ok(ConsoleCommand::Stop),
            "help" => Ok(ConsoleCommand::Help),
            other => Err(format!("Unknown command: {other}. Type 'help' for a list.")),
        }
    }
}

/// Messages produced by one command.
pub struct CommandOutput {
    pub messages: Vec<String>,
    pub should_stop: bool,
}

impl CommandOutput {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
            should_stop: false,
        }
    }
}

/// Stand-in for the game host: turns console commands into lifecycle events
/// and view calls.
pub struct Console {
    manager: Arc<GlobalChunkMetaManager>,
    view: BlockBasedChunkMetaView<Reinforcement>,
    height: HeightRange,
}

impl Console {
    pub fn new(
        manager: Arc<GlobalChunkMetaManager>,
        view: BlockBasedChunkMetaView<Reinforcement>,
        height: HeightRange,
    ) -> Self {
        Self {
            manager,
            view,
            height,
        }
    }

    pub fn view(&self) -> &BlockBasedChunkMetaView<Reinforcement> {
        &self.view
    }

    fn world_id(&self, name: &str) -> Result<WorldId, String> {
        self.manager
            .worlds()
            .resolve(&HostWorld::new(name, self.height))
            .map_err(|e| format!("Failed to resolve world {name}: {e}"))
    }

    pub fn execute_line(&self, line: &str) -> CommandOutput {
        match ConsoleCommand::parse(line) {
            Ok(cmd) => self.execute(cmd),
            Err(e) => CommandOutput::ok(e),
        }
    }

    pub fn execute(&self, cmd: ConsoleCommand) -> CommandOutput {
        match self.run(cmd) {
            Ok(out) => out,
            Err(e) => CommandOutput::ok(format!("Error: {e}")),
        }
    }

    fn run(&self, cmd: ConsoleCommand) -> Result<CommandOutput, String> {
        let out = match cmd {
            ConsoleCommand::Load { world, x, z } => {
                let world = self.world_id(&world)?;
                self.manager
                    .handle_event(&HostEvent::ChunkLoad { world, x, z });
                CommandOutput::ok(format!("Chunk ({x},{z}) loaded in world {world}"))
            }
            ConsoleCommand::Unload { world, x, z } => {
                let world = self.world_id(&world)?;
                self.manager
                    .handle_event(&HostEvent::ChunkUnload { world, x, z });
                CommandOutput::ok(format!("Chunk ({x},{z}) unloaded in world {world}"))
            }
            ConsoleCommand::Put {
                world,
                x,
                y,
                z,
                health,
            } => {
                let location = BlockLocation::new(self.world_id(&world)?, x, y, z);
                let previous = self
                    .view
                    .put(Arc::new(Reinforcement { location, health }))
                    .map_err(|e| e.to_string())?;
                match previous {
                    Some(old) => CommandOutput::ok(format!(
                        "Replaced reinforcement at ({x},{y},{z}) (health {} -> {health})",
                        old.health
                    )),
                    None => CommandOutput::ok(format!(
                        "Stored reinforcement at ({x},{y},{z}) with health {health}"
                    )),
                }
            }
            ConsoleCommand::Get { world, x, y, z } => {
                let location = BlockLocation::new(self.world_id(&world)?, x, y, z);
                match self.view.get(location).map_err(|e| e.to_string())? {
                    Some(r) => CommandOutput::ok(format!(
                        "Reinforcement at ({x},{y},{z}): health {}",
                        r.health
                    )),
                    None => CommandOutput::ok(format!("No reinforcement at ({x},{y},{z})")),
                }
            }
            ConsoleCommand::Remove { world, x, y, z } => {
                let location = BlockLocation::new(self.world_id(&world)?, x, y, z);
                match self.view.remove(location).map_err(|e| e.to_string())? {
                    Some(r) => CommandOutput::ok(format!(
                        "Removed reinforcement at ({x},{y},{z}) with health {}",
                        r.health
                    )),
                    None => CommandOutput::ok(format!("No reinforcement at ({x},{y},{z})")),
                }
            }
            ConsoleCommand::Disable => {
                let summary = self.view.disable();
                CommandOutput::ok(format!(
                    "Plugin disabled: flushed {}, evicted {}, failed {}",
                    summary.flushed, summary.evicted, summary.failed
                ))
            }
            ConsoleCommand::Save => {
                let summary = self.manager.save_all();
                CommandOutput::ok(format!(
                    "Saved {} chunks ({} failed)",
                    summary.flushed, summary.failed
                ))
            }
            ConsoleCommand::Stats => match self.manager.stats() {
                None => CommandOutput::ok("Load statistics are disabled"),
                Some(stats) => {
                    let mut messages = vec![format!(
                        "{} resident chunk metas",
                        self.manager.resident_count()
                    )];
                    for (plugin, s) in stats.all() {
                        let name = self
                            .manager
                            .plugin_name(plugin)
                            .unwrap_or_else(|| plugin.to_string());
                        messages.push(format!(
                            "{name}: {} chunks / {} records hydrated (avg {:?}), {} flushes, {} failed, {} evictions, {} migrated",
                            s.chunks_hydrated,
                            s.records_hydrated,
                            s.average_hydration(),
                            s.flushes,
                            s.flush_failures,
                            s.evictions,
                            s.migrations
                        ));
                    }
                    CommandOutput {
                        messages,
                        should_stop: false,
                    }
                }
            },
            ConsoleCommand::Stop => CommandOutput {
                messages: vec!["Stopping...".into()],
                should_stop: true,
            },
            ConsoleCommand::Help => CommandOutput {
                messages: USAGE
                    .iter()
                    .map(|(usage, desc)| format!("{usage} - {desc}"))
                    .collect(),
                should_stop: false,
            },
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkmeta_cache::{LevelDbBlockEngine, ManagerOptions};
    use chunkmeta_world::{LevelDbProvider, WorldIdRegistry};

    use crate::reinforcement::{PLUGIN_NAME, TABLE};

    #[test]
    fn parse_commands() {
        assert_eq!(
            ConsoleCommand::parse("load world 0 -1"),
            Ok(ConsoleCommand::Load {
                world: "world".into(),
                x: 0,
                z: -1
            })
        );
        assert_eq!(
            ConsoleCommand::parse("PUT nether 5 64 9 100"),
            Ok(ConsoleCommand::Put {
                world: "nether".into(),
                x: 5,
                y: 64,
                z: 9,
                health: 100
            })
        );
        assert_eq!(ConsoleCommand::parse("  stop "), Ok(ConsoleCommand::Stop));
    }

    #[test]
    fn parse_errors() {
        assert!(ConsoleCommand::parse("").is_err());
        assert!(ConsoleCommand::parse("get world 1 2").is_err());
        assert!(ConsoleCommand::parse("put world 1 2 3 -5").is_err());
        assert!(ConsoleCommand::parse("load world a 0")
            .unwrap_err()
            .contains("<x>"));
        assert!(ConsoleCommand::parse("teleport").is_err());
    }

    fn console() -> Console {
        let db = Arc::new(LevelDbProvider::open_in_memory().unwrap());
        let worlds = Arc::new(WorldIdRegistry::load(db.clone()).unwrap());
        let manager = GlobalChunkMetaManager::new(
            worlds,
            db.clone(),
            ManagerOptions {
                load_statistics: true,
                loader: None,
            },
        )
        .unwrap();
        let plugin = manager.register_plugin(PLUGIN_NAME).unwrap();
        let engine = Arc::new(LevelDbBlockEngine::<Reinforcement>::new(db, TABLE));
        let view = BlockBasedChunkMetaView::<Reinforcement>::create(&manager, plugin, engine, false, 0)
            .unwrap();
        Console::new(manager, view, HeightRange::default())
    }

    #[test]
    fn put_load_get_unload_cycle() {
        let c = console();
        let out = c.execute_line("put world 5 64 9 50");
        assert!(out.messages[0].starts_with("Stored"));
        assert_eq!(c.view().tracked_len(), 1);

        c.execute_line("load world 0 0");
        let out = c.execute_line("get world 5 64 9");
        assert_eq!(out.messages[0], "Reinforcement at (5,64,9): health 50");
        assert_eq!(c.view().tracked_len(), 0);

        c.execute_line("put world 5 64 9 20");
        c.execute_line("unload world 0 0");
        let out = c.execute_line("get world 5 64 9");
        assert_eq!(out.messages[0], "Reinforcement at (5,64,9): health 20");

        let out = c.execute_line("stats");
        assert!(out.messages.iter().any(|m| m.starts_with("reinforcements:")));
    }

    #[test]
    fn bad_height_reports_error() {
        let c = console();
        let out = c.execute_line("get world 0 256 0");
        assert!(out.messages[0].starts_with("Error: y-level 256"));
    }

    #[test]
    fn stop_requests_shutdown() {
        let c = console();
        assert!(c.execute_line("stop").should_stop);
        assert!(!c.execute_line("save").should_stop);
        assert_eq!(c.execute_line("help").messages.len(), USAGE.len());
    }
}
