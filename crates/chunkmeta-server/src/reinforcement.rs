//! Demo consumer plugin data: a reinforcement with remaining health on one block.

use chunkmeta_cache::BlockDataObject;
use chunkmeta_world::BlockLocation;
use serde::{Deserialize, Serialize};

pub const PLUGIN_NAME: &str = "reinforcements";
pub const TABLE: &str = "reinforcements";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reinforcement {
    pub location: BlockLocation,
    pub health: u32,
}

impl BlockDataObject for Reinforcement {
    fn location(&self) -> BlockLocation {
        self.location
    }
}
