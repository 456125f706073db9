//! Value types shared between the host, the event handlers and plugins.
//!
//! These are deliberately small snapshots: plugins never hold live references
//! into the simulation, only copies taken at the time of the call.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::SystemTime;
use uuid::Uuid;

/// Unique identifier for a player.
///
/// Wraps a UUID so player ids cannot be confused with other ids in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Creates a new random player id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a player id from its string form.
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a non-player entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

/// A position in the world.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Integer block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// A stack of items in an inventory slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Namespaced item identifier, e.g. `minecraft:stone`
    pub item: String,
    pub count: u32,
}

impl ItemStack {
    pub fn new(item: impl Into<String>, count: u32) -> Self {
        Self {
            item: item.into(),
            count,
        }
    }
}

/// Snapshot of an online player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub world: String,
    pub position: Position,
    pub health: f64,
    /// Free-form metadata attached by the host
    pub metadata: HashMap<String, String>,
}

impl PlayerSnapshot {
    pub fn new(name: impl Into<String>, world: impl Into<String>, position: Position) -> Self {
        Self {
            id: PlayerId::new(),
            name: name.into(),
            world: world.into(),
            position,
            health: 20.0,
            metadata: HashMap::new(),
        }
    }
}

/// Lightweight reference to the player an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerRef {
    pub id: PlayerId,
    pub name: String,
}

impl From<&PlayerSnapshot> for PlayerRef {
    fn from(player: &PlayerSnapshot) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
        }
    }
}

/// Lightweight reference to a non-player entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: EntityId,
    /// Entity type identifier, e.g. `minecraft:zombie`
    pub kind: String,
    pub position: Position,
}

/// Description of a loaded world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldInfo {
    pub name: String,
    pub spawn: Position,
    pub player_count: usize,
}

/// Snapshot of the server's static settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub motd: String,
    pub listen_addr: Option<SocketAddr>,
    pub max_players: usize,
    pub started_at: SystemTime,
}

/// Who issued a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandSource {
    Console,
    Player(PlayerId),
}
