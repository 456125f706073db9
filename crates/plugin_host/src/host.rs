//! The capabilities the surrounding server exposes to the plugin host.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::HostError;
use crate::types::{CommandSource, PlayerId, PlayerSnapshot, ServerInfo, WorldInfo};

/// Server capabilities reachable from plugins.
///
/// Lookups are synchronous and return owned snapshots; anything that may
/// wait on the network is async.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    fn server_info(&self) -> ServerInfo;

    fn started_at(&self) -> SystemTime {
        self.server_info().started_at
    }

    /// Whether the server allows plugins at all.
    fn plugins_enabled(&self) -> bool {
        true
    }

    fn player(&self, id: PlayerId) -> Option<PlayerSnapshot>;

    /// Case-insensitive lookup by player name.
    fn player_by_name(&self, name: &str) -> Option<PlayerSnapshot>;

    fn players(&self) -> Vec<PlayerSnapshot>;

    fn world(&self, name: &str) -> Option<WorldInfo>;

    fn worlds(&self) -> Vec<WorldInfo>;

    async fn send_message(&self, player: PlayerId, message: &str) -> Result<(), HostError>;

    async fn broadcast(&self, message: &str) -> Result<(), HostError>;

    /// Registers a command under its name and aliases. Fails without
    /// registering anything if any of them is taken.
    fn register_command(&self, command: Command) -> Result<(), HostError>;

    /// Removes a command and its aliases. Returns whether it existed.
    fn unregister_command(&self, name: &str) -> bool;

    /// Runs a command line such as `"/greet Alex"`. A leading `/` is optional.
    async fn execute_command(&self, source: CommandSource, line: &str) -> Result<CommandOutput, HostError>;

    async fn close(&self) -> Result<(), HostError>;
}

/// Result of running a command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub messages: Vec<String>,
    pub errors: Vec<String>,
}

impl CommandOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Executes a command's logic.
pub trait CommandRunner: Send + Sync {
    fn run(&self, source: &CommandSource, args: &[&str]) -> CommandOutput;
}

impl<F> CommandRunner for F
where
    F: Fn(&CommandSource, &[&str]) -> CommandOutput + Send + Sync,
{
    fn run(&self, source: &CommandSource, args: &[&str]) -> CommandOutput {
        self(source, args)
    }
}

/// A command a plugin adds to the server.
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub description: String,
    pub aliases: Vec<String>,
    pub runner: Arc<dyn CommandRunner>,
}

impl Command {
    pub fn new(name: impl Into<String>, runner: impl CommandRunner + 'static) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            aliases: Vec::new(),
            runner: Arc::new(runner),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Name followed by aliases, lowercased.
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .map(|k| k.to_lowercase())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

/// A message delivered through [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// `None` for broadcasts
    pub to: Option<PlayerId>,
    pub text: String,
}

/// In-process [`Host`] backed by plain maps.
///
/// Used by the standalone server binary and by tests. Players and worlds are
/// added and removed by the embedding code; delivered messages are kept in
/// an outbox that can be inspected with [`sent`](Self::sent).
pub struct MemoryHost {
    info: ServerInfo,
    plugins_enabled: AtomicBool,
    players: RwLock<HashMap<PlayerId, PlayerSnapshot>>,
    worlds: RwLock<BTreeMap<String, WorldInfo>>,
    commands: RwLock<HashMap<String, Arc<Command>>>,
    outbox: Mutex<Vec<SentMessage>>,
    closed: AtomicBool,
}

impl MemoryHost {
    pub fn new(info: ServerInfo) -> Self {
        Self {
            info,
            plugins_enabled: AtomicBool::new(true),
            players: RwLock::new(HashMap::new()),
            worlds: RwLock::new(BTreeMap::new()),
            commands: RwLock::new(HashMap::new()),
            outbox: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// A host named `name` with default settings, started now.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(ServerInfo {
            name: name.into(),
            motd: String::new(),
            listen_addr: None,
            max_players: 20,
            started_at: SystemTime::now(),
        })
    }

    pub fn set_plugins_enabled(&self, enabled: bool) {
        self.plugins_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn add_world(&self, world: WorldInfo) {
        self.worlds.write().insert(world.name.clone(), world);
    }

    pub fn add_player(&self, player: PlayerSnapshot) {
        debug!(player = %player.name, "Player joined");
        self.players.write().insert(player.id, player);
    }

    pub fn remove_player(&self, id: PlayerId) -> Option<PlayerSnapshot> {
        self.players.write().remove(&id)
    }

    /// Messages delivered so far, oldest first.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.outbox.lock().clone()
    }

    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .commands
            .read()
            .values()
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), HostError> {
        if self.is_closed() {
            Err(HostError::Closed)
        } else {
            Ok(())
        }
    }

    fn with_player_count(&self, mut world: WorldInfo) -> WorldInfo {
        world.player_count = self
            .players
            .read()
            .values()
            .filter(|p| p.world == world.name)
            .count();
        world
    }
}

#[async_trait]
impl Host for MemoryHost {
    fn server_info(&self) -> ServerInfo {
        self.info.clone()
    }

    fn plugins_enabled(&self) -> bool {
        self.plugins_enabled.load(Ordering::SeqCst)
    }

    fn player(&self, id: PlayerId) -> Option<PlayerSnapshot> {
        self.players.read().get(&id).cloned()
    }

    fn player_by_name(&self, name: &str) -> Option<PlayerSnapshot> {
        self.players
            .read()
            .values()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    fn players(&self) -> Vec<PlayerSnapshot> {
        let mut players: Vec<_> = self.players.read().values().cloned().collect();
        players.sort_by(|a, b| a.name.cmp(&b.name));
        players
    }

    fn world(&self, name: &str) -> Option<WorldInfo> {
        let world = self.worlds.read().get(name).cloned()?;
        Some(self.with_player_count(world))
    }

    fn worlds(&self) -> Vec<WorldInfo> {
        let worlds: Vec<_> = self.worlds.read().values().cloned().collect();
        worlds.into_iter().map(|w| self.with_player_count(w)).collect()
    }

    async fn send_message(&self, player: PlayerId, message: &str) -> Result<(), HostError> {
        self.check_open()?;
        if !self.players.read().contains_key(&player) {
            return Err(HostError::PlayerNotFound(player));
        }
        self.outbox.lock().push(SentMessage {
            to: Some(player),
            text: message.to_string(),
        });
        Ok(())
    }

    async fn broadcast(&self, message: &str) -> Result<(), HostError> {
        self.check_open()?;
        info!(target: "broadcast", "{}", message);
        self.outbox.lock().push(SentMessage {
            to: None,
            text: message.to_string(),
        });
        Ok(())
    }

    fn register_command(&self, command: Command) -> Result<(), HostError> {
        let mut commands = self.commands.write();
        if let Some(taken) = command.keys().find(|k| commands.contains_key(k)) {
            return Err(HostError::CommandExists(taken));
        }
        let keys: Vec<_> = command.keys().collect();
        let command = Arc::new(command);
        for key in keys {
            commands.insert(key, Arc::clone(&command));
        }
        debug!(command = %command.name, "Registered command");
        Ok(())
    }

    fn unregister_command(&self, name: &str) -> bool {
        let mut commands = self.commands.write();
        let Some(command) = commands.get(&name.to_lowercase()).cloned() else {
            return false;
        };
        commands.retain(|_, c| !Arc::ptr_eq(c, &command));
        true
    }

    async fn execute_command(&self, source: CommandSource, line: &str) -> Result<CommandOutput, HostError> {
        self.check_open()?;
        let line = line.trim();
        let line = line.strip_prefix('/').unwrap_or(line);
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default().to_lowercase();
        let args: Vec<&str> = parts.collect();

        let command = self
            .commands
            .read()
            .get(&name)
            .cloned()
            .ok_or_else(|| HostError::UnknownCommand(name.clone()))?;
        Ok(command.runner.run(&source, &args))
    }

    async fn close(&self) -> Result<(), HostError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(server = %self.info.name, "Host closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;

    fn echo() -> Command {
        Command::new("Echo", |_: &CommandSource, args: &[&str]| {
            CommandOutput::new().message(args.join(" "))
        })
        .alias("say")
    }

    #[tokio::test]
    async fn test_command_lifecycle() {
        let host = MemoryHost::named("test");
        host.register_command(echo()).unwrap();

        let out = host
            .execute_command(CommandSource::Console, "/SAY hello  world")
            .await
            .unwrap();
        assert_eq!(out.messages, vec!["hello world"]);
        assert!(out.is_ok());

        assert_eq!(
            host.register_command(Command::new("other", |_: &CommandSource, _: &[&str]| CommandOutput::new()).alias("echo")),
            Err(HostError::CommandExists("echo".into()))
        );
        assert!(host.execute_command(CommandSource::Console, "other").await.is_err());

        assert!(host.unregister_command("say"));
        assert!(!host.unregister_command("echo"));
        assert_eq!(
            host.execute_command(CommandSource::Console, "echo hi").await,
            Err(HostError::UnknownCommand("echo".into()))
        );
    }

    #[tokio::test]
    async fn test_players_worlds_and_messages() {
        let host = MemoryHost::named("test");
        host.add_world(WorldInfo {
            name: "overworld".into(),
            spawn: Position::default(),
            player_count: 0,
        });
        let alex = PlayerSnapshot::new("Alex", "overworld", Position::new(1.0, 64.0, 1.0));
        let id = alex.id;
        host.add_player(alex);

        assert_eq!(host.player_by_name("alex").map(|p| p.id), Some(id));
        assert_eq!(host.world("overworld").unwrap().player_count, 1);
        assert!(host.world("nether").is_none());

        host.send_message(id, "hi").await.unwrap();
        host.broadcast("everyone").await.unwrap();
        let stranger = PlayerId::new();
        assert_eq!(
            host.send_message(stranger, "hi").await,
            Err(HostError::PlayerNotFound(stranger))
        );
        assert_eq!(
            host.sent(),
            vec![
                SentMessage { to: Some(id), text: "hi".into() },
                SentMessage { to: None, text: "everyone".into() },
            ]
        );

        host.close().await.unwrap();
        assert!(host.is_closed());
        assert_eq!(host.broadcast("late").await, Err(HostError::Closed));
    }
}
