//! # Greeter plugin
//!
//! Welcomes players when they join, answers "hello" in chat and adds a
//! `/greet <player>` command. Visit counts survive restarts in
//! `visits.json` inside the plugin's data directory.

use parking_lot::Mutex;
use plugin_host::{
    anyhow, async_trait, export_plugin, Api, Command, CommandOutput, CommandSource, EventContext, Plugin,
    PlayerHandler, PlayerId, PlayerRef,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::{info, warn};

const VISITS_FILE: &str = "visits.json";

/// Number of times each player has joined, keyed by player name.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visits {
    pub players: BTreeMap<String, u32>,
}

impl Visits {
    /// Counts a join and returns the player's new total.
    pub fn record(&mut self, player: &str) -> u32 {
        let count = self.players.entry(player.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

/// Visit counts, read from the data directory on first use.
///
/// The data directory is only final once the plugin's name has settled,
/// which happens after the factory returns, so nothing is read before then.
struct VisitBook {
    api: Arc<Api>,
    visits: Mutex<Option<Visits>>,
}

impl VisitBook {
    fn new(api: Arc<Api>) -> Self {
        Self {
            api,
            visits: Mutex::new(None),
        }
    }

    /// Counts a join and returns the new total with an encoded snapshot.
    fn record(&self, player: &str) -> (u32, serde_json::Result<Vec<u8>>) {
        let mut guard = self.visits.lock();
        let visits = guard.get_or_insert_with(|| load_visits(&self.api));
        let count = visits.record(player);
        (count, serde_json::to_vec_pretty(visits))
    }

    /// The encoded counts, or `None` if they were never touched.
    fn snapshot(&self) -> Option<serde_json::Result<Vec<u8>>> {
        self.visits.lock().as_ref().map(serde_json::to_vec_pretty::<Visits>)
    }
}

fn load_visits(api: &Api) -> Visits {
    let path = match api.resolve(VISITS_FILE) {
        Ok(path) => path,
        Err(e) => {
            warn!("👋 GreeterPlugin: Bad visits path: {}", e);
            return Visits::default();
        }
    };
    // Handlers are synchronous; the file is small.
    match std::fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!("👋 GreeterPlugin: Ignoring unreadable {}: {}", path.display(), e);
            Visits::default()
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Visits::default(),
        Err(e) => {
            warn!("👋 GreeterPlugin: Could not read {}: {}", path.display(), e);
            Visits::default()
        }
    }
}

pub struct GreeterPlugin {
    api: Arc<Api>,
    visits: Arc<VisitBook>,
}

impl GreeterPlugin {
    pub fn create(api: Arc<Api>) -> anyhow::Result<Self> {
        let visits = Arc::new(VisitBook::new(api.clone()));

        api.events().on_player(Arc::new(Greetings {
            api: api.clone(),
            visits: visits.clone(),
        }));
        api.register_command(greet_command(api.clone()))?;

        info!("👋 GreeterPlugin: Ready to welcome players!");
        Ok(Self { api, visits })
    }
}

#[async_trait]
impl Plugin for GreeterPlugin {
    fn name(&self) -> &str {
        "Greeter"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        if let Some(json) = self.visits.snapshot() {
            self.api.write(VISITS_FILE, json?).await?;
            info!("👋 GreeterPlugin: Saved visits");
        }
        info!("👋 GreeterPlugin: Goodbye!");
        Ok(())
    }
}

export_plugin!(GreeterPlugin::create);

/// Sends `text` to `player` from a plugin task.
fn deliver(api: &Arc<Api>, player: PlayerId, text: String) {
    let sender = api.clone();
    api.spawn(move |_| async move {
        if let Err(e) = sender.send_message(player, &text).await {
            warn!("👋 GreeterPlugin: Could not deliver greeting: {}", e);
        }
    });
}

struct Greetings {
    api: Arc<Api>,
    visits: Arc<VisitBook>,
}

impl PlayerHandler for Greetings {
    fn handle_join(&self, player: &PlayerRef) {
        let (count, snapshot) = self.visits.record(&player.name);

        let text = if count == 1 {
            format!("Welcome to {}, {}!", self.api.server_info().name, player.name)
        } else {
            format!("Welcome back, {}! This is visit #{}.", player.name, count)
        };
        deliver(&self.api, player.id, text);

        match snapshot {
            Ok(json) => {
                let api = self.api.clone();
                self.api.spawn(move |_| async move {
                    if let Err(e) = api.write(VISITS_FILE, json).await {
                        warn!("👋 GreeterPlugin: Could not save visits: {}", e);
                    }
                });
            }
            Err(e) => warn!("👋 GreeterPlugin: Could not encode visits: {}", e),
        }
    }

    fn handle_chat(&self, _ctx: &mut EventContext, player: &PlayerRef, message: &mut String) {
        let greeting = message.trim().to_lowercase();
        if greeting == "hello" || greeting.starts_with("hello ") {
            deliver(&self.api, player.id, format!("Hello, {}! 👋", player.name));
        }
    }
}

fn greet_command(api: Arc<Api>) -> Command {
    Command::new("greet", move |source: &CommandSource, args: &[&str]| {
        let Some(target) = args.first() else {
            return CommandOutput::new().error("Usage: /greet <player>");
        };
        let Some(player) = api.player_by_name(target) else {
            return CommandOutput::new().error(format!("No player named {}", target));
        };

        let from = match source {
            CommandSource::Console => "The server".to_string(),
            CommandSource::Player(id) => api.player(*id).map(|p| p.name).unwrap_or_else(|| "Someone".to_string()),
        };
        deliver(&api, player.id, format!("👋 {} says hello!", from));
        CommandOutput::new().message(format!("Greeted {}", player.name))
    })
    .description("Send a friendly greeting to a player")
    .alias("wave")
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_host::{
        Factory, Host, Manager, MemoryHost, NopHandler, PlayerSnapshot, PluginSettings, Position, SentMessage,
        StaticLoader,
    };
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        host: Arc<MemoryHost>,
        manager: Arc<Manager>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(MemoryHost::named("Horizon"));
        let manager = manager_in(dir.path(), &host, "greeter");
        Fixture { dir, host, manager }
    }

    /// A manager that finds the greeter under the module file stem `stem`.
    fn manager_in(dir: &std::path::Path, host: &Arc<MemoryHost>, stem: &str) -> Arc<Manager> {
        let loader = Arc::new(StaticLoader::new());
        loader.register(stem, Factory::create(horizon_plugin_create));
        let settings = PluginSettings {
            directory: dir.join("plugins"),
            ..Default::default()
        };
        Manager::new(settings, host.clone(), loader).unwrap()
    }

    async fn wait_for_messages(host: &MemoryHost, count: usize) -> Vec<SentMessage> {
        for _ in 0..100 {
            let sent = host.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} message(s), got {:?}", count, host.sent());
    }

    #[test]
    fn test_visits_record() {
        let mut visits = Visits::default();
        assert_eq!(visits.record("alex"), 1);
        assert_eq!(visits.record("alex"), 2);
        assert_eq!(visits.record("sam"), 1);
    }

    #[tokio::test]
    async fn test_welcomes_and_remembers_players() {
        let fx = fixture();
        let alex = PlayerSnapshot::new("Alex", "overworld", Position::default());
        fx.host.add_player(alex.clone());
        let players = fx.manager.wrap_player_handler(Arc::new(NopHandler));

        let info = fx.manager.enable("greeter.so").await.unwrap();
        assert_eq!(info.name, "Greeter");

        players.handle_join(&PlayerRef::from(&alex));
        let sent = wait_for_messages(&fx.host, 1).await;
        assert_eq!(sent[0].to, Some(alex.id));
        assert_eq!(sent[0].text, "Welcome to Horizon, Alex!");

        fx.manager.disable("greeter").await.unwrap();
        let saved: Visits =
            serde_json::from_slice(&std::fs::read(info.data_dir.join(VISITS_FILE)).unwrap()).unwrap();
        assert_eq!(saved.players.get("Alex"), Some(&1));

        fx.manager.enable("greeter.so").await.unwrap();
        players.handle_join(&PlayerRef::from(&alex));
        let sent = wait_for_messages(&fx.host, 2).await;
        assert_eq!(sent[1].text, "Welcome back, Alex! This is visit #2.");
        assert!(fx.dir.path().join("plugins/data").exists());
    }

    #[tokio::test]
    async fn test_visits_survive_restart_under_library_file_name() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(MemoryHost::named("Horizon"));
        let alex = PlayerSnapshot::new("Alex", "overworld", Position::default());
        host.add_player(alex.clone());

        for (run, expected) in [
            "Welcome to Horizon, Alex!",
            "Welcome back, Alex! This is visit #2.",
        ]
        .into_iter()
        .enumerate()
        {
            let manager = manager_in(dir.path(), &host, "libplugin_greeter");
            let players = manager.wrap_player_handler(Arc::new(NopHandler));
            let info = manager.enable("libplugin_greeter.so").await.unwrap();
            assert_eq!(info.data_dir, dir.path().join("plugins/data/greeter"));

            players.handle_join(&PlayerRef::from(&alex));
            let sent = wait_for_messages(&host, run + 1).await;
            assert_eq!(sent[run].text, expected);
            manager.shutdown().await;
        }

        let saved: Visits =
            serde_json::from_slice(&std::fs::read(dir.path().join("plugins/data/greeter").join(VISITS_FILE)).unwrap())
                .unwrap();
        assert_eq!(saved.players.get("Alex"), Some(&2));
        assert!(!dir.path().join("plugins/data/libplugin_greeter").exists());
    }

    #[tokio::test]
    async fn test_untouched_visits_are_not_rewritten() {
        let fx = fixture();
        let data = fx.dir.path().join("plugins/data/greeter");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join(VISITS_FILE), br#"{"players":{"Sam":7}}"#).unwrap();

        fx.manager.enable("greeter.so").await.unwrap();
        fx.manager.disable("greeter").await.unwrap();
        assert_eq!(std::fs::read(data.join(VISITS_FILE)).unwrap(), br#"{"players":{"Sam":7}}"#);
    }

    #[tokio::test]
    async fn test_answers_hello_in_chat() {
        let fx = fixture();
        let sam = PlayerSnapshot::new("Sam", "overworld", Position::default());
        fx.host.add_player(sam.clone());
        let players = fx.manager.wrap_player_handler(Arc::new(NopHandler));
        fx.manager.enable("greeter.so").await.unwrap();

        let mut ctx = EventContext::new();
        let mut message = "nice weather".to_string();
        players.handle_chat(&mut ctx, &PlayerRef::from(&sam), &mut message);
        let mut message = "Hello everyone".to_string();
        players.handle_chat(&mut ctx, &PlayerRef::from(&sam), &mut message);
        assert!(!ctx.is_cancelled());

        let sent = wait_for_messages(&fx.host, 1).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "Hello, Sam! 👋");
    }

    #[tokio::test]
    async fn test_greet_command() {
        let fx = fixture();
        let alex = PlayerSnapshot::new("Alex", "overworld", Position::default());
        let sam = PlayerSnapshot::new("Sam", "overworld", Position::default());
        fx.host.add_player(alex.clone());
        fx.host.add_player(sam.clone());
        fx.manager.enable("greeter.so").await.unwrap();

        let out = fx
            .host
            .execute_command(CommandSource::Player(alex.id), "/greet sam")
            .await
            .unwrap();
        assert_eq!(out.messages, vec!["Greeted Sam"]);
        let sent = wait_for_messages(&fx.host, 1).await;
        assert_eq!(sent[0].to, Some(sam.id));
        assert_eq!(sent[0].text, "👋 Alex says hello!");

        let out = fx.host.execute_command(CommandSource::Console, "wave nobody").await.unwrap();
        assert!(!out.is_ok());
        let out = fx.host.execute_command(CommandSource::Console, "greet").await.unwrap();
        assert_eq!(out.errors, vec!["Usage: /greet <player>"]);

        fx.manager.disable("Greeter").await.unwrap();
        assert!(fx.host.command_names().is_empty());
        assert!(fx.host.execute_command(CommandSource::Console, "/greet sam").await.is_err());
    }
}
