//! Standalone Horizon plugin host.
//!
//! Loads plugins from a directory into an in-memory server, keeps them
//! running until SIGINT/SIGTERM and then unloads them in reverse order.

mod cli;
mod config;
mod handlers;
mod logging;
mod signals;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use plugin_host::{
    DynamicLoader, Host, InventoryHandler, Manager, MemoryHost, PlayerHandler, PlayerRef, Position, WorldHandler,
    WorldInfo,
};
use tracing::{error, info, warn};

use cli::CliArgs;
use config::AppConfig;
use handlers::ServerHandlers;

/// The chains the server dispatches through in place of its own handlers.
struct EventChains {
    players: Arc<dyn PlayerHandler>,
    worlds: Arc<dyn WorldHandler>,
    _inventories: Arc<dyn InventoryHandler>,
}

struct Application {
    config: AppConfig,
    host: Arc<MemoryHost>,
    manager: Arc<Manager>,
    chains: EventChains,
}

impl Application {
    async fn new(args: CliArgs) -> Result<Self> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        config.apply_cli(&args);
        config.validate().context("Configuration validation failed")?;

        logging::setup_logging(&config.logging)?;
        display_banner();

        let host = Arc::new(MemoryHost::new(config.server_info()));
        for world in &config.server.worlds {
            host.add_world(WorldInfo {
                name: world.clone(),
                spawn: Position::default(),
                player_count: 0,
            });
        }

        let manager = Manager::new(config.plugins.clone(), host.clone(), Arc::new(DynamicLoader::new()))?;

        let base = Arc::new(ServerHandlers);
        let chains = EventChains {
            players: manager.wrap_player_handler(base.clone()),
            worlds: manager.wrap_world_handler(base.clone()),
            _inventories: manager.wrap_inventory_handler(base),
        };

        info!(
            "📂 Config: {} | Plugins: {} | Data: {}",
            args.config_path.display(),
            config.plugins.directory.display(),
            config.plugins.data_root().display()
        );

        Ok(Self {
            config,
            host,
            manager,
            chains,
        })
    }

    async fn run(self) -> Result<()> {
        info!("🌟 Starting {}", self.config.server.name);

        if !self.config.plugins.enabled {
            warn!("🔌 Plugins are disabled in the configuration");
        } else if let Err(e) = self.manager.load_all().await {
            warn!("🔌 Failed to load plugins: {}", e);
        }

        for plugin in self.manager.plugins().await {
            info!("  🔌 {} {} ({})", plugin.name, plugin.version, plugin.path.display());
        }

        let monitoring_handle = {
            let manager = self.manager.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                interval.tick().await;
                loop {
                    interval.tick().await;
                    info!(
                        "📊 {} plugins active | {} handlers registered",
                        manager.plugins().await.len(),
                        manager.events().handler_count()
                    );
                }
            })
        };

        info!("✅ Plugin host is now running");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let received = signals::wait_for_shutdown().await?;
        info!("🛑 {} received, initiating graceful shutdown...", received);
        monitoring_handle.abort();

        self.stop().await;
        Ok(())
    }

    async fn stop(self) {
        // Plugins see players leave and worlds close before they are unloaded.
        for player in self.host.players() {
            self.chains.players.handle_quit(&PlayerRef::from(&player));
            self.host.remove_player(player.id);
        }
        for world in self.host.worlds() {
            self.chains.worlds.handle_close(&world.name);
        }

        let unloaded = self.manager.shutdown().await;
        info!("🔌 Unloaded {} plugin(s)", unloaded.len());

        if let Err(e) = self.host.close().await {
            warn!("Host did not close cleanly: {}", e);
        }
        info!("👋 Plugin host shutdown complete");
    }
}

fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║         🌟 HORIZON PLUGIN HOST 🌟        ║");
    info!("║               v{:<10}                ║", version);
    info!("╚══════════════════════════════════════════╝");
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let app = match Application::new(args).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("❌ Failed to start plugin host: {:?}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("❌ Application error: {:?}", e);
        std::process::exit(1);
    }
    Ok(())
}
