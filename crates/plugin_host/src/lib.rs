//! # Horizon Plugin Host
//!
//! Loads extension modules at runtime, gives each one a capability-scoped
//! [`Api`], fans server events out to the handlers plugins register, and keeps
//! a misbehaving plugin from taking the server down with it.
//!
//! ## Core Features
//!
//! - **Dynamic loading**: native modules through `libloading`, or compiled-in
//!   modules through [`StaticLoader`]
//! - **Event fan-out**: per-domain handler chains with registration-order
//!   dispatch and cancellation
//! - **Fault isolation**: panics in handlers, commands, constructors, `close`
//!   and background tasks are caught and the plugin is disabled
//! - **Sandboxed storage**: every plugin gets a private data directory it
//!   cannot escape
//! - **Lock-free dispatch**: handler lists are published as immutable
//!   snapshots, so dispatch never waits on registration
//!
//! ## Hosting plugins
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use plugin_host::{DynamicLoader, Manager, MemoryHost, NopHandler, PluginSettings};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let host = Arc::new(MemoryHost::named("horizon"));
//! let manager = Manager::new(PluginSettings::default(), host, Arc::new(DynamicLoader::new()))?;
//!
//! // Install the chain where the server keeps its own player handler.
//! let players = manager.wrap_player_handler(Arc::new(NopHandler));
//!
//! manager.load_all().await?;
//! // ... dispatch events through `players` ...
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Writing a plugin
//!
//! A plugin crate builds as a `cdylib`, implements [`Plugin`] and exports its
//! constructor with [`export_plugin!`]. See the `plugin_greeter` crate for a
//! complete example.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod isolation;
pub mod loader;
pub mod manager;
pub mod paths;
pub mod plugin;
pub mod types;

pub use api::{Api, PluginEvents};
pub use config::PluginSettings;
pub use error::{DisableAllError, HostError, PluginError, Result};
pub use events::{
    EventContext, EventHub, HandlerChain, HandlerId, InventoryHandler, NopHandler, PlayerHandler, Unregister,
    WorldHandler,
};
pub use host::{Command, CommandOutput, CommandRunner, Host, MemoryHost, SentMessage};
pub use loader::{DynamicLoader, Factory, FactoryShape, Module, ModuleLoader, StaticLoader};
pub use manager::{Info, Manager};
pub use plugin::Plugin;
pub use types::*;

// Re-exported for plugin crates and `export_plugin!`.
pub use anyhow;
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
