//! Error types surfaced by the plugin host.
//!
//! Configuration, load and lifecycle failures are returned synchronously from
//! the [`Manager`](crate::Manager) and [`Api`](crate::Api) operations. Panics in
//! plugin code are never returned as values; they are recovered and turned into
//! an asynchronous disable of the offending plugin instead.

use std::path::PathBuf;

use crate::manager::Info;
use crate::types::PlayerId;

/// Errors produced while configuring, loading or managing plugins.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Plugin support is switched off in the configuration or by the host
    #[error("plugin support is disabled")]
    Disabled,
    /// The manager has been shut down and no longer accepts plugins
    #[error("plugin manager is shutting down")]
    ShuttingDown,
    /// A plugin is already loaded from the same resolved path
    #[error("plugin already loaded from {}", .0.display())]
    AlreadyLoaded(PathBuf),
    /// Another loaded plugin already uses this (case-insensitive) name
    #[error("a plugin named {0:?} is already loaded")]
    NameConflict(String),
    /// No loaded plugin matches the requested name
    #[error("plugin not found: {0}")]
    NotFound(String),
    /// The module file could not be opened
    #[error("failed to open plugin module {}: {reason}", .path.display())]
    ModuleOpen { path: PathBuf, reason: String },
    /// The module exports none of the accepted factory symbols
    #[error("plugin module {} exports no compatible factory", .0.display())]
    NoFactory(PathBuf),
    /// The factory reported an error while constructing the plugin
    #[error("plugin factory failed: {0}")]
    Factory(String),
    /// A legacy factory returned a null plugin
    #[error("plugin factory returned no plugin")]
    NilPlugin,
    /// Plugin code panicked during a lifecycle call
    #[error("plugin panicked: {0}")]
    Panicked(String),
    /// The plugin's `close` reported a failure; the plugin stays loaded
    #[error("plugin {name} failed to close: {reason}")]
    Close { name: String, reason: String },
    /// A sandboxed data path was absolute or rooted
    #[error("data path must be relative: {}", .0.display())]
    AbsoluteDataPath(PathBuf),
    /// A sandboxed data path resolved outside the plugin's data directory
    #[error("data path escapes the plugin data directory: {}", .0.display())]
    DataPathEscape(PathBuf),
    /// Invalid plugin configuration
    #[error("invalid plugin configuration: {0}")]
    Config(String),
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Failure reported by the host
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Errors reported by a [`Host`](crate::Host) implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// No online player with this id
    #[error("player not found: {0}")]
    PlayerNotFound(PlayerId),
    /// No registered command with this name or alias
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    /// A command with this name or alias is already registered
    #[error("command already registered: {0}")]
    CommandExists(String),
    /// The host has been closed
    #[error("host is closed")]
    Closed,
    /// The plugin asking for the capability has been disabled
    #[error("plugin is disabled: {0}")]
    PluginDisabled(String),
    /// Other host-side failure
    #[error("host error: {0}")]
    Internal(String),
}

/// Returned by [`Manager::disable_all`](crate::Manager::disable_all) when a
/// plugin refuses to close. Plugins disabled before the failure stay disabled.
#[derive(Debug, thiserror::Error)]
#[error("disabled {} plugin(s) before failing: {error}", .completed.len())]
pub struct DisableAllError {
    /// Plugins disabled before the failure, in the order they were disabled
    pub completed: Vec<Info>,
    #[source]
    pub error: PluginError,
}

/// Result type used throughout the plugin host.
pub type Result<T> = std::result::Result<T, PluginError>;
