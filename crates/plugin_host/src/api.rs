//! The per-plugin view of the host.
//!
//! Every plugin receives its own [`Api`] from its factory and reaches the
//! server only through it. The `Api` knows which plugin it belongs to, so
//! event registrations, commands, background tasks and file access are all
//! scoped to that plugin and cleaned up when it is disabled.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use arc_swap::ArcSwap;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::fs::{File, OpenOptions};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn, Level};

use crate::error::{HostError, PluginError, Result};
use crate::events::{DomainHandler, EventHub, InventoryHandler, PlayerHandler, Unregister, WorldHandler};
use crate::host::{Command, CommandOutput, CommandRunner, Host};
use crate::isolation::{log_panic, panic_message, run_isolated};
use crate::manager::{Info, Manager};
use crate::paths::resolve_within;
use crate::types::{CommandSource, PlayerId, PlayerSnapshot, ServerInfo, WorldInfo};

/// Sandboxed host access for one plugin.
pub struct Api {
    name: ArcSwap<String>,
    data_dir: ArcSwap<PathBuf>,
    lifecycle: CancellationToken,
    host: Arc<dyn Host>,
    hub: Arc<EventHub>,
    manager: Weak<Manager>,
    runtime: Handle,
    commands: Mutex<Vec<String>>,
}

impl Api {
    pub(crate) fn new(
        name: &str,
        data_dir: PathBuf,
        host: Arc<dyn Host>,
        hub: Arc<EventHub>,
        manager: Weak<Manager>,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: ArcSwap::from_pointee(name.to_string()),
            data_dir: ArcSwap::from_pointee(data_dir),
            lifecycle: CancellationToken::new(),
            host,
            hub,
            manager,
            runtime,
            commands: Mutex::new(Vec::new()),
        })
    }

    /// The plugin's current name. Until the constructor returns this is the
    /// module's file stem; afterwards it is the name the plugin reports.
    pub fn name(&self) -> String {
        self.name.load().as_ref().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        self.name.store(Arc::new(name.to_string()));
    }

    /// Root of the plugin's private data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.load().as_ref().clone()
    }

    pub(crate) fn set_data_dir(&self, dir: PathBuf) {
        self.data_dir.store(Arc::new(dir));
    }

    /// A token cancelled when the plugin is disabled.
    pub fn context(&self) -> CancellationToken {
        self.lifecycle.child_token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.lifecycle.is_cancelled()
    }

    pub(crate) fn cancel(&self) {
        self.lifecycle.cancel();
    }

    // ---- sandboxed files ----

    /// Resolves `relative` inside the data directory without touching the
    /// filesystem. Absolute paths and paths escaping the directory fail.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        resolve_within(&self.data_dir(), relative.as_ref())
    }

    /// Creates a directory (and its parents) inside the data directory.
    pub async fn ensure_dir(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let path = self.resolve(relative)?;
        tokio::fs::create_dir_all(&path).await?;
        Ok(path)
    }

    pub async fn open_file(&self, relative: impl AsRef<Path>, options: &OpenOptions) -> Result<File> {
        let path = self.resolve(relative)?;
        Ok(options.open(&path).await?)
    }

    pub async fn read(&self, relative: impl AsRef<Path>) -> Result<Vec<u8>> {
        let path = self.resolve(relative)?;
        Ok(tokio::fs::read(&path).await?)
    }

    /// Writes a file, creating missing parent directories.
    pub async fn write(&self, relative: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, contents).await?;
        Ok(())
    }

    // ---- background work ----

    /// Runs background work for this plugin.
    ///
    /// `task` receives a token that is cancelled when the plugin is disabled;
    /// the future is also dropped at that point. A panic inside the future
    /// quarantines the plugin exactly like a panicking event handler.
    pub fn spawn<F, Fut>(self: &Arc<Self>, task: F) -> JoinHandle<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.lifecycle.child_token();
        let future = task(token.clone());
        let api = Arc::downgrade(self);

        self.runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    trace!("Plugin task cancelled");
                }
                result = AssertUnwindSafe(future).catch_unwind() => {
                    if let (Err(payload), Some(api)) = (result, api.upgrade()) {
                        let name = api.name();
                        log_panic(&name, "background task", &panic_message(payload.as_ref()));
                        api.hub.quarantine(&name);
                    }
                }
            }
        })
    }

    // ---- host delegation ----

    pub fn server_info(&self) -> ServerInfo {
        self.host.server_info()
    }

    pub fn started_at(&self) -> SystemTime {
        self.host.started_at()
    }

    pub fn player(&self, id: PlayerId) -> Option<PlayerSnapshot> {
        self.host.player(id)
    }

    pub fn player_by_name(&self, name: &str) -> Option<PlayerSnapshot> {
        self.host.player_by_name(name)
    }

    pub fn players(&self) -> Vec<PlayerSnapshot> {
        self.host.players()
    }

    pub fn world(&self, name: &str) -> Option<WorldInfo> {
        self.host.world(name)
    }

    pub fn worlds(&self) -> Vec<WorldInfo> {
        self.host.worlds()
    }

    pub async fn send_message(&self, player: PlayerId, message: &str) -> std::result::Result<(), HostError> {
        self.host.send_message(player, message).await
    }

    pub async fn broadcast(&self, message: &str) -> std::result::Result<(), HostError> {
        self.host.broadcast(message).await
    }

    pub async fn execute_command(
        &self,
        source: CommandSource,
        line: &str,
    ) -> std::result::Result<CommandOutput, HostError> {
        self.host.execute_command(source, line).await
    }

    /// Registers a command owned by this plugin. The runner is isolated
    /// against panics and the command is removed when the plugin is disabled.
    ///
    /// Fails with [`HostError::PluginDisabled`] once the plugin is disabled.
    pub fn register_command(self: &Arc<Self>, command: Command) -> std::result::Result<(), HostError> {
        if self.is_cancelled() {
            return Err(HostError::PluginDisabled(self.name()));
        }
        let name = command.name.clone();
        let isolated = Command {
            runner: Arc::new(IsolatedRunner {
                api: Arc::downgrade(self),
                command: name.clone(),
                inner: Arc::clone(&command.runner),
            }),
            ..command
        };
        self.host.register_command(isolated)?;

        // A disable that cancelled after the check above has either drained
        // this list already or will; whoever removes the entry unregisters it.
        let mut commands = self.commands.lock();
        commands.push(name.clone());
        if self.is_cancelled() {
            commands.pop();
            drop(commands);
            self.host.unregister_command(&name);
            return Err(HostError::PluginDisabled(self.name()));
        }
        drop(commands);
        debug!(plugin = %self.name(), command = %name, "Registered plugin command");
        Ok(())
    }

    /// Removes a command this plugin registered.
    pub fn unregister_command(&self, name: &str) -> bool {
        let mut commands = self.commands.lock();
        let Some(index) = commands.iter().position(|c| c.eq_ignore_ascii_case(name)) else {
            return false;
        };
        commands.remove(index);
        drop(commands);
        self.host.unregister_command(name)
    }

    pub(crate) fn unregister_commands(&self) {
        let commands = std::mem::take(&mut *self.commands.lock());
        for command in commands {
            self.host.unregister_command(&command);
        }
    }

    // ---- manager delegation ----

    fn manager(&self) -> Result<Arc<Manager>> {
        self.manager.upgrade().ok_or(PluginError::ShuttingDown)
    }

    /// Loaded plugins in load order.
    pub async fn plugins(&self) -> Result<Vec<Info>> {
        Ok(self.manager()?.plugins().await)
    }

    pub async fn enable(&self, path: impl AsRef<Path>) -> Result<Info> {
        self.manager()?.enable(path).await
    }

    pub async fn disable(&self, name: &str) -> Result<Info> {
        self.manager()?.disable(name).await
    }

    pub async fn reload(&self, name: &str) -> Result<Info> {
        self.manager()?.reload(name).await
    }

    // ---- events and logging ----

    /// Event registration scoped to this plugin.
    pub fn events(&self) -> PluginEvents<'_> {
        PluginEvents { api: self }
    }

    /// Logs through `tracing` with the plugin name attached.
    pub fn log(&self, level: Level, message: &str) {
        let name = self.name();
        match level {
            Level::ERROR => error!(plugin = %name, "{}", message),
            Level::WARN => warn!(plugin = %name, "{}", message),
            Level::INFO => info!(plugin = %name, "{}", message),
            Level::DEBUG => debug!(plugin = %name, "{}", message),
            Level::TRACE => trace!(plugin = %name, "{}", message),
        }
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("name", &self.name())
            .field("data_dir", &self.data_dir())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Event registration methods of an [`Api`].
pub struct PluginEvents<'a> {
    api: &'a Api,
}

impl PluginEvents<'_> {
    /// Once the plugin is disabled, registrations are refused: the returned
    /// handle is already unregistered.
    pub fn on_player(&self, handler: Arc<dyn PlayerHandler>) -> Unregister {
        self.register(handler)
    }

    pub fn on_world(&self, handler: Arc<dyn WorldHandler>) -> Unregister {
        self.register(handler)
    }

    pub fn on_inventory(&self, handler: Arc<dyn InventoryHandler>) -> Unregister {
        self.register(handler)
    }

    fn register<H: DomainHandler + ?Sized>(&self, handler: Arc<H>) -> Unregister {
        let name = self.api.name();
        let registration = self.api.hub.register(&name, handler);
        // The lifecycle token is cancelled before a disabled plugin's
        // handlers are removed, so a registration racing the removal is
        // caught here.
        if self.api.is_cancelled() {
            registration.unregister();
            debug!(plugin = %name, domain = H::DOMAIN, "Refused handler from disabled plugin");
        }
        registration
    }

    /// Removes every handler this plugin registered.
    pub fn clear(&self) -> usize {
        self.api.hub.remove_owner(&self.api.name())
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.api.hub
    }
}

struct IsolatedRunner {
    api: Weak<Api>,
    command: String,
    inner: Arc<dyn CommandRunner>,
}

impl CommandRunner for IsolatedRunner {
    fn run(&self, source: &CommandSource, args: &[&str]) -> CommandOutput {
        let Some(api) = self.api.upgrade() else {
            return CommandOutput::new().error(format!("/{} is no longer available", self.command));
        };
        let owner = api.name();
        let what = format!("command /{}", self.command);
        match run_isolated(&owner, &what, || self.inner.run(source, args)) {
            Ok(output) => output,
            Err(_) => {
                api.hub.quarantine(&owner);
                CommandOutput::new().error(format!("/{} failed", self.command))
            }
        }
    }
}
