//! Plugin lifecycle management.
//!
//! The [`Manager`] owns every loaded plugin. It resolves and loads modules,
//! constructs plugins with their [`Api`], settles each plugin's final name
//! and data directory, and tears plugins down again on request, on panic or
//! at shutdown.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::api::Api;
use crate::config::PluginSettings;
use crate::error::{DisableAllError, PluginError, Result};
use crate::events::{EventHub, InventoryHandler, PlayerHandler, WorldHandler};
use crate::host::Host;
use crate::isolation::{log_panic, panic_message, run_isolated};
use crate::loader::{find_factory, Module, ModuleLoader};
use crate::paths::{clean_path, migrate_dir, sanitize_name};
use crate::plugin::Plugin;

/// Public description of a loaded plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Info {
    pub name: String,
    pub version: String,
    /// Resolved module path
    pub path: PathBuf,
    /// The plugin's sandboxed data directory
    pub data_dir: PathBuf,
}

struct PluginInstance {
    name: String,
    version: String,
    path: PathBuf,
    /// Name used while the constructor ran
    initial_name: String,
    // Declared before `module` so the plugin is dropped first.
    plugin: Box<dyn Plugin>,
    api: Arc<Api>,
    _module: Arc<dyn Module>,
}

impl PluginInstance {
    fn info(&self) -> Info {
        Info {
            name: self.name.clone(),
            version: self.version.clone(),
            path: self.path.clone(),
            data_dir: self.api.data_dir(),
        }
    }
}

/// Loads, tracks and unloads plugins.
pub struct Manager {
    config: PluginSettings,
    host: Arc<dyn Host>,
    loader: Arc<dyn ModuleLoader>,
    hub: Arc<EventHub>,
    runtime: Handle,
    this: Weak<Manager>,
    /// Loaded plugins in load order
    plugins: Mutex<Vec<PluginInstance>>,
    /// Names reserved by enables whose constructor is still running
    pending: parking_lot::Mutex<HashSet<String>>,
    shut_down: AtomicBool,
}

impl Manager {
    /// Creates a manager on the current Tokio runtime.
    pub fn new(
        config: PluginSettings,
        host: Arc<dyn Host>,
        loader: Arc<dyn ModuleLoader>,
    ) -> Result<Arc<Self>> {
        let runtime = Handle::try_current()
            .map_err(|e| PluginError::Config(format!("plugin manager needs a Tokio runtime: {e}")))?;
        Self::with_runtime(config, host, loader, runtime)
    }

    /// Creates a manager that runs plugin tasks on `runtime`.
    pub fn with_runtime(
        config: PluginSettings,
        host: Arc<dyn Host>,
        loader: Arc<dyn ModuleLoader>,
        runtime: Handle,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        Ok(Arc::new_cyclic(|this: &Weak<Manager>| {
            let manager = this.clone();
            let hub = Arc::new(EventHub::with_fault_hook(move |name| {
                if let Some(manager) = manager.upgrade() {
                    manager.schedule_disable(name);
                }
            }));

            Self {
                config,
                host,
                loader,
                hub,
                runtime,
                this: this.clone(),
                plugins: Mutex::new(Vec::new()),
                pending: parking_lot::Mutex::new(HashSet::new()),
                shut_down: AtomicBool::new(false),
            }
        }))
    }

    pub fn config(&self) -> &PluginSettings {
        &self.config
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// The hub all plugin handlers are registered with.
    pub fn events(&self) -> &Arc<EventHub> {
        &self.hub
    }

    /// Wraps the host's player handler so plugins see events first.
    pub fn wrap_player_handler(&self, base: Arc<dyn PlayerHandler>) -> Arc<dyn PlayerHandler> {
        self.hub.wrap_player(base)
    }

    pub fn wrap_world_handler(&self, base: Arc<dyn WorldHandler>) -> Arc<dyn WorldHandler> {
        self.hub.wrap_world(base)
    }

    pub fn wrap_inventory_handler(&self, base: Arc<dyn InventoryHandler>) -> Arc<dyn InventoryHandler> {
        self.hub.wrap_inventory(base)
    }

    /// Loaded plugins in load order.
    pub async fn plugins(&self) -> Vec<Info> {
        self.plugins.lock().await.iter().map(PluginInstance::info).collect()
    }

    /// Looks up a loaded plugin by case-insensitive name.
    pub async fn plugin(&self, name: &str) -> Option<Info> {
        self.plugins
            .lock()
            .await
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(PluginInstance::info)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn check_accepting(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(PluginError::ShuttingDown);
        }
        if !self.config.enabled || !self.host.plugins_enabled() {
            return Err(PluginError::Disabled);
        }
        Ok(())
    }

    /// Resolves a user-supplied module path against the plugin directory.
    /// Must run once per path; the result is what `enable_resolved` takes.
    async fn resolve_path(&self, path: &Path) -> PathBuf {
        canonical_or_clean(self.config.resolve_module(path)).await
    }

    /// Module files in the plugin directory, sorted by path.
    pub async fn discover(&self) -> Result<Vec<PathBuf>> {
        let dir = &self.config.directory;
        if !tokio::fs::try_exists(dir).await? {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if self.loader.accepts(&path) {
                found.push(path);
            }
        }
        found.sort();
        debug!(dir = %dir.display(), count = found.len(), "Discovered plugin modules");
        Ok(found)
    }

    /// Loads the configured plugins: every discovered module when autoload
    /// is on, plus the explicitly listed files. Individual failures are
    /// logged and skipped.
    pub async fn load_all(&self) -> Result<Vec<Info>> {
        self.check_accepting()?;
        tokio::fs::create_dir_all(&self.config.directory).await?;

        let mut candidates = Vec::new();
        if self.config.autoload {
            // Discovered entries already carry the plugin directory.
            for found in self.discover().await? {
                candidates.push(canonical_or_clean(found).await);
            }
        }
        for file in &self.config.files {
            candidates.push(self.resolve_path(file).await);
        }

        let mut seen = HashSet::new();
        let mut loaded = Vec::new();
        for path in candidates {
            if !seen.insert(path.clone()) {
                continue;
            }
            match self.enable_resolved(path.clone()).await {
                Ok(info) => loaded.push(info),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to load plugin"),
            }
        }

        info!(
            "Loaded {} plugin(s) from {}",
            loaded.len(),
            self.config.directory.display()
        );
        Ok(loaded)
    }

    /// Loads and starts the plugin module at `path`.
    ///
    /// Relative paths are taken from the configured plugin directory.
    pub async fn enable(&self, path: impl AsRef<Path>) -> Result<Info> {
        self.check_accepting()?;
        let path = self.resolve_path(path.as_ref()).await;
        self.enable_resolved(path).await
    }

    async fn enable_resolved(&self, path: PathBuf) -> Result<Info> {
        self.check_accepting()?;
        info!(path = %path.display(), "Enabling plugin");

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "plugin".to_string());
        let reservation = {
            let plugins = self.plugins.lock().await;
            if plugins.iter().any(|p| p.path == path) {
                return Err(PluginError::AlreadyLoaded(path));
            }
            self.reserve_name(&plugins, &stem)
        };
        let initial_name = reservation.name.clone();

        let module = self.loader.load(&path)?;
        let factory = find_factory(module.as_ref()).ok_or_else(|| PluginError::NoFactory(path.clone()))?;

        let data_root = self.config.data_root();
        let initial_dir = data_root.join(sanitize_name(&initial_name));
        tokio::fs::create_dir_all(&initial_dir).await?;

        let api = Api::new(
            &initial_name,
            initial_dir.clone(),
            Arc::clone(&self.host),
            Arc::clone(&self.hub),
            self.this.clone(),
            self.runtime.clone(),
        );

        let constructed = run_isolated(&initial_name, "constructor", || {
            let plugin = factory.construct(Arc::clone(&api))?;
            let name = plugin.name().trim().to_string();
            let version = plugin.version().to_string();
            Ok::<_, PluginError>((plugin, name, version))
        });
        let (mut plugin, name, version) = match constructed {
            Ok(Ok(built)) => built,
            Ok(Err(e)) => {
                self.abort_enable(&api, &initial_name);
                warn!(plugin = %initial_name, error = %e, "Plugin constructor failed");
                return Err(e);
            }
            Err(message) => {
                self.abort_enable(&api, &initial_name);
                return Err(PluginError::Panicked(message));
            }
        };
        let name = if name.is_empty() { initial_name.clone() } else { name };
        let dir_name = sanitize_name(&name);

        let mut plugins = self.plugins.lock().await;

        let rejection = if self.is_shut_down() {
            Some(PluginError::ShuttingDown)
        } else if plugins.iter().any(|p| p.path == path) {
            Some(PluginError::AlreadyLoaded(path.clone()))
        } else if plugins
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(&name) || sanitize_name(&p.name) == dir_name)
        {
            Some(PluginError::NameConflict(name.clone()))
        } else {
            None
        };
        if let Some(rejection) = rejection {
            drop(plugins);
            warn!(plugin = %name, path = %path.display(), error = %rejection, "Rejecting plugin");
            if let Err(e) = close_plugin(&name, plugin.as_mut()).await {
                warn!(plugin = %name, error = %e, "Rejected plugin failed to close");
            }
            self.abort_enable(&api, &initial_name);
            return Err(rejection);
        }

        if name != initial_name {
            api.set_name(&name);
            let moved = self.hub.rename_owner(&initial_name, &name);
            debug!(plugin = %name, from = %initial_name, moved, "Renamed plugin handlers");

            let target = data_root.join(&dir_name);
            if target != initial_dir {
                let from = initial_dir.clone();
                let to = target.clone();
                let migrated = tokio::task::spawn_blocking(move || migrate_dir(&from, &to)).await;
                match migrated {
                    Ok(Ok(())) => {
                        debug!(plugin = %name, dir = %target.display(), "Migrated plugin data directory");
                        api.set_data_dir(target);
                    }
                    Ok(Err(e)) => warn!(
                        plugin = %name,
                        from = %initial_dir.display(),
                        to = %target.display(),
                        error = %e,
                        "Could not migrate plugin data directory, keeping the old one"
                    ),
                    Err(e) => warn!(plugin = %name, error = %e, "Data directory migration task failed"),
                }
            }
        }

        let instance = PluginInstance {
            name,
            version,
            path,
            initial_name,
            plugin,
            api,
            _module: module,
        };
        let info = instance.info();
        plugins.push(instance);
        drop(plugins);
        drop(reservation);

        info!(
            plugin = %info.name,
            version = %info.version,
            path = %info.path.display(),
            "Plugin enabled"
        );
        Ok(info)
    }

    /// Closes and unloads a plugin by case-insensitive name.
    ///
    /// If the plugin's `close` fails or panics it is put back where it was
    /// and stays enabled.
    pub async fn disable(&self, name: &str) -> Result<Info> {
        let (index, mut instance) = {
            let mut plugins = self.plugins.lock().await;
            let index = plugins
                .iter()
                .position(|p| p.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
            (index, plugins.remove(index))
        };

        info!(plugin = %instance.name, "Disabling plugin");
        if let Err(e) = close_plugin(&instance.name, instance.plugin.as_mut()).await {
            if matches!(e, PluginError::Panicked(_)) {
                self.hub.remove_owner(&instance.name);
            }
            warn!(plugin = %instance.name, error = %e, "Plugin failed to close, keeping it loaded");
            let mut plugins = self.plugins.lock().await;
            let index = index.min(plugins.len());
            plugins.insert(index, instance);
            return Err(e);
        }

        self.release(&instance);
        let info = instance.info();
        drop(instance);
        info!(plugin = %info.name, "Plugin disabled");
        Ok(info)
    }

    /// Disables a plugin and enables it again from the same path.
    pub async fn reload(&self, name: &str) -> Result<Info> {
        let info = self.disable(name).await?;
        info!(plugin = %info.name, "Reloading plugin");
        self.enable_resolved(info.path).await
    }

    /// Disables every plugin, most recently loaded first, stopping at the
    /// first one that fails to close.
    pub async fn disable_all(&self) -> std::result::Result<Vec<Info>, DisableAllError> {
        let mut completed = Vec::new();
        loop {
            let last = self.plugins.lock().await.last().map(|p| p.name.clone());
            let Some(name) = last else {
                break;
            };
            match self.disable(&name).await {
                Ok(info) => completed.push(info),
                Err(PluginError::NotFound(_)) => continue,
                Err(error) => return Err(DisableAllError { completed, error }),
            }
        }
        Ok(completed)
    }

    /// Stops accepting plugins and unloads all of them, most recently loaded
    /// first. Close failures are logged and the plugin is dropped anyway.
    pub async fn shutdown(&self) -> Vec<Info> {
        self.shut_down.store(true, Ordering::SeqCst);
        let instances = std::mem::take(&mut *self.plugins.lock().await);
        info!("Shutting down {} plugin(s)", instances.len());

        let mut unloaded = Vec::with_capacity(instances.len());
        for mut instance in instances.into_iter().rev() {
            if let Err(e) = close_plugin(&instance.name, instance.plugin.as_mut()).await {
                warn!(plugin = %instance.name, error = %e, "Plugin failed to close during shutdown");
            }
            self.release(&instance);
            unloaded.push(instance.info());
        }
        unloaded
    }

    fn reserve_name(&self, plugins: &[PluginInstance], stem: &str) -> Reservation<'_> {
        let mut pending = self.pending.lock();
        let taken = |candidate: &str| {
            let dir = sanitize_name(candidate);
            plugins.iter().any(|p| {
                p.name.eq_ignore_ascii_case(candidate)
                    || p.initial_name.eq_ignore_ascii_case(candidate)
                    || sanitize_name(&p.name) == dir
            }) || pending
                .iter()
                .any(|q| q.eq_ignore_ascii_case(candidate) || sanitize_name(q) == dir)
        };

        let mut name = stem.to_string();
        let mut n = 1;
        while taken(&name) {
            n += 1;
            name = format!("{stem}-{n}");
        }
        pending.insert(name.clone());

        Reservation { manager: self, name }
    }

    /// Undoes whatever a failed constructor left behind.
    fn abort_enable(&self, api: &Api, initial_name: &str) {
        api.cancel();
        api.unregister_commands();
        self.hub.remove_owner(&api.name());
        self.hub.remove_owner(initial_name);
    }

    /// Releases everything a closed plugin held on to.
    fn release(&self, instance: &PluginInstance) {
        instance.api.cancel();
        instance.api.unregister_commands();
        self.hub.remove_owner(&instance.name);
        if instance.initial_name != instance.name {
            self.hub.remove_owner(&instance.initial_name);
        }
    }

    /// Disables a faulty plugin on a separate task.
    fn schedule_disable(self: &Arc<Self>, name: &str) {
        let manager = Arc::clone(self);
        let name = name.to_string();
        self.runtime.spawn(async move {
            match manager.disable(&name).await {
                Ok(_) => warn!(plugin = %name, "Disabled plugin after a panic"),
                Err(PluginError::NotFound(_)) => {
                    debug!(plugin = %name, "Faulty plugin already unloaded")
                }
                Err(e) => error!(plugin = %name, error = %e, "Failed to disable faulty plugin"),
            }
        });
    }
}

/// A name held for an enable in progress.
struct Reservation<'a> {
    manager: &'a Manager,
    name: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.manager.pending.lock().remove(&self.name);
    }
}

/// Calls `close`, turning errors and panics into [`PluginError`]s.
async fn canonical_or_clean(path: PathBuf) -> PathBuf {
    match tokio::fs::canonicalize(&path).await {
        Ok(canonical) => canonical,
        Err(_) => clean_path(&path),
    }
}

async fn close_plugin(name: &str, plugin: &mut dyn Plugin) -> Result<()> {
    match AssertUnwindSafe(plugin.close()).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(PluginError::Close {
            name: name.to_string(),
            reason: format!("{e:#}"),
        }),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log_panic(name, "close", &message);
            Err(PluginError::Panicked(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::loader::{Factory, StaticLoader};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Named(&'static str);

    #[async_trait]
    impl Plugin for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn settings(dir: &TempDir) -> PluginSettings {
        PluginSettings {
            directory: dir.path().join("plugins"),
            ..Default::default()
        }
    }

    fn manager(dir: &TempDir, loader: StaticLoader) -> Arc<Manager> {
        Manager::new(settings(dir), Arc::new(MemoryHost::named("test")), Arc::new(loader)).unwrap()
    }

    #[tokio::test]
    async fn test_disabled_by_config_or_host() {
        let dir = TempDir::new().unwrap();
        let config = PluginSettings {
            enabled: false,
            ..settings(&dir)
        };
        let m = Manager::new(config, Arc::new(MemoryHost::named("t")), Arc::new(StaticLoader::new())).unwrap();
        assert!(matches!(m.enable("a.so").await, Err(PluginError::Disabled)));

        let host = Arc::new(MemoryHost::named("t"));
        host.set_plugins_enabled(false);
        let m = Manager::new(settings(&dir), host, Arc::new(StaticLoader::new())).unwrap();
        assert!(matches!(m.load_all().await, Err(PluginError::Disabled)));
    }

    #[tokio::test]
    async fn test_missing_module_and_factory() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir, StaticLoader::new());
        assert!(matches!(m.enable("nothing.so").await, Err(PluginError::ModuleOpen { .. })));
        assert!(m.plugins().await.is_empty());
    }

    #[tokio::test]
    async fn test_reserved_names_are_unique() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir, StaticLoader::new());
        let first = m.reserve_name(&[], "greeter");
        let second = m.reserve_name(&[], "Greeter");
        assert_eq!(first.name, "greeter");
        assert_eq!(second.name, "Greeter-2");
        drop(first);
        assert_eq!(m.reserve_name(&[], "greeter").name, "greeter");
    }

    #[tokio::test]
    async fn test_empty_reported_name_keeps_initial_name() {
        let dir = TempDir::new().unwrap();
        let loader = StaticLoader::new();
        loader.register("anon", Factory::new(|_| Box::new(Named("  "))));
        let m = manager(&dir, loader);

        let info = m.enable("anon.so").await.unwrap();
        assert_eq!(info.name, "anon");
        assert_eq!(m.plugin("ANON").await, Some(info));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_plugins() {
        let dir = TempDir::new().unwrap();
        let loader = StaticLoader::new();
        loader.register("a", Factory::new(|_| Box::new(Named("A"))));
        let m = manager(&dir, loader);

        m.enable("a.so").await.unwrap();
        let unloaded = m.shutdown().await;
        assert_eq!(unloaded.len(), 1);
        assert!(m.is_shut_down());
        assert!(matches!(m.enable("a.so").await, Err(PluginError::ShuttingDown)));
    }
}
