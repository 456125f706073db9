//! Module loading and factory lookup.
//!
//! A [`ModuleLoader`] turns a path into a [`Module`]; a module is asked for
//! a [`Factory`] of each accepted shape in [`FactoryShape::ALL`] order and
//! the first hit constructs the plugin.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::api::Api;
use crate::error::{PluginError, Result};
use crate::plugin::Plugin;

/// File extensions of native plugin modules.
pub const MODULE_EXTENSIONS: [&str; 3] = ["so", "dll", "dylib"];

pub type CreateFn = dyn Fn(Arc<Api>) -> anyhow::Result<Box<dyn Plugin>> + Send + Sync;
pub type NewFn = dyn Fn(Arc<Api>) -> Box<dyn Plugin> + Send + Sync;
pub type LegacyFn = dyn Fn() -> Option<Box<dyn Plugin>> + Send + Sync;

/// The accepted factory signatures, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactoryShape {
    /// `horizon_plugin_create(Arc<Api>) -> anyhow::Result<Box<dyn Plugin>>`
    Create,
    /// `horizon_plugin_new(Arc<Api>) -> Box<dyn Plugin>`
    New,
    /// `extern "C" create_plugin() -> *mut dyn Plugin`; null means no plugin
    Legacy,
}

impl FactoryShape {
    pub const ALL: [FactoryShape; 3] = [FactoryShape::Create, FactoryShape::New, FactoryShape::Legacy];

    /// Exported symbol name for this shape.
    pub fn symbol(self) -> &'static str {
        match self {
            FactoryShape::Create => "horizon_plugin_create",
            FactoryShape::New => "horizon_plugin_new",
            FactoryShape::Legacy => "create_plugin",
        }
    }
}

/// A callable plugin constructor.
#[derive(Clone)]
pub enum Factory {
    Create(Arc<CreateFn>),
    New(Arc<NewFn>),
    Legacy(Arc<LegacyFn>),
}

impl Factory {
    pub fn create<F>(f: F) -> Self
    where
        F: Fn(Arc<Api>) -> anyhow::Result<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        Factory::Create(Arc::new(f))
    }

    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Arc<Api>) -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        Factory::New(Arc::new(f))
    }

    pub fn legacy<F>(f: F) -> Self
    where
        F: Fn() -> Option<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        Factory::Legacy(Arc::new(f))
    }

    pub fn shape(&self) -> FactoryShape {
        match self {
            Factory::Create(_) => FactoryShape::Create,
            Factory::New(_) => FactoryShape::New,
            Factory::Legacy(_) => FactoryShape::Legacy,
        }
    }

    /// Runs the constructor. Panics are not caught here.
    pub fn construct(&self, api: Arc<Api>) -> Result<Box<dyn Plugin>> {
        match self {
            Factory::Create(f) => f(api).map_err(|e| PluginError::Factory(format!("{e:#}"))),
            Factory::New(f) => Ok(f(api)),
            Factory::Legacy(f) => f().ok_or(PluginError::NilPlugin),
        }
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Factory({})", self.shape().symbol())
    }
}

/// A loaded module that may export plugin factories.
pub trait Module: Send + Sync {
    /// Looks up the factory of one shape.
    fn factory(&self, shape: FactoryShape) -> Option<Factory>;
}

/// Returns the first factory the module exports, in [`FactoryShape::ALL`] order.
pub fn find_factory(module: &dyn Module) -> Option<Factory> {
    FactoryShape::ALL.iter().find_map(|shape| module.factory(*shape))
}

/// Opens plugin modules.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn Module>>;

    /// Whether discovery should consider `path` a module.
    fn accepts(&self, path: &Path) -> bool;
}

/// Loads native shared libraries with `libloading`.
///
/// Libraries are never unloaded. Handler snapshots taken during dispatch and
/// detached tasks may still reference plugin code after a disable, so every
/// opened library is retained for the lifetime of the loader.
#[derive(Default)]
pub struct DynamicLoader {
    retained: Mutex<Vec<Arc<Library>>>,
}

impl DynamicLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModuleLoader for DynamicLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Module>> {
        debug!(path = %path.display(), "Opening plugin module");
        // SAFETY: loading a library runs its initializers; plugin modules
        // are trusted to the same degree as the host binary.
        let library = unsafe { Library::new(path) }.map_err(|e| PluginError::ModuleOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let library = Arc::new(library);
        self.retained.lock().push(Arc::clone(&library));

        Ok(Arc::new(NativeModule {
            path: path.to_path_buf(),
            library,
        }))
    }

    fn accepts(&self, path: &Path) -> bool {
        path.is_file() && has_module_extension(path)
    }
}

/// Whether `path` ends in one of [`MODULE_EXTENSIONS`] (case-insensitive).
pub fn has_module_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MODULE_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m)))
        .unwrap_or(false)
}

struct NativeModule {
    path: PathBuf,
    library: Arc<Library>,
}

impl NativeModule {
    fn symbol<T: Copy>(&self, shape: FactoryShape) -> Option<T> {
        let name = format!("{}\0", shape.symbol());
        // SAFETY: the caller picks `T` to match the documented signature of
        // `shape`; a module exporting the name with another type is broken.
        let symbol: Symbol<'_, T> = unsafe { self.library.get(name.as_bytes()) }.ok()?;
        debug!(path = %self.path.display(), symbol = shape.symbol(), "Found plugin factory");
        Some(*symbol)
    }
}

type NativeCreate = fn(Arc<Api>) -> anyhow::Result<Box<dyn Plugin>>;
type NativeNew = fn(Arc<Api>) -> Box<dyn Plugin>;
#[allow(improper_ctypes_definitions)]
type NativeLegacy = unsafe extern "C" fn() -> *mut dyn Plugin;

impl Module for NativeModule {
    fn factory(&self, shape: FactoryShape) -> Option<Factory> {
        let keep = Arc::clone(&self.library);
        match shape {
            FactoryShape::Create => {
                let f = self.symbol::<NativeCreate>(shape)?;
                Some(Factory::create(move |api| {
                    let _library = &keep;
                    f(api)
                }))
            }
            FactoryShape::New => {
                let f = self.symbol::<NativeNew>(shape)?;
                Some(Factory::new(move |api| {
                    let _library = &keep;
                    f(api)
                }))
            }
            FactoryShape::Legacy => {
                let f = self.symbol::<NativeLegacy>(shape)?;
                Some(Factory::legacy(move || {
                    let _library = &keep;
                    // SAFETY: a non-null pointer from `create_plugin` is an
                    // owned `Box<dyn Plugin>` turned into a raw pointer.
                    let ptr = unsafe { f() };
                    if ptr.is_null() {
                        None
                    } else {
                        Some(unsafe { Box::from_raw(ptr) })
                    }
                }))
            }
        }
    }
}

/// Compiled-in module registry keyed by file stem.
///
/// Lets a host ship plugins inside its own binary and lets tests drive the
/// manager without building shared libraries. The module file itself never
/// needs to exist.
#[derive(Default)]
pub struct StaticLoader {
    modules: RwLock<HashMap<String, Factory>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` for every path whose file stem is `stem`.
    pub fn register(&self, stem: impl Into<String>, factory: Factory) -> &Self {
        self.modules.write().insert(stem.into(), factory);
        self
    }

    pub fn unregister(&self, stem: &str) -> bool {
        self.modules.write().remove(stem).is_some()
    }

    fn lookup(&self, path: &Path) -> Option<Factory> {
        let stem = path.file_stem()?.to_str()?;
        self.modules.read().get(stem).cloned()
    }
}

impl ModuleLoader for StaticLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Module>> {
        let factory = self.lookup(path).ok_or_else(|| PluginError::ModuleOpen {
            path: path.to_path_buf(),
            reason: "no compiled-in module with this name".to_string(),
        })?;
        Ok(Arc::new(StaticModule { factory }))
    }

    fn accepts(&self, path: &Path) -> bool {
        self.lookup(path).is_some()
    }
}

struct StaticModule {
    factory: Factory,
}

impl Module for StaticModule {
    fn factory(&self, shape: FactoryShape) -> Option<Factory> {
        (self.factory.shape() == shape).then(|| self.factory.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Dummy;

    #[async_trait]
    impl Plugin for Dummy {
        fn name(&self) -> &str {
            "Dummy"
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Exports(Vec<Factory>);

    impl Module for Exports {
        fn factory(&self, shape: FactoryShape) -> Option<Factory> {
            self.0.iter().find(|f| f.shape() == shape).cloned()
        }
    }

    #[test]
    fn test_symbol_names_and_order() {
        let names: Vec<_> = FactoryShape::ALL.iter().map(|s| s.symbol()).collect();
        assert_eq!(names, ["horizon_plugin_create", "horizon_plugin_new", "create_plugin"]);
    }

    #[test]
    fn test_find_factory_prefers_earlier_shapes() {
        let module = Exports(vec![
            Factory::legacy(|| None),
            Factory::new(|_| Box::new(Dummy)),
        ]);
        assert_eq!(find_factory(&module).map(|f| f.shape()), Some(FactoryShape::New));

        let module = Exports(vec![Factory::legacy(|| None)]);
        assert_eq!(find_factory(&module).map(|f| f.shape()), Some(FactoryShape::Legacy));

        assert!(find_factory(&Exports(Vec::new())).is_none());
    }

    #[test]
    fn test_legacy_factory_nil_plugin() {
        let module = Exports(vec![Factory::legacy(|| None)]);
        let factory = find_factory(&module).unwrap();
        match factory {
            Factory::Legacy(f) => assert!(f().is_none()),
            other => panic!("unexpected factory {other:?}"),
        }

        let factory = Factory::legacy(|| Some(Box::new(Dummy) as Box<dyn Plugin>));
        match factory {
            Factory::Legacy(f) => assert_eq!(f().unwrap().name(), "Dummy"),
            other => panic!("unexpected factory {other:?}"),
        }
    }

    #[test]
    fn test_static_loader_by_stem() {
        let loader = StaticLoader::new();
        loader.register("greeter", Factory::new(|_| Box::new(Dummy)));

        let path = Path::new("/srv/plugins/greeter.so");
        assert!(loader.accepts(path));
        assert!(!loader.accepts(Path::new("/srv/plugins/other.so")));

        let module = loader.load(path).unwrap();
        assert_eq!(find_factory(module.as_ref()).map(|f| f.shape()), Some(FactoryShape::New));

        assert!(loader.unregister("greeter"));
        assert!(matches!(
            loader.load(path),
            Err(PluginError::ModuleOpen { .. })
        ));
    }

    #[test]
    fn test_module_extensions() {
        assert!(has_module_extension(Path::new("a/libgreeter.so")));
        assert!(has_module_extension(Path::new("greeter.DLL")));
        assert!(has_module_extension(Path::new("greeter.dylib")));
        assert!(!has_module_extension(Path::new("greeter.toml")));
        assert!(!has_module_extension(Path::new("greeter")));
    }

    #[test]
    fn test_dynamic_loader_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing.so");
        let loader = DynamicLoader::new();
        assert!(!loader.accepts(&path));
        assert!(matches!(loader.load(&path), Err(PluginError::ModuleOpen { .. })));
    }
}
