//! The contract every plugin implements, and the macro that exports it.

use async_trait::async_trait;

/// A loaded plugin.
///
/// Plugins are constructed by a factory that receives the plugin's
/// [`Api`](crate::Api). Everything a plugin wants to do while enabled
/// (registering event handlers, commands and background tasks) goes through
/// that `Api`; the manager only needs the plugin itself to report its name
/// and to shut it down.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Authoritative display name. Read once, right after construction.
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        ""
    }

    /// Releases the plugin's resources.
    ///
    /// Returning an error keeps the plugin loaded so the disable can be
    /// retried. Handlers, commands and background tasks are cleaned up by
    /// the host only after this succeeds.
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Exports a plugin constructor under the primary factory symbol.
///
/// The constructor takes an `Arc<Api>` and returns
/// `anyhow::Result<T>` for some `T: Plugin`:
///
/// ```ignore
/// use std::sync::Arc;
/// use plugin_host::{export_plugin, Api, Plugin};
///
/// struct Hello;
///
/// #[plugin_host::async_trait]
/// impl Plugin for Hello {
///     fn name(&self) -> &str { "Hello" }
///     async fn close(&mut self) -> plugin_host::anyhow::Result<()> { Ok(()) }
/// }
///
/// fn create(_api: Arc<Api>) -> plugin_host::anyhow::Result<Hello> {
///     Ok(Hello)
/// }
///
/// export_plugin!(create);
/// ```
///
/// Host and plugin must be built with the same compiler and the same
/// version of this crate; the symbol uses the Rust ABI.
#[macro_export]
macro_rules! export_plugin {
    ($ctor:path) => {
        #[no_mangle]
        pub fn horizon_plugin_create(
            api: ::std::sync::Arc<$crate::Api>,
        ) -> $crate::anyhow::Result<::std::boxed::Box<dyn $crate::Plugin>> {
            let plugin = $ctor(api)?;
            Ok(::std::boxed::Box::new(plugin))
        }
    };
}
