//! Panic isolation helpers for calls into plugin code.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::error;

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Runs `f`, catching any panic. On panic the failure is logged against
/// `plugin` together with a backtrace and the panic message is returned.
pub fn run_isolated<R>(plugin: &str, what: &str, f: impl FnOnce() -> R) -> Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        log_panic(plugin, what, &message);
        message
    })
}

/// Logs a recovered panic with a captured backtrace.
///
/// The backtrace is captured here, after unwinding, so it points at the
/// recovery site rather than the original panic location; the panic hook
/// output (if any) carries the original frame.
pub fn log_panic(plugin: &str, what: &str, message: &str) {
    let backtrace = Backtrace::force_capture();
    error!(
        plugin = %plugin,
        "Plugin panicked in {}: {}\n{}",
        what, message, backtrace
    );
}
