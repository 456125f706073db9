//! Event registration and dispatch.
//!
//! Each event domain (player, world, inventory) has a handler trait whose
//! methods all default to no-ops. Plugins register implementations with the
//! [`EventHub`]; the host installs a [`HandlerChain`] in place of its own
//! handler so every dispatched event visits the plugins first, in
//! registration order, and the host's original ("base") handler last.
//!
//! Cancellability is part of each method's signature: cancellable events take
//! a `&mut EventContext`, notification events do not. The chain stops before
//! the base handler as soon as a plugin cancels.

mod chain;
mod hub;
mod inventory;
mod list;
mod player;
mod world;

use std::sync::Arc;

pub use chain::HandlerChain;
pub use hub::{EventHub, Unregister};
pub use inventory::InventoryHandler;
pub use list::{EventList, HandlerId, Registration, Snapshot};
pub use player::PlayerHandler;
pub use world::WorldHandler;

/// Cancellation flag passed to cancellable handler methods.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventContext {
    cancelled: bool,
}

impl EventContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the event. Remaining plugin handlers and the base handler
    /// are skipped.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Binds a handler trait object type to its list in the [`EventHub`].
///
/// Implemented for `dyn PlayerHandler`, `dyn WorldHandler` and
/// `dyn InventoryHandler`; this is what lets [`EventList`] and
/// [`HandlerChain`] stay generic over the domain.
pub trait DomainHandler: Send + Sync + 'static {
    /// Human-readable name used in logs, e.g. `"player handler"`
    const DOMAIN: &'static str;

    /// The hub's list for this domain.
    fn list(hub: &EventHub) -> &EventList<Self>;

    /// If `self` is a chain, the base handler it wraps.
    fn chained_base(&self) -> Option<Arc<Self>>;
}

impl DomainHandler for dyn PlayerHandler {
    const DOMAIN: &'static str = "player handler";

    fn list(hub: &EventHub) -> &EventList<Self> {
        hub.players()
    }

    fn chained_base(&self) -> Option<Arc<Self>> {
        self.wrapped_base()
    }
}

impl DomainHandler for dyn WorldHandler {
    const DOMAIN: &'static str = "world handler";

    fn list(hub: &EventHub) -> &EventList<Self> {
        hub.worlds()
    }

    fn chained_base(&self) -> Option<Arc<Self>> {
        self.wrapped_base()
    }
}

impl DomainHandler for dyn InventoryHandler {
    const DOMAIN: &'static str = "inventory handler";

    fn list(hub: &EventHub) -> &EventList<Self> {
        hub.inventories()
    }

    fn chained_base(&self) -> Option<Arc<Self>> {
        self.wrapped_base()
    }
}

/// Base handler that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopHandler;

impl PlayerHandler for NopHandler {}
impl WorldHandler for NopHandler {}
impl InventoryHandler for NopHandler {}
