//! The hub that owns every domain's handler list and quarantines faulty plugins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::list::{EventList, HandlerId, Snapshot};
use super::{DomainHandler, HandlerChain, InventoryHandler, PlayerHandler, WorldHandler};
use crate::isolation::run_isolated;

type FaultHook = Box<dyn Fn(&str) + Send + Sync>;

/// Owns the registration lists of every event domain.
///
/// All writes go through one hub-wide lock and publish a fresh snapshot of
/// the affected list; dispatch only ever loads snapshots and never takes the
/// lock.
///
/// The hub is also where panics in plugin handlers end up: the offending
/// plugin's registrations are dropped from every list on the spot and the
/// optional fault hook (installed by the [`Manager`](crate::Manager)) is told
/// so it can disable the plugin on another task.
pub struct EventHub {
    writer: Mutex<()>,
    players: EventList<dyn PlayerHandler>,
    worlds: EventList<dyn WorldHandler>,
    inventories: EventList<dyn InventoryHandler>,
    on_fault: Option<FaultHook>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(()),
            players: EventList::new(),
            worlds: EventList::new(),
            inventories: EventList::new(),
            on_fault: None,
        }
    }

    /// Creates a hub that calls `hook` with the plugin name whenever one of
    /// that plugin's handlers panics. The hook runs on the dispatching thread
    /// and must not block.
    pub fn with_fault_hook<F>(hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            on_fault: Some(Box::new(hook)),
            ..Self::new()
        }
    }

    pub fn players(&self) -> &EventList<dyn PlayerHandler> {
        &self.players
    }

    pub fn worlds(&self) -> &EventList<dyn WorldHandler> {
        &self.worlds
    }

    pub fn inventories(&self) -> &EventList<dyn InventoryHandler> {
        &self.inventories
    }

    /// Registers `handler` for domain `H` on behalf of `owner`.
    pub fn register<H>(self: &Arc<Self>, owner: &str, handler: Arc<H>) -> Unregister
    where
        H: DomainHandler + ?Sized,
    {
        let id = {
            let _guard = self.writer.lock();
            H::list(self).add(owner, handler)
        };
        debug!(plugin = %owner, id = %id, "Registered {}", H::DOMAIN);

        Unregister {
            hub: Arc::downgrade(self),
            id,
            remove: Self::remove_by_id::<H>,
            done: AtomicBool::new(false),
        }
    }

    pub fn on_player(self: &Arc<Self>, owner: &str, handler: Arc<dyn PlayerHandler>) -> Unregister {
        self.register(owner, handler)
    }

    pub fn on_world(self: &Arc<Self>, owner: &str, handler: Arc<dyn WorldHandler>) -> Unregister {
        self.register(owner, handler)
    }

    pub fn on_inventory(self: &Arc<Self>, owner: &str, handler: Arc<dyn InventoryHandler>) -> Unregister {
        self.register(owner, handler)
    }

    /// Removes one registration of domain `H`. Returns whether it existed.
    pub fn remove_by_id<H>(&self, id: HandlerId) -> bool
    where
        H: DomainHandler + ?Sized,
    {
        let _guard = self.writer.lock();
        H::list(self).remove_by_id(id)
    }

    /// Removes every registration owned by `owner` across all domains.
    pub fn remove_owner(&self, owner: &str) -> usize {
        let removed = {
            let _guard = self.writer.lock();
            self.players.remove_owner(owner)
                + self.worlds.remove_owner(owner)
                + self.inventories.remove_owner(owner)
        };
        if removed > 0 {
            debug!(plugin = %owner, removed, "Cleared event handlers");
        }
        removed
    }

    /// Moves every registration owned by `old` to `new` across all domains.
    pub fn rename_owner(&self, old: &str, new: &str) -> usize {
        let _guard = self.writer.lock();
        self.players.rename(old, new) + self.worlds.rename(old, new) + self.inventories.rename(old, new)
    }

    pub fn snapshot<H>(&self) -> Snapshot<H>
    where
        H: DomainHandler + ?Sized,
    {
        H::list(self).snapshot()
    }

    /// Total number of registrations across all domains.
    pub fn handler_count(&self) -> usize {
        self.players.len() + self.worlds.len() + self.inventories.len()
    }

    /// Number of registrations owned by `owner` across all domains.
    pub fn owner_count(&self, owner: &str) -> usize {
        fn count<H: ?Sized>(list: &EventList<H>, owner: &str) -> usize {
            list.snapshot().iter().filter(|r| r.owner == owner).count()
        }
        count(&self.players, owner) + count(&self.worlds, owner) + count(&self.inventories, owner)
    }

    /// Builds a chain that dispatches to every registered handler of domain
    /// `H` before `base`. Wrapping an existing chain wraps its base instead.
    pub fn wrap<H>(self: &Arc<Self>, base: Arc<H>) -> Arc<HandlerChain<H>>
    where
        H: DomainHandler + ?Sized,
    {
        Arc::new(HandlerChain::new(Arc::clone(self), base))
    }

    pub fn wrap_player(self: &Arc<Self>, base: Arc<dyn PlayerHandler>) -> Arc<dyn PlayerHandler> {
        self.wrap(base)
    }

    pub fn wrap_world(self: &Arc<Self>, base: Arc<dyn WorldHandler>) -> Arc<dyn WorldHandler> {
        self.wrap(base)
    }

    pub fn wrap_inventory(self: &Arc<Self>, base: Arc<dyn InventoryHandler>) -> Arc<dyn InventoryHandler> {
        self.wrap(base)
    }

    /// Runs plugin code for `owner`; a panic quarantines the plugin.
    /// Returns `false` if `f` panicked.
    pub fn isolate(&self, owner: &str, what: &str, f: impl FnOnce()) -> bool {
        match run_isolated(owner, what, f) {
            Ok(()) => true,
            Err(_) => {
                self.quarantine(owner);
                false
            }
        }
    }

    /// Drops every registration of `owner` and reports the fault.
    pub fn quarantine(&self, owner: &str) {
        let removed = self.remove_owner(owner);
        warn!(plugin = %owner, removed, "Quarantined faulty plugin");
        if let Some(hook) = &self.on_fault {
            hook(owner);
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by a registration; removes it again.
///
/// Calling [`unregister`](Self::unregister) more than once is a no-op.
/// Dropping the handle does not unregister anything.
pub struct Unregister {
    hub: Weak<EventHub>,
    id: HandlerId,
    remove: fn(&EventHub, HandlerId) -> bool,
    done: AtomicBool,
}

impl Unregister {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Removes the registration. Returns `true` only for the call that
    /// actually removed it.
    pub fn unregister(&self) -> bool {
        if self.done.swap(true, Ordering::AcqRel) {
            return false;
        }
        match self.hub.upgrade() {
            Some(hub) => (self.remove)(&hub, self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for Unregister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unregister")
            .field("id", &self.id)
            .field("done", &self.done.load(Ordering::Relaxed))
            .finish()
    }
}
