//! Copy-on-write registration list for a single event domain.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

/// Identifier of a handler registration, unique within its [`EventList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A handler registered by a plugin.
pub struct Registration<H: ?Sized> {
    /// Name of the plugin that owns the handler
    pub owner: String,
    pub id: HandlerId,
    pub handler: Arc<H>,
}

impl<H: ?Sized> Clone for Registration<H> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            id: self.id,
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H: ?Sized> fmt::Debug for Registration<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("owner", &self.owner)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Immutable point-in-time view of an [`EventList`].
pub type Snapshot<H> = Arc<Vec<Registration<H>>>;

/// Ordered list of registrations for one domain.
///
/// Readers take a [`Snapshot`] with a single atomic load. Writers rebuild the
/// whole list and publish it in one swap, so a reader sees either the old or
/// the new list, never a half-applied change. The mutators are not
/// serialized among themselves; [`EventHub`](super::EventHub) calls them
/// while holding its writer lock.
pub struct EventList<H: ?Sized> {
    slot: ArcSwap<Vec<Registration<H>>>,
    next_id: AtomicU64,
}

impl<H: ?Sized> EventList<H> {
    pub fn new() -> Self {
        Self {
            slot: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Current registrations in dispatch order.
    pub fn snapshot(&self) -> Snapshot<H> {
        self.slot.load_full()
    }

    pub fn len(&self) -> usize {
        self.slot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn add(&self, owner: &str, handler: Arc<H>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let current = self.slot.load();
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(Registration {
            owner: owner.to_string(),
            id,
            handler,
        });
        self.slot.store(Arc::new(next));
        id
    }

    pub(crate) fn remove_by_id(&self, id: HandlerId) -> bool {
        let current = self.slot.load_full();
        if !current.iter().any(|r| r.id == id) {
            return false;
        }
        let next: Vec<_> = current.iter().filter(|r| r.id != id).cloned().collect();
        self.slot.store(Arc::new(next));
        true
    }

    pub(crate) fn remove_owner(&self, owner: &str) -> usize {
        let current = self.slot.load_full();
        let next: Vec<_> = current.iter().filter(|r| r.owner != owner).cloned().collect();
        let removed = current.len() - next.len();
        if removed > 0 {
            self.slot.store(Arc::new(next));
        }
        removed
    }

    pub(crate) fn rename(&self, old: &str, new: &str) -> usize {
        let current = self.slot.load_full();
        let mut renamed = 0;
        let next: Vec<_> = current
            .iter()
            .map(|r| {
                let mut r = r.clone();
                if r.owner == old {
                    r.owner = new.to_string();
                    renamed += 1;
                }
                r
            })
            .collect();
        if renamed > 0 {
            self.slot.store(Arc::new(next));
        }
        renamed
    }
}

impl<H: ?Sized> Default for EventList<H> {
    fn default() -> Self {
        Self::new()
    }
}
