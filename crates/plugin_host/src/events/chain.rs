use std::fmt;
use std::sync::Arc;

use super::{DomainHandler, EventContext, EventHub};

/// Handler installed by the host in place of its own handler for one domain.
///
/// Every event is offered to the registered plugin handlers in registration
/// order, each call isolated against panics, and then to the base handler.
/// The registration list is read once per event, so changes made while an
/// event is being dispatched apply from the next event on.
pub struct HandlerChain<H: ?Sized + DomainHandler> {
    hub: Arc<EventHub>,
    base: Arc<H>,
}

impl<H: ?Sized + DomainHandler> HandlerChain<H> {
    /// Wraps `base`. If `base` is itself a chain, its base is wrapped
    /// instead so plugin handlers never run twice per event.
    pub fn new(hub: Arc<EventHub>, base: Arc<H>) -> Self {
        let base = base.chained_base().unwrap_or(base);
        Self { hub, base }
    }

    /// The host handler invoked after all plugin handlers.
    pub fn base(&self) -> &Arc<H> {
        &self.base
    }

    /// Dispatches a cancellable event. Stops as soon as `ctx` is cancelled;
    /// the base handler only runs if nobody cancelled.
    pub(crate) fn cancellable(&self, ctx: &mut EventContext, mut call: impl FnMut(&H, &mut EventContext)) {
        let handlers = H::list(&self.hub).snapshot();
        for reg in handlers.iter() {
            self.hub
                .isolate(&reg.owner, H::DOMAIN, || call(&*reg.handler, &mut *ctx));
            if ctx.is_cancelled() {
                return;
            }
        }
        call(&*self.base, ctx);
    }

    /// Dispatches a notification to every handler and then the base.
    pub(crate) fn notify(&self, mut call: impl FnMut(&H)) {
        let handlers = H::list(&self.hub).snapshot();
        for reg in handlers.iter() {
            self.hub.isolate(&reg.owner, H::DOMAIN, || call(&*reg.handler));
        }
        call(&*self.base);
    }
}

impl<H: ?Sized + DomainHandler> fmt::Debug for HandlerChain<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("domain", &H::DOMAIN)
            .field("handlers", &H::list(&self.hub).len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{InventoryHandler, NopHandler, PlayerHandler, WorldHandler};
    use crate::types::{ItemStack, PlayerId, PlayerRef};
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        tag: &'static str,
        log: Log,
        cancel: bool,
    }

    impl PlayerHandler for Recorder {
        fn handle_chat(&self, ctx: &mut EventContext, _player: &PlayerRef, message: &mut String) {
            self.log.lock().push(format!("{}:{}", self.tag, message));
            message.push('!');
            if self.cancel {
                ctx.cancel();
            }
        }

        fn handle_quit(&self, _player: &PlayerRef) {
            self.log.lock().push(format!("quit:{}", self.tag));
        }
    }

    struct Panicky;

    impl PlayerHandler for Panicky {
        fn handle_chat(&self, _ctx: &mut EventContext, _player: &PlayerRef, _message: &mut String) {
            panic!("chat handler exploded");
        }

        fn handle_quit(&self, _player: &PlayerRef) {
            panic!("quit handler exploded");
        }
    }

    struct CancelTake;

    impl InventoryHandler for CancelTake {
        fn handle_take(&self, ctx: &mut EventContext, _owner: &PlayerRef, _slot: usize, _item: &ItemStack) {
            ctx.cancel();
        }
    }

    fn recorder(tag: &'static str, log: &Log, cancel: bool) -> Arc<Recorder> {
        Arc::new(Recorder {
            tag,
            log: log.clone(),
            cancel,
        })
    }

    fn steve() -> PlayerRef {
        PlayerRef {
            id: PlayerId::new(),
            name: "steve".into(),
        }
    }

    #[test]
    fn test_dispatch_order_then_base() {
        let hub = Arc::new(EventHub::new());
        let log: Log = Default::default();
        hub.on_player("a", recorder("a", &log, false));
        hub.on_player("b", recorder("b", &log, false));
        let chain = hub.wrap_player(recorder("base", &log, false));

        let mut ctx = EventContext::new();
        let mut message = String::from("hi");
        chain.handle_chat(&mut ctx, &steve(), &mut message);

        assert!(!ctx.is_cancelled());
        assert_eq!(*log.lock(), vec!["a:hi", "b:hi!", "base:hi!!"]);
        assert_eq!(message, "hi!!!");
    }

    #[test]
    fn test_cancel_short_circuits() {
        let hub = Arc::new(EventHub::new());
        let log: Log = Default::default();
        hub.on_player("a", recorder("a", &log, true));
        hub.on_player("b", recorder("b", &log, false));
        let chain = hub.wrap_player(recorder("base", &log, false));

        let mut ctx = EventContext::new();
        chain.handle_chat(&mut ctx, &steve(), &mut String::from("x"));

        assert!(ctx.is_cancelled());
        assert_eq!(*log.lock(), vec!["a:x"]);
    }

    #[test]
    fn test_notifications_cannot_be_stopped() {
        let hub = Arc::new(EventHub::new());
        let log: Log = Default::default();
        hub.on_player("a", recorder("a", &log, true));
        let chain = hub.wrap_player(recorder("base", &log, false));

        chain.handle_quit(&steve());
        assert_eq!(*log.lock(), vec!["quit:a", "quit:base"]);
    }

    #[test]
    fn test_panicking_handler_is_removed_and_dispatch_continues() {
        let hub = Arc::new(EventHub::new());
        let log: Log = Default::default();
        hub.on_player("bad", Arc::new(Panicky));
        hub.on_world("bad", Arc::new(NopHandler));
        hub.on_player("good", recorder("good", &log, false));
        let chain = hub.wrap_player(recorder("base", &log, false));

        let mut ctx = EventContext::new();
        chain.handle_chat(&mut ctx, &steve(), &mut String::from("m"));

        assert_eq!(*log.lock(), vec!["good:m", "base:m!"]);
        assert_eq!(hub.owner_count("bad"), 0);
        assert_eq!(hub.owner_count("good"), 1);

        log.lock().clear();
        chain.handle_quit(&steve());
        assert_eq!(*log.lock(), vec!["quit:good", "quit:base"]);
    }

    #[test]
    fn test_rewrapping_a_chain_wraps_its_base() {
        let hub = Arc::new(EventHub::new());
        let log: Log = Default::default();
        hub.on_player("a", recorder("a", &log, false));

        let first = hub.wrap_player(recorder("base", &log, false));
        let second = hub.wrap_player(first);

        second.handle_quit(&steve());
        assert_eq!(*log.lock(), vec!["quit:a", "quit:base"]);
    }

    #[test]
    fn test_handler_added_during_dispatch_sees_next_event() {
        struct Adder {
            hub: Arc<EventHub>,
            log: Log,
        }

        impl PlayerHandler for Adder {
            fn handle_quit(&self, _player: &PlayerRef) {
                self.hub.on_player("late", recorder("late", &self.log, false));
            }
        }

        let hub = Arc::new(EventHub::new());
        let log: Log = Default::default();
        hub.on_player(
            "adder",
            Arc::new(Adder {
                hub: hub.clone(),
                log: log.clone(),
            }),
        );
        let chain = hub.wrap_player(Arc::new(NopHandler));

        chain.handle_quit(&steve());
        assert!(log.lock().is_empty());

        chain.handle_quit(&steve());
        assert_eq!(*log.lock(), vec!["quit:late"]);
    }

    #[test]
    fn test_inventory_and_world_chains() {
        let hub = Arc::new(EventHub::new());
        hub.on_inventory("guard", Arc::new(CancelTake));
        let inventory = hub.wrap_inventory(Arc::new(NopHandler));
        let world = hub.wrap_world(Arc::new(NopHandler));

        let mut ctx = EventContext::new();
        inventory.handle_take(&mut ctx, &steve(), 3, &ItemStack::new("stone", 1));
        assert!(ctx.is_cancelled());

        let mut ctx = EventContext::new();
        inventory.handle_drop(&mut ctx, &steve(), 3, &ItemStack::new("stone", 1));
        assert!(!ctx.is_cancelled());

        world.handle_close("overworld");
    }
}
