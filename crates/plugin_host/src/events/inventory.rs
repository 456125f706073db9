use std::sync::Arc;

use super::{EventContext, HandlerChain};
use crate::types::{ItemStack, PlayerRef};

/// Handler for changes to a player's inventory.
#[allow(unused_variables)]
pub trait InventoryHandler: Send + Sync {
    /// Items are about to be taken out of `slot`.
    fn handle_take(&self, ctx: &mut EventContext, owner: &PlayerRef, slot: usize, item: &ItemStack) {}

    /// Items are about to be put into `slot`.
    fn handle_place(&self, ctx: &mut EventContext, owner: &PlayerRef, slot: usize, item: &ItemStack) {}

    /// Items are about to be dropped into the world.
    fn handle_drop(&self, ctx: &mut EventContext, owner: &PlayerRef, slot: usize, item: &ItemStack) {}

    #[doc(hidden)]
    fn wrapped_base(&self) -> Option<Arc<dyn InventoryHandler>> {
        None
    }
}

impl InventoryHandler for HandlerChain<dyn InventoryHandler> {
    fn handle_take(&self, ctx: &mut EventContext, owner: &PlayerRef, slot: usize, item: &ItemStack) {
        self.cancellable(ctx, |h, ctx| h.handle_take(ctx, owner, slot, item));
    }

    fn handle_place(&self, ctx: &mut EventContext, owner: &PlayerRef, slot: usize, item: &ItemStack) {
        self.cancellable(ctx, |h, ctx| h.handle_place(ctx, owner, slot, item));
    }

    fn handle_drop(&self, ctx: &mut EventContext, owner: &PlayerRef, slot: usize, item: &ItemStack) {
        self.cancellable(ctx, |h, ctx| h.handle_drop(ctx, owner, slot, item));
    }

    fn wrapped_base(&self) -> Option<Arc<dyn InventoryHandler>> {
        Some(Arc::clone(self.base()))
    }
}
