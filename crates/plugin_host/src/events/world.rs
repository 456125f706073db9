use std::sync::Arc;

use super::{EventContext, HandlerChain};
use crate::types::{BlockPos, EntityRef, Position};

/// Handler for events raised by a world rather than by a player.
#[allow(unused_variables)]
pub trait WorldHandler: Send + Sync {
    /// Liquid is about to flow from `from` into `into`.
    fn handle_liquid_flow(&self, ctx: &mut EventContext, world: &str, from: BlockPos, into: BlockPos, liquid: &str) {}

    fn handle_fire_spread(&self, ctx: &mut EventContext, world: &str, from: BlockPos, to: BlockPos) {}

    /// An explosion is about to destroy `affected`; blocks may be removed
    /// from the list to protect them.
    fn handle_explosion(
        &self,
        ctx: &mut EventContext,
        world: &str,
        origin: Position,
        affected: &mut Vec<BlockPos>,
    ) {
    }

    fn handle_entity_spawn(&self, world: &str, entity: &EntityRef) {}

    fn handle_entity_despawn(&self, world: &str, entity: &EntityRef) {}

    /// The world is being closed.
    fn handle_close(&self, world: &str) {}

    #[doc(hidden)]
    fn wrapped_base(&self) -> Option<Arc<dyn WorldHandler>> {
        None
    }
}

impl WorldHandler for HandlerChain<dyn WorldHandler> {
    fn handle_liquid_flow(&self, ctx: &mut EventContext, world: &str, from: BlockPos, into: BlockPos, liquid: &str) {
        self.cancellable(ctx, |h, ctx| h.handle_liquid_flow(ctx, world, from, into, liquid));
    }

    fn handle_fire_spread(&self, ctx: &mut EventContext, world: &str, from: BlockPos, to: BlockPos) {
        self.cancellable(ctx, |h, ctx| h.handle_fire_spread(ctx, world, from, to));
    }

    fn handle_explosion(
        &self,
        ctx: &mut EventContext,
        world: &str,
        origin: Position,
        affected: &mut Vec<BlockPos>,
    ) {
        self.cancellable(ctx, |h, ctx| h.handle_explosion(ctx, world, origin, &mut *affected));
    }

    fn handle_entity_spawn(&self, world: &str, entity: &EntityRef) {
        self.notify(|h| h.handle_entity_spawn(world, entity));
    }

    fn handle_entity_despawn(&self, world: &str, entity: &EntityRef) {
        self.notify(|h| h.handle_entity_despawn(world, entity));
    }

    fn handle_close(&self, world: &str) {
        self.notify(|h| h.handle_close(world));
    }

    fn wrapped_base(&self) -> Option<Arc<dyn WorldHandler>> {
        Some(Arc::clone(self.base()))
    }
}
