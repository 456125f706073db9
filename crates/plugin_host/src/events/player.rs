use std::sync::Arc;

use super::{EventContext, HandlerChain};
use crate::types::{BlockPos, ItemStack, PlayerRef, Position};

/// Handler for events caused by or happening to a player.
///
/// Every method defaults to doing nothing. Methods taking an
/// [`EventContext`] can cancel the event; the others are notifications.
#[allow(unused_variables)]
pub trait PlayerHandler: Send + Sync {
    /// A chat message is about to be broadcast. `message` may be rewritten.
    fn handle_chat(&self, ctx: &mut EventContext, player: &PlayerRef, message: &mut String) {}

    /// The player is about to move to `to`.
    fn handle_move(&self, ctx: &mut EventContext, player: &PlayerRef, to: Position) {}

    /// The player is about to run a command line.
    fn handle_command_execution(&self, ctx: &mut EventContext, player: &PlayerRef, line: &str) {}

    fn handle_block_break(
        &self,
        ctx: &mut EventContext,
        player: &PlayerRef,
        pos: BlockPos,
        drops: &mut Vec<ItemStack>,
    ) {
    }

    fn handle_block_place(&self, ctx: &mut EventContext, player: &PlayerRef, pos: BlockPos, block: &str) {}

    fn handle_item_use(&self, ctx: &mut EventContext, player: &PlayerRef, item: &ItemStack) {}

    /// The player is about to take `damage`; the amount may be changed.
    fn handle_hurt(&self, ctx: &mut EventContext, player: &PlayerRef, damage: &mut f64, source: &str) {}

    fn handle_join(&self, player: &PlayerRef) {}

    /// The player respawned; `position` may be changed.
    fn handle_respawn(&self, player: &PlayerRef, position: &mut Position) {}

    fn handle_death(&self, player: &PlayerRef, source: &str) {}

    fn handle_quit(&self, player: &PlayerRef) {}

    /// Set only by [`HandlerChain`]; used to unwrap a chain before wrapping
    /// it again.
    #[doc(hidden)]
    fn wrapped_base(&self) -> Option<Arc<dyn PlayerHandler>> {
        None
    }
}

impl PlayerHandler for HandlerChain<dyn PlayerHandler> {
    fn handle_chat(&self, ctx: &mut EventContext, player: &PlayerRef, message: &mut String) {
        self.cancellable(ctx, |h, ctx| h.handle_chat(ctx, player, &mut *message));
    }

    fn handle_move(&self, ctx: &mut EventContext, player: &PlayerRef, to: Position) {
        self.cancellable(ctx, |h, ctx| h.handle_move(ctx, player, to));
    }

    fn handle_command_execution(&self, ctx: &mut EventContext, player: &PlayerRef, line: &str) {
        self.cancellable(ctx, |h, ctx| h.handle_command_execution(ctx, player, line));
    }

    fn handle_block_break(
        &self,
        ctx: &mut EventContext,
        player: &PlayerRef,
        pos: BlockPos,
        drops: &mut Vec<ItemStack>,
    ) {
        self.cancellable(ctx, |h, ctx| h.handle_block_break(ctx, player, pos, &mut *drops));
    }

    fn handle_block_place(&self, ctx: &mut EventContext, player: &PlayerRef, pos: BlockPos, block: &str) {
        self.cancellable(ctx, |h, ctx| h.handle_block_place(ctx, player, pos, block));
    }

    fn handle_item_use(&self, ctx: &mut EventContext, player: &PlayerRef, item: &ItemStack) {
        self.cancellable(ctx, |h, ctx| h.handle_item_use(ctx, player, item));
    }

    fn handle_hurt(&self, ctx: &mut EventContext, player: &PlayerRef, damage: &mut f64, source: &str) {
        self.cancellable(ctx, |h, ctx| h.handle_hurt(ctx, player, &mut *damage, source));
    }

    fn handle_join(&self, player: &PlayerRef) {
        self.notify(|h| h.handle_join(player));
    }

    fn handle_respawn(&self, player: &PlayerRef, position: &mut Position) {
        self.notify(|h| h.handle_respawn(player, &mut *position));
    }

    fn handle_death(&self, player: &PlayerRef, source: &str) {
        self.notify(|h| h.handle_death(player, source));
    }

    fn handle_quit(&self, player: &PlayerRef) {
        self.notify(|h| h.handle_quit(player));
    }

    fn wrapped_base(&self) -> Option<Arc<dyn PlayerHandler>> {
        Some(Arc::clone(self.base()))
    }
}
