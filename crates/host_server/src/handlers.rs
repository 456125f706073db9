//! The server's own handlers, which run after every plugin handler.

use plugin_host::events::{EventContext, InventoryHandler, PlayerHandler, WorldHandler};
use plugin_host::{BlockPos, EntityRef, ItemStack, PlayerRef, Position};
use tracing::{debug, trace};

/// Base handler for all three event domains; it only traces what reaches it.
#[derive(Debug, Default)]
pub struct ServerHandlers;

impl PlayerHandler for ServerHandlers {
    fn handle_chat(&self, _ctx: &mut EventContext, player: &PlayerRef, message: &mut String) {
        debug!(player = %player.name, "💬 {}", message);
    }

    fn handle_command_execution(&self, _ctx: &mut EventContext, player: &PlayerRef, line: &str) {
        debug!(player = %player.name, "⌨️ {}", line);
    }

    fn handle_block_break(
        &self,
        _ctx: &mut EventContext,
        player: &PlayerRef,
        pos: BlockPos,
        drops: &mut Vec<ItemStack>,
    ) {
        trace!(player = %player.name, ?pos, drops = drops.len(), "block broken");
    }

    fn handle_move(&self, _ctx: &mut EventContext, player: &PlayerRef, to: Position) {
        trace!(player = %player.name, ?to, "moved");
    }

    fn handle_join(&self, player: &PlayerRef) {
        debug!("👋 {} joined", player.name);
    }

    fn handle_quit(&self, player: &PlayerRef) {
        debug!("👋 {} left", player.name);
    }
}

impl WorldHandler for ServerHandlers {
    fn handle_explosion(
        &self,
        _ctx: &mut EventContext,
        world: &str,
        origin: Position,
        affected: &mut Vec<BlockPos>,
    ) {
        trace!(world, ?origin, blocks = affected.len(), "explosion");
    }

    fn handle_entity_spawn(&self, world: &str, entity: &EntityRef) {
        trace!(world, kind = %entity.kind, "entity spawned");
    }

    fn handle_close(&self, world: &str) {
        debug!("🌍 World {} closed", world);
    }
}

impl InventoryHandler for ServerHandlers {
    fn handle_drop(&self, _ctx: &mut EventContext, owner: &PlayerRef, slot: usize, item: &ItemStack) {
        trace!(player = %owner.name, slot, item = %item.item, count = item.count, "item dropped");
    }
}
