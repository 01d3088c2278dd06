//! The engine's view of the host world.
//!
//! The world owns every node. It is the ground truth the engine reconciles
//! against, and it is only partially observable: positions in an unloaded
//! region simply report no node, and nodes can disappear without the engine
//! hearing about it.

use crate::coord::{BlockPos, Direction};
use crate::node::GridNode;

/// Read/write access to the nodes currently loaded in the world.
pub trait GridWorld {
    /// The node at `pos`, if one is loaded there.
    fn node(&self, pos: BlockPos) -> Option<&dyn GridNode>;

    fn node_mut(&mut self, pos: BlockPos) -> Option<&mut dyn GridNode>;

    /// Every position holding a loaded grid node, in any order.
    fn loaded_positions(&self) -> Vec<BlockPos>;
}

/// Whether the nodes at `pos` and across `dir` accept each other.
///
/// Both sides must agree: `a.connects(dir) && b.connects(dir.opposite())`.
pub fn mutually_connected(world: &dyn GridWorld, pos: BlockPos, dir: Direction) -> bool {
    let Some(a) = world.node(pos) else {
        return false;
    };
    let Some(b) = world.node(pos.offset(dir)) else {
        return false;
    };
    a.connects(dir) && b.connects(dir.opposite())
}

/// Neighbors of `pos` that are loaded and mutually connected to it.
pub fn connected_neighbors(world: &dyn GridWorld, pos: BlockPos) -> Vec<BlockPos> {
    pos.neighbors()
        .filter(|&(dir, _)| mutually_connected(world, pos, dir))
        .map(|(_, neighbor)| neighbor)
        .collect()
}
