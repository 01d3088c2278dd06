//! Handlers for world events: a node was built, broken, or its neighborhood
//! changed.
//!
//! Removal is lazy about splits: dropping a node never checks whether the
//! rest of its network is still connected unless the caller asks for a
//! rebuild. Without one, a cut network keeps ticking as a single network
//! until something rebuilds it.

use std::collections::BTreeSet;

use tracing::debug;

use crate::coord::BlockPos;
use crate::id::NetworkId;
use crate::registry::{GridRegistry, Placement};
use crate::world::{GridWorld, connected_neighbors};

/// Outcome of [`GridRegistry::on_node_removed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removal {
    /// The network the node belonged to, if it was indexed.
    pub network: Option<NetworkId>,
    /// Networks holding the former neighbors after a rebuild. Empty when no
    /// rebuild ran.
    pub rebuilt: Vec<NetworkId>,
}

impl GridRegistry {
    /// A node appeared at `pos`.
    ///
    /// Joins an adjacent network (merging any further adjacent ones into
    /// it), revives the persisted network the node names, or starts a new
    /// one. No-op for an already indexed position.
    pub fn on_node_placed(&mut self, pos: BlockPos, world: &mut dyn GridWorld) -> Placement {
        let (placement, merged) = self.place(pos, world);
        if !merged.is_empty() {
            debug!(%pos, network = ?placement.network(), merged = merged.len(), "placement bridged networks");
        }
        placement
    }

    /// The node at `pos` is gone from the world.
    ///
    /// With `rebuild` set and two or more former neighbors in the same
    /// network, the network is rebuilt from the first of them so a cut
    /// becomes separate networks right away.
    pub fn on_node_removed(
        &mut self,
        pos: BlockPos,
        world: &mut dyn GridWorld,
        rebuild: bool,
    ) -> Removal {
        let Some(id) = self.id_at(pos) else {
            return Removal::default();
        };

        let mut neighbors: Vec<BlockPos> = pos
            .neighbors()
            .filter(|(dir, neighbor)| {
                self.id_at(*neighbor) == Some(id)
                    && world
                        .node(*neighbor)
                        .is_some_and(|node| node.connects(dir.opposite()))
            })
            .map(|(_, neighbor)| neighbor)
            .collect();
        neighbors.sort();

        self.remove_node(pos, world);

        let mut removal = Removal {
            network: Some(id),
            rebuilt: Vec::new(),
        };
        if rebuild && neighbors.len() >= 2 {
            removal.rebuilt = self.rebuild_from(neighbors[0], world);
        }
        removal
    }

    /// The connections around `pos` may have changed.
    ///
    /// Every mutually connected neighbor in another live network gets merged
    /// with the network at `pos`. An unindexed node is placed instead.
    /// Returns the identifiers merged away.
    pub fn on_neighbors_changed(
        &mut self,
        pos: BlockPos,
        world: &mut dyn GridWorld,
    ) -> Vec<NetworkId> {
        let Some(own) = self.id_at(pos) else {
            if world.node(pos).is_none() {
                return Vec::new();
            }
            return self.place(pos, world).1;
        };

        let mut adjacent: BTreeSet<NetworkId> = connected_neighbors(&*world, pos)
            .into_iter()
            .filter_map(|neighbor| self.id_at(neighbor))
            .filter(|id| self.is_live(*id))
            .collect();
        if adjacent.iter().all(|id| *id == own) {
            return Vec::new();
        }
        adjacent.insert(own);
        self.merge_all(&adjacent, world)
            .map(|(_, absorbed)| absorbed)
            .unwrap_or_default()
    }
}
