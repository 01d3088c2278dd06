//! A connected set of grid nodes and its membership operations.
//!
//! The network records which positions belong to it and which roles each
//! one fills. The nodes themselves stay owned by the world; the network
//! reaches them through [`GridWorld`] whenever it needs to talk to them.
//!
//! None of the operations here touch the global index. Callers that change
//! membership are expected to update [`GridRegistry`](crate::registry::GridRegistry)
//! in the same step (the registry's own methods do this).

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::coord::BlockPos;
use crate::energy::{Energy, Ratio, Ticks, ratio};
use crate::event::GridEvent;
use crate::id::NetworkId;
use crate::node::{Capabilities, GridNode};
use crate::world::{GridWorld, mutually_connected};

// ---------------------------------------------------------------------------
// Per-tick statistics
// ---------------------------------------------------------------------------

/// Energy moved during the most recent tick. Observability only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickStats {
    /// Energy drawn from producers.
    pub produced: Energy,
    /// Total consumer demand seen this tick.
    pub demanded: Energy,
    /// Energy accepted by consumers.
    pub consumed: Energy,
    /// Energy pushed into storage-capable members.
    pub into_storage: Energy,
    /// Energy drawn out of storage-capable members.
    pub from_storage: Energy,
}

// ---------------------------------------------------------------------------
// Repair report
// ---------------------------------------------------------------------------

/// What a validation pass changed (or found and left alone).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Members dropped because their node vanished or lost a role.
    pub removed: Vec<BlockPos>,
    /// Members whose missing back-reference was restored.
    pub repaired: Vec<BlockPos>,
    /// Members whose node claims a different live network. Not modified.
    pub conflicts: Vec<BlockPos>,
    /// Networks emptied and unregistered by the pass.
    pub deactivated: Vec<NetworkId>,
    /// Index entries added or dropped to match memberships.
    pub reindexed: usize,
}

impl RepairReport {
    /// Whether the pass mutated nothing.
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty()
            && self.repaired.is_empty()
            && self.deactivated.is_empty()
            && self.reindexed == 0
    }

    pub(crate) fn merge(&mut self, other: RepairReport) {
        self.removed.extend(other.removed);
        self.repaired.extend(other.repaired);
        self.conflicts.extend(other.conflicts);
        self.deactivated.extend(other.deactivated);
        self.reindexed += other.reindexed;
    }
}

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

/// The persisted part of a network. Membership is not stored: it is
/// rebuilt from the world on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub id: NetworkId,
    /// Lowest member position at save time. A loaded node here that does
    /// not name this network marks the record as stale.
    pub anchor: Option<BlockPos>,
    pub active: bool,
    pub stored_energy: Energy,
    pub max_storage: Energy,
    pub last_tick: TickStats,
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// A connected set of nodes sharing one energy buffer.
///
/// Role lists keep join order, which is the tie-break for every pass of the
/// tick: producers are drawn, storages charged, and consumers offered energy
/// in the order they joined.
#[derive(Debug, Clone)]
pub struct Network {
    pub(crate) id: NetworkId,
    pub(crate) members: HashMap<BlockPos, Capabilities>,
    pub(crate) producers: Vec<BlockPos>,
    pub(crate) consumers: Vec<BlockPos>,
    pub(crate) storages: Vec<BlockPos>,
    pub(crate) stored_energy: Energy,
    pub(crate) max_storage: Energy,
    pub(crate) stats: TickStats,
    pub(crate) active: bool,
    pub(crate) was_brownout: bool,
}

impl Network {
    /// Create an empty (and therefore inactive) network.
    pub fn new(id: NetworkId, max_storage: Energy) -> Self {
        Self {
            id,
            members: HashMap::new(),
            producers: Vec::new(),
            consumers: Vec::new(),
            storages: Vec::new(),
            stored_energy: 0,
            max_storage,
            stats: TickStats::default(),
            active: false,
            was_brownout: false,
        }
    }

    /// Recreate a network from its persisted record, with no members yet.
    pub fn from_record(record: NetworkRecord) -> Self {
        Self {
            stored_energy: record.stored_energy,
            stats: record.last_tick,
            ..Self::new(record.id, record.max_storage)
        }
    }

    pub fn record(&self) -> NetworkRecord {
        NetworkRecord {
            id: self.id,
            anchor: self.positions().min(),
            active: self.active,
            stored_energy: self.stored_energy,
            max_storage: self.max_storage,
            last_tick: self.stats,
        }
    }

    // -- Accessors --

    pub fn id(&self) -> NetworkId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether this network has been absorbed by a merge.
    pub fn is_retired(&self) -> bool {
        self.id.is_merged()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.members.contains_key(&pos)
    }

    /// Member positions, in no particular order.
    pub fn positions(&self) -> impl Iterator<Item = BlockPos> + '_ {
        self.members.keys().copied()
    }

    /// Member positions in ascending coordinate order.
    pub fn sorted_positions(&self) -> Vec<BlockPos> {
        let mut positions: Vec<BlockPos> = self.positions().collect();
        positions.sort();
        positions
    }

    /// Roles recorded for a member when it joined.
    pub fn capabilities_of(&self, pos: BlockPos) -> Option<Capabilities> {
        self.members.get(&pos).copied()
    }

    pub fn producers(&self) -> &[BlockPos] {
        &self.producers
    }

    pub fn consumers(&self) -> &[BlockPos] {
        &self.consumers
    }

    pub fn storages(&self) -> &[BlockPos] {
        &self.storages
    }

    pub fn stored_energy(&self) -> Energy {
        self.stored_energy
    }

    pub fn max_storage(&self) -> Energy {
        self.max_storage
    }

    /// Statistics from the most recent tick.
    pub fn stats(&self) -> TickStats {
        self.stats
    }

    pub fn is_brownout(&self) -> bool {
        self.was_brownout
    }

    /// Share of last tick's demand that consumers accepted, from 0 to 1.
    /// One when nothing was demanded.
    pub fn satisfaction(&self) -> Ratio {
        ratio(self.stats.consumed, self.stats.demanded)
            .map_or(Ratio::ONE, |r| r.min(Ratio::ONE))
    }

    pub(crate) fn take_stored(&mut self) -> Energy {
        std::mem::take(&mut self.stored_energy)
    }

    pub(crate) fn add_stored(&mut self, amount: Energy) {
        self.stored_energy = self.stored_energy.saturating_add(amount);
    }

    // -- Membership --

    /// Add the node at `pos` and point its back-reference here.
    ///
    /// No-op if `pos` is already a member. Returns whether the node joined.
    pub fn join(&mut self, pos: BlockPos, node: &mut dyn GridNode) -> bool {
        if self.id.is_merged() {
            debug!(network = %self.id, %pos, "join on retired network ignored");
            return false;
        }
        if self.members.contains_key(&pos) {
            return false;
        }
        self.insert_member(pos, node.capabilities());
        node.set_network(Some(self.id));
        true
    }

    /// Record a member without a live node to update. Used when a merge
    /// carries over a position whose node is not loaded.
    fn insert_member(&mut self, pos: BlockPos, caps: Capabilities) {
        self.members.insert(pos, caps);
        if caps.producer {
            self.producers.push(pos);
        }
        if caps.consumer {
            self.consumers.push(pos);
        }
        if caps.storage {
            self.storages.push(pos);
        }
        self.active = true;
    }

    /// Remove the node at `pos` and clear its back-reference.
    ///
    /// This never checks whether the removal split the remaining members.
    /// Callers that suspect a split must request a rebuild.
    pub fn leave(&mut self, pos: BlockPos, world: &mut dyn GridWorld) -> bool {
        if !self.forget(pos) {
            return false;
        }
        if let Some(node) = world.node_mut(pos) {
            if node.network() == Some(self.id) {
                node.set_network(None);
            }
        }
        true
    }

    /// Drop `pos` from membership without touching its node.
    pub fn forget(&mut self, pos: BlockPos) -> bool {
        let Some(caps) = self.members.remove(&pos) else {
            return false;
        };
        if caps.producer {
            self.producers.retain(|p| *p != pos);
        }
        if caps.consumer {
            self.consumers.retain(|p| *p != pos);
        }
        if caps.storage {
            self.storages.retain(|p| *p != pos);
        }
        if self.members.is_empty() {
            self.active = false;
        }
        true
    }

    fn clear_members(&mut self) {
        self.members.clear();
        self.producers.clear();
        self.consumers.clear();
        self.storages.clear();
        self.active = false;
    }

    /// Move every member of `other` into this network and retire `other`.
    ///
    /// `other` ends up empty, inactive, and carrying the merged marker on its
    /// identifier. Repeating the call is a no-op because the marker
    /// short-circuits it. Returns the number of members moved.
    pub fn absorb(&mut self, other: &mut Network, world: &mut dyn GridWorld) -> usize {
        if self.id == other.id {
            return 0;
        }
        if self.id.is_merged() || other.id.is_merged() {
            debug!(primary = %self.id, secondary = %other.id, "merge with retired network ignored");
            return 0;
        }

        let incoming: Vec<(BlockPos, Capabilities)> = other
            .sorted_positions()
            .into_iter()
            .filter_map(|pos| other.members.get(&pos).map(|caps| (pos, *caps)))
            .collect();

        let mut moved = 0;
        for (pos, caps) in incoming {
            let joined = match world.node_mut(pos) {
                Some(node) => self.join(pos, node),
                None if !self.members.contains_key(&pos) => {
                    self.insert_member(pos, caps);
                    true
                }
                None => false,
            };
            if joined {
                moved += 1;
            }
        }

        self.add_stored(other.take_stored());
        other.clear_members();
        other.was_brownout = false;
        other.id = other.id.into_merged();
        moved
    }

    /// Recompute membership by walking mutual connections from `origin`.
    ///
    /// Membership is cleared first and every reachable node joins. Returns
    /// the former members that were not reached: they are disconnected from
    /// this network now and need a network of their own.
    pub fn rebuild(&mut self, origin: BlockPos, world: &mut dyn GridWorld) -> BTreeSet<BlockPos> {
        if self.id.is_merged() {
            debug!(network = %self.id, %origin, "rebuild on retired network ignored");
            return BTreeSet::new();
        }

        let before: BTreeSet<BlockPos> = self.positions().collect();
        self.clear_members();

        let mut visited: HashSet<BlockPos> = HashSet::new();
        let mut queue: VecDeque<BlockPos> = VecDeque::new();
        if world.node(origin).is_some() {
            visited.insert(origin);
            queue.push_back(origin);
        }

        while let Some(pos) = queue.pop_front() {
            if let Some(node) = world.node_mut(pos) {
                self.join(pos, node);
            }
            for (dir, next) in pos.neighbors() {
                if visited.contains(&next) {
                    continue;
                }
                if mutually_connected(&*world, pos, dir) {
                    visited.insert(next);
                    queue.push_back(next);
                }
            }
        }

        before.into_iter().filter(|pos| !visited.contains(pos)).collect()
    }

    // -- Validation --

    /// Reconcile membership against the world.
    ///
    /// Members whose node is gone, or whose node lost a role it had when it
    /// joined, are removed after the scan. A missing back-reference (or one
    /// naming a network for which `is_live` is false) is pointed back here.
    /// A back-reference naming a different live network is left alone.
    pub fn validate(
        &mut self,
        world: &mut dyn GridWorld,
        is_live: &dyn Fn(NetworkId) -> bool,
    ) -> RepairReport {
        let removed = self.prune(world);
        let mut report = self.reconcile_back_references(world, is_live);
        report.removed = removed;
        report
    }

    /// Remove members whose node is gone or lost a role it joined with.
    /// Returns the removed positions in ascending order.
    pub fn prune(&mut self, world: &mut dyn GridWorld) -> Vec<BlockPos> {
        if self.id.is_merged() {
            return Vec::new();
        }
        let invalid: Vec<BlockPos> = self
            .sorted_positions()
            .into_iter()
            .filter(|pos| {
                let joined_caps = self.members.get(pos).copied().unwrap_or_default();
                world
                    .node(*pos)
                    .is_none_or(|node| !node.capabilities().covers(joined_caps))
            })
            .collect();
        for pos in &invalid {
            self.leave(*pos, world);
        }
        if !invalid.is_empty() {
            debug!(network = %self.id, removed = invalid.len(), "pruned network");
        }
        invalid
    }

    /// Point missing or dead back-references of every member here. A member
    /// claimed by another live network is reported and left alone.
    pub fn reconcile_back_references(
        &mut self,
        world: &mut dyn GridWorld,
        is_live: &dyn Fn(NetworkId) -> bool,
    ) -> RepairReport {
        let mut report = RepairReport::default();
        if self.id.is_merged() {
            return report;
        }
        for pos in self.sorted_positions() {
            let Some(node) = world.node_mut(pos) else {
                continue;
            };
            match node.network() {
                Some(current) if current == self.id => {}
                Some(other) if is_live(other) => {
                    warn!(network = %self.id, claimed_by = %other, %pos, "member claimed by another network");
                    report.conflicts.push(pos);
                }
                _ => {
                    node.set_network(Some(self.id));
                    report.repaired.push(pos);
                }
            }
        }
        if !report.repaired.is_empty() {
            debug!(network = %self.id, repaired = report.repaired.len(), "repaired back-references");
        }
        report
    }

    /// Record whether this tick left consumers short and report transitions.
    pub(crate) fn note_supply(&mut self, unmet: Energy, tick: Ticks) -> Option<GridEvent> {
        let is_brownout = unmet > 0;
        if is_brownout == self.was_brownout {
            return None;
        }
        self.was_brownout = is_brownout;
        Some(if is_brownout {
            GridEvent::Brownout {
                network: self.id,
                deficit: unmet,
                tick,
            }
        } else {
            GridEvent::Restored {
                network: self.id,
                tick,
            }
        })
    }
}
