//! The global registry: every live network and the coordinate index.
//!
//! The registry is the authority for "which network owns this position".
//! Every method that changes a network's membership also updates the index
//! before returning, so outside of a single call the index and the
//! memberships agree exactly.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use tracing::{debug, info, warn};

use crate::coord::BlockPos;
use crate::energy::Energy;
use crate::id::NetworkId;
use crate::network::{Network, NetworkRecord, RepairReport};
use crate::world::{GridWorld, connected_neighbors};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// How a position was settled into a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The position was already indexed; nothing changed.
    AlreadyIndexed(NetworkId),
    /// No node is loaded at the position.
    Vanished,
    /// Joined an adjacent network (after merging any other adjacent ones).
    Joined(NetworkId),
    /// Revived the persisted network its back-reference named.
    Revived(NetworkId),
    /// Started a new single-node network.
    Created(NetworkId),
}

impl Placement {
    /// The network now holding the position, if any.
    pub fn network(self) -> Option<NetworkId> {
        match self {
            Placement::AlreadyIndexed(id)
            | Placement::Joined(id)
            | Placement::Revived(id)
            | Placement::Created(id) => Some(id),
            Placement::Vanished => None,
        }
    }
}

/// What an orphan-recovery sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanReport {
    /// Indexed nodes whose missing back-reference was restored.
    pub repaired: Vec<BlockPos>,
    /// Unindexed nodes that joined an adjacent network.
    pub joined: Vec<BlockPos>,
    /// Networks revived from persisted records.
    pub revived: Vec<NetworkId>,
    /// Networks created for isolated orphans.
    pub created: Vec<NetworkId>,
    /// Networks merged away while attaching orphans.
    pub merged: Vec<NetworkId>,
    /// Dormant records dropped because their anchor holds some other node.
    pub expired: Vec<NetworkId>,
}

impl OrphanReport {
    pub fn is_noop(&self) -> bool {
        self.repaired.is_empty()
            && self.joined.is_empty()
            && self.revived.is_empty()
            && self.created.is_empty()
            && self.merged.is_empty()
            && self.expired.is_empty()
    }
}

/// A disagreement between the index and network memberships.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inconsistency {
    /// A member position with no index entry.
    Unindexed { pos: BlockPos, network: NetworkId },
    /// A member position indexed to some other network.
    Misindexed {
        pos: BlockPos,
        network: NetworkId,
        indexed: NetworkId,
    },
    /// An index entry whose network does not list the position.
    Dangling { pos: BlockPos, indexed: NetworkId },
    /// A registered network with no members.
    Empty(NetworkId),
    /// A registered network whose identifier is retired.
    Retired(NetworkId),
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inconsistency::Unindexed { pos, network } => {
                write!(f, "{pos} is a member of {network} but not indexed")
            }
            Inconsistency::Misindexed {
                pos,
                network,
                indexed,
            } => write!(f, "{pos} is a member of {network} but indexed to {indexed}"),
            Inconsistency::Dangling { pos, indexed } => {
                write!(f, "{pos} is indexed to {indexed}, which does not contain it")
            }
            Inconsistency::Empty(id) => write!(f, "{id} is registered with no members"),
            Inconsistency::Retired(id) => write!(f, "{id} is registered but retired"),
        }
    }
}

// ---------------------------------------------------------------------------
// GridRegistry
// ---------------------------------------------------------------------------

/// Every live network, keyed by identifier, plus the position index.
#[derive(Debug, Clone)]
pub struct GridRegistry {
    networks: BTreeMap<NetworkId, Network>,
    index: HashMap<BlockPos, NetworkId>,
    /// Identifiers absorbed by a merge. Permanently inert.
    retired: BTreeSet<NetworkId>,
    /// Persisted networks waiting for a node that names them.
    dormant: BTreeMap<NetworkId, NetworkRecord>,
    next_serial: u64,
    network_buffer: Energy,
}

impl GridRegistry {
    /// Create an empty registry whose new networks get `network_buffer` as
    /// their buffer cap.
    pub fn new(network_buffer: Energy) -> Self {
        Self {
            networks: BTreeMap::new(),
            index: HashMap::new(),
            retired: BTreeSet::new(),
            dormant: BTreeMap::new(),
            next_serial: 0,
            network_buffer,
        }
    }

    pub fn network_buffer(&self) -> Energy {
        self.network_buffer
    }

    /// The serial the next created network will get.
    pub fn next_serial(&self) -> u64 {
        self.next_serial
    }

    fn allocate_id(&mut self) -> NetworkId {
        let id = NetworkId::new(self.next_serial);
        self.next_serial += 1;
        id
    }

    // -- Lookups --

    pub fn network(&self, id: NetworkId) -> Option<&Network> {
        self.networks.get(&id)
    }

    pub fn network_mut(&mut self, id: NetworkId) -> Option<&mut Network> {
        self.networks.get_mut(&id)
    }

    pub fn id_at(&self, pos: BlockPos) -> Option<NetworkId> {
        self.index.get(&pos).copied()
    }

    pub fn network_at(&self, pos: BlockPos) -> Option<&Network> {
        self.id_at(pos).and_then(|id| self.networks.get(&id))
    }

    /// Registered networks in ascending identifier order.
    pub fn networks(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    pub(crate) fn networks_mut(&mut self) -> impl Iterator<Item = &mut Network> {
        self.networks.values_mut()
    }

    pub fn ids(&self) -> Vec<NetworkId> {
        self.networks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    /// Number of indexed positions.
    pub fn indexed_len(&self) -> usize {
        self.index.len()
    }

    /// Whether `id` names a registered network.
    pub fn is_live(&self, id: NetworkId) -> bool {
        !id.is_merged() && self.networks.contains_key(&id)
    }

    /// Whether `id` was absorbed by a merge (or carries the merged marker).
    pub fn is_retired(&self, id: NetworkId) -> bool {
        id.is_merged() || self.retired.contains(&id)
    }

    pub fn dormant(&self) -> impl Iterator<Item = &NetworkRecord> {
        self.dormant.values()
    }

    pub fn is_dormant(&self, id: NetworkId) -> bool {
        self.dormant.contains_key(&id)
    }

    // -- Registration --

    /// Register an empty network under a fresh identifier.
    pub fn create_network(&mut self) -> NetworkId {
        let id = self.allocate_id();
        self.networks.insert(id, Network::new(id, self.network_buffer));
        debug!(network = %id, "created network");
        id
    }

    /// Add `network` and index all of its members.
    ///
    /// A network already registered under the same identifier is replaced.
    /// Refused for retired identifiers.
    pub fn register(&mut self, network: Network) -> bool {
        let id = network.id();
        if self.is_retired(id) {
            debug!(network = %id, "register of retired network ignored");
            return false;
        }
        self.unregister(id);
        for pos in network.positions() {
            self.index.insert(pos, id);
        }
        self.next_serial = self.next_serial.max(id.serial() + 1);
        self.dormant.remove(&id);
        self.networks.insert(id, network);
        true
    }

    /// Remove a network and every index entry pointing at it.
    pub fn unregister(&mut self, id: NetworkId) -> Option<Network> {
        let network = self.networks.remove(&id)?;
        for pos in network.positions() {
            if self.index.get(&pos) == Some(&id) {
                self.index.remove(&pos);
            }
        }
        Some(network)
    }

    /// Join the node at `pos` to network `id` and index it.
    ///
    /// Refused when the position already belongs to a network, when `id` is
    /// not live, or when no node is loaded at `pos`.
    pub fn join(&mut self, id: NetworkId, pos: BlockPos, world: &mut dyn GridWorld) -> bool {
        if let Some(current) = self.id_at(pos) {
            if current != id {
                debug!(%pos, network = %id, owner = %current, "join of owned position ignored");
            }
            return false;
        }
        if self.is_retired(id) {
            debug!(network = %id, %pos, "join on retired network ignored");
            return false;
        }
        let Some(network) = self.networks.get_mut(&id) else {
            debug!(network = %id, %pos, "join on unknown network ignored");
            return false;
        };
        let Some(node) = world.node_mut(pos) else {
            return false;
        };
        if !network.join(pos, node) {
            return false;
        }
        self.index.insert(pos, id);
        true
    }

    /// Absorb `secondary` into `primary` and retire `secondary`.
    ///
    /// `secondary` is unregistered first, then merged, then every member of
    /// `primary` is reindexed. Returns the number of members moved.
    pub fn merge_networks(
        &mut self,
        primary: NetworkId,
        secondary: NetworkId,
        world: &mut dyn GridWorld,
    ) -> usize {
        if primary == secondary {
            return 0;
        }
        if self.is_retired(primary) || self.is_retired(secondary) {
            debug!(%primary, %secondary, "merge with retired network ignored");
            return 0;
        }
        if !self.networks.contains_key(&primary) || !self.networks.contains_key(&secondary) {
            debug!(%primary, %secondary, "merge with unknown network ignored");
            return 0;
        }
        let Some(mut absorbed) = self.unregister(secondary) else {
            return 0;
        };
        let Some(target) = self.networks.get_mut(&primary) else {
            return 0;
        };

        let moved = target.absorb(&mut absorbed, world);
        for pos in target.positions() {
            self.index.insert(pos, primary);
        }
        self.retired.insert(secondary);
        debug!(%primary, %secondary, moved, size = target.len(), "merged networks");
        moved
    }

    /// Drop `pos` from whatever network owns it.
    ///
    /// A network emptied this way is unregistered. Returns the network the
    /// position belonged to. Never checks for a split.
    pub fn remove_node(&mut self, pos: BlockPos, world: &mut dyn GridWorld) -> Option<NetworkId> {
        let id = self.index.remove(&pos)?;
        let Some(network) = self.networks.get_mut(&id) else {
            warn!(%pos, network = %id, "index named an unregistered network");
            return Some(id);
        };
        network.leave(pos, world);
        if network.is_empty() {
            self.networks.remove(&id);
            debug!(network = %id, "network emptied and unregistered");
        }
        Some(id)
    }

    /// Pick the network other adjacent networks get merged into: the
    /// largest, with ties going to the lowest identifier.
    pub fn merge_target(&self, candidates: &BTreeSet<NetworkId>) -> Option<NetworkId> {
        candidates
            .iter()
            .filter_map(|id| self.networks.get(id).map(|net| (*id, net.len())))
            .max_by(|(a_id, a_len), (b_id, b_len)| a_len.cmp(b_len).then(b_id.cmp(a_id)))
            .map(|(id, _)| id)
    }

    /// Merge every network in `ids` into one and return it.
    pub fn merge_all(
        &mut self,
        ids: &BTreeSet<NetworkId>,
        world: &mut dyn GridWorld,
    ) -> Option<(NetworkId, Vec<NetworkId>)> {
        let target = self.merge_target(ids)?;
        let mut absorbed = Vec::new();
        for &other in ids {
            if other != target && self.merge_networks(target, other, world) > 0 {
                absorbed.push(other);
            }
        }
        Some((target, absorbed))
    }

    // -- Placement --

    /// Settle the node at `pos` into a network.
    ///
    /// Adjacent live networks are merged and the node joins the result. With
    /// no neighbor, a persisted network named by the node's back-reference
    /// is revived, otherwise a new network is created.
    pub fn place(&mut self, pos: BlockPos, world: &mut dyn GridWorld) -> (Placement, Vec<NetworkId>) {
        if let Some(id) = self.id_at(pos) {
            return (Placement::AlreadyIndexed(id), Vec::new());
        }
        let Some(node) = world.node(pos) else {
            return (Placement::Vanished, Vec::new());
        };
        let claimed = node.network();

        let adjacent: BTreeSet<NetworkId> = connected_neighbors(&*world, pos)
            .into_iter()
            .filter_map(|neighbor| self.id_at(neighbor))
            .filter(|id| self.is_live(*id))
            .collect();

        if let Some((target, absorbed)) = self.merge_all(&adjacent, world) {
            self.join(target, pos, world);
            return (Placement::Joined(target), absorbed);
        }

        if let Some(id) = claimed.filter(|id| self.dormant.contains_key(id)) {
            if self.revive(id) && self.join(id, pos, world) {
                return (Placement::Revived(id), Vec::new());
            }
        }

        // A stale back-reference is dropped before joining a new network.
        if let Some(node) = world.node_mut(pos) {
            node.set_network(None);
        }
        let id = self.create_network();
        self.join(id, pos, world);
        (Placement::Created(id), Vec::new())
    }

    // -- Split resolution --

    /// Recompute the network owning `origin` from world connectivity.
    ///
    /// Every node reachable from `origin` ends up in the origin's network;
    /// networks emptied by that are dropped and their buffer moves over.
    /// Former members no longer reachable are grouped into new networks, one
    /// per connected component. Returns the networks holding the result.
    pub fn rebuild_from(&mut self, origin: BlockPos, world: &mut dyn GridWorld) -> Vec<NetworkId> {
        let Some(id) = self.id_at(origin) else {
            debug!(%origin, "rebuild from unindexed position ignored");
            return Vec::new();
        };
        let Some(mut network) = self.unregister(id) else {
            return Vec::new();
        };

        let mut leftovers = network.rebuild(origin, world);
        self.claim_members(&mut network);

        let mut result = Vec::new();
        let mut orphaned_energy: Energy = 0;
        if network.is_empty() {
            orphaned_energy = network.take_stored();
            debug!(network = %id, "rebuild left network empty");
        } else {
            result.push(id);
            self.register(network);
        }

        while let Some(start) = leftovers.pop_first() {
            if world.node(start).is_none() || self.index.contains_key(&start) {
                continue;
            }
            let split_id = self.allocate_id();
            let mut split = Network::new(split_id, self.network_buffer);
            split.rebuild(start, world);
            for pos in split.positions() {
                leftovers.remove(&pos);
            }
            self.claim_members(&mut split);
            split.add_stored(std::mem::take(&mut orphaned_energy));
            info!(network = %id, split = %split_id, size = split.len(), "network split");
            result.push(split_id);
            self.register(split);
        }
        result
    }

    /// Take every member of `network` away from whichever registered
    /// network also lists it. Networks left empty are unregistered and
    /// their buffer moves into `network`.
    fn claim_members(&mut self, network: &mut Network) {
        for pos in network.sorted_positions() {
            let Some(owner) = self.index.remove(&pos) else {
                continue;
            };
            if owner == network.id() {
                continue;
            }
            let Some(previous) = self.networks.get_mut(&owner) else {
                continue;
            };
            previous.forget(pos);
            if previous.is_empty() {
                let energy = previous.take_stored();
                self.networks.remove(&owner);
                network.add_stored(energy);
                debug!(network = %owner, into = %network.id(), "network emptied by rebuild");
            }
        }
    }

    // -- Validation --

    /// Every disagreement between the index and the memberships.
    pub fn check_consistency(&self) -> Vec<Inconsistency> {
        let mut problems = Vec::new();
        for (id, network) in &self.networks {
            if self.is_retired(*id) {
                problems.push(Inconsistency::Retired(*id));
            }
            if network.is_empty() {
                problems.push(Inconsistency::Empty(*id));
            }
            for pos in network.sorted_positions() {
                match self.index.get(&pos) {
                    None => problems.push(Inconsistency::Unindexed { pos, network: *id }),
                    Some(indexed) if indexed != id => problems.push(Inconsistency::Misindexed {
                        pos,
                        network: *id,
                        indexed: *indexed,
                    }),
                    Some(_) => {}
                }
            }
        }
        let mut indexed: Vec<(&BlockPos, &NetworkId)> = self.index.iter().collect();
        indexed.sort();
        for (pos, id) in indexed {
            let listed = self.networks.get(id).is_some_and(|n| n.contains(*pos));
            if !listed {
                problems.push(Inconsistency::Dangling {
                    pos: *pos,
                    indexed: *id,
                });
            }
        }
        problems
    }

    /// Validate every network against the world and bring the index back in
    /// line with the memberships.
    ///
    /// Every network is pruned before any back-reference is judged, so a
    /// network emptied by this pass already counts as dead for the rest.
    pub fn validate_and_repair(&mut self, world: &mut dyn GridWorld) -> RepairReport {
        let mut report = RepairReport::default();

        for id in self.ids() {
            let Some(network) = self.networks.get_mut(&id) else {
                continue;
            };
            let removed = network.prune(world);
            let emptied = network.is_empty();
            for pos in &removed {
                if self.index.get(pos) == Some(&id) {
                    self.index.remove(pos);
                    report.reindexed += 1;
                }
            }
            report.removed.extend(removed);
            if emptied {
                self.networks.remove(&id);
                info!(network = %id, "network emptied by validation");
                report.deactivated.push(id);
            }
        }

        for id in self.ids() {
            let Some(mut network) = self.networks.remove(&id) else {
                continue;
            };
            let networks = &self.networks;
            let partial = network
                .reconcile_back_references(world, &|other| networks.contains_key(&other));
            report.merge(partial);
            self.networks.insert(id, network);
        }

        for (id, network) in &self.networks {
            for pos in network.positions() {
                if self.index.get(&pos) != Some(id) {
                    self.index.insert(pos, *id);
                    report.reindexed += 1;
                }
            }
        }
        let networks = &self.networks;
        let before = self.index.len();
        self.index
            .retain(|pos, id| networks.get(id).is_some_and(|n| n.contains(*pos)));
        report.reindexed += before - self.index.len();

        if !report.is_noop() {
            debug!(
                removed = report.removed.len(),
                repaired = report.repaired.len(),
                deactivated = report.deactivated.len(),
                reindexed = report.reindexed,
                "validation pass repaired registry"
            );
        }
        report
    }

    /// Sweep the loaded world for nodes the registry does not account for.
    ///
    /// Indexed nodes with a missing or dead back-reference are pointed back
    /// at their network. Unindexed nodes are placed as if they had just been
    /// built.
    pub fn recover_orphans(&mut self, world: &mut dyn GridWorld) -> OrphanReport {
        let mut report = OrphanReport::default();
        let mut positions = world.loaded_positions();
        positions.sort();

        for pos in positions {
            if let Some(id) = self.id_at(pos) {
                let stale = world
                    .node(pos)
                    .is_some_and(|node| !node.network().is_some_and(|n| self.is_live(n)));
                if stale {
                    if let Some(node) = world.node_mut(pos) {
                        node.set_network(Some(id));
                        report.repaired.push(pos);
                    }
                }
                continue;
            }
            let (placement, merged) = self.place(pos, world);
            report.merged.extend(merged);
            match placement {
                Placement::Joined(_) => report.joined.push(pos),
                Placement::Revived(id) => report.revived.push(id),
                Placement::Created(id) => report.created.push(id),
                Placement::AlreadyIndexed(_) | Placement::Vanished => {}
            }
        }

        // Every loaded node is settled now, so a dormant record whose anchor
        // holds a node was not claimed by it.
        report.expired = self
            .dormant
            .values()
            .filter(|record| record.anchor.is_some_and(|pos| world.node(pos).is_some()))
            .map(|record| record.id)
            .collect();
        for id in &report.expired {
            self.dormant.remove(id);
        }

        if !report.is_noop() {
            info!(
                repaired = report.repaired.len(),
                joined = report.joined.len(),
                revived = report.revived.len(),
                created = report.created.len(),
                expired = report.expired.len(),
                "recovered orphan nodes"
            );
        }
        report
    }

    // -- Persistence --

    /// Records for every registered and dormant network, by identifier.
    pub fn records(&self) -> Vec<NetworkRecord> {
        let mut records: Vec<NetworkRecord> = self
            .networks
            .values()
            .map(Network::record)
            .chain(self.dormant.values().cloned())
            .collect();
        records.sort_by_key(|r| r.id);
        records
    }

    /// Hold persisted records until nodes naming them are seen. Records
    /// whose anchor turns out to hold another node are dropped by the next
    /// orphan sweep.
    ///
    /// Records with a retired or already registered identifier are skipped.
    /// Returns how many records were kept.
    pub fn restore(&mut self, records: Vec<NetworkRecord>, next_serial: u64) -> usize {
        self.next_serial = self.next_serial.max(next_serial);
        let mut kept = 0;
        for record in records {
            if self.is_retired(record.id) || self.networks.contains_key(&record.id) {
                debug!(network = %record.id, "skipped persisted record");
                continue;
            }
            self.next_serial = self.next_serial.max(record.id.serial() + 1);
            self.dormant.insert(record.id, record);
            kept += 1;
        }
        kept
    }

    /// Register a dormant network (with no members yet).
    pub fn revive(&mut self, id: NetworkId) -> bool {
        let Some(record) = self.dormant.remove(&id) else {
            return false;
        };
        debug!(network = %id, stored = record.stored_energy, "revived persisted network");
        self.networks.insert(id, Network::from_record(record));
        true
    }

    /// Drop every network, record, and index entry. The serial counter is
    /// kept so identifiers stay unique for the process.
    pub fn clear(&mut self) {
        self.networks.clear();
        self.index.clear();
        self.retired.clear();
        self.dormant.clear();
    }
}
