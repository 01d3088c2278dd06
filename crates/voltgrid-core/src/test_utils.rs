//! Shared test helpers for unit tests, integration tests, and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so downstream
//! crates can pull in the in-memory world through the `test-utils` feature.

use std::collections::{BTreeMap, HashMap};

use crate::coord::{BlockPos, Direction, RegionPos};
use crate::energy::Energy;
use crate::id::NetworkId;
use crate::node::{Consumer, GridNode, Producer, Storage};

pub use crate::world::GridWorld;

// ===========================================================================
// Role components
// ===========================================================================

/// A generator with a fixed per-tick output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestProducer {
    pub output: Energy,
    /// Everything produced since creation.
    pub produced_total: Energy,
}

impl TestProducer {
    pub fn new(output: Energy) -> Self {
        Self {
            output,
            produced_total: 0,
        }
    }
}

impl Producer for TestProducer {
    fn max_output(&self) -> Energy {
        self.output
    }

    fn produce_energy(&mut self, max_requested: Energy) -> Energy {
        let produced = max_requested.min(self.output);
        self.produced_total += produced;
        produced
    }
}

/// A machine with a constant demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConsumer {
    pub demand: Energy,
    /// Upper bound on what one offer is accepted up to, if any.
    pub accept_limit: Option<Energy>,
    pub last_received: Energy,
    pub received_total: Energy,
}

impl TestConsumer {
    pub fn new(demand: Energy) -> Self {
        Self {
            demand,
            accept_limit: None,
            last_received: 0,
            received_total: 0,
        }
    }
}

impl Consumer for TestConsumer {
    fn energy_demand(&self) -> Energy {
        self.demand
    }

    fn consume_energy(&mut self, offered: Energy) -> Energy {
        let took = offered
            .min(self.demand)
            .min(self.accept_limit.unwrap_or(Energy::MAX));
        self.last_received = took;
        self.received_total += took;
        took
    }
}

/// A battery with symmetric bookkeeping and separate rate limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestStorage {
    pub capacity: Energy,
    pub stored: Energy,
    pub charge_rate: Energy,
    pub discharge_rate: Energy,
}

impl Storage for TestStorage {
    fn can_charge(&self) -> bool {
        self.stored < self.capacity
    }

    fn can_discharge(&self) -> bool {
        self.stored > 0
    }

    fn max_charge_rate(&self) -> Energy {
        self.charge_rate
    }

    fn max_discharge_rate(&self) -> Energy {
        self.discharge_rate
    }

    fn charge_energy(&mut self, offered: Energy) -> Energy {
        let took = offered
            .min(self.charge_rate)
            .min(self.capacity.saturating_sub(self.stored));
        self.stored += took;
        took
    }

    fn discharge_energy(&mut self, requested: Energy) -> Energy {
        let released = requested.min(self.discharge_rate).min(self.stored);
        self.stored -= released;
        released
    }

    fn stored_energy(&self) -> Energy {
        self.stored
    }

    fn capacity(&self) -> Energy {
        self.capacity
    }
}

// ===========================================================================
// TestNode
// ===========================================================================

/// A grid node assembled from optional role components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestNode {
    pub network: Option<NetworkId>,
    pub producer: Option<TestProducer>,
    pub consumer: Option<TestConsumer>,
    pub storage: Option<TestStorage>,
    /// Faces that refuse connections.
    pub sealed: Vec<Direction>,
}

impl TestNode {
    pub fn cable() -> Self {
        Self::default()
    }

    pub fn producer(output: Energy) -> Self {
        Self {
            producer: Some(TestProducer::new(output)),
            ..Self::default()
        }
    }

    pub fn consumer(demand: Energy) -> Self {
        Self {
            consumer: Some(TestConsumer::new(demand)),
            ..Self::default()
        }
    }

    pub fn battery(
        capacity: Energy,
        stored: Energy,
        charge_rate: Energy,
        discharge_rate: Energy,
    ) -> Self {
        Self {
            storage: Some(TestStorage {
                capacity,
                stored,
                charge_rate,
                discharge_rate,
            }),
            ..Self::default()
        }
    }

    pub fn with_consumer(mut self, demand: Energy) -> Self {
        self.consumer = Some(TestConsumer::new(demand));
        self
    }

    /// Cap how much the consumer role accepts per offer.
    pub fn accepting_at_most(mut self, limit: Energy) -> Self {
        if let Some(consumer) = self.consumer.as_mut() {
            consumer.accept_limit = Some(limit);
        }
        self
    }

    pub fn sealed(mut self, side: Direction) -> Self {
        if !self.sealed.contains(&side) {
            self.sealed.push(side);
        }
        self
    }
}

impl GridNode for TestNode {
    fn connects(&self, side: Direction) -> bool {
        !self.sealed.contains(&side)
    }

    fn network(&self) -> Option<NetworkId> {
        self.network
    }

    fn set_network(&mut self, network: Option<NetworkId>) {
        self.network = network;
    }

    fn as_producer(&self) -> Option<&dyn Producer> {
        self.producer.as_ref().map(|p| p as &dyn Producer)
    }

    fn as_producer_mut(&mut self) -> Option<&mut dyn Producer> {
        self.producer.as_mut().map(|p| p as &mut dyn Producer)
    }

    fn as_consumer(&self) -> Option<&dyn Consumer> {
        self.consumer.as_ref().map(|c| c as &dyn Consumer)
    }

    fn as_consumer_mut(&mut self) -> Option<&mut dyn Consumer> {
        self.consumer.as_mut().map(|c| c as &mut dyn Consumer)
    }

    fn as_storage(&self) -> Option<&dyn Storage> {
        self.storage.as_ref().map(|s| s as &dyn Storage)
    }

    fn as_storage_mut(&mut self) -> Option<&mut dyn Storage> {
        self.storage.as_mut().map(|s| s as &mut dyn Storage)
    }
}

// ===========================================================================
// TestWorld
// ===========================================================================

/// An in-memory world with region-granular loading.
///
/// Unloaded regions keep their nodes aside so a later reload brings them
/// back exactly as they were, back-references included.
#[derive(Debug, Default)]
pub struct TestWorld {
    nodes: HashMap<BlockPos, TestNode>,
    unloaded: BTreeMap<RegionPos, Vec<(BlockPos, TestNode)>>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a node, replacing whatever was loaded at `pos`.
    pub fn insert(&mut self, pos: BlockPos, node: TestNode) -> Option<TestNode> {
        self.nodes.insert(pos, node)
    }

    pub fn remove(&mut self, pos: BlockPos) -> Option<TestNode> {
        self.nodes.remove(&pos)
    }

    pub fn get(&self, pos: BlockPos) -> Option<&TestNode> {
        self.nodes.get(&pos)
    }

    pub fn get_mut(&mut self, pos: BlockPos) -> Option<&mut TestNode> {
        self.nodes.get_mut(&pos)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Place `len` plain cables starting at `start` and stepping along `dir`.
    pub fn cable_line(&mut self, start: BlockPos, dir: Direction, len: usize) -> Vec<BlockPos> {
        let mut positions = Vec::with_capacity(len);
        let mut pos = start;
        for _ in 0..len {
            self.insert(pos, TestNode::cable());
            positions.push(pos);
            pos = pos.offset(dir);
        }
        positions
    }

    /// Producer component at `pos`. Panics if absent.
    pub fn producer(&self, pos: BlockPos) -> &TestProducer {
        self.get(pos)
            .and_then(|n| n.producer.as_ref())
            .unwrap_or_else(|| panic!("no producer at {pos}"))
    }

    /// Consumer component at `pos`. Panics if absent.
    pub fn consumer(&self, pos: BlockPos) -> &TestConsumer {
        self.get(pos)
            .and_then(|n| n.consumer.as_ref())
            .unwrap_or_else(|| panic!("no consumer at {pos}"))
    }

    /// Storage component at `pos`. Panics if absent.
    pub fn storage(&self, pos: BlockPos) -> &TestStorage {
        self.get(pos)
            .and_then(|n| n.storage.as_ref())
            .unwrap_or_else(|| panic!("no storage at {pos}"))
    }

    /// Total energy held by every loaded storage component.
    pub fn total_storage_energy(&self) -> Energy {
        self.nodes
            .values()
            .filter_map(|n| n.storage.as_ref())
            .map(|s| s.stored)
            .sum()
    }

    // -- Regions --

    /// Set aside every node in `region`. Returns how many were unloaded.
    pub fn unload_region(&mut self, region: RegionPos) -> usize {
        let positions: Vec<BlockPos> = self
            .nodes
            .keys()
            .copied()
            .filter(|pos| region.contains(*pos))
            .collect();
        let stash = self.unloaded.entry(region).or_default();
        for pos in &positions {
            if let Some(node) = self.nodes.remove(pos) {
                stash.push((*pos, node));
            }
        }
        positions.len()
    }

    /// Bring back the nodes unloaded from `region`.
    pub fn reload_region(&mut self, region: RegionPos) -> usize {
        let Some(stash) = self.unloaded.remove(&region) else {
            return 0;
        };
        let count = stash.len();
        self.nodes.extend(stash);
        count
    }

    /// Forget the nodes unloaded from `region`, as if the region was reset.
    pub fn drop_region(&mut self, region: RegionPos) -> usize {
        self.unloaded.remove(&region).map_or(0, |stash| stash.len())
    }

    pub fn is_loaded(&self, region: RegionPos) -> bool {
        !self.unloaded.contains_key(&region)
    }
}

impl GridWorld for TestWorld {
    fn node(&self, pos: BlockPos) -> Option<&dyn GridNode> {
        self.nodes.get(&pos).map(|n| n as &dyn GridNode)
    }

    fn node_mut(&mut self, pos: BlockPos) -> Option<&mut dyn GridNode> {
        self.nodes.get_mut(&pos).map(|n| n as &mut dyn GridNode)
    }

    fn loaded_positions(&self) -> Vec<BlockPos> {
        self.nodes.keys().copied().collect()
    }
}
