//! Contracts a spatial object implements to take part in a power network.
//!
//! Every participant is a [`GridNode`]: it reports per-face connectivity and
//! carries a back-reference to the network it belongs to. Roles are opt-in
//! capabilities probed through the `as_*` accessors, so one object can be a
//! producer, consumer, and storage at once (or none of them, for a cable).

use serde::{Deserialize, Serialize};

use crate::coord::Direction;
use crate::energy::Energy;
use crate::id::NetworkId;

// ---------------------------------------------------------------------------
// Role contracts
// ---------------------------------------------------------------------------

/// A node that generates energy.
pub trait Producer {
    /// Most this node can produce in one tick. A query with no side effects.
    fn max_output(&self) -> Energy;

    /// Produce up to `max_requested`, returning what was actually produced.
    fn produce_energy(&mut self, max_requested: Energy) -> Energy;
}

/// A node that draws energy.
pub trait Consumer {
    /// Energy wanted this tick. A query with no side effects.
    fn energy_demand(&self) -> Energy;

    /// Accept up to `offered`, returning what was actually consumed.
    fn consume_energy(&mut self, offered: Energy) -> Energy;
}

/// A node that buffers energy (battery, capacitor bank).
pub trait Storage {
    fn can_charge(&self) -> bool;
    fn can_discharge(&self) -> bool;
    /// Most this node accepts in one tick.
    fn max_charge_rate(&self) -> Energy;
    /// Most this node releases in one tick.
    fn max_discharge_rate(&self) -> Energy;
    /// Store up to `offered`, returning what was actually stored.
    fn charge_energy(&mut self, offered: Energy) -> Energy;
    /// Release up to `requested`, returning what was actually released.
    fn discharge_energy(&mut self, requested: Energy) -> Energy;
    fn stored_energy(&self) -> Energy;
    fn capacity(&self) -> Energy;
}

// ---------------------------------------------------------------------------
// Capability set
// ---------------------------------------------------------------------------

/// Which roles a node fills. Recorded at join time to pick role lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
    pub producer: bool,
    pub consumer: bool,
    pub storage: bool,
}

impl Capabilities {
    /// A plain conduit: connectable, no energy role.
    pub const CONDUIT: Capabilities = Capabilities {
        producer: false,
        consumer: false,
        storage: false,
    };

    /// Whether every role in `other` is also present in `self`.
    pub fn covers(&self, other: Capabilities) -> bool {
        (self.producer || !other.producer)
            && (self.consumer || !other.consumer)
            && (self.storage || !other.storage)
    }

    pub fn is_conduit(&self) -> bool {
        *self == Self::CONDUIT
    }
}

// ---------------------------------------------------------------------------
// GridNode
// ---------------------------------------------------------------------------

/// Anything that can sit in a power network.
///
/// The node never owns its network: the back-reference is a plain
/// identifier, so retiring a network cannot be blocked by a node holding on
/// to it.
pub trait GridNode {
    /// Whether this node accepts a connection across the given face.
    fn connects(&self, side: Direction) -> bool;

    /// The network this node believes it belongs to.
    fn network(&self) -> Option<NetworkId>;

    fn set_network(&mut self, network: Option<NetworkId>);

    fn as_producer(&self) -> Option<&dyn Producer> {
        None
    }

    fn as_producer_mut(&mut self) -> Option<&mut dyn Producer> {
        None
    }

    fn as_consumer(&self) -> Option<&dyn Consumer> {
        None
    }

    fn as_consumer_mut(&mut self) -> Option<&mut dyn Consumer> {
        None
    }

    fn as_storage(&self) -> Option<&dyn Storage> {
        None
    }

    fn as_storage_mut(&mut self) -> Option<&mut dyn Storage> {
        None
    }

    /// Probe the role accessors.
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            producer: self.as_producer().is_some(),
            consumer: self.as_consumer().is_some(),
            storage: self.as_storage().is_some(),
        }
    }
}
