//! VoltGrid Core -- the power-grid network engine.
//!
//! Tracks which spatial nodes (producers, consumers, storage units, plain
//! cables) are connected into networks, keeps that bookkeeping consistent
//! with a world that can unload regions without telling anyone, and every
//! tick arbitrates how energy flows from producers to consumers and storage.
//!
//! # Tick pipeline
//!
//! Each call to [`grid::PowerGrid::step`] advances the grid by one tick:
//!
//! 1. **Arbitrate** -- every active network, in ascending identifier order,
//!    draws from producers, rations consumers under scarcity, and charges or
//!    discharges storage.
//! 2. **Events** -- networks crossing into or out of brownout emit a
//!    [`event::GridEvent`].
//! 3. **Maintenance** -- on its schedule, validation reconciles memberships
//!    against the world and the orphan sweep adopts unaccounted nodes.
//!
//! # Ownership
//!
//! The host world owns every node. Networks hold positions and reach nodes
//! through [`world::GridWorld`]; a node only holds the identifier of its
//! network, never the network itself.
//!
//! # Key Types
//!
//! - [`grid::PowerGrid`] -- Session facade: handlers, step, save/restore.
//! - [`registry::GridRegistry`] -- Live networks and the position index.
//! - [`network::Network`] -- Membership, buffer, and per-tick arbitration.
//! - [`node::GridNode`] -- What a world object implements to join a grid.
//! - [`persist::GridSnapshot`] -- Versioned snapshot via bitcode.

mod arbitration;
pub mod config;
pub mod coord;
pub mod driver;
pub mod energy;
pub mod event;
pub mod grid;
pub mod id;
pub mod maintenance;
pub mod network;
pub mod node;
pub mod persist;
pub mod placement;
pub mod registry;
pub mod world;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
