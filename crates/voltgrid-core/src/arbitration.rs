//! Per-tick energy arbitration for a single network.
//!
//! Each tick the network:
//! 1. Sums producer capacity and consumer demand (queries only).
//! 2. With enough supply, commits to drawing exactly the demand, plus a
//!    surplus bounded by what storages can take this tick.
//! 3. Short of supply, commits to drawing all production and discharges
//!    storages in join order to cover the shortfall.
//! 4. Draws the committed amount from producers in join order, then the
//!    surplus, and charges storages with it.
//! 5. Serves consumers in full, or rations proportionally.
//! 6. Pushes anything above the buffer cap into storages and clamps the rest.
//!
//! Producers, storages, and consumers are always visited in join order, so
//! the outcome is deterministic for a given membership history.

use crate::energy::{Energy, share_rounded};
use crate::network::{Network, TickStats};
use crate::world::GridWorld;

impl Network {
    /// Advance this network by one tick.
    ///
    /// Returns the demand that could not be covered this tick (zero when
    /// every consumer was offered its full demand).
    pub fn tick(&mut self, world: &mut dyn GridWorld) -> Energy {
        if !self.active || self.members.is_empty() {
            return 0;
        }
        self.stats = TickStats::default();

        // Step 1: capacity and demand.
        let total_production: Energy = self
            .producers
            .iter()
            .filter_map(|&pos| world.node(pos))
            .filter_map(|node| node.as_producer().map(|p| p.max_output()))
            .fold(0, Energy::saturating_add);

        let demands: Vec<Energy> = self
            .consumers
            .iter()
            .map(|&pos| {
                world
                    .node(pos)
                    .and_then(|node| node.as_consumer())
                    .map_or(0, |c| c.energy_demand())
            })
            .collect();
        let total_demand: Energy = demands.iter().copied().fold(0, Energy::saturating_add);

        // Steps 2-3: commit to a draw, discharging storage on a shortfall.
        let mut from_storage: Energy = 0;
        let (committed, surplus) = if total_production >= total_demand {
            let charge_room: Energy = self
                .storages
                .iter()
                .filter_map(|&pos| world.node(pos))
                .filter_map(|node| node.as_storage())
                .filter(|s| s.can_charge())
                .map(|s| s.max_charge_rate())
                .fold(0, Energy::saturating_add);
            (total_demand, (total_production - total_demand).min(charge_room))
        } else {
            let mut shortfall = total_demand - total_production;
            for &pos in &self.storages {
                if shortfall == 0 {
                    break;
                }
                let Some(storage) = world.node_mut(pos).and_then(|n| n.as_storage_mut()) else {
                    continue;
                };
                if !storage.can_discharge() {
                    continue;
                }
                let request = shortfall.min(storage.max_discharge_rate());
                if request == 0 {
                    continue;
                }
                let released = storage.discharge_energy(request).min(request);
                from_storage += released;
                shortfall -= released;
            }
            (total_production, 0)
        };

        // Step 4a: draw the committed amount.
        let mut drawn: Vec<Energy> = vec![0; self.producers.len()];
        let mut collected: Energy = 0;
        for (i, &pos) in self.producers.iter().enumerate() {
            if collected >= committed {
                break;
            }
            let Some(producer) = world.node_mut(pos).and_then(|n| n.as_producer_mut()) else {
                continue;
            };
            let request = (committed - collected).min(producer.max_output());
            if request == 0 {
                continue;
            }
            let got = producer.produce_energy(request).min(request);
            drawn[i] = got;
            collected += got;
        }

        // Step 4b: draw the surplus, never past a producer's output for the tick.
        let mut surplus_collected: Energy = 0;
        if surplus > 0 {
            for (i, &pos) in self.producers.iter().enumerate() {
                if surplus_collected >= surplus {
                    break;
                }
                let Some(producer) = world.node_mut(pos).and_then(|n| n.as_producer_mut()) else {
                    continue;
                };
                let budget = producer.max_output().saturating_sub(drawn[i]);
                let request = (surplus - surplus_collected).min(budget);
                if request == 0 {
                    continue;
                }
                let got = producer.produce_energy(request).min(request);
                drawn[i] += got;
                surplus_collected += got;
            }
        }

        // Step 4c: charge storages with the surplus.
        let mut charged: Vec<Energy> = vec![0; self.storages.len()];
        let mut unstored = surplus_collected;
        for (i, &pos) in self.storages.iter().enumerate() {
            if unstored == 0 {
                break;
            }
            let Some(storage) = world.node_mut(pos).and_then(|n| n.as_storage_mut()) else {
                continue;
            };
            if !storage.can_charge() {
                continue;
            }
            let offer = unstored.min(storage.max_charge_rate());
            if offer == 0 {
                continue;
            }
            let took = storage.charge_energy(offer).min(offer);
            charged[i] = took;
            unstored -= took;
        }
        let mut into_storage = surplus_collected - unstored;

        let available = self
            .stored_energy
            .saturating_add(collected)
            .saturating_add(from_storage)
            .saturating_add(unstored);

        // Step 5: serve consumers.
        let mut consumed: Energy = 0;
        if available >= total_demand {
            for (&pos, &demand) in self.consumers.iter().zip(&demands) {
                if demand == 0 {
                    continue;
                }
                let Some(consumer) = world.node_mut(pos).and_then(|n| n.as_consumer_mut()) else {
                    continue;
                };
                consumed += consumer.consume_energy(demand).min(demand);
            }
        } else {
            for (&pos, &demand) in self.consumers.iter().zip(&demands) {
                if consumed >= available {
                    break;
                }
                let offer =
                    share_rounded(demand, available, total_demand).min(available - consumed);
                if offer == 0 {
                    continue;
                }
                let Some(consumer) = world.node_mut(pos).and_then(|n| n.as_consumer_mut()) else {
                    continue;
                };
                consumed += consumer.consume_energy(offer).min(offer);
            }
        }
        let mut stored = available - consumed;

        // Step 6: spill the excess into storage, then clamp.
        if stored > self.max_storage {
            let mut excess = stored - self.max_storage;
            for (i, &pos) in self.storages.iter().enumerate() {
                if excess == 0 {
                    break;
                }
                let Some(storage) = world.node_mut(pos).and_then(|n| n.as_storage_mut()) else {
                    continue;
                };
                if !storage.can_charge() {
                    continue;
                }
                let offer = excess.min(storage.max_charge_rate().saturating_sub(charged[i]));
                if offer == 0 {
                    continue;
                }
                let took = storage.charge_energy(offer).min(offer);
                charged[i] += took;
                into_storage += took;
                excess -= took;
                stored -= took;
            }
            stored = stored.min(self.max_storage);
        }

        self.stored_energy = stored;
        self.stats = TickStats {
            produced: collected + surplus_collected,
            demanded: total_demand,
            consumed,
            into_storage,
            from_storage,
        };

        total_demand.saturating_sub(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{BlockPos, Direction};
    use crate::energy::Ratio;
    use crate::id::NetworkId;
    use crate::test_utils::*;

    /// Lay the given nodes out in a line and join them all to one network.
    fn network_of(nodes: Vec<TestNode>, max_storage: Energy) -> (TestWorld, Network, Vec<BlockPos>) {
        let mut world = TestWorld::new();
        let mut net = Network::new(NetworkId::new(0), max_storage);
        let mut positions = Vec::new();
        let mut pos = BlockPos::new(0, 0, 0);
        for node in nodes {
            world.insert(pos, node);
            net.join(pos, world.node_mut(pos).unwrap());
            positions.push(pos);
            pos = pos.offset(Direction::East);
        }
        (world, net, positions)
    }

    // -----------------------------------------------------------------------
    // Sufficient supply
    // -----------------------------------------------------------------------

    #[test]
    fn sufficient_supply_serves_full_demand() {
        let (mut world, mut net, pos) = network_of(
            vec![TestNode::producer(10), TestNode::consumer(4), TestNode::consumer(6)],
            1000,
        );

        let unmet = net.tick(&mut world);

        assert_eq!(unmet, 0);
        assert_eq!(world.consumer(pos[1]).last_received, 4);
        assert_eq!(world.consumer(pos[2]).last_received, 6);
        let stats = net.stats();
        assert_eq!(stats.produced, 10);
        assert_eq!(stats.consumed, 10);
        assert_eq!(stats.into_storage, 0);
        assert_eq!(stats.from_storage, 0);
        assert_eq!(net.stored_energy(), 0);
    }

    #[test]
    fn surplus_only_drawn_when_storage_can_take_it() {
        let (mut world, mut net, pos) =
            network_of(vec![TestNode::producer(50), TestNode::consumer(20)], 1000);

        net.tick(&mut world);

        assert_eq!(net.stats().produced, 20);
        assert_eq!(world.producer(pos[0]).produced_total, 20);
        assert_eq!(net.stored_energy(), 0);
    }

    #[test]
    fn surplus_charges_storage_in_join_order() {
        let (mut world, mut net, pos) = network_of(
            vec![
                TestNode::producer(100),
                TestNode::battery(1000, 0, 60, 60),
                TestNode::battery(1000, 0, 60, 60),
            ],
            1000,
        );

        net.tick(&mut world);

        assert_eq!(world.storage(pos[1]).stored, 60);
        assert_eq!(world.storage(pos[2]).stored, 40);
        assert_eq!(net.stats().into_storage, 100);
        assert_eq!(net.stats().produced, 100);
    }

    #[test]
    fn surplus_capped_by_charge_rate() {
        let (mut world, mut net, pos) = network_of(
            vec![TestNode::producer(200), TestNode::battery(1000, 0, 30, 30)],
            1000,
        );

        net.tick(&mut world);

        assert_eq!(world.storage(pos[1]).stored, 30);
        assert_eq!(net.stats().produced, 30);
        assert_eq!(world.producer(pos[0]).produced_total, 30);
    }

    #[test]
    fn full_battery_is_not_charged() {
        let (mut world, mut net, pos) = network_of(
            vec![TestNode::producer(100), TestNode::battery(50, 50, 100, 100)],
            1000,
        );

        net.tick(&mut world);

        assert_eq!(world.storage(pos[1]).stored, 50);
        assert_eq!(net.stats().produced, 0);
        assert_eq!(net.stats().into_storage, 0);
    }

    #[test]
    fn producers_drawn_in_join_order() {
        let (mut world, mut net, pos) = network_of(
            vec![
                TestNode::producer(6),
                TestNode::producer(6),
                TestNode::consumer(8),
            ],
            1000,
        );

        net.tick(&mut world);

        assert_eq!(world.producer(pos[0]).produced_total, 6);
        assert_eq!(world.producer(pos[1]).produced_total, 2);
        assert_eq!(net.stats().produced, 8);
    }

    #[test]
    fn producer_never_drawn_past_max_output() {
        let (mut world, mut net, pos) = network_of(
            vec![
                TestNode::producer(10),
                TestNode::consumer(7),
                TestNode::battery(1000, 0, 100, 100),
            ],
            1000,
        );

        net.tick(&mut world);

        assert_eq!(world.producer(pos[0]).produced_total, 10);
        assert_eq!(world.storage(pos[2]).stored, 3);
        assert_eq!(world.consumer(pos[1]).last_received, 7);
    }

    // -----------------------------------------------------------------------
    // Deficit
    // -----------------------------------------------------------------------

    #[test]
    fn deficit_rations_proportionally() {
        let (mut world, mut net, pos) = network_of(
            vec![TestNode::producer(9), TestNode::consumer(4), TestNode::consumer(8)],
            1000,
        );

        let unmet = net.tick(&mut world);

        assert_eq!(unmet, 3);
        assert_eq!(world.consumer(pos[1]).last_received, 3);
        assert_eq!(world.consumer(pos[2]).last_received, 6);
        assert_eq!(net.stats().produced, 9);
        assert!(net.stats().consumed <= 9);
        assert_eq!(net.stats().consumed, 9);
        assert_eq!(net.stats().demanded, 12);
        assert_eq!(net.satisfaction(), Ratio::from_num(0.75));
        assert_eq!(net.stored_energy(), 0);
    }

    #[test]
    fn rationing_never_overshoots_available() {
        // 5 / 6 each rounds 2.5 -> 3, which would hand out 6 of 5.
        let (mut world, mut net, pos) = network_of(
            vec![TestNode::producer(5), TestNode::consumer(3), TestNode::consumer(3)],
            1000,
        );

        net.tick(&mut world);

        assert_eq!(world.consumer(pos[1]).last_received, 3);
        assert_eq!(world.consumer(pos[2]).last_received, 2);
        assert_eq!(net.stats().consumed, 5);
    }

    #[test]
    fn rationing_rounds_half_shares_up() {
        // 7 * 9/14 = 4.5 each: the first gets 5, the second what is left.
        let (mut world, mut net, pos) = network_of(
            vec![TestNode::producer(9), TestNode::consumer(7), TestNode::consumer(7)],
            1000,
        );

        let unmet = net.tick(&mut world);

        assert_eq!(unmet, 5);
        assert_eq!(world.consumer(pos[1]).last_received, 5);
        assert_eq!(world.consumer(pos[2]).last_received, 4);
        assert_eq!(net.stored_energy(), 0);
    }

    #[test]
    fn rationing_stops_once_available_is_given() {
        let (mut world, mut net, pos) = network_of(
            vec![
                TestNode::producer(1),
                TestNode::consumer(1),
                TestNode::consumer(1),
                TestNode::consumer(1),
            ],
            1000,
        );

        net.tick(&mut world);

        // 1/3 of 1 rounds to 0 for each; nobody overshoots and nothing is lost.
        let received: Energy = pos[1..]
            .iter()
            .map(|p| world.consumer(*p).received_total)
            .sum();
        assert!(received <= 1);
        assert_eq!(net.stats().consumed, received);
        assert_eq!(net.stored_energy(), 1 - received);
    }

    #[test]
    fn deficit_discharges_storage() {
        let (mut world, mut net, pos) = network_of(
            vec![
                TestNode::producer(5),
                TestNode::consumer(10),
                TestNode::battery(1000, 500, 6, 6),
            ],
            1000,
        );

        let unmet = net.tick(&mut world);

        assert_eq!(unmet, 0);
        assert_eq!(world.consumer(pos[1]).last_received, 10);
        assert_eq!(world.storage(pos[2]).stored, 495);
        assert_eq!(net.stats().from_storage, 5);
        assert_eq!(net.stats().produced, 5);
        assert_eq!(net.stats().consumed, 10);
    }

    #[test]
    fn discharge_limited_by_rate_then_rationed() {
        let (mut world, mut net, pos) = network_of(
            vec![TestNode::consumer(100), TestNode::battery(1000, 500, 40, 40)],
            1000,
        );

        let unmet = net.tick(&mut world);

        assert_eq!(unmet, 60);
        assert_eq!(world.storage(pos[1]).stored, 460);
        assert_eq!(world.consumer(pos[0]).last_received, 40);
        assert_eq!(net.stats().from_storage, 40);
    }

    #[test]
    fn discharge_in_join_order() {
        let (mut world, mut net, pos) = network_of(
            vec![
                TestNode::consumer(10),
                TestNode::battery(100, 4, 50, 50),
                TestNode::battery(100, 100, 50, 50),
            ],
            1000,
        );

        net.tick(&mut world);

        assert_eq!(world.storage(pos[1]).stored, 0);
        assert_eq!(world.storage(pos[2]).stored, 94);
        assert_eq!(world.consumer(pos[0]).last_received, 10);
    }

    #[test]
    fn consumers_may_accept_less_than_offered() {
        let (mut world, mut net, pos) = network_of(
            vec![
                TestNode::producer(10),
                TestNode::consumer(10).accepting_at_most(4),
            ],
            1000,
        );

        net.tick(&mut world);

        assert_eq!(world.consumer(pos[1]).last_received, 4);
        assert_eq!(net.stats().consumed, 4);
        assert_eq!(net.stored_energy(), 6);
    }

    // -----------------------------------------------------------------------
    // Buffer and clamp
    // -----------------------------------------------------------------------

    #[test]
    fn buffer_serves_next_tick() {
        let (mut world, mut net, pos) = network_of(
            vec![
                TestNode::producer(10),
                TestNode::consumer(10).accepting_at_most(4),
            ],
            1000,
        );

        net.tick(&mut world);
        assert_eq!(net.stored_energy(), 6);

        world.get_mut(pos[0]).unwrap().producer = None;
        world.get_mut(pos[1]).unwrap().consumer = Some(TestConsumer::new(6));
        let unmet = net.tick(&mut world);

        assert_eq!(unmet, 0);
        assert_eq!(world.consumer(pos[1]).last_received, 6);
        assert_eq!(net.stored_energy(), 0);
    }

    #[test]
    fn excess_above_cap_spills_into_storage_then_clamps() {
        let (mut world, mut net, pos) = network_of(
            vec![
                TestNode::producer(50),
                TestNode::consumer(50).accepting_at_most(0),
                TestNode::battery(1000, 0, 15, 15),
            ],
            20,
        );

        net.tick(&mut world);

        // 50 collected, nobody consumes, cap is 20: 15 spills, 15 is dropped.
        assert_eq!(world.storage(pos[2]).stored, 15);
        assert_eq!(net.stats().into_storage, 15);
        assert_eq!(net.stored_energy(), 20);
        assert!(net.stored_energy() <= net.max_storage());
    }

    #[test]
    fn spill_respects_rate_already_used_this_tick() {
        let (mut world, mut net, pos) = network_of(
            vec![
                TestNode::producer(100),
                TestNode::consumer(60).accepting_at_most(0),
                TestNode::battery(1000, 0, 30, 30),
            ],
            10,
        );

        net.tick(&mut world);

        assert_eq!(world.storage(pos[2]).stored, 30);
        assert_eq!(net.stats().into_storage, 30);
        assert_eq!(net.stored_energy(), 10);
    }

    // -----------------------------------------------------------------------
    // Degenerate networks
    // -----------------------------------------------------------------------

    #[test]
    fn inactive_network_is_not_ticked() {
        let mut world = TestWorld::new();
        let mut net = Network::new(NetworkId::new(0), 100);
        assert_eq!(net.tick(&mut world), 0);
        assert_eq!(net.stats(), TickStats::default());
    }

    #[test]
    fn unloaded_members_are_skipped() {
        let (mut world, mut net, pos) = network_of(
            vec![TestNode::producer(10), TestNode::consumer(4), TestNode::consumer(6)],
            1000,
        );
        world.remove(pos[2]);

        let unmet = net.tick(&mut world);

        assert_eq!(unmet, 0);
        assert_eq!(net.stats().produced, 4);
        assert_eq!(world.consumer(pos[1]).last_received, 4);
    }

    #[test]
    fn stats_reset_every_tick() {
        let (mut world, mut net, pos) =
            network_of(vec![TestNode::producer(10), TestNode::consumer(10)], 1000);

        net.tick(&mut world);
        assert_eq!(net.stats().consumed, 10);

        world.get_mut(pos[1]).unwrap().consumer = Some(TestConsumer::new(0));
        net.tick(&mut world);
        assert_eq!(net.stats(), TickStats::default());
    }
}
