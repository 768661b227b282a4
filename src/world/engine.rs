//! The turn transition.
//!
//! [`World::next`] runs six phases in a fixed order: transit, orders, growth, starvation,
//! conflict and the winner check. Each phase first reads the snapshot left by the previous
//! phase and collects its mutations, then applies all of them at once. No phase ever sees
//! its own partial writes, so the outcome does not depend on map iteration order.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::ids::{NodeId, PlayerId};
use crate::world::{Change, ChangeReason, Orders, Units, World};

pub const GROWTH_FACTOR: f64 = 0.2;
pub const STARVATION_FACTOR: f64 = 0.2;

/// One write a phase wants to perform, computed against the pre-phase snapshot.
#[derive(Debug)]
enum Pending {
    /// Replace the transit slots of the edge `src -> dst`.
    Shift {
        src: NodeId,
        dst: NodeId,
        slots: Vec<Units>,
    },
    /// Add units arriving from an edge to a garrison.
    Arrive {
        node: NodeId,
        player: PlayerId,
        units: u64,
    },
    /// Move units out of a garrison into the first slot of an edge.
    Depart {
        src: NodeId,
        dst: NodeId,
        player: PlayerId,
        units: u64,
    },
    /// Overwrite a garrison.
    Set {
        node: NodeId,
        player: PlayerId,
        units: u64,
        reason: ChangeReason,
    },
}

impl World {
    /// Compute the snapshot following this one given every player's orders.
    ///
    /// Orders naming a missing edge are dropped, and requested units are clamped to what the
    /// player holds at the source. Orders of a single player are applied in the order given.
    ///
    /// Returns the new snapshot and, if exactly one player still has units anywhere, that
    /// player.
    pub fn next(&self, orders: &BTreeMap<PlayerId, Orders>) -> (World, Option<PlayerId>) {
        let mut next = self.clone();
        next.changes.clear();

        let pending = next.transits();
        next.apply(pending);
        let pending = next.orders(orders);
        next.apply(pending);
        let pending = next.growth();
        next.apply(pending);
        let pending = next.starvation();
        next.apply(pending);
        let pending = next.conflicts();
        next.apply(pending);

        let winner = next.winner();
        (next, winner)
    }

    /// The only player left with units, if there is exactly one.
    pub fn winner(&self) -> Option<PlayerId> {
        let mut players = self.players().into_iter();
        match (players.next(), players.next()) {
            (Some(player), None) => Some(player),
            _ => None,
        }
    }

    fn transits(&self) -> Vec<Pending> {
        let mut pending = vec![];
        for node in self.nodes.values() {
            for edge in node.edges.values() {
                let Some(arriving) = edge.transit_slots.last() else {
                    continue;
                };
                for (player, units) in arriving {
                    if *units > 0 {
                        pending.push(Pending::Arrive {
                            node: edge.dst.clone(),
                            player: player.clone(),
                            units: *units,
                        });
                    }
                }
                let mut slots = Vec::with_capacity(edge.transit_slots.len());
                slots.push(Units::new());
                slots.extend(
                    edge.transit_slots[..edge.transit_slots.len() - 1]
                        .iter()
                        .cloned(),
                );
                pending.push(Pending::Shift {
                    src: edge.src.clone(),
                    dst: edge.dst.clone(),
                    slots,
                });
            }
        }
        pending
    }

    fn orders(&self, orders: &BTreeMap<PlayerId, Orders>) -> Vec<Pending> {
        let mut pending = vec![];
        for (player, orders) in orders {
            // what this player still holds at each source after its earlier orders
            let mut remaining: HashMap<&NodeId, u64> = HashMap::new();
            for order in orders {
                let Some(src) = self.nodes.get(&order.src) else {
                    continue;
                };
                if !src.edges.contains_key(&order.dst) {
                    continue;
                }
                let held = remaining
                    .entry(&src.id)
                    .or_insert_with(|| src.units_of(player));
                let units = order.units.max(0).unsigned_abs().min(*held);
                if units == 0 {
                    continue;
                }
                *held -= units;
                pending.push(Pending::Depart {
                    src: src.id.clone(),
                    dst: order.dst.clone(),
                    player: player.clone(),
                    units,
                });
            }
        }
        pending
    }

    fn growth(&self) -> Vec<Pending> {
        let mut pending = vec![];
        for node in self.nodes.values() {
            if node.units.len() != 1 {
                continue;
            }
            for (player, &units) in &node.units {
                if units == 0 || units >= node.capacity {
                    continue;
                }
                let grown = grow(units, node.capacity);
                if grown > units {
                    pending.push(Pending::Set {
                        node: node.id.clone(),
                        player: player.clone(),
                        units: grown,
                        reason: ChangeReason::Growth,
                    });
                }
            }
        }
        pending
    }

    fn starvation(&self) -> Vec<Pending> {
        let mut pending = vec![];
        for node in self.nodes.values() {
            if node.units.len() < 2 || node.total_units() <= node.capacity {
                continue;
            }
            for (player, &units) in &node.units {
                let starved = starve(units, node.capacity);
                if starved < units {
                    pending.push(Pending::Set {
                        node: node.id.clone(),
                        player: player.clone(),
                        units: starved,
                        reason: ChangeReason::Starvation,
                    });
                }
            }
        }
        pending
    }

    fn conflicts(&self) -> Vec<Pending> {
        let mut pending = vec![];
        for node in self.nodes.values() {
            if node.units.len() < 2 {
                continue;
            }
            let total = node.total_units();
            for (player, &units) in &node.units {
                let survivors = fight(units, total - units);
                if survivors < units {
                    pending.push(Pending::Set {
                        node: node.id.clone(),
                        player: player.clone(),
                        units: survivors,
                        reason: ChangeReason::Conflict,
                    });
                }
            }
        }
        pending
    }

    fn apply(&mut self, pending: Vec<Pending>) {
        for mutation in pending {
            trace!(?mutation);
            match mutation {
                Pending::Shift { src, dst, slots } => {
                    if let Some(edge) = self
                        .nodes
                        .get_mut(&src)
                        .and_then(|node| node.edges.get_mut(&dst))
                    {
                        edge.transit_slots = slots;
                    }
                }
                Pending::Arrive {
                    node,
                    player,
                    units,
                } => {
                    let Some(target) = self.nodes.get_mut(&node) else {
                        continue;
                    };
                    *target.units.entry(player.clone()).or_insert(0) += units;
                    self.log(node, player, units as i64, ChangeReason::Incoming);
                }
                Pending::Depart {
                    src,
                    dst,
                    player,
                    units,
                } => {
                    let Some(node) = self.nodes.get_mut(&src) else {
                        continue;
                    };
                    let Some(edge) = node.edges.get_mut(&dst) else {
                        continue;
                    };
                    if let Some(first) = edge.transit_slots.first_mut() {
                        *first.entry(player.clone()).or_insert(0) += units;
                    }
                    let left = node.units_of(&player).saturating_sub(units);
                    set_units(&mut node.units, &player, left);
                    self.log(src, player, -(units as i64), ChangeReason::Orders);
                }
                Pending::Set {
                    node,
                    player,
                    units,
                    reason,
                } => {
                    let Some(target) = self.nodes.get_mut(&node) else {
                        continue;
                    };
                    let before = target.units_of(&player);
                    set_units(&mut target.units, &player, units);
                    self.log(node, player, units as i64 - before as i64, reason);
                }
            }
        }
    }

    fn log(&mut self, node: NodeId, player: PlayerId, units: i64, reason: ChangeReason) {
        if units == 0 {
            return;
        }
        self.changes.entry(node).or_default().push(Change {
            units,
            player_id: player,
            reason,
        });
    }
}

fn set_units(map: &mut Units, player: &PlayerId, units: u64) {
    if units == 0 {
        map.remove(player);
    } else {
        map.insert(player.clone(), units);
    }
}

/// `min(capacity, 1 + units * (1 + GROWTH_FACTOR * (capacity - units) / capacity))`
fn grow(units: u64, capacity: u64) -> u64 {
    let (u, c) = (units as f64, capacity as f64);
    let grown = (1.0 + u * (1.0 + GROWTH_FACTOR * ((c - u) / c))) as u64;
    grown.min(capacity)
}

/// `max(0, units / (1 + STARVATION_FACTOR * units / capacity) - 1)`
fn starve(units: u64, capacity: u64) -> u64 {
    let (u, c) = (units as f64, capacity as f64);
    let starved = (u / (1.0 + STARVATION_FACTOR * (u / c)) - 1.0) as i64;
    starved.max(0) as u64
}

/// `max(0, min(units - 1, units - enemies / 5))`
fn fight(units: u64, enemies: u64) -> u64 {
    let (u, e) = (units as i64, enemies as i64);
    (u - 1).min(u - e / 5).max(0) as u64
}
