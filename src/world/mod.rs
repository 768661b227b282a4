//! The territory graph.
//!
//! A [`World`] is a set of [`Node`]s joined by one-directional [`Edge`]s. Units sit either
//! in a node's garrison or in one of the transit slots of an edge. The graph itself never
//! changes once generated; only unit counts move, and only through
//! [`World::next`](engine).
//!
//! Unit maps never hold zero entries: an absent player means zero units.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::ids::{NodeId, PlayerId};

pub mod engine;
pub mod generator;
pub mod path;

/// Units per player. Absent key means zero.
pub type Units = BTreeMap<PlayerId, u64>;

/// One-directional transit lane from `src` to `dst`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub src: NodeId,
    pub dst: NodeId,
    /// Units in flight. Index 0 is the first step out of `src`, the last index is one
    /// tick from arriving at `dst`. The length is the transit time in turns.
    pub transit_slots: Vec<Units>,
}

impl Edge {
    fn new(src: NodeId, dst: NodeId, transit_length: usize) -> Self {
        Edge {
            src,
            dst,
            transit_slots: vec![Units::new(); transit_length],
        }
    }

    /// Number of turns a unit spends on this edge.
    pub fn transit_length(&self) -> usize {
        self.transit_slots.len()
    }

    /// Units of `player` currently in flight on this edge.
    pub fn units_in_transit(&self, player: &PlayerId) -> u64 {
        self.transit_slots
            .iter()
            .map(|slot| slot.get(player).copied().unwrap_or(0))
            .sum()
    }
}

/// A territory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    /// Carrying capacity, always positive.
    pub capacity: u64,
    pub units: Units,
    /// Outgoing edges keyed by destination.
    pub edges: BTreeMap<NodeId, Edge>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, capacity: u64) -> Self {
        Node {
            id: id.into(),
            capacity,
            units: Units::new(),
            edges: BTreeMap::new(),
        }
    }

    /// Garrison of `player` on this node.
    pub fn units_of(&self, player: &PlayerId) -> u64 {
        self.units.get(player).copied().unwrap_or(0)
    }

    /// Garrison of every player together.
    pub fn total_units(&self) -> u64 {
        self.units.values().sum()
    }
}

/// Why the garrison of a node changed during the last transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeReason {
    Incoming,
    Orders,
    Growth,
    Starvation,
    Conflict,
}

/// One entry of the change log of the last transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub units: i64,
    pub player_id: PlayerId,
    pub reason: ChangeReason,
}

/// A request to move `units` from `src` to the neighbouring `dst`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub src: NodeId,
    pub dst: NodeId,
    pub units: i64,
}

pub type Orders = Vec<Order>;

/// A full snapshot of the graph and every unit on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct World {
    pub nodes: BTreeMap<NodeId, Node>,
    /// What happened to each node during the transition that produced this snapshot.
    #[serde(default)]
    pub changes: BTreeMap<NodeId, Vec<Change>>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `node`, replacing any node with the same id.
    pub fn add(&mut self, node: Node) -> &mut Self {
        self.nodes.insert(node.id.clone(), node);
        self
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Create the edge pair `a -> b` and `b -> a`, both with `transit_length` empty slots.
    ///
    /// Edges are keyed by destination, so connecting an already connected pair again
    /// replaces both lanes (losing whatever was in flight). Callers avoid that.
    pub fn connect(&mut self, a: &NodeId, b: &NodeId, transit_length: usize) -> anyhow::Result<()> {
        if transit_length == 0 {
            bail!("edge {a} <-> {b} needs at least one transit slot");
        }
        if a == b {
            bail!("cannot connect {a} to itself");
        }
        if !self.nodes.contains_key(b) {
            bail!("unknown node {b}");
        }
        self.nodes
            .get_mut(a)
            .with_context(|| format!("unknown node {a}"))?
            .edges
            .insert(b.clone(), Edge::new(a.clone(), b.clone(), transit_length));
        if let Some(node) = self.nodes.get_mut(b) {
            node.edges
                .insert(a.clone(), Edge::new(b.clone(), a.clone(), transit_length));
        }
        Ok(())
    }

    /// True if `to` can be reached from `from` by following edges (at least one).
    pub fn reachable(&self, from: &NodeId, to: &NodeId) -> bool {
        let Some(start) = self.nodes.get(from) else {
            return false;
        };
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        for next in start.edges.keys() {
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
        while let Some(id) = queue.pop_front() {
            if id == to {
                return true;
            }
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            for next in node.edges.keys() {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    /// True if every node (including `from` itself) can be reached from `from`.
    pub fn all_reachable(&self, from: &NodeId) -> bool {
        self.nodes.keys().all(|to| self.reachable(from, to))
    }

    /// True if every node can reach every other node.
    pub fn is_strongly_connected(&self) -> bool {
        self.nodes.len() <= 1 || self.nodes.keys().all(|from| self.all_reachable(from))
    }

    /// Players with at least one unit anywhere, garrisoned or in flight.
    pub fn players(&self) -> BTreeSet<PlayerId> {
        let mut players = BTreeSet::new();
        for node in self.nodes.values() {
            players.extend(node.units.keys().cloned());
            for edge in node.edges.values() {
                for slot in &edge.transit_slots {
                    players.extend(slot.keys().cloned());
                }
            }
        }
        players
    }

    /// Every unit of `player`, garrisoned or in flight.
    pub fn total_units(&self, player: &PlayerId) -> u64 {
        self.nodes
            .values()
            .map(|node| {
                node.units_of(player)
                    + node
                        .edges
                        .values()
                        .map(|edge| edge.units_in_transit(player))
                        .sum::<u64>()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> World {
        let mut world = World::new();
        world
            .add(Node::new("a", 10))
            .add(Node::new("b", 10))
            .add(Node::new("c", 10));
        world
    }

    #[test]
    fn connect_creates_both_directions() {
        let mut world = line();
        world.connect(&"a".into(), &"b".into(), 3).unwrap();
        let ab = &world.nodes[&NodeId::from("a")].edges[&NodeId::from("b")];
        let ba = &world.nodes[&NodeId::from("b")].edges[&NodeId::from("a")];
        assert_eq!(ab.transit_length(), 3);
        assert_eq!(ba.transit_length(), 3);
        assert_eq!(ab.src, NodeId::from("a"));
        assert_eq!(ba.dst, NodeId::from("a"));
        assert!(ab.transit_slots.iter().all(Units::is_empty));
    }

    #[test]
    fn connect_rejects_bad_input() {
        let mut world = line();
        assert!(world.connect(&"a".into(), &"b".into(), 0).is_err());
        assert!(world.connect(&"a".into(), &"a".into(), 1).is_err());
        assert!(world.connect(&"a".into(), &"z".into(), 1).is_err());
        assert!(world.connect(&"z".into(), &"a".into(), 1).is_err());
        assert!(world.nodes.values().all(|n| n.edges.is_empty()));
    }

    #[test]
    fn reachability_follows_edges() {
        let mut world = line();
        world.connect(&"a".into(), &"b".into(), 1).unwrap();
        assert!(world.reachable(&"a".into(), &"b".into()));
        assert!(world.reachable(&"a".into(), &"a".into()));
        assert!(!world.reachable(&"a".into(), &"c".into()));
        assert!(!world.all_reachable(&"a".into()));
        assert!(!world.is_strongly_connected());

        world.connect(&"b".into(), &"c".into(), 2).unwrap();
        assert!(world.all_reachable(&"a".into()));
        assert!(world.is_strongly_connected());
    }

    #[test]
    fn one_way_edge_is_not_strongly_connected() {
        let mut world = line();
        world.connect(&"a".into(), &"b".into(), 1).unwrap();
        world.connect(&"b".into(), &"c".into(), 1).unwrap();
        world
            .nodes
            .get_mut(&NodeId::from("c"))
            .unwrap()
            .edges
            .clear();
        assert!(world.reachable(&"a".into(), &"c".into()));
        assert!(!world.reachable(&"c".into(), &"a".into()));
        assert!(!world.is_strongly_connected());
    }

    #[test]
    fn players_include_units_in_flight() {
        let mut world = line();
        world.connect(&"a".into(), &"b".into(), 2).unwrap();
        let p1 = PlayerId::from("p1");
        let p2 = PlayerId::from("p2");
        world
            .nodes
            .get_mut(&NodeId::from("a"))
            .unwrap()
            .units
            .insert(p1.clone(), 4);
        world
            .nodes
            .get_mut(&NodeId::from("b"))
            .unwrap()
            .edges
            .get_mut(&NodeId::from("a"))
            .unwrap()
            .transit_slots[1]
            .insert(p2.clone(), 3);
        assert_eq!(world.players(), BTreeSet::from([p1.clone(), p2.clone()]));
        assert_eq!(world.total_units(&p1), 4);
        assert_eq!(world.total_units(&p2), 3);
    }
}
