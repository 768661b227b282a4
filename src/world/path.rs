//! Shortest paths measured in turns.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::ids::NodeId;
use crate::world::{Node, World};

/// Decides whether units may leave a node on their way to the destination.
pub type NodeFilter<'a> = &'a dyn Fn(&Node) -> bool;

#[derive(PartialEq, Eq)]
struct Frontier {
    cost: usize,
    discovered: usize,
    node: NodeId,
}

// BinaryHeap is a max-heap: cheapest first, then earliest discovered.
impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.discovered.cmp(&self.discovered))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl World {
    /// Fastest route from `src` to `dst`.
    ///
    /// Crossing an edge costs its transit length plus one turn to arrive. The returned
    /// sequence holds the destination of each crossed edge once per transit slot, so its
    /// length is the number of turns the units spend in flight. An empty sequence means
    /// `src == dst`.
    ///
    /// When `filter` is given, units may only depart from nodes it accepts (`src` is always
    /// accepted). Among equally fast routes the first one discovered wins.
    ///
    /// Returns `None` when `dst` cannot be reached.
    pub fn path(&self, src: &NodeId, dst: &NodeId, filter: Option<NodeFilter<'_>>) -> Option<Vec<NodeId>> {
        if !self.nodes.contains_key(src) {
            return None;
        }
        let mut best: HashMap<NodeId, (usize, Vec<NodeId>)> = HashMap::new();
        best.insert(src.clone(), (0, vec![]));
        let mut discovered = 0;
        let mut frontier = BinaryHeap::new();
        frontier.push(Frontier {
            cost: 0,
            discovered,
            node: src.clone(),
        });

        while let Some(Frontier { cost, node: id, .. }) = frontier.pop() {
            // superseded by a faster route found after this entry was queued
            if best.get(&id).is_some_and(|(known, _)| *known < cost) {
                continue;
            }
            if &id == dst {
                return best.remove(&id).map(|(_, path)| path);
            }
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if &id != src && filter.is_some_and(|accept| !accept(node)) {
                continue;
            }
            for edge in node.edges.values() {
                let next_cost = cost + edge.transit_length() + 1;
                if best
                    .get(&edge.dst)
                    .is_some_and(|(known, _)| *known <= next_cost)
                {
                    continue;
                }
                let mut path = best.get(&id).map(|(_, p)| p.clone()).unwrap_or_default();
                path.extend(std::iter::repeat(edge.dst.clone()).take(edge.transit_length()));
                best.insert(edge.dst.clone(), (next_cost, path));
                discovered += 1;
                frontier.push(Frontier {
                    cost: next_cost,
                    discovered,
                    node: edge.dst.clone(),
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    //          f
    //         /|
    //  ----g / |
    //  |   |/  |
    //  a - b - c
    //   \     /|
    //    \   / |
    //     \ /  |
    //      d---e      h
    fn test_world() -> World {
        let mut world = World::new();
        for id in ["a", "b", "c", "d", "e", "f", "g", "h"] {
            world.add(Node::new(id, 100));
        }
        for (a, b, len) in [
            ("a", "b", 1),
            ("a", "d", 3),
            ("b", "f", 3),
            ("b", "c", 1),
            ("c", "f", 3),
            ("c", "d", 3),
            ("c", "e", 1),
            ("d", "e", 3),
            ("a", "g", 5),
            ("b", "g", 1),
        ] {
            world.connect(&a.into(), &b.into(), len).unwrap();
        }
        world
    }

    fn ids(path: &[&str]) -> Option<Vec<NodeId>> {
        Some(path.iter().map(|id| NodeId::from(*id)).collect())
    }

    fn assert_path(world: &World, src: &str, dst: &str, expected: Option<Vec<NodeId>>) {
        let found = world.path(&src.into(), &dst.into(), None);
        assert_eq!(found, expected, "path from {src} to {dst}");
    }

    #[test]
    fn shortest_paths() {
        let world = test_world();
        assert_path(&world, "a", "h", None);
        assert_path(&world, "a", "b", ids(&["b"]));
        assert_path(&world, "a", "c", ids(&["b", "c"]));
        assert_path(&world, "a", "e", ids(&["b", "c", "e"]));
        assert_path(&world, "a", "g", ids(&["b", "g"]));
        assert_path(&world, "a", "d", ids(&["d", "d", "d"]));
        assert_path(&world, "a", "f", ids(&["b", "f", "f", "f"]));
        assert_path(&world, "f", "g", ids(&["b", "b", "b", "g"]));
        assert_path(&world, "a", "a", ids(&[]));
    }

    #[test]
    fn unknown_nodes_have_no_path() {
        let world = test_world();
        assert_path(&world, "x", "a", None);
        assert_path(&world, "a", "x", None);
    }

    #[test]
    fn filtered_nodes_are_never_departed_from() {
        let world = test_world();
        let not_b = |node: &Node| node.id.as_str() != "b";
        // the detour through d is longer but b is closed
        assert_eq!(
            world.path(&"a".into(), &"c".into(), Some(&not_b)),
            ids(&["d", "d", "d", "c", "c", "c"])
        );
        // arriving at a filtered node is fine
        assert_eq!(world.path(&"a".into(), &"b".into(), Some(&not_b)), ids(&["b"]));
        // the source itself is never filtered
        let not_a = |node: &Node| node.id.as_str() != "a";
        assert_eq!(world.path(&"a".into(), &"c".into(), Some(&not_a)), ids(&["b", "c"]));
        // g is only reachable through a or b
        let neither = |node: &Node| !matches!(node.id.as_str(), "a" | "b");
        assert_eq!(world.path(&"c".into(), &"g".into(), Some(&neither)), None);
    }
}
