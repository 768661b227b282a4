//! Random starting worlds.

use std::collections::HashSet;

use rand::{seq::SliceRandom, Rng};
use tracing::{debug, instrument};

use crate::ids::{NodeId, PlayerId};
use crate::random::{norm_usize, random_token};
use crate::world::{Node, World};

/// Units every player starts the game with.
pub const STARTING_UNITS: u64 = 10;

const NODE_ID_BYTES: usize = 16;

impl Node {
    /// A node with a random id and a random capacity in `[10, 100]`.
    pub fn random<R: Rng>(rng: &mut R) -> Node {
        let capacity = norm_usize(rng, 50, 25, 10, 100) as u64;
        Node::new(NodeId::new(random_token(rng, NODE_ID_BYTES)), capacity)
    }
}

impl World {
    /// Generate a strongly connected world sized for `players` and garrison each player on
    /// its own node.
    ///
    /// The same seed and player list always produce the same world.
    #[instrument(skip(rng))]
    pub fn random<R: Rng>(players: &[PlayerId], rng: &mut R) -> World {
        let n = players.len();
        let size = norm_usize(rng, n * 6, n, n * 4, n * 10).max(n);

        let mut world = World::new();
        let mut all_nodes = Vec::with_capacity(size);
        for _ in 0..size {
            let node = Node::random(rng);
            all_nodes.push(node.id.clone());
            world.add(node);
        }
        // random ids may in theory collide and shrink the node set
        let mut seen = HashSet::new();
        all_nodes.retain(|id| seen.insert(id.clone()));

        for id in &all_nodes {
            world.connect_randomly(id, &all_nodes, rng);
        }

        let mut starts = all_nodes.clone();
        starts.shuffle(rng);
        for (player, node) in players.iter().zip(&starts) {
            if let Some(node) = world.nodes.get_mut(node) {
                node.units.insert(player.clone(), STARTING_UNITS);
            }
        }
        debug!(nodes = world.nodes.len(), "generated world");
        world
    }

    /// Add lanes from `id` to random unconnected nodes until it has its drawn minimum
    /// out-degree and reaches every node.
    fn connect_randomly<R: Rng>(&mut self, id: &NodeId, all_nodes: &[NodeId], rng: &mut R) {
        let min_edges = norm_usize(rng, 4, 2, 2, all_nodes.len().saturating_sub(1));
        loop {
            let degree = self.nodes.get(id).map_or(0, |node| node.edges.len());
            if degree >= min_edges && self.all_reachable(id) {
                return;
            }
            let mut candidates = all_nodes
                .iter()
                .filter(|other| {
                    *other != id
                        && self
                            .nodes
                            .get(id)
                            .is_some_and(|node| !node.edges.contains_key(*other))
                })
                .collect::<Vec<_>>();
            candidates.shuffle(rng);
            // connected to everything already, nothing more to add
            let Some(other) = candidates.first().map(|other| (*other).clone()) else {
                return;
            };
            let transit_length = norm_usize(rng, 3, 1, 1, 5);
            if self.connect(id, &other, transit_length).is_err() {
                return;
            }
        }
    }
}
