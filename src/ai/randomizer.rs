use std::sync::Mutex;

use rand::{rngs::StdRng, Rng, SeedableRng};

use super::Ai;
use crate::protocol::OrderRequest;
use crate::world::{Order, Orders};

/// Moves up to a fifth of its units out of every node it holds, spread over randomly
/// sized shares along the node's edges.
#[derive(Debug)]
pub struct Randomizer {
    rng: Mutex<StdRng>,
}

impl Randomizer {
    /// Reproducible orders, for tests.
    pub fn seeded(seed: u64) -> Self {
        Randomizer {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for Randomizer {
    fn default() -> Self {
        Randomizer {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }
}

impl Ai for Randomizer {
    fn orders(&self, request: &OrderRequest) -> anyhow::Result<Orders> {
        let me = &request.acting_player_id;
        let mut rng = self.rng.lock().expect("poisoned");
        let mut orders = Orders::new();
        for node in request.world_snapshot.nodes.values() {
            let held = node.units_of(me);
            if held == 0 {
                continue;
            }
            // sorted cut points in [0, 0.2); edge i gets the gap before cut i
            let mut cuts = (0..node.edges.len())
                .map(|_| rng.random::<f64>() / 5.0)
                .collect::<Vec<_>>();
            cuts.sort_by(f64::total_cmp);
            let mut previous = 0.0;
            for (edge, cut) in node.edges.values().zip(cuts) {
                let share = cut - previous;
                previous = cut;
                let units = ((held as f64 * share) as u64).min(held);
                if units > 0 {
                    orders.push(Order {
                        src: edge.src.clone(),
                        dst: edge.dst.clone(),
                        units: units as i64,
                    });
                }
            }
        }
        Ok(orders)
    }
}
