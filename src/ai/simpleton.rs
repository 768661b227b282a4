use super::Ai;
use crate::ids::{NodeId, PlayerId};
use crate::protocol::OrderRequest;
use crate::world::{Order, Orders, World};

/// Colonizes greedily: every node holding more than 2 units sends half of them towards the
/// nearest node without any of its units.
#[derive(Debug, Clone, Copy, Default)]
pub struct Simpleton;

impl Simpleton {
    /// Path from `src` to the closest node `me` does not hold. Ties go to the first node by id.
    fn nearest_empty(me: &PlayerId, src: &NodeId, world: &World) -> Option<Vec<NodeId>> {
        world
            .nodes
            .values()
            .filter(|node| node.units_of(me) == 0)
            .filter_map(|node| world.path(src, &node.id, None))
            .filter(|path| !path.is_empty())
            .min_by_key(Vec::len)
    }
}

impl Ai for Simpleton {
    fn orders(&self, request: &OrderRequest) -> anyhow::Result<Orders> {
        let me = &request.acting_player_id;
        let world = &request.world_snapshot;
        let mut orders = Orders::new();
        for node in world.nodes.values() {
            let units = node.units_of(me);
            if units <= 2 {
                continue;
            }
            if let Some(path) = Self::nearest_empty(me, &node.id, world) {
                orders.push(Order {
                    src: node.id.clone(),
                    dst: path[0].clone(),
                    units: (units / 2) as i64,
                });
            }
        }
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::ids::GameId;
    use crate::world::Node;

    fn request(world: World) -> OrderRequest {
        OrderRequest {
            acting_player_id: "me".into(),
            game_id: GameId::from("g"),
            turn_ordinal: 0,
            world_snapshot: Arc::new(world),
            players: BTreeMap::new(),
        }
    }

    /// home -> near (1) -> far (1), home -> far (5)
    fn line() -> World {
        let (home, near, far) = ("home".into(), "near".into(), "far".into());
        let mut world = World::new();
        world
            .add(Node::new("home", 50))
            .add(Node::new("near", 50))
            .add(Node::new("far", 50));
        world.connect(&home, &near, 1).unwrap();
        world.connect(&near, &far, 1).unwrap();
        world.connect(&home, &far, 5).unwrap();
        world
    }

    #[test]
    fn sends_half_to_the_nearest_free_node() {
        let mut world = line();
        world
            .nodes
            .get_mut(&NodeId::from("home"))
            .unwrap()
            .units
            .insert("me".into(), 9);
        let orders = Simpleton.orders(&request(world)).unwrap();
        assert_eq!(
            orders,
            vec![Order {
                src: "home".into(),
                dst: "near".into(),
                units: 4
            }]
        );
    }

    #[test]
    fn first_hop_of_a_longer_path() {
        let mut world = line();
        for (id, units) in [("home", 9), ("near", 2)] {
            world
                .nodes
                .get_mut(&NodeId::from(id))
                .unwrap()
                .units
                .insert("me".into(), units);
        }
        let orders = Simpleton.orders(&request(world)).unwrap();
        // far is 2 slots away through near, 5 directly
        assert_eq!(orders.len(), 1, "near holds only 2 units");
        assert_eq!(orders[0].dst, NodeId::from("near"));
    }

    #[test]
    fn small_garrisons_stay() {
        let mut world = line();
        world
            .nodes
            .get_mut(&NodeId::from("home"))
            .unwrap()
            .units
            .insert("me".into(), 2);
        assert!(Simpleton.orders(&request(world)).unwrap().is_empty());
    }
}
