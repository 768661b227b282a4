//! What the hub sends to an agent each turn.
//!
//! The hub POSTs an [`OrderRequest`] as JSON to the agent's URL. The agent answers `200`
//! with a JSON array of [`Order`](crate::world::Order)s:
//!
//! ```json
//! [{"src": "nodeA", "dst": "nodeB", "units": 5}]
//! ```
//!
//! Anything else (another status, a body that is not such an array, no answer in time)
//! counts as no orders for that turn.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ids::{GameId, PlayerId};
use crate::world::World;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// The id representing the receiving agent in the world.
    pub acting_player_id: PlayerId,
    /// Stable across the whole game, for agents that keep state between turns.
    pub game_id: GameId,
    /// Ordinal of the turn the orders are for.
    pub turn_ordinal: usize,
    pub world_snapshot: Arc<World>,
    /// Names of the agents in the game.
    #[serde(default)]
    pub players: BTreeMap<PlayerId, String>,
}
