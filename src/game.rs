//! Match records: a [`Game`] and the [`Turn`]s it went through.

use std::collections::BTreeMap;
use std::fmt::Display;

use rand::Rng;
use time::OffsetDateTime;

use crate::ids::{GameId, PlayerId};
use crate::world::{Orders, World};

/// Lifecycle of a [`Game`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameState {
    Created,
    Playing,
    Finished,
}

impl Display for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GameState::Created => "Created",
            GameState::Playing => "Playing",
            GameState::Finished => "Finished",
        };
        f.write_str(s)
    }
}

/// One match between agents.
#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub id: GameId,
    /// Participants in slot order. Each id is also the key of that player's units in the world.
    pub players: Vec<PlayerId>,
    pub winner: Option<PlayerId>,
    pub state: GameState,
    /// Number of turns persisted so far, the initial one included.
    pub length: usize,
    pub created_at: OffsetDateTime,
}

impl Game {
    pub fn new(id: GameId, players: Vec<PlayerId>) -> Self {
        Game {
            id,
            players,
            winner: None,
            state: GameState::Created,
            length: 1,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == GameState::Finished
    }
}

impl Display for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let players = self
            .players
            .iter()
            .map(PlayerId::to_string)
            .collect::<Vec<_>>()
            .join(" VS ");
        write!(f, "[{}: {players}]", self.id)
    }
}

/// A persisted snapshot of a game.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub ordinal: usize,
    pub world: World,
    pub created_at: OffsetDateTime,
}

impl Turn {
    /// Turn 0: a freshly generated world for `players`.
    pub fn first<R: Rng>(players: &[PlayerId], rng: &mut R) -> Turn {
        Turn {
            ordinal: 0,
            world: World::random(players, rng),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// The following turn. `self` is left as it was.
    pub fn next(&self, orders: &BTreeMap<PlayerId, Orders>) -> (Turn, Option<PlayerId>) {
        let (world, winner) = self.world.next(orders);
        let turn = Turn {
            ordinal: self.ordinal + 1,
            world,
            created_at: OffsetDateTime::now_utc(),
        };
        (turn, winner)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn next_turn_increments_ordinal_without_touching_history() {
        let players = vec![PlayerId::from("a"), PlayerId::from("b")];
        let first = Turn::first(&players, &mut StdRng::seed_from_u64(4));
        let copy = first.clone();
        let (second, winner) = first.next(&BTreeMap::new());
        assert_eq!(second.ordinal, 1);
        assert_eq!(winner, None);
        assert_eq!(first, copy);
    }

    #[test]
    fn new_game_is_created() {
        let game = Game::new(GameId::from("g"), vec![PlayerId::from("a")]);
        assert_eq!(game.state, GameState::Created);
        assert_eq!(game.length, 1);
        assert!(!game.is_finished());
        assert_eq!(game.to_string(), "[g: a]");
    }
}
