//! Persistence of games, turns, agents and agent diagnostics.
//!
//! The orchestrator only needs the [`Store`] trait. [`MemoryStore`] keeps everything in
//! process memory and is what the hub and the tests use.
//!
//! # Transactions
//!
//! [`Store::transaction`] gives a closure exclusive use of one game and its latest turn.
//! Two transactions on the same game never overlap. Writes made through the
//! [`GameTransaction`] are committed only if the closure succeeds and nobody else wrote the
//! game in the meantime; otherwise the call fails with [`Conflict`] and nothing is written.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use tracing::{debug, trace};

use crate::agent::{Agent, AgentError};
use crate::game::{Game, Turn};
use crate::ids::{GameId, PlayerId};

/// A game was written by someone else while a transaction was using it.
///
/// The whole step should be retried from a fresh read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub game: GameId,
}

impl Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "concurrent modification of game {}", self.game)
    }
}

impl std::error::Error for Conflict {}

/// True if `err` was caused by a [`Conflict`].
pub fn is_conflict(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Conflict>().is_some()
}

/// The view of one game inside a transaction.
#[derive(Debug)]
pub struct GameTransaction {
    /// Written back on commit.
    pub game: Game,
    latest_turn: Turn,
    new_turn: Option<Turn>,
}

impl GameTransaction {
    /// The most recent turn persisted before the transaction started.
    pub fn latest_turn(&self) -> &Turn {
        &self.latest_turn
    }

    /// Queue `turn` to be persisted on commit. It must directly follow the latest turn.
    pub fn push_turn(&mut self, turn: Turn) -> anyhow::Result<()> {
        if turn.ordinal != self.latest_turn.ordinal + 1 {
            bail!(
                "turn {} cannot follow turn {}",
                turn.ordinal,
                self.latest_turn.ordinal
            );
        }
        if self.new_turn.is_some() {
            bail!("only one turn per transaction");
        }
        self.new_turn = Some(turn);
        Ok(())
    }
}

/// A page of games, newest first.
#[derive(Debug, Clone)]
pub struct GamePage {
    pub games: Vec<Game>,
    /// Number of games in the store.
    pub total: usize,
}

/// Everything the hub persists.
pub trait Store: Send + Sync {
    /// Insert or replace an agent.
    fn save_agent(&self, agent: Agent) -> anyhow::Result<()>;

    fn agent(&self, id: &PlayerId) -> anyhow::Result<Option<Agent>>;

    /// All agents, newest first.
    fn agents(&self) -> anyhow::Result<Vec<Agent>>;

    /// Games the agent took part in keep its id; only the registration goes away.
    fn delete_agent(&self, id: &PlayerId) -> anyhow::Result<()>;

    /// Atomically modify an agent. Returns `false` if it is not registered.
    fn update_agent(&self, id: &PlayerId, f: &mut dyn FnMut(&mut Agent)) -> anyhow::Result<bool>;

    fn add_agent_error(&self, error: AgentError) -> anyhow::Result<()>;

    /// Diagnostics recorded for an agent, newest first.
    fn agent_errors(&self, id: &PlayerId) -> anyhow::Result<Vec<AgentError>>;

    /// Persist a new game with its turn 0.
    fn insert_game(&self, game: Game, first_turn: Turn) -> anyhow::Result<()>;

    fn game(&self, id: &GameId) -> anyhow::Result<Option<Game>>;

    fn games(&self, offset: usize, limit: usize) -> anyhow::Result<GamePage>;

    /// Overwrite a game outside of any transaction.
    fn save_game(&self, game: Game) -> anyhow::Result<()>;

    fn latest_turn(&self, id: &GameId) -> anyhow::Result<Option<Turn>>;

    fn turn(&self, id: &GameId, ordinal: usize) -> anyhow::Result<Option<Turn>>;

    /// Every turn of a game, by ordinal.
    fn turns(&self, id: &GameId) -> anyhow::Result<Vec<Turn>>;

    /// Run `f` with exclusive access to a game. See the [module documentation](self).
    fn transaction(
        &self,
        id: &GameId,
        f: &mut dyn FnMut(&mut GameTransaction) -> anyhow::Result<()>,
    ) -> anyhow::Result<()>;
}

#[derive(Debug)]
struct StoredGame {
    game: Game,
    turns: Vec<Turn>,
    version: u64,
    /// Held for the whole of a transaction on this game.
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Default)]
struct Data {
    agents: HashMap<PlayerId, Agent>,
    errors: Vec<AgentError>,
    games: HashMap<GameId, StoredGame>,
}

/// An in-process [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Data>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn game_lock(&self, id: &GameId) -> anyhow::Result<Arc<Mutex<()>>> {
        self.with_game(id, |stored| stored.lock.clone())
            .with_context(|| format!("unknown game {id}"))
    }

    fn with_game<T>(&self, id: &GameId, f: impl FnOnce(&StoredGame) -> T) -> Option<T> {
        let data = self.data.lock().expect("poisoned");
        data.games.get(id).map(f)
    }
}

impl Store for MemoryStore {
    fn save_agent(&self, agent: Agent) -> anyhow::Result<()> {
        let mut data = self.data.lock().expect("poisoned");
        data.agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    fn agent(&self, id: &PlayerId) -> anyhow::Result<Option<Agent>> {
        let data = self.data.lock().expect("poisoned");
        Ok(data.agents.get(id).cloned())
    }

    fn agents(&self) -> anyhow::Result<Vec<Agent>> {
        let data = self.data.lock().expect("poisoned");
        let mut agents = data.agents.values().cloned().collect::<Vec<_>>();
        agents.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(agents)
    }

    fn delete_agent(&self, id: &PlayerId) -> anyhow::Result<()> {
        let mut data = self.data.lock().expect("poisoned");
        data.agents.remove(id);
        Ok(())
    }

    fn update_agent(&self, id: &PlayerId, f: &mut dyn FnMut(&mut Agent)) -> anyhow::Result<bool> {
        let mut data = self.data.lock().expect("poisoned");
        match data.agents.get_mut(id) {
            Some(agent) => {
                f(agent);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn add_agent_error(&self, error: AgentError) -> anyhow::Result<()> {
        let mut data = self.data.lock().expect("poisoned");
        data.errors.push(error);
        Ok(())
    }

    fn agent_errors(&self, id: &PlayerId) -> anyhow::Result<Vec<AgentError>> {
        let data = self.data.lock().expect("poisoned");
        Ok(data
            .errors
            .iter()
            .rev()
            .filter(|error| &error.agent == id)
            .cloned()
            .collect())
    }

    fn insert_game(&self, game: Game, first_turn: Turn) -> anyhow::Result<()> {
        let mut data = self.data.lock().expect("poisoned");
        if data.games.contains_key(&game.id) {
            bail!("game {} already exists", game.id);
        }
        if first_turn.ordinal != 0 {
            bail!("a game starts at turn 0, not {}", first_turn.ordinal);
        }
        debug!(game = %game.id, "inserting game");
        data.games.insert(
            game.id.clone(),
            StoredGame {
                game,
                turns: vec![first_turn],
                version: 0,
                lock: Arc::default(),
            },
        );
        Ok(())
    }

    fn game(&self, id: &GameId) -> anyhow::Result<Option<Game>> {
        Ok(self.with_game(id, |stored| stored.game.clone()))
    }

    fn games(&self, offset: usize, limit: usize) -> anyhow::Result<GamePage> {
        let data = self.data.lock().expect("poisoned");
        let mut games = data
            .games
            .values()
            .map(|stored| stored.game.clone())
            .collect::<Vec<_>>();
        games.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let total = games.len();
        let games = games.into_iter().skip(offset).take(limit).collect();
        Ok(GamePage { games, total })
    }

    fn save_game(&self, game: Game) -> anyhow::Result<()> {
        let mut data = self.data.lock().expect("poisoned");
        let stored = data
            .games
            .get_mut(&game.id)
            .with_context(|| format!("unknown game {}", game.id))?;
        stored.game = game;
        stored.version += 1;
        Ok(())
    }

    fn latest_turn(&self, id: &GameId) -> anyhow::Result<Option<Turn>> {
        Ok(self
            .with_game(id, |stored| stored.turns.last().cloned())
            .flatten())
    }

    fn turn(&self, id: &GameId, ordinal: usize) -> anyhow::Result<Option<Turn>> {
        Ok(self
            .with_game(id, |stored| stored.turns.get(ordinal).cloned())
            .flatten())
    }

    fn turns(&self, id: &GameId) -> anyhow::Result<Vec<Turn>> {
        Ok(self
            .with_game(id, |stored| stored.turns.clone())
            .unwrap_or_default())
    }

    fn transaction(
        &self,
        id: &GameId,
        f: &mut dyn FnMut(&mut GameTransaction) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        let lock = self.game_lock(id)?;
        let _exclusive = lock.lock().expect("poisoned");

        let (game, latest_turn, version) = {
            let data = self.data.lock().expect("poisoned");
            let stored = data
                .games
                .get(id)
                .with_context(|| format!("unknown game {id}"))?;
            let latest = stored
                .turns
                .last()
                .cloned()
                .with_context(|| format!("game {id} has no turn"))?;
            (stored.game.clone(), latest, stored.version)
        };

        let mut tx = GameTransaction {
            game,
            latest_turn,
            new_turn: None,
        };
        f(&mut tx)?;

        let mut data = self.data.lock().expect("poisoned");
        let stored = data
            .games
            .get_mut(id)
            .with_context(|| format!("game {id} disappeared"))?;
        if stored.version != version {
            return Err(Conflict { game: id.clone() }.into());
        }
        if let Some(turn) = tx.new_turn {
            if turn.ordinal != stored.turns.len() {
                return Err(Conflict { game: id.clone() }.into());
            }
            stored.turns.push(turn);
        }
        stored.game = tx.game;
        stored.version += 1;
        trace!(game = %id, version = stored.version, "committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Barrier;
    use std::thread;

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::game::GameState;

    fn new_game(store: &MemoryStore, id: &str) -> GameId {
        let players = vec![PlayerId::from("a"), PlayerId::from("b")];
        let game = Game::new(GameId::from(id), players.clone());
        let turn = Turn::first(&players, &mut StdRng::seed_from_u64(1));
        store.insert_game(game, turn).unwrap();
        GameId::from(id)
    }

    fn advance(tx: &mut GameTransaction) -> anyhow::Result<()> {
        let (turn, _) = tx.latest_turn().next(&BTreeMap::new());
        tx.push_turn(turn)?;
        tx.game.length += 1;
        tx.game.state = GameState::Playing;
        Ok(())
    }

    #[test]
    fn transaction_commits_game_and_turn() {
        let store = MemoryStore::new();
        let id = new_game(&store, "g");
        store.transaction(&id, &mut advance).unwrap();
        let game = store.game(&id).unwrap().unwrap();
        assert_eq!(game.length, 2);
        assert_eq!(game.state, GameState::Playing);
        assert_eq!(store.latest_turn(&id).unwrap().unwrap().ordinal, 1);
        assert_eq!(store.turns(&id).unwrap().len(), 2);
        assert_eq!(store.turn(&id, 0).unwrap().unwrap().ordinal, 0);
    }

    #[test]
    fn failed_transaction_writes_nothing() {
        let store = MemoryStore::new();
        let id = new_game(&store, "g");
        let result = store.transaction(&id, &mut |tx| {
            advance(tx)?;
            bail!("agent exploded")
        });
        assert!(result.is_err());
        assert!(!is_conflict(&result.unwrap_err()));
        assert_eq!(store.game(&id).unwrap().unwrap().length, 1);
        assert_eq!(store.turns(&id).unwrap().len(), 1);
    }

    #[test]
    fn outside_write_during_transaction_is_a_conflict() {
        let store = MemoryStore::new();
        let id = new_game(&store, "g");
        let result = store.transaction(&id, &mut |tx| {
            let mut game = tx.game.clone();
            game.state = GameState::Finished;
            store.save_game(game)?;
            advance(tx)
        });
        let err = result.unwrap_err();
        assert!(is_conflict(&err));
        assert_eq!(store.turns(&id).unwrap().len(), 1);
        assert_eq!(store.game(&id).unwrap().unwrap().state, GameState::Finished);
    }

    #[test]
    fn turns_must_follow_each_other() {
        let store = MemoryStore::new();
        let id = new_game(&store, "g");
        let result = store.transaction(&id, &mut |tx| {
            let mut turn = tx.latest_turn().clone();
            turn.ordinal = 5;
            tx.push_turn(turn)
        });
        assert!(result.is_err());
    }

    #[test]
    fn concurrent_transactions_on_a_game_are_serialized() {
        let store = Arc::new(MemoryStore::new());
        let id = new_game(&store, "g");
        let start = Arc::new(Barrier::new(8));
        let handles = (0..8)
            .map(|_| {
                let store = store.clone();
                let id = id.clone();
                let start = start.clone();
                thread::spawn(move || {
                    start.wait();
                    store.transaction(&id, &mut advance)
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        let turns = store.turns(&id).unwrap();
        assert_eq!(turns.len(), 9);
        assert!(turns.iter().enumerate().all(|(i, t)| t.ordinal == i));
        assert_eq!(store.game(&id).unwrap().unwrap().length, 9);
    }

    #[test]
    fn transaction_locks_live_with_their_game() {
        let store = MemoryStore::new();
        let ids = ["g1", "g2", "g3"].map(|id| new_game(&store, id));
        for id in &ids {
            store.transaction(id, &mut advance).unwrap();
        }
        assert!(store.transaction(&GameId::from("nope"), &mut advance).is_err());

        let data = store.data.lock().unwrap();
        assert_eq!(data.games.len(), 3);
        for stored in data.games.values() {
            assert_eq!(Arc::strong_count(&stored.lock), 1);
        }
    }

    #[test]
    fn unknown_game() {
        let store = MemoryStore::new();
        assert!(store.transaction(&GameId::from("nope"), &mut advance).is_err());
        assert!(store.game(&GameId::from("nope")).unwrap().is_none());
        assert!(store.turns(&GameId::from("nope")).unwrap().is_empty());
    }

    #[test]
    fn duplicate_game_is_rejected() {
        let store = MemoryStore::new();
        new_game(&store, "g");
        let game = Game::new(GameId::from("g"), vec![]);
        let turn = Turn::first(&[], &mut StdRng::seed_from_u64(1));
        assert!(store.insert_game(game, turn).is_err());
    }

    #[test]
    fn game_pages() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c"] {
            new_game(&store, id);
        }
        let page = store.games(1, 5).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.games.len(), 2);
    }

    #[test]
    fn agents_and_their_errors() {
        let store = MemoryStore::new();
        let id = PlayerId::from("bot");
        store.save_agent(Agent::new(id.clone(), "bot", "http://127.0.0.1:1/")).unwrap();
        assert!(store.update_agent(&id, &mut |agent| agent.wins += 1).unwrap());
        assert_eq!(store.agent(&id).unwrap().unwrap().wins, 1);
        assert!(!store
            .update_agent(&PlayerId::from("ghost"), &mut |agent| agent.wins += 1)
            .unwrap());

        for ordinal in 0..3 {
            store
                .add_agent_error(AgentError {
                    agent: id.clone(),
                    game: GameId::from("g"),
                    turn_ordinal: ordinal,
                    message: "boom".to_string(),
                    request_body: String::new(),
                    status: Some(500),
                    response_body: String::new(),
                    created_at: time::OffsetDateTime::now_utc(),
                })
                .unwrap();
        }
        let errors = store.agent_errors(&id).unwrap();
        assert_eq!(
            errors.iter().map(|e| e.turn_ordinal).collect::<Vec<_>>(),
            vec![2, 1, 0]
        );

        store.delete_agent(&id).unwrap();
        assert!(store.agent(&id).unwrap().is_none());
        assert!(store.agents().unwrap().is_empty());
    }
}
