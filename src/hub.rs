//! The hub: agent registry, game creation and the loop that plays games out.
//!
//! [`Hub`] ties a [`Store`] to an [`AgentClient`]. Its responsibilities include:
//!
//! - Registering agents and the url they serve orders on
//! - Creating games with a freshly generated world
//! - Playing a game turn after turn until it is finished ([`Hub::run_game`])
//! - Playing many games at once, a bounded number at a time ([`Hub::run_games`])
//!
//! # Behavior & Configuration
//!
//! Behavior is controlled by a [`Configuration`] object:
//!
//! - `max_turns` ends a game without a winner once that many turns were played.
//! - `agent_timeout` bounds each order request.
//! - `turn_delay` pauses between two turns of the same game.
//! - `conflict_retries` is how often a turn that collided with another writer is retried.
//! - `parallel_games` bounds [`Hub::run_games`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use graph_conquest::ai::{AgentServer, Randomizer, Simpleton};
//! use graph_conquest::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let simpleton = AgentServer::spawn(Simpleton)?;
//!     let randomizer = AgentServer::spawn(Randomizer::default())?;
//!
//!     let hub = Hub::new(Arc::new(MemoryStore::new()), Configuration::from_env())?;
//!     let a = hub.register_agent("simpleton", simpleton.url())?;
//!     let b = hub.register_agent("randomizer", randomizer.url())?;
//!
//!     let game = hub.create_game(vec![a.id, b.id], &mut rand::rng())?;
//!     let game = hub.run_game(&game.id)?;
//!     println!("{game} ended, winner: {:?}", game.winner);
//!     Ok(())
//! }
//! ```

use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, bail, Context};
use rand::Rng;
use reqwest::Url;
use tracing::{debug, info, instrument, trace, warn};

use crate::agent::Agent;
use crate::client_handler::{AgentClient, HttpAgentClient};
use crate::configuration::Configuration;
use crate::game::{Game, Turn};
use crate::ids::{GameId, PlayerId};
use crate::logger::init_logger;
use crate::orchestrator::{advance_turn, TurnOutcome};
use crate::random::random_token;
use crate::store::{is_conflict, Store};

const ID_BYTES: usize = 16;

/// Result of one game run by [`Hub::run_games`].
pub type GameResult = (GameId, anyhow::Result<Game>);

/// Registers agents, creates games and plays them.
#[derive(Clone)]
pub struct Hub {
    store: Arc<dyn Store>,
    client: Arc<dyn AgentClient>,
    config: Configuration,
}

impl Hub {
    /// A hub asking agents over HTTP, with `config.agent_timeout` per request.
    #[instrument(skip_all)]
    pub fn new(store: Arc<dyn Store>, config: Configuration) -> anyhow::Result<Hub> {
        let client = Arc::new(HttpAgentClient::new(config.agent_timeout)?);
        Ok(Self::with_client(store, client, config))
    }

    /// A hub reaching agents through `client`.
    pub fn with_client(
        store: Arc<dyn Store>,
        client: Arc<dyn AgentClient>,
        config: Configuration,
    ) -> Hub {
        if config.log {
            if let Err(e) = init_logger() {
                warn!("logging to file disabled: {e:#}");
            }
        }
        trace!(?config);

        Hub {
            store,
            client,
            config,
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Register an agent serving orders on `url` (`http://host:port/path`).
    #[instrument(skip(self))]
    pub fn register_agent(&self, name: &str, url: String) -> anyhow::Result<Agent> {
        check_agent_url(&url).with_context(|| format!("cannot register agent '{name}'"))?;
        let id = PlayerId::new(random_token(&mut rand::rng(), ID_BYTES));
        let agent = Agent::new(id, name, url);
        self.store.save_agent(agent.clone())?;
        info!(id = %agent.id, "registered agent");
        Ok(agent)
    }

    /// Forget an agent. Its games stay, and its slots in unfinished games play no orders.
    pub fn remove_agent(&self, id: &PlayerId) -> anyhow::Result<()> {
        self.store.delete_agent(id)
    }

    /// Create a game between `players`, in slot order, on a new random world.
    ///
    /// Players need not be registered: unregistered slots never give orders.
    #[instrument(skip(self, rng))]
    pub fn create_game<R: Rng>(&self, players: Vec<PlayerId>, rng: &mut R) -> anyhow::Result<Game> {
        if players.is_empty() {
            bail!("a game needs at least one player");
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = players.iter().find(|player| !seen.insert(*player)) {
            bail!("player {duplicate} is listed twice");
        }

        let id = GameId::new(random_token(rng, ID_BYTES));
        let first_turn = Turn::first(&players, rng);
        let game = Game::new(id, players);
        self.store.insert_game(game.clone(), first_turn)?;
        for player in &game.players {
            self.store
                .update_agent(player, &mut |agent| agent.games += 1)?;
        }
        info!(%game, "created game");
        Ok(game)
    }

    /// Play one turn of a game. See [`advance_turn`].
    pub fn advance(&self, id: &GameId) -> anyhow::Result<TurnOutcome> {
        advance_turn(self.store.as_ref(), self.client.as_ref(), &self.config, id)
    }

    /// Play turns until the game is finished, and return it as finished.
    #[instrument(skip(self), fields(game = %id))]
    pub fn run_game(&self, id: &GameId) -> anyhow::Result<Game> {
        loop {
            let outcome = self.advance_retrying(id)?;
            if outcome.is_final() {
                debug!(?outcome, "game over");
                break;
            }
            if !self.config.turn_delay.is_zero() {
                thread::sleep(self.config.turn_delay);
            }
        }
        self.store
            .game(id)?
            .with_context(|| format!("game {id} disappeared"))
    }

    fn advance_retrying(&self, id: &GameId) -> anyhow::Result<TurnOutcome> {
        let mut attempts = 0;
        loop {
            match self.advance(id) {
                Err(e) if is_conflict(&e) && attempts < self.config.conflict_retries => {
                    attempts += 1;
                    warn!(attempts, "{e}, retrying");
                }
                result => return result,
            }
        }
    }

    /// Play several games to the end, at most `parallel_games` at a time.
    ///
    /// Results come in the order games finish.
    #[instrument(skip_all)]
    pub fn run_games(&self, games: impl IntoIterator<Item = GameId>) -> Vec<GameResult> {
        let mut pending = games.into_iter().collect::<VecDeque<_>>();
        let (tx_result, rx_result) = mpsc::channel();
        let mut running = 0;
        let mut results = vec![];

        // 1. Init games
        while running < self.config.parallel_games {
            let Some(id) = pending.pop_front() else { break };
            self.launch_game(id, tx_result.clone());
            running += 1;
        }

        // 2. main loop
        while running > 0 {
            // every launched game sends exactly one result
            let Ok(result) = rx_result.recv() else { break };
            running -= 1;
            results.push(result);
            if let Some(id) = pending.pop_front() {
                self.launch_game(id, tx_result.clone());
                running += 1;
            }
        }
        results
    }

    fn launch_game(&self, id: GameId, tx_result: Sender<GameResult>) {
        let hub = self.clone();
        thread::spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| hub.run_game(&id)))
                .unwrap_or_else(|_| Err(anyhow!("panicked while running game {id}")));
            match &result {
                Ok(game) => info!(%game, winner = ?game.winner, "game finished"),
                Err(e) => warn!(game = %id, "game failed: {e:#}"),
            }
            let _ = tx_result.send((id, result));
        });
    }
}

fn check_agent_url(url: &str) -> anyhow::Result<()> {
    let parsed = Url::parse(url).with_context(|| format!("invalid url '{url}'"))?;
    if parsed.scheme() != "http" {
        bail!("agents are reached over plain http, not {}", parsed.scheme());
    }
    if parsed.host().is_none() {
        bail!("no host in '{url}'");
    }
    Ok(())
}
