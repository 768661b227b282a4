//! One step of a game: ask every agent for orders, then persist the next turn.
//!
//! [`advance_turn`] runs the whole read, collect, compute and write sequence inside a
//! [`Store::transaction`], so two steps of the same game never interleave. Agent failures
//! are written afterwards as [`AgentError`]s and never abort the step; statistics are
//! updated only once the finishing turn is committed.

use std::collections::BTreeMap;
use std::sync::{mpsc, Arc};
use std::thread;

use time::OffsetDateTime;
use tracing::{debug, info, instrument, trace, warn};

use crate::agent::{Agent, AgentError};
use crate::client_handler::AgentClient;
use crate::configuration::Configuration;
use crate::game::{Game, GameState};
use crate::ids::{GameId, PlayerId};
use crate::protocol::OrderRequest;
use crate::store::Store;
use crate::world::{Orders, World};

/// Name sent to agents for player slots with no registered agent.
pub const REDACTED_NAME: &str = "[redacted]";

/// What one call to [`advance_turn`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Turn `ordinal` was persisted and the game goes on.
    Continued { ordinal: usize },
    /// Turn `ordinal` was persisted and left `winner` as the only player with units.
    Won { ordinal: usize, winner: PlayerId },
    /// The game reached the turn limit and was finished without a winner.
    TimedOut,
    /// The game was finished before the call; nothing changed.
    AlreadyFinished,
}

impl TurnOutcome {
    /// True if the game cannot be advanced any further.
    pub fn is_final(&self) -> bool {
        !matches!(self, TurnOutcome::Continued { .. })
    }
}

/// Advance game `id` by one turn.
///
/// Fails with a [`Conflict`](crate::store::Conflict) if the game was written concurrently;
/// the caller decides whether to retry.
#[instrument(skip(store, client, config), fields(game = %id))]
pub fn advance_turn(
    store: &dyn Store,
    client: &dyn AgentClient,
    config: &Configuration,
    id: &GameId,
) -> anyhow::Result<TurnOutcome> {
    let mut outcome = TurnOutcome::AlreadyFinished;
    let mut failures = vec![];
    let mut finished_game = None;

    store.transaction(id, &mut |tx| {
        failures.clear();
        finished_game = None;

        if tx.game.is_finished() {
            outcome = TurnOutcome::AlreadyFinished;
            return Ok(());
        }
        if tx.game.length > config.max_turns {
            info!(length = tx.game.length, "ended due to timeout");
            tx.game.state = GameState::Finished;
            tx.game.winner = None;
            outcome = TurnOutcome::TimedOut;
            return Ok(());
        }

        let agents = registered_agents(store, &tx.game)?;
        let latest = tx.latest_turn();
        let ordinal = latest.ordinal;
        let world = Arc::new(latest.world.clone());
        let (orders, errors) = collect_orders(client, &tx.game, ordinal, &world, &agents);
        failures = errors;

        let (turn, winner) = tx.latest_turn().next(&orders);
        let new_ordinal = turn.ordinal;
        tx.push_turn(turn)?;
        tx.game.length += 1;
        match winner {
            Some(winner) => {
                info!(%winner, ordinal = new_ordinal, "game won");
                tx.game.state = GameState::Finished;
                tx.game.winner = Some(winner.clone());
                finished_game = Some(tx.game.clone());
                outcome = TurnOutcome::Won {
                    ordinal: new_ordinal,
                    winner,
                };
            }
            None => {
                tx.game.state = GameState::Playing;
                outcome = TurnOutcome::Continued {
                    ordinal: new_ordinal,
                };
            }
        }
        Ok(())
    })?;

    for failure in failures {
        if let Err(e) = store.add_agent_error(failure) {
            warn!("could not save agent error: {e:#}");
        }
    }
    if let Some(game) = finished_game {
        record_result(store, &game)?;
    }
    debug!(?outcome, "step done");
    Ok(outcome)
}

fn registered_agents(store: &dyn Store, game: &Game) -> anyhow::Result<BTreeMap<PlayerId, Agent>> {
    let mut agents = BTreeMap::new();
    for player in &game.players {
        if let Some(agent) = store.agent(player)? {
            agents.insert(player.clone(), agent);
        }
    }
    Ok(agents)
}

/// Ask every registered agent at once, and wait for all of them.
///
/// Every player slot gets an entry, empty when the agent is missing or failed.
fn collect_orders(
    client: &dyn AgentClient,
    game: &Game,
    ordinal: usize,
    world: &Arc<World>,
    agents: &BTreeMap<PlayerId, Agent>,
) -> (BTreeMap<PlayerId, Orders>, Vec<AgentError>) {
    let names = game
        .players
        .iter()
        .map(|player| {
            let name = agents
                .get(player)
                .map_or(REDACTED_NAME, |agent| agent.name.as_str());
            (player.clone(), name.to_string())
        })
        .collect::<BTreeMap<_, _>>();
    let mut orders = game
        .players
        .iter()
        .map(|player| (player.clone(), Orders::new()))
        .collect::<BTreeMap<_, _>>();
    let mut errors = vec![];

    let (sender, receiver) = mpsc::channel();
    thread::scope(|scope| {
        for player in &game.players {
            let Some(agent) = agents.get(player) else {
                trace!(%player, "no agent, no orders");
                continue;
            };
            let request = OrderRequest {
                acting_player_id: player.clone(),
                game_id: game.id.clone(),
                turn_ordinal: ordinal,
                world_snapshot: Arc::clone(world),
                players: names.clone(),
            };
            let sender = sender.clone();
            scope.spawn(move || {
                let result = client.request_orders(&agent.url, &request);
                // the receiver outlives the scope
                let _ = sender.send((agent, result));
            });
        }
        drop(sender);

        for (agent, result) in receiver {
            match result {
                Ok(received) => {
                    orders.insert(agent.id.clone(), received);
                }
                Err(failure) => {
                    warn!(agent = %agent.id, "agent failed: {failure}");
                    errors.push(AgentError {
                        agent: agent.id.clone(),
                        game: game.id.clone(),
                        turn_ordinal: ordinal,
                        message: failure.message,
                        request_body: failure.request_body,
                        status: failure.status,
                        response_body: failure.response_body,
                        created_at: OffsetDateTime::now_utc(),
                    });
                }
            }
        }
    });
    (orders, errors)
}

/// Wins and losses of every registered participant of a game that has a winner.
fn record_result(store: &dyn Store, game: &Game) -> anyhow::Result<()> {
    let Some(winner) = &game.winner else {
        return Ok(());
    };
    for player in &game.players {
        let won = player == winner;
        let registered = store.update_agent(player, &mut |agent| {
            if won {
                agent.wins += 1;
            } else {
                agent.losses += 1;
            }
        })?;
        if !registered {
            trace!(%player, "not registered, no statistics");
        }
    }
    Ok(())
}
