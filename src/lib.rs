//! # Graph Conquest
//!
//! Turn-based territory matches between networked AI agents, played on randomly generated
//! directed graphs.
//!
//! It provides:
//! - The game itself: a [`World`](crate::world::World) of nodes and timed edges, its random
//!   generation and its deterministic turn transition ([`world`])
//! - A turn orchestrator asking every agent for orders concurrently over HTTP
//!   ([`orchestrator`])
//! - A [`Hub`](crate::hub::Hub) registering agents, creating games and playing them out
//! - Hosting helpers and reference agents for writing your own player ([`ai`])
//!
//! Every turn, each agent receives the complete world and answers with a list of
//! [`Order`](crate::world::Order)s moving units along edges. An agent that fails, answers
//! garbage or is too slow simply plays no orders that turn; the failure is recorded as an
//! [`AgentError`](crate::agent::AgentError) for that agent.
//!
//! # Documentation Overview
//!
//! - For the rules of the game (transit, growth, starvation, conflict), see [`world::engine`].
//! - For the order request and answer format, see [`protocol`].
//! - For running games, see the [`hub`] module and [`Configuration`](crate::configuration::Configuration).
//! - For persistence, see the [`Store`](crate::store::Store) trait.
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use graph_conquest::ai::{AgentServer, Broken, Simpleton};
//! use graph_conquest::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let good = AgentServer::spawn(Simpleton)?;
//!     let bad = AgentServer::spawn(Broken)?;
//!
//!     let config = Configuration::new().with_max_turns(50);
//!     let hub = Hub::new(Arc::new(MemoryStore::new()), config)?;
//!     let good = hub.register_agent("simpleton", good.url())?;
//!     let bad = hub.register_agent("broken", bad.url())?;
//!
//!     let game = hub.create_game(vec![good.id.clone(), bad.id.clone()], &mut rand::rng())?;
//!     let game = hub.run_game(&game.id)?;
//!     println!("winner: {:?}", game.winner);
//!     for error in hub.store().agent_errors(&bad.id)? {
//!         println!("turn {}: {}", error.turn_ordinal, error.message);
//!     }
//!     Ok(())
//! }
//! ```

pub use anyhow;

pub mod agent;
pub mod ai;
pub mod client_handler;
pub mod configuration;
pub mod game;
pub mod hub;
pub mod ids;
mod logger;
pub mod orchestrator;
pub mod protocol;
pub mod random;
pub mod store;
pub mod world;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use graph_conquest::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent::{Agent, AgentError};
    pub use crate::ai::{AgentServer, Ai};
    pub use crate::configuration::Configuration;
    pub use crate::game::{Game, GameState, Turn};
    pub use crate::hub::Hub;
    pub use crate::ids::{GameId, NodeId, PlayerId};
    pub use crate::orchestrator::TurnOutcome;
    pub use crate::store::{MemoryStore, Store};
    pub use crate::world::{Order, Orders, World};
}
