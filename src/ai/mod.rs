//! Writing and hosting agents.
//!
//! An agent is anything implementing [`Ai`]. [`AgentServer`] serves it over HTTP so the hub
//! can reach it: register [`AgentServer::url`] with [`Hub::register_agent`](crate::hub::Hub::register_agent).
//!
//! ```no_run
//! use graph_conquest::ai::{AgentServer, Simpleton};
//!
//! # fn main() -> anyhow::Result<()> {
//! let server = AgentServer::spawn(Simpleton)?;
//! println!("serving orders on {}", server.url());
//! # Ok(())
//! # }
//! ```

mod broken;
mod randomizer;
mod server;
mod simpleton;

pub use broken::Broken;
pub use randomizer::Randomizer;
pub use server::AgentServer;
pub use simpleton::Simpleton;

use crate::protocol::OrderRequest;
use crate::world::Orders;

/// A player of the game.
pub trait Ai: Send + Sync {
    /// Orders for the turn described by `request`, on behalf of `request.acting_player_id`.
    ///
    /// An error, or a panic, is answered with a `500` and the hub plays no orders for this
    /// agent this turn.
    fn orders(&self, request: &OrderRequest) -> anyhow::Result<Orders>;
}

impl<F> Ai for F
where
    F: Fn(&OrderRequest) -> anyhow::Result<Orders> + Send + Sync,
{
    fn orders(&self, request: &OrderRequest) -> anyhow::Result<Orders> {
        self(request)
    }
}
