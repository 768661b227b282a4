use std::hash::Hash;

use time::OffsetDateTime;

use crate::ids::{GameId, PlayerId};

/// A registered agent: a name and the endpoint the hub asks for orders.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: PlayerId,
    pub name: String,
    pub url: String,
    pub games: u32,
    pub wins: u32,
    pub losses: u32,
    pub created_at: OffsetDateTime,
}

impl PartialEq for Agent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Agent {}

impl Hash for Agent {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Agent {
    pub fn new(id: PlayerId, name: impl Into<String>, url: impl Into<String>) -> Agent {
        Agent {
            id,
            name: name.into(),
            url: url.into(),
            games: 0,
            wins: 0,
            losses: 0,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Why an agent contributed no orders to a turn.
///
/// Kept apart from the game: it never changes the outcome of the turn.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentError {
    pub agent: PlayerId,
    pub game: GameId,
    /// Ordinal of the turn the agent was asked about.
    pub turn_ordinal: usize,
    pub message: String,
    pub request_body: String,
    /// HTTP status, if the agent answered at all.
    pub status: Option<u16>,
    pub response_body: String,
    pub created_at: OffsetDateTime,
}
