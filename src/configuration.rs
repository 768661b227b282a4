//! Config for the hub behaviors
//!
//! This module provides configuration options for controlling how the hub drives games.
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration values. All
//! values are optional. Values that cannot be parsed are ignored.
//!
//! - `HUB_MAX_TURNS`: Turns after which a game ends without a winner (default: `100`)
//! - `HUB_AGENT_TIMEOUT_MS`: Time an agent has to answer, in milliseconds (default: `10000`)
//! - `HUB_TURN_DELAY_MS`: Pause between two turns of a game, in milliseconds (default: `0`)
//! - `HUB_PARALLEL_GAMES`: Games run at the same time (default: number of cpus)
//! - `HUB_CONFLICT_RETRIES`: Retries of a turn that collided with another writer (default: `3`)
//! - `HUB_LOG`: Set to `"true"` to log to a file (default: `false`)

use std::time::Duration;

/// Configuration for hub behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) max_turns: usize,
    pub(crate) agent_timeout: Duration,
    pub(crate) turn_delay: Duration,
    pub(crate) parallel_games: usize,
    pub(crate) conflict_retries: u32,
    pub(crate) log: bool,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - A game lasts at most 100 turns.
    /// - Agents have 10 seconds to answer.
    /// - Turns follow each other without pause.
    /// - As many games run at once as there are cpus.
    /// - A conflicting turn is retried 3 times.
    /// - Logging to file is disabled.
    pub fn new() -> Self {
        Self {
            max_turns: 100,
            agent_timeout: Duration::from_secs(10),
            turn_delay: Duration::ZERO,
            parallel_games: num_cpus::get(),
            conflict_retries: 3,
            log: false,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// See the [module documentation](self) for the recognized variables. Unset or
    /// unparseable variables keep their default value.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_number<T: std::str::FromStr>(var: &str, default: T) -> T {
            std::env::var(var)
                .ok()
                .and_then(|val| val.trim().parse().ok())
                .unwrap_or(default)
        }

        let default = Self::new();
        Self {
            max_turns: get_env_number("HUB_MAX_TURNS", default.max_turns),
            agent_timeout: Duration::from_millis(get_env_number(
                "HUB_AGENT_TIMEOUT_MS",
                default.agent_timeout.as_millis() as u64,
            )),
            turn_delay: Duration::from_millis(get_env_number(
                "HUB_TURN_DELAY_MS",
                default.turn_delay.as_millis() as u64,
            )),
            parallel_games: get_env_number("HUB_PARALLEL_GAMES", default.parallel_games).max(1),
            conflict_retries: get_env_number("HUB_CONFLICT_RETRIES", default.conflict_retries),
            log: get_env_flag("HUB_LOG", default.log),
        }
    }

    /// Set the number of turns after which a game is finished without a winner.
    pub fn with_max_turns(mut self, value: usize) -> Self {
        self.max_turns = value;
        self
    }

    /// Set the time an agent has to answer one order request.
    pub fn with_agent_timeout(mut self, value: Duration) -> Self {
        self.agent_timeout = value;
        self
    }

    /// Set the pause between two turns of the same game.
    pub fn with_turn_delay(mut self, value: Duration) -> Self {
        self.turn_delay = value;
        self
    }

    /// Set how many games [`Hub::run_games`](crate::hub::Hub::run_games) runs at once.
    ///
    /// Zero is treated as one.
    pub fn with_parallel_games(mut self, value: usize) -> Self {
        self.parallel_games = value.max(1);
        self
    }

    /// Set how many times a turn is retried after a [`Conflict`](crate::store::Conflict).
    pub fn with_conflict_retries(mut self, value: u32) -> Self {
        self.conflict_retries = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn agent_timeout(&self) -> Duration {
        self.agent_timeout
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
