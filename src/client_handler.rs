use std::fmt::Display;
use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{instrument, trace, warn};

use crate::protocol::OrderRequest;
use crate::world::Orders;

/// Why an agent gave no usable orders, with what was exchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentFailure {
    pub message: String,
    pub request_body: String,
    /// HTTP status, if the agent answered at all.
    pub status: Option<u16>,
    pub response_body: String,
}

impl AgentFailure {
    fn unanswered(message: impl Into<String>, request_body: &str) -> AgentFailure {
        AgentFailure {
            message: message.into(),
            request_body: request_body.to_string(),
            status: None,
            response_body: String::new(),
        }
    }
}

impl Display for AgentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for AgentFailure {}

/// Asks an agent for its orders.
///
/// Called concurrently from several threads, one call per agent and turn.
pub trait AgentClient: Send + Sync {
    fn request_orders(&self, url: &str, request: &OrderRequest) -> Result<Orders, AgentFailure>;
}

/// POSTs the request as JSON and expects `200` with a JSON array of orders.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    http: Client,
}

impl HttpAgentClient {
    /// `timeout` bounds the whole exchange: connecting, sending and reading the answer.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(HttpAgentClient { http })
    }
}

fn describe(e: reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out waiting for the agent: {e}")
    } else {
        format!("{:#}", anyhow::Error::from(e))
    }
}

impl AgentClient for HttpAgentClient {
    #[instrument(skip_all, fields(url = %url, player = %request.acting_player_id, ordinal = request.turn_ordinal))]
    fn request_orders(&self, url: &str, request: &OrderRequest) -> Result<Orders, AgentFailure> {
        let request_body = serde_json::to_string(request)
            .map_err(|e| AgentFailure::unanswered(format!("could not encode request: {e}"), ""))?;

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(request_body.clone())
            .send()
            .map_err(|e| {
                let message = describe(e);
                warn!("no answer: {message}");
                AgentFailure::unanswered(message, &request_body)
            })?;

        let status = response.status().as_u16();
        let response_body = response.text().map_err(|e| AgentFailure {
            message: format!("could not read answer: {}", describe(e)),
            request_body: request_body.clone(),
            status: Some(status),
            response_body: String::new(),
        })?;
        if status != 200 {
            warn!(status, "agent answered with an error");
            return Err(AgentFailure {
                message: "agent did not answer 200".to_string(),
                request_body,
                status: Some(status),
                response_body,
            });
        }

        match serde_json::from_str::<Orders>(&response_body) {
            Ok(orders) => {
                trace!(orders = orders.len(), "received orders");
                Ok(orders)
            }
            Err(e) => {
                warn!("malformed orders: {e}");
                Err(AgentFailure {
                    message: format!("malformed orders: {e}"),
                    request_body,
                    status: Some(status),
                    response_body,
                })
            }
        }
    }
}
