use std::io::Read;
use std::net::{SocketAddr, ToSocketAddrs};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, error, instrument, trace, warn};

use super::Ai;
use crate::protocol::OrderRequest;

/// Serves an [`Ai`] over HTTP until dropped.
///
/// Every request is answered on its own thread.
pub struct AgentServer {
    addr: SocketAddr,
    server: Arc<Server>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AgentServer {
    const POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// Serve `ai` on a free local port.
    pub fn spawn<A: Ai + 'static>(ai: A) -> anyhow::Result<AgentServer> {
        Self::bind("127.0.0.1:0", ai)
    }

    pub fn bind<A: Ai + 'static>(addr: impl ToSocketAddrs, ai: A) -> anyhow::Result<AgentServer> {
        let server = Server::http(addr).map_err(|e| anyhow!("could not bind agent server: {e}"))?;
        let addr = server
            .server_addr()
            .to_ip()
            .context("agent server is not listening on an ip address")?;
        let server = Arc::new(server);

        let shutdown = Arc::new(AtomicBool::new(false));
        let ai: Arc<dyn Ai> = Arc::new(ai);
        let handle = {
            let server = server.clone();
            let stop = shutdown.clone();
            thread::Builder::new()
                .name(format!("agent-server-{}", addr.port()))
                .spawn(move || serve(&server, ai, &stop))
                .context("could not spawn server thread")?
        };
        debug!(%addr, "agent server listening");

        Ok(AgentServer {
            addr,
            server,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The url to register with the hub.
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

impl std::fmt::Debug for AgentServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentServer").field("addr", &self.addr).finish()
    }
}

impl Drop for AgentServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(addr = %self.addr, "server thread panicked");
            }
        }
    }
}

fn serve(server: &Server, ai: Arc<dyn Ai>, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Relaxed) {
        match server.recv_timeout(AgentServer::POLL_INTERVAL) {
            Ok(Some(request)) => {
                let ai = ai.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_request(request, ai.as_ref()) {
                        warn!("request failed: {e:#}");
                    }
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!("receiving request failed: {e}");
                thread::sleep(AgentServer::POLL_INTERVAL);
            }
        }
    }
    trace!("server loop stopped");
}

#[instrument(skip_all)]
fn handle_request(mut request: Request, ai: &dyn Ai) -> anyhow::Result<()> {
    let (status, content_type, body) = match answer(&mut request, ai) {
        Ok(body) => (200u16, "application/json; charset=UTF-8", body),
        Err(e) => {
            warn!("error delivering orders: {e:#}");
            (500, "text/plain; charset=UTF-8", format!("{e:#}"))
        }
    };
    let content_type = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
        .map_err(|()| anyhow!("invalid content type {content_type}"))?;
    request
        .respond(
            Response::from_string(body)
                .with_status_code(status)
                .with_header(content_type),
        )
        .context("I/O error while answering")
}

fn answer(request: &mut Request, ai: &dyn Ai) -> anyhow::Result<String> {
    if request.method() != &Method::Post {
        bail!("expected POST, got {}", request.method());
    }
    let mut body = String::new();
    request
        .as_reader()
        .read_to_string(&mut body)
        .context("I/O error while reading the order request")?;
    let order_request: OrderRequest =
        serde_json::from_str(&body).context("malformed order request")?;
    let orders = panic::catch_unwind(AssertUnwindSafe(|| ai.orders(&order_request)))
        .map_err(|cause| {
            let message = cause
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| cause.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            anyhow!("agent panicked: {message}")
        })??;
    trace!(orders = orders.len(), "answering");
    serde_json::to_string(&orders).context("encoding orders")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::ai::{Broken, Simpleton};
    use crate::client_handler::{AgentClient, HttpAgentClient};
    use crate::ids::GameId;
    use crate::world::{Node, Order, Orders, World};

    fn request() -> OrderRequest {
        let mut world = World::new();
        world.add(Node::new("a", 10));
        OrderRequest {
            acting_player_id: "me".into(),
            game_id: GameId::from("g"),
            turn_ordinal: 7,
            world_snapshot: Arc::new(world),
            players: BTreeMap::new(),
        }
    }

    #[test]
    fn serves_orders() {
        let server = AgentServer::spawn(|request: &OrderRequest| -> anyhow::Result<Orders> {
            Ok(vec![Order {
                src: "a".into(),
                dst: "b".into(),
                units: request.turn_ordinal as i64,
            }])
        })
        .unwrap();
        let client = HttpAgentClient::new(Duration::from_secs(5)).unwrap();
        let orders = client.request_orders(&server.url(), &request()).unwrap();
        assert_eq!(orders[0].units, 7);
    }

    #[test]
    fn errors_and_panics_are_500() {
        let client = HttpAgentClient::new(Duration::from_secs(5)).unwrap();

        let broken = AgentServer::spawn(Broken).unwrap();
        let failure = client.request_orders(&broken.url(), &request()).unwrap_err();
        assert_eq!(failure.status, Some(500));
        assert!(failure.response_body.contains("Oh noes"));

        let panicking = AgentServer::spawn(|_: &OrderRequest| -> anyhow::Result<Orders> {
            panic!("lost my marbles")
        })
        .unwrap();
        let failure = client.request_orders(&panicking.url(), &request()).unwrap_err();
        assert_eq!(failure.status, Some(500));
        assert!(failure.response_body.contains("lost my marbles"));
    }

    #[test]
    fn stops_on_drop() {
        let server = AgentServer::spawn(Simpleton).unwrap();
        let url = server.url();
        drop(server);
        let client = HttpAgentClient::new(Duration::from_millis(500)).unwrap();
        assert!(client.request_orders(&url, &request()).is_err());
    }

    #[test]
    fn serves_over_ipv6() {
        // not every sandbox has an IPv6 loopback
        let Ok(server) = AgentServer::bind("[::1]:0", Simpleton) else {
            return;
        };
        assert!(server.url().starts_with("http://[::1]:"), "{}", server.url());
        let client = HttpAgentClient::new(Duration::from_secs(5)).unwrap();
        assert!(client.request_orders(&server.url(), &request()).unwrap().is_empty());
    }

    #[test]
    fn only_post_is_answered() {
        let server = AgentServer::spawn(Simpleton).unwrap();
        let response = reqwest::blocking::get(server.url()).unwrap();
        assert_eq!(response.status().as_u16(), 500);
        assert!(response.text().unwrap().contains("expected POST"));
    }
}
