//! Connection supervision.
//!
//! The supervisor obtains one client stream per iteration — by accepting on
//! the main listener, or by dialing out in connector mode — and hands it to a
//! worker task. Workers run the handshake (or pair the stream with a relay
//! arrival) and then the copy loop; the supervisor reaps finished workers at
//! the top of every iteration. There is no shutdown path; the process runs
//! until killed.

mod config;
pub mod stats;

pub use config::{Credentials, ServerConfig};
pub use stats::ByteCounters;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::auth::AuthRegistry;
use crate::copy;
use crate::error::Result;
use crate::handshake;
use crate::net;

/// Pause after accept failure, capping CPU under resource exhaustion.
const FAILURE_PAUSE: Duration = Duration::from_micros(64);

/// Backoff cap for the supervisor's per-connection redial in connector mode.
const ACCEPT_RETRY_CAP: Duration = Duration::from_secs(60);

/// State shared between the supervisor and its workers.
struct Context {
    config: ServerConfig,
    /// Present when auth-once or a whitelist is active.
    registry: Option<Arc<AuthRegistry>>,
    counters: Arc<ByteCounters>,
}

/// The proxy server.
pub struct Server {
    ctx: Arc<Context>,
}

impl Server {
    /// Create a server from a validated configuration.
    pub fn new(config: ServerConfig) -> Self {
        let registry = if config.auth_once || !config.whitelist.is_empty() {
            Some(Arc::new(AuthRegistry::with_whitelist(config.whitelist.clone())))
        } else {
            None
        };
        Self {
            ctx: Arc::new(Context {
                config,
                registry,
                counters: Arc::new(ByteCounters::new()),
            }),
        }
    }

    /// Run the server until the process is killed.
    ///
    /// Binds the listeners for the configured mode, starts the statistics
    /// reporter, then supervises workers forever. Only setup can fail.
    pub async fn run(&self) -> Result<()> {
        let relay = match self.ctx.config.relay_port {
            Some(port) => {
                let listener = net::listen(&self.ctx.config.listen_ip, port).await?;
                tracing::info!("relay listener on {}:{}", self.ctx.config.listen_ip, port);
                Some(Arc::new(listener))
            }
            None => None,
        };

        tokio::spawn(stats::run_reporter(Arc::clone(&self.ctx.counters)));

        match self.ctx.config.connect_host.clone() {
            Some(host) => {
                tracing::info!("connector mode, dialing {}:{}", host, self.ctx.config.port);
                self.connector_loop(&host, relay).await
            }
            None => {
                let listener =
                    net::listen(&self.ctx.config.listen_ip, self.ctx.config.port).await?;
                tracing::info!(
                    "listening on {}:{}",
                    self.ctx.config.listen_ip,
                    self.ctx.config.port
                );
                self.accept_loop(listener, relay).await
            }
        }
    }

    /// Ordinary and relay-pair modes: accept clients on the main listener.
    async fn accept_loop(
        &self,
        listener: TcpListener,
        relay: Option<Arc<TcpListener>>,
    ) -> Result<()> {
        let mut workers = JoinSet::new();
        loop {
            reap(&mut workers);

            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("failed to accept connection: {}", e);
                    tokio::time::sleep(FAILURE_PAUSE).await;
                    continue;
                }
            };
            net::tune(&stream);

            let ctx = Arc::clone(&self.ctx);
            let relay = relay.clone();
            workers.spawn(handle_client(ctx, stream, peer.ip(), relay));
        }
    }

    /// Connector mode: dial out to the peer for every session instead of
    /// accepting.
    async fn connector_loop(&self, host: &str, relay: Option<Arc<TcpListener>>) -> Result<()> {
        let mut workers = JoinSet::new();
        loop {
            reap(&mut workers);

            let stream =
                net::connect_with_backoff(host, self.ctx.config.port, ACCEPT_RETRY_CAP).await;
            let peer = match stream.peer_addr() {
                Ok(sa) => sa.ip(),
                Err(e) => {
                    tracing::warn!("connector peer lookup failed: {}", e);
                    tokio::time::sleep(FAILURE_PAUSE).await;
                    continue;
                }
            };
            // hold the back-connection until the paired side sends its first
            // byte or closes
            stream.readable().await.ok();

            let ctx = Arc::clone(&self.ctx);
            let relay = relay.clone();
            workers.spawn(handle_client(ctx, stream, peer, relay));
        }
    }
}

/// Join every worker whose session has completed.
fn reap(workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.try_join_next() {
        if let Err(e) = joined {
            tracing::debug!("worker task failed: {}", e);
        }
    }
}

/// One worker: obtain a remote stream, then pump until the session ends.
///
/// Both streams close on drop when this returns; errors stay local to the
/// worker.
async fn handle_client(
    ctx: Arc<Context>,
    mut stream: TcpStream,
    peer: IpAddr,
    relay: Option<Arc<TcpListener>>,
) {
    let remote = match relay {
        // relay-pair mode: the next relay arrival is the remote end and no
        // SOCKS dialogue happens on either stream
        Some(relay) => match relay.accept().await {
            Ok((remote, _)) => {
                net::tune(&remote);
                remote
            }
            Err(e) => {
                tracing::warn!("relay accept failed: {}", e);
                return;
            }
        },
        None => {
            match handshake::run(&mut stream, peer, &ctx.config, ctx.registry.as_deref()).await {
                Ok(remote) => remote,
                Err(e) => {
                    tracing::debug!("client {}: handshake failed: {}", peer, e);
                    return;
                }
            }
        }
    };

    if let Err(e) = copy::pump(stream, remote, &ctx.counters).await {
        tracing::debug!("client {}: session ended: {}", peer, e);
    }
}
