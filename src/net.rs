//! Listening, dialing and socket tuning.
//!
//! Every accepted and every outbound connection gets the same tuning profile:
//! large socket buffers, TCP keepalive and Nagle disabled. Tuning failures are
//! logged and ignored; a connection that works untuned is still a connection.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::sleep;

use crate::addr;
use crate::error::{Error, Result};

/// Send and receive buffer size for proxied connections.
pub const SOCKET_BUF_SIZE: usize = 4 * 1024 * 1024;

/// Backoff cap for a standalone connector redial loop.
pub const DIAL_BACKOFF_CAP: Duration = Duration::from_secs(300);

/// Initial redial backoff; doubles up to the cap.
pub const DIAL_BACKOFF_START: Duration = Duration::from_secs(1);

/// First keepalive probe after this much idle time.
const KEEPALIVE_IDLE: Duration = Duration::from_secs(60);

/// Interval between keepalive probes.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Probes sent before the connection is declared dead.
const KEEPALIVE_RETRIES: u32 = 3;

/// Listen backlog. The kernel clamps this to its own maximum.
const LISTEN_BACKLOG: u32 = 4096;

/// Apply the tuning profile to a socket, logging and ignoring failures.
pub fn tune<'a, S>(sock: &'a S)
where
    SockRef<'a>: From<&'a S>,
{
    let sock = SockRef::from(sock);
    if let Err(e) = sock.set_send_buffer_size(SOCKET_BUF_SIZE) {
        tracing::debug!("set_send_buffer_size failed: {}", e);
    }
    if let Err(e) = sock.set_recv_buffer_size(SOCKET_BUF_SIZE) {
        tracing::debug!("set_recv_buffer_size failed: {}", e);
    }
    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_IDLE)
        .with_interval(KEEPALIVE_INTERVAL)
        .with_retries(KEEPALIVE_RETRIES);
    if let Err(e) = sock.set_tcp_keepalive(&keepalive) {
        tracing::debug!("set_tcp_keepalive failed: {}", e);
    }
    if let Err(e) = sock.set_nodelay(true) {
        tracing::debug!("set_nodelay failed: {}", e);
    }
}

/// Open a bound, listening, tuned endpoint on `ip:port`.
///
/// The resolver may yield several candidates; the first one that binds wins.
pub async fn listen(ip: &str, port: u16) -> Result<TcpListener> {
    let candidates = addr::resolve(ip, port)
        .await
        .map_err(|e| Error::Bind(format!("{ip}:{port}: {e}")))?;
    for sa in &candidates {
        match try_listen(*sa) {
            Ok(listener) => {
                tracing::debug!("listening on {}", sa);
                return Ok(listener);
            }
            Err(e) => tracing::debug!("listen on {} failed: {}", sa, e),
        }
    }
    Err(Error::Bind(format!("{ip}:{port}")))
}

fn try_listen(sa: SocketAddr) -> io::Result<TcpListener> {
    let socket = match sa {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    tune(&socket);
    socket.bind(sa)?;
    socket.listen(LISTEN_BACKLOG)
}

/// Dial `host:port`, trying each resolver candidate in order.
///
/// The connected stream comes back tuned. The last candidate's error
/// propagates when all of them fail.
pub async fn dial(host: &str, port: u16) -> io::Result<TcpStream> {
    let candidates = addr::resolve(host, port).await?;
    let mut last_err = None;
    for sa in candidates {
        let socket = match sa {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        // buffer sizes must be set before connect to take full effect
        tune(&socket);
        match socket.connect(sa).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no candidates to dial")))
}

/// Redial `host:port` until one connection succeeds, sleeping 1 s between
/// attempts and doubling up to `cap`.
pub async fn connect_with_backoff(host: &str, port: u16, cap: Duration) -> TcpStream {
    let mut delay = DIAL_BACKOFF_START;
    loop {
        match dial(host, port).await {
            Ok(stream) => return stream,
            Err(e) => {
                tracing::debug!("connect to {}:{} failed: {}, retrying in {:?}", host, port, e, delay);
                sleep(delay).await;
                delay = next_delay(delay, cap);
            }
        }
    }
}

/// One step of the exponential backoff schedule.
pub(crate) fn next_delay(delay: Duration, cap: Duration) -> Duration {
    (delay * 2).min(cap)
}
