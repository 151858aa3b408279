//! Outbound connections to CONNECT targets.
//!
//! Resolution and connect failures are mapped to SOCKS5 reply codes here, so
//! the handshake only ever sees something it can put on the wire.

use std::net::{IpAddr, SocketAddr};

use tokio::net::{TcpSocket, TcpStream};

use crate::addr;
use crate::net;
use crate::socks::{ReplyCode, TargetAddr};

/// Resolve and connect to the requested target.
///
/// When a bind address is configured and its family matches the chosen
/// candidate, the outbound socket is bound to it first. Errors come back as
/// the reply code to send to the client.
pub async fn connect(target: &TargetAddr, bind_addr: Option<IpAddr>) -> Result<TcpStream, ReplyCode> {
    let candidates = match target {
        TargetAddr::Ip(sa) => vec![*sa],
        // RFC 1928 has no reply code for a failed lookup
        TargetAddr::Domain(host, port) => addr::resolve(host, *port)
            .await
            .map_err(|_| ReplyCode::GeneralFailure)?,
    };
    let sa = addr::choose(&candidates, bind_addr);

    let socket = match sa {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(|e| ReplyCode::from_io_error(&e))?;
    net::tune(&socket);

    if let Some(bind_ip) = bind_addr {
        if bind_ip.is_ipv4() == sa.is_ipv4() {
            socket
                .bind(SocketAddr::new(bind_ip, 0))
                .map_err(|e| ReplyCode::from_io_error(&e))?;
        }
    }

    socket
        .connect(sa)
        .await
        .map_err(|e| ReplyCode::from_io_error(&e))
}
