//! The SOCKS5 handshake state machine.
//!
//! Three states, advancing only forward: method selection, the optional
//! RFC 1929 credential exchange, then the CONNECT request. Each state consumes
//! one message per read; well-behaved SOCKS clients send whole messages and
//! wait for the reply before the next one, so a read boundary is a message
//! boundary here. A read that does not parse as the current state's message
//! fails the handshake.

use std::net::IpAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::auth::AuthRegistry;
use crate::error::{Error, Result};
use crate::server::ServerConfig;
use crate::socks::{self, AuthMethod, ReplyCode};
use crate::target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connected,
    NeedAuth,
    Authed,
}

/// Drive the handshake on a client stream to completion.
///
/// On success the CONNECT target has been dialed, the success reply sent, and
/// the connected stream is returned for the copy loop. Every failure path has
/// already written whatever reply the protocol calls for; the caller just
/// drops the client stream.
pub async fn run<S>(
    stream: &mut S,
    peer: IpAddr,
    config: &ServerConfig,
    registry: Option<&AuthRegistry>,
) -> Result<TcpStream>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut state = State::Connected;
    let mut buf = [0u8; socks::MAX_MESSAGE];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::Closed);
        }
        let msg = &buf[..n];

        match state {
            State::Connected => {
                let method = match socks::parse_methods(msg) {
                    Some(methods) => {
                        let known = registry.is_some_and(|r| r.contains(&peer));
                        socks::select_method(methods, config.credentials.is_some(), known)
                    }
                    None => AuthMethod::NoAcceptable,
                };
                stream.write_all(&[socks::VERSION, method as u8]).await?;
                state = match method {
                    AuthMethod::NoAuth => State::Authed,
                    AuthMethod::UserPass => State::NeedAuth,
                    AuthMethod::NoAcceptable => return Err(Error::Authentication),
                };
            }

            State::NeedAuth => {
                let accepted = match (socks::parse_userpass(msg), &config.credentials) {
                    (Some((user, pass)), Some(creds)) => {
                        user == creds.user.as_bytes() && pass == creds.pass.as_bytes()
                    }
                    _ => false,
                };
                let status = if accepted { 0 } else { 1 };
                stream.write_all(&[socks::AUTH_VERSION, status]).await?;
                if !accepted {
                    return Err(Error::Authentication);
                }
                state = State::Authed;
                if config.auth_once {
                    if let Some(registry) = registry {
                        registry.insert_if_absent(peer);
                    }
                }
            }

            State::Authed => {
                let target_addr = match socks::parse_request(msg) {
                    Ok(target_addr) => target_addr,
                    Err(code) => {
                        stream.write_all(&socks::reply_bytes(code)).await?;
                        return Err(Error::Rejected(code));
                    }
                };
                return match target::connect(&target_addr, config.bind_addr).await {
                    Ok(remote) => {
                        stream.write_all(&socks::reply_bytes(ReplyCode::Success)).await?;
                        tracing::info!("client {}: connected to {}", peer, target_addr);
                        Ok(remote)
                    }
                    Err(code) => {
                        stream.write_all(&socks::reply_bytes(code)).await?;
                        Err(Error::Rejected(code))
                    }
                };
            }
        }
    }
}
