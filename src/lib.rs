//! # backsocks
//!
//! A small, multithreaded SOCKS5 proxy server (RFC 1928, RFC 1929) with a
//! reverse operating mode for hosts that cannot accept inbound connections.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Supervisor                            │
//! │   accept / dial-out  →  worker per connection  →  reap       │
//! ├──────────────────────────────────────────────────────────────┤
//! │   Handshake (method selection, RFC 1929 auth, CONNECT)       │
//! ├──────────────────────────────────────────────────────────────┤
//! │   Target dialer (resolve, bind, connect, reply mapping)      │
//! ├──────────────────────────────────────────────────────────────┤
//! │   Copy loop (half-close aware pump, idle reaping, counters)  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Operating modes
//!
//! 1. **Listen** (default): accept SOCKS5 clients, authenticate, dial the
//!    requested target, pump bytes.
//! 2. **Connector**: dial out to a peer instead of listening, then serve the
//!    SOCKS dialogue over the established back-connection. For proxies running
//!    behind firewalls that block inbound connections.
//! 3. **Relay pair**: run a second listener whose arrivals are paired with
//!    main-listener arrivals as raw byte pipes, forming the public end of a
//!    reverse tunnel.
//!
//! Clients may authenticate with a username/password pair; addresses on the
//! whitelist, or promoted by auth-once after their first successful login,
//! skip authentication entirely.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod addr;
pub mod auth;
pub mod copy;
pub mod error;
pub mod handshake;
pub mod net;
pub mod server;
pub mod socks;
pub mod target;

pub use error::{Error, Result};
pub use server::{Server, ServerConfig};

/// Default listen address.
pub const DEFAULT_LISTEN_IP: &str = "0.0.0.0";

/// Default SOCKS port.
pub const DEFAULT_PORT: u16 = 1080;
