//! Server configuration.

use std::net::IpAddr;

use crate::{DEFAULT_LISTEN_IP, DEFAULT_PORT};

/// Username/password pair for RFC 1929 authentication.
///
/// The fields exist together or not at all; a half-configured pair is an
/// argument error, not a configuration state.
#[derive(Clone)]
pub struct Credentials {
    /// Expected username.
    pub user: String,
    /// Expected password.
    pub pass: String,
}

/// Server configuration, assembled from the command line.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address the main listener binds to.
    pub listen_ip: String,
    /// Listen port, or the outbound port in connector mode.
    pub port: u16,
    /// Credentials required from unknown clients, when configured.
    pub credentials: Option<Credentials>,
    /// Address outbound target connections are bound to.
    pub bind_addr: Option<IpAddr>,
    /// Clients granted passwordless access from startup.
    pub whitelist: Vec<IpAddr>,
    /// Whitelist a client's address after its first successful password auth.
    pub auth_once: bool,
    /// Connector mode: dial out to this host instead of listening.
    pub connect_host: Option<String>,
    /// Relay-pair mode: second listener whose arrivals are paired with main
    /// listener arrivals without a SOCKS dialogue.
    pub relay_port: Option<u16>,
    /// Silence logging.
    pub quiet: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_ip: DEFAULT_LISTEN_IP.to_owned(),
            port: DEFAULT_PORT,
            credentials: None,
            bind_addr: None,
            whitelist: Vec::new(),
            auth_once: false,
            connect_host: None,
            relay_port: None,
            quiet: false,
        }
    }
}

impl ServerConfig {
    /// Create a configuration with the standard defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_ip.is_empty() {
            return Err("listen address cannot be empty".into());
        }
        if (self.auth_once || !self.whitelist.is_empty()) && self.credentials.is_none() {
            return Err("auth-once and whitelist modes require credentials".into());
        }
        Ok(())
    }
}
