//! Registry of client addresses granted passwordless access.
//!
//! Populated at startup from the static whitelist and at runtime by auth-once
//! promotions. Entries are never removed for the lifetime of the process.
//! Mostly read, rarely written; a linear scan is fine at the few hundred
//! entries this ever holds.

use std::net::IpAddr;

use parking_lot::RwLock;

use crate::addr::host_eq;

/// Thread-safe set of addresses that may skip password authentication.
#[derive(Debug, Default)]
pub struct AuthRegistry {
    ips: RwLock<Vec<IpAddr>>,
}

impl AuthRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with a whitelist.
    pub fn with_whitelist(ips: Vec<IpAddr>) -> Self {
        Self { ips: RwLock::new(ips) }
    }

    /// Check whether `ip` has been granted passwordless access.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.ips.read().iter().any(|known| host_eq(known, ip))
    }

    /// Grant `ip` passwordless access.
    pub fn insert(&self, ip: IpAddr) {
        self.ips.write().push(ip);
    }

    /// Grant `ip` passwordless access unless it already has it.
    ///
    /// The check and the insert happen under one writer lock, so two clients
    /// authenticating from the same address concurrently produce one entry.
    pub fn insert_if_absent(&self, ip: IpAddr) {
        let mut ips = self.ips.write();
        if !ips.iter().any(|known| host_eq(known, &ip)) {
            ips.push(ip);
        }
    }

    /// Number of registered addresses.
    pub fn len(&self) -> usize {
        self.ips.read().len()
    }

    /// Whether the registry holds no addresses.
    pub fn is_empty(&self) -> bool {
        self.ips.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry() {
        let reg = AuthRegistry::new();
        assert!(reg.is_empty());
        assert!(!reg.contains(&"10.0.0.5".parse().unwrap()));
    }

    #[test]
    fn test_insert_and_contains() {
        let reg = AuthRegistry::new();
        reg.insert("10.0.0.5".parse().unwrap());
        assert!(reg.contains(&"10.0.0.5".parse().unwrap()));
        assert!(!reg.contains(&"10.0.0.6".parse().unwrap()));
    }

    #[test]
    fn test_insert_if_absent_deduplicates() {
        let reg = AuthRegistry::new();
        reg.insert_if_absent("10.0.0.5".parse().unwrap());
        reg.insert_if_absent("10.0.0.5".parse().unwrap());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_whitelist_population() {
        let reg = AuthRegistry::with_whitelist(vec![
            "127.0.0.1".parse().unwrap(),
            "::1".parse().unwrap(),
        ]);
        assert_eq!(reg.len(), 2);
        assert!(reg.contains(&"127.0.0.1".parse().unwrap()));
        assert!(reg.contains(&"::1".parse().unwrap()));
    }

    #[test]
    fn test_families_do_not_alias() {
        let reg = AuthRegistry::new();
        reg.insert("::1".parse().unwrap());
        assert!(!reg.contains(&"127.0.0.1".parse().unwrap()));
    }
}
