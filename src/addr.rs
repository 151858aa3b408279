//! Address resolution and candidate selection.
//!
//! The resolver may return candidates of several families for one host; the
//! listener and the target dialer iterate them in order, optionally preferring
//! the family of a configured bind address.

use std::io;
use std::net::{IpAddr, SocketAddr};

use tokio::net::lookup_host;

/// Resolve a host/port pair into a list of candidate endpoints.
///
/// Numeric IPv4/IPv6 literals take the non-blocking fast path; everything else
/// goes through the system resolver.
pub async fn resolve(host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    let candidates: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();
    if candidates.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {host}"),
        ));
    }
    Ok(candidates)
}

/// Resolve a host to a single address, taking the first candidate.
///
/// Used for CLI arguments (`-b`, `-w`) where one address is wanted.
pub async fn resolve_one(host: &str) -> io::Result<IpAddr> {
    Ok(resolve(host, 0).await?[0].ip())
}

/// Pick the first candidate matching the family of `prefer`, or the head of
/// the list when no preference applies.
pub fn choose(candidates: &[SocketAddr], prefer: Option<IpAddr>) -> SocketAddr {
    match prefer {
        Some(ip) => candidates
            .iter()
            .copied()
            .find(|c| c.is_ipv4() == ip.is_ipv4())
            .unwrap_or(candidates[0]),
        None => candidates[0],
    }
}

/// Address equality over the raw host bytes of matching families.
///
/// Ports never participate; a v4 address never equals a v6 one.
pub fn host_eq(a: &IpAddr, b: &IpAddr) -> bool {
    match (a, b) {
        (IpAddr::V4(a), IpAddr::V4(b)) => a.octets() == b.octets(),
        (IpAddr::V6(a), IpAddr::V6(b)) => a.octets() == b.octets(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[tokio::test]
    async fn test_resolve_numeric_v4() {
        let addrs = resolve("127.0.0.1", 1080).await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:1080".parse().unwrap()]);
    }

    #[tokio::test]
    async fn test_resolve_numeric_v6() {
        let addrs = resolve("::1", 443).await.unwrap();
        assert_eq!(addrs, vec!["[::1]:443".parse().unwrap()]);
    }

    #[tokio::test]
    async fn test_resolve_one_ignores_port() {
        let ip = resolve_one("10.1.2.3").await.unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)));
    }

    #[test]
    fn test_choose_prefers_matching_family() {
        let candidates: Vec<SocketAddr> = vec![
            "[2001:db8::1]:80".parse().unwrap(),
            "192.0.2.1:80".parse().unwrap(),
        ];
        let prefer = Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(choose(&candidates, prefer), candidates[1]);
    }

    #[test]
    fn test_choose_falls_back_to_head() {
        let candidates: Vec<SocketAddr> = vec!["[2001:db8::1]:80".parse().unwrap()];
        let prefer = Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(choose(&candidates, prefer), candidates[0]);

        assert_eq!(choose(&candidates, None), candidates[0]);
    }

    #[test]
    fn test_host_eq_same_family() {
        let a: IpAddr = "10.0.0.5".parse().unwrap();
        let b: IpAddr = "10.0.0.5".parse().unwrap();
        let c: IpAddr = "10.0.0.6".parse().unwrap();
        assert!(host_eq(&a, &b));
        assert!(!host_eq(&a, &c));
    }

    #[test]
    fn test_host_eq_cross_family() {
        // a v4-mapped v6 address is not byte-equal to its v4 form
        let v4: IpAddr = "127.0.0.1".parse().unwrap();
        let v6: IpAddr = IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0x7f00, 1));
        assert!(!host_eq(&v4, &v6));
    }
}
