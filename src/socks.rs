//! SOCKS5 wire protocol: message parsing, reply codes and error mapping.
//!
//! Covers the method-selection and request messages of RFC 1928 and the
//! username/password sub-negotiation of RFC 1929. Only the CONNECT command is
//! supported; BIND and UDP ASSOCIATE are rejected with the proper reply code.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// SOCKS protocol version.
pub const VERSION: u8 = 5;

/// Sub-negotiation version for username/password authentication.
pub const AUTH_VERSION: u8 = 1;

/// The CONNECT command; the only one this server accepts.
pub const CMD_CONNECT: u8 = 1;

/// Largest handshake message the parser accepts in one read.
pub const MAX_MESSAGE: usize = 1024;

const ATYP_V4: u8 = 1;
const ATYP_DOMAIN: u8 = 3;
const ATYP_V6: u8 = 4;

/// Authentication method selected during method negotiation.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication required.
    NoAuth = 0x00,
    /// RFC 1929 username/password.
    UserPass = 0x02,
    /// None of the proposed methods is acceptable; the client must close.
    NoAcceptable = 0xFF,
}

/// Reply code carried in byte 1 of a SOCKS5 reply.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    /// Request granted.
    Success = 0,
    /// General server failure; also used for DNS failures, which have no
    /// dedicated code in RFC 1928.
    GeneralFailure = 1,
    /// Connection not allowed by ruleset.
    NotAllowed = 2,
    /// Network unreachable.
    NetUnreachable = 3,
    /// Host unreachable.
    HostUnreachable = 4,
    /// Connection refused by the target.
    ConnectionRefused = 5,
    /// TTL expired (used for connect timeouts).
    TtlExpired = 6,
    /// Command other than CONNECT.
    CommandNotSupported = 7,
    /// Address type other than v4, v6 or domain.
    AddrTypeNotSupported = 8,
}

impl ReplyCode {
    /// Map an OS-level connect error to its SOCKS5 reply code.
    ///
    /// The mapping is total: anything unrecognized becomes a general failure.
    pub fn from_io_error(e: &io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut => ReplyCode::TtlExpired,
            io::ErrorKind::Unsupported => ReplyCode::AddrTypeNotSupported,
            io::ErrorKind::ConnectionRefused => ReplyCode::ConnectionRefused,
            io::ErrorKind::NetworkDown | io::ErrorKind::NetworkUnreachable => {
                ReplyCode::NetUnreachable
            }
            io::ErrorKind::HostUnreachable => ReplyCode::HostUnreachable,
            _ => ReplyCode::GeneralFailure,
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplyCode::Success => "success",
            ReplyCode::GeneralFailure => "general failure",
            ReplyCode::NotAllowed => "not allowed by ruleset",
            ReplyCode::NetUnreachable => "network unreachable",
            ReplyCode::HostUnreachable => "host unreachable",
            ReplyCode::ConnectionRefused => "connection refused",
            ReplyCode::TtlExpired => "TTL expired",
            ReplyCode::CommandNotSupported => "command not supported",
            ReplyCode::AddrTypeNotSupported => "address type not supported",
        };
        f.write_str(s)
    }
}

/// Target of a CONNECT request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// Numeric v4 or v6 address.
    Ip(SocketAddr),
    /// Hostname to be resolved server-side.
    Domain(String, u16),
}

impl TargetAddr {
    /// Host part as a resolvable string.
    pub fn host(&self) -> String {
        match self {
            TargetAddr::Ip(sa) => sa.ip().to_string(),
            TargetAddr::Domain(host, _) => host.clone(),
        }
    }

    /// Port part.
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(sa) => sa.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(sa) => write!(f, "{}", sa),
            TargetAddr::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

/// Parse a method-selection message, returning the proposed method list.
///
/// Returns `None` when the message is not a SOCKS5 greeting. The count byte
/// bounds the scan; a short message simply proposes fewer methods.
pub fn parse_methods(msg: &[u8]) -> Option<&[u8]> {
    if msg.len() < 2 || msg[0] != VERSION {
        return None;
    }
    let n_methods = msg[1] as usize;
    let end = (2 + n_methods).min(msg.len());
    Some(&msg[2..end])
}

/// Pick the authentication method for a client.
///
/// Proposed methods are scanned in order. NO_AUTH wins when the server has no
/// credentials, or when the client's address is already in the registry;
/// USERNAME_PASSWORD wins when credentials are configured and the client
/// proposes it.
pub fn select_method(methods: &[u8], creds_configured: bool, client_known: bool) -> AuthMethod {
    for &method in methods {
        match method {
            m if m == AuthMethod::NoAuth as u8 => {
                if !creds_configured || client_known {
                    return AuthMethod::NoAuth;
                }
            }
            m if m == AuthMethod::UserPass as u8 => {
                if creds_configured {
                    return AuthMethod::UserPass;
                }
            }
            _ => {}
        }
    }
    AuthMethod::NoAcceptable
}

/// Parse an RFC 1929 username/password message into its two fields.
///
/// Returns `None` on a wrong sub-version or any length inconsistency.
pub fn parse_userpass(msg: &[u8]) -> Option<(&[u8], &[u8])> {
    if msg.len() < 5 || msg[0] != AUTH_VERSION {
        return None;
    }
    let ulen = msg[1] as usize;
    if msg.len() < 2 + ulen + 2 {
        return None;
    }
    let plen = msg[2 + ulen] as usize;
    if msg.len() < 2 + ulen + 1 + plen {
        return None;
    }
    let user = &msg[2..2 + ulen];
    let pass = &msg[2 + ulen + 1..2 + ulen + 1 + plen];
    Some((user, pass))
}

/// Parse a CONNECT request into its target address.
///
/// Trailing bytes past the address are ignored, matching what permissive
/// clients send. Failures carry the reply code to send before closing.
pub fn parse_request(msg: &[u8]) -> Result<TargetAddr, ReplyCode> {
    if msg.len() < 5 || msg[0] != VERSION {
        return Err(ReplyCode::GeneralFailure);
    }
    if msg[1] != CMD_CONNECT {
        return Err(ReplyCode::CommandNotSupported);
    }
    if msg[2] != 0 {
        return Err(ReplyCode::GeneralFailure);
    }
    match msg[3] {
        ATYP_V4 => {
            if msg.len() < 10 {
                return Err(ReplyCode::GeneralFailure);
            }
            let ip = Ipv4Addr::new(msg[4], msg[5], msg[6], msg[7]);
            let port = u16::from_be_bytes([msg[8], msg[9]]);
            Ok(TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port)))
        }
        ATYP_V6 => {
            if msg.len() < 22 {
                return Err(ReplyCode::GeneralFailure);
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&msg[4..20]);
            let port = u16::from_be_bytes([msg[20], msg[21]]);
            Ok(TargetAddr::Ip(SocketAddr::new(
                IpAddr::V6(Ipv6Addr::from(octets)),
                port,
            )))
        }
        ATYP_DOMAIN => {
            let len = msg[4] as usize;
            if msg.len() < 7 + len {
                return Err(ReplyCode::GeneralFailure);
            }
            let host = std::str::from_utf8(&msg[5..5 + len])
                .map_err(|_| ReplyCode::GeneralFailure)?
                .to_owned();
            let port = u16::from_be_bytes([msg[5 + len], msg[6 + len]]);
            Ok(TargetAddr::Domain(host, port))
        }
        _ => Err(ReplyCode::AddrTypeNotSupported),
    }
}

/// Encode a CONNECT request for `target`.
///
/// The server never sends these; clients and the round-trip tests do.
pub fn encode_request(target: &TargetAddr) -> Vec<u8> {
    let mut buf = vec![VERSION, CMD_CONNECT, 0];
    match target {
        TargetAddr::Ip(SocketAddr::V4(sa)) => {
            buf.push(ATYP_V4);
            buf.extend_from_slice(&sa.ip().octets());
            buf.extend_from_slice(&sa.port().to_be_bytes());
        }
        TargetAddr::Ip(SocketAddr::V6(sa)) => {
            buf.push(ATYP_V6);
            buf.extend_from_slice(&sa.ip().octets());
            buf.extend_from_slice(&sa.port().to_be_bytes());
        }
        TargetAddr::Domain(host, port) => {
            buf.push(ATYP_DOMAIN);
            buf.push(host.len() as u8);
            buf.extend_from_slice(host.as_bytes());
            buf.extend_from_slice(&port.to_be_bytes());
        }
    }
    buf
}

/// Build the fixed-size reply for `code`.
///
/// The bound address is always IPv4 zero, regardless of how the target was
/// reached. Some clients depend on the resulting fixed length, so this must
/// not be replaced with the actual bound address.
pub fn reply_bytes(code: ReplyCode) -> [u8; 10] {
    [VERSION, code as u8, 0, ATYP_V4, 0, 0, 0, 0, 0, 0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_methods() {
        assert_eq!(parse_methods(&[5, 1, 0]), Some(&[0u8][..]));
        assert_eq!(parse_methods(&[5, 2, 0, 2]), Some(&[0u8, 2][..]));
        // count byte larger than the message proposes what is present
        assert_eq!(parse_methods(&[5, 4, 0]), Some(&[0u8][..]));
        assert_eq!(parse_methods(&[4, 1, 0]), None);
        assert_eq!(parse_methods(&[5]), None);
    }

    #[test]
    fn test_select_method_without_credentials() {
        assert_eq!(select_method(&[0], false, false), AuthMethod::NoAuth);
        assert_eq!(select_method(&[2, 0], false, false), AuthMethod::NoAuth);
        assert_eq!(select_method(&[2], false, false), AuthMethod::NoAcceptable);
    }

    #[test]
    fn test_select_method_with_credentials() {
        assert_eq!(select_method(&[0, 2], true, false), AuthMethod::UserPass);
        assert_eq!(select_method(&[0], true, false), AuthMethod::NoAcceptable);
        // a known client may skip the password
        assert_eq!(select_method(&[0], true, true), AuthMethod::NoAuth);
    }

    #[test]
    fn test_parse_userpass() {
        let mut msg = vec![1, 5];
        msg.extend_from_slice(b"alice");
        msg.push(6);
        msg.extend_from_slice(b"s3cret");
        let (user, pass) = parse_userpass(&msg).unwrap();
        assert_eq!(user, b"alice");
        assert_eq!(pass, b"s3cret");
    }

    #[test]
    fn test_parse_userpass_malformed() {
        assert_eq!(parse_userpass(&[2, 1, b'a', 1, b'b']), None);
        assert_eq!(parse_userpass(&[1, 10, b'a']), None);
        let mut msg = vec![1, 2];
        msg.extend_from_slice(b"ab");
        msg.push(200);
        msg.push(b'x');
        assert_eq!(parse_userpass(&msg), None);
    }

    #[test]
    fn test_request_roundtrip_v4() {
        let target = TargetAddr::Ip("127.0.0.1:80".parse().unwrap());
        assert_eq!(parse_request(&encode_request(&target)), Ok(target));
    }

    #[test]
    fn test_request_roundtrip_v6() {
        let target = TargetAddr::Ip("[2001:db8::1]:8443".parse().unwrap());
        assert_eq!(parse_request(&encode_request(&target)), Ok(target));
    }

    #[test]
    fn test_request_roundtrip_domain() {
        let target = TargetAddr::Domain("example.com".into(), 443);
        assert_eq!(parse_request(&encode_request(&target)), Ok(target));
    }

    #[test]
    fn test_request_trailing_bytes_ignored() {
        let mut msg = encode_request(&TargetAddr::Ip("127.0.0.1:80".parse().unwrap()));
        msg.extend_from_slice(b"junk");
        assert!(parse_request(&msg).is_ok());
    }

    #[test]
    fn test_request_rejections() {
        // BIND
        assert_eq!(
            parse_request(&[5, 2, 0, 3, 3, b'f', b'o', b'o', 0, 80]),
            Err(ReplyCode::CommandNotSupported)
        );
        // unknown address type
        assert_eq!(
            parse_request(&[5, 1, 0, 9, 0, 0, 0, 0, 0, 80]),
            Err(ReplyCode::AddrTypeNotSupported)
        );
        // bad version, nonzero reserved byte, truncated address
        assert_eq!(parse_request(&[4, 1, 0, 1, 0, 0, 0, 0, 0, 80]), Err(ReplyCode::GeneralFailure));
        assert_eq!(parse_request(&[5, 1, 1, 1, 0, 0, 0, 0, 0, 80]), Err(ReplyCode::GeneralFailure));
        assert_eq!(parse_request(&[5, 1, 0, 1, 127, 0]), Err(ReplyCode::GeneralFailure));
    }

    #[test]
    fn test_io_error_mapping_is_total() {
        use io::ErrorKind::*;
        let cases = [
            (TimedOut, ReplyCode::TtlExpired),
            (Unsupported, ReplyCode::AddrTypeNotSupported),
            (ConnectionRefused, ReplyCode::ConnectionRefused),
            (NetworkDown, ReplyCode::NetUnreachable),
            (NetworkUnreachable, ReplyCode::NetUnreachable),
            (HostUnreachable, ReplyCode::HostUnreachable),
            // everything unrecognized collapses to a general failure
            (NotFound, ReplyCode::GeneralFailure),
            (PermissionDenied, ReplyCode::GeneralFailure),
            (BrokenPipe, ReplyCode::GeneralFailure),
            (Other, ReplyCode::GeneralFailure),
        ];
        for (kind, expected) in cases {
            let err = io::Error::new(kind, "x");
            assert_eq!(ReplyCode::from_io_error(&err), expected, "{kind:?}");
            // deterministic
            assert_eq!(ReplyCode::from_io_error(&err), ReplyCode::from_io_error(&err));
        }
    }

    #[test]
    fn test_reply_bytes_fixed_shape() {
        assert_eq!(reply_bytes(ReplyCode::Success), [5, 0, 0, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            reply_bytes(ReplyCode::CommandNotSupported),
            [5, 7, 0, 1, 0, 0, 0, 0, 0, 0]
        );
    }
}
