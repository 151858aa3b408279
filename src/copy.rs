//! Bidirectional byte pump for established sessions.
//!
//! After the handshake the proxy is a dumb pipe: whatever one side sends is
//! written to the other, unaltered and in order. One side reaching EOF
//! half-closes the session; the other direction keeps draining until it too
//! ends. Sessions idle in both directions for 15 minutes are reaped; programs
//! usually send keepalives, so this only fires on genuinely abandoned
//! connections.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::server::stats::ByteCounters;

/// Idle limit for the bidirectional phase.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Read buffer size for the pump.
const BUF_SIZE: usize = 16 * 1024;

enum Side {
    Client(io::Result<usize>),
    Remote(io::Result<usize>),
}

enum Direction {
    Inbound,
    Outbound,
}

/// Pump bytes between a client stream and its remote until the session ends.
///
/// Writes toward the remote count as outbound, toward the client as inbound.
/// An idle timeout ends the session cleanly; read or write errors end it with
/// the error. Both streams close when they are dropped on return.
pub async fn pump<C, R>(client: C, remote: R, counters: &ByteCounters) -> io::Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut remote_rd, mut remote_wr) = tokio::io::split(remote);
    let mut to_remote = vec![0u8; BUF_SIZE];
    let mut to_client = vec![0u8; BUF_SIZE];

    loop {
        let event = timeout(IDLE_TIMEOUT, async {
            tokio::select! {
                n = client_rd.read(&mut to_remote) => Side::Client(n),
                n = remote_rd.read(&mut to_client) => Side::Remote(n),
            }
        })
        .await;

        match event {
            // idle in both directions
            Err(_) => return Ok(()),
            Ok(Side::Client(n)) => {
                let n = n?;
                if n == 0 {
                    remote_wr.shutdown().await.ok();
                    return drain(remote_rd, client_wr, counters, Direction::Inbound).await;
                }
                remote_wr.write_all(&to_remote[..n]).await?;
                counters.add_outbound(n as u64);
            }
            Ok(Side::Remote(n)) => {
                let n = n?;
                if n == 0 {
                    client_wr.shutdown().await.ok();
                    return drain(client_rd, remote_wr, counters, Direction::Outbound).await;
                }
                client_wr.write_all(&to_client[..n]).await?;
                counters.add_inbound(n as u64);
            }
        }
    }
}

/// Forward the still-open direction of a half-closed session, without an idle
/// limit, until EOF or error.
async fn drain<R, W>(
    mut rd: R,
    mut wr: W,
    counters: &ByteCounters,
    direction: Direction,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = rd.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        wr.write_all(&buf[..n]).await?;
        match direction {
            Direction::Inbound => counters.add_inbound(n as u64),
            Direction::Outbound => counters.add_outbound(n as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_pump_relays_both_directions_in_order() {
        let (mut client_far, client_near) = tokio::io::duplex(64);
        let (mut remote_far, remote_near) = tokio::io::duplex(64);
        let counters = Arc::new(ByteCounters::new());

        let pump_counters = Arc::clone(&counters);
        let session =
            tokio::spawn(async move { pump(client_near, remote_near, &pump_counters).await });

        client_far.write_all(b"GET /").await.unwrap();
        client_far.write_all(b" HTTP").await.unwrap();
        let mut buf = [0u8; 10];
        remote_far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"GET / HTTP");

        remote_far.write_all(b"200 OK").await.unwrap();
        let mut buf = [0u8; 6];
        client_far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"200 OK");

        assert_eq!(counters.take_outbound(), 10);
        assert_eq!(counters.take_inbound(), 6);

        drop(client_far);
        drop(remote_far);
        session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_pump_half_close_keeps_draining() {
        let (mut client_far, client_near) = tokio::io::duplex(64);
        let (mut remote_far, remote_near) = tokio::io::duplex(64);
        let counters = Arc::new(ByteCounters::new());

        let pump_counters = Arc::clone(&counters);
        let session =
            tokio::spawn(async move { pump(client_near, remote_near, &pump_counters).await });

        // client half-closes; the remote must see EOF on its read side
        client_far.shutdown().await.unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(remote_far.read(&mut buf).await.unwrap(), 0);

        // the remote-to-client direction still flows
        remote_far.write_all(b"late reply").await.unwrap();
        let mut buf = [0u8; 10];
        client_far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"late reply");

        drop(remote_far);
        session.await.unwrap().unwrap();
        assert_eq!(counters.take_inbound(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_reaps_idle_session() {
        let (client_far, client_near) = tokio::io::duplex(64);
        let (remote_far, remote_near) = tokio::io::duplex(64);
        let counters = ByteCounters::new();

        // both far ends stay open and silent; only the idle clock moves
        let outcome = pump(client_near, remote_near, &counters).await;
        assert!(outcome.is_ok());
        drop(client_far);
        drop(remote_far);
    }

    #[tokio::test]
    async fn test_pump_write_error_ends_session() {
        let (mut client_far, client_near) = tokio::io::duplex(64);
        let (remote_far, remote_near) = tokio::io::duplex(64);
        let counters = ByteCounters::new();

        // the remote is gone; forwarding the client's bytes must fail
        drop(remote_far);
        client_far.write_all(b"doomed").await.unwrap();
        let outcome = pump(client_near, remote_near, &counters).await;
        assert!(outcome.is_err());
    }
}
