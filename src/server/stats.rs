//! Throughput accounting and the minute-aligned statistics reporter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;

/// Session byte counters shared by all workers.
///
/// Updated with relaxed ordering; the numbers are advisory. Which counter a
/// write lands in follows the copy loop's notion of direction, which can skew
/// between simultaneous sessions.
#[derive(Debug, Default)]
pub struct ByteCounters {
    inbound: AtomicU64,
    outbound: AtomicU64,
}

impl ByteCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Account bytes written toward the client.
    pub fn add_inbound(&self, n: u64) {
        self.inbound.fetch_add(n, Ordering::Relaxed);
    }

    /// Account bytes written toward the target.
    pub fn add_outbound(&self, n: u64) {
        self.outbound.fetch_add(n, Ordering::Relaxed);
    }

    /// Take and reset the inbound count.
    pub fn take_inbound(&self) -> u64 {
        self.inbound.swap(0, Ordering::Relaxed)
    }

    /// Take and reset the outbound count.
    pub fn take_outbound(&self) -> u64 {
        self.outbound.swap(0, Ordering::Relaxed)
    }
}

/// Per-minute byte count as a rounded kbytes-per-second rate.
fn kbyte_rate(n: u64) -> u64 {
    (n + 30_000) / 60_000
}

/// Log a one-line throughput summary each minute, aligned to the wall clock.
///
/// Minutes with no traffic in either direction log nothing.
pub async fn run_reporter(counters: Arc<ByteCounters>) {
    loop {
        let now = Local::now();
        let bytes_out = counters.take_outbound();
        let bytes_in = counters.take_inbound();
        if bytes_in != 0 || bytes_out != 0 {
            tracing::info!(
                "{} in {} ({} kbyte/s) out {} ({} kbyte/s)",
                now.format("%a %b %e %H:%M:%S %Y"),
                bytes_in,
                kbyte_rate(bytes_in),
                bytes_out,
                kbyte_rate(bytes_out),
            );
        }
        let until_minute = 60 - now.timestamp().rem_euclid(60) as u64;
        tokio::time::sleep(Duration::from_secs(until_minute)).await;
    }
}
