//! Readiness polling
//!
//! A plain TCP dial against the server's client address. The connection is
//! closed right away; no protocol is spoken.

use super::Server;
use crate::config::{ConfigError, Network};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::trace;

/// Pause between connection attempts
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);

impl Server {
    /// Whether the server accepts connections within `timeout`
    ///
    /// Returns `false` once `timeout` has elapsed without a successful dial.
    pub async fn ready_for_connections(&self, timeout: Duration) -> bool {
        let network = self.config().network;
        poll_ready(timeout, |limit| {
            let address = self.client_addr();
            let network = network.clone();
            async move { dial(&network, &address, limit).await }
        })
        .await
    }
}

/// Repeat `attempt` until it succeeds or `timeout` elapses
///
/// Each attempt receives the time left before the deadline. Attempts are
/// spaced by [`POLL_INTERVAL`]; once less than one interval remains, a last
/// attempt is made right away instead of sleeping.
pub async fn poll_ready<F, Fut>(timeout: Duration, mut attempt: F) -> bool
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match attempt(remaining).await {
            Ok(()) => return true,
            Err(e) => trace!(error = %e, "Not ready yet"),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        if remaining <= POLL_INTERVAL {
            return attempt(remaining).await.is_ok();
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Open and immediately close one TCP connection, giving up after `limit`
///
/// Name resolution counts against `limit` as well.
pub(super) async fn dial(network: &str, address: &str, limit: Duration) -> io::Result<()> {
    let network: Network = network
        .parse()
        .map_err(|e: ConfigError| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let attempt = async {
        let mut target = super::transport::resolve(network, address, network.loopback())
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::AddrNotAvailable, e))?;
        // A listener on 0.0.0.0 or [::] is reached through loopback
        if target.ip().is_unspecified() {
            let loopback = match target {
                std::net::SocketAddr::V4(_) => Network::Tcp4.loopback(),
                std::net::SocketAddr::V6(_) => Network::Tcp6.loopback(),
            };
            target.set_ip(loopback);
        }
        TcpStream::connect(target).await
    };

    match tokio::time::timeout(limit, attempt).await {
        Ok(stream) => {
            drop(stream?);
            Ok(())
        }
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connecting to {} timed out", address),
        )),
    }
}
