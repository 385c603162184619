//! Listener binding and the two serving modes
//!
//! - Plaintext: HTTP/1.1 and HTTP/2 with prior knowledge (h2c) on one socket,
//!   so gRPC clients work without TLS.
//! - TLS: rustls termination with ALPN, then the same HTTP/1.1 + HTTP/2
//!   connection handling.
//!
//! Both modes block until the listener fails or the shutdown future resolves
//! and in-flight connections have drained.

use crate::config::{split_host_port, ConfigError, Network};
use axum_server::tls_rustls::RustlsConfig;
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::make::Shared;
use tracing::debug;

/// Suffix of an address asking for an OS-assigned port
pub const EPHEMERAL_PORT_SUFFIX: &str = ":0";

#[derive(Debug, Error)]
pub enum BindError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no {network} address found for host {host}")]
    NoAddress { network: Network, host: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Resolve `address` for `network` to one socket address
///
/// An empty host resolves to `empty_host` for the family. IP literals are
/// used as is; names go through the system resolver.
pub async fn resolve(
    network: Network,
    address: &str,
    empty_host: IpAddr,
) -> Result<SocketAddr, BindError> {
    let (host, port) = split_host_port(address)?;

    if host.is_empty() {
        return Ok(SocketAddr::new(empty_host, port));
    }

    let candidates: Vec<SocketAddr> = match host.parse::<IpAddr>() {
        Ok(ip) => vec![SocketAddr::new(ip, port)],
        Err(_) => tokio::net::lookup_host((host, port)).await?.collect(),
    };

    candidates
        .into_iter()
        .find(|addr| network.accepts(addr))
        .ok_or_else(|| BindError::NoAddress {
            network,
            host: host.to_string(),
        })
}

/// Bind a listener for `network` on `address`
pub async fn bind(network: Network, address: &str) -> Result<TcpListener, BindError> {
    let addr = resolve(network, address, network.unspecified()).await?;
    let listener = TcpListener::bind(addr).await?;
    debug!(requested = %address, bound = %listener.local_addr()?, "Listener bound");
    Ok(listener)
}

/// The address callers should use once `listener` is bound
///
/// Returns the listener's resolved address when `requested` asked for an
/// ephemeral port, `None` when the requested address already is concrete.
pub fn resolved_address(requested: &str, listener: &TcpListener) -> io::Result<Option<String>> {
    if requested.ends_with(EPHEMERAL_PORT_SUFFIX) {
        Ok(Some(listener.local_addr()?.to_string()))
    } else {
        Ok(None)
    }
}

/// Serve without TLS until `shutdown` resolves
///
/// HTTP/2 is available through prior knowledge, which is what gRPC clients
/// use on cleartext connections.
pub async fn serve_plaintext<S, F>(listener: TcpListener, service: S, shutdown: F) -> io::Result<()>
where
    S: tower::Service<
            axum::extract::Request,
            Response = axum::response::Response,
            Error = std::convert::Infallible,
        > + Clone
        + Send
        + 'static,
    S::Future: Send,
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, Shared::new(service))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Serve over TLS until `shutdown` resolves
///
/// A watcher task parks on `shutdown` and triggers the graceful drain of the
/// TLS server; the drain has no deadline.
pub async fn serve_tls<S, F>(
    listener: TcpListener,
    tls_config: Arc<rustls::ServerConfig>,
    service: S,
    shutdown: F,
) -> io::Result<()>
where
    S: tower::Service<
            http::Request<hyper::body::Incoming>,
            Response = axum::response::Response,
            Error = std::convert::Infallible,
        > + Clone
        + Send
        + 'static,
    S::Future: Send,
    F: Future<Output = ()> + Send + 'static,
{
    let listener = listener.into_std()?;

    let handle = axum_server::Handle::new();
    let watcher_handle = handle.clone();
    let watcher = tokio::spawn(async move {
        shutdown.await;
        watcher_handle.graceful_shutdown(None);
    });

    let result = axum_server::from_tcp_rustls(listener, RustlsConfig::from_config(tls_config))
        .handle(handle)
        .serve(Shared::new(service))
        .await;

    watcher.abort();
    result
}
