//! Tests for listener binding

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::transport::*;
use crate::config::{ConfigError, Network};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

#[tokio::test]
async fn test_resolve_empty_host_uses_fallback() {
    let addr = resolve(Network::Tcp4, ":9000", Network::Tcp4.unspecified())
        .await
        .unwrap();
    assert_eq!(addr, SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 9000));

    let addr = resolve(Network::Tcp6, ":9000", Network::Tcp6.loopback())
        .await
        .unwrap();
    assert_eq!(addr, SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 9000));
}

#[tokio::test]
async fn test_resolve_ip_literals() {
    let addr = resolve(Network::Tcp, "127.0.0.1:8080", Network::Tcp.unspecified())
        .await
        .unwrap();
    assert_eq!(addr.to_string(), "127.0.0.1:8080");

    let addr = resolve(Network::Tcp6, "[::1]:8080", Network::Tcp6.unspecified())
        .await
        .unwrap();
    assert_eq!(addr.to_string(), "[::1]:8080");
}

#[tokio::test]
async fn test_resolve_rejects_wrong_family() {
    let err = resolve(Network::Tcp6, "127.0.0.1:8080", Network::Tcp6.unspecified())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BindError::NoAddress { network: Network::Tcp6, ref host } if host == "127.0.0.1"
    ));

    let err = resolve(Network::Tcp4, "[::1]:8080", Network::Tcp4.unspecified())
        .await
        .unwrap_err();
    assert!(matches!(err, BindError::NoAddress { .. }));
}

#[tokio::test]
async fn test_resolve_rejects_malformed_address() {
    let err = resolve(Network::Tcp4, "localhost", Network::Tcp4.unspecified())
        .await
        .unwrap_err();
    assert!(matches!(err, BindError::Config(ConfigError::InvalidAddress { .. })));
}

#[tokio::test]
async fn test_bind_ephemeral_port() {
    let listener = bind(Network::Tcp4, "127.0.0.1:0").await.unwrap();
    let local = listener.local_addr().unwrap();

    assert!(local.ip().is_loopback());
    assert_ne!(local.port(), 0);
}

#[tokio::test]
async fn test_bind_port_in_use() {
    let first = bind(Network::Tcp4, "127.0.0.1:0").await.unwrap();
    let taken = first.local_addr().unwrap().to_string();

    let err = bind(Network::Tcp4, &taken).await.unwrap_err();
    assert!(matches!(err, BindError::Io(_)));
}

#[tokio::test]
async fn test_resolved_address_only_for_ephemeral_requests() {
    let listener = bind(Network::Tcp4, "127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let resolved = resolved_address("127.0.0.1:0", &listener).unwrap();
    assert_eq!(resolved, Some(format!("127.0.0.1:{}", port)));

    let concrete = format!("127.0.0.1:{}", port);
    assert_eq!(resolved_address(&concrete, &listener).unwrap(), None);
}

#[tokio::test]
async fn test_resolved_address_for_empty_host() {
    let listener = bind(Network::Tcp4, ":0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let resolved = resolved_address(":0", &listener).unwrap();
    assert_eq!(resolved, Some(format!("0.0.0.0:{}", port)));
}

#[tokio::test]
async fn test_serve_tls_returns_and_releases_shutdown_future() {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let tls_config = crate::server::tls::build_rustls_config(
        certified.cert.pem().as_bytes(),
        certified.key_pair.serialize_pem().as_bytes(),
    )
    .unwrap();
    let listener = bind(Network::Tcp4, "127.0.0.1:0").await.unwrap();

    // The sender lives inside the shutdown future; the receiver sees it dropped
    let (guard, released) = tokio::sync::oneshot::channel::<()>();
    let shutdown = async move {
        let _guard = guard;
    };

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        serve_tls(listener, tls_config, axum::Router::new(), shutdown),
    )
    .await
    .expect("serve_tls did not return after shutdown");

    assert!(result.is_ok());
    assert!(released.await.is_err(), "shutdown future still held");
}

#[tokio::test]
async fn test_serve_plaintext_stops_on_shutdown() {
    let listener = bind(Network::Tcp4, "127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (trigger, fired) = tokio::sync::oneshot::channel::<()>();
    let shutdown = async move {
        let _ = fired.await;
    };

    let server = tokio::spawn(serve_plaintext(listener, axum::Router::new(), shutdown));
    assert!(tokio::net::TcpStream::connect(addr).await.is_ok());

    trigger.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("serve_plaintext did not return after shutdown")
        .unwrap();
    assert!(result.is_ok());
}
