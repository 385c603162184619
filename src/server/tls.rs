//! TLS material for the encrypted transport
//!
//! Loads a PEM certificate chain and private key from disk and builds a
//! rustls server configuration that negotiates HTTP/2 through ALPN, with
//! HTTP/1.1 as fallback for gateway clients that cannot speak h2.

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// ALPN protocols offered, in preference order
pub const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Errors that can occur while loading TLS material
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse PEM data: {0}")]
    Parse(#[source] std::io::Error),

    #[error("no certificate found in PEM data")]
    NoCertificate,

    #[error("no private key found in PEM data")]
    NoPrivateKey,

    #[error("failed to build TLS config: {0}")]
    Config(#[from] rustls::Error),
}

/// Read the certificate chain and key from disk and build the server config
pub async fn load_rustls_config(
    cert_path: &Path,
    key_path: &Path,
) -> Result<Arc<rustls::ServerConfig>, TlsError> {
    let cert_pem = read(cert_path).await?;
    let key_pem = read(key_path).await?;
    build_rustls_config(&cert_pem, &key_pem)
}

async fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    tokio::fs::read(path).await.map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Build a rustls ServerConfig from PEM-encoded certificate chain and key
pub fn build_rustls_config(
    cert_pem: &[u8],
    key_pem: &[u8],
) -> Result<Arc<rustls::ServerConfig>, TlsError> {
    use rustls_pemfile::{certs, private_key};

    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut BufReader::new(cert_pem))
        .collect::<Result<_, _>>()
        .map_err(TlsError::Parse)?;

    if cert_chain.is_empty() {
        return Err(TlsError::NoCertificate);
    }

    let key: PrivateKeyDer<'static> = private_key(&mut BufReader::new(key_pem))
        .map_err(TlsError::Parse)?
        .ok_or(TlsError::NoPrivateKey)?;

    let mut config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_no_client_auth()
    .with_single_cert(cert_chain, key)?;

    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    Ok(Arc::new(config))
}
