//! Server configuration
//!
//! Configuration is programmatic: build a [`ServerConfig`] directly or load
//! one from `DUALSERVE_*` environment variables with
//! [`ServerConfig::from_env`]. Defaults are applied once, by
//! [`ServerConfig::with_defaults`].

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Network family used when none is configured
pub const DEFAULT_NETWORK: &str = "tcp4";

/// Address used when none is configured (all interfaces, port 8080)
pub const DEFAULT_ADDRESS: &str = ":8080";

/// Interval between whole-process health status flips
pub const DEFAULT_HEALTH_TOGGLE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported network family: {0}")]
    UnsupportedNetwork(String),

    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Stream-oriented network families accepted by the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// IPv4 or IPv6
    Tcp,
    /// IPv4 only
    Tcp4,
    /// IPv6 only
    Tcp6,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
        }
    }

    /// Address bound when the configured host is empty
    pub fn unspecified(&self) -> IpAddr {
        match self {
            Network::Tcp | Network::Tcp4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Network::Tcp6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    /// Address dialed when the configured host is empty
    pub fn loopback(&self) -> IpAddr {
        match self {
            Network::Tcp | Network::Tcp4 => IpAddr::V4(Ipv4Addr::LOCALHOST),
            Network::Tcp6 => IpAddr::V6(Ipv6Addr::LOCALHOST),
        }
    }

    /// Whether a resolved address belongs to this family
    pub fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => addr.is_ipv4(),
            Network::Tcp6 => addr.is_ipv6(),
        }
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            other => Err(ConfigError::UnsupportedNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for [`crate::Server`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Network family: "tcp", "tcp4" or "tcp6"
    pub network: String,
    /// Bind address as host:port. Port 0 requests an ephemeral port and is
    /// rewritten with the OS-assigned value once bound.
    pub address: String,
    /// Origins allowed by the gateway CORS policy (empty allows any)
    pub allowed_origins: Vec<String>,
    pub tls_enabled: bool,
    /// PEM certificate chain, read when `tls_enabled` is set
    pub tls_cert: PathBuf,
    /// PEM private key, read when `tls_enabled` is set
    pub tls_key: PathBuf,
    /// Whole-process health oscillation period (`None` keeps it SERVING)
    pub health_toggle_interval: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            address: DEFAULT_ADDRESS.to_string(),
            allowed_origins: Vec::new(),
            tls_enabled: false,
            tls_cert: PathBuf::new(),
            tls_key: PathBuf::new(),
            health_toggle_interval: Some(DEFAULT_HEALTH_TOGGLE_INTERVAL),
        }
    }
}

impl ServerConfig {
    /// Plaintext configuration bound to `address`
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Fill empty network and address fields with their defaults
    pub fn with_defaults(mut self) -> Self {
        if self.network.is_empty() {
            self.network = DEFAULT_NETWORK.to_string();
        }
        if self.address.is_empty() {
            self.address = DEFAULT_ADDRESS.to_string();
        }
        self
    }

    /// Parsed network family
    pub fn network(&self) -> Result<Network, ConfigError> {
        self.network.parse()
    }

    /// Load configuration from the environment
    ///
    /// - `DUALSERVE_NETWORK` - network family (default: tcp4)
    /// - `DUALSERVE_ADDRESS` - bind address (default: :8080)
    /// - `DUALSERVE_ALLOWED_ORIGINS` - comma-separated CORS origins
    /// - `DUALSERVE_TLS` - "true" or "1" enables TLS
    /// - `DUALSERVE_TLS_CERT` / `DUALSERVE_TLS_KEY` - PEM file paths
    /// - `DUALSERVE_HEALTH_TOGGLE_SECS` - oscillation period, 0 disables it
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let allowed_origins = lookup("DUALSERVE_ALLOWED_ORIGINS")
            .map(|v| parse_origins(&v))
            .unwrap_or_default();

        let tls_enabled = lookup("DUALSERVE_TLS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let health_toggle_interval = match lookup("DUALSERVE_HEALTH_TOGGLE_SECS") {
            None => Some(DEFAULT_HEALTH_TOGGLE_INTERVAL),
            Some(value) => match value.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    return Err(ConfigError::InvalidEnv {
                        name: "DUALSERVE_HEALTH_TOGGLE_SECS",
                        value,
                    })
                }
            },
        };

        let config = Self {
            network: lookup("DUALSERVE_NETWORK").unwrap_or_default(),
            address: lookup("DUALSERVE_ADDRESS").unwrap_or_default(),
            allowed_origins,
            tls_enabled,
            tls_cert: lookup("DUALSERVE_TLS_CERT").map(PathBuf::from).unwrap_or_default(),
            tls_key: lookup("DUALSERVE_TLS_KEY").map(PathBuf::from).unwrap_or_default(),
            health_toggle_interval,
        }
        .with_defaults();

        config.network()?;
        split_host_port(&config.address)?;
        Ok(config)
    }
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split "host:port" into its parts
///
/// The host may be empty (":8080") or a bracketed IPv6 literal ("[::1]:80").
pub fn split_host_port(address: &str) -> Result<(&str, u16), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port"))?;

    let host = match host.strip_prefix('[') {
        Some(inner) => inner
            .strip_suffix(']')
            .ok_or_else(|| invalid("unterminated IPv6 literal"))?,
        None if host.contains(':') => return Err(invalid("too many colons")),
        None => host,
    };

    let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
    Ok((host, port))
}
