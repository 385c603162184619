//! Dual-protocol server
//!
//! One listener serves gRPC and the JSON gateway of the registered service:
//! - `dispatch` - per-request routing between the two handlers
//! - `transport` - binding, plaintext (h2c) and TLS serving
//! - `health` - `grpc.health.v1.Health` status and its oscillator
//! - `shutdown` - cancellation signal driving graceful shutdown
//! - `readiness` - client-side "is it accepting yet" polling

pub mod cors;
pub mod dispatch;
pub mod health;
mod lifecycle;
mod readiness;
pub mod shutdown;
pub mod tls;
pub mod transport;

pub use dispatch::{is_grpc_request, ProtocolDispatcher, GRPC_CONTENT_TYPE};
pub use health::{HealthRegistry, ServingStatus, SYSTEM_SERVICE};
pub use lifecycle::LifecycleState;
pub use readiness::{poll_ready, POLL_INTERVAL};
pub use shutdown::{shutdown_channel, wait_for_signal, ShutdownController, ShutdownSignal};
pub use tls::TlsError;
pub use transport::BindError;

use crate::config::{ConfigError, ServerConfig};
use crate::gateway;
use crate::registration::{RegistrationError, ServiceRegistration};
use axum::Router;
use lifecycle::Lifecycle;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tonic::service::RoutesBuilder;
use tracing::{error, info};

/// Errors that stop the server from reaching, or staying in, Serving
///
/// Every variant is fatal for the run: nothing is retried.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server already started")]
    AlreadyStarted,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to register gRPC server: {0}")]
    RpcRegistration(#[source] RegistrationError),

    #[error("failed to register gRPC handler server: {0}")]
    GatewayRegistration(#[source] RegistrationError),

    #[error("failed to load TLS public/private key pair: {0}")]
    Tls(#[from] TlsError),

    #[error("failed to listen on {address} ({network}): {source}")]
    Bind {
        network: String,
        address: String,
        #[source]
        source: BindError,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// A server fronting one [`ServiceRegistration`] over gRPC and JSON
///
/// Clones share the same instance, so one clone can run [`Server::start`]
/// while another queries [`Server::client_addr`] or polls readiness.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

struct Inner {
    config: RwLock<ServerConfig>,
    service: Arc<dyn ServiceRegistration>,
    lifecycle: Lifecycle,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config())
            .field("state", &self.state())
            .finish()
    }
}

impl Server {
    /// Create a server; empty network/address fields take their defaults
    pub fn new(config: ServerConfig, service: impl ServiceRegistration + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: RwLock::new(config.with_defaults()),
                service: Arc::new(service),
                lifecycle: Lifecycle::new(),
            }),
        }
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> ServerConfig {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Address clients should connect to
    ///
    /// After an ephemeral-port start this is the OS-assigned address, not
    /// the ":0" that was configured.
    pub fn client_addr(&self) -> String {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .address
            .clone()
    }

    fn set_address(&self, address: String) {
        self.inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .address = address;
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lifecycle.current()
    }

    /// Wait until the server reaches `target` or a later state
    pub async fn wait_for_state(&self, target: LifecycleState) -> LifecycleState {
        self.inner.lifecycle.reached(target).await
    }

    /// Run the server until `shutdown` fires
    ///
    /// Registers the health service and the external service, binds the
    /// listener, then serves until the signal triggers a graceful drain.
    /// Returns once the listener is closed. Configuration, registration,
    /// TLS and bind failures are returned before anything is served.
    ///
    /// A server can be started once; later calls fail with
    /// [`ServerError::AlreadyStarted`].
    pub async fn start(&self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        if !self.inner.lifecycle.begin_start() {
            return Err(ServerError::AlreadyStarted);
        }

        let result = self.run(shutdown).await;
        self.inner.lifecycle.advance(LifecycleState::Stopped);

        match &result {
            Ok(()) => info!("Server stopped"),
            Err(e) => error!(error = %e, "Server failed"),
        }
        result
    }

    async fn run(&self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let config = self.config();
        let network = config.network()?;

        let (health, health_service) = HealthRegistry::new();
        let mut registrar = RoutesBuilder::default();
        registrar.add_service(health_service);

        self.inner
            .service
            .register_rpc(&mut registrar)
            .map_err(ServerError::RpcRegistration)?;

        let gateway = self
            .inner
            .service
            .register_gateway(Router::new(), shutdown.clone())
            .await
            .map_err(ServerError::GatewayRegistration)?;

        let tls_config = if config.tls_enabled {
            Some(tls::load_rustls_config(&config.tls_cert, &config.tls_key).await?)
        } else {
            None
        };

        let bind_error = |source: BindError| ServerError::Bind {
            network: config.network.clone(),
            address: config.address.clone(),
            source,
        };
        let listener = transport::bind(network, &config.address)
            .await
            .map_err(bind_error)?;
        if let Some(resolved) = transport::resolved_address(&config.address, &listener)
            .map_err(|e| bind_error(e.into()))?
        {
            self.set_address(resolved);
        }

        let gateway = gateway
            .fallback(gateway::not_found)
            .layer(cors::cors_layer(&config.allowed_origins));
        let dispatcher = ProtocolDispatcher::new(registrar.routes(), gateway);

        let oscillator = config
            .health_toggle_interval
            .map(|interval| health::spawn_oscillator(health.clone(), interval, shutdown.clone()));
        let oscillator_abort = oscillator.as_ref().map(|handle| handle.abort_handle());

        let drain = {
            let server = self.clone();
            let cancelled = shutdown.cancelled();
            async move {
                cancelled.await;
                info!("Shutdown signal received, shutting down server");
                server.inner.lifecycle.advance(LifecycleState::ShuttingDown);
                health::mark_draining(&health, oscillator).await;
            }
        };

        self.inner.lifecycle.advance(LifecycleState::Serving);
        info!(
            network = %config.network,
            address = %self.client_addr(),
            tls = config.tls_enabled,
            "Server listening"
        );

        let served = match tls_config {
            Some(tls_config) => transport::serve_tls(listener, tls_config, dispatcher, drain).await,
            None => transport::serve_plaintext(listener, dispatcher, drain).await,
        };

        // The drain never ran if serving failed on its own
        if let Some(handle) = oscillator_abort {
            handle.abort();
        }
        served.map_err(ServerError::Serve)
    }
}

#[cfg(test)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[path = "lifecycle_test.rs"]
mod lifecycle_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod dispatch_tests;

#[cfg(test)]
#[path = "cors_test.rs"]
mod cors_tests;

#[cfg(test)]
#[path = "tls_test.rs"]
mod tls_tests;

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_tests;

#[cfg(test)]
#[path = "readiness_test.rs"]
mod readiness_tests;

#[cfg(test)]
#[path = "server_test.rs"]
mod server_tests;
