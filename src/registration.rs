//! Registration port for the service fronted by the server
//!
//! The server owns no knowledge of what the service does. It only calls the
//! two registration hooks below, once each, before it starts accepting.

use crate::server::ShutdownSignal;
use async_trait::async_trait;
use axum::Router;
use thiserror::Error;
use tonic::service::RoutesBuilder;

/// Error returned by a service that cannot register itself
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RegistrationError {
    message: String,
}

impl RegistrationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A service that can be served over gRPC and through the JSON gateway
///
/// Both hooks run during startup, before the listener accepts traffic. A
/// failing hook aborts startup.
#[async_trait]
pub trait ServiceRegistration: Send + Sync {
    /// Add the service's gRPC handlers to the registrar
    fn register_rpc(&self, registrar: &mut RoutesBuilder) -> Result<(), RegistrationError>;

    /// Mount the service's JSON routes on the gateway router
    ///
    /// `shutdown` fires when the server is cancelled, for handlers that hold
    /// background work.
    async fn register_gateway(
        &self,
        router: Router,
        shutdown: ShutdownSignal,
    ) -> Result<Router, RegistrationError>;
}
