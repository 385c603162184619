//! Serving status exposed through the standard gRPC health protocol
//!
//! [`HealthRegistry`] owns the `grpc.health.v1.Health` service for one server
//! run. Status is keyed by service name; [`SYSTEM_SERVICE`] (the empty
//! string) stands for the whole process.
//!
//! The registry also drives a status oscillator: the whole-process status
//! flips between SERVING and NOT_SERVING on a fixed period until the server
//! is cancelled.

use super::shutdown::ShutdownSignal;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tonic_health::pb::health_server::{Health, HealthServer};
use tonic_health::server::{health_reporter, HealthReporter};
use tracing::debug;

pub use tonic_health::ServingStatus;

/// Service name standing for the whole process
pub const SYSTEM_SERVICE: &str = "";

/// Per-service serving status shared with the health gRPC service
#[derive(Clone)]
pub struct HealthRegistry {
    reporter: HealthReporter,
    statuses: Arc<RwLock<HashMap<String, ServingStatus>>>,
}

impl std::fmt::Debug for HealthRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthRegistry")
            .field("statuses", &self.snapshot())
            .finish()
    }
}

impl HealthRegistry {
    /// Create a registry and the gRPC service that answers health checks
    ///
    /// The whole process starts out SERVING.
    pub fn new() -> (Self, HealthServer<impl Health>) {
        let (reporter, service) = health_reporter();
        let statuses = HashMap::from([(SYSTEM_SERVICE.to_string(), ServingStatus::Serving)]);

        let registry = Self {
            reporter,
            statuses: Arc::new(RwLock::new(statuses)),
        };
        (registry, service)
    }

    /// Set the serving status of `service`
    ///
    /// Visible to health checks and watchers as soon as this returns.
    pub async fn set_status(&self, service: &str, status: ServingStatus) {
        // Clones share one status map.
        let mut reporter = self.reporter.clone();
        reporter.set_service_status(service, status).await;
        self.statuses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(service.to_string(), status);
        debug!(service = service, status = ?status, "Health status updated");
    }

    /// Last status set for `service`, if any
    pub fn status(&self, service: &str) -> Option<ServingStatus> {
        self.statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
            .copied()
    }

    fn snapshot(&self) -> HashMap<String, ServingStatus> {
        self.statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn flip(status: ServingStatus) -> ServingStatus {
    match status {
        ServingStatus::Serving => ServingStatus::NotServing,
        _ => ServingStatus::Serving,
    }
}

/// Stop the oscillator, then mark the whole process NOT_SERVING
///
/// The oscillator is joined first so a tick racing the shutdown cannot
/// write SERVING back afterwards.
pub async fn mark_draining(registry: &HealthRegistry, oscillator: Option<JoinHandle<()>>) {
    if let Some(handle) = oscillator {
        handle.abort();
        let _ = handle.await;
    }
    registry
        .set_status(SYSTEM_SERVICE, ServingStatus::NotServing)
        .await;
}

/// Spawn the whole-process status oscillator
///
/// Sets SERVING immediately, then flips the status every `interval`. The
/// task ends when `shutdown` fires.
pub fn spawn_oscillator(
    registry: HealthRegistry,
    interval: Duration,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut next = ServingStatus::Serving;
        loop {
            registry.set_status(SYSTEM_SERVICE, next).await;
            next = flip(next);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.wait() => {
                    debug!("Health oscillator stopped");
                    return;
                }
            }
        }
    })
}
