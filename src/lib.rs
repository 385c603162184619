//! dualserve: one listener serving gRPC and its JSON gateway
//!
//! Requests are multiplexed per request: HTTP/2 calls carrying an
//! `application/grpc` content type go to the gRPC routes, everything else
//! goes to the JSON gateway router.
//!
//! - [`server`] - listener, dispatcher, TLS, health and lifecycle
//! - [`registration`] - the port a pluggable service implements
//! - [`gateway`] - JSON error envelope shared by gateway handlers
//! - [`generation`] - reference text-generation service

pub mod config;
pub mod gateway;
pub mod generation;
pub mod registration;
pub mod server;

pub use config::{ConfigError, ServerConfig};
pub use registration::{RegistrationError, ServiceRegistration};
pub use server::{LifecycleState, Server, ServerError};

#[cfg(test)]
#[path = "config_test.rs"]
mod config_tests;
