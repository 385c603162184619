//! Reference text generation service
//!
//! A small service exercised by the binary and the end-to-end tests:
//! - `messages` - request/response types (protobuf and JSON)
//! - `grpc` - `dualserve.generation.v1.TextGeneration` server and client
//! - `routes` - `POST /v1/generate` on the JSON gateway
//!
//! [`TextGenerationService`] plugs any [`TextGenerator`] into the server.

pub mod grpc;
pub mod messages;
pub mod routes;

pub use grpc::{TextGenerationClient, TextGenerationServer};
pub use messages::{GenerateRequest, GenerateResponse, GenerationParameters};

use crate::registration::{RegistrationError, ServiceRegistration};
use crate::server::ShutdownSignal;
use async_trait::async_trait;
use axum::Router;
use std::sync::Arc;
use tonic::service::RoutesBuilder;
use tonic::Status;
use tracing::info;

/// Upper bound on sampled candidates per request
pub const MAX_CANDIDATES: i64 = 64;

/// Produces candidate texts for an input
#[async_trait]
pub trait TextGenerator: Send + Sync + 'static {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, Status>;
}

/// Deterministic generator that echoes its input
///
/// With sampling enabled it returns `max(top_k, 1)` candidates, otherwise
/// one. Candidate `i > 0` is suffixed with ` #i`. Scores start at 1.0 and
/// decay by `top_p` per candidate; a `top_p` outside (0, 1] does not decay.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, Status> {
        if request.input.is_empty() {
            return Err(Status::invalid_argument("input must not be empty"));
        }

        let params = request.parameters.unwrap_or_default();
        let count = if params.do_sample {
            params.top_k.max(1)
        } else {
            1
        };
        if count > MAX_CANDIDATES {
            return Err(Status::invalid_argument(format!(
                "topK must be at most {}, got {}",
                MAX_CANDIDATES, count
            )));
        }

        let decay = if params.top_p > 0.0 && params.top_p <= 1.0 {
            params.top_p
        } else {
            1.0
        };

        let mut texts = Vec::new();
        let mut scores = Vec::new();
        let mut score = 1.0f32;
        for i in 0..count {
            if i == 0 {
                texts.push(request.input.clone());
            } else {
                texts.push(format!("{} #{}", request.input, i));
            }
            scores.push(score);
            score *= decay;
        }

        Ok(GenerateResponse { texts, scores })
    }
}

/// Registers a [`TextGenerator`] on both the gRPC and the gateway side
#[derive(Debug)]
pub struct TextGenerationService<G> {
    generator: Arc<G>,
}

impl<G: TextGenerator> TextGenerationService<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator: Arc::new(generator),
        }
    }
}

#[async_trait]
impl<G: TextGenerator> ServiceRegistration for TextGenerationService<G> {
    fn register_rpc(&self, registrar: &mut RoutesBuilder) -> Result<(), RegistrationError> {
        registrar.add_service(TextGenerationServer::from_arc(self.generator.clone()));
        info!(service = grpc::SERVICE_NAME, "Registered gRPC service");
        Ok(())
    }

    async fn register_gateway(
        &self,
        router: Router,
        _shutdown: ShutdownSignal,
    ) -> Result<Router, RegistrationError> {
        info!(route = routes::GENERATE_ROUTE, "Registered gateway route");
        Ok(router.merge(routes::routes(self.generator.clone())))
    }
}

#[cfg(test)]
#[path = "generation_test.rs"]
mod tests;
