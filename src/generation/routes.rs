//! JSON gateway routes for text generation

use super::messages::{GenerateRequest, GenerateResponse};
use super::TextGenerator;
use crate::gateway::GatewayError;
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use tonic::Status;
use tracing::debug;

pub const GENERATE_ROUTE: &str = "/v1/generate";

/// Router mounting `POST /v1/generate` for `generator`
pub fn routes<G: TextGenerator>(generator: Arc<G>) -> Router {
    Router::new()
        .route(GENERATE_ROUTE, post(generate::<G>))
        .with_state(generator)
}

async fn generate<G: TextGenerator>(
    State(generator): State<Arc<G>>,
    body: Bytes,
) -> Result<Json<GenerateResponse>, GatewayError> {
    // Parsed by hand so malformed bodies get the gateway error envelope
    let request: GenerateRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!(error = %e, "Rejecting malformed generate request");
        Status::invalid_argument(format!("invalid request body: {}", e))
    })?;

    Ok(Json(generator.generate(request).await?))
}
