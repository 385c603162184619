//! Per-request protocol dispatch
//!
//! HTTP/2 multiplexes gRPC calls and gateway requests over the same
//! connection, so the decision is made for every request, never per
//! connection.

use crate::gateway::GatewayError;
use axum::body::Body;
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, Version};
use std::convert::Infallible;
use std::task::{Context, Poll};
use tonic::body::BoxBody;
use tower::{BoxError, Service, ServiceExt};
use tracing::error;

/// Media-type token identifying gRPC requests
pub const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// Whether a request belongs to the gRPC side
///
/// True when the request arrived over HTTP/2 and its Content-Type contains
/// `application/grpc` (this covers `application/grpc+proto` and friends).
pub fn is_grpc_request<B>(req: &Request<B>) -> bool {
    req.version() == Version::HTTP_2
        && req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains(GRPC_CONTENT_TYPE))
}

/// Routes each request to exactly one of two handlers
///
/// Requests are forwarded unmodified apart from their body, which is boxed
/// into tonic's body type on the gRPC side. Response bodies from either side
/// are boxed into [`axum::body::Body`].
#[derive(Debug, Clone)]
pub struct ProtocolDispatcher<R, G> {
    rpc: R,
    gateway: G,
}

impl<R, G> ProtocolDispatcher<R, G> {
    pub fn new(rpc: R, gateway: G) -> Self {
        Self { rpc, gateway }
    }
}

impl<R, G, B, RB, GB> Service<Request<B>> for ProtocolDispatcher<R, G>
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
    R: Service<Request<BoxBody>, Response = Response<RB>> + Clone + Send + 'static,
    R::Error: Into<BoxError>,
    R::Future: Send + 'static,
    RB: http_body::Body<Data = Bytes> + Send + 'static,
    RB::Error: Into<BoxError>,
    G: Service<Request<B>, Response = Response<GB>> + Clone + Send + 'static,
    G::Error: Into<BoxError>,
    G::Future: Send + 'static,
    GB: http_body::Body<Data = Bytes> + Send + 'static,
    GB::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness is checked per call through oneshot on a clone.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        if is_grpc_request(&req) {
            let rpc = self.rpc.clone();
            let req = req.map(tonic::body::boxed);
            Box::pin(async move {
                Ok(match rpc.oneshot(req).await {
                    Ok(response) => response.map(Body::new),
                    Err(e) => {
                        let e: BoxError = e.into();
                        error!(error = %e, "gRPC handler failed");
                        grpc_internal_error()
                    }
                })
            })
        } else {
            let gateway = self.gateway.clone();
            Box::pin(async move {
                Ok(match gateway.oneshot(req).await {
                    Ok(response) => response.map(Body::new),
                    Err(e) => {
                        let e: BoxError = e.into();
                        error!(error = %e, "Gateway handler failed");
                        GatewayError::from(tonic::Status::internal("internal error"))
                            .into_response()
                    }
                })
            })
        }
    }
}

/// Trailers-only gRPC response carrying INTERNAL
fn grpc_internal_error() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(GRPC_CONTENT_TYPE));
    headers.insert(
        "grpc-status",
        HeaderValue::from(tonic::Code::Internal as i32),
    );
    response
}
