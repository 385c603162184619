//! gRPC binding of the text generation service
//!
//! Hand-written in the shape tonic's code generator produces, without a
//! build step. One unary method: `Generate`.

use super::messages::{GenerateRequest, GenerateResponse};
use super::TextGenerator;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http_body::Body;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::codec::ProstCodec;
use tonic::server::{NamedService, UnaryService};

type StdError = Box<dyn std::error::Error + Send + Sync + 'static>;
type BoxFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>;

/// Fully-qualified protobuf service name
pub const SERVICE_NAME: &str = "dualserve.generation.v1.TextGeneration";

/// Request path of the `Generate` method
pub const GENERATE_PATH: &str = "/dualserve.generation.v1.TextGeneration/Generate";

/// gRPC server wrapping a [`TextGenerator`]
#[derive(Debug)]
pub struct TextGenerationServer<G> {
    inner: Arc<G>,
}

impl<G> TextGenerationServer<G> {
    pub fn new(generator: G) -> Self {
        Self::from_arc(Arc::new(generator))
    }

    pub fn from_arc(inner: Arc<G>) -> Self {
        Self { inner }
    }
}

impl<G> Clone for TextGenerationServer<G> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<G> NamedService for TextGenerationServer<G> {
    const NAME: &'static str = SERVICE_NAME;
}

struct GenerateSvc<G>(Arc<G>);

impl<G: TextGenerator> UnaryService<GenerateRequest> for GenerateSvc<G> {
    type Response = GenerateResponse;
    type Future = BoxFuture<tonic::Response<GenerateResponse>, tonic::Status>;

    fn call(&mut self, request: tonic::Request<GenerateRequest>) -> Self::Future {
        let inner = Arc::clone(&self.0);
        Box::pin(async move {
            inner
                .generate(request.into_inner())
                .await
                .map(tonic::Response::new)
        })
    }
}

impl<G, B> tower::Service<http::Request<B>> for TextGenerationServer<G>
where
    G: TextGenerator,
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        match req.uri().path() {
            GENERATE_PATH => {
                let method = GenerateSvc(self.inner.clone());
                Box::pin(async move {
                    let mut grpc = tonic::server::Grpc::new(ProstCodec::default());
                    Ok(grpc.unary(method, req).await)
                })
            }
            _ => Box::pin(async move { Ok(unimplemented_response()) }),
        }
    }
}

/// Trailers-only UNIMPLEMENTED answer for unknown methods
fn unimplemented_response() -> http::Response<tonic::body::BoxBody> {
    let mut response = http::Response::new(tonic::body::empty_body());
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("grpc-status"),
        HeaderValue::from(tonic::Code::Unimplemented as i32),
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    response
}

/// gRPC client for the text generation service
#[derive(Debug, Clone)]
pub struct TextGenerationClient<T> {
    inner: tonic::client::Grpc<T>,
}

impl TextGenerationClient<tonic::transport::Channel> {
    /// Connect over a plaintext (h2c) channel
    pub async fn connect(endpoint: String) -> Result<Self, tonic::transport::Error> {
        let channel = tonic::transport::Endpoint::from_shared(endpoint)?
            .connect()
            .await?;
        Ok(Self::new(channel))
    }
}

impl<T> TextGenerationClient<T>
where
    T: tonic::client::GrpcService<tonic::body::BoxBody>,
    T::Error: Into<StdError>,
    T::ResponseBody: Body<Data = bytes::Bytes> + Send + 'static,
    <T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
    pub fn new(inner: T) -> Self {
        Self {
            inner: tonic::client::Grpc::new(inner),
        }
    }

    pub async fn generate(
        &mut self,
        request: impl tonic::IntoRequest<GenerateRequest>,
    ) -> Result<tonic::Response<GenerateResponse>, tonic::Status> {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
        })?;
        let path = http::uri::PathAndQuery::from_static(GENERATE_PATH);
        self.inner
            .unary(request.into_request(), path, ProstCodec::default())
            .await
    }
}
