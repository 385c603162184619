//! End-to-end tests: a real listener, real clients

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::gateway::ErrorEnvelope;
use crate::generation::{
    EchoGenerator, GenerateRequest, GenerateResponse, GenerationParameters, TextGenerationClient,
    TextGenerationService,
};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tonic::transport::{Channel, Endpoint};
use tonic_health::pb::health_check_response::ServingStatus as WireStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    server: Server,
    controller: ShutdownController,
    task: JoinHandle<Result<(), ServerError>>,
}

impl Running {
    async fn stop(self) -> (Server, Result<(), ServerError>) {
        self.controller.shutdown();
        let result = tokio::time::timeout(STARTUP_TIMEOUT, self.task)
            .await
            .expect("server did not stop")
            .unwrap();
        (self.server, result)
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        address: "127.0.0.1:0".to_string(),
        health_toggle_interval: None,
        ..ServerConfig::default()
    }
}

fn spawn_start(server: &Server) -> (ShutdownController, JoinHandle<Result<(), ServerError>>) {
    let (controller, signal) = shutdown_channel();
    let server = server.clone();
    let task = tokio::spawn(async move { server.start(signal).await });
    (controller, task)
}

async fn start_with(config: ServerConfig) -> Running {
    let server = Server::new(config, TextGenerationService::new(EchoGenerator));
    let (controller, task) = spawn_start(&server);

    let serving = server.wait_for_state(LifecycleState::Serving);
    let state = tokio::time::timeout(STARTUP_TIMEOUT, serving)
        .await
        .expect("server did not start");
    assert_eq!(state, LifecycleState::Serving);

    Running {
        server,
        controller,
        task,
    }
}

/// Start a service that must fail and return its error
async fn start_failing(
    config: ServerConfig,
    service: impl ServiceRegistration + 'static,
) -> ServerError {
    let server = Server::new(config, service);
    let (_controller, signal) = shutdown_channel();

    let err = tokio::time::timeout(STARTUP_TIMEOUT, server.start(signal))
        .await
        .expect("start did not return")
        .unwrap_err();
    assert_eq!(server.state(), LifecycleState::Stopped);
    err
}

/// Plaintext (h2c) health client for a running server
async fn health_client(server: &Server) -> HealthClient<Channel> {
    let channel = Endpoint::from_shared(format!("http://{}", server.client_addr()))
        .unwrap()
        .connect()
        .await
        .unwrap();
    HealthClient::new(channel)
}

fn generate_body() -> serde_json::Value {
    serde_json::json!({
        "input": "hello",
        "parameters": {"topK": "5", "topP": 0.9, "temperature": 0.7, "doSample": true}
    })
}

struct FailingRegistration {
    fail_rpc: bool,
}

#[async_trait]
impl ServiceRegistration for FailingRegistration {
    fn register_rpc(&self, _registrar: &mut RoutesBuilder) -> Result<(), RegistrationError> {
        if self.fail_rpc {
            Err(RegistrationError::new("rpc boom"))
        } else {
            Ok(())
        }
    }

    async fn register_gateway(
        &self,
        _router: Router,
        _shutdown: ShutdownSignal,
    ) -> Result<Router, RegistrationError> {
        Err(RegistrationError::new("gateway boom"))
    }
}

#[tokio::test]
async fn test_ephemeral_port_is_rewritten_and_reachable() {
    let running = start_with(test_config()).await;

    let addr: SocketAddr = running.server.client_addr().parse().unwrap();
    assert!(addr.ip().is_loopback());
    assert_ne!(addr.port(), 0);
    assert!(
        running
            .server
            .ready_for_connections(Duration::from_millis(200))
            .await
    );

    let (server, result) = running.stop().await;
    assert!(result.is_ok());
    assert_eq!(server.state(), LifecycleState::Stopped);
    assert!(!server.ready_for_connections(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let running = start_with(test_config()).await;

    let (_controller, signal) = shutdown_channel();
    let err = running.server.start(signal).await.unwrap_err();
    assert!(matches!(err, ServerError::AlreadyStarted));
    assert_eq!(running.server.state(), LifecycleState::Serving);

    let (_, result) = running.stop().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_shutdown_before_start_stops_immediately() {
    let server = Server::new(test_config(), TextGenerationService::new(EchoGenerator));
    let (controller, signal) = shutdown_channel();
    controller.shutdown();

    let result = tokio::time::timeout(STARTUP_TIMEOUT, server.start(signal))
        .await
        .expect("start did not return");
    assert!(result.is_ok());
    assert_eq!(server.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_rpc_registration_failure() {
    let err = start_failing(test_config(), FailingRegistration { fail_rpc: true }).await;

    assert!(matches!(err, ServerError::RpcRegistration(_)));
    assert_eq!(err.to_string(), "failed to register gRPC server: rpc boom");
}

#[tokio::test]
async fn test_gateway_registration_failure() {
    let err = start_failing(test_config(), FailingRegistration { fail_rpc: false }).await;

    assert!(matches!(err, ServerError::GatewayRegistration(_)));
    assert_eq!(
        err.to_string(),
        "failed to register gRPC handler server: gateway boom"
    );
}

#[tokio::test]
async fn test_unsupported_network() {
    let config = ServerConfig {
        network: "udp".to_string(),
        ..test_config()
    };
    let err = start_failing(config, TextGenerationService::new(EchoGenerator)).await;

    assert!(matches!(
        err,
        ServerError::Config(ConfigError::UnsupportedNetwork(ref n)) if n == "udp"
    ));
}

#[tokio::test]
async fn test_bind_failure_on_used_port() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = ServerConfig {
        address: taken.local_addr().unwrap().to_string(),
        ..test_config()
    };

    let err = start_failing(config, TextGenerationService::new(EchoGenerator)).await;
    assert!(matches!(err, ServerError::Bind { .. }));
}

#[tokio::test]
async fn test_missing_tls_material() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        tls_enabled: true,
        tls_cert: dir.path().join("missing.crt"),
        tls_key: dir.path().join("missing.key"),
        ..test_config()
    };

    let err = start_failing(config, TextGenerationService::new(EchoGenerator)).await;
    assert!(matches!(err, ServerError::Tls(_)));
}

#[tokio::test]
async fn test_gateway_over_http1() {
    let running = start_with(test_config()).await;
    let url = format!("http://{}/v1/generate", running.server.client_addr());

    let response = reqwest::Client::new()
        .post(&url)
        .json(&generate_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: GenerateResponse = response.json().await.unwrap();
    assert_eq!(body.texts.len(), 5);
    assert_eq!(body.texts.len(), body.scores.len());

    running.stop().await;
}

#[tokio::test]
async fn test_gateway_over_h2c() {
    let running = start_with(test_config()).await;
    let url = format!("http://{}/v1/generate", running.server.client_addr());

    let response = reqwest::Client::builder()
        .http2_prior_knowledge()
        .build()
        .unwrap()
        .post(&url)
        .json(&generate_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.version(), reqwest::Version::HTTP_2);
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    running.stop().await;
}

#[tokio::test]
async fn test_unknown_route_returns_envelope() {
    let running = start_with(test_config()).await;
    let url = format!("http://{}/v1/nothing-here", running.server.client_addr());

    let response = reqwest::get(&url).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let envelope: ErrorEnvelope = response.json().await.unwrap();
    assert_eq!(envelope.code, tonic::Code::NotFound as i32);
    assert!(envelope.details.is_empty());

    running.stop().await;
}

#[tokio::test]
async fn test_grpc_health_check() {
    let running = start_with(test_config()).await;
    let mut client = health_client(&running.server).await;
    let response = client
        .check(HealthCheckRequest {
            service: SYSTEM_SERVICE.to_string(),
        })
        .await
        .unwrap();
    assert_eq!(response.into_inner().status, WireStatus::Serving as i32);

    let err = client
        .check(HealthCheckRequest {
            service: "unknown.Service".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), tonic::Code::NotFound);

    running.stop().await;
}

#[tokio::test]
async fn test_grpc_and_gateway_share_the_port() {
    let running = start_with(test_config()).await;
    let addr = running.server.client_addr();

    let grpc = async {
        let mut client = TextGenerationClient::connect(format!("http://{}", addr))
            .await
            .unwrap();
        client
            .generate(GenerateRequest {
                input: "hello".to_string(),
                parameters: Some(GenerationParameters {
                    top_k: 3,
                    top_p: 0.5,
                    temperature: 0.7,
                    do_sample: true,
                }),
            })
            .await
            .unwrap()
            .into_inner()
    };
    let http = async {
        reqwest::Client::new()
            .post(format!("http://{}/v1/generate", addr))
            .json(&generate_body())
            .send()
            .await
            .unwrap()
            .json::<GenerateResponse>()
            .await
            .unwrap()
    };

    let (from_grpc, from_http) = tokio::join!(grpc, http);
    assert_eq!(from_grpc.texts, vec!["hello", "hello #1", "hello #2"]);
    assert_eq!(from_http.texts.len(), 5);

    running.stop().await;
}

#[tokio::test]
async fn test_grpc_error_status() {
    let running = start_with(test_config()).await;
    let endpoint = format!("http://{}", running.server.client_addr());
    let mut client = TextGenerationClient::connect(endpoint).await.unwrap();

    let err = client
        .generate(GenerateRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);

    running.stop().await;
}

#[tokio::test]
async fn test_cors_wildcard_origin() {
    let config = ServerConfig {
        allowed_origins: vec!["https://*.example.com".to_string()],
        ..test_config()
    };
    let running = start_with(config).await;
    let url = format!("http://{}/v1/generate", running.server.client_addr());
    let client = reqwest::Client::new();

    let allowed = client
        .post(&url)
        .header("origin", "https://app.example.com")
        .json(&generate_body())
        .send()
        .await
        .unwrap();
    assert_eq!(
        allowed.headers()["access-control-allow-origin"],
        "https://app.example.com"
    );

    let denied = client
        .post(&url)
        .header("origin", "https://evil.test")
        .json(&generate_body())
        .send()
        .await
        .unwrap();
    assert!(denied.headers().get("access-control-allow-origin").is_none());

    running.stop().await;
}

#[tokio::test]
async fn test_tls_serves_gateway() {
    let dir = tempfile::tempdir().unwrap();
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_path = dir.path().join("tls.crt");
    let key_path = dir.path().join("tls.key");
    std::fs::write(&cert_path, certified.cert.pem()).unwrap();
    std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();

    let config = ServerConfig {
        tls_enabled: true,
        tls_cert: cert_path,
        tls_key: key_path,
        ..test_config()
    };
    let running = start_with(config).await;
    let addr: SocketAddr = running.server.client_addr().parse().unwrap();

    let response = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap()
        .post(format!("https://localhost:{}/v1/generate", addr.port()))
        .json(&generate_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    // ALPN picked HTTP/2
    assert_eq!(response.version(), reqwest::Version::HTTP_2);

    let (_, result) = running.stop().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_shutdown_marks_whole_process_not_serving() {
    let running = start_with(test_config()).await;
    let mut client = health_client(&running.server).await;

    let mut watch = client
        .watch(HealthCheckRequest {
            service: SYSTEM_SERVICE.to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    let first = watch.message().await.unwrap().unwrap();
    assert_eq!(first.status, WireStatus::Serving as i32);

    running.controller.shutdown();
    let next = tokio::time::timeout(STARTUP_TIMEOUT, watch.message())
        .await
        .expect("no status update");
    // The stream either reports NOT_SERVING or ends with the drained connection
    if let Ok(Some(update)) = next {
        assert_eq!(update.status, WireStatus::NotServing as i32);
    }

    drop(watch);
    drop(client);
    let result = tokio::time::timeout(STARTUP_TIMEOUT, running.task)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_oscillator_flips_whole_process_status() {
    let config = ServerConfig {
        health_toggle_interval: Some(Duration::from_millis(200)),
        ..test_config()
    };
    let running = start_with(config).await;
    let mut client = health_client(&running.server).await;

    let mut watch = client
        .watch(HealthCheckRequest {
            service: SYSTEM_SERVICE.to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    let first = watch.message().await.unwrap().unwrap();

    // Whatever the status was when the watch opened, the next tick flips it
    let flipped = tokio::time::timeout(STARTUP_TIMEOUT, watch.message())
        .await
        .expect("oscillator did not flip the status")
        .unwrap()
        .unwrap();
    assert_ne!(flipped.status, first.status);

    // Within a few periods it reports NOT_SERVING at least once
    let mut saw_not_serving = first.status == WireStatus::NotServing as i32
        || flipped.status == WireStatus::NotServing as i32;
    while !saw_not_serving {
        let update = tokio::time::timeout(STARTUP_TIMEOUT, watch.message())
            .await
            .expect("no status update")
            .unwrap()
            .unwrap();
        saw_not_serving = update.status == WireStatus::NotServing as i32;
    }

    drop(watch);
    drop(client);
    let (_, result) = running.stop().await;
    assert!(result.is_ok());
}
