use dualserve::generation::{EchoGenerator, TextGenerationService};
use dualserve::server::{shutdown_channel, wait_for_signal};
use dualserve::{Server, ServerConfig};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting dualserve");

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    let (shutdown_controller, shutdown_signal) = shutdown_channel();
    let server = Server::new(config, TextGenerationService::new(EchoGenerator));

    // Translate SIGTERM/SIGINT into a graceful drain
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => info!(signal = signal, "Initiating graceful shutdown"),
            Err(e) => warn!(error = %e, "Signal handlers unavailable, shutting down"),
        }
        shutdown_controller.shutdown();
    });

    server.start(shutdown_signal).await?;

    info!("dualserve shut down gracefully");
    Ok(())
}
