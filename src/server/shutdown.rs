//! Cancellation for a running server
//!
//! [`shutdown_channel`] returns the controller kept by whoever decides when
//! to stop, and the signal handed to [`crate::Server::start`]. Firing the
//! controller drains the server: no new connections are accepted and
//! in-flight requests finish.

use tokio::sync::watch;
use tracing::info;

/// Receiving side of the cancellation channel
///
/// Cheap to clone; every clone observes the same shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown has been requested
    ///
    /// Dropping the controller counts as a shutdown request.
    pub async fn wait(&mut self) {
        // wait_for checks the current value first, so a signal fired before
        // this call is not missed.
        let _ = self.receiver.wait_for(|stopped| *stopped).await;
    }

    /// Owned future resolving on shutdown, for APIs that take `'static` futures
    pub fn cancelled(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut signal = self.clone();
        async move { signal.wait().await }
    }

    /// Non-blocking check
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Sending side of the cancellation channel
#[derive(Debug)]
pub struct ShutdownController {
    sender: watch::Sender<bool>,
}

impl ShutdownController {
    /// Request shutdown of every server holding a matching signal
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
        info!("Shutdown signal sent");
    }
}

/// Create a controller/signal pair
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownController { sender }, ShutdownSignal { receiver })
}

/// Wait for SIGTERM or SIGINT
///
/// Returns the name of the signal received, or an error when the handlers
/// cannot be installed.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!(signal = name, "Received termination signal");
    Ok(name)
}

/// Wait for Ctrl+C (non-unix)
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    Ok("CTRL_C")
}
