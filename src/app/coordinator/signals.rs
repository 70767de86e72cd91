//! Signal handling for graceful shutdown
//!
//! Ctrl-C or SIGTERM cancels the run's shared token. Every suspension point
//! in the client, queue and workers races that token, so in-flight transfers
//! stop and their temp files are removed.

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Signal handler for graceful shutdown coordination
pub struct SignalHandler;

impl SignalHandler {
    /// Spawns a task that cancels `cancel` on Ctrl-C or SIGTERM
    ///
    /// The task also ends quietly if `cancel` is triggered some other way.
    pub fn setup(cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    warn!("Could not install Ctrl+C handler: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        warn!("Could not install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ctrl_c => {
                    info!("Received Ctrl+C, cancelling downloads");
                },
                _ = terminate => {
                    info!("Received terminate signal, cancelling downloads");
                },
            }

            cancel.cancel();
        })
    }
}
