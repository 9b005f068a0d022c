//! Graceful shutdown helper.

use tokio::{
    signal::unix::{signal, SignalKind},
    sync::broadcast,
};
use tracing::{error, info};

/// Listens for SIGTERM and SIGINT and broadcasts a shutdown notification to subscribers
pub struct Shutdown {
    tx_shutdown: broadcast::Sender<()>,
}

impl Default for Shutdown {
    fn default() -> Self {
        let (tx_shutdown, _) = broadcast::channel(1);
        Self { tx_shutdown }
    }
}

impl Shutdown {
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx_shutdown.subscribe()
    }

    pub async fn run(&self) -> Result<(), ()> {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(err), _) | (_, Err(err)) => {
                    error!("Failed to install signal handlers: {}", err);
                    return Err(());
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, cancelling pipeline..."),
            _ = sigint.recv() => info!("Received SIGINT, cancelling pipeline..."),
        };

        self.tx_shutdown.send(()).map(|_| ()).map_err(|_| ())
    }
}
