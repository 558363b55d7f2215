//! Graceful shutdown on SIGINT / SIGTERM.
//!
//! A signal stops the scan from reading further candidates. Lines already
//! in flight are still matched and written, so the report stays a valid
//! prefix of the full result.

use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};

/// Shared stop flag. Tasks can poll it or await [`ShutdownToken::cancelled`]
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Resolves once the token is cancelled, immediately if it already is
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this cannot fail
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a task that cancels `token` on the first SIGINT or SIGTERM.
///
/// If no handler can be registered the scan simply runs to completion.
pub fn listen_for_shutdown(token: ShutdownToken) {
    tokio::spawn(async move {
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| warn!("Failed to register SIGINT handler: {}", e))
            .ok();
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| warn!("Failed to register SIGTERM handler: {}", e))
            .ok();

        let name = match (sigint, sigterm) {
            (Some(mut int), Some(mut term)) => {
                tokio::select! {
                    _ = int.recv() => "SIGINT",
                    _ = term.recv() => "SIGTERM",
                }
            }
            (Some(mut int), None) => {
                int.recv().await;
                "SIGINT"
            }
            (None, Some(mut term)) => {
                term.recv().await;
                "SIGTERM"
            }
            (None, None) => {
                warn!("No signal handlers registered - graceful shutdown disabled");
                return;
            }
        };

        info!("Received {}, finishing lines in flight...", name);
        token.cancel();
    });
}
