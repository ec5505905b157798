//! Graceful shutdown handling.
//!
//! A `ShutdownCoordinator` turns SIGTERM/SIGINT (Ctrl+C on other platforms)
//! into a shutdown request. The run command wires it to
//! [`Scheduler::cancel`](crate::engine::Scheduler::cancel) so an interrupted
//! run ends `cancelled` instead of leaving jobs polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::Scheduler;

#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Request shutdown. Can be called multiple times safely.
    pub fn request_shutdown(&self) {
        let was_requested = self.shutdown_requested.swap(true, Ordering::SeqCst);
        if !was_requested {
            info!("Shutdown requested");
            self.notify.notify_waiters();
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown is requested; immediately if it already was.
    pub async fn wait_for_shutdown(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }

    /// Cancel the scheduler's active run when shutdown is requested.
    pub fn cancel_on_shutdown(&self, scheduler: Arc<Scheduler>) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.wait_for_shutdown().await;
            if scheduler.cancel() {
                info!("Active execution cancelled by shutdown");
            }
        })
    }

    /// Spawn a listener for SIGTERM/SIGINT, or Ctrl+C off Unix.
    pub fn start_signal_listener(&self) {
        let coordinator = self.clone();

        tokio::spawn(async move {
            #[cfg(unix)]
            {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate())
                {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("Failed to create SIGTERM handler: {}", e);
                        signal::ctrl_c().await.ok();
                        coordinator.request_shutdown();
                        return;
                    }
                };
                let mut sigint = match signal::unix::signal(signal::unix::SignalKind::interrupt()) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("Failed to create SIGINT handler: {}", e);
                        sigterm.recv().await;
                        coordinator.request_shutdown();
                        return;
                    }
                };

                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, cancelling"),
                    _ = sigint.recv() => info!("Received SIGINT, cancelling"),
                }
            }

            #[cfg(not(unix))]
            {
                if let Err(e) = signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                    return;
                }
                info!("Received Ctrl+C, cancelling");
            }

            coordinator.request_shutdown();
        });
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
