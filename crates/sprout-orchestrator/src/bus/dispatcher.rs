//! Background drain task for the bus.
//!
//! The dispatcher sleeps until something is published or routed, then runs
//! one drain pass. Items published while a pass runs are picked up by that
//! same pass.

use super::MessageBus;
use crate::error::{OrchestrationError, Result};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Running {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Drains the bus in a background task.
pub struct BusDispatcher {
    bus: Arc<MessageBus>,
    running: Mutex<Option<Running>>,
}

impl fmt::Debug for BusDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusDispatcher")
            .field(
                "running",
                &self.running.try_lock().map(|r| r.as_ref().is_some_and(Running::is_alive)).unwrap_or(true),
            )
            .finish_non_exhaustive()
    }
}

impl BusDispatcher {
    /// Creates a stopped dispatcher for `bus`.
    #[must_use]
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus, running: Mutex::new(None) }
    }

    /// Starts the drain task.
    ///
    /// # Errors
    /// Returns `AlreadyRunning` if the task is already running.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(Running::is_alive) {
            return Err(OrchestrationError::AlreadyRunning("bus dispatcher"));
        }
        if let Some(ended) = running.take() {
            warn!("Bus dispatcher task had ended, restarting");
            ended.token.cancel();
        }

        let token = CancellationToken::new();
        let bus = Arc::clone(&self.bus);
        let stop = token.clone();

        let handle = tokio::spawn(async move {
            info!("Bus dispatcher started");
            // Drain whatever was queued before the dispatcher existed.
            bus.drain().await;

            loop {
                tokio::select! {
                    () = stop.cancelled() => {
                        info!("Bus dispatcher shutdown signal received");
                        break;
                    }
                    () = bus.notified() => {
                        let report = bus.drain().await;
                        debug!(
                            events = report.events_dispatched,
                            messages = report.messages_dispatched,
                            skipped = report.skipped,
                            "Bus drain pass finished"
                        );
                    }
                }
            }
        });

        *running = Some(Running { token, handle });
        Ok(())
    }

    /// Stops the drain task and waits for it to finish. Idempotent.
    pub async fn stop(&self) {
        let Some(Running { token, handle }) = self.running.lock().await.take() else {
            return;
        };
        token.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "Bus dispatcher task ended abnormally");
        }
    }

    /// True while the drain task runs.
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.as_ref().is_some_and(Running::is_alive)
    }
}
