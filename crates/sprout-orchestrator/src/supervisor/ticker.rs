//! Cancellable periodic task.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs a callback every `period` until stopped.
///
/// The first call happens one full period after spawning. Ticks missed while
/// a callback runs are not made up.
pub struct HealthTicker {
    period: Duration,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl fmt::Debug for HealthTicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthTicker")
            .field("period", &self.period)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl HealthTicker {
    /// Spawns the ticker on the current runtime.
    pub fn spawn<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let stop = token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    () = stop.cancelled() => {
                        debug!("Health ticker stopped");
                        break;
                    }
                    _ = interval.tick() => tick().await,
                }
            }
        });

        Self { period, token, handle }
    }

    /// The tick period.
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Stops the ticker and waits for an in-flight tick to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Health ticker task ended abnormally");
        }
    }
}
