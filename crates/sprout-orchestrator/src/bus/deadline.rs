//! Deadline-bounded invocation.
//!
//! Cancellation is best-effort: on timeout the invocation's future is dropped
//! and its token is cancelled, but work it already detached (spawned tasks,
//! in-flight HTTP calls) may still run to completion. Its result is discarded.
//!
//! A panic inside the invocation is caught and reported as
//! [`Interrupted::Panicked`], so one misbehaving handler cannot unwind
//! through a drain pass.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why an invocation produced no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Interrupted {
    /// The deadline elapsed before the invocation finished.
    #[error("deadline of {0:?} elapsed")]
    Elapsed(Duration),

    /// The invocation panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Runs `invoke` racing it against `deadline`.
///
/// # Arguments
/// * `deadline` - Maximum time to wait
/// * `token` - The invocation's cancellation token, handed to `invoke`
/// * `invoke` - Builds the future from the token
///
/// # Errors
/// Returns `Interrupted::Elapsed` if the deadline passes first; `token` is
/// cancelled before returning. Returns `Interrupted::Panicked` if the
/// invocation panics.
pub async fn run_with_deadline<F, Fut, T>(
    deadline: Duration,
    token: CancellationToken,
    invoke: F,
) -> Result<T, Interrupted>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = T>,
{
    let fut = AssertUnwindSafe(invoke(token.clone())).catch_unwind();

    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(payload)) => Err(Interrupted::Panicked(panic_message(payload.as_ref()))),
        Err(_) => {
            token.cancel();
            Err(Interrupted::Elapsed(deadline))
        }
    }
}
