//! Cancellable waits shared by the rate limiter and the executor.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{ForgeError, Result};

/// Sleep for `duration`, returning `Cancelled` as soon as the token fires.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ForgeError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Fail fast if the token has already fired.
pub fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(ForgeError::Cancelled)
    } else {
        Ok(())
    }
}
