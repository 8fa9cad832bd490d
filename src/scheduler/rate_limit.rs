//! Rate limiter shared by every worker of a run.
//!
//! Two mechanisms gate calls to the backend:
//! - a sliding window allowing at most `max_requests` admissions per `window`;
//! - a cooldown deadline that any worker can push forward after the backend
//!   reports rate limiting. While it is in the future, nobody is admitted.
//!
//! Waiters re-read the cooldown whenever it is signalled or reset, so a new
//! deadline reaches callers that are already queued.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::futures::Notified;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ForgeError, Result};

/// Rate limit configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Admissions allowed inside one window.
    pub max_requests: usize,
    /// Sliding window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    /// Create config with custom values. `max_requests` is at least 1.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
        }
    }
}

/// Time-ordered admission timestamps, oldest first.
#[derive(Debug, Default)]
struct RequestWindow {
    timestamps: VecDeque<Instant>,
}

impl RequestWindow {
    /// Drop timestamps that have left the window.
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long until a slot frees up, or None if one is free now.
    fn wait_time(&self, now: Instant, config: &RateLimitConfig) -> Option<Duration> {
        if self.timestamps.len() < config.max_requests {
            return None;
        }
        self.timestamps
            .front()
            .map(|&oldest| (oldest + config.window).saturating_duration_since(now))
    }
}

/// Sliding-window limiter with an externally settable cooldown.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    window: Mutex<RequestWindow>,
    /// When calls may resume (None = no active cooldown).
    cooldown_until: RwLock<Option<Instant>>,
    /// Wakes every waiter when the cooldown or the window is changed externally.
    changed: Notify,
    /// Cooldowns signalled since creation or last reset.
    cooldown_hits: AtomicU32,
}

impl RateLimiter {
    /// Create a limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: Mutex::new(RequestWindow::default()),
            cooldown_until: RwLock::new(None),
            changed: Notify::new(),
            cooldown_hits: AtomicU32::new(0),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait until a request may be sent, then record it.
    ///
    /// Blocks through any active cooldown first, then through the sliding
    /// window. Both waits re-check their deadline whenever `signal_cooldown`
    /// or `reset` runs. The window lock is only held to prune and record.
    /// Returns `Cancelled` as soon as the token fires.
    pub async fn admit(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if let Some(remaining) = self.cooldown_remaining() {
                tracing::debug!(remaining_ms = remaining.as_millis() as u64, "Cooling down before admission");
                self.wait(remaining, changed, cancel).await?;
                self.clear_expired_cooldown();
                continue;
            }

            let wait = {
                let mut window = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ForgeError::Cancelled),
                    guard = self.window.lock() => guard,
                };

                // A cooldown may have been signalled while we queued for the lock.
                if self.is_cooling_down() {
                    continue;
                }

                let now = Instant::now();
                window.prune(now, self.config.window);
                match window.wait_time(now, &self.config) {
                    None => {
                        window.timestamps.push_back(now);
                        return Ok(());
                    }
                    Some(wait) => wait,
                }
            };

            tracing::debug!(
                wait_ms = wait.as_millis() as u64,
                max_requests = self.config.max_requests,
                "Request window full, waiting"
            );
            self.wait(wait, changed, cancel).await?;
        }
    }

    /// Sleep for `duration`, returning early when the limiter state changes.
    async fn wait(&self, duration: Duration, changed: Pin<&mut Notified<'_>>, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ForgeError::Cancelled),
            _ = changed => Ok(()),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Set or overwrite the cooldown deadline to `now + duration`.
    ///
    /// Callers already waiting in `admit` pick up the new deadline, shorter or
    /// longer.
    pub fn signal_cooldown(&self, duration: Duration) {
        let until = Instant::now() + duration;
        *self.cooldown_until.write().unwrap_or_else(PoisonError::into_inner) = Some(until);
        let hits = self.cooldown_hits.fetch_add(1, Ordering::Relaxed) + 1;
        self.changed.notify_waiters();

        tracing::warn!(
            retry_after_secs = duration.as_secs(),
            consecutive_hits = hits,
            "Rate limited, backing off globally"
        );
    }

    /// Check if a cooldown is currently active.
    pub fn is_cooling_down(&self) -> bool {
        self.cooldown_remaining().is_some()
    }

    /// Deadline of the active cooldown, if any.
    pub fn retry_after(&self) -> Option<Instant> {
        let until = *self.cooldown_until.read().unwrap_or_else(PoisonError::into_inner);
        until.filter(|&u| Instant::now() < u)
    }

    /// Remaining cooldown if one is active.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        self.retry_after().map(|u| u.saturating_duration_since(Instant::now()))
    }

    /// Number of cooldowns signalled since creation or last reset.
    pub fn cooldown_hits(&self) -> u32 {
        self.cooldown_hits.load(Ordering::Relaxed)
    }

    /// Admissions currently inside the window.
    pub async fn recorded_requests(&self) -> usize {
        let mut window = self.window.lock().await;
        window.prune(Instant::now(), self.config.window);
        window.timestamps.len()
    }

    /// Clear the cooldown and forget all recorded requests, releasing waiters.
    pub async fn reset(&self) {
        *self.cooldown_until.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.cooldown_hits.store(0, Ordering::Relaxed);
        self.window.lock().await.timestamps.clear();
        self.changed.notify_waiters();
        tracing::info!("Rate limiter reset");
    }

    fn clear_expired_cooldown(&self) {
        let mut until = self.cooldown_until.write().unwrap_or_else(PoisonError::into_inner);
        if until.is_some_and(|u| u <= Instant::now()) {
            *until = None;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
