//! Request throttling with retry.
//!
//! Requests are queued FIFO and run one at a time by a drain task that is
//! started on demand. Consecutive dispatches start at least
//! `60s / requests_per_minute` apart; a failed request is retried with
//! exponential backoff before its error reaches the caller.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::ClientError;

type Job = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based): base * 2^attempt,
    /// capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Default)]
struct LimiterState {
    queue: VecDeque<Job>,
    draining: bool,
    last_dispatch: Option<Instant>,
}

#[derive(Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    retry: RetryPolicy,
    state: Arc<Mutex<LimiterState>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_retry(requests_per_minute, RetryPolicy::default())
    }

    pub fn with_retry(requests_per_minute: u32, retry: RetryPolicy) -> Self {
        let per_minute = requests_per_minute.max(1);
        Self {
            min_interval: Duration::from_millis(60_000 / per_minute as u64),
            retry,
            state: Arc::new(Mutex::new(LimiterState::default())),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Queue `op` and wait for its result. `op` is called again for every
    /// retry, so it must build a fresh request each time.
    pub async fn request<T, F, Fut>(&self, op: F) -> Result<T, ClientError>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let retry = self.retry;
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let result = with_retry(retry, op).await;
                let _ = tx.send(result);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });

        let start_drain = {
            let mut state = self.lock();
            state.queue.push_back(job);
            !std::mem::replace(&mut state.draining, true)
        };
        if start_drain {
            tokio::spawn(self.clone().drain());
        }

        // A job dropped by `clear` closes the channel without a reply.
        rx.await.unwrap_or(Err(ClientError::Cancelled))
    }

    /// Requests waiting to be dispatched.
    pub fn queue_size(&self) -> usize {
        self.lock().queue.len()
    }

    /// Drop every request that has not started yet. Their callers receive
    /// [`ClientError::Cancelled`].
    pub fn clear(&self) {
        let dropped = std::mem::take(&mut self.lock().queue);
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "Cleared rate limiter queue");
        }
    }

    async fn drain(self) {
        loop {
            let wait = {
                let mut state = self.lock();
                if state.queue.is_empty() {
                    // `request` checks this flag under the same lock.
                    state.draining = false;
                    return;
                }
                state
                    .last_dispatch
                    .map(|last| (last + self.min_interval).saturating_duration_since(Instant::now()))
                    .unwrap_or_default()
            };
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }

            let job = {
                let mut state = self.lock();
                let job = state.queue.pop_front();
                if job.is_some() {
                    state.last_dispatch = Some(Instant::now());
                }
                job
            };
            if let Some(job) = job {
                job().await;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn with_retry<T, F, Fut>(policy: RetryPolicy, op: F) -> Result<T, ClientError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                warn!(error = %e, attempt = attempt + 1, ?delay, "Request failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
