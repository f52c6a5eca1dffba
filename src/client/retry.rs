use async_trait::async_trait;
use reqwest::StatusCode;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::transport::Reply;

/// Maximum number of retries after the initial attempt
pub const MAX_RETRIES: u32 = 5;

/// Base of the exponential backoff, in seconds
pub const BACKOFF_BASE_SECS: u64 = 2;

/// Source of delays between retries and poll passes
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Classifies the outcome of one attempt
pub trait RetryDecision {
    /// Cause to report when the outcome is transient, `None` when it is final
    fn retry_cause(&self) -> Option<String>;
}

impl RetryDecision for Result<Reply, reqwest::Error> {
    fn retry_cause(&self) -> Option<String> {
        match self {
            Ok(reply) if reply.status == StatusCode::TOO_MANY_REQUESTS => Some(reply.status.to_string()),
            Ok(_) => None,
            Err(e) if is_transient(e) => Some(e.to_string()),
            Err(_) => None,
        }
    }
}

/// Connection failures, timeouts, and I/O errors while the body streams in.
///
/// Builder, redirect and decode errors are final.
pub fn is_transient(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_body()
}

/// Exponential-backoff retry for transient transport failures
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay_secs: u64,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay_secs", &self.base_delay_secs)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_RETRIES)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_secs: BACKOFF_BASE_SECS,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the sleeper used between attempts
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (1-based): base^attempt seconds
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.base_delay_secs.saturating_pow(attempt))
    }

    /// Run `operation` until it yields a final outcome or the retries run out.
    ///
    /// The last outcome is returned as-is once the ceiling is reached, whether
    /// it is an error or a rate-limited response.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = T>,
        T: RetryDecision,
    {
        let mut attempt = 0;
        loop {
            let outcome = operation().await;
            let cause = match outcome.retry_cause() {
                Some(cause) if attempt < self.max_retries => cause,
                _ => return outcome,
            };

            attempt += 1;
            let delay = self.delay_for(attempt);
            warn!(
                "Request failed with {}. Waiting {:?} before next retry. Retry attempt {}",
                cause, delay, attempt
            );
            self.sleeper.sleep(delay).await;
        }
    }
}
