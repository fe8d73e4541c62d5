//! Fixed-delay retry combinator
//!
//! Every retry-forever loop in the agent goes through [`RetryPolicy::run`],
//! so the policy (delay, which errors are retryable) is decided in one place
//! per call site and can be exercised with injected faults.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Default delay between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Retry an operation with a fixed delay until it succeeds or fails with a
/// non-retryable error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    /// Run `op` until it returns `Ok` or an error for which `is_retryable`
    /// is false
    pub async fn run<T, E, F, Fut, P>(&self, label: &str, is_retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt: u32 = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation = label, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !is_retryable(&e) => return Err(e),
                Err(e) => {
                    warn!(
                        operation = label,
                        attempt,
                        error = %e,
                        retry_in_secs = self.delay.as_secs(),
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Shorthand for an indefinite fixed-delay [`RetryPolicy`]
pub async fn retry_until<T, E, F, Fut, P>(
    label: &str,
    delay: Duration,
    is_retryable: P,
    op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    RetryPolicy::fixed(delay).run(label, is_retryable, op).await
}
