use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

/// Exponential backoff configuration shared by the blocking and async
/// retry wrappers.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Preset for transient network failures.
    pub fn transient() -> Self {
        Self::default()
    }

    /// Preset for database calls: more attempts, shorter delays.
    pub fn database() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Delay before the retry that follows attempt `attempt` (1-indexed):
    /// min(initial × base^(n−1), cap), randomized into [0.5×, 1.5×] when
    /// jitter is on.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.exponential_base.powi(attempt.saturating_sub(1) as i32);
        let mut delay = self.initial_delay.as_secs_f64() * exp;
        delay = delay.min(self.max_delay.as_secs_f64());
        if self.jitter {
            delay *= 0.5 + rand::thread_rng().gen::<f64>();
        }
        Duration::from_secs_f64(delay)
    }
}

/// Re-invoke a blocking operation until it succeeds, a non-retryable
/// failure occurs, or the attempts run out. Exhaustion returns the last
/// observed failure.
pub fn retry_blocking<T, E, F, R>(policy: &RetryPolicy, retryable: R, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && retryable(&err) => {
                let delay = policy.delay_for(attempt);
                info!(
                    "retry {}/{} after {:.2}s: {}",
                    attempt,
                    policy.max_attempts,
                    delay.as_secs_f64(),
                    err
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => {
                if attempt >= policy.max_attempts {
                    warn!("retry exhausted after {} attempts: {}", attempt, err);
                }
                return Err(err);
            }
        }
    }
}

/// Async counterpart of [`retry_blocking`], sleeping on the runtime.
pub async fn retry<T, E, F, Fut, R>(policy: &RetryPolicy, retryable: R, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && retryable(&err) => {
                let delay = policy.delay_for(attempt);
                info!(
                    "retry {}/{} after {:.2}s: {}",
                    attempt,
                    policy.max_attempts,
                    delay.as_secs_f64(),
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if attempt >= policy.max_attempts {
                    warn!("retry exhausted after {} attempts: {}", attempt, err);
                }
                return Err(err);
            }
        }
    }
}
