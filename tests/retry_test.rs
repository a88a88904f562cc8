use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use lakesql::retry::{retry, retry_blocking, RetryPolicy};

#[derive(Debug, PartialEq)]
struct TestError {
    message: String,
    transient: bool,
}

impl TestError {
    fn transient(message: &str) -> Self {
        Self {
            message: message.to_string(),
            transient: true,
        }
    }

    fn fatal(message: &str) -> Self {
        Self {
            message: message.to_string(),
            transient: false,
        }
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        exponential_base: 2.0,
        jitter: false,
    }
}

#[test]
fn test_succeeds_after_two_failures() {
    let calls = AtomicU32::new(0);
    let result = retry_blocking(&fast_policy(3), |e: &TestError| e.transient, || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n < 3 {
            Err(TestError::transient("flaky"))
        } else {
            Ok(n)
        }
    });
    assert_eq!(result, Ok(3));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_non_retryable_propagates_on_first_attempt() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = retry_blocking(&fast_policy(3), |e: &TestError| e.transient, || {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(TestError::fatal("broken"))
    });
    assert_eq!(result, Err(TestError::fatal("broken")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_exhaustion_returns_last_failure() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = retry_blocking(&fast_policy(3), |e: &TestError| e.transient, || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Err(TestError::transient(&format!("attempt {}", n)))
    });
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.unwrap_err().message, "attempt 3");
}

#[test]
fn test_first_try_success_calls_once() {
    let calls = AtomicU32::new(0);
    let result = retry_blocking(&fast_policy(3), |_: &TestError| true, || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(42)
    });
    assert_eq!(result, Ok(42));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_delay_grows_exponentially_and_caps() {
    let policy = RetryPolicy {
        max_attempts: 10,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(4),
        exponential_base: 2.0,
        jitter: false,
    };
    assert_eq!(policy.delay_for(1), Duration::from_secs(1));
    assert_eq!(policy.delay_for(2), Duration::from_secs(2));
    assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    // Capped from here on.
    assert_eq!(policy.delay_for(4), Duration::from_secs(4));
}

#[test]
fn test_jitter_stays_in_half_to_one_and_a_half_range() {
    let policy = RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(60),
        exponential_base: 2.0,
        jitter: true,
    };
    for _ in 0..100 {
        let delay = policy.delay_for(1).as_secs_f64();
        assert!((1.0..=3.0).contains(&delay), "delay out of range: {delay}");
    }
}

#[test]
fn test_presets() {
    assert_eq!(RetryPolicy::transient().max_attempts, 3);
    let database = RetryPolicy::database();
    assert_eq!(database.max_attempts, 5);
    assert_eq!(database.initial_delay, Duration::from_millis(500));
    assert_eq!(database.max_delay, Duration::from_secs(30));
}

#[tokio::test]
async fn test_async_retry_succeeds_after_failures() {
    let calls = AtomicU32::new(0);
    let result = retry(&fast_policy(3), |e: &TestError| e.transient, || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if n < 2 {
                Err(TestError::transient("flaky"))
            } else {
                Ok("done")
            }
        }
    })
    .await;
    assert_eq!(result, Ok("done"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_async_non_retryable_propagates() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = retry(&fast_policy(5), |e: &TestError| e.transient, || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(TestError::fatal("no")) }
    })
    .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
