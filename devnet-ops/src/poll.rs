use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration, Instant};

use crate::errors::{Error, Result};

/// Interval and deadline of one poll loop.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Calls `check` every interval until `still_failing` returns no hosts,
/// or the deadline passes.
///
/// An error from `check` means the state could not be determined and aborts
/// the loop right away. On timeout the error lists the hosts that were still
/// failing on the last observation.
pub async fn wait_for<T, C, Fut, P>(
    what: &str,
    cfg: PollConfig,
    mut check: C,
    still_failing: P,
) -> Result<T>
where
    C: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> Vec<String>,
{
    let start = Instant::now();
    let deadline = start + cfg.timeout;
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let observed = check().await?;
        let mut failing = still_failing(&observed);
        if failing.is_empty() {
            log::info!(
                "{what}: done after {attempt} attempt(s) ({:?} elapsed)",
                start.elapsed()
            );
            return Ok(observed);
        }

        let now = Instant::now();
        if now >= deadline {
            failing.sort();
            log::warn!("{what}: timed out after {attempt} attempt(s), still failing {failing:?}");
            return Err(Error::Timeout {
                message: format!("{what} timed out after {:?}", cfg.timeout),
                hosts: failing,
            });
        }

        let wait = cfg.interval.min(deadline - now);
        log::info!(
            "{what}: {} host(s) not ready yet, retrying in {wait:?} ({:?} elapsed)",
            failing.len(),
            start.elapsed()
        );
        sleep(wait).await;
    }
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- poll::test_wait_for_success --exact --show-output
#[tokio::test(start_paused = true)]
async fn test_wait_for_success() {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let calls = Arc::new(AtomicU32::new(0));
    let started = Instant::now();
    let observed = wait_for(
        "waiting for hosts",
        PollConfig::default(),
        || {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                // i-2 becomes ready on the third observation
                if n < 2 {
                    Ok(vec!["i-2".to_string()])
                } else {
                    Ok(Vec::new())
                }
            }
        },
        |pending: &Vec<String>| pending.clone(),
    )
    .await
    .unwrap();
    assert!(observed.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(20));
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- poll::test_wait_for_timeout --exact --show-output
#[tokio::test(start_paused = true)]
async fn test_wait_for_timeout() {
    let cfg = PollConfig::new(Duration::from_secs(7), Duration::from_secs(30));
    let started = Instant::now();
    let err = wait_for(
        "waiting for healthy hosts",
        cfg,
        || async { Ok(vec!["i-3".to_string(), "i-1".to_string()]) },
        |pending: &Vec<String>| pending.clone(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.failed_hosts(), vec!["i-1".to_string(), "i-3".to_string()]);
    assert!(err.is_not_ready());
    // never past timeout + one interval
    let elapsed = started.elapsed();
    assert!(elapsed >= cfg.timeout);
    assert!(elapsed <= cfg.timeout + cfg.interval);
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- poll::test_wait_for_check_error_aborts --exact --show-output
#[tokio::test(start_paused = true)]
async fn test_wait_for_check_error_aborts() {
    let started = Instant::now();
    let err = wait_for(
        "waiting for bootstrap",
        PollConfig::default(),
        || async {
            Err::<Vec<String>, Error>(Error::Transport {
                host: "i-9".to_string(),
                message: "connection refused".to_string(),
            })
        },
        |pending: &Vec<String>| pending.clone(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Transport { .. }));
    assert_eq!(started.elapsed(), Duration::from_secs(0));
}
