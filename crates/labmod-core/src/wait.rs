//! Polling wait primitive.
//!
//! Firmware reports physical progress on its own schedule and offers no
//! completion signal, so every blocking module call suspends here: the status
//! accessor is polled at a fixed interval until the terminal status appears
//! or the ceiling elapses.
//!
//! The wait is an ordinary future. Dropping it (for example when the run is
//! aborted) cancels the wait without touching the hardware.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::error::{ModuleError, ModuleResult};

/// Poll interval and ceiling for blocking waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl WaitPolicy {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }
}

/// Poll `read` until `done` accepts its value, returning that value.
///
/// Fails with [`ModuleError::HardwareTimeout`] if `policy.timeout` elapses
/// first, or with the driver's error if a read fails. Nothing is retried.
pub async fn poll_until<S, F, Fut, D>(
    policy: &WaitPolicy,
    what: &str,
    mut read: F,
    done: D,
) -> ModuleResult<S>
where
    S: Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<S>>,
    D: Fn(&S) -> bool,
{
    let poll = async {
        loop {
            let status = read().await?;
            if done(&status) {
                return Ok::<S, ModuleError>(status);
            }
            debug!(what, ?status, "waiting");
            sleep(policy.poll_interval).await;
        }
    };

    match timeout(policy.timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(ModuleError::HardwareTimeout {
            what: what.to_string(),
            timeout: policy.timeout,
        }),
    }
}

/// Hold for `seconds` once a target has been reached.
///
/// A hold too long to represent sleeps indefinitely rather than panicking.
pub async fn hold(seconds: f64) {
    if seconds > 0.0 {
        sleep(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)).await;
    }
}
