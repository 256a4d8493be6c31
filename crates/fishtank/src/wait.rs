//! Generic cooperative polling: repeatedly invoke a readiness check until it
//! signals ready or a deadline elapses. This is the sole retry mechanism in
//! the crate; backend command failures and RPC errors raised inside a check
//! propagate immediately and are never retried here.

use std::future::Future;
use std::time::Duration;

use color_eyre::eyre;
use tokio::time::{sleep, Instant};

use crate::error::TimeoutError;

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// The unit polled by the wait loop. `reason` describes why the check is not
/// ready yet and ends up in the [`TimeoutError`] if the deadline passes.
#[derive(Debug, Clone)]
pub struct Readiness {
    pub ready: bool,
    pub reason: String,
}

impl Readiness {
    pub fn ready() -> Self {
        Self { ready: true, reason: String::new() }
    }

    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self { ready: false, reason: reason.into() }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self { timeout: DEFAULT_WAIT_TIMEOUT, interval: DEFAULT_POLL_INTERVAL }
    }
}

impl WaitOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout, ..Self::default() }
    }
}

/// Poll `check` until it reports ready, sleeping `options.interval` between
/// attempts. A check that is immediately ready returns without sleeping.
///
/// Fails with [`TimeoutError`] carrying the last observed reason once
/// `options.timeout` has elapsed. Each invocation owns its own deadline;
/// concurrent callers share no state.
pub async fn loop_with_timeout<C, F>(options: WaitOptions, mut check: C) -> eyre::Result<()>
where
    C: FnMut() -> F,
    F: Future<Output = eyre::Result<Readiness>>,
{
    let deadline = Instant::now() + options.timeout;
    let mut status;

    loop {
        status = check().await?;
        if status.ready {
            return Ok(());
        }
        if Instant::now() >= deadline {
            break;
        }
        sleep(options.interval).await;
        if Instant::now() >= deadline {
            break;
        }
    }

    Err(TimeoutError { timeout: options.timeout, reason: status.reason }.into())
}
