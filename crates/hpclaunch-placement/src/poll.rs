//! Bounded-time condition polling.
//!
//! Runs on `tokio::time`, so callers under a paused test clock see the
//! same schedule without waiting in real time.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use hpclaunch_core::PollingConfig;

/// Total budget and spacing for one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub budget: Duration,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(budget: Duration, interval: Duration) -> Self {
        Self { budget, interval }
    }

    /// Waiting for an instance to leave `BUILD`.
    pub fn instance_active(config: &PollingConfig) -> Self {
        Self::new(config.active_budget(), config.active_interval())
    }

    /// Waiting for an attached floating address to show on the instance.
    pub fn address_attached(config: &PollingConfig) -> Self {
        Self::new(config.address_budget(), config.address_interval())
    }
}

/// Call `check` every `policy.interval` until it yields `true` or
/// `policy.budget` has elapsed.
///
/// Returns `Ok(false)` on timeout. An `Err` from `check` ends the poll at
/// once and is returned unchanged.
pub async fn poll_until<F, Fut, E>(policy: PollPolicy, mut check: F) -> Result<bool, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let deadline = Instant::now() + policy.budget;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        if check().await? {
            debug!(attempts, "poll condition met");
            return Ok(true);
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(attempts, budget = ?policy.budget, "poll budget exhausted");
            return Ok(false);
        }
        sleep(policy.interval.min(deadline - now)).await;
    }
}
