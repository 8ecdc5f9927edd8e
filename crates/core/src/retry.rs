//! Bounded retry with optional exponential backoff.
//!
//! Every remote call in a decommission runs through [`retry_bounded`]: a fixed
//! attempt budget, a deadline per attempt and a cancellation token. Exhausting the
//! budget is not an error; callers decide whether to continue.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::VacateError;

/// Deadline for a single control-plane or cluster API call made outside a retry loop.
pub const REMOTE_CALL_DEADLINE: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub interval: Duration,
    /// Multiplier applied to the delay after every failed attempt (1.0 = fixed interval).
    pub backoff_factor: f64,
    pub max_interval: Duration,
    pub per_attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self { max_attempts, interval, backoff_factor: 1.0, max_interval: interval, per_attempt_timeout: None }
    }

    pub fn exponential(max_attempts: u32, interval: Duration, factor: f64, max_interval: Duration) -> Self {
        Self { max_attempts, interval, backoff_factor: factor, max_interval, per_attempt_timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = Some(timeout);
        self
    }

    /// Drain: 3 attempts, 2s apart, each bounded by the drain timeout.
    pub fn drain(timeout: Duration) -> Self { Self::fixed(3, Duration::from_secs(2)).with_timeout(timeout) }

    /// Cleanup job polling: 10 attempts, 2s apart, 15s per status read.
    pub fn job_completion() -> Self { Self::fixed(10, Duration::from_secs(2)).with_timeout(Duration::from_secs(15)) }

    /// Host-side wait for workload containers to disappear: 30 checks, 10s apart.
    pub fn wait_for_workloads() -> Self { Self::fixed(30, Duration::from_secs(10)) }

    /// Delay slept after `attempt` (1-based) failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.interval.as_secs_f64() * self.backoff_factor.max(1.0).powi(exp);
        Duration::from_secs_f64(secs.min(self.max_interval.max(self.interval).as_secs_f64()))
    }
}

/// Result of a single attempt that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Done(T),
    /// Not there yet; the reason is logged.
    Pending(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Completed { value: T, attempts: u32 },
    Exhausted { attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn is_completed(&self) -> bool { matches!(self, RetryOutcome::Completed { .. }) }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Completed { attempts, .. } | RetryOutcome::Exhausted { attempts } => *attempts,
        }
    }

    pub fn value(self) -> Option<T> {
        match self {
            RetryOutcome::Completed { value, .. } => Some(value),
            RetryOutcome::Exhausted { .. } => None,
        }
    }
}

/// Run `op` until it reports [`Attempt::Done`] or the policy's budget is spent.
///
/// Errors and per-attempt deadline expiry are logged and count as a failed attempt.
/// Only cancellation ends the loop early with an error.
pub async fn retry_bounded<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &str,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<RetryOutcome<T>, VacateError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T>, VacateError>>,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let fut = op(attempt);
        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(VacateError::Cancelled),
            res = async {
                match policy.per_attempt_timeout {
                    Some(t) => tokio::time::timeout(t, fut).await.map_err(VacateError::from).and_then(|r| r),
                    None => fut.await,
                }
            } => res,
        };
        match res {
            Ok(Attempt::Done(value)) => {
                debug!(operation, attempt, "operation completed");
                return Ok(RetryOutcome::Completed { value, attempts: attempt });
            }
            Ok(Attempt::Pending(reason)) => info!(operation, attempt, max = attempts, reason = %reason, "not finished, backing off"),
            Err(VacateError::Cancelled) => return Err(VacateError::Cancelled),
            Err(e) => warn!(operation, attempt, max = attempts, error = %e, "attempt failed, retrying"),
        }
        if attempt < attempts {
            let delay = policy.delay_after(attempt);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(VacateError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
    warn!(operation, attempts, "retry budget exhausted");
    Ok(RetryOutcome::Exhausted { attempts })
}

/// Run one remote call under `deadline`.
///
/// Expiry becomes a [`VacateError::Timeout`] (retryable); cancellation wins over
/// a call that is still in flight.
pub async fn call_with_deadline<Fut, T>(
    deadline: Duration,
    operation: &str,
    cancel: &CancellationToken,
    call: Fut,
) -> Result<T, VacateError>
where
    Fut: Future<Output = Result<T, VacateError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(VacateError::Cancelled),
        res = tokio::time::timeout(deadline, call) => match res {
            Ok(res) => res,
            Err(_) => {
                warn!(operation, deadline_ms = deadline.as_millis() as u64, "call exceeded its deadline");
                Err(VacateError::Timeout(format!("{} exceeded {:?}", operation, deadline)))
            }
        },
    }
}
