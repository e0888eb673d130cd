//! Retry a mutating call while its target resource is busy
//!
//! Some endpoints reject a change while the resource is still settling from a
//! previous one. The operation reports that as [`Attempt::Busy`]; the caller
//! then waits for the resource to become ready again and retries, all within
//! one overall timeout.

use std::future::Future;

use tokio::time::{Instant, sleep_until};

use crate::poller::{BoxError, Observation, PollError, PollResult, StatusPoller, instant_after};

/// Outcome of one attempt at a mutating operation
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    /// The operation was accepted
    Done(T),
    /// The resource is busy; wait for it and try again
    Busy(String),
}

/// Run `operation` until it is accepted, waiting on `ready_check` whenever it
/// reports the resource as busy.
///
/// `poller` supplies the overall timeout, the cancellation token, and the
/// interval and initial delay of each intermediate wait. Keep the initial
/// delay non-zero so that retries of a resource that reports ready while
/// still rejecting changes are paced.
pub async fn retry_with_wait<T, E, F, Fut, P, WE, W, WFut>(
    poller: &StatusPoller,
    mut operation: F,
    mut ready_check: W,
) -> PollResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Attempt<T>, E>>,
    E: Into<BoxError>,
    W: FnMut() -> WFut,
    WFut: Future<Output = Result<Observation<P>, WE>>,
    WE: Into<BoxError>,
{
    let config = *poller.config();
    config.validate()?;

    let target = poller.target().to_string();
    let deadline = instant_after(config.timeout);
    let mut attempts = 0u32;
    let mut last_reason: Option<String> = None;

    loop {
        if poller.cancellation().is_some_and(|t| t.is_cancelled()) {
            return Err(PollError::Cancelled { target });
        }
        if Instant::now() >= deadline {
            return Err(PollError::DeadlineExceeded {
                target,
                timeout: config.timeout,
                last_state: last_reason,
                attempts,
            });
        }

        attempts += 1;
        let result = tokio::select! {
            biased;
            _ = cancelled(poller) => return Err(PollError::Cancelled { target }),
            _ = sleep_until(deadline) => {
                return Err(PollError::DeadlineExceeded {
                    target,
                    timeout: config.timeout,
                    last_state: last_reason,
                    attempts,
                });
            }
            result = operation() => result,
        };

        match result {
            Ok(Attempt::Done(value)) => return Ok(value),
            Ok(Attempt::Busy(reason)) => {
                log::info!(
                    "{} is busy ({}), waiting before attempt {}",
                    target,
                    reason,
                    attempts + 1
                );
                let remaining = deadline.saturating_duration_since(Instant::now());
                let mut waiter = StatusPoller::new(target.clone(), config.with_timeout(remaining));
                if let Some(token) = poller.cancellation() {
                    waiter = waiter.with_cancellation(token.clone());
                }
                waiter.wait(&mut ready_check).await?;
                last_reason = Some(reason);
            }
            Err(e) => {
                return Err(PollError::Operation {
                    target,
                    source: e.into(),
                });
            }
        }
    }
}

async fn cancelled(poller: &StatusPoller) {
    match poller.cancellation() {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
