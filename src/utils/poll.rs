//! Bounded polling for collaborators that wait on something outside their
//! control, e.g. a third-party script that injects a global or a child node.
//! Dropping the returned future cancels the poll.

use crate::domain::ports::{Dom, ElementId};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub satisfied: bool,
    pub elapsed: Duration,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome<T> {
    pub value: Option<T>,
    pub elapsed: Duration,
    pub attempts: u32,
}

/// Probes until it yields a value or `options.timeout` elapses.
pub async fn poll_for<T, F>(mut probe: F, options: PollOptions) -> PollOutcome<T>
where
    F: FnMut() -> Option<T>,
{
    let started = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;
        if let Some(value) = probe() {
            return PollOutcome {
                value: Some(value),
                elapsed: started.elapsed(),
                attempts,
            };
        }

        let elapsed = started.elapsed();
        if elapsed >= options.timeout {
            tracing::debug!("Poll gave up after {:?} ({} attempts)", elapsed, attempts);
            return PollOutcome {
                value: None,
                elapsed,
                attempts,
            };
        }

        let remaining = options.timeout - elapsed;
        tokio::time::sleep(options.interval.min(remaining)).await;
    }
}

pub async fn poll_until<F>(mut condition: F, options: PollOptions) -> PollReport
where
    F: FnMut() -> bool,
{
    let outcome = poll_for(|| condition().then_some(()), options).await;
    PollReport {
        satisfied: outcome.value.is_some(),
        elapsed: outcome.elapsed,
        attempts: outcome.attempts,
    }
}

/// Waits for a descendant of `parent` carrying `attribute`.
pub async fn child_exists<D: Dom>(
    dom: &D,
    parent: ElementId,
    attribute: &str,
    options: PollOptions,
) -> PollOutcome<ElementId> {
    poll_for(|| dom.query_child(parent, attribute), options).await
}
