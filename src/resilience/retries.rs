//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether one attempt's outcome is retriable under the route policy
//! - Enforce the per-request retry count and an optional shared retry budget
//! - Schedule the next attempt with exponential backoff + jitter
//! - Cancel a pending retry when the request goes away
//!
//! # Design Decisions
//! - The retry callback never runs inside `should_retry`
//! - At most one retry is pending per request
//! - Jittered backoff prevents thundering herd
//! - Retry budget prevents retry storms under load
//! - Upstream resets count as 5xx

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use thiserror::Error;

use crate::observability::metrics;
use crate::policy::{RetryOn, RetryPolicy, RetryTrigger};
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::scheduler::{Scheduler, TimerHandle};
use crate::routing::headers::{
    GrpcStatus, RequestHeaders, ResponseHeaders, MAX_RETRIES, RETRY_GRPC_ON, RETRY_ON,
};

/// Base interval of the exponential backoff.
pub const BACKOFF_BASE: Duration = Duration::from_millis(25);
/// Backoff cap when the route sets no per-try timeout.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(250);

/// Whether a request should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStatus {
    /// The outcome is not retriable.
    No,
    /// The outcome is retriable but no retry budget is left.
    NoOverflow,
    /// A retry has been scheduled.
    Yes,
}

impl RetryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryStatus::No => "no",
            RetryStatus::NoOverflow => "overflow",
            RetryStatus::Yes => "yes",
        }
    }
}

/// Why an upstream stream ended without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    LocalReset,
    LocalRefusedStream,
    Overflow,
    RemoteReset,
    RemoteRefusedStream,
    ConnectionFailure,
    ConnectionTermination,
}

/// Outcome of one upstream attempt.
#[derive(Debug, Clone, Copy)]
pub enum AttemptOutcome<'a> {
    Response(&'a ResponseHeaders),
    Reset(ResetReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// The last outcome was not retriable.
    NoRetry,
    /// Retriable, but out of budget.
    Exhausted,
    /// The owning request cancelled its pending retry.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    Idle,
    Scheduled,
    Terminal(TerminalReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    #[error("a retry is already scheduled for this request")]
    AlreadyScheduled,
}

#[derive(Debug)]
struct BudgetWindow {
    started: Instant,
    requests: u64,
    retries: u64,
}

/// Shared cap on retries: at most `ratio` of the requests seen in the current
/// window may be retried, with `min_retries` always allowed.
#[derive(Debug)]
pub struct RetryBudget {
    ratio: f32,
    min_retries: u32,
    window: Duration,
    state: Mutex<BudgetWindow>,
}

impl RetryBudget {
    pub fn new(ratio: f32, min_retries: u32) -> Self {
        Self::with_window(ratio, min_retries, Duration::from_secs(10))
    }

    pub fn with_window(ratio: f32, min_retries: u32, window: Duration) -> Self {
        Self {
            ratio,
            min_retries,
            window,
            state: Mutex::new(BudgetWindow {
                started: Instant::now(),
                requests: 0,
                retries: 0,
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut BudgetWindow) -> T) -> T {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.started.elapsed() >= self.window {
            *state = BudgetWindow {
                started: Instant::now(),
                requests: 0,
                retries: 0,
            };
        }
        f(&mut state)
    }

    pub fn record_request(&self) {
        self.with_state(|s| s.requests += 1);
    }

    /// Take one retry from the budget if any is left.
    pub fn can_retry(&self) -> bool {
        let ratio = self.ratio.max(0.0) as f64;
        let min_retries = self.min_retries as u64;
        self.with_state(|s| {
            let allowed = ((s.requests as f64 * ratio) as u64).max(min_retries);
            if s.retries < allowed {
                s.retries += 1;
                true
            } else {
                false
            }
        })
    }
}

/// Retry state for one routed request.
#[derive(Debug)]
pub struct RetryState {
    retry_on: RetryOn,
    retries_remaining: u32,
    attempts: u32,
    max_backoff: Duration,
    scheduler: Arc<dyn Scheduler>,
    budget: Option<Arc<RetryBudget>>,
    pending: Option<TimerHandle>,
    terminal: Option<TerminalReason>,
}

impl RetryState {
    /// Build the state from the route policy plus the request's override headers.
    pub fn new(
        policy: &RetryPolicy,
        request: &RequestHeaders,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let mut retry_on = policy.retry_on();
        let mut retries_remaining = policy.num_retries();

        if let Some(list) = request.header(RETRY_ON) {
            retry_on = retry_on.union(
                RetryOn::parse_lenient(list)
                    .iter()
                    .filter(|t| !t.is_grpc())
                    .collect(),
            );
        }
        if let Some(list) = request.header(RETRY_GRPC_ON) {
            retry_on = retry_on.union(
                RetryOn::parse_lenient(list)
                    .iter()
                    .filter(|t| t.is_grpc())
                    .collect(),
            );
        }
        if let Some(max) = request
            .header(MAX_RETRIES)
            .and_then(|v| v.trim().parse::<u32>().ok())
        {
            retries_remaining = max;
        }

        Self {
            retry_on,
            retries_remaining,
            attempts: 0,
            max_backoff: policy.per_try_timeout().unwrap_or(DEFAULT_MAX_BACKOFF),
            scheduler,
            budget: None,
            pending: None,
            terminal: None,
        }
    }

    /// Share a retry budget with other requests. Counts this request against it.
    pub fn with_budget(mut self, budget: Arc<RetryBudget>) -> Self {
        budget.record_request();
        self.budget = Some(budget);
        self
    }

    /// True if the policy has triggers and retries remain.
    pub fn enabled(&self) -> bool {
        !self.retry_on.is_empty() && self.retries_remaining > 0
    }

    /// Triggers in effect after request overrides.
    pub fn retry_on(&self) -> RetryOn {
        self.retry_on
    }

    /// Retries scheduled so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn retries_remaining(&self) -> u32 {
        self.retries_remaining
    }

    pub fn phase(&self) -> RetryPhase {
        if let Some(reason) = self.terminal {
            return RetryPhase::Terminal(reason);
        }
        match &self.pending {
            Some(timer) if timer.is_pending() => RetryPhase::Scheduled,
            _ => RetryPhase::Idle,
        }
    }

    /// Decide whether to retry after `outcome`.
    ///
    /// On `Yes`, `callback` runs later on the scheduler; otherwise it is dropped
    /// unused. Calling again while a retry is pending is an error.
    pub fn should_retry<F>(
        &mut self,
        outcome: AttemptOutcome<'_>,
        callback: F,
    ) -> Result<RetryStatus, RetryError>
    where
        F: FnOnce() + Send + 'static,
    {
        match self.phase() {
            RetryPhase::Scheduled => return Err(RetryError::AlreadyScheduled),
            RetryPhase::Terminal(TerminalReason::Exhausted) => return Ok(RetryStatus::NoOverflow),
            RetryPhase::Terminal(_) => return Ok(RetryStatus::No),
            RetryPhase::Idle => self.pending = None,
        }

        let status = self.evaluate(&outcome);
        if status != RetryStatus::Yes {
            self.terminal = Some(match status {
                RetryStatus::NoOverflow => TerminalReason::Exhausted,
                _ => TerminalReason::NoRetry,
            });
            metrics::record_retry(status);
            tracing::debug!(
                attempts = self.attempts,
                outcome = ?outcome,
                status = status.as_str(),
                "Not retrying request"
            );
            return Ok(status);
        }

        self.retries_remaining -= 1;
        self.attempts += 1;
        let delay = calculate_backoff(self.attempts, BACKOFF_BASE, self.max_backoff);
        self.pending = Some(self.scheduler.schedule(delay, Box::new(callback)));

        metrics::record_retry(status);
        tracing::info!(
            attempt = self.attempts,
            remaining = self.retries_remaining,
            delay = ?delay,
            outcome = ?outcome,
            "Scheduling retry"
        );
        Ok(RetryStatus::Yes)
    }

    fn evaluate(&self, outcome: &AttemptOutcome<'_>) -> RetryStatus {
        if !self.would_retry(outcome) {
            return RetryStatus::No;
        }
        if self.retries_remaining == 0 {
            return RetryStatus::NoOverflow;
        }
        if let Some(budget) = &self.budget {
            if !budget.can_retry() {
                tracing::warn!("Retry budget exhausted");
                return RetryStatus::NoOverflow;
            }
        }
        RetryStatus::Yes
    }

    fn would_retry(&self, outcome: &AttemptOutcome<'_>) -> bool {
        let on = |trigger| self.retry_on.contains(trigger);
        match outcome {
            AttemptOutcome::Response(response) => {
                if response.is_overloaded() {
                    return false;
                }
                let status = response.status();
                if on(RetryTrigger::ServerError) && status.as_u16() >= 500 {
                    return true;
                }
                if on(RetryTrigger::Retriable4xx) && status == StatusCode::CONFLICT {
                    return true;
                }
                match response.grpc_status() {
                    Some(GrpcStatus::Cancelled) => on(RetryTrigger::GrpcCancelled),
                    Some(GrpcStatus::DeadlineExceeded) => on(RetryTrigger::GrpcDeadlineExceeded),
                    Some(GrpcStatus::ResourceExhausted) => {
                        on(RetryTrigger::GrpcResourceExhausted)
                    }
                    _ => false,
                }
            }
            AttemptOutcome::Reset(reason) => {
                (on(RetryTrigger::RefusedStream) && *reason == ResetReason::RemoteRefusedStream)
                    || (on(RetryTrigger::ConnectFailure)
                        && *reason == ResetReason::ConnectionFailure)
                    || on(RetryTrigger::ServerError)
            }
        }
    }

    /// Cancel a pending retry. Returns true if one was pending.
    pub fn cancel(&mut self) -> bool {
        let cancelled = self
            .pending
            .take()
            .map(|timer| timer.cancel())
            .unwrap_or(false);
        if cancelled {
            self.terminal = Some(TerminalReason::Cancelled);
            tracing::debug!(attempts = self.attempts, "Pending retry cancelled");
        }
        cancelled
    }
}

impl Drop for RetryState {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::scheduler::ManualScheduler;
    use crate::routing::headers::{GRPC_STATUS, OVERLOADED};
    use axum::http::HeaderValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy(retry_on: &str, num_retries: u32) -> RetryPolicy {
        RetryPolicy::new(RetryOn::parse_strict(retry_on).unwrap(), num_retries, None)
    }

    fn state(policy: &RetryPolicy, scheduler: &Arc<ManualScheduler>) -> RetryState {
        RetryState::new(policy, &RequestHeaders::get("svc", "/"), scheduler.clone())
    }

    fn response(code: u16) -> ResponseHeaders {
        ResponseHeaders::new(StatusCode::from_u16(code).unwrap())
    }

    fn noop() {}

    #[test]
    fn test_5xx_retries_until_exhausted() {
        let scheduler = Arc::new(ManualScheduler::new());
        let mut retry = state(&policy("5xx", 2), &scheduler);
        assert!(retry.enabled());

        let resp = response(503);
        assert_eq!(retry.should_retry(AttemptOutcome::Response(&resp), noop), Ok(RetryStatus::Yes));
        assert_eq!(retry.phase(), RetryPhase::Scheduled);
        scheduler.fire_all();
        assert_eq!(retry.phase(), RetryPhase::Idle);

        assert_eq!(retry.should_retry(AttemptOutcome::Response(&resp), noop), Ok(RetryStatus::Yes));
        scheduler.fire_all();
        assert!(!retry.enabled());

        assert_eq!(
            retry.should_retry(AttemptOutcome::Response(&resp), noop),
            Ok(RetryStatus::NoOverflow)
        );
        assert_eq!(retry.phase(), RetryPhase::Terminal(TerminalReason::Exhausted));
        assert_eq!(retry.attempts(), 2);
    }

    #[test]
    fn test_404_is_not_retried() {
        let scheduler = Arc::new(ManualScheduler::new());
        let mut retry = state(&policy("5xx", 2), &scheduler);

        let resp = response(404);
        assert_eq!(retry.should_retry(AttemptOutcome::Response(&resp), noop), Ok(RetryStatus::No));
        assert_eq!(retry.phase(), RetryPhase::Terminal(TerminalReason::NoRetry));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_callback_never_runs_inline() {
        let scheduler = Arc::new(ManualScheduler::new());
        let mut retry = state(&policy("5xx", 1), &scheduler);
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let resp = response(500);
        let status = retry
            .should_retry(AttemptOutcome::Response(&resp), move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(status, RetryStatus::Yes);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        scheduler.fire_all();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_second_call_while_scheduled_is_rejected() {
        let scheduler = Arc::new(ManualScheduler::new());
        let mut retry = state(&policy("5xx", 3), &scheduler);

        let resp = response(502);
        retry.should_retry(AttemptOutcome::Response(&resp), noop).unwrap();
        assert_eq!(
            retry.should_retry(AttemptOutcome::Response(&resp), noop),
            Err(RetryError::AlreadyScheduled)
        );
        assert_eq!(retry.attempts(), 1);
    }

    #[test]
    fn test_drop_cancels_pending_retry() {
        let scheduler = Arc::new(ManualScheduler::new());
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let mut retry = state(&policy("5xx", 1), &scheduler);
            let c = calls.clone();
            let resp = response(500);
            retry
                .should_retry(AttemptOutcome::Response(&resp), move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        assert_eq!(scheduler.fire_all(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_explicit_cancel_is_terminal() {
        let scheduler = Arc::new(ManualScheduler::new());
        let mut retry = state(&policy("5xx", 3), &scheduler);
        let resp = response(500);

        retry.should_retry(AttemptOutcome::Response(&resp), noop).unwrap();
        assert!(retry.cancel());
        assert!(!retry.cancel());
        assert_eq!(retry.phase(), RetryPhase::Terminal(TerminalReason::Cancelled));
        assert_eq!(retry.should_retry(AttemptOutcome::Response(&resp), noop), Ok(RetryStatus::No));
    }

    #[test]
    fn test_reset_reasons() {
        let scheduler = Arc::new(ManualScheduler::new());

        let mut connect = state(&policy("connect-failure", 1), &scheduler);
        assert_eq!(
            connect.should_retry(AttemptOutcome::Reset(ResetReason::ConnectionFailure), noop),
            Ok(RetryStatus::Yes)
        );

        let mut refused = state(&policy("refused-stream", 1), &scheduler);
        assert_eq!(
            refused.should_retry(AttemptOutcome::Reset(ResetReason::RemoteReset), noop),
            Ok(RetryStatus::No)
        );
        let mut refused = state(&policy("refused-stream", 1), &scheduler);
        assert_eq!(
            refused.should_retry(AttemptOutcome::Reset(ResetReason::RemoteRefusedStream), noop),
            Ok(RetryStatus::Yes)
        );

        // Any reset counts as a 5xx.
        let mut server = state(&policy("5xx", 1), &scheduler);
        assert_eq!(
            server.should_retry(AttemptOutcome::Reset(ResetReason::ConnectionTermination), noop),
            Ok(RetryStatus::Yes)
        );
    }

    #[test]
    fn test_retriable_4xx_is_conflict_only() {
        let scheduler = Arc::new(ManualScheduler::new());

        let mut retry = state(&policy("retriable-4xx", 1), &scheduler);
        let conflict = response(409);
        assert_eq!(retry.should_retry(AttemptOutcome::Response(&conflict), noop), Ok(RetryStatus::Yes));

        let mut retry = state(&policy("retriable-4xx", 1), &scheduler);
        let bad = response(400);
        assert_eq!(retry.should_retry(AttemptOutcome::Response(&bad), noop), Ok(RetryStatus::No));
    }

    #[test]
    fn test_grpc_triggers() {
        let scheduler = Arc::new(ManualScheduler::new());
        let grpc = |code: &'static str| {
            response(200).with_header(GRPC_STATUS, HeaderValue::from_static(code))
        };

        let mut retry = state(&policy("cancelled,resource-exhausted", 3), &scheduler);
        assert_eq!(retry.should_retry(AttemptOutcome::Response(&grpc("1")), noop), Ok(RetryStatus::Yes));
        scheduler.fire_all();
        assert_eq!(retry.should_retry(AttemptOutcome::Response(&grpc("8")), noop), Ok(RetryStatus::Yes));
        scheduler.fire_all();
        assert_eq!(retry.should_retry(AttemptOutcome::Response(&grpc("4")), noop), Ok(RetryStatus::No));
    }

    #[test]
    fn test_overloaded_response_is_never_retried() {
        let scheduler = Arc::new(ManualScheduler::new());
        let mut retry = state(&policy("5xx", 3), &scheduler);
        let resp = response(503).with_header(OVERLOADED, HeaderValue::from_static("true"));
        assert_eq!(retry.should_retry(AttemptOutcome::Response(&resp), noop), Ok(RetryStatus::No));
    }

    #[test]
    fn test_request_overrides() {
        let scheduler = Arc::new(ManualScheduler::new());
        let request = RequestHeaders::get("svc", "/")
            .with_header(RETRY_ON, HeaderValue::from_static("connect-failure,cancelled,bogus"))
            .with_header(RETRY_GRPC_ON, HeaderValue::from_static("deadline-exceeded,5xx"))
            .with_header(MAX_RETRIES, HeaderValue::from_static("4"));

        let retry = RetryState::new(&RetryPolicy::default(), &request, scheduler);
        let on = retry.retry_on();
        assert!(on.contains(RetryTrigger::ConnectFailure));
        assert!(on.contains(RetryTrigger::GrpcDeadlineExceeded));
        assert!(!on.contains(RetryTrigger::GrpcCancelled));
        assert!(!on.contains(RetryTrigger::ServerError));
        assert_eq!(retry.retries_remaining(), 4);
        assert!(retry.enabled());
    }

    #[test]
    fn test_empty_policy_is_disabled() {
        let scheduler = Arc::new(ManualScheduler::new());
        let mut retry = state(&RetryPolicy::default(), &scheduler);
        assert!(!retry.enabled());
        let resp = response(500);
        assert_eq!(retry.should_retry(AttemptOutcome::Response(&resp), noop), Ok(RetryStatus::No));
    }

    #[test]
    fn test_shared_budget_overflow() {
        let scheduler = Arc::new(ManualScheduler::new());
        let budget = Arc::new(RetryBudget::new(0.0, 1));
        let resp = response(500);

        let mut first = state(&policy("5xx", 5), &scheduler).with_budget(budget.clone());
        assert_eq!(first.should_retry(AttemptOutcome::Response(&resp), noop), Ok(RetryStatus::Yes));

        let mut second = state(&policy("5xx", 5), &scheduler).with_budget(budget);
        assert_eq!(
            second.should_retry(AttemptOutcome::Response(&resp), noop),
            Ok(RetryStatus::NoOverflow)
        );
    }

    #[test]
    fn test_backoff_bounded_by_per_try_timeout() {
        let scheduler = Arc::new(ManualScheduler::new());
        let per_try = Duration::from_millis(40);
        let policy = RetryPolicy::new(RetryOn::empty().with(RetryTrigger::ServerError), 6, Some(per_try));
        let mut retry = state(&policy, &scheduler);
        let resp = response(500);

        for _ in 0..6 {
            assert_eq!(retry.should_retry(AttemptOutcome::Response(&resp), noop), Ok(RetryStatus::Yes));
            scheduler.fire_all();
        }
        let delays = scheduler.scheduled_delays();
        assert_eq!(delays.len(), 6);
        assert!(delays.iter().all(|d| *d <= per_try));
    }

    #[test]
    fn test_budget_ratio() {
        let budget = RetryBudget::new(0.5, 0);
        for _ in 0..4 {
            budget.record_request();
        }
        assert!(budget.can_retry());
        assert!(budget.can_retry());
        assert!(!budget.can_retry());
    }
}
