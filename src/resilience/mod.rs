//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt outcome (response or reset):
//!     → retries.rs (is it retriable? any retries left? budget?)
//!     → backoff.rs (exponential delay with jitter)
//!     → scheduler.rs (run the retry callback later, cancellable)
//! ```
//!
//! # Design Decisions
//! - Retry decisions never block and never run the retry inline
//! - The scheduler is injected so tests drive time by hand
//! - A request owns its retry state; dropping it cancels the pending retry

pub mod backoff;
pub mod retries;
pub mod scheduler;

pub use retries::{
    AttemptOutcome, ResetReason, RetryBudget, RetryError, RetryPhase, RetryState, RetryStatus,
    TerminalReason,
};
pub use scheduler::{ManualScheduler, RetryCallback, Scheduler, TimerHandle, TokioScheduler};
