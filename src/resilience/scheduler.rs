//! Deferred callback scheduling for retries.
//!
//! # Responsibilities
//! - Run a retry callback after a delay, never inline
//! - Let the owner cancel a pending callback before it fires
//!
//! # Design Decisions
//! - A timer fires or is cancelled exactly once (atomic compare-exchange)
//! - Dropping a handle does not cancel; cancellation is always explicit
//! - `ManualScheduler` drives time by hand for tests and simulations

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;

/// Callback invoked when a retry should take place.
pub type RetryCallback = Box<dyn FnOnce() + Send + 'static>;

/// Arranges for callbacks to run after a delay.
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Schedule `callback` to run once `delay` has elapsed.
    ///
    /// Implementations must never invoke `callback` before returning.
    fn schedule(&self, delay: Duration, callback: RetryCallback) -> TimerHandle;
}

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug, Default)]
struct TimerState {
    status: AtomicU8,
    cancelled: Notify,
}

/// Handle to one scheduled callback.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    state: Arc<TimerState>,
}

impl TimerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the callback. Returns false if it already fired or was cancelled.
    pub fn cancel(&self) -> bool {
        let won = self
            .state
            .status
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.state.cancelled.notify_one();
        }
        won
    }

    pub fn is_pending(&self) -> bool {
        self.state.status.load(Ordering::Acquire) == PENDING
    }

    pub fn has_fired(&self) -> bool {
        self.state.status.load(Ordering::Acquire) == FIRED
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.status.load(Ordering::Acquire) == CANCELLED
    }

    /// Claim the right to run the callback. Only the first caller wins, and
    /// never after a cancel.
    fn try_fire(&self) -> bool {
        self.state
            .status
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Scheduler backed by tokio timers.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler on the runtime of the calling task.
    pub fn current() -> Result<Self, tokio::runtime::TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, callback: RetryCallback) -> TimerHandle {
        let timer = TimerHandle::new();
        let task_timer = timer.clone();

        self.handle.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if task_timer.try_fire() {
                        callback();
                    }
                }
                _ = task_timer.state.cancelled.notified() => {
                    tracing::trace!("Retry timer cancelled");
                }
            }
        });

        timer
    }
}

struct ManualEntry {
    due: Duration,
    seq: u64,
    timer: TimerHandle,
    callback: RetryCallback,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_seq: u64,
    queue: Vec<ManualEntry>,
    delays: Vec<Duration>,
}

/// Scheduler driven by an explicit virtual clock.
#[derive(Default)]
pub struct ManualScheduler {
    clock: Mutex<ManualClock>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.now())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualClock> {
        // The clock holds no invariants a panicking callback could break.
        self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Callbacks scheduled and neither fired nor cancelled.
    pub fn pending_count(&self) -> usize {
        self.lock()
            .queue
            .iter()
            .filter(|e| e.timer.is_pending())
            .count()
    }

    /// Every delay ever requested, in scheduling order.
    pub fn scheduled_delays(&self) -> Vec<Duration> {
        self.lock().delays.clone()
    }

    /// Move the clock forward, running due callbacks in deadline order.
    /// Returns how many callbacks ran.
    pub fn advance(&self, by: Duration) -> usize {
        let deadline = {
            let mut clock = self.lock();
            clock.now += by;
            clock.now
        };
        self.run_due(deadline)
    }

    /// Run every pending callback regardless of its deadline.
    pub fn fire_all(&self) -> usize {
        self.run_due(Duration::MAX)
    }

    fn run_due(&self, deadline: Duration) -> usize {
        let mut fired = 0;
        loop {
            // Callbacks may schedule more work, so never hold the lock while running one.
            let next = {
                let mut clock = self.lock();
                clock.queue.retain(|e| e.timer.is_pending());
                let idx = clock
                    .queue
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.due <= deadline)
                    .min_by_key(|(_, e)| (e.due, e.seq))
                    .map(|(idx, _)| idx);
                idx.map(|idx| clock.queue.swap_remove(idx))
            };

            match next {
                Some(entry) => {
                    if entry.timer.try_fire() {
                        (entry.callback)();
                        fired += 1;
                    }
                }
                None => return fired,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: RetryCallback) -> TimerHandle {
        let timer = TimerHandle::new();
        let mut clock = self.lock();
        let due = clock.now + delay;
        let seq = clock.next_seq;
        clock.next_seq += 1;
        clock.delays.push(delay);
        clock.queue.push(ManualEntry {
            due,
            seq,
            timer: timer.clone(),
            callback,
        });
        timer
    }
}
