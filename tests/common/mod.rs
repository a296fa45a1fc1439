//! Shared utilities for integration and load testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use tokio::sync::oneshot;

use route_engine::config::parse_config;
use route_engine::resilience::{AttemptOutcome, ResetReason, RetryState, RetryStatus};
use route_engine::routing::{ResponseHeaders, RouteTable};
use route_engine::runtime::{InMemoryRuntime, Runtime};

/// Compile a table from TOML with an empty runtime.
#[allow(dead_code)]
pub fn table_from_toml(toml: &str) -> RouteTable {
    table_with_runtime(toml, Arc::new(InMemoryRuntime::new()))
}

#[allow(dead_code)]
pub fn table_with_runtime(toml: &str, runtime: Arc<InMemoryRuntime>) -> RouteTable {
    let config = parse_config(toml).unwrap();
    RouteTable::from_config(&config, runtime as Arc<dyn Runtime>).unwrap()
}

/// Result of one simulated upstream attempt.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Status(u16),
    Reset(ResetReason),
}

/// An upstream that plays back a script, then answers 200 forever.
#[allow(dead_code)]
pub struct ScriptedUpstream {
    script: Mutex<VecDeque<Attempt>>,
    calls: AtomicU32,
}

#[allow(dead_code)]
impl ScriptedUpstream {
    pub fn new(script: Vec<Attempt>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn next(&self) -> Attempt {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Attempt::Status(200))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Forward until the retry state stops asking for another attempt.
///
/// Each retry waits for the scheduler to fire its callback, so with a paused
/// tokio clock the backoff elapses instantly.
#[allow(dead_code)]
pub async fn forward_with_retries(
    state: &mut RetryState,
    upstream: &ScriptedUpstream,
) -> (Attempt, RetryStatus) {
    loop {
        let attempt = upstream.next();
        if attempt == Attempt::Status(200) {
            return (attempt, RetryStatus::No);
        }

        let (tx, rx) = oneshot::channel();
        let callback = move || {
            let _ = tx.send(());
        };

        let status = match attempt {
            Attempt::Status(code) => {
                let response = ResponseHeaders::new(StatusCode::from_u16(code).unwrap());
                state.should_retry(AttemptOutcome::Response(&response), callback)
            }
            Attempt::Reset(reason) => state.should_retry(AttemptOutcome::Reset(reason), callback),
        }
        .unwrap();

        if status != RetryStatus::Yes {
            return (attempt, status);
        }
        rx.await.unwrap();
    }
}
