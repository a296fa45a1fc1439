//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Calculate the delay before retry number `attempt` (1-based).
///
/// The exponential delay `base * 2^(attempt - 1)` is capped at `max`, then the
/// upper half is jittered, so the result always lies in `[capped / 2, capped]`.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    calculate_backoff_with(&mut rand::thread_rng(), attempt, base, max)
}

/// Same as [`calculate_backoff`] with a caller-provided random source.
pub fn calculate_backoff_with<R: Rng + ?Sized>(
    rng: &mut R,
    attempt: u32,
    base: Duration,
    max: Duration,
) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_ms = base_ms.saturating_mul(exponential_base).min(max_ms);

    let floor = capped_ms / 2;
    let jitter = if capped_ms > floor {
        rng.gen_range(0..=capped_ms - floor)
    } else {
        0
    };

    Duration::from_millis(floor + jitter)
}
