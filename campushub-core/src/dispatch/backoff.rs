//! Retry backoff schedule
//!
//! Exponential backoff with a cap, computed from the attempt counter so
//! the delay survives the job round-tripping through the store between
//! attempts.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};

/// Delay before the next attempt, given how many attempts have been made
///
/// `attempt` is 1-based (the count of attempts already performed).
#[must_use]
pub fn backoff_delay(min_delay: Duration, max_delay: Duration, attempt: u32) -> Duration {
    if attempt == 0 {
        return min_delay;
    }

    ExponentialBuilder::default()
        .with_min_delay(min_delay)
        .with_max_delay(max_delay)
        .without_max_times()
        .build()
        .nth(attempt as usize - 1)
        .unwrap_or(max_delay)
}
