//! Restart backoff schedule
//!
//! Exponential delay between consecutive restart attempts so a crash-looping
//! service never restarts in a tight loop. The counter reset after a stable
//! run lives in the state machine; this module only maps attempt counts to
//! delays.

use std::time::Duration;

/// Delay before the first restart attempt
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on the restart delay
pub const MAX_DELAY: Duration = Duration::from_secs(30);

/// Continuous uptime after which the failure counter resets
pub const STABLE_UPTIME: Duration = Duration::from_secs(60);

/// Delay before restarting after the given number of consecutive failures
///
/// Failure counts start at 1. The schedule is 1s, 2s, 4s, 8s, 16s, then
/// capped at 30s.
pub fn restart_delay(consecutive_failures: u32) -> Duration {
    let exponent = consecutive_failures.saturating_sub(1).min(5);
    let delay = BASE_DELAY * 2u32.pow(exponent);
    delay.min(MAX_DELAY)
}
