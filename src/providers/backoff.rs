//! Exponential backoff for transient provider failures.
//!
//! The agent loop retries retryable stream errors with exponential backoff:
//! base delay 1 second, doubling per attempt, capped. The delay computation
//! lives here as a pure function so the schedule is testable without timers.

/// Compute the backoff delay in milliseconds for a given retry attempt.
///
/// Delay formula: `min(base_ms * 2^attempt, max_ms)`
///
/// # Arguments
/// * `attempt` - The retry attempt (0-indexed: the wait before the second try
///   is attempt 0)
/// * `base_ms` - Base delay in milliseconds
/// * `max_ms` - Maximum delay cap in milliseconds
///
/// # Example
/// ```
/// use clawcore::providers::backoff::compute_backoff_ms;
///
/// assert_eq!(compute_backoff_ms(0, 1000, 60_000), 1000);
/// assert_eq!(compute_backoff_ms(1, 1000, 60_000), 2000);
/// assert_eq!(compute_backoff_ms(3, 1000, 60_000), 8000);
/// ```
pub fn compute_backoff_ms(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    // Shift capped at 16: 2^16 * any sane base already exceeds every cap.
    let exponential = base_ms.saturating_mul(1u64 << attempt.min(16));
    exponential.min(max_ms)
}
