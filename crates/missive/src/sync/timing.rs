//! Backoff timing
//!
//! Pure functions that can be tested without sleeping.

use std::time::Duration;

/// Exponential backoff delay before retry number `retry` (0-based).
///
/// `base * 2^retry`, capped at `max`.
pub fn backoff_delay(retry: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(retry.min(31));
    base.saturating_mul(factor).min(max)
}

/// Delay to wait after a failed attempt.
///
/// Never shorter than the previous delay or the service's Retry-After,
/// so sustained rate limiting cannot shrink the wait.
pub fn next_delay(
    retry: u32,
    base: Duration,
    max: Duration,
    previous: Duration,
    retry_after: Option<Duration>,
) -> Duration {
    let computed = backoff_delay(retry, base, max).max(previous);
    match retry_after {
        Some(floor) => computed.max(floor),
        None => computed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(500);
    const MAX: Duration = Duration::from_secs(60);

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(0, BASE, MAX), Duration::from_millis(500));
        assert_eq!(backoff_delay(1, BASE, MAX), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, BASE, MAX), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, BASE, MAX), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_delay(10, BASE, MAX), MAX);
        assert_eq!(backoff_delay(u32::MAX, BASE, MAX), MAX);
    }

    #[test]
    fn test_zero_base_never_waits() {
        assert_eq!(backoff_delay(5, Duration::ZERO, MAX), Duration::ZERO);
    }

    #[test]
    fn test_next_delay_is_monotonic() {
        let mut previous = Duration::ZERO;
        for retry in 0..12 {
            let delay = next_delay(retry, BASE, MAX, previous, None);
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn test_retry_after_is_a_floor() {
        let delay = next_delay(0, BASE, MAX, Duration::ZERO, Some(Duration::from_secs(10)));
        assert_eq!(delay, Duration::from_secs(10));

        // A short Retry-After does not shorten the computed backoff.
        let delay = next_delay(3, BASE, MAX, Duration::ZERO, Some(Duration::from_millis(1)));
        assert_eq!(delay, Duration::from_secs(4));
    }

    #[test]
    fn test_retry_after_may_exceed_cap() {
        let delay = next_delay(0, BASE, MAX, Duration::ZERO, Some(Duration::from_secs(120)));
        assert_eq!(delay, Duration::from_secs(120));
    }
}
