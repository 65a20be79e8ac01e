//! Exponential backoff.

use std::time::Duration;

/// Delay to wait after the failed attempt with 0-based index `retry_index`.
///
/// `base × 2^retry_index`, saturating, capped at `max`.
pub fn calculate_backoff(retry_index: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
    let factor = 2u64.saturating_pow(retry_index);
    let delay = Duration::from_millis(base_ms.saturating_mul(factor));
    delay.min(max)
}

/// Sum of the delays slept across `attempts` attempts (one fewer than attempts).
pub fn total_backoff(attempts: u32, base: Duration, max: Duration) -> Duration {
    (0..attempts.saturating_sub(1))
        .map(|i| calculate_backoff(i, base, max))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: Duration = Duration::from_secs(30);

    #[test]
    fn test_backoff_calculation() {
        let base = Duration::from_millis(100);
        assert_eq!(calculate_backoff(0, base, CAP), Duration::from_millis(100));
        assert_eq!(calculate_backoff(1, base, CAP), Duration::from_millis(200));
        assert_eq!(calculate_backoff(2, base, CAP), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_is_capped() {
        let max = calculate_backoff(10, Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(max, Duration::from_secs(1));

        let huge = calculate_backoff(200, Duration::from_millis(300), CAP);
        assert_eq!(huge, CAP);
    }

    #[test]
    fn test_total_backoff() {
        let base = Duration::from_millis(100);
        assert_eq!(total_backoff(3, base, CAP), Duration::from_millis(300));
        assert_eq!(total_backoff(1, base, CAP), Duration::ZERO);
        assert_eq!(total_backoff(0, base, CAP), Duration::ZERO);
    }
}
