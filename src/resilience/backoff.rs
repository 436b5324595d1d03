//! Exponential backoff delay calculation with jitter.

use std::time::Duration;

use rand::Rng;

/// Compute the retry delay for a given attempt index.
///
/// Base delay is `initial_delay * multiplier^attempt`, capped at
/// `max_delay`; a non-finite or overflowing exponentiation clamps to the
/// cap. With `jitter_factor > 0` a uniform offset in
/// `[-base * jitter_factor, +base * jitter_factor]` is added and the
/// result clamped to zero.
///
/// Deterministic for a fixed `rng`, which tests exploit with a seeded
/// source.
pub fn calculate_delay_with_rng(
    attempt: u32,
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter_factor: f64,
    rng: &mut impl Rng,
) -> Duration {
    let initial_ms = initial_delay.as_millis() as f64;
    let max_ms = max_delay.as_millis() as f64;

    let exponential = initial_ms * multiplier.powi(attempt as i32);
    let base_ms = if exponential.is_finite() {
        exponential.min(max_ms)
    } else {
        max_ms
    };

    if jitter_factor <= 0.0 {
        return Duration::from_millis(base_ms as u64);
    }

    let jitter_range = base_ms * jitter_factor;
    let jitter = if jitter_range > 0.0 {
        rng.random_range(-jitter_range..=jitter_range)
    } else {
        0.0
    };

    Duration::from_millis((base_ms + jitter).max(0.0) as u64)
}

/// Compute the retry delay using the thread-local random source
pub fn calculate_delay(
    attempt: u32,
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter_factor: f64,
) -> Duration {
    calculate_delay_with_rng(
        attempt,
        initial_delay,
        multiplier,
        max_delay,
        jitter_factor,
        &mut rand::rng(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_jitter_is_exact() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_secs(30);

        assert_eq!(calculate_delay(0, initial, 2.0, max, 0.0), Duration::from_millis(100));
        assert_eq!(calculate_delay(1, initial, 2.0, max, 0.0), Duration::from_millis(200));
        assert_eq!(calculate_delay(4, initial, 2.0, max, 0.0), Duration::from_millis(1600));
    }

    #[test]
    fn test_caps_at_max() {
        let initial = Duration::from_secs(1);
        let max = Duration::from_secs(5);

        assert_eq!(calculate_delay(10, initial, 10.0, max, 0.0), max);
    }

    #[test]
    fn test_overflowing_exponent_clamps_to_max() {
        let initial = Duration::from_secs(1);
        let max = Duration::from_secs(60);

        // multiplier^attempt overflows f64 well before attempt 1000
        assert_eq!(calculate_delay(1000, initial, 10.0, max, 0.0), max);
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let initial = Duration::from_millis(1000);
        let max = Duration::from_secs(60);
        let jitter = 0.5;

        // base = 2000ms, jitter range = +-1000ms
        for _ in 0..200 {
            let delay = calculate_delay(1, initial, 2.0, max, jitter);
            assert!(delay >= Duration::from_millis(1000), "delay {delay:?} below bound");
            assert!(delay <= Duration::from_millis(3000), "delay {delay:?} above bound");
        }
    }

    #[test]
    fn test_jitter_never_negative() {
        let initial = Duration::from_millis(10);
        let max = Duration::from_secs(1);

        for _ in 0..200 {
            let delay = calculate_delay(0, initial, 2.0, max, 1.0);
            assert!(delay <= Duration::from_millis(20));
        }
    }

    #[test]
    fn test_deterministic_with_seeded_rng() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let initial = Duration::from_millis(500);
        let max = Duration::from_secs(10);

        let a = calculate_delay_with_rng(2, initial, 2.0, max, 0.3, &mut StdRng::seed_from_u64(7));
        let b = calculate_delay_with_rng(2, initial, 2.0, max, 0.3, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }
}
