//! Randomized exponential backoff for transport recovery

use rand::Rng;
use std::time::Duration;

/// Outcome of planning one recovery cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPlan {
    /// Delay before the reconnect attempt
    pub interval: Duration,
    /// Attempt counter to keep until the timer fires (0 after a cap reset)
    pub attempts: u32,
}

/// Plan the next reconnect.
///
/// `k` is drawn from `1..=2^attempts` and the delay is `k * min`. A delay
/// above `max` collapses to exactly `min` and restarts the counter.
pub fn plan_retry<R: Rng + ?Sized>(
    rng: &mut R,
    attempts: u32,
    min: Duration,
    max: Duration,
) -> RetryPlan {
    let upper = 2u64.saturating_pow(attempts);
    let k = rng.gen_range(1..=upper);
    let interval = min.as_secs_f64() * k as f64;

    if interval > max.as_secs_f64() {
        RetryPlan {
            interval: min,
            attempts: 0,
        }
    } else {
        RetryPlan {
            interval: Duration::try_from_secs_f64(interval).unwrap_or(max),
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_first_attempt_is_min_interval() {
        let mut rng = StdRng::seed_from_u64(9);
        let plan = plan_retry(&mut rng, 0, Duration::from_secs(2), Duration::from_secs(30));
        assert_eq!(plan.interval, Duration::from_secs(2));
        assert_eq!(plan.attempts, 0);
    }

    #[test]
    fn test_cap_resets_to_min() {
        let mut rng = StdRng::seed_from_u64(10);
        // 2^20 * 2s is far beyond 30s for any k other than tiny draws
        let mut reset_seen = false;
        for _ in 0..20 {
            let plan = plan_retry(&mut rng, 20, Duration::from_secs(2), Duration::from_secs(30));
            if plan.attempts == 0 {
                assert_eq!(plan.interval, Duration::from_secs(2));
                reset_seen = true;
            }
        }
        assert!(reset_seen);
    }

    #[test]
    fn test_huge_attempt_count_does_not_overflow() {
        let mut rng = StdRng::seed_from_u64(11);
        let plan = plan_retry(&mut rng, 200, Duration::from_secs(2), Duration::from_secs(30));
        assert!(plan.interval >= Duration::from_secs(2));
    }

    proptest! {
        #[test]
        fn prop_interval_within_bounds(
            attempts in 0u32..12,
            min_secs in 1u64..10,
            extra in 0u64..100,
            seed in any::<u64>(),
        ) {
            let min = Duration::from_secs(min_secs);
            let max = Duration::from_secs(min_secs + extra);
            let mut rng = StdRng::seed_from_u64(seed);
            let plan = plan_retry(&mut rng, attempts, min, max);

            prop_assert!(plan.interval >= min);
            prop_assert!(plan.interval <= max);
            if plan.attempts == 0 && attempts != 0 {
                prop_assert_eq!(plan.interval, min);
            } else {
                prop_assert!(plan.interval.as_secs_f64() <= min.as_secs_f64() * 2f64.powi(attempts as i32));
                prop_assert_eq!(plan.attempts, attempts);
            }
        }
    }
}
