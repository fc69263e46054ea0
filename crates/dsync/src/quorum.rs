//! Quorum arithmetic over per-node call outcomes, and the retry backoff.
//!
//! Everything here is pure so it can be tested without any transport.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryPolicy;

/// Result of one call to one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The node granted (or, on refresh, confirmed) the lock.
    Granted,
    /// The node answered and refused, or does not know the grant.
    Denied,
    /// The node failed, timed out, or was skipped as offline.
    Unreachable,
}

/// Strict majority of `total` nodes.
pub fn quorum(total: usize) -> usize {
    if total == 0 { 0 } else { total / 2 + 1 }
}

/// How many nodes may fail while a quorum is still reachable.
pub fn tolerance(total: usize) -> usize {
    total - quorum(total)
}

pub fn count(outcomes: &[Outcome], wanted: Outcome) -> usize {
    outcomes.iter().filter(|outcome| **outcome == wanted).count()
}

/// An acquisition holds when at least `quorum` nodes granted.
pub fn is_acquired(outcomes: &[Outcome], quorum: usize) -> bool {
    quorum > 0 && count(outcomes, Outcome::Granted) >= quorum
}

/// A held lock is lost once enough nodes positively deny it that the
/// remaining nodes can no longer form a quorum. Unreachable nodes are
/// unknown, not absent.
pub fn is_refresh_lost(outcomes: &[Outcome], quorum: usize) -> bool {
    let total = outcomes.len();
    count(outcomes, Outcome::Denied) > total.saturating_sub(quorum)
}

/// Randomized pause before the next acquisition attempt.
pub fn retry_delay<R: Rng>(policy: &RetryPolicy, rng: &mut R) -> Duration {
    let jitter_ms = u64::try_from(policy.max_jitter.as_millis()).unwrap_or(u64::MAX);
    if jitter_ms == 0 {
        return policy.min_interval;
    }
    policy.min_interval + Duration::from_millis(rng.random_range(0..=jitter_ms))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::RetryPolicy;

    use super::{Outcome, is_acquired, is_refresh_lost, quorum, retry_delay, tolerance};

    use super::Outcome::{Denied, Granted, Unreachable};

    #[test]
    fn quorum_is_strict_majority() {
        assert_eq!(quorum(0), 0);
        assert_eq!(quorum(1), 1);
        assert_eq!(quorum(2), 2);
        assert_eq!(quorum(3), 2);
        assert_eq!(quorum(4), 3);
        assert_eq!(quorum(5), 3);
        assert_eq!(tolerance(5), 2);
        assert_eq!(tolerance(4), 1);
    }

    #[test]
    fn acquisition_needs_quorum_grants() {
        assert!(is_acquired(&[Granted, Granted, Granted, Denied, Unreachable], 3));
        assert!(!is_acquired(&[Granted, Granted, Denied, Denied, Unreachable], 3));
        assert!(!is_acquired(&[Granted, Granted, Unreachable, Unreachable, Unreachable], 3));
        assert!(!is_acquired(&[], 0));
    }

    #[test]
    fn refresh_survives_minority_not_found() {
        let outcomes = [Denied, Denied, Granted, Granted, Granted];
        assert!(!is_refresh_lost(&outcomes, 3));
    }

    #[test]
    fn refresh_detects_majority_not_found() {
        let outcomes = [Denied, Denied, Denied, Granted, Granted];
        assert!(is_refresh_lost(&outcomes, 3));
    }

    #[test]
    fn unreachable_nodes_do_not_count_as_lost() {
        let outcomes = [Unreachable, Unreachable, Unreachable, Denied, Granted];
        assert!(!is_refresh_lost(&outcomes, 3));

        let outcomes = [Unreachable, Unreachable, Unreachable, Unreachable, Unreachable];
        assert!(!is_refresh_lost(&outcomes, 3));
    }

    #[test]
    fn retry_delay_stays_within_jitter_bounds() {
        let policy = RetryPolicy {
            min_interval: Duration::from_millis(50),
            max_jitter: Duration::from_millis(100),
        };
        let mut rng = rand::rng();
        for _ in 0..100 {
            let delay = retry_delay(&policy, &mut rng);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(150));
        }

        let fixed = RetryPolicy {
            min_interval: Duration::from_millis(20),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(retry_delay(&fixed, &mut rng), Duration::from_millis(20));
    }
}
