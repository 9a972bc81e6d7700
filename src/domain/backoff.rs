//! Capped exponential backoff for polling asynchronous generations.

use std::time::Duration;

/// Delay schedule for polling a generation until it completes.
///
/// The first delay is `initial`, each following delay is the previous one
/// multiplied by `multiplier` and capped at `max_delay`. At most
/// `max_attempts` delays (and therefore polls) are produced.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1000),
            multiplier: 1.8,
            max_delay: Duration::from_millis(5000),
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    pub fn new(initial: Duration, multiplier: f64, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            multiplier,
            max_delay,
            max_attempts,
        }
    }

    /// Returns the delay schedule.
    pub fn delays(&self) -> Delays {
        let max_ms = duration_ms(self.max_delay);
        Delays {
            next_ms: duration_ms(self.initial).min(max_ms),
            multiplier: self.multiplier,
            max_ms,
            remaining: self.max_attempts,
        }
    }

    /// Sum of every delay in the schedule.
    pub fn total_wait(&self) -> Duration {
        self.delays().sum()
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Iterator over backoff delays, computed in whole milliseconds.
#[derive(Debug, Clone)]
pub struct Delays {
    next_ms: u64,
    multiplier: f64,
    max_ms: u64,
    remaining: u32,
}

impl Iterator for Delays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let current = self.next_ms;
        let grown = (current as f64 * self.multiplier).round();
        self.next_ms = if grown >= self.max_ms as f64 {
            self.max_ms
        } else {
            grown as u64
        };
        Some(Duration::from_millis(current))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Delays {}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(delays: Delays) -> Vec<u128> {
        delays.map(|d| d.as_millis()).collect()
    }

    #[test]
    fn default_schedule_grows_and_caps() {
        let policy = BackoffPolicy::default();
        assert_eq!(
            millis(policy.delays()),
            vec![1000, 1800, 3240, 5000, 5000, 5000, 5000, 5000, 5000, 5000]
        );
    }

    #[test]
    fn schedule_never_exceeds_attempt_budget() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delays().len(), 10);
        assert_eq!(policy.delays().count(), 10);
    }

    #[test]
    fn each_delay_is_min_of_cap_and_previous_times_multiplier() {
        let policy = BackoffPolicy::default();
        let delays = millis(policy.delays());
        for pair in delays.windows(2) {
            let expected = ((pair[0] as f64 * 1.8).round() as u128).min(5000);
            assert_eq!(pair[1], expected);
        }
    }

    #[test]
    fn total_wait_is_bounded() {
        assert_eq!(
            BackoffPolicy::default().total_wait(),
            Duration::from_millis(1000 + 1800 + 3240 + 7 * 5000)
        );
    }

    #[test]
    fn zero_attempts_yields_nothing() {
        let policy = BackoffPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(policy.delays().next(), None);
    }

    #[test]
    fn initial_above_cap_is_clamped() {
        let policy = BackoffPolicy::new(
            Duration::from_millis(8000),
            2.0,
            Duration::from_millis(5000),
            2,
        );
        assert_eq!(millis(policy.delays()), vec![5000, 5000]);
    }
}
