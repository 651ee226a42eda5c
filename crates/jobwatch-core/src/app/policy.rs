//! Failure policy: what a Poller does after a failed fetch.

use std::str::FromStr;
use std::time::Duration;

/// Backoff settings used by [`FailurePolicy::Retry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for a single delay.
    pub max_delay: Option<Duration>,

    /// Extra random delay as a fraction of the computed delay (0.0 = none).
    pub jitter: f64,

    /// Consecutive failures after which the chain halts anyway.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_delay: Some(Duration::from_secs(300)),
            jitter: 0.0,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next cycle after `attempts` consecutive failures (1-indexed).
    ///
    /// delay = base_delay * multiplier^(attempts - 1), capped by `max_delay`.
    ///
    /// Example with base_delay=5s, multiplier=2.0:
    /// - attempt 1: 5s
    /// - attempt 2: 10s
    /// - attempt 3: 20s
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let mut delay_secs = base_secs * self.multiplier.powi(exponent);
        if let Some(max) = self.max_delay {
            delay_secs = delay_secs.min(max.as_secs_f64());
        }
        if self.jitter > 0.0 {
            delay_secs += delay_secs * self.jitter * rand::random::<f64>();
        }
        if !delay_secs.is_finite() || delay_secs < 0.0 {
            return self.max_delay.unwrap_or(self.base_delay);
        }
        Duration::from_secs_f64(delay_secs)
    }
}

/// How a Poller reacts to soft failures and transport errors.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FailurePolicy {
    /// End the chain; the job stays non-terminal until re-seeded or restored.
    #[default]
    Halt,

    /// Schedule the next cycle with exponential backoff.
    Retry(RetryPolicy),
}

/// Next action after a failed cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureDecision {
    Retry { delay: Duration },
    Halt { reason: String },
}

impl FailurePolicy {
    /// Decide the next action after `consecutive_failures` failed cycles in a row.
    pub fn decide(&self, consecutive_failures: u32) -> FailureDecision {
        match self {
            FailurePolicy::Halt => FailureDecision::Halt {
                reason: "failure policy is halt".to_string(),
            },
            FailurePolicy::Retry(retry) => match retry.max_attempts {
                Some(max) if consecutive_failures >= max => FailureDecision::Halt {
                    reason: format!("gave up after {consecutive_failures}/{max} failed polls"),
                },
                _ => FailureDecision::Retry {
                    delay: retry.next_delay(consecutive_failures),
                },
            },
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    /// `halt` or `retry` (default backoff).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "halt" => Ok(FailurePolicy::Halt),
            "retry" => Ok(FailurePolicy::Retry(RetryPolicy::default())),
            other => Err(format!("unknown failure policy '{other}' (expected halt or retry)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn exponential_backoff_increases() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.next_delay(1), Duration::from_secs(5));
        assert_eq!(policy.next_delay(2), Duration::from_secs(10));
        assert_eq!(policy.next_delay(3), Duration::from_secs(20));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_delay: Some(Duration::from_secs(30)),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.next_delay(10), Duration::from_secs(30));
        assert_eq!(policy.next_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn jitter_only_adds_delay() {
        let policy = RetryPolicy {
            jitter: 0.5,
            max_delay: None,
            ..RetryPolicy::default()
        };
        for _ in 0..20 {
            let d = policy.next_delay(1);
            assert!(d >= Duration::from_secs(5));
            assert!(d <= Duration::from_secs_f64(7.5));
        }
    }

    #[test]
    fn halt_policy_always_halts() {
        assert!(matches!(
            FailurePolicy::Halt.decide(1),
            FailureDecision::Halt { .. }
        ));
    }

    #[test]
    fn retry_policy_gives_up_after_max_attempts() {
        let policy = FailurePolicy::Retry(RetryPolicy {
            max_attempts: Some(3),
            ..RetryPolicy::default()
        });
        assert_eq!(
            policy.decide(2),
            FailureDecision::Retry {
                delay: Duration::from_secs(10)
            }
        );
        assert!(matches!(policy.decide(3), FailureDecision::Halt { .. }));
    }

    #[rstest]
    #[case("halt", true)]
    #[case(" HALT ", true)]
    #[case("retry", false)]
    fn parses_policy_names(#[case] input: &str, #[case] is_halt: bool) {
        let policy: FailurePolicy = input.parse().unwrap();
        assert_eq!(policy == FailurePolicy::Halt, is_halt);
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!("sometimes".parse::<FailurePolicy>().is_err());
    }
}
