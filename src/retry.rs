//! Retry policies for state handler invocations.
//!
//! Generalizes the teacher's exponential/linear/fixed backoff strategies,
//! pinned to the exact formulas the specification requires rather than the
//! teacher's jittered variant.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff shape for successive retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Fixed,
    Linear,
    Exponential,
}

/// A state's retry configuration. `max_attempts` counts the first attempt,
/// so at most `max_attempts - 1` retries (and therefore at most
/// `max_attempts - 1` `failure`-status self-transitions) occur per
/// invocation of the state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub strategy: RetryStrategy,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            strategy: RetryStrategy::Fixed,
            initial_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(initial_delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            strategy: RetryStrategy::Fixed,
            initial_delay,
            max_delay: initial_delay,
            multiplier: 1.0,
        }
    }

    pub fn linear(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            strategy: RetryStrategy::Linear,
            initial_delay,
            max_delay,
            multiplier: 1.0,
        }
    }

    pub fn exponential(
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            max_attempts,
            strategy: RetryStrategy::Exponential,
            initial_delay,
            max_delay,
            multiplier,
        }
    }

    /// Whether attempt number `attempt` (1-indexed, the attempt about to be
    /// made) is still within the configured budget.
    pub fn has_attempts_remaining(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Delay to sleep before retry attempt `attempt` (the attempt number
    /// that just failed, 1-indexed). Returns `None` once attempts are
    /// exhausted.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }

        let initial_ms = self.initial_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            RetryStrategy::Fixed => initial_ms,
            RetryStrategy::Linear => (initial_ms * attempt as f64).min(max_ms),
            RetryStrategy::Exponential => {
                (initial_ms * self.multiplier.powi((attempt - 1) as i32)).min(max_ms)
            }
        };

        Some(Duration::from_millis(delay_ms.max(0.0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_strategy_always_returns_initial_delay() {
        let policy = RetryPolicy::fixed(Duration::from_millis(10), 3);
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(10)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(10)));
        assert_eq!(policy.next_delay(3), None);
    }

    #[test]
    fn exponential_strategy_doubles_and_caps() {
        let policy = RetryPolicy::exponential(
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(1000),
            6,
        );
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.next_delay(4), Some(Duration::from_millis(800)));
        assert_eq!(policy.next_delay(5), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn linear_strategy_scales_with_attempt_and_caps() {
        let policy = RetryPolicy::linear(Duration::from_millis(100), Duration::from_millis(250), 10);
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_millis(250)));
    }

    #[test]
    fn no_delay_past_max_attempts() {
        let policy = RetryPolicy::fixed(Duration::from_millis(10), 3);
        assert_eq!(policy.next_delay(3), None);
        assert_eq!(policy.next_delay(10), None);
    }
}
