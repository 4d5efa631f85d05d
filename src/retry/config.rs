use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fraction of the exponential delay used as the jitter band (+/- 20%).
const JITTER_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Fixed,
    Exponential,
    ExponentialJitter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub strategy: RetryStrategy,
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::ExponentialJitter,
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn fixed(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            strategy: RetryStrategy::Fixed,
            max_attempts,
            base_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    pub fn with_jitter(mut self) -> Self {
        self.strategy = RetryStrategy::ExponentialJitter;
        self
    }

    /// Attempts actually made; zero is treated as a single attempt.
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Deterministic part of the backoff after `attempt` (1-based) failed:
    /// `base * 2^(attempt - 1)` capped at `max_delay_ms` for the exponential
    /// strategies, `base` for fixed.
    pub fn base_delay_ms_for_attempt(&self, attempt: u32) -> u64 {
        match self.strategy {
            RetryStrategy::Fixed => self.base_delay_ms,
            RetryStrategy::Exponential | RetryStrategy::ExponentialJitter => {
                let exponent = attempt.saturating_sub(1);
                let factor = 2u64.checked_pow(exponent).unwrap_or(u64::MAX);
                self.base_delay_ms
                    .saturating_mul(factor)
                    .min(self.max_delay_ms)
            }
        }
    }

    /// Delay to wait after `attempt` (1-based) failed, before the next one.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms_for_attempt(attempt);
        let millis = match self.strategy {
            RetryStrategy::ExponentialJitter => {
                let factor = 1.0 + rand::rng().random_range(-JITTER_FRACTION..=JITTER_FRACTION);
                (base as f64 * factor).round().max(0.0) as u64
            }
            _ => base,
        };
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let config = RetryConfig::fixed(5, 250);
        for attempt in 1..=5 {
            assert_eq!(config.delay_for_attempt(attempt), Duration::from_millis(250));
        }
    }

    #[test]
    fn test_exponential_doubles_and_caps() {
        let config = RetryConfig::exponential(10, 100, 1_000);
        let delays: Vec<u64> = (1..=6).map(|a| config.base_delay_ms_for_attempt(a)).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn test_exponential_does_not_overflow() {
        let config = RetryConfig::exponential(100, 1_000, u64::MAX);
        assert_eq!(config.base_delay_ms_for_attempt(90), u64::MAX);
    }

    #[test]
    fn test_jitter_stays_within_twenty_percent() {
        let config = RetryConfig::exponential(3, 100, 10_000).with_jitter();
        for _ in 0..200 {
            let first = config.delay_for_attempt(1).as_millis();
            let second = config.delay_for_attempt(2).as_millis();
            assert!((80..=120).contains(&first), "first delay {first}");
            assert!((160..=240).contains(&second), "second delay {second}");
        }
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let config = RetryConfig::fixed(0, 10);
        assert_eq!(config.effective_max_attempts(), 1);
    }

    #[test]
    fn test_deserializes_snake_case_strategy() {
        let config: RetryConfig = toml::from_str(
            r#"
            strategy = "exponential_jitter"
            max_attempts = 4
            base_delay_ms = 50
            max_delay_ms = 400
            "#,
        )
        .unwrap();
        assert_eq!(config.strategy, RetryStrategy::ExponentialJitter);
        assert_eq!(config.max_attempts, 4);
    }
}
