use std::time::Duration;

use crate::bridge_config::{AgentSection, BackoffStrategy};

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub delay: Duration,
    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, strategy: BackoffStrategy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            strategy,
        }
    }

    /// `retry_count` retries after the first attempt.
    pub fn from_section(section: &AgentSection) -> Self {
        Self::new(
            section.retry_count.saturating_add(1),
            Duration::from_secs(section.retry_delay_secs),
            section.backoff,
        )
    }

    /// Wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.strategy {
            BackoffStrategy::Fixed => self.delay,
            BackoffStrategy::Linear => self.delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(attempt - 1);
                self.delay.saturating_mul(factor)
            }
        }
    }
}
