//! Retry policies for fetch operations.

use std::time::Duration;

use crate::client::NetworkError;

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone)]
pub enum BackoffStrategy {
    /// No delay between retries.
    None,
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff with base and max.
    Exponential {
        /// Initial delay.
        base: Duration,
        /// Maximum delay.
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Calculate delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => *d,
            Self::Exponential { base, max } => {
                let multiplier = 2u32.saturating_pow(attempt);
                std::cmp::min(base.saturating_mul(multiplier), *max)
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(2),
        }
    }
}

/// Conditions that trigger a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCondition {
    /// Retry on any 5xx status.
    ServerError,
    /// Retry on timeout.
    Timeout,
    /// Retry on connection error.
    ConnectionError,
}

impl RetryCondition {
    /// Check if a status code matches this condition.
    pub fn matches_status(&self, status: u16) -> bool {
        match self {
            Self::ServerError => (500..600).contains(&status),
            _ => false,
        }
    }

    /// Check if a network error matches this condition.
    pub fn matches_error(&self, error: &NetworkError) -> bool {
        match self {
            Self::Timeout => matches!(error, NetworkError::Timeout(_)),
            Self::ConnectionError => matches!(error, NetworkError::Connection(_)),
            _ => false,
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first.
    pub max_attempts: u32,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Conditions that trigger retry.
    pub retry_on: Vec<RetryCondition>,
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::default(),
            retry_on: vec![
                RetryCondition::ServerError,
                RetryCondition::Timeout,
                RetryCondition::ConnectionError,
            ],
        }
    }

    /// Create a policy with no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            backoff: BackoffStrategy::None,
            retry_on: Vec::new(),
        }
    }

    /// Set backoff strategy.
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Check if should retry based on status code.
    pub fn should_retry_status(&self, status: u16, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        self.retry_on.iter().any(|c| c.matches_status(status))
    }

    /// Check if should retry after a network error.
    pub fn should_retry_error(&self, error: &NetworkError, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        self.retry_on.iter().any(|c| c.matches_error(error))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = BackoffStrategy::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(350),
        };
        assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(backoff.delay_for_attempt(40), Duration::from_millis(350));
    }

    #[test]
    fn test_should_retry_respects_attempt_limit() {
        let policy = RetryPolicy::new(2);
        assert!(policy.should_retry_status(503, 0));
        assert!(policy.should_retry_status(503, 1));
        assert!(!policy.should_retry_status(503, 2));
        assert!(!policy.should_retry_status(404, 0));
        assert!(!policy.should_retry_status(429, 0));
    }

    #[test]
    fn test_default_conditions() {
        assert_eq!(
            RetryPolicy::new(3).retry_on,
            vec![
                RetryCondition::ServerError,
                RetryCondition::Timeout,
                RetryCondition::ConnectionError
            ]
        );
        assert!(RetryCondition::ServerError.matches_status(599));
        assert!(!RetryCondition::Timeout.matches_status(503));
        assert!(!RetryCondition::ServerError.matches_error(&NetworkError::Connection("x".into())));
    }

    #[test]
    fn test_should_retry_errors() {
        let policy = RetryPolicy::new(1);
        let timeout = NetworkError::Timeout(Duration::from_secs(1));
        let refused = NetworkError::Connection("refused".to_string());
        let bad_url = NetworkError::InvalidUrl("::".to_string());

        assert!(policy.should_retry_error(&timeout, 0));
        assert!(policy.should_retry_error(&refused, 0));
        assert!(!policy.should_retry_error(&bad_url, 0));
        assert!(!policy.should_retry_error(&timeout, 1));
    }

    #[test]
    fn test_none_never_retries() {
        let policy = RetryPolicy::none();
        assert!(!policy.should_retry_status(500, 0));
        assert!(!policy.should_retry_error(&NetworkError::Connection("x".into()), 0));
    }
}
