use std::time::Duration;
use tokio::time::sleep;

/// Bounded exponential backoff, delays in milliseconds
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay_ms: u64,
    max_delay_ms: u64,
    max_retries: u32,
    current_attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

impl ExponentialBackoff {
    pub fn new(initial_ms: u64, max_ms: u64, retries: u32) -> Self {
        Self {
            initial_delay_ms: initial_ms,
            max_delay_ms: max_ms,
            max_retries: retries,
            current_attempt: 0,
        }
    }

    /// Delay before the next retry, `None` once retries are used up
    pub fn next_delay(&self) -> Option<Duration> {
        if self.current_attempt >= self.max_retries {
            return None;
        }
        let factor = 2_u64.saturating_pow(self.current_attempt);
        let delay = self.initial_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Some(Duration::from_millis(delay))
    }

    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        let delay = self.next_delay().ok_or(MaxRetriesExceeded)?;

        log::warn!(
            "⏳ Retry attempt {} of {} in {}ms",
            self.current_attempt + 1,
            self.max_retries,
            delay.as_millis()
        );

        sleep(delay).await;
        self.current_attempt += 1;
        Ok(())
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_up_to_max() {
        let mut backoff = ExponentialBackoff::new(100, 300, 4);
        let mut delays = Vec::new();
        while let Some(delay) = backoff.next_delay() {
            delays.push(delay.as_millis());
            backoff.current_attempt += 1;
        }
        assert_eq!(delays, vec![100, 200, 300, 300]);
    }

    #[tokio::test]
    async fn test_sleep_until_exhausted() {
        let mut backoff = ExponentialBackoff::new(1, 2, 2);
        assert!(backoff.sleep().await.is_ok());
        assert!(backoff.sleep().await.is_ok());
        assert_eq!(backoff.sleep().await, Err(MaxRetriesExceeded));
        assert_eq!(backoff.attempts(), 2);

        backoff.reset();
        assert!(backoff.next_delay().is_some());
    }
}
