use std::time;

/// Exponential backoff for re-establishing the inbound stream.
///
/// The delay doubles with every attempt and is capped at `maximum_interval`. No jitter is applied.
/// Once `max_attempts` retries have been spent, the caller is expected to give up.
#[derive(Copy, Clone, Debug)]
pub struct RetryPolicy {
    /// The backoff interval for the first retry.
    initial_interval: time::Duration,
    /// The maximum possible backoff between retries.
    maximum_interval: time::Duration,
    /// How many retries may be attempted before the failure is final.
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(
        initial_interval: time::Duration,
        maximum_interval: time::Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_interval,
            maximum_interval,
            max_attempts,
        }
    }

    /// Calculate the time to wait before retry number `attempt` (0-based).
    pub fn time_until_next_retry(&self, attempt: u32) -> time::Duration {
        let candidate_interval = 2u32
            .checked_pow(attempt)
            .and_then(|factor| self.initial_interval.checked_mul(factor))
            .unwrap_or(self.maximum_interval);

        std::cmp::min(candidate_interval, self.maximum_interval)
    }

    /// Whether retry number `attempt` (0-based) is still within budget.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: time::Duration::from_secs(5),
            maximum_interval: time::Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}
