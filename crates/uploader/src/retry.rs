use std::time::Duration;

/// Retry budget and backoff for transient chunk failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Consecutive failed requests tolerated before the upload fails.
    /// Chunk PUTs and status queries draw from the same budget, which is
    /// restored whenever the server acknowledges new bytes.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculates the delay for a given attempt number (1-based),
    /// with ±25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        jittered(capped, jitter_unit())
    }

    /// Returns `true` once `failures` consecutive failures exhaust the budget.
    pub fn exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts.max(1)
    }
}

/// Spreads `secs` over `[0.75, 1.25)` of itself; `unit` is in `[0, 1)`.
fn jittered(secs: f64, unit: f64) -> Duration {
    let offset = unit * 2.0 - 1.0;
    Duration::from_secs_f64((secs + secs * 0.25 * offset).max(0.0))
}

/// Sub-second clock noise scaled to `[0, 1)`.
fn jitter_unit() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos) / 1_000_000_000.0
}
