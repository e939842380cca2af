use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    /// Doubles after every failure, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

/// Bounded retry policy for transient operations such as the initial
/// database handshake.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// Five attempts, five seconds apart.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Fixed(Duration::from_secs(5)),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(max)
            }
        }
    }

    /// Runs `operation` until it succeeds or the attempt budget is spent.
    ///
    /// On exhaustion the last error is returned together with the number of
    /// attempts made.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, (u32, E)>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.max_attempts => {
                    warn!(
                        "{} failed on attempt {}/{}, giving up: {}",
                        what, attempt, self.max_attempts, err
                    );
                    return Err((attempt, err));
                }
                Err(err) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{} failed on attempt {}/{}, retrying in {:?}: {}",
                        what, attempt, self.max_attempts, delay, err
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
