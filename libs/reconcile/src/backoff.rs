//! Retrying writes that lose an optimistic concurrency race.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// Errors that can tell a version conflict apart from other failures.
pub trait Conflict {
    fn is_conflict(&self) -> bool;
}

/// Bounded backoff for conflict retries.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Total attempts, including the first.
    pub steps: u32,

    /// Delay after the first failed attempt.
    pub duration: Duration,

    /// Multiplier applied per attempt.
    pub factor: f64,

    /// Random extra delay as a fraction of the computed delay (0.0 to 1.0).
    pub jitter: f64,

    /// Upper bound on the computed delay before jitter.
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            steps: 5,
            duration: Duration::from_millis(100),
            factor: 1.5,
            jitter: 1.0,
            cap: Duration::from_secs(2),
        }
    }
}

impl Backoff {
    /// Delay to wait after the given (zero-based) failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.duration.as_secs_f64() * self.factor.max(1.0).powi(attempt as i32);
        let base = base.min(self.cap.as_secs_f64());

        let jitter = if self.jitter > 0.0 {
            rand::rng().random_range(0.0..=self.jitter) * base
        } else {
            0.0
        };

        Duration::from_secs_f64(base + jitter)
    }
}

/// Run `op` until it succeeds, fails with a non-conflict error, or the
/// backoff runs out of steps. The attempt number is passed to `op` so it can
/// re-read state before every retry.
///
/// On exhaustion the last conflict error is returned.
pub async fn retry_on_conflict<T, E, F, Fut>(backoff: &Backoff, mut op: F) -> Result<T, E>
where
    E: Conflict,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Err(e) if e.is_conflict() && attempt + 1 < backoff.steps => {
                let delay = backoff.delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Conflict, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}
