//! Bounded retries for transient fetch failures

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::warn;

use super::timing::next_delay;
use crate::error::FetchError;

/// Pause shared by every caller of one [`RetryPolicy`]
///
/// When the service rate limits one request, all workers hold off until the
/// requested time has passed instead of each discovering the limit alone.
#[derive(Debug, Default)]
pub struct RateLimitGate {
    resume_at: Mutex<Option<Instant>>,
}

impl RateLimitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block new calls for at least `delay` from now
    pub fn pause_for(&self, delay: Duration) {
        let until = Instant::now() + delay;
        let mut resume_at = self.resume_at.lock().unwrap_or_else(|e| e.into_inner());
        *resume_at = Some(resume_at.map_or(until, |current| current.max(until)));
    }

    /// Time left before calls may resume
    pub fn remaining(&self) -> Duration {
        let resume_at = self.resume_at.lock().unwrap_or_else(|e| e.into_inner());
        resume_at.map_or(Duration::ZERO, |at| at.saturating_duration_since(Instant::now()))
    }

    /// Sleep until the gate is open
    pub fn wait(&self) {
        loop {
            let remaining = self.remaining();
            if remaining.is_zero() {
                return;
            }
            std::thread::sleep(remaining);
        }
    }
}

/// Retry policy for a single remote call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    gate: Arc<RateLimitGate>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(500), Duration::from_secs(60))
    }
}

impl RetryPolicy {
    /// # Arguments
    /// * `max_attempts` - Total calls allowed, including the first (at least 1)
    /// * `base_delay` - Delay after the first failure, doubled per retry
    /// * `max_delay` - Cap on the computed delay (Retry-After may exceed it)
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            gate: Arc::new(RateLimitGate::new()),
        }
    }

    /// Policy that never waits between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn gate(&self) -> &Arc<RateLimitGate> {
        &self.gate
    }

    /// Run `call`, retrying transient failures.
    ///
    /// Fatal errors return immediately. After the last attempt the final
    /// transient error is returned with the attempt count appended.
    pub fn execute<T, F>(&self, mut call: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Result<T, FetchError>,
    {
        let mut delay = Duration::ZERO;
        let mut attempt = 0;

        loop {
            self.gate.wait();
            attempt += 1;

            let (message, retry_after, rate_limited) = match call() {
                Ok(value) => return Ok(value),
                Err(FetchError::Transient {
                    message,
                    retry_after,
                    rate_limited,
                }) => (message, retry_after, rate_limited),
                Err(fatal) => return Err(fatal),
            };

            if attempt >= self.max_attempts {
                return Err(FetchError::Transient {
                    message: format!("{} (gave up after {} attempts)", message, attempt),
                    retry_after,
                    rate_limited,
                });
            }

            delay = next_delay(
                attempt - 1,
                self.base_delay,
                self.max_delay,
                delay,
                retry_after,
            );
            warn!(
                "{}; retrying in {:?} (attempt {}/{})",
                message,
                delay,
                attempt + 1,
                self.max_attempts
            );

            // Throttling applies to the whole token, not just this call.
            if rate_limited {
                self.gate.pause_for(delay);
            } else {
                std::thread::sleep(delay);
            }
        }
    }
}
