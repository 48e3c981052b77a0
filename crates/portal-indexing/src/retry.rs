//! Writer-lock acquisition with exponential backoff.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, error, warn};

use portal_search::SearchError;
use portal_types::{LockSettings, Settings};

use crate::error::IndexingError;

/// Bounded exponential backoff for lock-contention errors.
#[derive(Debug, Clone, PartialEq)]
pub struct LockRetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for LockRetryPolicy {
    fn default() -> Self {
        Self::from(&LockSettings::default())
    }
}

impl From<&LockSettings> for LockRetryPolicy {
    fn from(settings: &LockSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_interval: Duration::from_millis(settings.initial_interval_ms),
            max_interval: Duration::from_millis(settings.max_interval_ms),
            multiplier: 2.0,
        }
    }
}

impl From<&Settings> for LockRetryPolicy {
    fn from(settings: &Settings) -> Self {
        Self::from(&settings.lock)
    }
}

impl LockRetryPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_intervals(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_interval = initial;
        self.max_interval = max;
        self
    }

    fn backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.initial_interval,
            current_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            // Attempts bound the loop, not elapsed time.
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        backoff
    }

    /// Run `op` until it succeeds, retrying lock contention only.
    ///
    /// Any other error is returned on the first failure. Exhausting the
    /// attempts yields [`IndexingError::LockContention`].
    pub fn acquire<T>(
        &self,
        mut op: impl FnMut() -> Result<T, SearchError>,
    ) -> Result<T, IndexingError> {
        let mut backoff = self.backoff();
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(attempt = attempts, "Acquiring index writer");

            let e = match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_lock_contention() => e,
                Err(e) => return Err(e.into()),
            };

            if attempts >= self.max_attempts {
                error!(error = %e, attempts, "Index writer lock retries exhausted");
                return Err(IndexingError::LockContention { attempts });
            }

            match backoff.next_backoff() {
                Some(duration) => {
                    warn!(
                        error = %e,
                        attempt = attempts,
                        retry_in_ms = duration.as_millis() as u64,
                        "Index writer busy, retrying"
                    );
                    std::thread::sleep(duration);
                }
                None => {
                    error!(error = %e, attempts, "Backoff exhausted");
                    return Err(IndexingError::LockContention { attempts });
                }
            }
        }
    }
}
