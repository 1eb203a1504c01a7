//! Bounded convergence polling

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::PollingConfig;
use crate::error::FixtureResult;

/// Something that can be sampled until it reaches an expected state.
#[async_trait]
pub trait ConvergenceQuery: Send + Sync {
    type Value: Send;

    /// Read the current state.
    async fn sample(&self) -> FixtureResult<Self::Value>;

    fn is_converged(&self, value: &Self::Value) -> bool;

    /// Nudge the system toward convergence between samples. No-op by default.
    async fn correct(&self) -> FixtureResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBounds {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl PollBounds {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for PollBounds {
    fn default() -> Self {
        PollBounds::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollBounds {
    fn from(config: &PollingConfig) -> Self {
        PollBounds::new(config.max_attempts, Duration::from_millis(config.delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Converged<V> {
    pub value: V,
    /// 1-based attempt on which the value converged
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceTimeout<V> {
    pub attempts: u32,
    /// Last successfully sampled value
    pub last: Option<V>,
    pub last_error: Option<String>,
}

impl<V> fmt::Display for ConvergenceTimeout<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did not converge after {} attempts", self.attempts)?;
        if let Some(err) = &self.last_error {
            write!(f, " (last error: {err})")?;
        }
        Ok(())
    }
}

impl<V: fmt::Debug> std::error::Error for ConvergenceTimeout<V> {}

#[derive(Debug, Clone, Copy, Default)]
pub struct Poller {
    bounds: PollBounds,
}

impl Poller {
    pub fn new(bounds: PollBounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> PollBounds {
        self.bounds
    }

    /// Sample until converged or `max_attempts` samples have been taken.
    ///
    /// Correction and the delay only run when another attempt follows. The
    /// caller decides what a timeout means; nothing here asserts.
    pub async fn poll_until_converged<Q>(
        &self,
        query: &Q,
    ) -> Result<Converged<Q::Value>, ConvergenceTimeout<Q::Value>>
    where
        Q: ConvergenceQuery + ?Sized,
    {
        let mut last = None;
        let mut last_error = None;

        for attempt in 1..=self.bounds.max_attempts {
            match query.sample().await {
                Ok(value) => {
                    if query.is_converged(&value) {
                        debug!(attempt, "converged");
                        return Ok(Converged { value, attempts: attempt });
                    }
                    debug!(attempt, "not converged yet");
                    last = Some(value);
                }
                Err(e) => {
                    warn!(attempt, "sample failed: {}", e);
                    last_error = Some(e.to_string());
                }
            }

            if attempt < self.bounds.max_attempts {
                if let Err(e) = query.correct().await {
                    warn!(attempt, "corrective action failed: {}", e);
                    last_error = Some(e.to_string());
                }
                sleep(self.bounds.delay).await;
            }
        }

        Err(ConvergenceTimeout {
            attempts: self.bounds.max_attempts,
            last,
            last_error,
        })
    }
}
