use async_trait::async_trait;
use retrace_core::catalog::RequestDescription;
use retrace_core::config::OracleSettings;
use retrace_core::oracle::{OracleAdapter, OracleError};
use std::collections::BTreeMap;
use std::iter::Take;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};

/// Bounded exponential backoff: the n-th retry waits `base_delay * 2^(n-1)`,
/// capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&OracleSettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &OracleSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Delays between attempts; one fewer than `max_attempts`.
    pub fn delays(&self) -> Take<ExponentialBackoff> {
        // from_millis(2) yields 2, 4, 8, ... which the factor scales to base, 2*base, ...
        let factor = (self.base_delay.as_millis() as u64 / 2).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(self.max_delay)
            .take(self.max_attempts.saturating_sub(1))
    }
}

/// Wraps another oracle and retries transient failures under a `RetryPolicy`.
///
/// Permanent failures (4xx other than 429, malformed answers) are returned
/// after the first attempt.
pub struct RetryingOracle<O> {
    inner: O,
    policy: RetryPolicy,
    attempts: AtomicUsize,
}

impl<O: OracleAdapter> RetryingOracle<O> {
    pub fn new(inner: O, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Total attempts made against the inner oracle, retries included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

#[async_trait]
impl<O: OracleAdapter> OracleAdapter for RetryingOracle<O> {
    async fn identify_dynamic_parts(
        &self,
        request: &RequestDescription,
        known_inputs: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, OracleError> {
        let action = || {
            let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("Oracle attempt {} for {}", attempt, request.url);
            self.inner.identify_dynamic_parts(request, known_inputs)
        };

        let is_transient = |error: &OracleError| {
            let transient = error.is_transient();
            if transient {
                warn!("Transient oracle failure for {}: {}", request.url, error);
            }
            transient
        };

        RetryIf::spawn(self.policy.delays(), action, is_transient).await
    }
}
