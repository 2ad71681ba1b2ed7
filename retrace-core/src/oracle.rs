//! Interface to the external judgment capability that proposes candidate
//! dynamic values for a request.
//!
//! The core only consumes this trait. The network-backed implementation
//! lives in `retrace-oracle`; `StaticOracle` is a deterministic stand-in.

use crate::catalog::RequestDescription;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Oracle transport error: {0}")]
    Transport(String),

    #[error("Oracle returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Oracle returned malformed data: {0}")]
    Malformed(String),

    #[error("Oracle unavailable: {0}")]
    Unavailable(String),
}

impl OracleError {
    /// Transient failures are worth another attempt at the adapter boundary.
    pub fn is_transient(&self) -> bool {
        match self {
            OracleError::Transport(_) => true,
            OracleError::Status { status, .. } => *status == 429 || *status >= 500,
            OracleError::Malformed(_) | OracleError::Unavailable(_) => false,
        }
    }
}

#[async_trait]
pub trait OracleAdapter: Send + Sync {
    /// Propose the values in `request` that look session-specific.
    ///
    /// An empty answer means "no new information", never "fully resolved".
    async fn identify_dynamic_parts(
        &self,
        request: &RequestDescription,
        known_inputs: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, OracleError>;
}

/// Oracle with canned answers keyed by request URL.
///
/// Unknown URLs answer with an empty list. Every call is recorded so tests
/// can assert on what was asked.
#[derive(Debug, Default)]
pub struct StaticOracle {
    answers: HashMap<String, Result<Vec<String>, OracleError>>,
    calls: Mutex<Vec<String>>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer<I, S>(mut self, url: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.answers
            .insert(url.into(), Ok(values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn with_failure(mut self, url: impl Into<String>, error: OracleError) -> Self {
        self.answers.insert(url.into(), Err(error));
        self
    }

    /// URLs asked about, in call order.
    pub fn calls(&self) -> Vec<String> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl OracleAdapter for StaticOracle {
    async fn identify_dynamic_parts(
        &self,
        request: &RequestDescription,
        _known_inputs: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, OracleError> {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(request.url.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.url.clone()),
        }

        self.answers
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(OracleError::Transport("reset".into()).is_transient());
        assert!(
            OracleError::Status {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            OracleError::Status {
                status: 429,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !OracleError::Status {
                status: 401,
                message: String::new()
            }
            .is_transient()
        );
        assert!(!OracleError::Malformed("x".into()).is_transient());
    }

    #[tokio::test]
    async fn test_static_oracle_records_calls() {
        let oracle = StaticOracle::new().with_answer("https://x.test/a", ["tok"]);
        let request = crate::catalog::CapturedRequest::new("GET", "https://x.test/a").describe(0);

        let answer = oracle
            .identify_dynamic_parts(&request, &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(answer, vec!["tok"]);

        let other = crate::catalog::CapturedRequest::new("GET", "https://x.test/b").describe(1);
        assert!(
            oracle
                .identify_dynamic_parts(&other, &BTreeMap::new())
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(oracle.calls(), vec!["https://x.test/a", "https://x.test/b"]);
    }
}
