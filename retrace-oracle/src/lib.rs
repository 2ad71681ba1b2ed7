pub mod client;
pub mod error;
pub mod payload;
pub mod retry;

pub use client::HttpOracle;
pub use error::ClientError;
pub use retry::{RetryPolicy, RetryingOracle};

use retrace_core::config::OracleSettings;

/// HTTP oracle wrapped in the retry policy described by `settings`.
pub fn oracle_from_settings(settings: &OracleSettings) -> error::Result<RetryingOracle<HttpOracle>> {
    let oracle = HttpOracle::from_settings(settings)?;
    Ok(RetryingOracle::new(oracle, RetryPolicy::from_settings(settings)))
}
