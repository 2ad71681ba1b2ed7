use retrace_core::oracle::OracleError;
use thiserror::Error;

/// Failures while setting up an oracle client. Failures of individual calls
/// are reported as `OracleError` through the adapter trait.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("No oracle endpoint configured")]
    MissingEndpoint,

    #[error("Invalid oracle endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("HTTP client setup failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Map a reqwest failure onto the oracle error taxonomy.
///
/// Connection problems and timeouts are transport errors and therefore
/// retried; a body that cannot be decoded is malformed.
pub fn classify(error: reqwest::Error) -> OracleError {
    if let Some(status) = error.status() {
        return OracleError::Status {
            status: status.as_u16(),
            message: error.to_string(),
        };
    }

    if error.is_decode() {
        OracleError::Malformed(error.to_string())
    } else if error.is_builder() {
        OracleError::Unavailable(error.to_string())
    } else {
        OracleError::Transport(error.to_string())
    }
}
