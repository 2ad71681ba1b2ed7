use crate::error::{ClientError, Result, classify};
use crate::payload::{OracleRequest, parse_answer};
use async_trait::async_trait;
use reqwest::Client;
use retrace_core::catalog::RequestDescription;
use retrace_core::config::OracleSettings;
use retrace_core::oracle::{OracleAdapter, OracleError};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const MAX_ERROR_BODY: usize = 200;

/// Oracle backed by an HTTP judgment service.
///
/// Each call POSTs the request description and the known inputs as JSON and
/// expects the candidate values back. A single attempt is made per call;
/// wrap it in `RetryingOracle` for backoff.
pub struct HttpOracle {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpOracle {
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_timeout(endpoint, 30)
    }

    pub fn with_timeout(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ClientError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;

        let client = Client::builder()
            .user_agent(concat!("Retrace/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs((timeout_secs / 2).max(1)))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key: None,
        })
    }

    pub fn from_settings(settings: &OracleSettings) -> Result<Self> {
        let endpoint = settings
            .endpoint
            .as_deref()
            .ok_or(ClientError::MissingEndpoint)?;
        let oracle = Self::with_timeout(endpoint, settings.timeout_secs)?;

        Ok(match settings.api_key {
            Some(ref key) => oracle.with_api_key(key.clone()),
            None => oracle,
        })
    }

    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl OracleAdapter for HttpOracle {
    async fn identify_dynamic_parts(
        &self,
        request: &RequestDescription,
        known_inputs: &BTreeMap<String, String>,
    ) -> std::result::Result<Vec<String>, OracleError> {
        debug!("Querying oracle at {} for {}", self.endpoint, request.url);

        let mut call = self
            .client
            .post(self.endpoint.clone())
            .json(&OracleRequest {
                request,
                known_inputs,
            });
        if let Some(ref key) = self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await.map_err(classify)?;
        let status = response.status();
        let body = response.text().await.map_err(classify)?;

        if !status.is_success() {
            warn!("Oracle answered {} for {}", status, request.url);
            return Err(OracleError::Status {
                status: status.as_u16(),
                message: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let values = parse_answer(&body)?;
        debug!("Oracle proposed {} value(s) for {}", values.len(), request.url);
        Ok(values)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
