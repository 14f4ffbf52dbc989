//! REST API Client
//!
//! The two request/response endpoints the session needs besides the
//! persistent connection: prior transcript and dataset summaries. Both are
//! behind the [`ApiClient`] trait so the client actor can be driven by a mock
//! in tests.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::ApiConfig;
use crate::history::HistoryRecord;
use crate::snapshot::DatasetSummary;

/// REST failures
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request could not be sent or the body could not be decoded
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("{url} returned status {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Configured origin or path does not form a valid URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Bearer credentials for the current login
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    /// Wrap an access token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// The raw token
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Request/response endpoints used by the session
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Prior transcript for the logged-in user
    async fn fetch_history(&self, credentials: &Credentials)
        -> Result<Vec<HistoryRecord>, ApiError>;

    /// Current dataset summaries
    async fn list_datasets(
        &self,
        credentials: &Credentials,
    ) -> Result<Vec<DatasetSummary>, ApiError>;
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<HistoryRecord>,
}

#[derive(Deserialize)]
struct DatasetsResponse {
    #[serde(default)]
    datasets: Vec<DatasetSummary>,
}

/// [`ApiClient`] over HTTP
#[derive(Clone, Debug)]
pub struct RestClient {
    http: reqwest::Client,
    history_url: Url,
    datasets_url: Url,
}

impl RestClient {
    /// Create a client for `origin` using the configured paths and timeout
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if the origin or a path is invalid and
    /// [`ApiError::Http`] if the HTTP client cannot be built.
    pub fn new(origin: &str, config: &ApiConfig) -> Result<Self, ApiError> {
        let base = Url::parse(origin).map_err(|e| ApiError::InvalidUrl(format!("{origin}: {e}")))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| ApiError::InvalidUrl(format!("{path}: {e}")))
        };
        let history_url = join(&config.history_path)?;
        let datasets_url = join(&config.datasets_path)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            http,
            history_url,
            datasets_url,
        })
    }

    async fn get_json<T>(&self, url: &Url, credentials: &Credentials) -> Result<T, ApiError>
    where
        T: serde::de::DeserializeOwned,
    {
        debug!(url = %url, "GET");
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(credentials.token())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ApiClient for RestClient {
    async fn fetch_history(
        &self,
        credentials: &Credentials,
    ) -> Result<Vec<HistoryRecord>, ApiError> {
        let body: HistoryResponse = self.get_json(&self.history_url, credentials).await?;
        Ok(body.messages)
    }

    async fn list_datasets(
        &self,
        credentials: &Credentials,
    ) -> Result<Vec<DatasetSummary>, ApiError> {
        let body: DatasetsResponse = self.get_json(&self.datasets_url, credentials).await?;
        Ok(body.datasets)
    }
}
