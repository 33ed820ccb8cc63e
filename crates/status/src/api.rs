//! REST client for the job-status endpoint.
//!
//! The live channel gives no replay: events sent while it was
//! reconnecting are lost. Callers use [`StatusApi::get_job`] to fetch
//! the authoritative current state after a gap.

use reqwest::Url;
use serde::Deserialize;

use crate::messages::ProgressPayload;

/// HTTP client for the job-status API.
pub struct StatusApi {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

/// Current state of a job as reported by `GET /jobs/{job_id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    /// Server-side job state, e.g. `"processing"` or `"completed"`.
    pub status: String,
    #[serde(default)]
    pub progress: Option<ProgressPayload>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl JobSnapshot {
    /// The job finished successfully.
    pub fn is_completed(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "complete")
    }

    /// The job stopped without completing.
    pub fn is_failed(&self) -> bool {
        matches!(self.status.as_str(), "failed" | "error" | "cancelled")
    }
}

/// Errors from the job-status REST layer.
#[derive(Debug, thiserror::Error)]
pub enum StatusApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The configured API base URL cannot carry a job path.
    #[error("Invalid status API URL: {0}")]
    InvalidUrl(String),

    /// The server returned a non-2xx status code.
    #[error("Status API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl StatusApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8000/api`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Fetch the current state of one job.
    pub async fn get_job(&self, job_id: &str) -> Result<JobSnapshot, StatusApiError> {
        let mut request = self.client.get(self.job_url(job_id)?);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        Self::parse_response(response).await
    }

    /// `<api_url>/jobs/<job_id>`, with the job id as one encoded segment.
    fn job_url(&self, job_id: &str) -> Result<Url, StatusApiError> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| StatusApiError::InvalidUrl(format!("{}: {e}", self.api_url)))?;
        url.path_segments_mut()
            .map_err(|_| StatusApiError::InvalidUrl(format!("{}: cannot be a base URL", self.api_url)))?
            .pop_if_empty()
            .extend(["jobs", job_id]);
        Ok(url)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, StatusApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StatusApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StatusApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}
