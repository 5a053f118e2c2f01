//! HTTP client for a pfcon-style compute service.
//!
//! Endpoints:
//! - `POST {url}/api/v1/` submits a job and answers `{"jid": ...}`
//! - `GET {url}/api/v1/{jid}/` answers `{"compute": {"status", "message"}}`
//! - `DELETE {url}/api/v1/{jid}/` stops and removes the job

use std::time::Duration;

use async_trait::async_trait;
use feedrun_core::types::JobHandle;
use serde::Deserialize;

use crate::backend::{ComputeBackend, RemoteStatus, SubmitRequest};
use crate::error::ComputeError;

/// Longest backend message kept in a failure reason (the tail is kept).
const MAX_REASON_LEN: usize = 3000;

/// HTTP client for a single compute resource.
pub struct PfconClient {
    client: reqwest::Client,
    api_url: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    jid: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    compute: ComputeState,
}

#[derive(Debug, Deserialize)]
struct ComputeState {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

impl PfconClient {
    /// Create a client for the service at `api_url`, e.g.
    /// `http://pfcon:30005`. Every call is bounded by `timeout`.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, ComputeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url, timeout))
    }

    /// Create a client reusing an existing [`reqwest::Client`] so several
    /// compute resources share one connection pool.
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            timeout_secs: timeout.as_secs(),
        }
    }

    fn job_url(&self, handle: &JobHandle) -> String {
        format!("{}/api/v1/{}/", self.api_url, handle)
    }

    fn map_send_error(&self, err: reqwest::Error) -> ComputeError {
        if err.is_timeout() {
            ComputeError::Timeout(self.timeout_secs)
        } else {
            ComputeError::Request(err)
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, or turn it into a
    /// [`ComputeError::Api`] carrying the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ComputeError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComputeError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComputeError> {
        let response = Self::ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ComputeError::InvalidResponse(e.to_string()))
    }
}

/// Map a pfcon compute status onto the orchestrator's view.
fn remote_status(state: ComputeState) -> Result<RemoteStatus, ComputeError> {
    match state.status.as_str() {
        "notStarted" | "started" => Ok(RemoteStatus::Running),
        "finishedSuccessfully" => Ok(RemoteStatus::Succeeded),
        "finishedWithError" | "undefined" => Ok(RemoteStatus::Failed {
            reason: state.message.map(truncate_reason),
        }),
        other => Err(ComputeError::InvalidResponse(format!(
            "unknown compute status '{other}'"
        ))),
    }
}

fn truncate_reason(message: String) -> String {
    let chars = message.chars().count();
    if chars <= MAX_REASON_LEN {
        return message;
    }
    message.chars().skip(chars - MAX_REASON_LEN).collect()
}

#[async_trait]
impl ComputeBackend for PfconClient {
    async fn submit(&self, request: &SubmitRequest) -> Result<JobHandle, ComputeError> {
        tracing::debug!(jid = %request.jid, url = %self.api_url, "Submitting job");
        let response = self
            .client
            .post(format!("{}/api/v1/", self.api_url))
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let body: SubmitResponse = Self::parse_response(response).await?;
        Ok(JobHandle::new(body.jid))
    }

    async fn poll(&self, handle: &JobHandle) -> Result<RemoteStatus, ComputeError> {
        let response = self
            .client
            .get(self.job_url(handle))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let body: StatusResponse = Self::parse_response(response).await?;
        remote_status(body.compute)
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), ComputeError> {
        let response = self
            .client
            .delete(self.job_url(handle))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        // Already removed on the remote side.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::ensure_success(response).await?;
        Ok(())
    }
}
