use feedrun_core::error::CoreError;

/// Errors from a compute backend.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// The HTTP request itself failed (connect, DNS, TLS, body).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend did not answer within the configured timeout.
    #[error("Compute backend timed out after {0}s")]
    Timeout(u64),

    /// The backend returned a non-2xx status code.
    #[error("Compute API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The backend answered 2xx with a body we could not interpret.
    #[error("Invalid compute response: {0}")]
    InvalidResponse(String),

    /// No backend is configured under this compute resource name.
    #[error("Unknown compute resource '{0}'")]
    UnknownResource(String),
}

impl ComputeError {
    /// Whether retrying the same call may succeed.
    ///
    /// Connection failures, timeouts, 5xx and 429 are transient; any other
    /// rejection is final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Timeout(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidResponse(_) | Self::UnknownResource(_) => false,
        }
    }
}

impl From<ComputeError> for CoreError {
    fn from(err: ComputeError) -> Self {
        CoreError::Dispatch(err.to_string())
    }
}
