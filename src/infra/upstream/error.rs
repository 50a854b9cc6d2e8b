use thiserror::Error;

/// Classified outcome of a failed upstream call.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream rejected the request (400)")]
    BadRequest,
    #[error("upstream rejected the caller credentials (401)")]
    Unauthorized,
    #[error("upstream denied access (403)")]
    Forbidden,
    #[error("upstream has no such resource (404)")]
    NotFound,
    #[error("upstream is rate limiting requests ({status})")]
    RateLimited { status: u16 },
    #[error("upstream asked callers to back off ({status})")]
    Backoff { status: u16 },
    #[error("upstream answered {status}: {snippet}")]
    Status { status: u16, snippet: String },
    #[error("upstream could not be reached: {message}")]
    Network { message: String },
    #[error("upstream payload could not be decoded: {message}")]
    Decode { message: String },
    #[error("upstream request could not be built: {message}")]
    InvalidRequest { message: String },
}

impl UpstreamError {
    pub fn network(err: impl std::fmt::Display) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }

    /// Status code the upstream answered with, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::BadRequest => Some(400),
            UpstreamError::Unauthorized => Some(401),
            UpstreamError::Forbidden => Some(403),
            UpstreamError::NotFound => Some(404),
            UpstreamError::RateLimited { status }
            | UpstreamError::Backoff { status }
            | UpstreamError::Status { status, .. } => Some(*status),
            UpstreamError::Network { .. }
            | UpstreamError::Decode { .. }
            | UpstreamError::InvalidRequest { .. } => None,
        }
    }
}
