use std::{borrow::Cow, error::Error as StdError, fmt};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use esi_gateway_api_types::ApiFailure;
use thiserror::Error;

use crate::{
    application::repos::RepoError, cache::CacheError, domain::error::DomainError,
    infra::error::InfraError, infra::upstream::UpstreamError,
};

/// Diagnostic chain attached to error responses for the logging middleware. Never serialized.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Stable failure kinds exposed as `code` in the error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    Unauthorized,
    Forbidden,
    RateLimited,
    Backoff,
    UpstreamError,
    NetworkError,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BadRequest",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::Unauthorized => "Unauthorized",
            ErrorCode::Forbidden => "Forbidden",
            ErrorCode::RateLimited => "RateLimited",
            ErrorCode::Backoff => "Backoff",
            ErrorCode::UpstreamError => "UpstreamError",
            ErrorCode::NetworkError => "NetworkError",
            ErrorCode::Internal => "Internal",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Backoff => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::UpstreamError | ErrorCode::NetworkError => StatusCode::BAD_GATEWAY,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "Request could not be processed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Access denied",
            ErrorCode::RateLimited => "Upstream rate limit reached, retry later",
            ErrorCode::Backoff => "Upstream is temporarily unavailable, retry later",
            ErrorCode::UpstreamError => "Upstream request failed",
            ErrorCode::NetworkError => "Upstream could not be reached",
            ErrorCode::Internal => "Unexpected error occurred",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("{0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Domain(DomainError::MalformedKey { .. }) | AppError::BadRequest(_) => {
                ErrorCode::BadRequest
            }
            AppError::Domain(DomainError::UnknownKey { .. }) | AppError::NotFound(_) => {
                ErrorCode::NotFound
            }
            AppError::Unauthorized(_) => ErrorCode::Unauthorized,
            AppError::Upstream(err) => match err {
                UpstreamError::BadRequest => ErrorCode::BadRequest,
                UpstreamError::Unauthorized => ErrorCode::Unauthorized,
                UpstreamError::Forbidden => ErrorCode::Forbidden,
                UpstreamError::NotFound => ErrorCode::NotFound,
                UpstreamError::RateLimited { .. } => ErrorCode::RateLimited,
                UpstreamError::Backoff { .. } => ErrorCode::Backoff,
                UpstreamError::Status { .. } | UpstreamError::Decode { .. } => {
                    ErrorCode::UpstreamError
                }
                UpstreamError::Network { .. } => ErrorCode::NetworkError,
                UpstreamError::InvalidRequest { .. } => ErrorCode::Internal,
            },
            AppError::Repo(_) | AppError::Cache(_) | AppError::Infra(_) | AppError::Unexpected(_) => {
                ErrorCode::Internal
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.code().status()
    }

    /// Caller-safe message. Only client-input failures echo their own text.
    pub fn presentation_message(&self) -> Cow<'static, str> {
        match self {
            AppError::Domain(err @ DomainError::MalformedKey { .. }) => Cow::Owned(err.to_string()),
            AppError::Domain(err @ DomainError::UnknownKey { .. }) => Cow::Owned(err.to_string()),
            AppError::NotFound(message)
            | AppError::BadRequest(message)
            | AppError::Unauthorized(message) => Cow::Owned(message.clone()),
            other => Cow::Borrowed(other.code().default_message()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = code.status();
        let body = ApiFailure::new(self.presentation_message(), code.as_str());
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}
