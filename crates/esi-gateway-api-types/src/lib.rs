//! Response envelope and resource shapes served by the esi-gateway HTTP API.
//!
//! Every response body is either an [`ApiSuccess`] or an [`ApiFailure`]; clients that do not know
//! the outcome up front can decode into [`ApiResponse`].

use serde::{Deserialize, Serialize};

/// Which tier produced the data in a successful response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// The low-latency key-value cache.
    Fastcache,
    /// The relational store holding the last known-good copy.
    Durable,
    /// A fresh fetch (or a not-modified revalidation) against ESI.
    Upstream,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Fastcache => "fastcache",
            DataSource::Durable => "durable",
            DataSource::Upstream => "upstream",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApiMeta {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source: Option<DataSource>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stale: Option<bool>,
    /// Remaining lifetime of the served copy, in seconds.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub etag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSuccess<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub meta: Option<ApiMeta>,
}

impl<T> ApiSuccess<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            meta: None,
        }
    }

    pub fn with_meta(data: T, meta: ApiMeta) -> Self {
        Self {
            success: true,
            data,
            meta: Some(meta),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFailure {
    pub success: bool,
    pub message: String,
    /// Stable error kind, e.g. `NotFound` or `NetworkError`.
    pub code: String,
}

impl ApiFailure {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Either envelope, for clients decoding a body without looking at the status first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiResponse<T> {
    Success(ApiSuccess<T>),
    Failure(ApiFailure),
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success(_))
    }
}

/// Client-facing projection of a character record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterView {
    pub id: i64,
    pub name: String,
    pub bloodline: Option<String>,
    pub corporation_id: i64,
    pub race: Option<String>,
    pub security_status: Option<f64>,
}

/// One character match returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
}
