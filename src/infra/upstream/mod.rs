//! ESI access: conditional-fetch metadata, the shared backoff coordinator and the HTTP client.

pub mod backoff;
pub mod client;
pub mod error;
pub mod headers;

pub use backoff::{BackoffCoordinator, BackoffPolicy, ResponseClass};
pub use client::{ConditionalResponse, UpstreamClient, UpstreamConfig};
pub use error::UpstreamError;
