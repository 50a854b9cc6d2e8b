use std::{sync::Arc, time::Duration};

use metrics::counter;
use reqwest::{
    Client, Method, RequestBuilder, Response, StatusCode, Url,
    header::{ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{infra::error::InfraError, util::clock::Clock};

use super::{
    backoff::{BackoffCoordinator, ResponseClass},
    error::UpstreamError,
    headers::{ErrorBudget, ResponseValidators, compute_ttl, conditional_headers, retry_after},
};

const TARGET: &str = "esi_gateway::upstream";
const COMPATIBILITY_DATE: HeaderName = HeaderName::from_static("x-compatibility-date");
const SNIPPET_CHARS: usize = 256;

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: Url,
    pub compatibility_date: String,
    pub accept_language: String,
    pub timeout: Duration,
    pub user_agent: String,
}

/// Result of a conditional GET: `payload` is `None` on 304.
#[derive(Debug, Clone)]
pub struct ConditionalResponse<T> {
    pub payload: Option<T>,
    pub validators: ResponseValidators,
    pub ttl_seconds: Option<u64>,
}

/// Outbound ESI client. Every call waits on the shared backoff first and feeds the error-budget
/// headers back into it afterwards.
#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
    base: Url,
    backoff: Arc<BackoffCoordinator>,
    clock: Arc<dyn Clock>,
}

impl UpstreamClient {
    pub fn new(
        config: &UpstreamConfig,
        backoff: Arc<BackoffCoordinator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, InfraError> {
        let mut defaults = HeaderMap::new();
        defaults.insert(ACCEPT, HeaderValue::from_static("application/json"));
        defaults.insert(
            COMPATIBILITY_DATE,
            HeaderValue::from_str(&config.compatibility_date).map_err(|err| {
                InfraError::configuration(format!("invalid compatibility date header: {err}"))
            })?,
        );
        defaults.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language).map_err(|err| {
                InfraError::configuration(format!("invalid accept-language header: {err}"))
            })?,
        );

        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(defaults)
            .timeout(config.timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        let mut base = config.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            http,
            base,
            backoff,
            clock,
        })
    }

    pub fn backoff(&self) -> &Arc<BackoffCoordinator> {
        &self.backoff
    }

    /// GET with `If-None-Match` when a tag is known.
    pub async fn get_conditional<T: DeserializeOwned>(
        &self,
        path: &str,
        entity_tag: Option<&str>,
    ) -> Result<ConditionalResponse<T>, UpstreamError> {
        let url = self.url(path, &[])?;
        let request = self
            .http
            .get(url)
            .headers(conditional_headers(entity_tag));
        let response = self.execute(Method::GET, path, request).await?;

        let validators = ResponseValidators::extract(response.headers());
        let ttl_seconds = compute_ttl(response.headers(), self.clock.now());
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(ConditionalResponse {
                payload: None,
                validators,
                ttl_seconds,
            });
        }

        let payload = decode(response).await?;
        Ok(ConditionalResponse {
            payload: Some(payload),
            validators,
            ttl_seconds,
        })
    }

    /// Authenticated GET on behalf of a caller.
    pub async fn get_authorized<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        bearer: &str,
    ) -> Result<T, UpstreamError> {
        let url = self.url(path, query)?;
        let authorization = HeaderValue::from_str(&format!("Bearer {bearer}"))
            .map_err(|_| UpstreamError::Unauthorized)?;
        let request = self.http.get(url).header(AUTHORIZATION, authorization);
        let response = self.execute(Method::GET, path, request).await?;
        decode(response).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, UpstreamError> {
        let url = self.url(path, &[])?;
        let request = self.http.post(url).json(body);
        let response = self.execute(Method::POST, path, request).await?;
        decode(response).await
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, UpstreamError> {
        let mut url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|err| UpstreamError::InvalidRequest {
                message: format!("invalid upstream path `{path}`: {err}"),
            })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        request: RequestBuilder,
    ) -> Result<Response, UpstreamError> {
        self.backoff.await_ready().await;

        debug!(target: TARGET, method = %method, path, "calling upstream");
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                counter!("esi_gateway_upstream_requests_total", "status" => "network")
                    .increment(1);
                warn!(target: TARGET, method = %method, path, error = %err, "upstream unreachable");
                return Err(UpstreamError::network(err));
            }
        };

        let status = response.status();
        counter!(
            "esi_gateway_upstream_requests_total",
            "status" => status.as_u16().to_string()
        )
        .increment(1);

        let budget = ErrorBudget::extract(response.headers());
        if let Some(budget) = budget {
            debug!(
                target: TARGET,
                path,
                remaining = budget.remaining,
                reset_seconds = budget.reset_seconds,
                "error budget"
            );
        }

        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            if let Some(budget) = budget {
                self.backoff.observe(budget, ResponseClass::Success).await;
            }
            return Ok(response);
        }

        self.backoff
            .observe_failure(status.as_u16(), budget, retry_after(response.headers()))
            .await;

        let error = classify(response).await;
        warn!(target: TARGET, method = %method, path, status = status.as_u16(), error = %error, "upstream call failed");
        Err(error)
    }
}

async fn classify(response: Response) -> UpstreamError {
    let status = response.status().as_u16();
    match status {
        400 => UpstreamError::BadRequest,
        401 => UpstreamError::Unauthorized,
        403 => UpstreamError::Forbidden,
        404 => UpstreamError::NotFound,
        420 | 429 => UpstreamError::RateLimited { status },
        503 => UpstreamError::Backoff { status },
        _ => {
            let body = response.text().await.unwrap_or_default();
            UpstreamError::Status {
                status,
                snippet: body.chars().take(SNIPPET_CHARS).collect(),
            }
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, UpstreamError> {
    let bytes = response.bytes().await.map_err(UpstreamError::network)?;
    serde_json::from_slice(&bytes).map_err(UpstreamError::decode)
}
