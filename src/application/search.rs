//! Character search on behalf of an authenticated caller. Results are identity-scoped and never
//! cached.

use std::collections::HashMap;

use esi_gateway_api_types::SearchHit;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    application::error::AppError,
    infra::upstream::{UpstreamClient, UpstreamError},
};

const TARGET: &str = "esi_gateway::search";

#[derive(Debug, Default, Deserialize)]
struct SearchResult {
    #[serde(default)]
    character: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct ResolvedName {
    id: i64,
    name: String,
    category: String,
}

#[derive(Clone)]
pub struct SearchService {
    upstream: UpstreamClient,
}

impl SearchService {
    pub fn new(upstream: UpstreamClient) -> Self {
        Self { upstream }
    }

    /// Find characters matching `query`, with names where the name lookup succeeds.
    pub async fn characters(
        &self,
        bearer: &str,
        query: &str,
        strict: bool,
    ) -> Result<Vec<SearchHit>, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::bad_request("Missing ?query"));
        }

        let params = [
            ("categories", "character".to_string()),
            ("search", query.to_string()),
            ("strict", strict.to_string()),
        ];
        let result = match self
            .upstream
            .get_authorized::<SearchResult>("search", &params, bearer)
            .await
        {
            Ok(result) => result,
            Err(UpstreamError::NotFound) => SearchResult::default(),
            Err(err) => return Err(err.into()),
        };

        let ids = result.character;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let names = self.resolve_names(&ids).await;
        Ok(ids
            .into_iter()
            .map(|id| SearchHit {
                id,
                name: names.get(&id).cloned(),
            })
            .collect())
    }

    async fn resolve_names(&self, ids: &[i64]) -> HashMap<i64, String> {
        match self
            .upstream
            .post_json::<_, Vec<ResolvedName>>("universe/names", ids)
            .await
        {
            Ok(resolved) => resolved
                .into_iter()
                .filter(|entry| entry.category == "character")
                .map(|entry| (entry.id, entry.name))
                .collect(),
            Err(UpstreamError::NotFound) => {
                debug!(target: TARGET, count = ids.len(), "no names resolved");
                HashMap::new()
            }
            Err(err) => {
                warn!(target: TARGET, op = "search.resolve_names", count = ids.len(), error = %err, "name lookup failed, returning ids only");
                HashMap::new()
            }
        }
    }
}
