use std::sync::Arc;

use crate::{
    application::{cache_aside::CacheAside, characters::CharacterResource, search::SearchService},
    cache::FastCache,
    infra::db::PostgresRepositories,
};

#[derive(Clone)]
pub struct ApiState {
    pub characters: Arc<CacheAside<CharacterResource>>,
    pub search: Arc<SearchService>,
    pub db: Arc<PostgresRepositories>,
    pub cache: Arc<dyn FastCache>,
}
