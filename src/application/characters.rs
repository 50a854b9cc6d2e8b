//! Character records as a cache-aside resource.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use esi_gateway_api_types::CharacterView;

use crate::{
    application::{
        repos::{CharactersRepo, RepoError},
        resource::{CachedResource, Fetched},
    },
    domain::{
        cache_meta::CacheMetadata,
        character::{CharacterRecord, UpstreamCharacter},
        error::DomainError,
        key::CharacterId,
    },
    infra::upstream::{UpstreamClient, UpstreamError},
};

pub const CHARACTER_KIND: &str = "character";

#[derive(Clone)]
pub struct CharacterResource {
    repo: Arc<dyn CharactersRepo>,
    upstream: UpstreamClient,
}

impl CharacterResource {
    pub fn new(repo: Arc<dyn CharactersRepo>, upstream: UpstreamClient) -> Self {
        Self { repo, upstream }
    }
}

#[async_trait]
impl CachedResource for CharacterResource {
    type Key = CharacterId;
    type Record = CharacterRecord;
    type Payload = UpstreamCharacter;
    type View = CharacterView;

    fn kind(&self) -> &'static str {
        CHARACTER_KIND
    }

    fn parse_key(&self, raw: &str) -> Result<CharacterId, DomainError> {
        CharacterId::parse(raw)
    }

    async fn read_durable(&self, key: &CharacterId) -> Result<Option<CharacterRecord>, RepoError> {
        self.repo.find_character(*key).await
    }

    fn durable_meta<'a>(&self, record: &'a CharacterRecord) -> &'a CacheMetadata {
        &record.cache
    }

    async fn upsert_on_success(
        &self,
        key: &CharacterId,
        payload: &UpstreamCharacter,
        meta: &CacheMetadata,
    ) -> Result<CharacterRecord, RepoError> {
        self.repo.upsert_character(*key, payload, meta).await
    }

    async fn bump_on_not_modified(
        &self,
        key: &CharacterId,
        meta: &CacheMetadata,
    ) -> Result<(), RepoError> {
        self.repo.bump_character_metadata(*key, meta).await
    }

    async fn fetch_upstream(
        &self,
        key: &CharacterId,
        entity_tag: Option<&str>,
    ) -> Result<Fetched<UpstreamCharacter>, UpstreamError> {
        let response = self
            .upstream
            .get_conditional::<UpstreamCharacter>(&format!("characters/{key}/"), entity_tag)
            .await?;

        Ok(Fetched {
            payload: response.payload,
            entity_tag: response.validators.entity_tag,
            last_modified: response.validators.last_modified,
            ttl: response.ttl_seconds.map(Duration::from_secs),
        })
    }

    fn to_view(&self, _key: &CharacterId, record: &CharacterRecord) -> CharacterView {
        character_view(record)
    }
}

pub fn character_view(record: &CharacterRecord) -> CharacterView {
    CharacterView {
        id: record.id.get(),
        name: record.name.clone(),
        bloodline: record.bloodline_name.clone(),
        corporation_id: record.corporation_id,
        race: record.race_name.clone(),
        security_status: record.security_status,
    }
}
