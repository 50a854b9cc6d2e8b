//! Durable-store contracts.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    cache_meta::CacheMetadata,
    character::{CharacterRecord, UpstreamCharacter},
    key::CharacterId,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Character rows plus their cache metadata.
///
/// Records are created and refreshed only from upstream answers; nothing here deletes them.
#[async_trait]
pub trait CharactersRepo: Send + Sync {
    async fn find_character(&self, id: CharacterId) -> Result<Option<CharacterRecord>, RepoError>;

    /// Insert or overwrite the substantive columns and metadata, returning the joined row.
    async fn upsert_character(
        &self,
        id: CharacterId,
        payload: &UpstreamCharacter,
        meta: &CacheMetadata,
    ) -> Result<CharacterRecord, RepoError>;

    /// Touch only the metadata columns after a not-modified answer.
    async fn bump_character_metadata(
        &self,
        id: CharacterId,
        meta: &CacheMetadata,
    ) -> Result<(), RepoError>;
}
