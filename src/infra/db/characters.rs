use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{CharactersRepo, RepoError},
    domain::{
        cache_meta::CacheMetadata,
        character::{CharacterRecord, UpstreamCharacter},
        key::CharacterId,
    },
};

use super::{PostgresRepositories, map_sqlx_error};

const SELECT_JOINED: &str = r#"
    SELECT
        c.id, c.name, c.corporation_id, c.race_id, c.bloodline_id, c.security_status,
        c.etag, c.last_modified, c.expires_at, c.updated_at,
        r.name AS race_name,
        b.name AS bloodline_name
    FROM characters c
    LEFT JOIN races r ON r.id = c.race_id
    LEFT JOIN bloodlines b ON b.id = c.bloodline_id
    WHERE c.id = $1
"#;

const UPSERT_JOINED: &str = r#"
    WITH upserted AS (
        INSERT INTO characters (
            id, name, corporation_id, race_id, bloodline_id, security_status,
            etag, last_modified, expires_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            corporation_id = EXCLUDED.corporation_id,
            race_id = EXCLUDED.race_id,
            bloodline_id = EXCLUDED.bloodline_id,
            security_status = EXCLUDED.security_status,
            etag = EXCLUDED.etag,
            last_modified = EXCLUDED.last_modified,
            expires_at = EXCLUDED.expires_at,
            updated_at = now()
        RETURNING *
    )
    SELECT
        u.id, u.name, u.corporation_id, u.race_id, u.bloodline_id, u.security_status,
        u.etag, u.last_modified, u.expires_at, u.updated_at,
        r.name AS race_name,
        b.name AS bloodline_name
    FROM upserted u
    LEFT JOIN races r ON r.id = u.race_id
    LEFT JOIN bloodlines b ON b.id = u.bloodline_id
"#;

#[derive(sqlx::FromRow)]
struct CharacterRow {
    id: i64,
    name: String,
    corporation_id: i64,
    race_id: i32,
    bloodline_id: i32,
    security_status: Option<f64>,
    etag: Option<String>,
    last_modified: Option<OffsetDateTime>,
    expires_at: Option<OffsetDateTime>,
    updated_at: OffsetDateTime,
    race_name: Option<String>,
    bloodline_name: Option<String>,
}

impl TryFrom<CharacterRow> for CharacterRecord {
    type Error = RepoError;

    fn try_from(row: CharacterRow) -> Result<Self, Self::Error> {
        let id = CharacterId::try_from(row.id).map_err(|err| RepoError::Integrity {
            message: format!("stored character id is invalid: {err}"),
        })?;

        Ok(Self {
            id,
            name: row.name,
            corporation_id: row.corporation_id,
            race_id: row.race_id,
            bloodline_id: row.bloodline_id,
            security_status: row.security_status,
            race_name: row.race_name,
            bloodline_name: row.bloodline_name,
            cache: CacheMetadata {
                entity_tag: row.etag,
                last_modified: row.last_modified,
                expires_at: row.expires_at,
            },
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl CharactersRepo for PostgresRepositories {
    async fn find_character(&self, id: CharacterId) -> Result<Option<CharacterRecord>, RepoError> {
        let row = sqlx::query_as::<_, CharacterRow>(SELECT_JOINED)
            .bind(id.get())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(CharacterRecord::try_from).transpose()
    }

    async fn upsert_character(
        &self,
        id: CharacterId,
        payload: &UpstreamCharacter,
        meta: &CacheMetadata,
    ) -> Result<CharacterRecord, RepoError> {
        let row = sqlx::query_as::<_, CharacterRow>(UPSERT_JOINED)
            .bind(id.get())
            .bind(&payload.name)
            .bind(payload.corporation_id)
            .bind(payload.race_id)
            .bind(payload.bloodline_id)
            .bind(payload.security_status)
            .bind(meta.entity_tag.as_deref())
            .bind(meta.last_modified)
            .bind(meta.expires_at)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        CharacterRecord::try_from(row)
    }

    async fn bump_character_metadata(
        &self,
        id: CharacterId,
        meta: &CacheMetadata,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE characters
            SET etag = $2, last_modified = $3, expires_at = $4, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .bind(meta.entity_tag.as_deref())
        .bind(meta.last_modified)
        .bind(meta.expires_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
