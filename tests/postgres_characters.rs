use esi_gateway::{
    application::repos::{CharactersRepo, RepoError},
    domain::{cache_meta::CacheMetadata, character::UpstreamCharacter, key::CharacterId},
    infra::db::PostgresRepositories,
};
use sqlx::PgPool;
use time::macros::datetime;

fn vega() -> UpstreamCharacter {
    UpstreamCharacter {
        name: "Vega".to_string(),
        corporation_id: 98_000_001,
        race_id: 1,
        bloodline_id: 11,
        security_status: Some(-1.5),
    }
}

fn meta(tag: &str, expires_at: time::OffsetDateTime) -> CacheMetadata {
    CacheMetadata {
        entity_tag: Some(tag.to_string()),
        last_modified: None,
        expires_at: Some(expires_at),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a disposable Postgres server"]
async fn upsert_returns_joined_lookup_names(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let id = CharacterId::parse("95465499").expect("id");

    assert!(repo.find_character(id).await.expect("find").is_none());

    let stored = repo
        .upsert_character(id, &vega(), &meta("\"v1\"", datetime!(2025-10-01 13:00 UTC)))
        .await
        .expect("upsert");
    assert_eq!(stored.race_name.as_deref(), Some("Caldari"));
    assert_eq!(stored.bloodline_name.as_deref(), Some("Achura"));
    assert_eq!(
        stored.cache.expires_at,
        Some(datetime!(2025-10-01 13:00 UTC))
    );
    assert!(stored.matches(&vega()));

    let found = repo
        .find_character(id)
        .await
        .expect("find")
        .expect("present");
    assert_eq!(found.cache.entity_tag.as_deref(), Some("\"v1\""));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a disposable Postgres server"]
async fn replaying_an_upsert_keeps_one_row(pool: PgPool) {
    let repo = PostgresRepositories::new(pool.clone());
    let id = CharacterId::parse("95465499").expect("id");
    let expiry = meta("\"v1\"", datetime!(2025-10-01 13:00 UTC));

    repo.upsert_character(id, &vega(), &expiry)
        .await
        .expect("first");
    repo.upsert_character(id, &vega(), &expiry)
        .await
        .expect("second");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM characters")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(count, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a disposable Postgres server"]
async fn bump_touches_only_metadata(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let id = CharacterId::parse("95465499").expect("id");

    let missing = repo
        .bump_character_metadata(id, &meta("\"v1\"", datetime!(2025-10-01 13:00 UTC)))
        .await
        .expect_err("no row yet");
    assert!(matches!(missing, RepoError::NotFound));

    repo.upsert_character(id, &vega(), &meta("\"v1\"", datetime!(2025-10-01 13:00 UTC)))
        .await
        .expect("upsert");
    repo.bump_character_metadata(id, &meta("\"v2\"", datetime!(2025-10-01 15:00 UTC)))
        .await
        .expect("bump");

    let found = repo
        .find_character(id)
        .await
        .expect("find")
        .expect("present");
    assert_eq!(found.name, "Vega");
    assert_eq!(found.cache.entity_tag.as_deref(), Some("\"v2\""));
    assert_eq!(found.cache.expires_at, Some(datetime!(2025-10-01 15:00 UTC)));
}
