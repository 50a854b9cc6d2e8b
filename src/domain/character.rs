use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{cache_meta::CacheMetadata, key::CharacterId};

/// Public character sheet as ESI returns it (`GET /characters/{id}/`).
///
/// Only the fields this service persists are decoded; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamCharacter {
    pub name: String,
    pub corporation_id: i64,
    pub race_id: i32,
    pub bloodline_id: i32,
    #[serde(default)]
    pub security_status: Option<f64>,
}

/// Persisted character row, joined with the race and bloodline lookup names.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterRecord {
    pub id: CharacterId,
    pub name: String,
    pub corporation_id: i64,
    pub race_id: i32,
    pub bloodline_id: i32,
    pub security_status: Option<f64>,
    pub race_name: Option<String>,
    pub bloodline_name: Option<String>,
    pub cache: CacheMetadata,
    pub updated_at: OffsetDateTime,
}

impl CharacterRecord {
    /// True when the substantive columns match an upstream payload.
    pub fn matches(&self, payload: &UpstreamCharacter) -> bool {
        self.name == payload.name
            && self.corporation_id == payload.corporation_id
            && self.race_id == payload.race_id
            && self.bloodline_id == payload.bloodline_id
            && self.security_status == payload.security_status
    }
}
