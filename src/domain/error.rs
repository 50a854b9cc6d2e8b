use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{entity} key `{raw}` is malformed: {reason}")]
    MalformedKey {
        entity: &'static str,
        raw: String,
        reason: &'static str,
    },
    #[error("{entity} `{key}` does not exist")]
    UnknownKey { entity: &'static str, key: String },
}

impl DomainError {
    pub fn malformed_key(entity: &'static str, raw: impl Into<String>, reason: &'static str) -> Self {
        Self::MalformedKey {
            entity,
            raw: raw.into(),
            reason,
        }
    }

    pub fn unknown_key(entity: &'static str, key: impl ToString) -> Self {
        Self::UnknownKey {
            entity,
            key: key.to_string(),
        }
    }
}
