use crate::application::repos::RepoError;

/// Classify a driver error by SQLSTATE where Postgres supplied one.
pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            match db.code().as_deref() {
                // foreign_key_violation, invalid_text_representation, numeric_value_out_of_range
                Some("23503" | "22P02" | "22003") => RepoError::InvalidInput { message },
                Some(code) if code.starts_with("23") => RepoError::Integrity { message },
                // query_canceled (statement_timeout)
                Some("57014") => RepoError::Timeout,
                _ => RepoError::Persistence(message),
            }
        }
        other => RepoError::from_persistence(other),
    }
}
