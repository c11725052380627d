use crate::application::repos::RepoError;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) if db.message().contains("duplicate key") => {
            RepoError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db.message().contains("violates") || db.message().contains("invalid input syntax") =>
        {
            RepoError::invalid_input(db.message())
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        other => RepoError::from_persistence(other),
    }
}

/// Postgres has no unsigned integers; revisions are stored as `INTEGER`.
pub(crate) fn revision_to_db(number: u32) -> Result<i32, RepoError> {
    i32::try_from(number)
        .map_err(|_| RepoError::invalid_input(format!("revision {number} exceeds storable range")))
}
