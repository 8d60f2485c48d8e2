use thiserror::Error;

/// Errors surfaced by the database layer.
///
/// Uniqueness violations are reported as [`DbError::Duplicate`] so callers
/// can treat "already there" differently from a real failure.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error("DB lock poisoned: {0}")]
    LockPoisoned(String),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }

    /// Classify an insert failure, turning unique/primary-key violations into `Duplicate`.
    pub(crate) fn from_insert(err: rusqlite::Error, what: &str) -> Self {
        use rusqlite::ffi;

        if let rusqlite::Error::SqliteFailure(ref e, _) = err {
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
            {
                return Self::Duplicate(what.to_string());
            }
        }
        Self::Sqlite(err)
    }
}
