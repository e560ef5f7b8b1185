//! Database errors

use thiserror::Error;

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),

    /// Record not found
    #[error("record not found")]
    NotFound,

    /// Unique constraint violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// Row is still referenced by a foreign key
    #[error("still referenced: {0}")]
    Referenced(String),

    /// Stored value could not be mapped to a domain type
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl DbError {
    /// Check if this is a unique constraint violation
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Check if this is a foreign key violation
    pub fn is_referenced(&self) -> bool {
        matches!(self, Self::Referenced(_))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(db.constraint().unwrap_or("unique").to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                Self::Referenced(db.constraint().unwrap_or("foreign key").to_string())
            }
            _ => Self::Sqlx(err),
        }
    }
}

impl From<mess_types::MessTypeError> for DbError {
    fn from(err: mess_types::MessTypeError) -> Self {
        Self::Corrupt(err.to_string())
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
