use std::fmt::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Serialization error")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid recurrence rule: {0}")]
    InvalidRRule(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Whether retrying the same work on a later tick may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::Transient(_) | CoreError::Io(_) => true,
            CoreError::Database(err) => is_transient_sqlx(err),
            _ => false,
        }
    }

    /// The message followed by every underlying cause, with the SQLite result
    /// code for database errors, e.g.
    /// `Database error (code 517): error returned from database: database is locked`.
    pub fn full_message(&self) -> String {
        let mut message = self.to_string();
        if let CoreError::Database(sqlx::Error::Database(db)) = self {
            if let Some(code) = db.code() {
                let _ = write!(message, " (code {code})");
            }
        }
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let _ = write!(message, ": {cause}");
            source = cause.source();
        }
        message
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            // SQLITE_BUSY and SQLITE_LOCKED, including extended codes
            .map(|code| matches!(code & 0xff, 5 | 6))
            .unwrap_or(false),
        _ => false,
    }
}
