use thiserror::Error;

use crate::language::Language;
use crate::model::Destination;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while opening the database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has locked the database file
    #[error("Another instance of feedrelay appears to be using the database. Please stop it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface as
/// these messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

/// Errors raised by [`super::Store`] operations.
///
/// The delivery engine treats any of these as a failure of the single
/// destination being processed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[from] sqlx::Error),

    /// A persisted row could not be mapped back into a domain value
    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for destination queries
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DestinationRow {
    pub guild_id: String,
    pub language: String,
    pub channel_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DestinationRow {
    pub(crate) fn into_destination(self) -> StoreResult<Destination> {
        let language: Language = self.language.parse().map_err(|e| StoreError::CorruptRow {
            table: "destinations",
            reason: format!("{e}"),
        })?;
        Ok(Destination {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            language,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Maps rows, skipping (and logging) any that fail to convert.
///
/// One unreadable row must not hide every other destination from delivery.
pub(crate) fn collect_destinations(rows: Vec<DestinationRow>) -> Vec<Destination> {
    rows.into_iter()
        .filter_map(|row| {
            let guild_id = row.guild_id.clone();
            match row.into_destination() {
                Ok(dest) => Some(dest),
                Err(e) => {
                    tracing::warn!(guild_id = %guild_id, error = %e, "Skipping unreadable destination row");
                    None
                }
            }
        })
        .collect()
}
