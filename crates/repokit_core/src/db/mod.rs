//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the document store.
//! - Apply schema migrations in deterministic order.
//! - Create per-entity document tables on demand.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Entity table names are plain SQL identifiers; nothing else reaches DDL.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use thiserror::Error;

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

static TABLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid table name regex"));

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    #[error("invalid entity table name `{0}`")]
    InvalidTableName(String),
}

/// Returns whether `name` may be used as an entity table name.
pub fn is_valid_table_name(name: &str) -> bool {
    TABLE_NAME_RE.is_match(name)
}

/// Creates the document table backing one entity kind, if missing.
///
/// Layout: `id` primary key without type affinity (integer and text keys are
/// stored as given), `body` JSON text and a `version` counter for optimistic checks.
pub fn ensure_entity_table(conn: &Connection, kind: &str) -> DbResult<()> {
    if !is_valid_table_name(kind) {
        return Err(DbError::InvalidTableName(kind.to_string()));
    }

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{kind}\" (
            id BLOB NOT NULL PRIMARY KEY,
            body TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );"
    ))?;
    Ok(())
}
