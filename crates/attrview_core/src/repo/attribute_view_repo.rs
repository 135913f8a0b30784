//! Attribute view store contract and SQLite implementation.
//!
//! # Responsibility
//! - Load and save whole attribute views by ID.
//! - Detect lost updates through the per-view revision counter.
//!
//! # Invariants
//! - Write paths call `AttributeView::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - A save succeeds only when the stored revision equals `av.revision`;
//!   the stored and in-memory revision are then bumped by one.
//!
//! # See also
//! - docs/architecture/attribute-view.md

use crate::db::{ensure_schema_ready, DbError, TableRequirement};
use crate::model::attribute_view::{AttributeView, AttributeViewError};
use log::warn;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

const REQUIRED_TABLES: &[TableRequirement] = &[TableRequirement {
    table: "attribute_views",
    columns: &["id", "revision", "payload", "created_at", "updated_at"],
}];

pub type AvRepoResult<T> = Result<T, AvRepoError>;

/// Attribute view persistence error.
#[derive(Debug)]
pub enum AvRepoError {
    Db(DbError),
    NotFound(String),
    /// View violates a structural invariant.
    Validation(AttributeViewError),
    /// Stored revision moved since the view was loaded.
    RevisionConflict {
        av_id: String,
        expected: u64,
        actual: u64,
    },
    Serialization(serde_json::Error),
    /// Persisted data cannot be converted to a valid attribute view.
    InvalidData(String),
}

impl Display for AvRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "attribute view not found: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::RevisionConflict {
                av_id,
                expected,
                actual,
            } => write!(
                f,
                "attribute view {av_id} changed concurrently: expected revision {expected}, found {actual}"
            ),
            Self::Serialization(err) => write!(f, "attribute view serialization failed: {err}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted attribute view data: {message}")
            }
        }
    }
}

impl Error for AvRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::NotFound(_) | Self::RevisionConflict { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for AvRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for AvRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<AttributeViewError> for AvRepoError {
    fn from(value: AttributeViewError) -> Self {
        Self::Validation(value)
    }
}

impl From<serde_json::Error> for AvRepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Whole-document attribute view storage.
pub trait AttributeViewStore {
    /// Loads one view; `NotFound` when it was never saved.
    fn load(&self, av_id: &str) -> AvRepoResult<AttributeView>;
    /// Saves one view and bumps `av.revision` on success.
    fn save(&self, av: &mut AttributeView) -> AvRepoResult<()>;
}

/// SQLite-backed attribute view store.
pub struct SqliteAttributeViewStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAttributeViewStore<'conn> {
    /// Creates a store after verifying the connection schema.
    pub fn try_new(conn: &'conn Connection) -> AvRepoResult<Self> {
        ensure_schema_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }

    /// Lists stored view IDs in ascending order.
    pub fn list_ids(&self) -> AvRepoResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM attribute_views ORDER BY id ASC;")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

impl AttributeViewStore for SqliteAttributeViewStore<'_> {
    fn load(&self, av_id: &str) -> AvRepoResult<AttributeView> {
        let stored = self
            .conn
            .query_row(
                "SELECT revision, payload FROM attribute_views WHERE id = ?1;",
                [av_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        let Some((revision, payload)) = stored else {
            return Err(AvRepoError::NotFound(av_id.to_string()));
        };

        let mut av: AttributeView = serde_json::from_str(&payload)
            .map_err(|err| AvRepoError::InvalidData(format!("view {av_id}: {err}")))?;
        if av.id != av_id {
            return Err(AvRepoError::InvalidData(format!(
                "view {av_id} stores payload for `{}`",
                av.id
            )));
        }
        av.revision = revision_from_db(revision)?;
        av.validate()?;
        Ok(av)
    }

    fn save(&self, av: &mut AttributeView) -> AvRepoResult<()> {
        av.validate()?;

        let expected = av.revision;
        let next = expected + 1;
        let mut document = serde_json::to_value(&*av)?;
        document["revision"] = next.into();
        let payload = serde_json::to_string(&document)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let stored = tx
            .query_row(
                "SELECT revision FROM attribute_views WHERE id = ?1;",
                [av.id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        let actual = stored.map(revision_from_db).transpose()?;

        match actual {
            None if expected == 0 => {
                tx.execute(
                    "INSERT INTO attribute_views (id, revision, payload) VALUES (?1, ?2, ?3);",
                    params![av.id.as_str(), revision_to_db(next)?, payload],
                )?;
            }
            Some(actual) if actual == expected => {
                tx.execute(
                    "UPDATE attribute_views
                     SET revision = ?2,
                         payload = ?3,
                         updated_at = (strftime('%s', 'now') * 1000)
                     WHERE id = ?1;",
                    params![av.id.as_str(), revision_to_db(next)?, payload],
                )?;
            }
            actual => {
                let actual = actual.unwrap_or(0);
                warn!(
                    "event=av_save module=repo status=conflict av_id={} expected_revision={} actual_revision={}",
                    av.id, expected, actual
                );
                return Err(AvRepoError::RevisionConflict {
                    av_id: av.id.clone(),
                    expected,
                    actual,
                });
            }
        }
        tx.commit()?;

        av.revision = next;
        Ok(())
    }
}

fn revision_from_db(value: i64) -> AvRepoResult<u64> {
    u64::try_from(value)
        .map_err(|_| AvRepoError::InvalidData(format!("negative revision {value}")))
}

fn revision_to_db(value: u64) -> AvRepoResult<i64> {
    i64::try_from(value)
        .map_err(|_| AvRepoError::InvalidData(format!("revision {value} overflows storage")))
}
