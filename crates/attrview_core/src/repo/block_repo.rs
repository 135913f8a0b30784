//! Block lookup and block attribute storage.
//!
//! # Responsibility
//! - Resolve document blocks referenced by attribute view rows.
//! - Read and replace the named string attributes attached to a block.
//!
//! # Invariants
//! - `set_block_attributes` replaces the whole attribute map atomically.
//! - Attribute calls on unknown blocks return `NotFound`.

use crate::db::{ensure_schema_ready, DbError, TableRequirement};
use crate::model::attribute_view::new_id;
use crate::model::block::{Block, BlockKind};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

const REQUIRED_TABLES: &[TableRequirement] = &[
    TableRequirement {
        table: "blocks",
        columns: &["id", "parent_id", "kind", "content"],
    },
    TableRequirement {
        table: "block_attributes",
        columns: &["block_id", "name", "value"],
    },
];

/// Named string attributes of one block, ordered by name.
pub type BlockAttributes = BTreeMap<String, String>;

pub type BlockRepoResult<T> = Result<T, BlockRepoError>;

#[derive(Debug)]
pub enum BlockRepoError {
    Db(DbError),
    NotFound(String),
    InvalidData(String),
}

impl Display for BlockRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "block not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted block data: {message}"),
        }
    }
}

impl Error for BlockRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for BlockRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for BlockRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Block access needed by attribute views.
pub trait BlockRepository {
    fn resolve_block(&self, block_id: &str) -> BlockRepoResult<Option<Block>>;
    fn get_block_attributes(&self, block_id: &str) -> BlockRepoResult<BlockAttributes>;
    fn set_block_attributes(&self, block_id: &str, attrs: &BlockAttributes)
        -> BlockRepoResult<()>;
}

/// SQLite-backed block repository.
pub struct SqliteBlockRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBlockRepository<'conn> {
    /// Creates a repository after verifying the connection schema.
    pub fn try_new(conn: &'conn Connection) -> BlockRepoResult<Self> {
        ensure_schema_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }

    /// Creates a block with a generated ID.
    pub fn create_block(
        &self,
        parent_id: Option<&str>,
        kind: BlockKind,
        content: &str,
    ) -> BlockRepoResult<Block> {
        let block = Block {
            id: new_id(),
            parent_id: parent_id.map(str::to_string),
            kind,
            content: content.to_string(),
        };
        self.insert_block(&block)?;
        Ok(block)
    }

    /// Inserts a block with a caller-chosen ID.
    pub fn insert_block(&self, block: &Block) -> BlockRepoResult<()> {
        self.conn.execute(
            "INSERT INTO blocks (id, parent_id, kind, content) VALUES (?1, ?2, ?3, ?4);",
            params![
                block.id.as_str(),
                block.parent_id.as_deref(),
                block.kind.as_str(),
                block.content.as_str(),
            ],
        )?;
        Ok(())
    }

    fn block_exists(conn: &Connection, block_id: &str) -> BlockRepoResult<bool> {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM blocks WHERE id = ?1);",
            [block_id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

impl BlockRepository for SqliteBlockRepository<'_> {
    fn resolve_block(&self, block_id: &str) -> BlockRepoResult<Option<Block>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, parent_id, kind, content FROM blocks WHERE id = ?1;",
                [block_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, parent_id, kind, content)) = row else {
            return Ok(None);
        };
        let kind = kind
            .parse::<BlockKind>()
            .map_err(BlockRepoError::InvalidData)?;
        Ok(Some(Block {
            id,
            parent_id,
            kind,
            content,
        }))
    }

    fn get_block_attributes(&self, block_id: &str) -> BlockRepoResult<BlockAttributes> {
        if !Self::block_exists(self.conn, block_id)? {
            return Err(BlockRepoError::NotFound(block_id.to_string()));
        }

        let mut stmt = self
            .conn
            .prepare("SELECT name, value FROM block_attributes WHERE block_id = ?1;")?;
        let attrs = stmt
            .query_map([block_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<BlockAttributes, _>>()?;
        Ok(attrs)
    }

    fn set_block_attributes(
        &self,
        block_id: &str,
        attrs: &BlockAttributes,
    ) -> BlockRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !Self::block_exists(&tx, block_id)? {
            return Err(BlockRepoError::NotFound(block_id.to_string()));
        }

        tx.execute(
            "DELETE FROM block_attributes WHERE block_id = ?1;",
            [block_id],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO block_attributes (block_id, name, value) VALUES (?1, ?2, ?3);",
            )?;
            for (name, value) in attrs {
                insert.execute(params![block_id, name, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
