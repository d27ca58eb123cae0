//! Vector database module using SQLite and sqlite-vec
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;
use thiserror::Error;
use tracing::info;

pub mod documents;
pub mod index;
pub mod models;
pub mod search;

/// Registry of vector search indexes. Document tables are created per
/// collection in [`Db::open`].
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS search_indexes (
    collection TEXT NOT NULL,
    name TEXT NOT NULL,
    vec_table TEXT NOT NULL UNIQUE,
    definition TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (collection, name)
);
"#;

fn collection_sql(collection: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {collection} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    doc_id TEXT NOT NULL UNIQUE,
    text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    model_name TEXT,
    model_created_at DATETIME
);
"#
    )
}

/// Errors returned by database operations.
#[derive(Error, Debug)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored index definition is unreadable: {0}")]
    Definition(#[from] serde_json::Error),

    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),

    #[error("invalid index definition: {0}")]
    InvalidIndex(String),

    #[error("search index not found: {0}")]
    IndexNotFound(String),

    #[error("search index {0} already exists with a different definition")]
    IndexConflict(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("vector has {actual} dimensions but index {index} expects {expected}")]
    DimensionMismatch {
        index: String,
        expected: usize,
        actual: usize,
    },
}

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// `[A-Za-z_][A-Za-z0-9_]*`, safe to splice into SQL as a table name.
#[must_use]
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A SQLite connection bound to one document collection, with sqlite-vec
/// loaded and the schema initialized.
pub struct Db {
    pub(crate) conn: Connection,
    pub(crate) collection: String,
}

impl Db {
    /// Open a database at the given path and initialize the schema for `collection`.
    pub fn open<P: AsRef<Path>>(path: P, collection: &str) -> Result<Self, DbError> {
        let path = path.as_ref();
        info!("Initializing database: {}", path.display());

        init_sqlite_vec();
        let conn = Connection::open(path)?;
        Self::init(conn, collection)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory(collection: &str) -> Result<Self, DbError> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::init(conn, collection)
    }

    fn init(conn: Connection, collection: &str) -> Result<Self, DbError> {
        if !is_identifier(collection) {
            return Err(DbError::InvalidCollection(collection.to_string()));
        }

        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);

        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute_batch(&collection_sql(collection))?;

        info!("Database initialized (collection: {collection})");

        Ok(Self {
            conn,
            collection: collection.to_string(),
        })
    }

    /// Name of the collection this handle reads and writes.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

/// Helper to serialize a float32 vector into bytes for vec0 virtual tables
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}
