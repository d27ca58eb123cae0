//! Vector search index definitions and their sqlite-vec backing tables.
//!
//! An index is a named `vec0` virtual table over a collection's `embedding`
//! field. Its definition (dimensions, similarity) is fixed at creation time and
//! recorded in `search_indexes` so queries can be checked against it.
use super::{Db, DbError};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

/// The only document field that holds vectors.
pub const VECTOR_FIELD: &str = "embedding";

/// Largest dimensionality accepted for an index.
pub const MAX_DIMENSIONS: usize = 8192;

/// Similarity metric of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Similarity {
    Cosine,
    /// Requires unit-length vectors; ranks identically to cosine.
    #[default]
    DotProduct,
    Euclidean,
}

impl Similarity {
    /// Distance metric of the `vec0` column.
    #[must_use]
    pub fn vec0_metric(self) -> &'static str {
        match self {
            Self::Cosine | Self::DotProduct => "cosine",
            Self::Euclidean => "l2",
        }
    }

    /// Scalar SQL function computing the same distance for exact search.
    #[must_use]
    pub fn distance_fn(self) -> &'static str {
        match self {
            Self::Cosine | Self::DotProduct => "vec_distance_cosine",
            Self::Euclidean => "vec_distance_l2",
        }
    }

    /// Normalize a raw distance into a score in `[0, 1]`, higher is closer.
    ///
    /// Cosine distance `d` is `1 - cos`, so `(1 + cos) / 2 = 1 - d / 2`.
    #[must_use]
    pub fn score(self, distance: f64) -> f64 {
        match self {
            Self::Cosine | Self::DotProduct => (1.0 - distance / 2.0).clamp(0.0, 1.0),
            Self::Euclidean => 1.0 / (1.0 + distance.max(0.0)),
        }
    }
}

/// Quantization recorded in the definition. Vectors are stored as f32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    None,
    #[default]
    Scalar,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorIndexDefinition {
    pub name: String,
    pub path: String,
    pub num_dimensions: usize,
    pub similarity: Similarity,
    pub quantization: Quantization,
}

impl VectorIndexDefinition {
    pub fn validate(&self) -> Result<(), DbError> {
        let valid_name = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid_name {
            return Err(DbError::InvalidIndex(format!(
                "name {:?} may only contain letters, digits, '-' and '_'",
                self.name
            )));
        }
        if self.path != VECTOR_FIELD {
            return Err(DbError::InvalidIndex(format!(
                "unknown vector field {:?} (expected {VECTOR_FIELD:?})",
                self.path
            )));
        }
        if self.num_dimensions == 0 || self.num_dimensions > MAX_DIMENSIONS {
            return Err(DbError::InvalidIndex(format!(
                "numDimensions must be between 1 and {MAX_DIMENSIONS}, got {}",
                self.num_dimensions
            )));
        }
        Ok(())
    }

    /// Name of the `vec0` table backing this index on `collection`.
    ///
    /// `_` is written as `__` and `-` as `_h`, with `_s` separating the two
    /// parts, so distinct (collection, name) pairs never share a table.
    #[must_use]
    pub fn vec_table(&self, collection: &str) -> String {
        format!("vec_{}_s{}", escape_ident(collection), escape_ident(&self.name))
    }

    /// The definition as a managed-search-index document, for infrastructure
    /// tooling that provisions the same index elsewhere.
    #[must_use]
    pub fn to_search_index_json(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "type": "vectorSearch",
            "definition": {
                "fields": [{
                    "type": "vector",
                    "path": self.path,
                    "numDimensions": self.num_dimensions,
                    "similarity": self.similarity,
                    "quantization": self.quantization,
                }]
            }
        })
    }
}

fn escape_ident(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '_' => out.push_str("__"),
            '-' => out.push_str("_h"),
            c => out.push(c),
        }
    }
    out
}

/// A registered index as stored in `search_indexes`.
#[derive(Debug)]
pub(crate) struct IndexEntry {
    pub vec_table: String,
    pub definition: VectorIndexDefinition,
}

impl Db {
    /// Create the index unless an identical one already exists.
    ///
    /// Returns `true` when the index was created. Vectors already stored in the
    /// collection are copied into the new index.
    pub fn ensure_search_index(&mut self, def: &VectorIndexDefinition) -> Result<bool, DbError> {
        def.validate()?;

        if let Some(existing) = self.find_search_index(&def.name)? {
            if existing.definition == *def {
                return Ok(false);
            }
            return Err(DbError::IndexConflict(def.name.clone()));
        }

        let vec_table = def.vec_table(&self.collection);
        let definition = serde_json::to_string(def)?;

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "CREATE VIRTUAL TABLE {vec_table} USING vec0(embedding float[{}] distance_metric={});",
            def.num_dimensions,
            def.similarity.vec0_metric()
        ))?;
        tx.execute(
            "INSERT INTO search_indexes (name, collection, vec_table, definition) VALUES (?, ?, ?, ?)",
            params![def.name, self.collection, vec_table, definition],
        )?;
        let backfilled = tx.execute(
            &format!(
                "INSERT INTO {vec_table} (rowid, embedding) SELECT id, embedding FROM {}",
                self.collection
            ),
            [],
        )?;
        tx.commit()?;

        info!(
            "Created search index {} on {}.{} ({} dims, {:?}); indexed {backfilled} existing documents",
            def.name, self.collection, def.path, def.num_dimensions, def.similarity
        );
        Ok(true)
    }

    /// Definitions of all indexes on this collection, ordered by name.
    pub fn list_search_indexes(&self) -> Result<Vec<VectorIndexDefinition>, DbError> {
        Ok(self
            .collection_indexes()?
            .into_iter()
            .map(|e| e.definition)
            .collect())
    }

    /// Look up an index of this collection by name.
    pub(crate) fn find_search_index(&self, name: &str) -> Result<Option<IndexEntry>, DbError> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT vec_table, definition FROM search_indexes WHERE collection = ? AND name = ?",
                params![self.collection, name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(vec_table, definition)| {
            Ok(IndexEntry {
                vec_table,
                definition: serde_json::from_str(&definition)?,
            })
        })
        .transpose()
    }

    pub(crate) fn collection_indexes(&self) -> Result<Vec<IndexEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT vec_table, definition FROM search_indexes WHERE collection = ? ORDER BY name",
        )?;
        let rows = stmt.query_map(params![self.collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (vec_table, definition) = row?;
            entries.push(IndexEntry {
                vec_table,
                definition: serde_json::from_str(&definition)?,
            });
        }
        Ok(entries)
    }
}
