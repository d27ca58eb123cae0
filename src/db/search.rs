use super::{Db, DbError, models::SearchHit, serialize_vector};
use rusqlite::params;
use tracing::debug;

/// Upper bound for both `limit` and `num_candidates`.
pub const MAX_RESULTS: usize = 10_000;

/// Largest `k` a `vec0` KNN query accepts.
pub const KNN_MAX_K: usize = 4096;

/// A vector search against a named index.
#[derive(Debug, Clone)]
pub struct VectorSearchQuery<'a> {
    pub index: &'a str,
    pub query_vector: &'a [f32],
    /// Number of results to return (k).
    pub limit: usize,
    /// Brute-force over every vector instead of the index's KNN lookup.
    pub exact: bool,
    /// Neighbours fetched before truncating to `limit`. Required when not exact.
    pub num_candidates: Option<usize>,
}

impl VectorSearchQuery<'_> {
    fn validate(&self) -> Result<(), DbError> {
        if self.limit == 0 || self.limit > MAX_RESULTS {
            return Err(DbError::InvalidQuery(format!(
                "limit must be between 1 and {MAX_RESULTS}, got {}",
                self.limit
            )));
        }
        if self.exact {
            return Ok(());
        }
        match self.num_candidates {
            None => Err(DbError::InvalidQuery(
                "num_candidates is required for approximate search".to_string(),
            )),
            Some(n) if n < self.limit || n > MAX_RESULTS => Err(DbError::InvalidQuery(format!(
                "num_candidates must be between limit ({}) and {MAX_RESULTS}, got {n}",
                self.limit
            ))),
            Some(_) => Ok(()),
        }
    }
}

impl Db {
    /// Run a vector search and return hits ordered by descending score.
    ///
    /// At most `limit` hits are returned. The query vector must have the
    /// dimensionality of the index.
    pub fn vector_search(&self, query: &VectorSearchQuery<'_>) -> Result<Vec<SearchHit>, DbError> {
        query.validate()?;

        let entry = self
            .find_search_index(query.index)?
            .ok_or_else(|| DbError::IndexNotFound(query.index.to_string()))?;
        let def = &entry.definition;

        if query.query_vector.len() != def.num_dimensions {
            return Err(DbError::DimensionMismatch {
                index: def.name.clone(),
                expected: def.num_dimensions,
                actual: query.query_vector.len(),
            });
        }

        let candidates = query.num_candidates.unwrap_or(query.limit);
        let exact = query.exact || candidates > KNN_MAX_K;
        if exact && !query.exact {
            debug!("{candidates} candidates exceed the KNN limit of {KNN_MAX_K}, scanning exactly");
        }

        let (sql, k) = if exact {
            (
                format!(
                    r#"
                    SELECT d.doc_id, d.text, {distance}(v.embedding, ?1) AS distance
                    FROM {vec_table} v
                    JOIN {collection} d ON d.id = v.rowid
                    ORDER BY distance ASC
                    LIMIT ?2
                    "#,
                    distance = def.similarity.distance_fn(),
                    vec_table = entry.vec_table,
                    collection = self.collection,
                ),
                query.limit,
            )
        } else {
            (
                format!(
                    r#"
                    WITH knn AS (
                        SELECT rowid, distance FROM {vec_table}
                        WHERE embedding MATCH ?1 AND k = ?2
                    )
                    SELECT d.doc_id, d.text, knn.distance
                    FROM knn
                    JOIN {collection} d ON d.id = knn.rowid
                    ORDER BY knn.distance ASC
                    "#,
                    vec_table = entry.vec_table,
                    collection = self.collection,
                ),
                candidates,
            )
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![serialize_vector(query.query_vector), k as i64],
            |row| {
                let distance: f64 = row.get(2)?;
                Ok(SearchHit {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    score: def.similarity.score(distance),
                })
            },
        )?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row?);
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(query.limit);
        Ok(hits)
    }
}
