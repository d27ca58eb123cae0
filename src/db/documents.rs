use super::{Db, DbError, models::*, serialize_vector};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

impl Db {
    /// Inserts documents into the collection and every index on it.
    ///
    /// Documents whose id is already present are left untouched. The batch
    /// is written in one transaction; returns the number of new documents.
    pub fn insert_documents(
        &mut self,
        docs: &[Document<'_>],
        model: &ModelInfo,
    ) -> Result<usize, DbError> {
        let indexes = self.collection_indexes()?;

        for doc in docs {
            for entry in &indexes {
                let expected = entry.definition.num_dimensions;
                if doc.embedding.len() != expected {
                    return Err(DbError::DimensionMismatch {
                        index: entry.definition.name.clone(),
                        expected,
                        actual: doc.embedding.len(),
                    });
                }
            }
        }

        let insert_sql = format!(
            "INSERT OR IGNORE INTO {} (doc_id, text, embedding, model_name, model_created_at) VALUES (?, ?, ?, ?, ?)",
            self.collection
        );

        let tx = self.conn.transaction()?;
        let mut inserted = 0;

        for doc in docs {
            let vector_blob = serialize_vector(doc.embedding);
            let changed = tx.execute(
                &insert_sql,
                params![
                    doc.id,
                    doc.text,
                    vector_blob,
                    model.name,
                    model.created_timestamp
                ],
            )?;
            if changed == 0 {
                continue;
            }
            inserted += 1;

            let rowid = tx.last_insert_rowid();
            for entry in &indexes {
                tx.execute(
                    &format!(
                        "INSERT INTO {} (rowid, embedding) VALUES (?, ?)",
                        entry.vec_table
                    ),
                    params![rowid, vector_blob],
                )?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Whether a document with this id exists in the collection.
    pub fn contains_document(&self, id: &str) -> Result<bool, DbError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE doc_id = ?", self.collection),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Number of documents in the collection.
    pub fn count_documents(&self) -> Result<usize, DbError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT count(*) FROM {}", self.collection),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn get_document(&self, id: &str) -> Result<Option<StoredDocument>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT doc_id, text, model_name, model_created_at FROM {} WHERE doc_id = ?",
                    self.collection
                ),
                params![id],
                |row| {
                    let name: Option<String> = row.get(2)?;
                    let created: Option<DateTime<Utc>> = row.get(3)?;
                    Ok(StoredDocument {
                        id: row.get(0)?,
                        text: row.get(1)?,
                        model_info: name.zip(created).map(|(name, created_timestamp)| ModelInfo {
                            name,
                            created_timestamp,
                        }),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}
