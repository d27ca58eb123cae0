//! Sample data ingestion: embed `{ "_id", "text" }` entries from a JSON file
//! and insert them into the collection in batches.
use crate::db::Db;
use crate::db::models::{Document, ModelInfo};
use crate::embedder::{Embedder, with_prefix};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, warn};

/// One entry of the sample data file.
#[derive(Debug, Clone, Deserialize)]
pub struct SampleEntry {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub inserted: usize,
    /// Already in the collection, or repeated within the input.
    pub skipped_existing: usize,
    /// Missing `_id` or `text`.
    pub skipped_invalid: usize,
    pub failed: usize,
}

/// Read the sample data file (a JSON array of entries).
pub fn load_entries(path: &Path) -> Result<Vec<SampleEntry>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("invalid sample data in {}", path.display()))
}

struct Pending {
    id: String,
    text: String,
}

pub struct Ingestor<'a> {
    pub db: Arc<TokioMutex<Db>>,
    pub embedder: Arc<dyn Embedder>,
    pub model_name: &'a str,
    pub document_prefix: &'a str,
    pub batch_size: usize,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        embedder: Arc<dyn Embedder>,
        model_name: &'a str,
        batch_size: usize,
    ) -> Self {
        Self {
            db,
            embedder,
            model_name,
            document_prefix: "",
            batch_size: batch_size.max(1),
        }
    }

    /// Prefix prepended to each document text before embedding.
    #[must_use]
    pub fn with_document_prefix(mut self, prefix: &'a str) -> Self {
        self.document_prefix = prefix;
        self
    }

    /// Load `path` and ingest its entries.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let entries = load_entries(path)?;
        info!("Loading {} sample entries from {}", entries.len(), path.display());
        self.ingest_entries(&entries).await
    }

    /// Embed and insert entries one batch at a time. A failing batch is
    /// logged and counted, and ingestion moves on to the next one.
    pub async fn ingest_entries(&self, entries: &[SampleEntry]) -> Result<IngestReport> {
        let model = ModelInfo::now(self.model_name);
        let mut report = IngestReport::default();
        let mut seen = HashSet::new();
        let mut buffer: Vec<Pending> = Vec::with_capacity(self.batch_size);

        for entry in entries {
            let (Some(id), Some(text)) = (&entry.id, &entry.text) else {
                report.skipped_invalid += 1;
                continue;
            };

            if !seen.insert(id.as_str()) {
                report.skipped_existing += 1;
                continue;
            }

            let exists = {
                let db = self.db.lock().await;
                db.contains_document(id)?
            };
            if exists {
                debug!("Skipping existing document {id}");
                report.skipped_existing += 1;
                continue;
            }

            buffer.push(Pending {
                id: id.clone(),
                text: text.clone(),
            });

            if buffer.len() == self.batch_size {
                self.flush(&mut buffer, &model, &mut report).await;
            }
        }

        if !buffer.is_empty() {
            self.flush(&mut buffer, &model, &mut report).await;
        }

        info!(
            "Ingestion finished: {} inserted, {} existing, {} invalid, {} failed",
            report.inserted, report.skipped_existing, report.skipped_invalid, report.failed
        );
        Ok(report)
    }

    async fn flush(&self, buffer: &mut Vec<Pending>, model: &ModelInfo, report: &mut IngestReport) {
        let batch = std::mem::take(buffer);

        let embeddings = match self.embed_batch(&batch).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to embed batch of {} documents: {e:#}", batch.len());
                report.failed += batch.len();
                return;
            }
        };

        let docs: Vec<Document<'_>> = batch
            .iter()
            .zip(&embeddings)
            .map(|(p, embedding)| Document {
                id: &p.id,
                text: &p.text,
                embedding: embedding.as_slice(),
            })
            .collect();

        let result = {
            let mut db = self.db.lock().await;
            db.insert_documents(&docs, model)
        };

        match result {
            Ok(n) => {
                debug!("Inserted batch of {n} documents");
                report.inserted += n;
            }
            Err(e) => {
                warn!("Failed to insert batch of {} documents: {e}", docs.len());
                report.failed += docs.len();
            }
        }
    }

    /// Model inference runs on the blocking pool.
    async fn embed_batch(&self, batch: &[Pending]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = batch
            .iter()
            .map(|p| with_prefix(self.document_prefix, &p.text).into_owned())
            .collect();
        let embedder = self.embedder.clone();

        let embeddings = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            embedder.embed_batch(&refs)
        })
        .await
        .context("embedding task panicked")??;

        anyhow::ensure!(
            embeddings.len() == batch.len(),
            "embedder returned {} vectors for {} documents",
            embeddings.len(),
            batch.len()
        );
        Ok(embeddings)
    }
}
