/// Embedder trait and shared types for text embedding.
pub mod download;
pub mod mock;
pub mod onnx;
pub mod tokenizer;

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::{EmbedderProvider, ModelConfig};

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// Prepend a task prefix (e.g. `search_query: `) when one is configured.
#[must_use]
pub fn with_prefix<'a>(prefix: &str, text: &'a str) -> Cow<'a, str> {
    if prefix.is_empty() {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("{prefix}{text}"))
    }
}

/// Resolve the directory holding the model files for `model`.
#[must_use]
pub fn model_dir(model: &ModelConfig) -> PathBuf {
    match &model.dir {
        Some(dir) => PathBuf::from(dir),
        None => download::default_model_dir(&model.name),
    }
}

/// Build the embedder selected by the model configuration.
///
/// For the ONNX provider this downloads any missing model files first, so it
/// performs blocking I/O and must not run on an async worker thread.
pub fn from_config(model: &ModelConfig) -> Result<Arc<dyn Embedder>, EmbedderError> {
    match model.provider {
        EmbedderProvider::Mock => {
            info!("Using mock embedder ({} dimensions)", model.dimensions);
            Ok(Arc::new(mock::MockEmbedder::from_config(model)))
        }
        EmbedderProvider::Onnx => {
            let dir = model_dir(model);
            download::download_model_files(&model.name, &dir)
                .map_err(|e| EmbedderError::ModelLoadFailed(format!("{e:#}")))?;
            let embedder = onnx::OnnxEmbedder::new(&dir, model.dimensions, model.max_length)?;
            Ok(Arc::new(embedder))
        }
    }
}
