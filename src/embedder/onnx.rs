/// ONNX Runtime embedder using the `ort` crate.
///
/// Loads a sentence-embedding ONNX model (nomic-embed-text-v1 by default), runs
/// inference, applies mean pooling with the attention mask, and L2-normalizes
/// the result so that dot product and cosine similarity coincide.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::tokenizer::{BertTokenizer, TokenizerOutput};
use super::{Embedder, EmbedderError};

/// ONNX-backed embedder implementing the `Embedder` trait.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: BertTokenizer,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Create a new `OnnxEmbedder` by loading a model from the given directory.
    ///
    /// Expects `model.onnx` and `tokenizer.json` in `model_dir`. `dimensions`
    /// must equal the hidden size of the model.
    pub fn new(
        model_dir: &Path,
        dimensions: usize,
        max_length: usize,
    ) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        info!("Initializing ONNX Runtime...");

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .with_inter_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        info!("ONNX model loaded from {}", model_path.display());

        let tokenizer = BertTokenizer::from_model_dir(model_dir, max_length)
            .map_err(|e| EmbedderError::TokenizerError(format!("{e:#}")))?;

        info!(
            "Tokenizer loaded (vocab size: {}, max length: {})",
            tokenizer.vocab_size(),
            tokenizer.max_length()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
        })
    }

    /// Run the model over a batch of equally padded token sequences.
    fn infer(&self, batch: &[TokenizerOutput]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let Some(first) = batch.first() else {
            return Ok(Vec::new());
        };
        let batch_size = batch.len();
        let seq_len = first.input_ids.len();
        if batch.iter().any(|t| t.input_ids.len() != seq_len) {
            return Err(EmbedderError::TokenizerError(
                "batch sequences are not padded to a common length".to_string(),
            ));
        }
        debug!("Running inference on {batch_size} sequence(s) of {seq_len} tokens");

        let input_ids: Vec<i64> = batch.iter().flat_map(|t| t.input_ids.iter().copied()).collect();
        let attention_mask: Vec<i64> = batch
            .iter()
            .flat_map(|t| t.attention_mask.iter().copied())
            .collect();

        // (shape, data) tuples keep ndarray out of the dependency graph
        let input_ids_val = Tensor::from_array(([batch_size, seq_len], input_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask_val = Tensor::from_array(([batch_size, seq_len], attention_mask))
            .map_err(|e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")))?;
        let token_type_ids_val =
            Tensor::from_array(([batch_size, seq_len], vec![0i64; batch_size * seq_len]))
                .map_err(|e| {
                    EmbedderError::InferenceFailed(format!("token_type_ids error: {e}"))
                })?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_val,
                "attention_mask" => attention_mask_val,
                "token_type_ids" => token_type_ids_val,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        // Output shape: [batch_size, seq_len, hidden_size]
        let (_shape, hidden_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        let per_sequence = seq_len * self.dimensions;
        if hidden_data.len() != batch_size * per_sequence {
            return Err(EmbedderError::InferenceFailed(format!(
                "unexpected output size {} (expected {batch_size} x {seq_len} x {})",
                hidden_data.len(),
                self.dimensions
            )));
        }

        Ok(batch
            .iter()
            .zip(hidden_data.chunks_exact(per_sequence))
            .map(|(tokens, hidden)| {
                let pooled = mean_pooling(hidden, &tokens.attention_mask, seq_len, self.dimensions);
                l2_normalize(&pooled)
            })
            .collect())
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let tokens = self
            .tokenizer
            .tokenize(text)
            .map_err(|e| EmbedderError::TokenizerError(format!("tokenization failed: {e}")))?;

        self.infer(std::slice::from_ref(&tokens))?
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("model returned no embedding".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let tokens = self
            .tokenizer
            .tokenize_batch(texts)
            .map_err(|e| EmbedderError::TokenizerError(format!("tokenization failed: {e}")))?;

        self.infer(&tokens)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Mean pooling over hidden states weighted by attention mask.
///
/// `hidden_data` is one sequence's flat hidden states, `[seq_len, hidden_size]`.
fn mean_pooling(
    hidden_data: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut result = vec![0.0f32; hidden_size];
    let mut mask_sum: f32 = 0.0;

    for t in 0..seq_len {
        let mask = attention_mask[t] as f32;
        mask_sum += mask;

        let row = &hidden_data[t * hidden_size..(t + 1) * hidden_size];
        for (acc, v) in result.iter_mut().zip(row) {
            *acc += v * mask;
        }
    }

    if mask_sum > 0.0 {
        for v in &mut result {
            *v /= mask_sum;
        }
    }

    result
}

/// L2-normalize a vector, returning the normalized copy.
fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq == 0.0 {
        return vec.to_vec();
    }

    let inv_norm = 1.0 / norm_sq.sqrt();
    vec.iter().map(|v| v * inv_norm).collect()
}
