/// BERT tokenizer wrapper around HuggingFace `tokenizers` crate.
///
/// Provides tokenization with attention masks for the ONNX embedder.
use std::path::Path;

use anyhow::Result;
use tokenizers::Tokenizer;

/// Wrapper around the HuggingFace tokenizer for BERT-style models.
pub struct BertTokenizer {
    inner: Tokenizer,
    max_length: usize,
}

/// Output of a tokenization operation.
#[derive(Debug, Clone)]
pub struct TokenizerOutput {
    /// Token IDs (input_ids for the model).
    pub input_ids: Vec<i64>,
    /// Attention mask (1 for real tokens, 0 for padding).
    pub attention_mask: Vec<i64>,
}

impl BertTokenizer {
    /// Load a tokenizer from a `tokenizer.json` file in the model directory.
    ///
    /// Inputs longer than `max_length` tokens are truncated; batches are
    /// padded to their longest member.
    pub fn from_model_dir(model_dir: &Path, max_length: usize) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {}",
            model_dir.display()
        );
        anyhow::ensure!(max_length > 0, "max_length must be positive");

        let mut inner = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        inner
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to configure truncation: {e}"))?;

        inner.with_padding(Some(tokenizers::PaddingParams {
            ..Default::default()
        }));

        Ok(Self { inner, max_length })
    }

    /// Tokenize a single text, returning input IDs and attention mask.
    pub fn tokenize(&self, text: &str) -> Result<TokenizerOutput> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("failed to encode text: {e}"))?;

        Ok(to_output(&encoding))
    }

    /// Tokenize multiple texts in a batch. All outputs share one length.
    pub fn tokenize_batch(&self, texts: &[&str]) -> Result<Vec<TokenizerOutput>> {
        let encodings = self
            .inner
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("failed to encode batch: {e}"))?;

        Ok(encodings.iter().map(to_output).collect())
    }

    /// Get the vocabulary size.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }

    /// Get the configured maximum sequence length.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

fn to_output(encoding: &tokenizers::Encoding) -> TokenizerOutput {
    TokenizerOutput {
        input_ids: encoding.get_ids().iter().map(|&id| i64::from(id)).collect(),
        attention_mask: encoding
            .get_attention_mask()
            .iter()
            .map(|&m| i64::from(m))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::download::default_model_dir;

    /// Requires the real tokenizer.json.
    /// Run with: cargo test tokenizer -- --ignored
    #[test]
    #[ignore]
    fn test_tokenize_with_real_model() {
        let model_dir = default_model_dir("nomic-ai/nomic-embed-text-v1");
        if !model_dir.join("tokenizer.json").exists() {
            eprintln!("Skipping: model files not downloaded");
            return;
        }

        let tokenizer = BertTokenizer::from_model_dir(&model_dir, 512).unwrap();
        let output = tokenizer.tokenize("Hello, world!").unwrap();

        assert!(!output.input_ids.is_empty());
        assert_eq!(output.input_ids.len(), output.attention_mask.len());
        // CLS and SEP
        assert!(output.input_ids.len() >= 3);
    }

    #[test]
    #[ignore]
    fn test_tokenize_batch_pads_to_longest() {
        let model_dir = default_model_dir("nomic-ai/nomic-embed-text-v1");
        if !model_dir.join("tokenizer.json").exists() {
            return;
        }

        let tokenizer = BertTokenizer::from_model_dir(&model_dir, 512).unwrap();
        let outputs = tokenizer
            .tokenize_batch(&["Brazil", "The statue stands on Corcovado mountain"])
            .unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].input_ids.len(), outputs[1].input_ids.len());
        assert!(outputs[0].attention_mask.contains(&0));
    }

    #[test]
    fn test_tokenizer_missing_file() {
        let result = BertTokenizer::from_model_dir(Path::new("/nonexistent/path"), 512);
        assert!(result.is_err());
    }
}
