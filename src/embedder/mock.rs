/// Offline embedder for tests and `provider = "mock"`.
///
/// Hashes each lowercased word of the text into a signed bucket (feature
/// hashing), so texts sharing words land close together and identical texts
/// map to identical vectors. No model files are needed.
use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbedderError};
use crate::config::ModelConfig;

pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Same dimensionality as the configured model, so a mock-backed index
    /// is interchangeable with the real one.
    #[must_use]
    pub fn from_config(model: &ModelConfig) -> Self {
        Self::new(model.dimensions)
    }

    fn add_feature(&self, embedding: &mut [f32], feature: &str) {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        let hash = hasher.finish();

        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        embedding[bucket] += sign;
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::from_config(&ModelConfig::default())
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut embedding = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut words = 0;
        for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            self.add_feature(&mut embedding, word);
            words += 1;
        }
        // Punctuation-only or empty text still needs a direction.
        if words == 0 {
            self.add_feature(&mut embedding, text);
        }

        let norm = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        } else {
            // Opposite-signed words cancelled out.
            embedding[0] = 1.0;
        }

        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
