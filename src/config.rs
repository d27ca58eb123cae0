/// Configuration module for vectorsearch.
///
/// Handles loading, environment overrides, validation, and default values.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::index::{Quantization, Similarity, VectorIndexDefinition};
use crate::db::is_identifier;
use crate::db::search::MAX_RESULTS;

/// Environment variable holding the database location.
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
/// Environment variable holding the HTTP port.
pub const ENV_APP_PORT: &str = "APP_PORT";
/// Environment variable overriding the collection name.
pub const ENV_COLLECTION: &str = "VECTOR_COLLECTION";
/// Environment variable overriding the model directory.
pub const ENV_MODEL_DIR: &str = "MODEL_DIR";

const DEFAULT_CONFIG_PATH: &str = "config.json";

// ── Default value functions ──────────────────────────────────────────

fn default_database_url() -> String {
    "./vectors.db".to_string()
}

fn default_collection() -> String {
    "facts".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_model_name() -> String {
    "nomic-ai/nomic-embed-text-v1".to_string()
}

fn default_dimensions() -> usize {
    768
}

fn default_max_length() -> usize {
    512
}

fn default_index_name() -> String {
    "vector-index".to_string()
}

fn default_index_path() -> String {
    "embedding".to_string()
}

fn default_search_limit() -> usize {
    5
}

fn default_num_candidates() -> usize {
    100
}

fn default_data_file() -> String {
    "data.json".to_string()
}

fn default_batch_size() -> usize {
    20
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// SQLite database location: a path, `sqlite://<path>`, or `:memory:`.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Table holding the documents.
    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Create the vector index at startup when it does not exist yet.
    #[serde(default = "default_true")]
    pub create_index_on_startup: bool,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderProvider {
    #[default]
    Onnx,
    Mock,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: EmbedderProvider,

    /// HuggingFace model id.
    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Local model directory (defaults to `models/<model short name>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    #[serde(default = "default_max_length")]
    pub max_length: usize,

    #[serde(default)]
    pub query_prefix: String,

    #[serde(default)]
    pub document_prefix: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_name")]
    pub name: String,

    #[serde(default = "default_index_path")]
    pub path: String,

    #[serde(default)]
    pub similarity: Similarity,

    #[serde(default)]
    pub quantization: Quantization,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Number of results returned (k).
    #[serde(default = "default_search_limit")]
    pub limit: usize,

    #[serde(default = "default_true")]
    pub exact: bool,

    /// Candidates considered by approximate search; ignored when `exact`.
    #[serde(default = "default_num_candidates")]
    pub num_candidates: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_data_file")]
    pub data_file: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_true")]
    pub on_startup: bool,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            collection: default_collection(),
            host: default_host(),
            port: default_port(),
            create_index_on_startup: default_true(),
            model: ModelConfig::default(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: EmbedderProvider::default(),
            name: default_model_name(),
            dimensions: default_dimensions(),
            dir: None,
            max_length: default_max_length(),
            query_prefix: String::new(),
            document_prefix: String::new(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: default_index_name(),
            path: default_index_path(),
            similarity: Similarity::default(),
            quantization: Quantization::default(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
            exact: default_true(),
            num_candidates: default_num_candidates(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            batch_size: default_batch_size(),
            on_startup: default_true(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file, then apply environment overrides.
    ///
    /// `.env` in the working directory is read first when present.
    pub fn load(config_path: &str) -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            info!("Loaded environment from {}", path.display());
        }

        let mut cfg = Self::load_file(config_path)?;
        cfg.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Load configuration from a JSON file only.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template for the default path. Invalid JSON falls back to defaults.
    pub fn load_file(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Apply overrides from environment-style variables looked up via `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_DATABASE_URL) {
            self.database_url = url;
        }
        if let Some(port) = non_empty(ENV_APP_PORT) {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("{ENV_APP_PORT} is not a valid port: {port}"))?;
        }
        if let Some(collection) = non_empty(ENV_COLLECTION) {
            self.collection = collection;
        }
        if let Some(dir) = non_empty(ENV_MODEL_DIR) {
            self.model.dir = Some(dir);
        }
        Ok(())
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.database_url.trim().is_empty(),
            "database_url must not be empty"
        );
        anyhow::ensure!(
            is_identifier(&self.collection),
            "collection must be a plain identifier, got {:?}",
            self.collection
        );
        anyhow::ensure!(self.port > 0, "port must be positive");
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(
            self.model.max_length > 0,
            "model.max_length must be positive"
        );
        anyhow::ensure!(
            (1..=MAX_RESULTS).contains(&self.search.limit),
            "search.limit must be between 1 and {MAX_RESULTS}, got {}",
            self.search.limit
        );
        anyhow::ensure!(
            self.search.exact
                || (self.search.limit..=MAX_RESULTS).contains(&self.search.num_candidates),
            "search.num_candidates must be between search.limit ({}) and {MAX_RESULTS}, got {}",
            self.search.limit,
            self.search.num_candidates
        );
        anyhow::ensure!(
            self.ingest.batch_size > 0,
            "ingest.batch_size must be positive"
        );
        self.index_definition()
            .validate()
            .context("invalid index configuration")?;
        Ok(())
    }

    /// The vector index definition implied by the `index` and `model` sections.
    #[must_use]
    pub fn index_definition(&self) -> VectorIndexDefinition {
        VectorIndexDefinition {
            name: self.index.name.clone(),
            path: self.index.path.clone(),
            num_dimensions: self.model.dimensions,
            similarity: self.index.similarity,
            quantization: self.index.quantization,
        }
    }

    /// Database location with any `sqlite://` scheme removed.
    #[must_use]
    pub fn database_path(&self) -> &str {
        self.database_url
            .strip_prefix("sqlite://")
            .unwrap_or(&self.database_url)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.collection, "facts");
        assert_eq!(config.search.limit, 5);
        assert!(config.search.exact);
        assert_eq!(config.model.dimensions, 768);
        assert_eq!(config.model.name, "nomic-ai/nomic-embed-text-v1");
        assert_eq!(config.model.provider, EmbedderProvider::Onnx);
        assert_eq!(config.index.name, "vector-index");
        assert_eq!(config.index.similarity, Similarity::DotProduct);
        assert_eq!(config.ingest.batch_size, 20);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"port": 9000, "model": {"provider": "mock", "dimensions": 32}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.model.provider, EmbedderProvider::Mock);
        assert_eq!(config.model.dimensions, 32);
        assert_eq!(config.model.name, "nomic-ai/nomic-embed-text-v1");
        assert_eq!(config.search.limit, 5);
    }

    #[test]
    fn test_similarity_names() {
        let json = r#"{"index": {"similarity": "euclidean"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.index.similarity, Similarity::Euclidean);
    }

    #[test]
    fn test_load_file_missing_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = Config::load_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.port, 8080);
        // Only the default path gets a generated template.
        assert!(!path.exists());
    }

    #[test]
    fn test_load_file_invalid_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = Config::load_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.collection, "facts");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_with(env(&[
                (ENV_DATABASE_URL, "sqlite:///tmp/demo.db"),
                (ENV_APP_PORT, "5001"),
                (ENV_COLLECTION, "wonders"),
                (ENV_MODEL_DIR, "/opt/models"),
            ]))
            .unwrap();
        assert_eq!(config.database_url, "sqlite:///tmp/demo.db");
        assert_eq!(config.database_path(), "/tmp/demo.db");
        assert_eq!(config.port, 5001);
        assert_eq!(config.collection, "wonders");
        assert_eq!(config.model.dir.as_deref(), Some("/opt/models"));
    }

    #[test]
    fn test_env_empty_values_ignored() {
        let mut config = Config::default();
        config
            .apply_env_with(env(&[(ENV_DATABASE_URL, ""), (ENV_APP_PORT, "  ")]))
            .unwrap();
        assert_eq!(config.database_url, "./vectors.db");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_env_bad_port() {
        let mut config = Config::default();
        let result = config.apply_env_with(env(&[(ENV_APP_PORT, "eighty")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_bad_collection() {
        let mut config = Config::default();
        config.collection = "facts; DROP TABLE facts".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_limit() {
        let mut config = Config::default();
        config.search.limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_candidates_below_limit() {
        let mut config = Config::default();
        config.search.exact = false;
        config.search.num_candidates = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_search_upper_bounds() {
        let mut config = Config::default();
        config.search.limit = MAX_RESULTS + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("search.limit"), "{err}");

        let mut config = Config::default();
        config.search.limit = MAX_RESULTS;
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.search.exact = false;
        config.search.num_candidates = MAX_RESULTS + 1;
        assert!(config.validate().is_err());

        config.search.num_candidates = MAX_RESULTS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_index_definition_follows_model() {
        let mut config = Config::default();
        config.model.dimensions = 384;
        let def = config.index_definition();
        assert_eq!(def.num_dimensions, 384);
        assert_eq!(def.path, "embedding");
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.database_url, config.database_url);
        assert_eq!(parsed.index.name, config.index.name);
        assert_eq!(parsed.model.name, config.model.name);
    }
}
