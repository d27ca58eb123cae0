//! # vectorsearch: semantic search over a document collection
//!
//! Embeds a free-text prompt with a pretrained sentence-embedding model and
//! runs a vector search against a SQLite collection indexed with sqlite-vec.
//!
//! ## Architecture
//!
//! - **[`config`]**: Configuration loading (JSON file + environment), validation
//! - **[`db`]**: SQLite + sqlite-vec: collections, vector indexes, vector search
//! - **[`embedder`]**: Text embedding via ONNX Runtime (nomic-embed-text-v1)
//! - **[`ingest`]**: Sample data ingestion in batches
//! - **[`api`]**: axum HTTP endpoint `GET /vectorsearch?prompt=`

pub mod api;
pub mod config;
pub mod db;
pub mod embedder;
pub mod ingest;
