use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::error::ApiError;
use super::server::AppContext;
use crate::db::models::SearchHit;
use crate::db::search::VectorSearchQuery;
use crate::embedder::with_prefix;

#[derive(Debug, Deserialize)]
pub struct VectorSearchParams {
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VectorSearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
}

/// `GET /vectorsearch?prompt=<text>`: embed the prompt and return the nearest
/// documents, best first.
pub async fn vector_search(
    State(ctx): State<AppContext>,
    Query(params): Query<VectorSearchParams>,
) -> Result<Json<VectorSearchResponse>, ApiError> {
    let prompt = params
        .prompt
        .filter(|p| !p.is_empty())
        .ok_or(ApiError::MissingPrompt)?;

    let embedder = ctx.embedder.clone();
    let text = with_prefix(&ctx.config.model.query_prefix, &prompt).into_owned();
    let query_vector = tokio::task::spawn_blocking(move || embedder.embed(&text))
        .await
        .map_err(|e| ApiError::Internal(format!("embedding task failed: {e}")))??;

    let search = &ctx.config.search;
    let query = VectorSearchQuery {
        index: &ctx.config.index.name,
        query_vector: &query_vector,
        limit: search.limit,
        exact: search.exact,
        num_candidates: Some(search.num_candidates),
    };

    let results = {
        let db = ctx.db.lock().await;
        db.vector_search(&query)?
    };

    info!("vectorsearch {prompt:?}: {} results", results.len());

    Ok(Json(VectorSearchResponse {
        query: prompt,
        results,
    }))
}

/// `GET /health`
pub async fn health(State(ctx): State<AppContext>) -> Result<Json<Value>, ApiError> {
    let documents = {
        let db = ctx.db.lock().await;
        db.count_documents()?
    };

    Ok(Json(json!({
        "status": "ok",
        "documents": documents,
        "index": ctx.config.index.name,
    })))
}
