/// End-to-end integration tests for the vectorsearch pipeline.
///
/// Tests the complete flow:
///   Config → DB → Embedder → Ingest → HTTP /vectorsearch
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tower::ServiceExt;

use vectorsearch::api::{AppContext, router};
use vectorsearch::config::{Config, EmbedderProvider};
use vectorsearch::db::Db;
use vectorsearch::embedder::{self, Embedder};
use vectorsearch::ingest::{Ingestor, SampleEntry};

const DIMS: usize = 64;

fn test_config() -> Config {
    let mut config = Config::default();
    config.model.provider = EmbedderProvider::Mock;
    config.model.dimensions = DIMS;
    config
}

fn entry(id: &str, text: &str) -> SampleEntry {
    SampleEntry {
        id: Some(id.to_string()),
        text: Some(text.to_string()),
    }
}

fn sample_entries() -> Vec<SampleEntry> {
    vec![
        entry("redeemer_1", "Brazil"),
        entry("redeemer_2", "Christ the Redeemer overlooks Rio de Janeiro"),
        entry("colosseum_1", "The Colosseum is in Rome"),
        entry("colosseum_2", "Gladiators fought in the arena"),
        entry("petra_1", "Petra is carved into sandstone"),
        entry("great_wall_1", "The Great Wall crosses northern China"),
        entry("machu_picchu_1", "Machu Picchu is an Inca citadel"),
        entry("taj_mahal_1", "The Taj Mahal is in Agra"),
    ]
}

/// Router over an in-memory collection with an index, seeded via the mock embedder.
async fn setup_app(config: Config, entries: &[SampleEntry], create_index: bool) -> axum::Router {
    let mut db = Db::open_in_memory(&config.collection).unwrap();
    if create_index {
        db.ensure_search_index(&config.index_definition()).unwrap();
    }
    let db = Arc::new(TokioMutex::new(db));

    let embedder = embedder::from_config(&config.model).unwrap();
    Ingestor::new(db.clone(), embedder.clone(), "mock", config.ingest.batch_size)
        .ingest_entries(entries)
        .await
        .unwrap();

    router(AppContext {
        db,
        config: Arc::new(config),
        embedder,
    })
}

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.expect("Request failed");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    let value: Value = serde_json::from_slice(&body).expect("Invalid JSON response");
    (status, value)
}

fn assert_scores_non_increasing(results: &[Value]) {
    let scores: Vec<f64> = results
        .iter()
        .map(|r| r["score"].as_f64().unwrap())
        .collect();
    for pair in scores.windows(2) {
        assert!(pair[0] >= pair[1], "scores not sorted: {scores:?}");
    }
}

#[tokio::test]
async fn test_vectorsearch_returns_query_and_ranked_results() {
    let app = setup_app(test_config(), &sample_entries(), true).await;

    let (status, body) = get_json(&app, "/vectorsearch?prompt=Brazil").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "Brazil");

    let results = body["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert!(results.len() <= 5, "results exceed k: {}", results.len());
    assert_scores_non_increasing(results);

    // The mock embedder maps identical text to the identical vector.
    let top = &results[0];
    assert_eq!(top["_id"], "redeemer_1");
    assert_eq!(top["text"], "Brazil");
    let score = top["score"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&score));
    assert!(score > 0.999, "identical text should score ~1, got {score}");
}

#[tokio::test]
async fn test_vectorsearch_result_fields() {
    let app = setup_app(test_config(), &sample_entries(), true).await;

    let (_, body) = get_json(&app, "/vectorsearch?prompt=Rome").await;
    for result in body["results"].as_array().unwrap() {
        let obj = result.as_object().unwrap();
        assert_eq!(obj.len(), 3, "unexpected fields: {obj:?}");
        assert!(obj["_id"].is_string());
        assert!(obj["text"].is_string());
        assert!(obj["score"].is_f64());
    }
}

#[tokio::test]
async fn test_vectorsearch_respects_k() {
    let mut config = test_config();
    config.search.limit = 3;
    let app = setup_app(config, &sample_entries(), true).await;

    let (status, body) = get_json(&app, "/vectorsearch?prompt=wonders").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_vectorsearch_approximate_mode() {
    let mut config = test_config();
    config.search.exact = false;
    config.search.num_candidates = 6;
    let app = setup_app(config, &sample_entries(), true).await;

    let (status, body) = get_json(&app, "/vectorsearch?prompt=Brazil").await;

    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(results[0]["_id"], "redeemer_1");
    assert_scores_non_increasing(results);
}

#[tokio::test]
async fn test_vectorsearch_large_candidate_pool() {
    let mut config = test_config();
    config.search.exact = false;
    config.search.num_candidates = 5000;
    assert!(config.validate().is_ok());
    let app = setup_app(config, &sample_entries(), true).await;

    let (status, body) = get_json(&app, "/vectorsearch?prompt=Brazil").await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(results[0]["_id"], "redeemer_1");
}

#[tokio::test]
async fn test_vectorsearch_decodes_prompt() {
    let app = setup_app(test_config(), &sample_entries(), true).await;

    let (status, body) = get_json(&app, "/vectorsearch?prompt=Christ%20the%20Redeemer").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "Christ the Redeemer");
}

#[tokio::test]
async fn test_vectorsearch_empty_collection() {
    let app = setup_app(test_config(), &[], true).await;

    let (status, body) = get_json(&app, "/vectorsearch?prompt=Brazil").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], Value::Array(vec![]));
}

#[tokio::test]
async fn test_vectorsearch_missing_prompt_is_client_error() {
    let app = setup_app(test_config(), &sample_entries(), true).await;

    let (status, body) = get_json(&app, "/vectorsearch").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required query parameter 'prompt'");
}

#[tokio::test]
async fn test_vectorsearch_empty_prompt_is_client_error() {
    let app = setup_app(test_config(), &sample_entries(), true).await;

    let (status, body) = get_json(&app, "/vectorsearch?prompt=").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("prompt"));
}

#[tokio::test]
async fn test_vectorsearch_missing_index_is_server_error() {
    let app = setup_app(test_config(), &sample_entries(), false).await;

    let (status, body) = get_json(&app, "/vectorsearch?prompt=Brazil").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Database error: "),
        "{body}"
    );
}

#[tokio::test]
async fn test_index_created_after_ingest_sees_documents() {
    let config = test_config();
    let mut db = Db::open_in_memory(&config.collection).unwrap();
    let embedder = embedder::from_config(&config.model).unwrap();
    let vector = embedder.embed("Brazil").unwrap();
    db.insert_documents(
        &[vectorsearch::db::models::Document {
            id: "redeemer_1",
            text: "Brazil",
            embedding: &vector,
        }],
        &vectorsearch::db::models::ModelInfo::now("mock"),
    )
    .unwrap();
    db.ensure_search_index(&config.index_definition()).unwrap();

    let app = router(AppContext {
        db: Arc::new(TokioMutex::new(db)),
        config: Arc::new(config),
        embedder,
    });

    let (status, body) = get_json(&app, "/vectorsearch?prompt=Brazil").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["_id"], "redeemer_1");
}

#[tokio::test]
async fn test_health_reports_documents() {
    let app = setup_app(test_config(), &sample_entries(), true).await;

    let (status, body) = get_json(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["documents"], 8);
    assert_eq!(body["index"], "vector-index");
}

#[tokio::test]
async fn test_sample_data_file_ingests() {
    let config = test_config();
    let db = Arc::new(TokioMutex::new(
        Db::open_in_memory(&config.collection).unwrap(),
    ));
    let embedder = embedder::from_config(&config.model).unwrap();

    let report = Ingestor::new(db.clone(), embedder.clone(), "mock", 20)
        .ingest_file(Path::new(env!("CARGO_MANIFEST_DIR")).join("data.json").as_path())
        .await
        .unwrap();

    assert_eq!(report.inserted, 16);
    assert_eq!(report.failed, 0);
    assert!(db.lock().await.contains_document("redeemer_1").unwrap());
}

/// Real model end to end: requires downloaded model files and an ONNX
/// Runtime library (`ORT_DYLIB_PATH`).
#[tokio::test]
#[ignore]
async fn test_brazil_finds_redeemer_with_real_model() {
    let config = Config::default();
    let model_dir = embedder::model_dir(&config.model);
    if !embedder::download::all_files_present(&model_dir) {
        eprintln!("Skipping: model files not downloaded");
        return;
    }

    let mut db = Db::open_in_memory(&config.collection).unwrap();
    db.ensure_search_index(&config.index_definition()).unwrap();
    let db = Arc::new(TokioMutex::new(db));
    let embedder = embedder::from_config(&config.model).unwrap();

    Ingestor::new(db.clone(), embedder.clone(), &config.model.name, 20)
        .ingest_file(Path::new(env!("CARGO_MANIFEST_DIR")).join("data.json").as_path())
        .await
        .unwrap();

    let app = router(AppContext {
        db,
        config: Arc::new(config),
        embedder,
    });

    let (status, body) = get_json(&app, "/vectorsearch?prompt=Brazil").await;
    assert_eq!(status, StatusCode::OK);

    let results = body["results"].as_array().unwrap();
    assert!(results.len() <= 5);
    assert_scores_non_increasing(results);
    let top = &results[0];
    assert!(top["_id"].as_str().unwrap().starts_with("redeemer_"), "{body}");
    let score = top["score"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&score));
}

/// Config defaults wire the index definition to the model dimensionality.
#[test]
fn test_config_defaults_and_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.port, 8080);
    assert_eq!(config.search.limit, 5);
    assert_eq!(config.index_definition().num_dimensions, 768);

    let mut bad = Config::default();
    bad.collection = "not a table".to_string();
    assert!(bad.validate().is_err());
}
