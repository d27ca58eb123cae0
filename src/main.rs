use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vectorsearch::api::{ApiServer, AppContext};
use vectorsearch::config::Config;
use vectorsearch::db::Db;
use vectorsearch::embedder::{self, Embedder};
use vectorsearch::ingest::{IngestReport, Ingestor};

#[derive(Parser)]
#[command(name = "vectorsearch", version, about = "Semantic vector search over a document collection")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, global = true, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve GET /vectorsearch (default)
    Serve {
        /// Do not load sample data at startup
        #[arg(long)]
        skip_ingest: bool,
    },
    /// Embed and insert sample documents
    Ingest {
        /// JSON array of {"_id", "text"} entries (defaults to ingest.data_file)
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Create the vector search index if it does not exist
    CreateIndex,
    /// Print the vector search index definition as JSON
    IndexDefinition,
    /// Download the embedding model files
    DownloadModel,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;
    let config = Arc::new(config);

    match cli.command.unwrap_or(Command::Serve { skip_ingest: false }) {
        Command::Serve { skip_ingest } => serve(config, skip_ingest).await,
        Command::Ingest { file } => {
            let db = open_db(&config)?;
            let embedder = load_embedder(&config).await?;
            let path = file.unwrap_or_else(|| PathBuf::from(&config.ingest.data_file));
            let report = ingest(&config, db, embedder, &path).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::CreateIndex => {
            let db = open_db(&config)?;
            ensure_index(&config, &db).await?;
            Ok(())
        }
        Command::IndexDefinition => {
            let definition = config.index_definition().to_search_index_json();
            println!("{}", serde_json::to_string_pretty(&definition)?);
            Ok(())
        }
        Command::DownloadModel => {
            let model = config.model.clone();
            let dir = embedder::model_dir(&model);
            tokio::task::spawn_blocking(move || {
                embedder::download::download_model_files(&model.name, &dir)
            })
            .await
            .context("download task panicked")??;
            Ok(())
        }
    }
}

async fn serve(config: Arc<Config>, skip_ingest: bool) -> Result<()> {
    info!("Starting vectorsearch server...");

    // 1. Init DB
    let db = open_db(&config)?;

    // 2. Vector index
    if config.create_index_on_startup {
        ensure_index(&config, &db).await?;
    }

    // 3. Embedder
    let embedder = load_embedder(&config).await?;

    // 4. Sample data
    if config.ingest.on_startup && !skip_ingest {
        let path = PathBuf::from(&config.ingest.data_file);
        if path.exists() {
            if let Err(e) = ingest(&config, db.clone(), embedder.clone(), &path).await {
                warn!("Sample data not loaded: {e:#}");
            }
        } else {
            info!("No sample data at {}, skipping ingestion", path.display());
        }
    }

    // 5. Serve
    let ctx = AppContext {
        db,
        config,
        embedder,
    };
    ApiServer::new(ctx).start().await
}

fn open_db(config: &Config) -> Result<Arc<TokioMutex<Db>>> {
    let db = Db::open(config.database_path(), &config.collection)
        .context("Failed to open database")?;
    Ok(Arc::new(TokioMutex::new(db)))
}

async fn ensure_index(config: &Config, db: &Arc<TokioMutex<Db>>) -> Result<()> {
    let definition = config.index_definition();
    let created = db
        .lock()
        .await
        .ensure_search_index(&definition)
        .with_context(|| format!("failed to create search index {}", definition.name))?;
    if !created {
        info!("Search index {} already exists", definition.name);
    }
    Ok(())
}

async fn load_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let model = config.model.clone();
    let embedder = tokio::task::spawn_blocking(move || embedder::from_config(&model))
        .await
        .context("embedder initialization panicked")?
        .context("Failed to load embedding model")?;
    Ok(embedder)
}

async fn ingest(
    config: &Config,
    db: Arc<TokioMutex<Db>>,
    embedder: Arc<dyn Embedder>,
    path: &Path,
) -> Result<IngestReport> {
    Ingestor::new(db, embedder, &config.model.name, config.ingest.batch_size)
        .with_document_prefix(&config.model.document_prefix)
        .ingest_file(path)
        .await
}
