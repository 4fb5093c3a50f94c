use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use log::{error, info};

use interview_rag::chunking::ChunkConfig;
use interview_rag::database::{QdrantConfig, QdrantStore};
use interview_rag::index::VectorIndex;
use interview_rag::lifecycle::IndexLifecycle;
use interview_rag::openai::{OpenAiClient, OpenAiConfig};
use interview_rag::query::QueryService;

/// Retrieval coach for company-tagged interview questions, backed by Qdrant
/// and OpenAI embeddings
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the interview questions document (PDF or text)
    #[arg(index = 1)]
    file_path: String,

    /// Delete the persisted index and rebuild it from the document
    #[arg(long)]
    rebuild: bool,

    /// Run a single query and print the retrieved context instead of entering
    /// the interactive loop
    #[arg(long)]
    query: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    info!("Processing file: {}", args.file_path);

    // Validate input file exists
    let path = Path::new(&args.file_path);
    if !path.exists() {
        error!("File not found: {}", args.file_path);
        return Err(anyhow::anyhow!("File not found"));
    }
    let source_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Invalid file name")?;

    // Load configuration from environment
    let qdrant_config = QdrantConfig::from_env().context("Missing QDRANT_URL")?;
    let openai_config = OpenAiConfig::from_env().context("Missing OPENAI_API_KEY")?;

    let store = QdrantStore::new(qdrant_config, source_name)
        .context("Failed to initialize Qdrant client")?;
    let openai = OpenAiClient::new(openai_config);

    let index = VectorIndex::new(store, openai.clone());
    let lifecycle = Arc::new(IndexLifecycle::new(index, path, ChunkConfig::default()));

    // Reuse the persisted index when possible, build otherwise.
    lifecycle
        .initialize()
        .await
        .context("Failed to initialize the index")?;

    if args.rebuild {
        info!("Rebuild requested");
        lifecycle
            .rebuild()
            .await
            .context("Failed to rebuild the index")?;
    }

    let service = QueryService::new(lifecycle, openai);

    if let Some(question) = args.query {
        let context = service.query_company_questions(&question).await?;
        println!("{}", context);
        return Ok(());
    }

    // Enter interactive Q&A loop
    service.run_query_loop().await.context("Error in query loop")?;

    Ok(())
}
