//! ragstage CLI
//!
//! A thin binary over `ragstage-core`: wires the six HTTP collaborators
//! from environment configuration and runs one retrieval.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ragstage_core::clients::{
    HttpBm25Searcher, HttpChunkRepository, HttpQueryExpander, HttpReranker, HttpTagSearchClient,
    HttpVectorEncoder, VllmClient,
};
use ragstage_core::{PipelineConfig, QueryInput, ServiceConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ragstage", about = "Hybrid retrieval pipeline driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one retrieval and print the resulting context items as JSON.
    Retrieve(RetrieveArgs),
}

#[derive(Parser)]
struct RetrieveArgs {
    /// The free-form query text.
    query: String,

    /// Comma-separated list of article ids to restrict the search to.
    #[arg(long)]
    candidates: Option<String>,

    /// Opaque id used only for log correlation; a random one is generated
    /// if omitted.
    #[arg(long)]
    retrieval_id: Option<String>,

    /// Optional YAML config file overlaying environment defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Retrieve(args) => run_retrieve(args).await,
    }
}

async fn run_retrieve(args: RetrieveArgs) -> Result<()> {
    let config = PipelineConfig::load(args.config.as_deref()).context("loading pipeline config")?;

    let embedder_config = ServiceConfig::from_env(
        "RAGSTAGE_EMBEDDER_URL",
        "RAGSTAGE_EMBEDDER_MODEL",
        "RAGSTAGE_EMBEDDER_API_KEY",
    )
    .context("RAGSTAGE_EMBEDDER_URL is required")?;
    let repo_config = ServiceConfig::from_env(
        "RAGSTAGE_CHUNK_REPO_URL",
        "RAGSTAGE_CHUNK_REPO_MODEL",
        "RAGSTAGE_CHUNK_REPO_API_KEY",
    )
    .context("RAGSTAGE_CHUNK_REPO_URL is required")?;

    let vector_encoder = HttpVectorEncoder::new(embedder_config)?;
    let chunk_repository = HttpChunkRepository::new(repo_config)?;

    let bm25_searcher = ServiceConfig::from_env(
        "RAGSTAGE_BM25_URL",
        "RAGSTAGE_BM25_MODEL",
        "RAGSTAGE_BM25_API_KEY",
    )
    .map(HttpBm25Searcher::new)
    .transpose()?;

    let query_expander = ServiceConfig::from_env(
        "RAGSTAGE_EXPANDER_URL",
        "RAGSTAGE_EXPANDER_MODEL",
        "RAGSTAGE_EXPANDER_API_KEY",
    )
    .map(HttpQueryExpander::new)
    .transpose()?
    .unwrap_or_else(|| HttpQueryExpander::new(ServiceConfig::new("http://localhost:0")).unwrap());

    let tag_search_client = ServiceConfig::from_env(
        "RAGSTAGE_TAGS_URL",
        "RAGSTAGE_TAGS_MODEL",
        "RAGSTAGE_TAGS_API_KEY",
    )
    .map(HttpTagSearchClient::new)
    .transpose()?
    .unwrap_or_else(|| HttpTagSearchClient::new(ServiceConfig::new("http://localhost:0")).unwrap());

    let llm_config = ServiceConfig::from_env(
        "RAGSTAGE_LLM_URL",
        "RAGSTAGE_LLM_MODEL",
        "RAGSTAGE_LLM_API_KEY",
    )
    .unwrap_or_else(|| ServiceConfig::new("http://localhost:0"));
    let llm_client: Arc<dyn ragstage_core::clients::LlmClient> =
        Arc::new(VllmClient::new(llm_config)?);

    let reranker = if config.rerank_enabled {
        Some(HttpReranker::new(llm_client.clone(), "default"))
    } else {
        None
    };

    let candidate_article_ids = args
        .candidates
        .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect());

    let input = QueryInput {
        query: args.query,
        candidate_article_ids,
        retrieval_id: args.retrieval_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    };

    let clients = ragstage_core::PipelineClients {
        vector_encoder: &vector_encoder,
        bm25_searcher: bm25_searcher.as_ref().map(|c| c as &dyn ragstage_core::clients::Bm25Searcher),
        chunk_repository: &chunk_repository,
        query_expander: &query_expander,
        llm_client: llm_client.as_ref(),
        tag_search_client: &tag_search_client,
        reranker: reranker.as_ref().map(|r| r as &dyn ragstage_core::clients::Reranker),
    };

    let output = ragstage_core::retrieve(input, config, &clients)
        .await
        .map_err(|err| anyhow::anyhow!(err))?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
