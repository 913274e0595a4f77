//! The orchestrator entry point: wires the five stages into one sequential
//! pipeline over a single [`StageContext`].

use crate::clients::traits::{
    Bm25Searcher, ChunkRepository, LlmClient, QueryExpander, Reranker, TagSearchClient,
    VectorEncoder,
};
use crate::config::PipelineConfig;
use crate::context::StageContext;
use crate::domain::{ContextItem, QueryInput};
use crate::error::{retrieval_failed, Result};
use crate::stages;
use std::time::Instant;
use tracing::{info, instrument};

/// The six external collaborators a single `retrieve` call needs. BM25 and
/// the reranker are optional: a deployment without a BM25 gateway or a
/// cross-encoder simply passes `None`, which behaves like a client that
/// always returns nothing.
pub struct PipelineClients<'a> {
    pub vector_encoder: &'a dyn VectorEncoder,
    pub bm25_searcher: Option<&'a dyn Bm25Searcher>,
    pub chunk_repository: &'a dyn ChunkRepository,
    pub query_expander: &'a dyn QueryExpander,
    pub llm_client: &'a dyn LlmClient,
    pub tag_search_client: &'a dyn TagSearchClient,
    pub reranker: Option<&'a dyn Reranker>,
}

/// Runs the five-stage hybrid retrieval pipeline for one query.
///
/// Returns either the final ordered context list or a fatal error wrapped
/// with a stage-identifying prefix; there is no partial-result error.
#[instrument(skip(config, clients), fields(retrieval_id = %input.retrieval_id, query_len = input.query.len()))]
pub async fn retrieve(
    input: QueryInput,
    config: PipelineConfig,
    clients: &PipelineClients<'_>,
) -> Result<Vec<ContextItem>> {
    let start = Instant::now();
    let mut ctx = StageContext::new(
        input.retrieval_id.clone(),
        input.query,
        input.candidate_article_ids,
        config,
    );

    stages::expand::run(
        &mut ctx,
        clients.vector_encoder,
        clients.query_expander,
        clients.llm_client,
        clients.tag_search_client,
    )
    .await
    .map_err(retrieval_failed)?;

    stages::embed_and_search::run(
        &mut ctx,
        clients.vector_encoder,
        clients.bm25_searcher,
        clients.chunk_repository,
    )
    .await
    .map_err(retrieval_failed)?;

    stages::fuse::run(&mut ctx, clients.chunk_repository)
        .await
        .map_err(retrieval_failed)?;

    stages::rerank::run(&mut ctx, clients.reranker)
        .await
        .map_err(retrieval_failed)?;

    let output = stages::allocate::run(&ctx);

    info!(
        retrieval_id = %input.retrieval_id,
        count = output.len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "retrieval complete"
    );

    Ok(output)
}
