//! Stage 2: materialize everything Stage 3 (Fuse) needs — the merged
//! rewrite-query list, its embeddings, BM25 hits, and the original-query
//! dense results.

use crate::clients::traits::{Bm25Searcher, ChunkRepository, VectorEncoder};
use crate::context::StageContext;
use crate::domain::{Bm25Result, SearchResult};
use crate::error::Result;
use tracing::warn;

const STAGE: &str = "embed_and_search";

/// Runs Stage 2. `bm25` is `None` when no BM25 client is configured, which
/// behaves exactly like a client that always returns nothing.
pub async fn run(
    ctx: &mut StageContext,
    encoder: &dyn VectorEncoder,
    bm25: Option<&dyn Bm25Searcher>,
    repo: &dyn ChunkRepository,
) -> Result<()> {
    ctx.additional_queries = merge_additional_queries(&ctx.expanded_queries, &ctx.tag_queries);

    let additional_queries = ctx.additional_queries.clone();
    let query = ctx.query.clone();
    let candidate_article_ids = ctx.candidate_article_ids.clone();
    let search_limit = ctx.config.search_limit;
    let bm25_limit = ctx.config.bm25_limit;
    let hybrid_enabled = ctx.config.hybrid_enabled;
    let original_embedding = ctx.original_embedding.clone();

    let (embeddings, bm25_results, dense_results) = tokio::join!(
        embed_additional(encoder, &additional_queries),
        search_bm25(bm25, hybrid_enabled, &query, bm25_limit),
        search_original(
            repo,
            &original_embedding,
            candidate_article_ids.as_deref(),
            search_limit,
        ),
    );

    ctx.additional_embeddings = embeddings;
    ctx.bm25_results = bm25_results;
    ctx.original_dense_results = dense_results?;
    Ok(())
}

/// `ExpandedQueries` followed by every `TagQuery` not already present,
/// preserving order and deduping linearly (the lists are small enough that
/// an O(n*m) scan is simpler than a hash-set and keeps source order exact).
fn merge_additional_queries(expanded: &[String], tags: &[String]) -> Vec<String> {
    let mut merged = expanded.to_vec();
    for tag in tags {
        if !merged.contains(tag) {
            merged.push(tag.clone());
        }
    }
    merged
}

async fn embed_additional(encoder: &dyn VectorEncoder, queries: &[String]) -> Vec<Vec<f32>> {
    if queries.is_empty() {
        return Vec::new();
    }
    match encoder.encode(queries).await {
        Ok(vectors) => vectors,
        Err(err) => {
            warn!(stage = STAGE, error = %err, "additional-query embedding failed");
            Vec::new()
        }
    }
}

async fn search_bm25(
    bm25: Option<&dyn Bm25Searcher>,
    hybrid_enabled: bool,
    query: &str,
    limit: usize,
) -> Vec<Bm25Result> {
    if !hybrid_enabled {
        return Vec::new();
    }
    let Some(bm25) = bm25 else {
        return Vec::new();
    };
    match bm25.search_bm25(query, limit).await {
        Ok(results) => results,
        Err(err) => {
            warn!(stage = STAGE, error = %err, "BM25 search failed");
            Vec::new()
        }
    }
}

async fn search_original(
    repo: &dyn ChunkRepository,
    embedding: &[f32],
    candidate_article_ids: Option<&[String]>,
    limit: usize,
) -> Result<Vec<SearchResult>> {
    match candidate_article_ids {
        Some(ids) => repo.search_within_articles(embedding, ids, limit).await,
        None => repo.search(embedding, limit).await,
    }
    .map_err(|err| crate::error::PipelineError::stage(STAGE, err.to_string()))
}
