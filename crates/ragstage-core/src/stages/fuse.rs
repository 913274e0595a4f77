//! Stage 3: fan out dense search over every rewrite embedding, then produce
//! the two ranked hit lists downstream stages consume.
//!
//! Two distinct keying schemes are required here: article id for the
//! original/BM25 fusion (BM25 only knows articles), chunk id for the
//! expanded bucket. These are deliberately different accumulators — do not
//! collapse them into one map.

use crate::clients::traits::ChunkRepository;
use crate::context::StageContext;
use crate::domain::{Bm25Result, ContextItem, SearchResult};
use crate::error::{PipelineError, Result};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

const STAGE: &str = "fuse";

/// Scores emitted from fusion must be finite. A non-finite input (NaN or
/// infinity, from a misconfigured `rrf_k` or an upstream collaborator) is
/// replaced with 0.0 rather than propagated downstream.
fn finite_or_zero(score: f64) -> f64 {
    if score.is_finite() {
        score
    } else {
        warn!(stage = STAGE, score, "dropping non-finite fused score, using 0.0");
        0.0
    }
}

pub async fn run(ctx: &mut StageContext, repo: &dyn ChunkRepository) -> Result<()> {
    let fanout_results = fan_out_search(
        repo,
        &ctx.additional_embeddings,
        ctx.candidate_article_ids.as_deref(),
        ctx.config.search_limit,
    )
    .await?;

    ctx.hits_original = fuse_original_bucket(&ctx.original_dense_results, &ctx.bm25_results, ctx.config.rrf_k);
    ctx.hits_expanded = fuse_expanded_bucket(&fanout_results, ctx.config.rrf_k);
    Ok(())
}

/// Dispatches one dense search per additional embedding, collecting results
/// into a slice indexed by dispatch position so downstream RRF accumulation
/// is deterministic regardless of arrival order. The first failure cancels
/// the rest and aborts the stage.
async fn fan_out_search(
    repo: &dyn ChunkRepository,
    embeddings: &[Vec<f32>],
    candidate_article_ids: Option<&[String]>,
    limit: usize,
) -> Result<Vec<Vec<SearchResult>>> {
    let searches = embeddings.iter().map(|embedding| async move {
        match candidate_article_ids {
            Some(ids) => repo.search_within_articles(embedding, ids, limit).await,
            None => repo.search(embedding, limit).await,
        }
    });

    futures::future::try_join_all(searches)
        .await
        .map_err(|err| PipelineError::stage(STAGE, err.to_string()))
}

/// Hybrid RRF, keyed by article id. When `bm25` is empty the dense list
/// passes through unchanged. Otherwise each article accumulates
/// `1/(k+rank)` from both sources; an article with no dense representative
/// is dropped, since there is no chunk to attach the fused score to.
fn fuse_original_bucket(dense: &[SearchResult], bm25: &[Bm25Result], k: f64) -> Vec<ContextItem> {
    if bm25.is_empty() {
        return dense
            .iter()
            .map(|result| {
                let mut item = ContextItem::from_search_result(result);
                item.score = finite_or_zero(item.score);
                item
            })
            .collect();
    }

    let mut accumulator: HashMap<String, (f64, Option<SearchResult>)> = HashMap::new();

    for (i, result) in dense.iter().enumerate() {
        let entry = accumulator
            .entry(result.article_id.clone())
            .or_insert((0.0, None));
        entry.0 += 1.0 / (k + (i + 1) as f64);
        if entry.1.is_none() {
            entry.1 = Some(result.clone());
        }
    }

    for hit in bm25 {
        let entry = accumulator
            .entry(hit.article_id.clone())
            .or_insert((0.0, None));
        entry.0 += 1.0 / (k + hit.rank as f64);
    }

    let mut items: Vec<ContextItem> = accumulator
        .into_values()
        .filter_map(|(score, chunk)| {
            chunk.map(|c| {
                let mut item = ContextItem::from_search_result(&c);
                item.score = finite_or_zero(score);
                item
            })
        })
        .collect();

    items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    items
}

/// Expanded-bucket RRF, keyed by chunk id. The first observation of a chunk
/// fixes its presentation fields and dense `score`; later observations only
/// add to the RRF accumulator used for sort order.
fn fuse_expanded_bucket(fanout_results: &[Vec<SearchResult>], k: f64) -> Vec<ContextItem> {
    let mut accumulator: HashMap<Uuid, (f64, ContextItem)> = HashMap::new();

    for result_list in fanout_results {
        for (rank, result) in result_list.iter().enumerate() {
            let contribution = 1.0 / (k + (rank + 1) as f64);
            accumulator
                .entry(result.chunk_id)
                .and_modify(|(rrf_score, _)| *rrf_score += contribution)
                .or_insert_with(|| {
                    let mut item = ContextItem::from_search_result(result);
                    item.score = finite_or_zero(item.score);
                    (contribution, item)
                });
        }
    }

    let mut scored: Vec<(f64, ContextItem)> = accumulator.into_iter().map(|(_, v)| v).collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.into_iter().map(|(_, item)| item).collect()
}
