//! Stage 4: optionally replace fusion scores with cross-encoder relevance
//! scores.
//!
//! The 30-candidate cap is a hard guard against cross-encoder inference
//! timeouts; `PipelineConfig::rerank_top_k` is honored only as a tighter
//! bound on top of it, never a looser one.

use crate::clients::traits::Reranker;
use crate::context::StageContext;
use crate::domain::{ContextItem, RerankCandidate};
use crate::error::Result;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

const STAGE: &str = "rerank";
const RERANK_CANDIDATE_CAP: usize = 30;

pub async fn run(ctx: &mut StageContext, reranker: Option<&dyn Reranker>) -> Result<()> {
    if !ctx.config.rerank_enabled {
        return Ok(());
    }
    let Some(reranker) = reranker else {
        return Ok(());
    };

    let cap = ctx.config.rerank_top_k.min(RERANK_CANDIDATE_CAP);
    let candidates = build_candidates(&ctx.hits_original, &ctx.hits_expanded, cap);
    if candidates.is_empty() {
        return Ok(());
    }

    let timeout = Duration::from_millis(ctx.config.rerank_timeout_ms);
    let outcome = tokio::time::timeout(timeout, reranker.rerank(&ctx.query, &candidates)).await;

    let scores = match outcome {
        Ok(Ok(scores)) => scores,
        Ok(Err(err)) => {
            warn!(stage = STAGE, error = %err, "reranker call failed, keeping fusion scores");
            return Ok(());
        }
        Err(_) => {
            warn!(stage = STAGE, timeout_ms = ctx.config.rerank_timeout_ms, "reranker timed out, keeping fusion scores");
            return Ok(());
        }
    };

    let new_scores: HashMap<Uuid, f64> = scores.into_iter().map(|s| (s.chunk_id, s.score)).collect();

    apply_scores(&mut ctx.hits_original, &new_scores);
    apply_scores(&mut ctx.hits_expanded, &new_scores);
    Ok(())
}

/// Inserts every `hits_original` entry, then every `hits_expanded` entry
/// whose chunk id is not yet present, capping at `cap` by current score.
fn build_candidates(
    hits_original: &[ContextItem],
    hits_expanded: &[ContextItem],
    cap: usize,
) -> Vec<RerankCandidate> {
    let mut seen = HashMap::new();
    let mut ordered = Vec::new();

    for item in hits_original.iter().chain(hits_expanded.iter()) {
        if seen.insert(item.chunk_id, ()).is_none() {
            ordered.push(item);
        }
    }

    if ordered.len() > cap {
        ordered.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ordered.truncate(cap);
    }

    ordered
        .into_iter()
        .map(|item| RerankCandidate {
            chunk_id: item.chunk_id,
            text: item.chunk_text.clone(),
            score: item.score,
        })
        .collect()
}

fn apply_scores(items: &mut [ContextItem], new_scores: &HashMap<Uuid, f64>) {
    for item in items.iter_mut() {
        if let Some(&score) = new_scores.get(&item.chunk_id) {
            if score.is_finite() {
                item.score = score;
            } else {
                warn!(stage = STAGE, chunk_id = %item.chunk_id, "reranker returned a non-finite score, keeping fusion score");
            }
        }
    }
    // sort_by is stable, so items not reranked keep their relative order.
    items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::mock::MockReranker;
    use crate::config::PipelineConfig;
    use crate::domain::RerankScore;

    fn item(id: Uuid, score: f64) -> ContextItem {
        ContextItem {
            chunk_id: id,
            chunk_text: "text".into(),
            url: "https://example.com".into(),
            title: "title".into(),
            published_at: "2024-01-01T00:00:00Z".into(),
            score,
            document_version: 1,
        }
    }

    fn ctx_with(hits_original: Vec<ContextItem>, hits_expanded: Vec<ContextItem>) -> StageContext {
        let mut ctx = StageContext::new("r1".into(), "q".into(), None, PipelineConfig::default());
        ctx.config.rerank_enabled = true;
        ctx.hits_original = hits_original;
        ctx.hits_expanded = hits_expanded;
        ctx
    }

    #[tokio::test]
    async fn disabled_is_a_no_op() {
        let a = Uuid::new_v4();
        let mut ctx = ctx_with(vec![item(a, 0.9)], vec![]);
        ctx.config.rerank_enabled = false;
        run(&mut ctx, None).await.unwrap();
        assert_eq!(ctx.hits_original[0].score, 0.9);
    }

    #[tokio::test]
    async fn no_reranker_configured_is_a_no_op() {
        let a = Uuid::new_v4();
        let mut ctx = ctx_with(vec![item(a, 0.9)], vec![]);
        run(&mut ctx, None).await.unwrap();
        assert_eq!(ctx.hits_original[0].score, 0.9);
    }

    #[tokio::test]
    async fn timeout_leaves_scores_unchanged() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut ctx = ctx_with(vec![item(a, 0.9), item(b, 0.8)], vec![]);
        ctx.config.rerank_timeout_ms = 10;
        let reranker = MockReranker::delayed(vec![], Duration::from_millis(200));

        run(&mut ctx, Some(&reranker)).await.unwrap();
        assert_eq!(ctx.hits_original[0].score, 0.9);
        assert_eq!(ctx.hits_original[1].score, 0.8);
    }

    #[tokio::test]
    async fn failure_leaves_scores_unchanged() {
        let a = Uuid::new_v4();
        let mut ctx = ctx_with(vec![item(a, 0.9)], vec![]);
        let reranker = MockReranker::failing();

        run(&mut ctx, Some(&reranker)).await.unwrap();
        assert_eq!(ctx.hits_original[0].score, 0.9);
    }

    #[tokio::test]
    async fn success_overwrites_and_resorts() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut ctx = ctx_with(vec![item(a, 0.9), item(b, 0.1)], vec![]);
        let reranker = MockReranker::new(vec![
            RerankScore { chunk_id: a, score: 0.2 },
            RerankScore { chunk_id: b, score: 0.95 },
        ]);

        run(&mut ctx, Some(&reranker)).await.unwrap();
        assert_eq!(ctx.hits_original[0].chunk_id, b);
        assert_eq!(ctx.hits_original[0].score, 0.95);
    }

    #[tokio::test]
    async fn entries_not_reranked_keep_old_score() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut ctx = ctx_with(vec![item(a, 0.9), item(b, 0.1)], vec![]);
        let reranker = MockReranker::new(vec![RerankScore { chunk_id: a, score: 0.05 }]);

        run(&mut ctx, Some(&reranker)).await.unwrap();
        let keep_b = ctx.hits_original.iter().find(|i| i.chunk_id == b).unwrap();
        assert_eq!(keep_b.score, 0.1);
    }

    #[tokio::test]
    async fn non_finite_score_is_rejected_keeps_prior_score() {
        let a = Uuid::new_v4();
        let mut ctx = ctx_with(vec![item(a, 0.9)], vec![]);
        let reranker = MockReranker::new(vec![RerankScore { chunk_id: a, score: f64::NAN }]);

        run(&mut ctx, Some(&reranker)).await.unwrap();
        assert_eq!(ctx.hits_original[0].score, 0.9);
    }

    #[test]
    fn candidates_dedup_expanded_against_original() {
        let a = Uuid::new_v4();
        let candidates = build_candidates(&[item(a, 0.9)], &[item(a, 0.5)], 30);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].score, 0.9);
    }

    #[test]
    fn candidates_cap_at_thirty_keeping_highest_scored() {
        let hits_original: Vec<ContextItem> = (0..20)
            .map(|i| item(Uuid::new_v4(), i as f64))
            .collect();
        let hits_expanded: Vec<ContextItem> = (0..20)
            .map(|i| item(Uuid::new_v4(), (i + 20) as f64))
            .collect();

        let candidates = build_candidates(&hits_original, &hits_expanded, 30);
        assert_eq!(candidates.len(), 30);
        assert!(candidates.iter().all(|c| c.score >= 10.0));
    }
}
