//! The mutable per-invocation carrier threaded through the five stages.
//!
//! A [`StageContext`] is created once at retrieval entry and mutated only by
//! the currently running stage. Stages run sequentially at the top level;
//! intra-stage parallelism writes to disjoint fields (see each stage
//! module), so there is never a need for interior mutability or locking
//! here.

use crate::config::PipelineConfig;
use crate::domain::{Bm25Result, ContextItem, SearchResult};

/// Mutable per-invocation pipeline state.
#[derive(Debug, Clone)]
pub struct StageContext {
    // --- input, set once at construction ---
    pub retrieval_id: String,
    pub query: String,
    pub candidate_article_ids: Option<Vec<String>>,

    // --- stage 1 (Expand) outputs ---
    pub original_embedding: Vec<f32>,
    pub expanded_queries: Vec<String>,
    pub tag_queries: Vec<String>,

    // --- stage 2 (EmbedAndSearch) outputs ---
    pub additional_queries: Vec<String>,
    pub additional_embeddings: Vec<Vec<f32>>,
    pub original_dense_results: Vec<SearchResult>,
    pub bm25_results: Vec<Bm25Result>,

    // --- stage 3 (Fuse) outputs ---
    pub hits_original: Vec<ContextItem>,
    pub hits_expanded: Vec<ContextItem>,

    // --- config, set once at start ---
    pub config: PipelineConfig,
}

impl StageContext {
    pub fn new(
        retrieval_id: String,
        query: String,
        candidate_article_ids: Option<Vec<String>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            retrieval_id,
            query,
            candidate_article_ids,
            original_embedding: Vec::new(),
            expanded_queries: Vec::new(),
            tag_queries: Vec::new(),
            additional_queries: Vec::new(),
            additional_embeddings: Vec::new(),
            original_dense_results: Vec::new(),
            bm25_results: Vec::new(),
            hits_original: Vec::new(),
            hits_expanded: Vec::new(),
            config,
        }
    }

    /// `true` if the caller restricted the search to a specific set of
    /// article ids (possibly empty).
    pub fn has_candidate_restriction(&self) -> bool {
        self.candidate_article_ids.is_some()
    }
}
