//! The six external-collaborator capabilities the pipeline consumes.
//!
//! Every trait is `Send + Sync` so implementations can be shared behind
//! `Arc<dyn Trait>` across the concurrent sub-tasks inside a stage.

use crate::domain::{Bm25Result, RerankCandidate, RerankScore, SearchHit, SearchResult};
use crate::error::Result;
use async_trait::async_trait;

/// Embeds query text into dense vectors. The original-query call is fatal
/// on failure; rewrite-query batches are not.
#[async_trait]
pub trait VectorEncoder: Send + Sync {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Sparse (BM25) search over raw query text. Always non-fatal.
#[async_trait]
pub trait Bm25Searcher: Send + Sync {
    async fn search_bm25(&self, query: &str, limit: usize) -> Result<Vec<Bm25Result>>;
}

/// Dense nearest-neighbor search over stored chunks. Always fatal on
/// failure (both the unrestricted and candidate-restricted variants).
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    async fn search_within_articles(
        &self,
        vector: &[f32],
        article_ids: &[String],
        limit: usize,
    ) -> Result<Vec<SearchResult>>;
}

/// Purpose-built query rewriting service. One of the two expansion sources
/// that race in Stage 1; always non-fatal.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand(&self, query: &str) -> Result<Vec<String>>;
}

/// General-purpose LLM completion endpoint. Used both as the second
/// expansion source (driven by a literal prompt template) and as the
/// backing model for [`Reranker`]'s default HTTP implementation.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// External tag/search client. Always non-fatal.
#[async_trait]
pub trait TagSearchClient: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// Cross-encoder reranker. Always non-fatal: timeout or error means the
/// caller keeps its prior (fusion) scores.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: &[RerankCandidate]) -> Result<Vec<RerankScore>>;

    fn model_name(&self) -> &str;
}
