//! In-memory test doubles for the six collaborator traits.
//!
//! Used by stage unit tests and the seed-suite integration tests. Each mock
//! is configured with canned responses or a failure mode so a test can
//! exercise a specific pipeline branch (fatal vs. non-fatal errors, empty
//! results, timeouts) without standing up an HTTP server.

use crate::clients::traits::{
    Bm25Searcher, ChunkRepository, LlmClient, QueryExpander, Reranker, TagSearchClient,
    VectorEncoder,
};
use crate::domain::{Bm25Result, RerankCandidate, RerankScore, SearchHit, SearchResult};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Returns a fixed embedding for every input text, or fails if configured to.
pub struct MockVectorEncoder {
    pub vector: Vec<f32>,
    pub fail: bool,
}

impl MockVectorEncoder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            vector: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl VectorEncoder for MockVectorEncoder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(PipelineError::ExternalError("mock encoder failure".to_string()));
        }
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }
}

/// Returns canned BM25 results, or fails if configured to.
pub struct MockBm25Searcher {
    pub results: Vec<Bm25Result>,
    pub fail: bool,
}

impl MockBm25Searcher {
    pub fn new(results: Vec<Bm25Result>) -> Self {
        Self { results, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            results: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl Bm25Searcher for MockBm25Searcher {
    async fn search_bm25(&self, _query: &str, limit: usize) -> Result<Vec<Bm25Result>> {
        if self.fail {
            return Err(PipelineError::ExternalError("mock BM25 failure".to_string()));
        }
        Ok(self.results.iter().take(limit).cloned().collect())
    }
}

/// Returns canned dense search results for both unrestricted and
/// candidate-restricted queries.
///
/// Supports two modes: a single fixed `results` list returned for every
/// call, or a `queued` sequence of distinct per-call responses (consumed in
/// call order) for scenarios where the original-query search and the
/// per-rewrite fan-out searches must return different chunks.
pub struct MockChunkRepository {
    pub results: Vec<SearchResult>,
    queued: Mutex<std::collections::VecDeque<Vec<SearchResult>>>,
    pub fail: bool,
}

impl MockChunkRepository {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            queued: Mutex::new(std::collections::VecDeque::new()),
            fail: false,
        }
    }

    /// Each call to `search` or `search_within_articles` pops the next
    /// response off `responses`, in order.
    pub fn sequenced(responses: Vec<Vec<SearchResult>>) -> Self {
        Self {
            results: Vec::new(),
            queued: Mutex::new(responses.into()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            results: Vec::new(),
            queued: Mutex::new(std::collections::VecDeque::new()),
            fail: true,
        }
    }

    fn next_results(&self) -> Vec<SearchResult> {
        let mut queued = self.queued.lock().unwrap();
        queued.pop_front().unwrap_or_else(|| self.results.clone())
    }
}

#[async_trait]
impl ChunkRepository for MockChunkRepository {
    async fn search(&self, _vector: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if self.fail {
            return Err(PipelineError::ExternalError("mock chunk repository failure".to_string()));
        }
        Ok(self.next_results().into_iter().take(limit).collect())
    }

    async fn search_within_articles(
        &self,
        _vector: &[f32],
        article_ids: &[String],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        if self.fail {
            return Err(PipelineError::ExternalError("mock chunk repository failure".to_string()));
        }
        Ok(self
            .next_results()
            .into_iter()
            .filter(|r| article_ids.contains(&r.article_id))
            .take(limit)
            .collect())
    }
}

/// Returns a fixed list of rewrites after an optional artificial delay, or
/// fails. Used to exercise the expansion-source race in `stages::expand`.
pub struct MockQueryExpander {
    pub rewrites: Vec<String>,
    pub delay: Duration,
    pub fail: bool,
}

impl MockQueryExpander {
    pub fn new(rewrites: Vec<String>) -> Self {
        Self {
            rewrites,
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn delayed(rewrites: Vec<String>, delay: Duration) -> Self {
        Self {
            rewrites,
            delay,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            rewrites: Vec::new(),
            delay: Duration::ZERO,
            fail: true,
        }
    }
}

#[async_trait]
impl QueryExpander for MockQueryExpander {
    async fn expand(&self, _query: &str) -> Result<Vec<String>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(PipelineError::ExternalError("mock expander failure".to_string()));
        }
        Ok(self.rewrites.clone())
    }
}

/// Returns a fixed completion string after an optional artificial delay.
/// Used both as a second expansion source and as a reranker backend.
pub struct MockLlmClient {
    pub response: String,
    pub delay: Duration,
    pub fail: bool,
}

impl MockLlmClient {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn delayed(response: impl Into<String>, delay: Duration) -> Self {
        Self {
            response: response.into(),
            delay,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            response: String::new(),
            delay: Duration::ZERO,
            fail: true,
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(PipelineError::ExternalError("mock LLM failure".to_string()));
        }
        Ok(self.response.clone())
    }
}

/// Returns canned tag hits, or fails.
pub struct MockTagSearchClient {
    pub hits: Vec<SearchHit>,
    pub fail: bool,
}

impl MockTagSearchClient {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            hits: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl TagSearchClient for MockTagSearchClient {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
        if self.fail {
            return Err(PipelineError::ExternalError("mock tag search failure".to_string()));
        }
        Ok(self.hits.clone())
    }
}

/// Returns canned rerank scores after an optional artificial delay. The
/// delay lets tests exercise the stage's hard timeout.
pub struct MockReranker {
    pub scores: Mutex<Vec<RerankScore>>,
    pub delay: Duration,
    pub fail: bool,
}

impl MockReranker {
    pub fn new(scores: Vec<RerankScore>) -> Self {
        Self {
            scores: Mutex::new(scores),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn delayed(scores: Vec<RerankScore>, delay: Duration) -> Self {
        Self {
            scores: Mutex::new(scores),
            delay,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            scores: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            fail: true,
        }
    }
}

#[async_trait]
impl Reranker for MockReranker {
    async fn rerank(&self, _query: &str, candidates: &[RerankCandidate]) -> Result<Vec<RerankScore>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(PipelineError::ExternalError("mock reranker failure".to_string()));
        }
        let configured = self.scores.lock().unwrap();
        if configured.is_empty() {
            // No canned scores: pass candidate scores through unchanged.
            Ok(candidates
                .iter()
                .map(|c| RerankScore {
                    chunk_id: c.chunk_id,
                    score: c.score,
                })
                .collect())
        } else {
            Ok(configured.clone())
        }
    }

    fn model_name(&self) -> &str {
        "mock-reranker"
    }
}
