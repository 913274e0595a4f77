//! Core retrieval types shared by every pipeline stage.
//!
//! These are the leaves of the dependency graph: plain data, no I/O, no
//! trait objects. Every other module in this crate depends on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-supplied input to a single retrieval invocation.
#[derive(Debug, Clone)]
pub struct QueryInput {
    /// UTF-8 query text, non-empty.
    pub query: String,
    /// Candidate article ids the search should be restricted to. `None`
    /// means unrestricted; `Some(vec![])` means "restricted to nothing" —
    /// these are distinct states, so this is not flattened to a bare `Vec`.
    pub candidate_article_ids: Option<Vec<String>>,
    /// Opaque id used only for log correlation.
    pub retrieval_id: String,
}

/// Stored unit of retrieval. Read-only from the pipeline's perspective; it
/// is never persisted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: Uuid,
    pub article_id: String,
    pub url: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub document_version: u64,
    pub body: String,
}

/// A dense-search hit: a chunk plus a similarity score and denormalized
/// presentation fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: Uuid,
    pub article_id: String,
    pub url: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub document_version: u64,
    pub body: String,
    /// Similarity score, higher is better.
    pub score: f64,
}

/// A sparse (BM25) search hit. BM25 operates over articles, not chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Result {
    pub article_id: String,
    /// 1-based rank within the BM25 result list.
    pub rank: usize,
    pub score: f64,
}

/// A hit returned by the external tag/search client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub article_id: String,
    pub tags: Vec<String>,
}

/// The pipeline's unified carrier for a candidate passed between stages and,
/// ultimately, returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextItem {
    pub chunk_id: Uuid,
    pub chunk_text: String,
    pub url: String,
    pub title: String,
    /// RFC-3339 formatted publication timestamp.
    pub published_at: String,
    pub score: f64,
    pub document_version: u64,
}

impl ContextItem {
    /// Build a `ContextItem` from a dense [`SearchResult`], used as the
    /// uniform entry point for both the original-query and rewrite buckets.
    pub fn from_search_result(result: &SearchResult) -> Self {
        Self {
            chunk_id: result.chunk_id,
            chunk_text: result.body.clone(),
            url: result.url.clone(),
            title: result.title.clone(),
            published_at: result.published_at.to_rfc3339(),
            score: result.score,
            document_version: result.document_version,
        }
    }
}

/// A candidate offered to the reranker: id plus the text it should score.
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub chunk_id: Uuid,
    pub text: String,
    pub score: f64,
}

/// A single reranker output: a new score for a previously offered candidate.
#[derive(Debug, Clone)]
pub struct RerankScore {
    pub chunk_id: Uuid,
    pub score: f64,
}
