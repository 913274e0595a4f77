//! ragstage-core
//!
//! The hybrid retrieval pipeline for a RAG orchestrator: query expansion,
//! dense and sparse (BM25) search, reciprocal-rank fusion, cross-encoder
//! reranking, and language-aware allocation, composed into a five-stage
//! concurrent pipeline with partial-failure tolerance.
//!
//! Everything outside this pipeline — RPC framing, ingest-side chunking,
//! persistence, and answer generation — is consumed through the narrow
//! trait interfaces in [`clients`].

pub mod clients;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod stages;

pub use config::{PipelineConfig, ServiceConfig};
pub use context::StageContext;
pub use domain::{Bm25Result, Chunk, ContextItem, QueryInput, RerankCandidate, RerankScore, SearchHit, SearchResult};
pub use error::{Error, PipelineError, Result};
pub use pipeline::{retrieve, PipelineClients};
