//! External collaborators the pipeline talks to: the trait seams, their HTTP
//! implementations, and in-memory test doubles.

pub mod http;
pub mod mock;
pub mod traits;

pub use http::{
    HttpBm25Searcher, HttpChunkRepository, HttpQueryExpander, HttpReranker, HttpTagSearchClient,
    HttpVectorEncoder, VllmClient,
};
pub use traits::{Bm25Searcher, ChunkRepository, LlmClient, QueryExpander, Reranker, TagSearchClient, VectorEncoder};
