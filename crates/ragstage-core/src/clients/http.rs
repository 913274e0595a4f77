//! HTTP implementations of the external-collaborator traits.
//!
//! No response cache and no API-metrics layer: caching is an explicit
//! pipeline non-goal and metrics collection is out of scope for this
//! subsystem.

use crate::clients::traits::{
    Bm25Searcher, ChunkRepository, LlmClient, QueryExpander, Reranker, TagSearchClient,
    VectorEncoder,
};
use crate::config::ServiceConfig;
use crate::domain::{Bm25Result, RerankCandidate, RerankScore, SearchHit, SearchResult};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn build_client(config: &ServiceConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(PipelineError::Http)
}

fn auth(req: reqwest::RequestBuilder, config: &ServiceConfig) -> reqwest::RequestBuilder {
    match &config.api_key {
        Some(key) => req.header("Authorization", format!("Bearer {key}")),
        None => req,
    }
}

async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(PipelineError::ExternalError(format!(
            "{what} error (HTTP {status}): {body}"
        )))
    }
}

/// Embeds text via an OpenAI/vLLM-compatible `/v1/embeddings` endpoint.
pub struct HttpVectorEncoder {
    http: reqwest::Client,
    config: ServiceConfig,
}

impl HttpVectorEncoder {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let http = build_client(&config)?;
        Ok(Self { http, config })
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl VectorEncoder for HttpVectorEncoder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.config.base_url);
        let request = EmbedRequest {
            model: &self.config.model,
            input: texts,
        };

        let req = auth(self.http.post(&url).json(&request), &self.config);
        let response = check_status(req.send().await?, "embedding service").await?;
        let parsed: EmbedResponse = response.json().await?;

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Queries an external BM25 gateway.
pub struct HttpBm25Searcher {
    http: reqwest::Client,
    config: ServiceConfig,
}

impl HttpBm25Searcher {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let http = build_client(&config)?;
        Ok(Self { http, config })
    }
}

#[derive(Serialize)]
struct Bm25Request<'a> {
    query: &'a str,
    limit: usize,
}

#[derive(Deserialize)]
struct Bm25ResponseEntry {
    article_id: String,
    rank: usize,
    score: f64,
}

#[async_trait]
impl Bm25Searcher for HttpBm25Searcher {
    async fn search_bm25(&self, query: &str, limit: usize) -> Result<Vec<Bm25Result>> {
        let url = format!("{}/bm25", self.config.base_url);
        let request = Bm25Request { query, limit };

        let req = auth(self.http.post(&url).json(&request), &self.config);
        let response = check_status(req.send().await?, "BM25 service").await?;
        let parsed: Vec<Bm25ResponseEntry> = response.json().await?;

        Ok(parsed
            .into_iter()
            .map(|e| Bm25Result {
                article_id: e.article_id,
                rank: e.rank,
                score: e.score,
            })
            .collect())
    }
}

/// Dense nearest-neighbor search over the chunk store.
pub struct HttpChunkRepository {
    http: reqwest::Client,
    config: ServiceConfig,
}

impl HttpChunkRepository {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let http = build_client(&config)?;
        Ok(Self { http, config })
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    article_ids: Option<&'a [String]>,
}

#[derive(Deserialize)]
struct SearchResponseEntry {
    chunk_id: uuid::Uuid,
    article_id: String,
    url: String,
    title: String,
    published_at: chrono::DateTime<chrono::Utc>,
    document_version: u64,
    body: String,
    score: f64,
}

impl From<SearchResponseEntry> for SearchResult {
    fn from(e: SearchResponseEntry) -> Self {
        SearchResult {
            chunk_id: e.chunk_id,
            article_id: e.article_id,
            url: e.url,
            title: e.title,
            published_at: e.published_at,
            document_version: e.document_version,
            body: e.body,
            score: e.score,
        }
    }
}

#[async_trait]
impl ChunkRepository for HttpChunkRepository {
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let url = format!("{}/search", self.config.base_url);
        let request = SearchRequest {
            vector,
            limit,
            article_ids: None,
        };

        let req = auth(self.http.post(&url).json(&request), &self.config);
        let response = check_status(req.send().await?, "chunk repository").await?;
        let parsed: Vec<SearchResponseEntry> = response.json().await?;

        Ok(parsed.into_iter().map(SearchResult::from).collect())
    }

    async fn search_within_articles(
        &self,
        vector: &[f32],
        article_ids: &[String],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let url = format!("{}/search", self.config.base_url);
        let request = SearchRequest {
            vector,
            limit,
            article_ids: Some(article_ids),
        };

        let req = auth(self.http.post(&url).json(&request), &self.config);
        let response = check_status(req.send().await?, "chunk repository").await?;
        let parsed: Vec<SearchResponseEntry> = response.json().await?;

        Ok(parsed.into_iter().map(SearchResult::from).collect())
    }
}

/// A general-purpose OpenAI/vLLM-compatible chat completion client.
pub struct VllmClient {
    http: reqwest::Client,
    config: ServiceConfig,
}

impl VllmClient {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let http = build_client(&config)?;
        Ok(Self { http, config })
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageOwned,
}

#[derive(Deserialize)]
struct ChatMessageOwned {
    content: String,
}

#[async_trait]
impl LlmClient for VllmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.3,
        };

        let req = auth(self.http.post(&url).json(&request), &self.config);
        let response = check_status(req.send().await?, "LLM service").await?;
        let parsed: ChatResponse = response.json().await?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PipelineError::ExternalError("no choices in LLM response".to_string()))
    }
}

/// Purpose-built query expansion service: POSTs the raw query, receives one
/// rewrite per line.
pub struct HttpQueryExpander {
    http: reqwest::Client,
    config: ServiceConfig,
}

impl HttpQueryExpander {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let http = build_client(&config)?;
        Ok(Self { http, config })
    }
}

#[derive(Serialize)]
struct ExpandRequest<'a> {
    query: &'a str,
}

#[derive(Deserialize)]
struct ExpandResponse {
    rewrites: Vec<String>,
}

#[async_trait]
impl QueryExpander for HttpQueryExpander {
    async fn expand(&self, query: &str) -> Result<Vec<String>> {
        let url = format!("{}/expand", self.config.base_url);
        let request = ExpandRequest { query };

        let req = auth(self.http.post(&url).json(&request), &self.config);
        let response = check_status(req.send().await?, "query expansion service").await?;
        let parsed: ExpandResponse = response.json().await?;

        Ok(parsed
            .rewrites
            .into_iter()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }
}

/// External tag/search client.
pub struct HttpTagSearchClient {
    http: reqwest::Client,
    config: ServiceConfig,
}

impl HttpTagSearchClient {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let http = build_client(&config)?;
        Ok(Self { http, config })
    }
}

#[derive(Serialize)]
struct TagSearchRequest<'a> {
    query: &'a str,
}

#[derive(Deserialize)]
struct TagSearchResponseEntry {
    article_id: String,
    tags: Vec<String>,
}

#[async_trait]
impl TagSearchClient for HttpTagSearchClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let url = format!("{}/tags", self.config.base_url);
        let request = TagSearchRequest { query };

        let req = auth(self.http.post(&url).json(&request), &self.config);
        let response = check_status(req.send().await?, "tag search service").await?;
        let parsed: Vec<TagSearchResponseEntry> = response.json().await?;

        Ok(parsed
            .into_iter()
            .map(|e| SearchHit {
                article_id: e.article_id,
                tags: e.tags,
            })
            .collect())
    }
}

/// Cross-encoder reranker, backed by a general-purpose [`LlmClient`] prompted
/// to score candidates.
pub struct HttpReranker {
    client: std::sync::Arc<dyn LlmClient>,
    model_name: String,
}

impl HttpReranker {
    pub fn new(client: std::sync::Arc<dyn LlmClient>, model_name: impl Into<String>) -> Self {
        Self {
            client,
            model_name: model_name.into(),
        }
    }
}

fn build_reranking_prompt(query: &str, candidates: &[RerankCandidate]) -> String {
    let mut prompt = format!(
        "Score these documents for relevance to the query. Rate from 0.0 (not relevant) to 1.0 (highly relevant).\n\nQuery: \"{query}\"\n\nDocuments:\n"
    );

    for candidate in candidates {
        let text = if candidate.text.len() > 500 {
            &candidate.text[..500]
        } else {
            &candidate.text
        };
        prompt.push_str(&format!("\nID: {}\nText: {}\n", candidate.chunk_id, text));
    }

    prompt.push_str(
        "\nOutput JSON only: {\"scores\": [{\"id\": \"...\", \"score\": 0.0-1.0}, ...]}",
    );
    prompt
}

#[derive(Deserialize)]
struct RerankingResponse {
    scores: Vec<RerankingScoreEntry>,
}

#[derive(Deserialize)]
struct RerankingScoreEntry {
    id: uuid::Uuid,
    score: f64,
}

fn parse_reranking_response(response: &str) -> Result<Vec<RerankScore>> {
    let json_str = match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if end >= start => &response[start..=end],
        _ => {
            return Err(PipelineError::ExternalError(
                "reranker response contained no JSON object".to_string(),
            ))
        }
    };

    let parsed: RerankingResponse = serde_json::from_str(json_str)?;
    Ok(parsed
        .scores
        .into_iter()
        .map(|e| RerankScore {
            chunk_id: e.id,
            score: e.score,
        })
        .collect())
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, candidates: &[RerankCandidate]) -> Result<Vec<RerankScore>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = build_reranking_prompt(query, candidates);
        let response = self.client.complete(&prompt).await?;
        parse_reranking_response(&response)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
