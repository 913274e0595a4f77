//! End-to-end scenarios exercising the full five-stage pipeline through its
//! public `retrieve` entry point, using in-memory collaborators.

use chrono::Utc;
use ragstage_core::clients::mock::{
    MockBm25Searcher, MockChunkRepository, MockLlmClient, MockQueryExpander, MockReranker,
    MockTagSearchClient, MockVectorEncoder,
};
use ragstage_core::pipeline::PipelineClients;
use ragstage_core::{retrieve, Bm25Result, PipelineConfig, QueryInput, SearchResult};
use std::time::Duration;
use uuid::Uuid;

fn search_result(article_id: &str, title: &str, score: f64) -> SearchResult {
    SearchResult {
        chunk_id: Uuid::new_v4(),
        article_id: article_id.to_string(),
        url: "https://example.com".into(),
        title: title.into(),
        published_at: Utc::now(),
        document_version: 1,
        body: "body".into(),
        score,
    }
}

fn input(query: &str) -> QueryInput {
    QueryInput {
        query: query.to_string(),
        candidate_article_ids: None,
        retrieval_id: "r1".into(),
    }
}

#[tokio::test]
async fn scenario_1_single_query_no_expansion_no_bm25() {
    let c1 = search_result("A1", "Original Article", 0.95);
    let chunk_id = c1.chunk_id;

    let encoder = MockVectorEncoder::new(vec![0.1, 0.2]);
    let bm25 = MockBm25Searcher::new(vec![]);
    let repo = MockChunkRepository::new(vec![c1]);
    let expander = MockQueryExpander::new(vec![]);
    let llm = MockLlmClient::new("");
    let tags = MockTagSearchClient::new(vec![]);

    let clients = PipelineClients {
        vector_encoder: &encoder,
        bm25_searcher: Some(&bm25),
        chunk_repository: &repo,
        query_expander: &expander,
        llm_client: &llm,
        tag_search_client: &tags,
        reranker: None,
    };

    let output = retrieve(input("Q"), PipelineConfig::default(), &clients)
        .await
        .unwrap();

    assert_eq!(output.len(), 1);
    assert_eq!(output[0].chunk_id, chunk_id);
    assert_eq!(output[0].score, 0.95);
}

#[tokio::test]
async fn scenario_2_expanded_query_adds_one_hit() {
    let c1 = search_result("A1", "Original Article", 0.90);
    let c2 = search_result("A2", "Expanded Article", 0.85);
    let c1_id = c1.chunk_id;
    let c2_id = c2.chunk_id;

    let encoder = MockVectorEncoder::new(vec![0.1]);
    let repo = MockChunkRepository::sequenced(vec![vec![c1], vec![c2]]);
    let expander = MockQueryExpander::new(vec!["a rewrite".into()]);
    let llm = MockLlmClient::new("");
    let tags = MockTagSearchClient::new(vec![]);

    let clients = PipelineClients {
        vector_encoder: &encoder,
        bm25_searcher: None,
        chunk_repository: &repo,
        query_expander: &expander,
        llm_client: &llm,
        tag_search_client: &tags,
        reranker: None,
    };

    let mut config = PipelineConfig::default();
    config.quota_original = 5;
    config.quota_expanded = 5;

    let output = retrieve(input("Q"), config, &clients).await.unwrap();

    assert_eq!(output.len(), 2);
    assert_eq!(output[0].chunk_id, c1_id);
    assert_eq!(output[0].score, 0.90);
    assert_eq!(output[1].chunk_id, c2_id);
}

#[tokio::test]
async fn scenario_3_hybrid_bm25_fusion() {
    let c1 = search_result("A1", "Original Article", 0.90);
    let c1_id = c1.chunk_id;

    let encoder = MockVectorEncoder::new(vec![0.1]);
    let repo = MockChunkRepository::new(vec![c1]);
    let bm25 = MockBm25Searcher::new(vec![Bm25Result {
        article_id: "A1".into(),
        rank: 1,
        score: 10.5,
    }]);
    let expander = MockQueryExpander::new(vec![]);
    let llm = MockLlmClient::new("");
    let tags = MockTagSearchClient::new(vec![]);

    let clients = PipelineClients {
        vector_encoder: &encoder,
        bm25_searcher: Some(&bm25),
        chunk_repository: &repo,
        query_expander: &expander,
        llm_client: &llm,
        tag_search_client: &tags,
        reranker: None,
    };

    let mut config = PipelineConfig::default();
    config.hybrid_enabled = true;
    config.rrf_k = 60.0;

    let output = retrieve(input("Q"), config, &clients).await.unwrap();

    assert_eq!(output.len(), 1);
    assert_eq!(output[0].chunk_id, c1_id);
    let expected = 1.0 / 61.0 + 1.0 / 61.0;
    assert!((output[0].score - expected).abs() < 1e-6);
}

#[tokio::test]
async fn scenario_4_dedup_across_expansions() {
    let cx = search_result("A1", "Shared Article", 0.70);
    let cx_id = cx.chunk_id;

    let encoder = MockVectorEncoder::new(vec![0.1]);
    // The same chunk store returns Cx for every dense search issued.
    let repo = MockChunkRepository::new(vec![cx]);
    let expander = MockQueryExpander::new(vec!["rewrite one".into(), "rewrite two".into()]);
    let llm = MockLlmClient::new("");
    let tags = MockTagSearchClient::new(vec![]);

    let clients = PipelineClients {
        vector_encoder: &encoder,
        bm25_searcher: None,
        chunk_repository: &repo,
        query_expander: &expander,
        llm_client: &llm,
        tag_search_client: &tags,
        reranker: None,
    };

    let mut config = PipelineConfig::default();
    config.quota_original = 0;
    config.quota_expanded = 5;

    let output = retrieve(input("Q"), config, &clients).await.unwrap();

    let matches: Vec<_> = output.iter().filter(|i| i.chunk_id == cx_id).collect();
    assert_eq!(matches.len(), 1);
}

#[tokio::test]
async fn scenario_5_rerank_timeout_keeps_fusion_scores() {
    let a = search_result("A1", "A", 0.9);
    let b = search_result("A2", "B", 0.8);
    let a_id = a.chunk_id;
    let b_id = b.chunk_id;

    let encoder = MockVectorEncoder::new(vec![0.1]);
    let repo = MockChunkRepository::new(vec![a, b]);
    let expander = MockQueryExpander::new(vec![]);
    let llm = MockLlmClient::new("");
    let tags = MockTagSearchClient::new(vec![]);
    let reranker = MockReranker::delayed(vec![], Duration::from_millis(500));

    let clients = PipelineClients {
        vector_encoder: &encoder,
        bm25_searcher: None,
        chunk_repository: &repo,
        query_expander: &expander,
        llm_client: &llm,
        tag_search_client: &tags,
        reranker: Some(&reranker),
    };

    let mut config = PipelineConfig::default();
    config.rerank_enabled = true;
    config.rerank_timeout_ms = 20;

    let output = retrieve(input("Q"), config, &clients).await.unwrap();

    assert_eq!(output[0].chunk_id, a_id);
    assert_eq!(output[0].score, 0.9);
    assert_eq!(output[1].chunk_id, b_id);
    assert_eq!(output[1].score, 0.8);
}

#[tokio::test]
async fn scenario_6_legacy_allocation_prefers_english() {
    let original = search_result("A0", "Original", 0.95);
    let j1 = search_result("A1", "\u{65e5}\u{672c}\u{8a9e}", 0.90);
    let e = search_result("A2", "English", 0.85);
    let j2 = search_result("A3", "\u{3082}\u{3046}\u{4e00}\u{3064}", 0.80);

    let original_id = original.chunk_id;
    let j1_id = j1.chunk_id;
    let e_id = e.chunk_id;

    let encoder = MockVectorEncoder::new(vec![0.1]);
    let repo = MockChunkRepository::sequenced(vec![vec![original], vec![j1, e, j2]]);
    let expander = MockQueryExpander::new(vec!["rewrite one".into()]);
    let llm = MockLlmClient::new("");
    let tags = MockTagSearchClient::new(vec![]);

    let clients = PipelineClients {
        vector_encoder: &encoder,
        bm25_searcher: None,
        chunk_repository: &repo,
        query_expander: &expander,
        llm_client: &llm,
        tag_search_client: &tags,
        reranker: None,
    };

    let mut config = PipelineConfig::default();
    config.quota_original = 1;
    config.quota_expanded = 2;
    config.dynamic_language_allocation_enabled = false;

    let output = retrieve(input("Q"), config, &clients).await.unwrap();

    assert_eq!(output.len(), 3);
    assert_eq!(output[0].chunk_id, original_id);
    assert_eq!(output[1].chunk_id, e_id);
    assert_eq!(output[2].chunk_id, j1_id);
}
