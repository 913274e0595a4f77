//! Configuration management
//!
//! [`PipelineConfig`] carries everything the five stages read at start (page
//! sizes, RRF constant, quotas, feature toggles). [`ServiceConfig`] is the
//! matching shape for each outbound HTTP client (base URL, model, timeout),
//! separating "what the algorithm does" from "how we reach the service
//! that backs it."

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Config recognized by the pipeline itself (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Dense search page size. Default 50.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// BM25 result page size. Default 50.
    #[serde(default = "default_bm25_limit")]
    pub bm25_limit: usize,

    /// Reciprocal Rank Fusion constant `k`. Default 60.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,

    /// Whether BM25 is queried and fused with the original-query dense
    /// results.
    #[serde(default)]
    pub hybrid_enabled: bool,

    /// Whether the rerank stage runs at all.
    #[serde(default)]
    pub rerank_enabled: bool,

    /// Per-call reranker timeout, in milliseconds.
    #[serde(default = "default_rerank_timeout_ms")]
    pub rerank_timeout_ms: u64,

    /// Configured rerank candidate cap. Clamped against the internal
    /// `RERANK_CANDIDATE_CAP` hard guard in `stages::rerank` — see
    /// DESIGN.md Open Question 2.
    #[serde(default = "default_rerank_top_k")]
    pub rerank_top_k: usize,

    /// Number of original-query items to allocate.
    #[serde(default = "default_quota_original")]
    pub quota_original: usize,

    /// Number of expanded-bucket items to allocate.
    #[serde(default = "default_quota_expanded")]
    pub quota_expanded: usize,

    /// `true` selects dynamic (pure score) allocation; `false` selects
    /// legacy (quota + language-preference) allocation. Defaults to `true`
    /// per DESIGN.md Open Question 1.
    #[serde(default = "default_dynamic_allocation")]
    pub dynamic_language_allocation_enabled: bool,
}

/// Mirror of [`PipelineConfig`] with every field optional, used to deserialize
/// a YAML overlay file. A field left out of the file stays `None` and is
/// never applied, so it can't clobber an env-derived value with a default.
#[derive(Debug, Clone, Default, Deserialize)]
struct PipelineConfigOverrides {
    #[serde(default)]
    search_limit: Option<usize>,
    #[serde(default)]
    bm25_limit: Option<usize>,
    #[serde(default)]
    rrf_k: Option<f64>,
    #[serde(default)]
    hybrid_enabled: Option<bool>,
    #[serde(default)]
    rerank_enabled: Option<bool>,
    #[serde(default)]
    rerank_timeout_ms: Option<u64>,
    #[serde(default)]
    rerank_top_k: Option<usize>,
    #[serde(default)]
    quota_original: Option<usize>,
    #[serde(default)]
    quota_expanded: Option<usize>,
    #[serde(default)]
    dynamic_language_allocation_enabled: Option<bool>,
}

fn default_search_limit() -> usize {
    50
}
fn default_bm25_limit() -> usize {
    50
}
fn default_rrf_k() -> f64 {
    60.0
}
fn default_rerank_timeout_ms() -> u64 {
    3_000
}
fn default_rerank_top_k() -> usize {
    30
}
fn default_quota_original() -> usize {
    5
}
fn default_quota_expanded() -> usize {
    5
}
fn default_dynamic_allocation() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
            bm25_limit: default_bm25_limit(),
            rrf_k: default_rrf_k(),
            hybrid_enabled: false,
            rerank_enabled: false,
            rerank_timeout_ms: default_rerank_timeout_ms(),
            rerank_top_k: default_rerank_top_k(),
            quota_original: default_quota_original(),
            quota_expanded: default_quota_expanded(),
            dynamic_language_allocation_enabled: default_dynamic_allocation(),
        }
    }
}

impl PipelineConfig {
    /// Load from environment variables layered over defaults, then
    /// optionally merge a YAML file at `path` if given. YAML keys that are
    /// present overlay the env-derived value for that field; keys the file
    /// omits leave the env-derived value untouched (they do not fall back
    /// to the struct default, which would silently discard an env override).
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let mut config = Self::from_env();
        if let Some(path) = path {
            if path.exists() {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    crate::error::PipelineError::Config(format!(
                        "failed to read {}: {e}",
                        path.display()
                    ))
                })?;
                let overrides: PipelineConfigOverrides = serde_yaml::from_str(&content)?;
                config.apply(overrides);
            }
        }
        Ok(config)
    }

    fn apply(&mut self, overrides: PipelineConfigOverrides) {
        if let Some(v) = overrides.search_limit {
            self.search_limit = v;
        }
        if let Some(v) = overrides.bm25_limit {
            self.bm25_limit = v;
        }
        if let Some(v) = overrides.rrf_k {
            self.rrf_k = v;
        }
        if let Some(v) = overrides.hybrid_enabled {
            self.hybrid_enabled = v;
        }
        if let Some(v) = overrides.rerank_enabled {
            self.rerank_enabled = v;
        }
        if let Some(v) = overrides.rerank_timeout_ms {
            self.rerank_timeout_ms = v;
        }
        if let Some(v) = overrides.rerank_top_k {
            self.rerank_top_k = v;
        }
        if let Some(v) = overrides.quota_original {
            self.quota_original = v;
        }
        if let Some(v) = overrides.quota_expanded {
            self.quota_expanded = v;
        }
        if let Some(v) = overrides.dynamic_language_allocation_enabled {
            self.dynamic_language_allocation_enabled = v;
        }
    }

    fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("RAGSTAGE_SEARCH_LIMIT") {
            if let Ok(v) = v.parse() {
                config.search_limit = v;
            }
        }
        if let Ok(v) = std::env::var("RAGSTAGE_BM25_LIMIT") {
            if let Ok(v) = v.parse() {
                config.bm25_limit = v;
            }
        }
        if let Ok(v) = std::env::var("RAGSTAGE_RRF_K") {
            if let Ok(v) = v.parse() {
                config.rrf_k = v;
            }
        }
        if let Ok(v) = std::env::var("RAGSTAGE_HYBRID_ENABLED") {
            config.hybrid_enabled = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("RAGSTAGE_RERANK_ENABLED") {
            config.rerank_enabled = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("RAGSTAGE_DYNAMIC_ALLOCATION") {
            config.dynamic_language_allocation_enabled =
                v == "1" || v.eq_ignore_ascii_case("true");
        }
        config
    }
}

/// Configuration for a single outbound HTTP collaborator (vector encoder,
/// BM25 gateway, chunk repository, query expander, tag search, reranker's
/// backing LLM).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the service.
    pub base_url: String,

    /// Model name, where applicable (embedding model, chat model).
    #[serde(default = "default_model")]
    pub model: String,

    /// API key, for authenticated services.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "default".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn from_env(base_url_var: &str, model_var: &str, api_key_var: &str) -> Option<Self> {
        let base_url = std::env::var(base_url_var).ok()?;
        Some(Self {
            base_url,
            model: std::env::var(model_var).unwrap_or_else(|_| default_model()),
            api_key: std::env::var(api_key_var).ok(),
            timeout_secs: default_timeout_secs(),
        })
    }
}
