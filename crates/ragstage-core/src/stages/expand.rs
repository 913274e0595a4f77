//! Stage 1: produce the original-query embedding, a list of rewrite
//! queries, and a list of tag-derived reformulations.
//!
//! Three sub-tasks run concurrently under one `tokio::join!` barrier,
//! writing to disjoint [`StageContext`] fields so no lock is ever needed
//! inside the stage.

use crate::clients::traits::{LlmClient, QueryExpander, TagSearchClient, VectorEncoder};
use crate::context::StageContext;
use crate::error::{PipelineError, Result};
use std::collections::HashSet;
use tracing::warn;

const STAGE: &str = "expand";

/// Runs the three Stage 1 sub-tasks and writes their results into `ctx`.
/// Fails only when the original-query embedding call fails or returns empty.
pub async fn run(
    ctx: &mut StageContext,
    encoder: &dyn VectorEncoder,
    expander: &dyn QueryExpander,
    llm: &dyn LlmClient,
    tag_client: &dyn TagSearchClient,
) -> Result<()> {
    let query = ctx.query.clone();

    let (embedding, expanded, tags) = tokio::join!(
        embed_original(encoder, &query),
        expand_queries(expander, llm, &query),
        tag_search(tag_client, &query),
    );

    ctx.original_embedding = embedding?;
    ctx.expanded_queries = expanded;
    ctx.tag_queries = tags;
    Ok(())
}

async fn embed_original(encoder: &dyn VectorEncoder, query: &str) -> Result<Vec<f32>> {
    let batch = vec![query.to_string()];
    let mut vectors = encoder.encode(&batch).await?;
    match vectors.pop() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(PipelineError::stage(
            STAGE,
            "original-query embedding was empty",
        )),
    }
}

/// Today's date, formatted `YYYY-MM-DD`, for the expansion prompt's
/// `Current Date:` line.
fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

fn build_expansion_prompt(query: &str) -> String {
    format!(
        "Current Date: {date}\n\n\
         Rewrite the following search query into 3 to 5 diverse alternate phrasings \
         that would help retrieve more relevant documents. If the input is not in \
         English, translate it to English first. Output one rewrite per line. Do \
         not number the lines, use bullets, or add any explanation.\n\n\
         Query: {query}",
        date = today(),
        query = query
    )
}

fn parse_expansion_lines(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect()
}

/// Races the purpose-built expander against the general-purpose LLM; the
/// first source to return a non-empty rewrite list wins. If both fail or
/// return empty, the pipeline continues with no expansions.
async fn expand_queries(
    expander: &dyn QueryExpander,
    llm: &dyn LlmClient,
    query: &str,
) -> Vec<String> {
    let expander_fut = async { expander.expand(query).await };
    let llm_fut = async {
        llm.complete(&build_expansion_prompt(query))
            .await
            .map(|resp| parse_expansion_lines(&resp))
    };

    tokio::pin!(expander_fut);
    tokio::pin!(llm_fut);

    let mut expander_done = false;
    let mut llm_done = false;

    loop {
        tokio::select! {
            res = &mut expander_fut, if !expander_done => {
                expander_done = true;
                let rewrites = res.unwrap_or_default();
                if !rewrites.is_empty() {
                    return rewrites;
                }
            }
            res = &mut llm_fut, if !llm_done => {
                llm_done = true;
                let rewrites = res.unwrap_or_default();
                if !rewrites.is_empty() {
                    return rewrites;
                }
            }
        }
        if expander_done && llm_done {
            warn!(stage = STAGE, "both expansion sources returned no rewrites");
            return Vec::new();
        }
    }
}

/// Takes the top 3 tag-search hits, unions their tags, drops the raw query,
/// and dedups set-wise.
async fn tag_search(tag_client: &dyn TagSearchClient, query: &str) -> Vec<String> {
    let hits = match tag_client.search(query).await {
        Ok(hits) => hits,
        Err(err) => {
            warn!(stage = STAGE, error = %err, "tag search failed");
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    for hit in hits.into_iter().take(3) {
        for tag in hit.tags {
            if tag == query {
                continue;
            }
            if seen.insert(tag.clone()) {
                tags.push(tag);
            }
        }
    }
    tags
}
