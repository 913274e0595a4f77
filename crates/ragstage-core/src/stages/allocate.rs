//! Stage 5: select the final context items from the two fused buckets.
//!
//! Pure and synchronous — no collaborator calls, no mutation of
//! [`StageContext`] — so it is naturally idempotent when applied twice to
//! the same stage state.

use crate::context::StageContext;
use crate::domain::ContextItem;
use std::cmp::Ordering;
use std::collections::HashSet;
use uuid::Uuid;

pub fn run(ctx: &StageContext) -> Vec<ContextItem> {
    let total_quota = ctx.config.quota_original + ctx.config.quota_expanded;
    if ctx.config.dynamic_language_allocation_enabled {
        dynamic_allocate(&ctx.hits_original, &ctx.hits_expanded, total_quota)
    } else {
        legacy_allocate(
            &ctx.hits_original,
            &ctx.hits_expanded,
            ctx.config.quota_original,
            ctx.config.quota_expanded,
        )
    }
}

/// Merge both buckets, dedup by chunk id (original wins on conflict since
/// it is walked first), then sort descending by score and truncate.
fn dynamic_allocate(original: &[ContextItem], expanded: &[ContextItem], total_quota: usize) -> Vec<ContextItem> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for item in original.iter().chain(expanded.iter()) {
        if seen.insert(item.chunk_id) {
            merged.push(item.clone());
        }
    }

    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    merged.truncate(total_quota);
    merged
}

/// Up to `quota_original` items from `original` in order, then up to
/// `quota_expanded` items from `expanded`: first a pass that only accepts
/// non-Japanese titles, then a pass that accepts anything remaining.
fn legacy_allocate(
    original: &[ContextItem],
    expanded: &[ContextItem],
    quota_original: usize,
    quota_expanded: usize,
) -> Vec<ContextItem> {
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut output = Vec::new();

    let mut original_count = 0;
    for item in original {
        if original_count >= quota_original {
            break;
        }
        if seen.insert(item.chunk_id) {
            output.push(item.clone());
            original_count += 1;
        }
    }

    let mut expanded_count = 0;
    for item in expanded {
        if expanded_count >= quota_expanded {
            break;
        }
        if seen.contains(&item.chunk_id) || is_japanese(&item.title) {
            continue;
        }
        seen.insert(item.chunk_id);
        output.push(item.clone());
        expanded_count += 1;
    }

    for item in expanded {
        if expanded_count >= quota_expanded {
            break;
        }
        if seen.contains(&item.chunk_id) {
            continue;
        }
        seen.insert(item.chunk_id);
        output.push(item.clone());
        expanded_count += 1;
    }

    output
}

/// Any hiragana (U+3040-U+309F), katakana (U+30A0-U+30FF), or kanji
/// (U+4E00-U+9FAF) rune makes the text "Japanese".
fn is_japanese(text: &str) -> bool {
    text.chars().any(|c| {
        let cp = c as u32;
        (0x3040..=0x309F).contains(&cp) || (0x30A0..=0x30FF).contains(&cp) || (0x4E00..=0x9FAF).contains(&cp)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn item(id: Uuid, title: &str, score: f64) -> ContextItem {
        ContextItem {
            chunk_id: id,
            chunk_text: "text".into(),
            url: "https://example.com".into(),
            title: title.into(),
            published_at: "2024-01-01T00:00:00Z".into(),
            score,
            document_version: 1,
        }
    }

    #[test]
    fn is_japanese_detection() {
        assert!(!is_japanese("English"));
        assert!(is_japanese("\u{65e5}\u{672c}\u{8a9e}"));
        assert!(is_japanese("Mixed\u{65e5}\u{672c}"));
        assert!(!is_japanese(""));
    }

    #[test]
    fn dynamic_mode_sorts_by_score_and_dedups() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let original = vec![item(a, "A", 0.5)];
        let expanded = vec![item(b, "B", 0.9), item(a, "A dup", 0.5)];

        let result = dynamic_allocate(&original, &expanded, 5);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].chunk_id, b);
        assert_eq!(result[1].chunk_id, a);
    }

    #[test]
    fn dynamic_mode_truncates_to_quota() {
        let items: Vec<ContextItem> = (0..10).map(|i| item(Uuid::new_v4(), "t", i as f64)).collect();
        let result = dynamic_allocate(&items, &[], 3);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn legacy_mode_prefers_english_in_expanded_bucket() {
        let o = Uuid::new_v4();
        let j1 = Uuid::new_v4();
        let e = Uuid::new_v4();
        let j2 = Uuid::new_v4();

        let original = vec![item(o, "Original", 0.95)];
        let expanded = vec![
            item(j1, "\u{65e5}\u{672c}\u{8a9e}", 0.90),
            item(e, "English", 0.85),
            item(j2, "\u{3082}\u{3046}\u{4e00}\u{3064}", 0.80),
        ];

        let result = legacy_allocate(&original, &expanded, 1, 2);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].chunk_id, o);
        assert_eq!(result[1].chunk_id, e);
        assert_eq!(result[2].chunk_id, j1);
    }

    #[test]
    fn legacy_mode_falls_back_to_japanese_when_no_english_left() {
        let o = Uuid::new_v4();
        let j1 = Uuid::new_v4();
        let j2 = Uuid::new_v4();

        let original = vec![item(o, "Original", 0.95)];
        let expanded = vec![
            item(j1, "\u{65e5}\u{672c}\u{8a9e}", 0.90),
            item(j2, "\u{3082}\u{3046}\u{4e00}\u{3064}", 0.80),
        ];

        let result = legacy_allocate(&original, &expanded, 1, 2);
        assert_eq!(result.len(), 3);
        assert_eq!(result[1].chunk_id, j1);
        assert_eq!(result[2].chunk_id, j2);
    }

    #[test]
    fn output_never_exceeds_total_quota() {
        let original: Vec<ContextItem> = (0..10).map(|i| item(Uuid::new_v4(), "t", i as f64)).collect();
        let expanded: Vec<ContextItem> = (0..10).map(|i| item(Uuid::new_v4(), "t", i as f64)).collect();

        let mut ctx = StageContext::new("r1".into(), "q".into(), None, PipelineConfig::default());
        ctx.hits_original = original;
        ctx.hits_expanded = expanded;
        ctx.config.quota_original = 5;
        ctx.config.quota_expanded = 5;

        let result = run(&ctx);
        assert!(result.len() <= 10);
    }

    #[test]
    fn allocation_is_idempotent() {
        let original: Vec<ContextItem> = (0..3).map(|i| item(Uuid::new_v4(), "t", i as f64)).collect();
        let mut ctx = StageContext::new("r1".into(), "q".into(), None, PipelineConfig::default());
        ctx.hits_original = original;

        let first = run(&ctx);
        let second = run(&ctx);
        assert_eq!(first, second);
    }

    #[test]
    fn no_duplicate_chunk_ids_in_either_mode() {
        let shared = Uuid::new_v4();
        let mut ctx = StageContext::new("r1".into(), "q".into(), None, PipelineConfig::default());
        ctx.hits_original = vec![item(shared, "Original", 0.9)];
        ctx.hits_expanded = vec![item(shared, "Expanded", 0.8)];

        let dynamic = run(&ctx);
        assert_eq!(dynamic.len(), 1);

        ctx.config.dynamic_language_allocation_enabled = false;
        let legacy = run(&ctx);
        assert_eq!(legacy.len(), 1);
    }
}
