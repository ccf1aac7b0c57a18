//! Context compaction and progressive disclosure.
//!
//! List-style operations hand LLM callers cheap projections of a prompt instead
//! of its full body. Three disclosure stages exist:
//!
//! 1. `metadata` - id, name, category, tags
//! 2. `summary`  - metadata plus description
//! 3. `full`     - the whole record
//!
//! "Tokens" here are always the `ceil(chars / 4)` estimate, never a real tokenizer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::models::Prompt;

/// Default maximum summary length, in characters.
pub const DEFAULT_SUMMARY_LENGTH: usize = 500;

/// Default token threshold above which content is considered oversized.
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 1000;

/// Appended whenever a summary is cut short.
pub const ELLIPSIS: &str = "...";

/// How much of the content feeds a compacted prompt's summary.
const SUMMARY_CONTENT_PREFIX: usize = 200;

const SENTENCE_TERMINATORS: [&str; 4] = [". ", ".\n", "! ", "? "];

/// Metadata view of a prompt used by list operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompactedPrompt {
    pub id: String,
    pub name: String,
    pub category: String,
    pub tags: Vec<String>,
    pub summary: String,
    pub has_full_content: bool,
    pub estimated_tokens: usize,
}

/// Estimates the token count of `text` as `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Shortens `content` to at most `max_length` characters plus [`ELLIPSIS`].
///
/// Prefers cutting after the last sentence terminator when it lies beyond half
/// of `max_length`, then at the last space beyond 70%, and otherwise cuts hard.
pub fn extract_summary(content: &str, max_length: usize) -> String {
    if content.chars().count() <= max_length {
        return content.to_string();
    }

    let truncated = take_chars(content, max_length);
    let limit = max_length as f64;

    let sentence_end = SENTENCE_TERMINATORS
        .iter()
        .filter_map(|terminator| truncated.rfind(terminator))
        .max();
    if let Some(end) = sentence_end {
        if char_offset(truncated, end) as f64 > limit * 0.5 {
            // Keep the terminator itself; all terminators start with one ASCII byte.
            return format!("{}{ELLIPSIS}", &truncated[..=end]);
        }
    }

    if let Some(space) = truncated.rfind(' ') {
        if char_offset(truncated, space) as f64 > limit * 0.7 {
            return format!("{}{ELLIPSIS}", &truncated[..space]);
        }
    }

    format!("{truncated}{ELLIPSIS}")
}

/// Projects a prompt onto its compacted view.
pub fn compact_prompt(prompt: &Prompt) -> CompactedPrompt {
    let preview = take_chars(&prompt.content, SUMMARY_CONTENT_PREFIX);
    let source = format!("{}\n\n{}", prompt.description, preview);

    CompactedPrompt {
        id: prompt.id.clone(),
        name: prompt.name.clone(),
        category: prompt.category.clone(),
        tags: prompt.tags.clone(),
        summary: extract_summary(&source, DEFAULT_SUMMARY_LENGTH),
        has_full_content: true,
        estimated_tokens: estimate_tokens(&prompt.content),
    }
}

pub fn compact_prompt_list(prompts: &[Prompt]) -> Vec<CompactedPrompt> {
    prompts.iter().map(compact_prompt).collect()
}

/// True when the estimated token count of `content` exceeds `threshold`.
pub fn needs_compaction(content: &str, threshold: usize) -> bool {
    estimate_tokens(content) > threshold
}

/// One-entry markdown rendering of a prompt's metadata.
pub fn format_prompt_metadata(prompt: &CompactedPrompt) -> String {
    let tags = if prompt.tags.is_empty() {
        "none".to_string()
    } else {
        prompt.tags.join(", ")
    };
    format!(
        "• **{}** ({})\n  Category: {} | Tags: {} | ~{} tokens",
        prompt.name, prompt.id, prompt.category, tags, prompt.estimated_tokens
    )
}

/// Renders a prompt list with metadata only.
pub fn format_prompt_list_compact(prompts: &[CompactedPrompt]) -> String {
    if prompts.is_empty() {
        return "No prompts found.".to_string();
    }

    let list: Vec<String> = prompts.iter().map(format_prompt_metadata).collect();
    format!(
        "📚 **{} prompt(s) found**\n\n{}\n\n💡 Use `get_prompt` with ID to fetch full content.",
        prompts.len(),
        list.join("\n")
    )
}

/// Disclosure tier requested for a single prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextStage {
    Metadata,
    Summary,
    #[default]
    Full,
}

impl ContextStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextStage::Metadata => "metadata",
            ContextStage::Summary => "summary",
            ContextStage::Full => "full",
        }
    }
}

impl fmt::Display for ContextStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextStage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "metadata" => Ok(ContextStage::Metadata),
            "summary" => Ok(ContextStage::Summary),
            "full" => Ok(ContextStage::Full),
            other => Err(Error::InvalidStage(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PromptMetadata {
    pub id: String,
    pub name: String,
    pub category: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PromptOverview {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
}

/// A prompt projected onto a [`ContextStage`], tagged with `_stage` on the wire.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "_stage", rename_all = "lowercase")]
pub enum StagedPrompt {
    Metadata(PromptMetadata),
    Summary(PromptOverview),
    Full(Prompt),
}

pub fn load_prompt_at_stage(prompt: &Prompt, stage: ContextStage) -> StagedPrompt {
    match stage {
        ContextStage::Metadata => StagedPrompt::Metadata(PromptMetadata {
            id: prompt.id.clone(),
            name: prompt.name.clone(),
            category: prompt.category.clone(),
            tags: prompt.tags.clone(),
        }),
        ContextStage::Summary => StagedPrompt::Summary(PromptOverview {
            id: prompt.id.clone(),
            name: prompt.name.clone(),
            description: prompt.description.clone(),
            category: prompt.category.clone(),
            tags: prompt.tags.clone(),
        }),
        ContextStage::Full => StagedPrompt::Full(prompt.clone()),
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompactionStats {
    pub original_tokens: usize,
    pub compacted_tokens: usize,
    pub reduction_percent: i64,
    pub items_processed: usize,
}

/// Aggregates token counts before and after compaction.
///
/// `reduction_percent` is 0 when the originals hold no tokens.
pub fn calculate_compaction_stats<S: AsRef<str>>(original: &[S], compacted: &[S]) -> CompactionStats {
    let original_tokens: usize = original.iter().map(|s| estimate_tokens(s.as_ref())).sum();
    let compacted_tokens: usize = compacted.iter().map(|s| estimate_tokens(s.as_ref())).sum();

    let reduction_percent = if original_tokens == 0 {
        0
    } else {
        ((1.0 - compacted_tokens as f64 / original_tokens as f64) * 100.0).round() as i64
    };

    CompactionStats {
        original_tokens,
        compacted_tokens,
        reduction_percent,
        items_processed: original.len(),
    }
}

/// Prefix of `text` holding at most `n` characters.
fn take_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn char_offset(text: &str, byte_idx: usize) -> usize {
    text[..byte_idx].chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewPrompt;

    fn prompt(description: &str, content: &str) -> Prompt {
        Prompt::new(NewPrompt {
            name: "A".to_string(),
            description: description.to_string(),
            content: content.to_string(),
            category: "cat".to_string(),
            tags: vec!["t1".to_string()],
        })
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        // Counted in characters, not bytes
        assert_eq!(estimate_tokens("ção!"), 1);
    }

    #[test]
    fn test_extract_summary_identity_when_short() {
        assert_eq!(extract_summary("short text", 500), "short text");
        assert_eq!(extract_summary("exactly15chars!", 15), "exactly15chars!");
    }

    #[test]
    fn test_extract_summary_cuts_at_sentence() {
        assert_eq!(
            extract_summary("Hello world. This is a test.", 15),
            "Hello world...."
        );
    }

    #[test]
    fn test_extract_summary_falls_back_to_word_boundary() {
        // No terminator; last space at char 17 of the 20-char window (> 14)
        let content = "aaaa bbbb cccc dddd eeee ffff";
        assert_eq!(extract_summary(content, 20), "aaaa bbbb cccc dddd...");
    }

    #[test]
    fn test_extract_summary_sentence_too_early_uses_word() {
        // ". " at char 2 is before the 50% mark
        let content = "Hi. abcdefgh ijklmnop qrstuvwx";
        assert_eq!(extract_summary(content, 24), "Hi. abcdefgh ijklmnop...");
    }

    #[test]
    fn test_extract_summary_hard_cut() {
        let content = "x".repeat(40);
        assert_eq!(extract_summary(&content, 10), format!("{}...", "x".repeat(10)));
    }

    #[test]
    fn test_extract_summary_respects_char_boundaries() {
        let content = "é".repeat(30);
        let summary = extract_summary(&content, 10);
        assert_eq!(summary, format!("{}...", "é".repeat(10)));
    }

    #[test]
    fn test_compaction_shrinks() {
        let content = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let summary = extract_summary(&content, DEFAULT_SUMMARY_LENGTH);
        assert!(summary.chars().count() <= DEFAULT_SUMMARY_LENGTH + ELLIPSIS.len());
        assert!(estimate_tokens(&summary) <= estimate_tokens(&content));
    }

    #[test]
    fn test_compact_prompt() {
        let p = prompt("Describes things", &"y".repeat(1000));
        let compacted = compact_prompt(&p);

        assert_eq!(compacted.id, p.id);
        assert_eq!(compacted.name, "A");
        assert!(compacted.has_full_content);
        assert_eq!(compacted.estimated_tokens, 250);
        assert_eq!(
            compacted.summary,
            format!("Describes things\n\n{}", "y".repeat(200))
        );
    }

    #[test]
    fn test_needs_compaction() {
        assert!(!needs_compaction(&"a".repeat(4000), DEFAULT_COMPACTION_THRESHOLD));
        assert!(needs_compaction(&"a".repeat(4001), DEFAULT_COMPACTION_THRESHOLD));
    }

    #[test]
    fn test_stage_projection() {
        let p = prompt("secret description", "secret content");

        let metadata = serde_json::to_value(load_prompt_at_stage(&p, ContextStage::Metadata)).unwrap();
        assert_eq!(metadata["_stage"], "metadata");
        assert!(metadata.get("content").is_none());
        assert!(metadata.get("description").is_none());

        let summary = serde_json::to_value(load_prompt_at_stage(&p, ContextStage::Summary)).unwrap();
        assert_eq!(summary["description"], "secret description");
        assert!(summary.get("content").is_none());

        assert_eq!(
            load_prompt_at_stage(&p, ContextStage::Full),
            StagedPrompt::Full(p.clone())
        );
    }

    #[test]
    fn test_context_stage_parse() {
        assert_eq!("metadata".parse::<ContextStage>().unwrap(), ContextStage::Metadata);
        assert_eq!("Summary".parse::<ContextStage>().unwrap(), ContextStage::Summary);
        assert!(matches!(
            "everything".parse::<ContextStage>(),
            Err(Error::InvalidStage(_))
        ));
        assert_eq!(ContextStage::default(), ContextStage::Full);
    }

    #[test]
    fn test_compaction_stats() {
        let original = vec!["a".repeat(400), "b".repeat(400)];
        let compacted = vec!["a".repeat(40), "b".repeat(40)];
        let stats = calculate_compaction_stats(&original, &compacted);

        assert_eq!(stats.original_tokens, 200);
        assert_eq!(stats.compacted_tokens, 20);
        assert_eq!(stats.reduction_percent, 90);
        assert_eq!(stats.items_processed, 2);
    }

    #[test]
    fn test_compaction_stats_empty_original() {
        let empty: Vec<String> = Vec::new();
        let stats = calculate_compaction_stats(&empty, &empty);
        assert_eq!(stats.reduction_percent, 0);
        assert_eq!(stats.items_processed, 0);
    }

    #[test]
    fn test_format_prompt_list_compact() {
        assert_eq!(format_prompt_list_compact(&[]), "No prompts found.");

        let p = prompt("secret description", "secret content");
        let text = format_prompt_list_compact(&compact_prompt_list(std::slice::from_ref(&p)));
        assert!(text.contains("1 prompt(s) found"));
        assert!(text.contains(&format!("**A** ({})", p.id)));
        assert!(text.contains("Tags: t1"));
        assert!(!text.contains("secret"));
    }
}
