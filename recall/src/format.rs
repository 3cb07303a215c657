//! Context-block rendering (spec §4.6 step 9).

use memnexus_core::Fact;

use crate::config::{FormatMode, RecallConfig};

/// Rough token estimate, matching the ~4-chars-per-token approximation used
/// elsewhere in the workspace for budget accounting without a real tokenizer.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn render_bullet(fact: &Fact, mode: FormatMode, max_chars: usize) -> String {
    match mode {
        FormatMode::Full => format!("- {}", truncate_chars(&fact.text, max_chars)),
        FormatMode::Short => {
            let body = fact.summary.as_deref().unwrap_or(&fact.text);
            format!("- {}", truncate_chars(body, max_chars.min(120)))
        }
        FormatMode::Minimal => {
            if let (Some(entity), Some(key), Some(value)) =
                (fact.entity.as_deref(), fact.key.as_deref(), fact.value.as_deref())
            {
                format!("- {entity}.{key} = {value}")
            } else {
                format!("- {}", truncate_chars(&fact.text, max_chars.min(60)))
            }
        }
        FormatMode::Progressive | FormatMode::ProgressiveHybrid => unreachable!(),
    }
}

fn render_index_line(position: usize, fact: &Fact) -> String {
    let title = truncate_chars(&fact.text, 80);
    let cost = estimate_tokens(&fact.text);
    format!("{position}. [{}] {title} (~{cost}t)", fact.id)
}

/// Renders `full`/`short`/`minimal`: bullets accumulate until `max_tokens` is
/// exhausted. When `summarize` is `Some`, the already-generated summary of
/// the overflow is appended as one final bullet instead of silently dropping it.
///
/// Returns the rendered block and the ids actually included (the summarized
/// overflow ids are NOT included, since their bodies were not injected verbatim).
#[must_use]
pub fn render_bulleted(
    candidates: &[Fact],
    mode: FormatMode,
    max_tokens: usize,
    max_chars: usize,
    overflow_summary: Option<&str>,
) -> (String, Vec<String>) {
    let mut lines = Vec::new();
    let mut included = Vec::new();
    let mut used = 0usize;

    let mut overflow_start = candidates.len();
    for (idx, fact) in candidates.iter().enumerate() {
        let bullet = render_bullet(fact, mode, max_chars);
        let cost = estimate_tokens(&bullet);
        if used + cost > max_tokens && !lines.is_empty() {
            overflow_start = idx;
            break;
        }
        used += cost;
        lines.push(bullet);
        included.push(fact.id.clone());
    }

    if overflow_start < candidates.len() {
        if let Some(summary) = overflow_summary {
            lines.push(format!("- (summarized) {summary}"));
        }
    }

    (lines.join("\n"), included)
}

/// Renders a `progressive` index: one line per included candidate, a
/// position number and token-cost estimate, no bodies (spec §4.6 step 9).
#[must_use]
pub fn render_progressive_index(candidates: &[Fact], index_max_tokens: usize) -> (String, Vec<String>) {
    let mut lines = Vec::new();
    let mut included = Vec::new();
    let mut used = 0usize;

    for (idx, fact) in candidates.iter().enumerate() {
        let line = render_index_line(idx + 1, fact);
        let cost = estimate_tokens(&line);
        if used + cost > index_max_tokens && !lines.is_empty() {
            break;
        }
        used += cost;
        lines.push(line);
        included.push(fact.id.clone());
    }

    (lines.join("\n"), included)
}

/// Fraction of `max_tokens` reserved for the pinned subset under
/// `progressive_hybrid` (spec §4.6 step 9).
const PINNED_BUDGET_FRACTION: f32 = 0.6;

/// Renders `progressive_hybrid`: the pinned subset (permanent, or
/// `recallCount >= pinnedThreshold`) is injected in full within 60% of
/// `max_tokens`; the remainder is indexed like [`FormatMode::Progressive`].
#[must_use]
pub fn render_progressive_hybrid(
    candidates: &[Fact],
    cfg: &RecallConfig,
) -> (String, Vec<String>) {
    let pinned_budget = (cfg.max_tokens as f32 * PINNED_BUDGET_FRACTION) as usize;

    let (pinned, rest): (Vec<Fact>, Vec<Fact>) = candidates.iter().cloned().partition(|f| {
        matches!(f.decay_class, memnexus_core::DecayClass::Permanent) || f.recall_count >= cfg.pinned_threshold
    });

    let (pinned_block, mut included) =
        render_bulleted(&pinned, FormatMode::Full, pinned_budget, cfg.max_per_memory_chars, None);
    let (index_block, index_included) = render_progressive_index(&rest, cfg.progressive_index_max_tokens);
    included.extend(index_included);

    let mut block = pinned_block;
    if !index_block.is_empty() {
        if !block.is_empty() {
            block.push('\n');
        }
        block.push_str(&index_block);
    }
    (block, included)
}
