//! Entity-token scanning and retrieval-directive trigger matching (spec §4.6
//! steps 5–6).

use regex::Regex;

use crate::config::DirectiveTrigger;

fn word_boundary_pattern(token: &str) -> Option<Regex> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(token))).ok()
}

/// Returns the configured entity tokens that appear (whole-word,
/// case-insensitive) in `prompt`, preserving configuration order and
/// dropping duplicates.
#[must_use]
pub fn matched_entities(prompt: &str, entities: &[String]) -> Vec<String> {
    entities
        .iter()
        .filter(|token| word_boundary_pattern(token).is_some_and(|re| re.is_match(prompt)))
        .cloned()
        .collect()
}

/// Returns the triggers whose keywords match `prompt`, in configuration
/// order, capped at `max_per_prompt` (spec §4.6 step 6).
#[must_use]
pub fn fired_triggers<'a>(
    prompt: &str,
    triggers: &'a [DirectiveTrigger],
    max_per_prompt: usize,
) -> Vec<&'a DirectiveTrigger> {
    let lower = prompt.to_lowercase();
    triggers
        .iter()
        .filter(|t| t.keywords.iter().any(|k| lower.contains(&k.to_lowercase())))
        .take(max_per_prompt)
        .collect()
}
