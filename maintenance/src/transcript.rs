//! Session transcript parsing (spec §6.3): "line-delimited JSON records with
//! at least `{type: \"message\", message: {role, content}}` and tool-call
//! blocks. Best-effort parse; malformed lines are skipped silently."
//!
//! Feeds procedure extraction, reinforcement extraction, and self-correction
//! scanning — each walks the same parsed turn sequence looking for a
//! different signal.

use memnexus_core::{ProcedureStep, ProcedureType};
use serde::Deserialize;
use serde_json::Value;

/// One parsed transcript line.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptLine {
    /// The `type` discriminant; only `"message"` lines carry a payload we use.
    #[serde(rename = "type")]
    pub kind: String,
    /// Present on `"message"` lines.
    #[serde(default)]
    pub message: Option<TranscriptMessage>,
}

/// A single conversational turn.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptMessage {
    /// `"user"` or `"assistant"`.
    pub role: String,
    /// Ordered content blocks.
    pub content: Vec<ContentBlock>,
}

/// One block of a message's content array.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text itself.
        text: String,
    },
    /// A tool invocation.
    ToolUse {
        /// Tool name.
        name: String,
        /// Tool arguments, as submitted.
        #[serde(default)]
        input: Value,
    },
    /// A tool's result, ignored for chain extraction but kept for forward compatibility.
    ToolResult {
        #[serde(default)]
        content: Value,
    },
    /// Any content-block kind this parser doesn't model yet.
    #[serde(other)]
    Unknown,
}

/// Parses line-delimited transcript JSON, skipping blank and malformed lines
/// silently (spec §6.3).
#[must_use]
pub fn parse_transcript(raw: &str) -> Vec<TranscriptLine> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<TranscriptLine>(line).ok())
        .filter(|line| line.kind == "message" && line.message.is_some())
        .collect()
}

/// A flattened turn: one role, its concatenated text, and any tool calls issued.
#[derive(Debug, Clone)]
pub struct Turn {
    /// `"user"` or `"assistant"`.
    pub role: String,
    /// Concatenated text blocks, in order.
    pub text: String,
    /// Tool calls issued in this turn, in order.
    pub tool_calls: Vec<ProcedureStep>,
}

fn summarize_tool_call(name: &str, input: &Value) -> String {
    match input {
        Value::Object(map) if !map.is_empty() => {
            let args: Vec<String> = map.iter().map(|(k, v)| format!("{k}={v}")).collect();
            format!("{name}({})", args.join(", "))
        }
        _ => name.to_string(),
    }
}

/// Flattens parsed lines into [`Turn`]s.
#[must_use]
pub fn extract_turns(lines: &[TranscriptLine]) -> Vec<Turn> {
    lines
        .iter()
        .filter_map(|line| line.message.as_ref())
        .map(|message| {
            let mut text = String::new();
            let mut tool_calls = Vec::new();
            for block in &message.content {
                match block {
                    ContentBlock::Text { text: t } => {
                        if !text.is_empty() {
                            text.push('\n');
                        }
                        text.push_str(t);
                    }
                    ContentBlock::ToolUse { name, input } => tool_calls.push(ProcedureStep {
                        tool: name.clone(),
                        args: input.clone(),
                        summary: summarize_tool_call(name, input),
                    }),
                    ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {}
                }
            }
            Turn { role: message.role.clone(), text, tool_calls }
        })
        .collect()
}

/// A contiguous run of tool calls bounded by the preceding user turn (its
/// text becomes the task pattern) and classified by the following user turn.
#[derive(Debug, Clone)]
pub struct ToolChain {
    /// The user turn preceding the chain, truncated to a task pattern.
    pub task_pattern: String,
    /// The tool calls making up the chain, in order.
    pub steps: Vec<ProcedureStep>,
    /// Positive unless the following user turn is an explicit correction.
    pub outcome: ProcedureType,
}

fn truncate_task_pattern(text: &str) -> String {
    const MAX: usize = 160;
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        trimmed.chars().take(MAX).collect()
    }
}

const CORRECTION_PHRASES: &[&str] = &[
    "that's wrong",
    "that is wrong",
    "not right",
    "not correct",
    "incorrect",
    "no, that's not",
    "undo that",
    "revert that",
];

/// Whether `text` reads as an explicit correction of the preceding response.
#[must_use]
pub fn is_correction(text: &str) -> bool {
    let lower = text.to_lowercase();
    CORRECTION_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

const PRAISE_PHRASES: &[&str] = &[
    "perfect",
    "thanks",
    "thank you",
    "great job",
    "nice work",
    "that worked",
    "exactly right",
    "awesome",
];

/// Whether `text` reads as praise for the preceding response.
#[must_use]
pub fn is_praise(text: &str) -> bool {
    let lower = text.to_lowercase();
    PRAISE_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Scans `turns` for tool-call chains of at least `min_steps`, bounded by the
/// preceding and following user turns, classified positive or negative
/// (spec §4.7 procedure extraction: "store positive procedures... and
/// negative procedures (failed outcomes with explicit user correction)").
#[must_use]
pub fn extract_tool_chains(turns: &[Turn], min_steps: usize) -> Vec<ToolChain> {
    let mut chains = Vec::new();
    let mut last_user_text = String::new();
    let mut i = 0;
    while i < turns.len() {
        let turn = &turns[i];
        if turn.role == "user" {
            last_user_text = turn.text.clone();
            i += 1;
            continue;
        }

        let mut steps = Vec::new();
        let mut j = i;
        while j < turns.len() && turns[j].role == "assistant" {
            steps.extend(turns[j].tool_calls.iter().cloned());
            j += 1;
        }

        if steps.len() >= min_steps {
            let outcome = turns
                .get(j)
                .filter(|t| t.role == "user")
                .map(|t| if is_correction(&t.text) { ProcedureType::Negative } else { ProcedureType::Positive })
                .unwrap_or(ProcedureType::Positive);
            chains.push(ToolChain { task_pattern: truncate_task_pattern(&last_user_text), steps, outcome });
        }
        i = j.max(i + 1);
    }
    chains
}

/// A praise signal found in a user turn, paired with the tool-call chain
/// (if any, length ≥2) issued in the immediately preceding assistant turn —
/// spec §4.7: "if the subsequent tool-call chain is length ≥2, call
/// `reinforceProcedure` on matching procedures."
#[derive(Debug, Clone)]
pub struct PraiseSignal {
    /// The exact praise quote, for `reinforceFact`'s quote parameter.
    pub quote: String,
    /// The assistant's preceding tool-call chain, if long enough to reinforce a procedure.
    pub preceding_tool_chain: Vec<ProcedureStep>,
}

/// Scans `turns` for user-turn praise signals.
#[must_use]
pub fn extract_praise_signals(turns: &[Turn]) -> Vec<PraiseSignal> {
    let mut signals = Vec::new();
    for (idx, turn) in turns.iter().enumerate() {
        if turn.role != "user" || !is_praise(&turn.text) {
            continue;
        }
        let preceding_tool_chain = turns[..idx]
            .iter()
            .rev()
            .take_while(|t| t.role == "assistant")
            .flat_map(|t| t.tool_calls.iter().cloned())
            .collect();
        signals.push(PraiseSignal { quote: turn.text.clone(), preceding_tool_chain });
    }
    signals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(role: &str, text: &str) -> String {
        serde_json::json!({
            "type": "message",
            "message": { "role": role, "content": [{"type": "text", "text": text}] }
        })
        .to_string()
    }

    fn tool_line(role: &str, tools: &[(&str, serde_json::Value)]) -> String {
        let content: Vec<Value> = tools
            .iter()
            .map(|(name, input)| serde_json::json!({"type": "tool_use", "name": name, "input": input}))
            .collect();
        serde_json::json!({ "type": "message", "message": { "role": role, "content": content } }).to_string()
    }

    #[test]
    fn malformed_lines_are_skipped_silently() {
        let raw = format!("not json at all\n{}\n{{\"type\":\"other\"}}\n", line("user", "hi"));
        let parsed = parse_transcript(&raw);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn extracts_tool_chain_with_task_pattern_and_positive_outcome() {
        let raw = [
            line("user", "please fix the build"),
            tool_line("assistant", &[("run_tests", serde_json::json!({})), ("edit_file", serde_json::json!({"path": "a.rs"}))]),
            line("user", "thanks, that worked"),
        ]
        .join("\n");
        let turns = extract_turns(&parse_transcript(&raw));
        let chains = extract_tool_chains(&turns, 2);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].task_pattern, "please fix the build");
        assert_eq!(chains[0].steps.len(), 2);
        assert_eq!(chains[0].outcome, ProcedureType::Positive);
    }

    #[test]
    fn correction_after_chain_marks_it_negative() {
        let raw = [
            line("user", "rename the variable"),
            tool_line("assistant", &[("edit_file", serde_json::json!({})), ("edit_file", serde_json::json!({}))]),
            line("user", "no, that's wrong, revert it"),
        ]
        .join("\n");
        let turns = extract_turns(&parse_transcript(&raw));
        let chains = extract_tool_chains(&turns, 2);
        assert_eq!(chains[0].outcome, ProcedureType::Negative);
    }

    #[test]
    fn chains_shorter_than_min_steps_are_dropped() {
        let raw = [line("user", "do one thing"), tool_line("assistant", &[("edit_file", serde_json::json!({}))])].join("\n");
        let turns = extract_turns(&parse_transcript(&raw));
        assert!(extract_tool_chains(&turns, 2).is_empty());
    }

    #[test]
    fn praise_signal_captures_preceding_tool_chain() {
        let raw = [
            line("user", "add logging"),
            tool_line("assistant", &[("edit_file", serde_json::json!({})), ("edit_file", serde_json::json!({}))]),
            line("user", "perfect, thank you"),
        ]
        .join("\n");
        let turns = extract_turns(&parse_transcript(&raw));
        let signals = extract_praise_signals(&turns);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].quote, "perfect, thank you");
        assert_eq!(signals[0].preceding_tool_chain.len(), 2);
    }

    #[test]
    fn non_praise_user_turn_yields_no_signal() {
        let raw = [line("user", "add logging"), line("assistant", "done"), line("user", "also add metrics")].join("\n");
        let turns = extract_turns(&parse_transcript(&raw));
        assert!(extract_praise_signals(&turns).is_empty());
    }
}
