//! Self-correction (spec §4.7): "scan for correction signals; LLM proposes
//! remediations {MEMORY_STORE, TOOLS_RULE, AGENTS_RULE, SKILL_UPDATE,
//! NO_ACTION}; apply MEMORY_STORE and TOOLS_RULE subject to confidence and
//! daily cap." `AGENTS_RULE` and `SKILL_UPDATE` are proposed and breadcrumbed
//! for operator review, not auto-applied — the spec only names MEMORY_STORE
//! and TOOLS_RULE as subject to auto-apply.

use memnexus_core::{
    Breadcrumb, CancelSignal, Category, ChatParams, Clock, DecayClass, Fact, Message, PendingWarnings, Result, Scope,
    Tier,
};
use memnexus_llm::{ChatClient, Tier as LlmTier};
use memnexus_store::FactStore;
use serde::Deserialize;

use crate::config::SelfCorrectionConfig;
use crate::transcript::Turn;

/// External collaborator that appends an auto-derived rule to the agent's
/// tools configuration (spec `selfCorrection.toolsSection`). Lives here
/// rather than in `memnexus-core` — it is specific to self-correction's
/// apply step, not a cross-cutting provider.
pub trait ToolsRuleWriter: Send + Sync {
    /// Appends `text` as a new rule line; returns an error message on failure.
    fn append_rule(&self, text: &str) -> std::result::Result<(), String>;
}

/// A remediation the LLM proposed for one correction signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Remediation {
    /// Store a new memory fact capturing the correction.
    MemoryStore {
        /// Fact text to store.
        text: String,
    },
    /// Append a rule to the tools configuration.
    ToolsRule {
        /// Rule text to append.
        text: String,
    },
    /// Propose a rule for the agent's persona/instructions file (not auto-applied).
    AgentsRule {
        /// Rule text proposed.
        text: String,
    },
    /// Propose an update to a promoted skill artifact (not auto-applied).
    SkillUpdate {
        /// Update text proposed.
        text: String,
    },
    /// The LLM judged no remediation was warranted.
    NoAction,
}

#[derive(Debug, Deserialize)]
struct ProposedRemediation {
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    confidence: f32,
}

fn parse_remediation(raw: &str) -> Option<(Remediation, f32)> {
    let proposed: ProposedRemediation = serde_json::from_str(raw.trim()).ok()?;
    let remediation = match proposed.kind.as_str() {
        "MEMORY_STORE" => Remediation::MemoryStore { text: proposed.text },
        "TOOLS_RULE" => Remediation::ToolsRule { text: proposed.text },
        "AGENTS_RULE" => Remediation::AgentsRule { text: proposed.text },
        "SKILL_UPDATE" => Remediation::SkillUpdate { text: proposed.text },
        "NO_ACTION" => Remediation::NoAction,
        _ => return None,
    };
    Some((remediation, proposed.confidence))
}

fn correction_prompt(preceding_assistant_text: &str, correction_text: &str) -> String {
    format!(
        "The assistant previously said:\n{preceding_assistant_text}\n\nThe user then corrected it:\n{correction_text}\n\n\
         Propose a remediation as JSON: {{\"kind\": \"MEMORY_STORE\"|\"TOOLS_RULE\"|\"AGENTS_RULE\"|\"SKILL_UPDATE\"|\"NO_ACTION\", \
         \"text\": \"...\", \"confidence\": 0.0-1.0}}. Reply with the JSON object only."
    )
}

fn build_rule_fact(id: String, text: String, now: i64) -> Fact {
    Fact {
        id,
        text,
        summary: None,
        category: Category::Rule,
        entity: None,
        key: None,
        value: None,
        tags: std::iter::once("self-correction".to_string()).collect(),
        importance: 0.7,
        confidence: 0.7,
        decay_class: DecayClass::Stable,
        tier: Tier::Warm,
        scope: Scope::Global,
        scope_target: None,
        source: "self-correction".into(),
        created_at: now,
        last_confirmed_at: now,
        last_accessed: now,
        source_date: None,
        valid_from: now,
        valid_until: None,
        superseded_at: None,
        superseded_by: None,
        supersedes_id: None,
        expires_at: None,
        recall_count: 0,
        reinforced_count: 0,
        last_reinforced_at: None,
        reinforced_quotes: Vec::new(),
    }
}

/// A calendar-day bucketed counter bounding how many remediations get
/// auto-applied per day (spec: "subject to confidence and daily cap").
#[derive(Debug, Clone, Default)]
pub struct DailyCap {
    day: Option<i64>,
    count: u32,
}

impl DailyCap {
    /// Attempts to consume one slot at `now`; resets the counter on a new day.
    /// Returns whether the slot was granted.
    pub fn try_consume(&mut self, now: i64, cap: u32) -> bool {
        let day = now.div_euclid(86_400);
        if self.day != Some(day) {
            self.day = Some(day);
            self.count = 0;
        }
        if self.count >= cap {
            return false;
        }
        self.count += 1;
        true
    }
}

/// What happened to one detected correction signal.
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedOutcome {
    /// A new fact was stored.
    FactStored(String),
    /// A tools-config rule was appended.
    ToolsRuleAppended,
    /// Proposed but not auto-applied (`AGENTS_RULE`, `SKILL_UPDATE`, or `NO_ACTION`).
    Proposed(Remediation),
    /// Confidence was below `min_confidence`.
    BelowConfidence,
    /// The daily cap was already exhausted.
    CapExhausted,
}

/// Scans `turns` for correction signals (spec §4.7), asking the LLM to
/// propose a remediation for each and applying `MEMORY_STORE`/`TOOLS_RULE`
/// proposals that clear `config.min_confidence` and the daily cap.
pub async fn run_self_correction(
    turns: &[Turn],
    store: &FactStore,
    chat: &ChatClient,
    tools_writer: &dyn ToolsRuleWriter,
    clock: &dyn Clock,
    config: &SelfCorrectionConfig,
    cap: &mut DailyCap,
    cancel: &CancelSignal,
    warnings: &mut PendingWarnings,
) -> Result<Vec<AppliedOutcome>> {
    if !config.enabled {
        return Ok(Vec::new());
    }

    let mut outcomes = Vec::new();
    for (idx, turn) in turns.iter().enumerate() {
        if turn.role != "user" || !crate::transcript::is_correction(&turn.text) {
            continue;
        }
        let preceding_text = turns[..idx]
            .iter()
            .rev()
            .find(|t| t.role == "assistant")
            .map(|t| t.text.clone())
            .unwrap_or_default();

        let messages = vec![
            Message::system("You analyze user corrections of an AI assistant and propose a remediation."),
            Message::user(correction_prompt(&preceding_text, &turn.text)),
        ];

        let response = match chat.complete(LlmTier::Default, &messages, &ChatParams::default(), cancel, warnings).await {
            Ok(text) => text,
            Err(err) => {
                warnings.push(Breadcrumb::from_error("self-correction", None, &memnexus_core::Error::Llm(err)));
                continue;
            }
        };

        let Some((remediation, confidence)) = parse_remediation(&response) else {
            continue;
        };

        match remediation {
            Remediation::MemoryStore { text } if confidence >= config.min_confidence => {
                if !cap.try_consume(clock.now(), config.daily_cap) {
                    outcomes.push(AppliedOutcome::CapExhausted);
                    continue;
                }
                let fact = build_rule_fact(uuid::Uuid::new_v4().to_string(), text, clock.now());
                store.store(&fact)?;
                outcomes.push(AppliedOutcome::FactStored(fact.id));
            }
            Remediation::ToolsRule { text } if confidence >= config.min_confidence => {
                if !cap.try_consume(clock.now(), config.daily_cap) {
                    outcomes.push(AppliedOutcome::CapExhausted);
                    continue;
                }
                if let Err(err) = tools_writer.append_rule(&text) {
                    warnings.push(Breadcrumb {
                        subsystem: "self-correction",
                        operation: "apply-tools-rule",
                        id: None,
                        message: err,
                    });
                    continue;
                }
                outcomes.push(AppliedOutcome::ToolsRuleAppended);
            }
            Remediation::MemoryStore { .. } | Remediation::ToolsRule { .. } => {
                outcomes.push(AppliedOutcome::BelowConfidence);
            }
            other => outcomes.push(AppliedOutcome::Proposed(other)),
        }
    }

    Ok(outcomes)
}
