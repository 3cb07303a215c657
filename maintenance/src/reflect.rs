//! Reflection (spec §4.7): "sample recent facts in the configured window;
//! LLM extracts patterns (`reflect`), then higher-level rules
//! (`reflect-rules`) and meta-patterns (`reflect-meta`); store as
//! category = pattern / rule."

use memnexus_core::{
    Breadcrumb, CancelSignal, Category, ChatParams, Clock, DecayClass, Fact, Message, PendingWarnings, Result,
    Scope, Tier,
};
use memnexus_llm::{ChatClient, Tier as LlmTier};
use memnexus_store::{FactStore, LookupOpts};

use crate::config::ReflectionConfig;

fn window_start(now: i64, window: std::time::Duration) -> i64 {
    now.saturating_sub(window.as_secs() as i64)
}

fn sample_recent_facts(store: &FactStore, now: i64, window: std::time::Duration) -> Result<Vec<Fact>> {
    let since = window_start(now, window);
    let recent = store.lookup(None, None, None, now, &LookupOpts::default())?;
    Ok(recent.into_iter().filter(|f| f.created_at >= since).collect())
}

fn observations_prompt(facts: &[Fact]) -> String {
    let bullets: String = facts.iter().map(|f| format!("- {}\n", f.text)).collect();
    format!("Here are recent observations from an agent's memory store:\n{bullets}")
}

async fn extract_stage(
    chat: &ChatClient,
    instruction: &str,
    observations: &str,
    cancel: &CancelSignal,
    warnings: &mut PendingWarnings,
    stage_name: &'static str,
) -> Vec<String> {
    let messages = vec![
        Message::system(instruction),
        Message::user(observations.to_string()),
    ];
    match chat.complete(LlmTier::Heavy, &messages, &ChatParams::default(), cancel, warnings).await {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| line.trim_start_matches(['-', '*']).trim().to_string())
            .filter(|line| !line.is_empty())
            .collect(),
        Err(err) => {
            warnings.push(Breadcrumb::from_error(stage_name, None, &memnexus_core::Error::Llm(err)));
            Vec::new()
        }
    }
}

fn build_synthesized_fact(id: String, text: String, category: Category, now: i64) -> Fact {
    Fact {
        id,
        text,
        summary: None,
        category,
        entity: None,
        key: None,
        value: None,
        tags: std::iter::once("reflection".to_string()).collect(),
        importance: 0.6,
        confidence: 0.6,
        decay_class: DecayClass::Stable,
        tier: Tier::Warm,
        scope: Scope::Global,
        scope_target: None,
        source: "reflection".into(),
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

/// Outcome of one reflection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReflectOutcome {
    /// Ids of newly stored pattern facts.
    pub pattern_ids: Vec<String>,
    /// Ids of newly stored rule facts.
    pub rule_ids: Vec<String>,
    /// Ids of newly stored meta-pattern facts (stored as `Category::Pattern`).
    pub meta_pattern_ids: Vec<String>,
    /// Set when the pass was skipped because too few observations were sampled.
    pub skipped_insufficient_observations: bool,
}

/// Samples recent facts in `config.default_window`, then runs the three-stage
/// `reflect` → `reflect-rules` → `reflect-meta` extraction over them, storing
/// each extracted line as a new fact. Never fails the caller: an LLM failure
/// at any stage degrades that stage to zero extractions with a breadcrumb.
pub async fn run_reflection(
    store: &FactStore,
    chat: &ChatClient,
    clock: &dyn Clock,
    config: &ReflectionConfig,
    cancel: &CancelSignal,
    warnings: &mut PendingWarnings,
) -> Result<ReflectOutcome> {
    if !config.enabled {
        return Ok(ReflectOutcome::default());
    }

    let now = clock.now();
    let facts = sample_recent_facts(store, now, config.default_window)?;
    if facts.len() < config.min_observations {
        return Ok(ReflectOutcome { skipped_insufficient_observations: true, ..ReflectOutcome::default() });
    }

    let observations = observations_prompt(&facts);

    let patterns = extract_stage(
        chat,
        "Identify recurring behavioral patterns in these observations. Reply with one pattern per line.",
        &observations,
        cancel,
        warnings,
        "reflect",
    )
    .await;

    let mut pattern_ids = Vec::with_capacity(patterns.len());
    for text in patterns {
        let fact = build_synthesized_fact(uuid::Uuid::new_v4().to_string(), text, Category::Pattern, now);
        store.store(&fact)?;
        pattern_ids.push(fact.id);
    }

    let rules = extract_stage(
        chat,
        "From these observations, derive higher-level rules the agent should follow. Reply with one rule per line.",
        &observations,
        cancel,
        warnings,
        "reflect-rules",
    )
    .await;

    let mut rule_ids = Vec::with_capacity(rules.len());
    for text in rules {
        let fact = build_synthesized_fact(uuid::Uuid::new_v4().to_string(), text, Category::Rule, now);
        store.store(&fact)?;
        rule_ids.push(fact.id);
    }

    let meta_patterns = extract_stage(
        chat,
        "From these observations, identify meta-patterns: patterns about how patterns form. Reply with one meta-pattern per line.",
        &observations,
        cancel,
        warnings,
        "reflect-meta",
    )
    .await;

    let mut meta_pattern_ids = Vec::with_capacity(meta_patterns.len());
    for text in meta_patterns {
        let fact = build_synthesized_fact(uuid::Uuid::new_v4().to_string(), text, Category::Pattern, now);
        store.store(&fact)?;
        meta_pattern_ids.push(fact.id);
    }

    Ok(ReflectOutcome { pattern_ids, rule_ids, meta_pattern_ids, skipped_insufficient_observations: false })
}
