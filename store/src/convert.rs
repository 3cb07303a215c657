//! Conversions between [`rusqlite::Row`] and the shared [`Fact`]/[`Procedure`] model.

use std::collections::BTreeSet;
use std::str::FromStr;

use rusqlite::Row;

use memnexus_core::{
    Category, DecayClass, Error, Fact, Procedure, ProcedureStep, ProcedureType, Scope, Tier,
};

pub(crate) fn to_storage_err(err: rusqlite::Error) -> Error {
    Error::storage(err)
}

fn category_str(c: Category) -> &'static str {
    match c {
        Category::Fact => "fact",
        Category::Preference => "preference",
        Category::Decision => "decision",
        Category::Rule => "rule",
        Category::Pattern => "pattern",
        Category::Technical => "technical",
        Category::Procedural => "procedural",
        Category::Other => "other",
    }
}

impl FromStr for Category {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        Ok(match s {
            "fact" => Self::Fact,
            "preference" => Self::Preference,
            "decision" => Self::Decision,
            "rule" => Self::Rule,
            "pattern" => Self::Pattern,
            "technical" => Self::Technical,
            "procedural" => Self::Procedural,
            _ => Self::Other,
        })
    }
}

fn decay_class_str(d: DecayClass) -> &'static str {
    match d {
        DecayClass::Permanent => "permanent",
        DecayClass::Stable => "stable",
        DecayClass::Default => "default",
        DecayClass::Volatile => "volatile",
    }
}

fn parse_decay_class(s: &str) -> DecayClass {
    match s {
        "permanent" => DecayClass::Permanent,
        "stable" => DecayClass::Stable,
        "volatile" => DecayClass::Volatile,
        _ => DecayClass::Default,
    }
}

pub(crate) fn tier_str(t: Tier) -> &'static str {
    match t {
        Tier::Hot => "hot",
        Tier::Warm => "warm",
        Tier::Cold => "cold",
    }
}

fn parse_tier(s: &str) -> Tier {
    match s {
        "hot" => Tier::Hot,
        "cold" => Tier::Cold,
        _ => Tier::Warm,
    }
}

fn scope_str(s: Scope) -> &'static str {
    match s {
        Scope::Global => "global",
        Scope::User => "user",
        Scope::Agent => "agent",
        Scope::Session => "session",
    }
}

fn parse_scope(s: &str) -> Scope {
    match s {
        "user" => Scope::User,
        "agent" => Scope::Agent,
        "session" => Scope::Session,
        _ => Scope::Global,
    }
}

/// Normalizes text for the exact-duplicate check (spec §4.1): case-folded,
/// whitespace-collapsed. Deliberately *not* semantic — that lives in the
/// vector store's `hasDuplicate`.
#[must_use]
pub fn normalize_for_dedup(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub(crate) fn row_to_fact(row: &Row<'_>) -> rusqlite::Result<Fact> {
    let tags_json: String = row.get("tags")?;
    let tags: BTreeSet<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    let quotes_json: String = row.get("reinforced_quotes")?;
    let reinforced_quotes: Vec<String> = serde_json::from_str(&quotes_json).unwrap_or_default();
    let category: String = row.get("category")?;
    let decay_class: String = row.get("decay_class")?;
    let tier: String = row.get("tier")?;
    let scope: String = row.get("scope")?;

    Ok(Fact {
        id: row.get("id")?,
        text: row.get("text")?,
        summary: row.get("summary")?,
        category: category.parse().unwrap_or(Category::Other),
        entity: row.get("entity")?,
        key: row.get("key")?,
        value: row.get("value")?,
        tags,
        importance: row.get("importance")?,
        confidence: row.get("confidence")?,
        decay_class: parse_decay_class(&decay_class),
        tier: parse_tier(&tier),
        scope: parse_scope(&scope),
        scope_target: row.get("scope_target")?,
        source: row.get("source")?,
        created_at: row.get("created_at")?,
        last_confirmed_at: row.get("last_confirmed_at")?,
        last_accessed: row.get("last_accessed")?,
        source_date: row.get("source_date")?,
        valid_from: row.get("valid_from")?,
        valid_until: row.get("valid_until")?,
        superseded_at: row.get("superseded_at")?,
        superseded_by: row.get("superseded_by")?,
        supersedes_id: row.get("supersedes_id")?,
        expires_at: row.get("expires_at")?,
        recall_count: row.get("recall_count")?,
        reinforced_count: row.get("reinforced_count")?,
        last_reinforced_at: row.get("last_reinforced_at")?,
        reinforced_quotes,
    })
}

pub(crate) struct FactParams<'a> {
    pub tags_json: String,
    pub quotes_json: String,
    pub category: &'a str,
    pub decay_class: &'a str,
    pub tier: &'a str,
    pub scope: &'a str,
    pub normalized_text: String,
}

impl<'a> FactParams<'a> {
    pub(crate) fn new(fact: &'a Fact) -> Self {
        Self {
            tags_json: serde_json::to_string(&fact.tags).unwrap_or_else(|_| "[]".into()),
            quotes_json: serde_json::to_string(&fact.reinforced_quotes)
                .unwrap_or_else(|_| "[]".into()),
            category: category_str(fact.category),
            decay_class: decay_class_str(fact.decay_class),
            tier: tier_str(fact.tier),
            scope: scope_str(fact.scope),
            normalized_text: normalize_for_dedup(&fact.text),
        }
    }
}

pub(crate) fn row_to_procedure(row: &Row<'_>) -> rusqlite::Result<Procedure> {
    let recipe_json: String = row.get("recipe_json")?;
    let recipe: Vec<ProcedureStep> = serde_json::from_str(&recipe_json).unwrap_or_default();
    let procedure_type: String = row.get("procedure_type")?;
    let promoted: i64 = row.get("promoted_to_skill")?;
    let scope: String = row.get("scope")?;

    Ok(Procedure {
        id: row.get("id")?,
        task_pattern: row.get("task_pattern")?,
        recipe,
        procedure_type: if procedure_type == "negative" {
            ProcedureType::Negative
        } else {
            ProcedureType::Positive
        },
        success_count: row.get("success_count")?,
        failure_count: row.get("failure_count")?,
        confidence: row.get("confidence")?,
        last_validated: row.get("last_validated")?,
        last_failed: row.get("last_failed")?,
        promoted_to_skill: promoted != 0,
        skill_path: row.get("skill_path")?,
        reinforced_count: row.get("reinforced_count")?,
        scope: parse_scope(&scope),
        scope_target: row.get("scope_target")?,
    })
}

pub(crate) fn procedure_type_str(t: ProcedureType) -> &'static str {
    match t {
        ProcedureType::Positive => "positive",
        ProcedureType::Negative => "negative",
    }
}

pub(crate) fn scope_as_str(s: Scope) -> &'static str {
    scope_str(s)
}
