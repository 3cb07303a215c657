//! Global rescore formula (spec §4.6 step 7): a pure function over a
//! candidate's base score and fact row, independent of how the candidate was
//! found (lexical, vector, entity lookup, or directive).

use memnexus_core::{DecayClass, Fact};

use crate::config::RecallConfig;

const RECENCY_WINDOW_DAYS: f64 = 90.0;
const SECONDS_PER_DAY: f64 = 86_400.0;
/// Score multiplier applied to directive-priority candidates before sorting.
pub const DIRECTIVE_BOOST: f32 = 1.25;

fn tier_multiplier(decay_class: DecayClass) -> f32 {
    match decay_class {
        DecayClass::Permanent => 1.2,
        DecayClass::Stable => 1.1,
        DecayClass::Default | DecayClass::Volatile => 1.0,
    }
}

fn importance_recency_factor(importance: f32, last_confirmed_at: i64, now: i64) -> f32 {
    let importance_factor = 0.7 + 0.3 * importance;
    let age_days = ((now - last_confirmed_at).max(0) as f64) / SECONDS_PER_DAY;
    let recency = (1.0 - age_days / RECENCY_WINDOW_DAYS).clamp(0.0, 1.0);
    let recency_factor = 0.8 + 0.2 * recency as f32;
    importance_factor * recency_factor
}

fn recall_count_factor(recall_count: u32) -> f32 {
    1.0 + 0.1 * (recall_count as f32 + 1.0).ln()
}

/// Applies the spec §4.6 step 7 formula to `base_score`, honoring
/// `prefer_long_term`/`use_importance_recency` toggles.
#[must_use]
pub fn global_rescore(base_score: f32, fact: &Fact, now: i64, cfg: &RecallConfig) -> f32 {
    let mut s = base_score;
    if cfg.prefer_long_term {
        s *= tier_multiplier(fact.decay_class);
    }
    if cfg.use_importance_recency {
        s *= importance_recency_factor(fact.importance, fact.last_confirmed_at, now);
    }
    if fact.recall_count > 0 {
        s *= recall_count_factor(fact.recall_count);
    }
    s
}

/// Tie-break key for the final sort: newer `sourceDate ?? createdAt` wins.
#[must_use]
pub fn tie_break_key(fact: &Fact) -> i64 {
    fact.source_date.unwrap_or(fact.created_at)
}
