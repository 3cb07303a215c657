//! `autoRecall.*` / `memoryTiering.*` / `graph.*` configuration surface
//! (spec §6.4) consumed by the recall pipeline.

use std::time::Duration;

/// Injection format (spec §4.6 step 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    /// Full bullet text per candidate until the token budget is exhausted.
    Full,
    /// Truncated bullet text per candidate.
    Short,
    /// Entity/key/value triplet only, falling back to a short text prefix.
    Minimal,
    /// Titles plus a per-item token-cost estimate; bodies fetched by id.
    Progressive,
    /// Pinned candidates injected in full within 60% of budget, the
    /// remainder indexed like [`FormatMode::Progressive`].
    ProgressiveHybrid,
}

/// `autoRecall.entityLookup.*`.
#[derive(Debug, Clone, Default)]
pub struct EntityLookupConfig {
    /// Whether the entity-token scan (spec §4.6 step 5) runs at all.
    pub enabled: bool,
    /// Configured entity tokens scanned for case-insensitively in the prompt.
    pub entities: Vec<String>,
    /// Cap on exact-lookup results merged in per matched entity.
    pub max_facts_per_entity: usize,
}

/// One retrieval-directive trigger (spec §4.6 step 6): entity mentions,
/// keyword triggers, task-type triggers, or a session-start marker. Firing a
/// trigger runs an extra lexical sub-query and marks its hits directive-priority.
#[derive(Debug, Clone)]
pub struct DirectiveTrigger {
    /// Human-readable trigger name, used only for logging/tests.
    pub name: String,
    /// Case-insensitive keywords; any match fires the trigger.
    pub keywords: Vec<String>,
}

/// `autoRecall.retrievalDirectives.*`.
#[derive(Debug, Clone, Default)]
pub struct DirectiveConfig {
    /// Whether directive classification runs at all.
    pub enabled: bool,
    /// Maximum number of triggers allowed to fire per prompt.
    pub max_per_prompt: usize,
    /// Configured triggers, checked in order.
    pub triggers: Vec<DirectiveTrigger>,
}

/// HyDE rewrite behavior, nested under `autoRecall.*` in spec §6.4 but kept
/// as its own struct since it governs a single pipeline sub-stage.
#[derive(Debug, Clone)]
pub struct HydeConfig {
    /// Whether a HyDE rewrite is attempted at all.
    pub enabled: bool,
    /// Enforces at most one HyDE call across all retrieval branches for one prompt.
    pub limit_once: bool,
    /// Hard deadline for the combined HyDE + vector-search branch (spec §4.6
    /// "Cancellation & timeouts", ~30s).
    pub timeout: Duration,
}

impl Default for HydeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit_once: true,
            timeout: Duration::from_secs(30),
        }
    }
}

/// `memoryTiering.*`.
#[derive(Debug, Clone)]
pub struct TieringConfig {
    /// Whether hot-tier injection and cold filtering are active at all.
    pub enabled: bool,
    /// Token budget for the hot-tier bullet block (step 2).
    pub hot_max_tokens: usize,
    /// Count cap for the hot-tier bullet block (step 2).
    pub hot_max_facts: usize,
}

impl Default for TieringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hot_max_tokens: 400,
            hot_max_facts: 20,
        }
    }
}

/// `graph.*`.
#[derive(Debug, Clone, Default)]
pub struct GraphConfig {
    /// Whether co-recall `RELATED_TO` link strengthening (step 10) runs.
    pub enabled: bool,
}

/// Full `autoRecall.*` configuration (spec §6.4), plus the tiering and graph
/// sections recall also reads.
#[derive(Debug, Clone)]
pub struct RecallConfig {
    /// Master on/off switch; a disabled pipeline returns an empty block immediately.
    pub enabled: bool,
    /// Candidate cap after the cold filter (step 8).
    pub limit: usize,
    /// Minimum vector-search cosine score to consider a hit (step 4).
    pub min_score: f32,
    /// Token budget for the formatted context block (step 9).
    pub max_tokens: usize,
    /// Injection format.
    pub injection_format: FormatMode,
    /// Whether overflow beyond `max_tokens` is summarized via a nano LLM call
    /// instead of simply dropped (step 9, `full`/`short`/`minimal` only).
    pub summarize_when_over_budget: bool,
    /// Whether the tier-based long-term multiplier is applied (step 7).
    pub prefer_long_term: bool,
    /// Whether the importance/recency multiplier is applied (step 7).
    pub use_importance_recency: bool,
    /// Token budget for a `progressive`/`progressive_hybrid` index.
    pub progressive_index_max_tokens: usize,
    /// `recallCount` at or above which a candidate is pinned under
    /// `progressive_hybrid` (in addition to `decayClass = permanent`).
    pub pinned_threshold: u32,
    /// Hard per-bullet character cap under `full`/`short`/`minimal`.
    pub max_per_memory_chars: usize,
    /// Candidate cap passed to the lexical search call (step 4); the vector
    /// branch requests `2 * limit`.
    pub search_limit: usize,
    /// Entity-lookup configuration.
    pub entity_lookup: EntityLookupConfig,
    /// Retrieval-directive configuration.
    pub retrieval_directives: DirectiveConfig,
    /// HyDE configuration.
    pub hyde: HydeConfig,
    /// Tiering configuration (hot injection + cold filter).
    pub tiering: TieringConfig,
    /// Graph (co-recall link strengthening) configuration.
    pub graph: GraphConfig,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 10,
            min_score: 0.2,
            max_tokens: 800,
            injection_format: FormatMode::ProgressiveHybrid,
            summarize_when_over_budget: true,
            prefer_long_term: true,
            use_importance_recency: true,
            progressive_index_max_tokens: 300,
            pinned_threshold: 5,
            max_per_memory_chars: 280,
            search_limit: 20,
            entity_lookup: EntityLookupConfig::default(),
            retrieval_directives: DirectiveConfig::default(),
            hyde: HydeConfig::default(),
            tiering: TieringConfig::default(),
            graph: GraphConfig::default(),
        }
    }
}
