//! Canonical data model shared by every crate in the workspace (spec §3).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Closed category set for facts (spec §3.1). `Other` is the reclassification target
/// for anything that does not fit; additional categories can be registered at
/// runtime via `store.categoryRegistry` (§6.4) without changing this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// A plain statement of fact.
    Fact,
    /// A stated user preference.
    Preference,
    /// A decision made during a session.
    Decision,
    /// A rule the agent must follow.
    Rule,
    /// A synthesized behavioral pattern (produced by reflection).
    Pattern,
    /// Technical/system information.
    Technical,
    /// A procedural note (distinct from a stored [`Procedure`]).
    Procedural,
    /// Anything that does not fit the above; a reclassification target.
    Other,
}

/// Governs confidence decay rate (spec §3.1, §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayClass {
    /// Never decays.
    Permanent,
    /// Decays slowly.
    Stable,
    /// Decays at the default medium rate.
    Default,
    /// Decays quickly.
    Volatile,
}

impl Default for DecayClass {
    fn default() -> Self {
        Self::Default
    }
}

/// Injection tier (spec §3.1, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Always eligible for automatic injection, capped by token/count budgets.
    Hot,
    /// Eligible for recall but not force-injected.
    Warm,
    /// Excluded from recall unless `tierFilter = all`.
    Cold,
}

/// Access dimension bounding who may see a fact or procedure (spec §3.1, §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Visible to every reader regardless of identity.
    Global,
    /// Visible only to reads carrying a matching `userId`.
    User,
    /// Visible only to reads carrying a matching `agentId`.
    Agent,
    /// Visible only to reads carrying a matching `sessionId`.
    Session,
}

/// An atomic, provenance-tracked statement (spec §3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Globally unique id.
    pub id: String,
    /// Human-readable statement. Must be at least 2 characters (invariant, §3.4).
    pub text: String,
    /// Optional compressed form used during injection.
    pub summary: Option<String>,
    /// Closed/extensible category.
    pub category: Category,
    /// Structured entity of the `(entity, key, value)` triplet, if any.
    pub entity: Option<String>,
    /// Structured key of the triplet.
    pub key: Option<String>,
    /// Structured value of the triplet. Never a raw credential (invariant 6).
    pub value: Option<String>,
    /// Unordered, lowercase topic labels.
    pub tags: BTreeSet<String>,
    /// Importance in `[0, 1]`.
    pub importance: f32,
    /// Confidence in `[0, 1]`; decays over time per `decay_class`.
    pub confidence: f32,
    /// Governs decay rate.
    pub decay_class: DecayClass,
    /// Injection tier.
    pub tier: Tier,
    /// Access dimension.
    pub scope: Scope,
    /// Scope identifier; `None` iff `scope == Global` (invariant 5).
    pub scope_target: Option<String>,
    /// Free-text origin (`"cli"`, `"auto-capture"`, `"distillation"`, …).
    pub source: String,
    /// Epoch seconds the row was created.
    pub created_at: i64,
    /// Epoch seconds the fact was last confirmed valid.
    pub last_confirmed_at: i64,
    /// Epoch seconds the fact was last returned by recall.
    pub last_accessed: i64,
    /// Real-world date the underlying event occurred, if known.
    pub source_date: Option<i64>,
    /// Start of the bitemporal validity window.
    pub valid_from: i64,
    /// End of the bitemporal validity window (exclusive), if bounded.
    pub valid_until: Option<i64>,
    /// Transaction-time tombstone. `None` means the fact is active (invariant 2).
    pub superseded_at: Option<i64>,
    /// Id of the fact that replaces this one, if any.
    pub superseded_by: Option<String>,
    /// Id of the fact this one replaces, if any.
    pub supersedes_id: Option<String>,
    /// Hard-delete deadline.
    pub expires_at: Option<i64>,
    /// Monotonic counter incremented by recall.
    pub recall_count: u32,
    /// Number of reinforcement (praise) annotations.
    pub reinforced_count: u32,
    /// Epoch seconds of the most recent reinforcement.
    pub last_reinforced_at: Option<i64>,
    /// Up to 10 most recent reinforcement quotes, newest last.
    pub reinforced_quotes: Vec<String>,
}

impl Fact {
    /// A fact is active iff not superseded and not past its expiry (invariant 2).
    #[must_use]
    pub fn is_active(&self, now: i64) -> bool {
        self.superseded_at.is_none() && self.expires_at.is_none_or(|exp| exp > now)
    }

    /// Whether `asOf` falls inside `[valid_from, valid_until)` (invariant 4).
    #[must_use]
    pub fn valid_at(&self, as_of: i64) -> bool {
        self.valid_from <= as_of && self.valid_until.is_none_or(|until| as_of < until)
    }

    /// Whether the fact was already superseded as of transaction-time `t`.
    #[must_use]
    pub fn superseded_as_of(&self, t: i64) -> bool {
        self.superseded_at.is_some_and(|sa| sa <= t)
    }

    /// Appends a reinforcement quote, truncating to 200 chars and keeping only the
    /// 10 most recent (invariant 7).
    pub fn push_reinforcement_quote(&mut self, quote: &str) {
        let truncated: String = quote.chars().take(200).collect();
        self.reinforced_quotes.push(truncated);
        let len = self.reinforced_quotes.len();
        if len > 10 {
            self.reinforced_quotes.drain(0..len - 10);
        }
    }
}

/// A single step of a stored tool-call recipe (spec §3.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureStep {
    /// Tool name invoked.
    pub tool: String,
    /// Arguments passed to the tool, as opaque JSON.
    pub args: serde_json::Value,
    /// Human-readable one-line summary of the step.
    pub summary: String,
}

/// Whether a stored procedure represents a successful or a corrected-away-from pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureType {
    /// A recipe that led to a successful outcome.
    Positive,
    /// A recipe explicitly corrected by the user; surfaced as a caution.
    Negative,
}

/// A stored recipe of ordered tool calls solving a task pattern (spec §3.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    /// Globally unique id.
    pub id: String,
    /// Natural-language description of the task this procedure solves.
    pub task_pattern: String,
    /// Ordered list of tool-call steps.
    pub recipe: Vec<ProcedureStep>,
    /// Positive or negative procedure.
    pub procedure_type: ProcedureType,
    /// Number of times this procedure was validated as successful.
    pub success_count: u32,
    /// Number of times this procedure was observed to fail.
    pub failure_count: u32,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Epoch seconds of last successful validation.
    pub last_validated: Option<i64>,
    /// Epoch seconds of last observed failure.
    pub last_failed: Option<i64>,
    /// Set once the procedure has been promoted to a durable skill artifact.
    pub promoted_to_skill: bool,
    /// Filesystem path of the emitted skill artifact, if promoted.
    pub skill_path: Option<String>,
    /// Number of reinforcement (praise) annotations.
    pub reinforced_count: u32,
    /// Access dimension.
    pub scope: Scope,
    /// Scope identifier; `None` iff `scope == Global`.
    pub scope_target: Option<String>,
}

/// A vector-index record keyed by a fact id (spec §3.3). Vectors are assumed
/// L2-unit-normalized; cosine similarity reduces to the dot product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Id matching a [`Fact::id`] (eventually, per invariant 1).
    pub id: String,
    /// Original text the vector was computed from.
    pub text: String,
    /// Unit-normalized embedding.
    pub vector: Vec<f32>,
    /// Category, denormalized for cheap filtering without a store round trip.
    pub category: Category,
    /// Importance, denormalized for cheap rescoring without a store round trip.
    pub importance: f32,
}

/// Optional scope filter threaded through every read (spec §4.1, §4.10).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFilter {
    /// Restrict `(scope, scopeTarget) = (user, userId)` matches to this id.
    pub user_id: Option<String>,
    /// Restrict `(scope, scopeTarget) = (agent, agentId)` matches to this id.
    pub agent_id: Option<String>,
    /// Restrict `(scope, scopeTarget) = (session, sessionId)` matches to this id.
    pub session_id: Option<String>,
}

impl ScopeFilter {
    /// Returns `true` if `(scope, scope_target)` is visible under this filter
    /// (spec §4.1 Filters, property P4).
    #[must_use]
    pub fn allows(&self, scope: Scope, scope_target: Option<&str>) -> bool {
        match scope {
            Scope::Global => true,
            Scope::User => matches!((self.user_id.as_deref(), scope_target), (Some(a), Some(b)) if a == b),
            Scope::Agent => matches!((self.agent_id.as_deref(), scope_target), (Some(a), Some(b)) if a == b),
            Scope::Session => {
                matches!((self.session_id.as_deref(), scope_target), (Some(a), Some(b)) if a == b)
            }
        }
    }
}

/// `tierFilter` argument accepted by fact-store reads (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TierFilter {
    /// Excludes cold facts; includes hot and warm.
    #[default]
    Warm,
    /// Includes all tiers.
    All,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fact() -> Fact {
        Fact {
            id: "f1".into(),
            text: "The user prefers dark mode".into(),
            summary: None,
            category: Category::Preference,
            entity: Some("user".into()),
            key: Some("prefers".into()),
            value: Some("dark mode".into()),
            tags: BTreeSet::new(),
            importance: 0.5,
            confidence: 1.0,
            decay_class: DecayClass::Stable,
            tier: Tier::Warm,
            scope: Scope::Global,
            scope_target: None,
            source: "cli".into(),
            created_at: 1_000,
            last_confirmed_at: 1_000,
            last_accessed: 1_000,
            source_date: None,
            valid_from: 1_000,
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

    #[test]
    fn active_iff_not_superseded_and_not_expired() {
        let mut f = sample_fact();
        assert!(f.is_active(2_000));
        f.expires_at = Some(1_500);
        assert!(!f.is_active(2_000));
        f.expires_at = Some(3_000);
        assert!(f.is_active(2_000));
        f.superseded_at = Some(1_500);
        assert!(!f.is_active(2_000));
    }

    #[test]
    fn bitemporal_validity_window() {
        let mut f = sample_fact();
        f.valid_from = 100;
        f.valid_until = Some(200);
        assert!(!f.valid_at(50));
        assert!(f.valid_at(100));
        assert!(f.valid_at(199));
        assert!(!f.valid_at(200));
    }

    #[test]
    fn reinforcement_quotes_cap_at_ten_most_recent() {
        let mut f = sample_fact();
        for i in 0..15 {
            f.push_reinforcement_quote(&format!("quote {i}"));
        }
        assert_eq!(f.reinforced_quotes.len(), 10);
        assert_eq!(f.reinforced_quotes[0], "quote 5");
        assert_eq!(f.reinforced_quotes[9], "quote 14");
    }

    #[test]
    fn reinforcement_quote_truncated_to_200_chars() {
        let mut f = sample_fact();
        f.push_reinforcement_quote(&"x".repeat(500));
        assert_eq!(f.reinforced_quotes[0].chars().count(), 200);
    }

    #[test]
    fn scope_filter_global_always_allowed() {
        let filter = ScopeFilter::default();
        assert!(filter.allows(Scope::Global, None));
        assert!(!filter.allows(Scope::User, Some("u1")));
    }

    #[test]
    fn scope_filter_matches_identifier() {
        let filter = ScopeFilter {
            user_id: Some("u1".into()),
            ..Default::default()
        };
        assert!(filter.allows(Scope::User, Some("u1")));
        assert!(!filter.allows(Scope::User, Some("u2")));
        assert!(!filter.allows(Scope::Agent, Some("u1")));
    }
}
