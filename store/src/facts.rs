//! Fact Store operations (spec §4.1): lexical search, filtered reads, decay,
//! supersession, reinforcement, tier compaction, and scope pruning.

use rusqlite::params;

use memnexus_core::{Error, Fact, Result, Scope, ScopeFilter, Tier, TierFilter};

use crate::FactStore;
use crate::convert::{self, to_storage_err};

/// Options shared by [`FactStore::get_by_id`].
#[derive(Debug, Clone, Default)]
pub struct GetOpts {
    /// Restrict visibility to this scope.
    pub scope_filter: Option<ScopeFilter>,
    /// Bitemporal as-of query time; `None` means "current".
    pub as_of: Option<i64>,
    /// Whether superseded rows may be returned.
    pub include_superseded: bool,
}

/// Options shared by [`FactStore::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchOpts {
    /// Restrict visibility to this scope.
    pub scope_filter: Option<ScopeFilter>,
    /// Tier inclusion policy.
    pub tier_filter: TierFilter,
    /// Restrict to facts carrying this tag.
    pub tag: Option<String>,
    /// Bitemporal as-of query time; `None` means "current".
    pub as_of: Option<i64>,
    /// Overrides the store's default reinforcement boost for this call.
    pub reinforcement_boost: Option<f32>,
}

/// Options shared by [`FactStore::lookup`].
pub type LookupOpts = SearchOpts;

/// Tier-compaction thresholds (spec §4.7).
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Seconds of recency required to remain/become hot.
    pub hot_window_secs: i64,
    /// Maximum number of hot facts tolerated before new ones fall back to warm.
    pub hot_max_facts: usize,
    /// Tag marking a fact as belonging to a completed task (forces cold).
    pub completed_task_tag: String,
    /// Days of inactivity after which a low-importance fact goes cold.
    pub inactive_preference_days: i64,
    /// Importance threshold below which inactivity triggers cold tiering.
    pub low_importance_threshold: f32,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            hot_window_secs: 3 * 24 * 3600,
            hot_max_facts: 50,
            completed_task_tag: "completed".into(),
            inactive_preference_days: 30,
            low_importance_threshold: 0.3,
        }
    }
}

/// Aggregate counts returned by [`FactStore::stats_breakdown`].
#[derive(Debug, Clone, Default)]
pub struct StatsBreakdown {
    /// Total active facts.
    pub active: usize,
    /// Count of active facts per tier, in `(hot, warm, cold)` order.
    pub by_tier: (usize, usize, usize),
    /// Count of superseded facts.
    pub superseded: usize,
}

const SECONDS_PER_DAY: f64 = 86_400.0;

fn freshness(source_date: Option<i64>, created_at: i64, now: i64) -> f32 {
    let anchor = source_date.unwrap_or(created_at);
    let age_days = ((now - anchor).max(0) as f64) / SECONDS_PER_DAY;
    (1.0 - age_days / 90.0).clamp(0.0, 1.0) as f32
}

fn composite_score(fact: &Fact, relevance: f32, now: i64, reinforcement_boost: f32) -> f32 {
    let fresh = freshness(fact.source_date, fact.created_at, now);
    let reinforcement = if fact.reinforced_count > 0 {
        reinforcement_boost
    } else {
        0.0
    };
    0.6 * relevance + 0.25 * fresh + 0.15 * fact.confidence + reinforcement
}

fn tie_break_key(fact: &Fact) -> i64 {
    fact.source_date.unwrap_or(fact.created_at)
}

/// Converts an FTS5 `bm25()` rank (smaller/more negative is a better match)
/// into a `[0, 1)` relevance score suitable for the composite formula.
fn bm25_to_relevance(rank: f64) -> f32 {
    let m = (-rank).max(0.0);
    (m / (1.0 + m)) as f32
}

fn passes_common_filters(
    fact: &Fact,
    now: i64,
    scope_filter: Option<&ScopeFilter>,
    tier_filter: TierFilter,
    tag: Option<&str>,
    as_of: Option<i64>,
    include_superseded: bool,
) -> bool {
    let at = as_of.unwrap_or(now);

    if !include_superseded && fact.superseded_as_of(at) {
        return false;
    }
    if fact.expires_at.is_some_and(|e| e <= now) {
        return false;
    }
    if !fact.valid_at(at) {
        return false;
    }
    if let Some(filter) = scope_filter {
        if !filter.allows(fact.scope, fact.scope_target.as_deref()) {
            return false;
        }
    }
    if tier_filter == TierFilter::Warm && fact.tier == Tier::Cold {
        return false;
    }
    if let Some(tag) = tag {
        if !fact.tags.contains(tag) {
            return false;
        }
    }
    true
}

impl FactStore {
    /// Inserts a new fact row, returning its id (spec §4.1 `store`).
    ///
    /// # Errors
    /// Returns [`Error::Validation`] if `text` is shorter than 2 characters,
    /// or [`Error::ScopeViolation`] if invariant 5 (`scope = global` implies
    /// no `scopeTarget`, any other scope requires one) is violated.
    pub fn store(&self, fact: &Fact) -> Result<String> {
        if fact.text.trim().chars().count() < 2 {
            return Err(Error::validation("fact text must be at least 2 characters"));
        }
        match fact.scope {
            Scope::Global if fact.scope_target.is_some() => {
                return Err(Error::ScopeViolation(
                    "global scope must not carry a scopeTarget".into(),
                ));
            }
            Scope::Global => {}
            _ if fact.scope_target.is_none() => {
                return Err(Error::ScopeViolation(format!(
                    "{:?} scope requires a scopeTarget",
                    fact.scope
                )));
            }
            _ => {}
        }

        let p = convert::FactParams::new(fact);
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        conn.execute(
            "INSERT INTO facts (
                id, text, normalized_text, summary, category, entity, key, value, tags,
                importance, confidence, decay_class, tier, scope, scope_target, source,
                created_at, last_confirmed_at, last_accessed, source_date, valid_from,
                valid_until, superseded_at, superseded_by, supersedes_id, expires_at,
                recall_count, reinforced_count, last_reinforced_at, reinforced_quotes
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30
            )",
            params![
                fact.id,
                fact.text,
                p.normalized_text,
                fact.summary,
                p.category,
                fact.entity,
                fact.key,
                fact.value,
                p.tags_json,
                fact.importance,
                fact.confidence,
                p.decay_class,
                p.tier,
                p.scope,
                fact.scope_target,
                fact.source,
                fact.created_at,
                fact.last_confirmed_at,
                fact.last_accessed,
                fact.source_date,
                fact.valid_from,
                fact.valid_until,
                fact.superseded_at,
                fact.superseded_by,
                fact.supersedes_id,
                fact.expires_at,
                fact.recall_count,
                fact.reinforced_count,
                fact.last_reinforced_at,
                p.quotes_json,
            ],
        )
        .map_err(to_storage_err)?;
        tracing::debug!(id = %fact.id, "stored fact");
        Ok(fact.id.clone())
    }

    /// Exact, deterministic duplicate check (spec §4.1): case-folded,
    /// whitespace-normalized text equality among active facts. Not semantic —
    /// semantic dedup lives in the vector store.
    pub fn has_duplicate(&self, text: &str) -> Result<bool> {
        let normalized = convert::normalize_for_dedup(text);
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM facts WHERE normalized_text = ?1 AND superseded_at IS NULL
                 AND (expires_at IS NULL OR expires_at > strftime('%s','now'))",
                [&normalized],
                |row| row.get(0),
            )
            .map_err(to_storage_err)?;
        Ok(count > 0)
    }

    /// Marks `id` as superseded by `replacement` (or tombstones it with no
    /// replacement). Returns `false` (not an error) if `id` is unknown,
    /// matching spec §4.1's "supersession against an unknown id returns
    /// false".
    pub fn supersede(&self, id: &str, replacement: Option<&str>, now: i64) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let changed = conn
            .execute(
                "UPDATE facts SET superseded_at = ?2, superseded_by = ?3
                 WHERE id = ?1 AND superseded_at IS NULL",
                params![id, now, replacement],
            )
            .map_err(to_storage_err)?;
        Ok(changed > 0)
    }

    /// Reads a single fact by id, honoring scope/asOf/includeSuperseded
    /// (spec §4.1 `getById`). `now` anchors "current" reads (`opts.as_of ==
    /// None`); it must be the caller's wall clock, not the fact's own
    /// `created_at`, or every fact would look freshly valid and never
    /// superseded or expired.
    pub fn get_by_id(&self, id: &str, now: i64, opts: &GetOpts) -> Result<Option<Fact>> {
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let fact = conn
            .query_row("SELECT * FROM facts WHERE id = ?1", [id], convert::row_to_fact)
            .ok();
        let Some(fact) = fact else { return Ok(None) };
        if !passes_common_filters(
            &fact,
            now,
            opts.scope_filter.as_ref(),
            TierFilter::All,
            None,
            opts.as_of,
            opts.include_superseded,
        ) {
            return Ok(None);
        }
        Ok(Some(fact))
    }

    /// Lexical (BM25-style) search producing the composite score defined in
    /// spec §4.1.
    pub fn search(&self, query: &str, limit: usize, now: i64, opts: &SearchOpts) -> Result<Vec<Fact>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT facts.*, bm25(facts_fts) AS rank FROM facts
                 JOIN facts_fts ON facts.rowid = facts_fts.rowid
                 WHERE facts_fts MATCH ?1
                 LIMIT 500",
            )
            .map_err(to_storage_err)?;

        let fts_query = fts5_escape(query);
        let boost = opts.reinforcement_boost.unwrap_or(self.default_reinforcement_boost);

        let mut scored: Vec<(f32, i64, Fact)> = stmt
            .query_map([&fts_query], |row| {
                let fact = convert::row_to_fact(row)?;
                let rank: f64 = row.get("rank")?;
                Ok((fact, rank))
            })
            .map_err(to_storage_err)?
            .filter_map(std::result::Result::ok)
            .filter(|(fact, _)| {
                passes_common_filters(
                    fact,
                    now,
                    opts.scope_filter.as_ref(),
                    opts.tier_filter,
                    opts.tag.as_deref(),
                    opts.as_of,
                    false,
                )
            })
            .map(|(fact, rank)| {
                let relevance = bm25_to_relevance(rank);
                let score = composite_score(&fact, relevance, now, boost);
                (score, tie_break_key(&fact), fact)
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(b.1.cmp(&a.1)));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, _, fact)| fact).collect())
    }

    /// Exact `(entity, key, tag)` lookup (spec §4.1 `lookup`).
    pub fn lookup(
        &self,
        entity: Option<&str>,
        key: Option<&str>,
        tag: Option<&str>,
        now: i64,
        opts: &LookupOpts,
    ) -> Result<Vec<Fact>> {
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM facts
                 WHERE (?1 IS NULL OR entity = ?1)
                   AND (?2 IS NULL OR key = ?2)
                 ORDER BY created_at DESC
                 LIMIT 500",
            )
            .map_err(to_storage_err)?;

        let facts: Vec<Fact> = stmt
            .query_map(params![entity, key], convert::row_to_fact)
            .map_err(to_storage_err)?
            .filter_map(std::result::Result::ok)
            .filter(|fact| {
                passes_common_filters(
                    fact,
                    now,
                    opts.scope_filter.as_ref(),
                    opts.tier_filter,
                    tag.or(opts.tag.as_deref()),
                    opts.as_of,
                    false,
                )
            })
            .collect();
        Ok(facts)
    }

    /// Structured fallback candidate lookup used by the classify step when
    /// embedding-based neighbours are unavailable (spec §4.5 step 4).
    pub fn find_similar_for_classification(
        &self,
        text: &str,
        entity: Option<&str>,
        key: Option<&str>,
        limit: usize,
        now: i64,
    ) -> Result<Vec<Fact>> {
        if entity.is_some() || key.is_some() {
            let mut byk = self.lookup(entity, key, None, now, &LookupOpts::default())?;
            byk.truncate(limit);
            if !byk.is_empty() {
                return Ok(byk);
            }
        }
        self.search(text, limit, now, &SearchOpts::default())
    }

    /// Hard-deletes rows past `expiresAt` (spec §4.1 `pruneExpired`).
    pub fn prune_expired(&self, now: i64) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let count = conn
            .execute("DELETE FROM facts WHERE expires_at IS NOT NULL AND expires_at <= ?1", [now])
            .map_err(to_storage_err)?;
        Ok(count)
    }

    /// Applies decay-class-driven confidence erosion, scheduling near-zero,
    /// non-permanent facts for hard prune (spec §4.1 `decayConfidence`).
    pub fn decay_confidence(&self, now: i64, grace_secs: i64, epsilon: f32) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, confidence, decay_class, last_confirmed_at FROM facts
                 WHERE superseded_at IS NULL AND decay_class != 'permanent'",
            )
            .map_err(to_storage_err)?;
        let rows: Vec<(String, f32, String, i64)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .map_err(to_storage_err)?
            .filter_map(std::result::Result::ok)
            .collect();
        drop(stmt);

        let mut touched = 0;
        for (id, confidence, decay_class, last_confirmed_at) in rows {
            let elapsed_days = ((now - last_confirmed_at).max(0) as f64) / SECONDS_PER_DAY;
            let rate = decay_rate(&decay_class, elapsed_days);
            let new_confidence = (confidence * rate).clamp(0.0, 1.0);
            if (new_confidence - confidence).abs() > f32::EPSILON {
                conn.execute(
                    "UPDATE facts SET confidence = ?2 WHERE id = ?1",
                    params![id, new_confidence],
                )
                .map_err(to_storage_err)?;
                touched += 1;
            }
            if new_confidence < epsilon {
                conn.execute(
                    "UPDATE facts SET expires_at = ?2 WHERE id = ?1 AND expires_at IS NULL",
                    params![id, now + grace_secs],
                )
                .map_err(to_storage_err)?;
            }
        }
        Ok(touched)
    }

    /// Increments `recallCount` and bumps `lastAccessed` for every id
    /// (spec §4.1 `refreshAccessedFacts`).
    pub fn refresh_accessed_facts(&self, ids: &[String], now: i64) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        for id in ids {
            conn.execute(
                "UPDATE facts SET recall_count = recall_count + 1, last_accessed = ?2 WHERE id = ?1",
                params![id, now],
            )
            .map_err(to_storage_err)?;
        }
        Ok(())
    }

    /// Appends a reinforcement annotation (spec §4.1 `reinforceFact`).
    pub fn reinforce_fact(&self, id: &str, quote: &str, now: i64) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let existing: Option<String> = conn
            .query_row("SELECT reinforced_quotes FROM facts WHERE id = ?1", [id], |row| row.get(0))
            .ok();
        let Some(existing) = existing else { return Ok(false) };
        let mut quotes: Vec<String> = serde_json::from_str(&existing).unwrap_or_default();
        let truncated: String = quote.chars().take(200).collect();
        quotes.push(truncated);
        let len = quotes.len();
        if len > 10 {
            quotes.drain(0..len - 10);
        }
        let quotes_json = serde_json::to_string(&quotes).unwrap_or_else(|_| "[]".into());
        conn.execute(
            "UPDATE facts SET reinforced_count = reinforced_count + 1,
                last_reinforced_at = ?2, reinforced_quotes = ?3 WHERE id = ?1",
            params![id, now, quotes_json],
        )
        .map_err(to_storage_err)?;
        Ok(true)
    }

    /// Recomputes each active fact's tier (spec §4.7 `runCompaction`).
    /// Mutates *only* the `tier` column (property P8).
    pub fn run_compaction(&self, cfg: &CompactionConfig, now: i64) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, category, tags, importance, last_accessed, tier FROM facts
                 WHERE superseded_at IS NULL",
            )
            .map_err(to_storage_err)?;
        let rows: Vec<(String, String, String, f32, i64, String)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })
            .map_err(to_storage_err)?
            .filter_map(std::result::Result::ok)
            .collect();
        drop(stmt);

        let mut hot_count = conn
            .query_row(
                "SELECT COUNT(*) FROM facts WHERE tier = 'hot' AND superseded_at IS NULL",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map_err(to_storage_err)? as usize;

        let mut changed = 0usize;
        for (id, category, tags_json, importance, last_accessed, current_tier) in rows {
            let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
            let idle = now - last_accessed;

            let is_hot_category = matches!(category.as_str(), "rule" | "decision");
            let completed = tags.iter().any(|t| t == &cfg.completed_task_tag);
            let inactive_low_importance = idle > cfg.inactive_preference_days * 86_400
                && importance < cfg.low_importance_threshold;

            let new_tier = if completed || inactive_low_importance {
                "cold"
            } else if is_hot_category
                && idle < cfg.hot_window_secs
                && (current_tier == "hot" || hot_count < cfg.hot_max_facts)
            {
                "hot"
            } else {
                "warm"
            };

            if new_tier != current_tier {
                conn.execute("UPDATE facts SET tier = ?2 WHERE id = ?1", params![id, new_tier])
                    .map_err(to_storage_err)?;
                if new_tier == "hot" {
                    hot_count += 1;
                } else if current_tier == "hot" {
                    hot_count = hot_count.saturating_sub(1);
                }
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Reassigns a fact's scope, e.g. when a session-scoped fact proves
    /// durable enough to promote to user scope. Returns `false` on scope
    /// mismatch (invariant 5) without erroring (spec §4.1).
    pub fn promote_scope(&self, id: &str, scope: Scope, target: Option<&str>) -> Result<bool> {
        if matches!(scope, Scope::Global) && target.is_some() {
            return Ok(false);
        }
        if !matches!(scope, Scope::Global) && target.is_none() {
            return Ok(false);
        }
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let changed = conn
            .execute(
                "UPDATE facts SET scope = ?2, scope_target = ?3 WHERE id = ?1",
                params![id, convert::scope_as_str(scope), target],
            )
            .map_err(to_storage_err)?;
        Ok(changed > 0)
    }

    /// Hard-deletes every fact scoped to `sessionId` (spec §4.1 `pruneSessionScope`).
    pub fn prune_session_scope(&self, session_id: &str) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let count = conn
            .execute(
                "DELETE FROM facts WHERE scope = 'session' AND scope_target = ?1",
                [session_id],
            )
            .map_err(to_storage_err)?;
        Ok(count)
    }

    /// Aggregate counts for operator visibility / tests.
    pub fn stats_breakdown(&self, now: i64) -> Result<StatsBreakdown> {
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let mut stmt = conn
            .prepare_cached("SELECT tier, superseded_at, expires_at FROM facts")
            .map_err(to_storage_err)?;
        let rows: Vec<(String, Option<i64>, Option<i64>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .map_err(to_storage_err)?
            .filter_map(std::result::Result::ok)
            .collect();

        let mut stats = StatsBreakdown::default();
        for (tier, superseded_at, expires_at) in rows {
            if superseded_at.is_some() {
                stats.superseded += 1;
                continue;
            }
            if expires_at.is_some_and(|e| e <= now) {
                continue;
            }
            stats.active += 1;
            match tier.as_str() {
                "hot" => stats.by_tier.0 += 1,
                "cold" => stats.by_tier.2 += 1,
                _ => stats.by_tier.1 += 1,
            }
        }
        Ok(stats)
    }

    /// Creates or strengthens a `RELATED_TO` link between two fact ids
    /// (spec §4.6 side effect, co-recall Hebbian association; spec §9's
    /// "store links in the relational engine, never cache as object graphs").
    pub fn strengthen_link(&self, a: &str, b: &str, now: i64) -> Result<()> {
        let (from, to) = if a <= b { (a, b) } else { (b, a) };
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        conn.execute(
            "INSERT INTO links (from_id, to_id, kind, strength, updated_at)
             VALUES (?1, ?2, 'related_to', 1.0, ?3)
             ON CONFLICT(from_id, to_id, kind)
             DO UPDATE SET strength = strength + 1.0, updated_at = ?3",
            params![from, to, now],
        )
        .map_err(to_storage_err)?;
        Ok(())
    }
}

fn decay_rate(class: &str, elapsed_days: f64) -> f32 {
    let half_life_days = match class {
        "stable" => 365.0,
        "volatile" => 14.0,
        _ => 90.0,
    };
    (0.5_f64.powf(elapsed_days / half_life_days)) as f32
}

/// Escapes an arbitrary query string for safe use inside an FTS5 `MATCH`
/// expression by quoting it as a single phrase.
fn fts5_escape(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}
