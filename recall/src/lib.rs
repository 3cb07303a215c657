//! # memnexus-recall
//!
//! The ten-stage recall pipeline (C7, spec §4.6): given a prompt and the
//! caller's identity, produce a context block to prepend to the next agent
//! turn. Never fails the caller — every subsystem failure degrades the block
//! rather than propagating (spec §7: "Recall pipeline never fails the
//! caller").

mod config;
mod directives;
mod format;
mod rescore;

use std::collections::HashMap;
use std::sync::Arc;

use memnexus_core::{
    Breadcrumb, CancelSignal, ChatParams, Clock, Fact, PendingWarnings, Procedure, ProcedureType,
};
use memnexus_llm::{ChatClient, EmbeddingClient, Tier as LlmTier};
use memnexus_scope::{ScopeDefaults, ScopeEvent};
use memnexus_store::{FactStore, GetOpts, LookupOpts, ProcedureSearchOpts, SearchOpts};
use memnexus_vector::VectorStore;

pub use config::{
    DirectiveConfig, DirectiveTrigger, EntityLookupConfig, FormatMode, GraphConfig, HydeConfig,
    RecallConfig, TieringConfig,
};

/// One recall invocation: the user prompt plus the identity it was issued under.
#[derive(Debug, Clone)]
pub struct RecallRequest {
    /// The user prompt (or the text the agent is about to respond to).
    pub prompt: String,
    /// Identity carried by the inbound event, resolved into a scope filter (step 1).
    pub scope_event: ScopeEvent,
}

impl RecallRequest {
    /// Builds a request with no identity context (resolves to an unrestricted
    /// scope filter, i.e. an orchestrator view).
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            scope_event: ScopeEvent::default(),
        }
    }
}

/// The rendered context block plus bookkeeping for side effects already applied.
#[derive(Debug, Clone)]
pub struct RecallResult {
    /// The text to prepend to the next agent turn. May be empty.
    pub context: String,
    /// Ids of every fact actually injected into `context` (bodies or index entries).
    pub included_ids: Vec<String>,
    /// The format the block was rendered in.
    pub format: FormatMode,
}

impl RecallResult {
    fn empty(format: FormatMode) -> Self {
        Self {
            context: String::new(),
            included_ids: Vec::new(),
            format,
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    fact: Fact,
    base_score: f32,
    directive_priority: bool,
}

fn upsert_candidate(candidates: &mut HashMap<String, Candidate>, fact: Fact, score: f32) {
    let id = fact.id.clone();
    candidates
        .entry(id)
        .and_modify(|c| {
            if score > c.base_score {
                c.base_score = score;
            }
        })
        .or_insert_with(|| Candidate {
            fact,
            base_score: score,
            directive_priority: false,
        });
}

/// Base score given to an exact entity-lookup hit; lower than a strong
/// lexical/vector match but still competitive once rescored (step 7).
const ENTITY_LOOKUP_BASE_SCORE: f32 = 0.6;
/// Base score given to a fact surfaced only by a directive sub-query.
const DIRECTIVE_BASE_SCORE: f32 = 0.5;

/// Converts a lexical search result's rank into a `[0, 1)` base score. The
/// Fact Store's `search` already sorts by its own composite score but does
/// not return the raw value, so rank position stands in for it here.
fn lexical_rank_score(rank: usize, total: usize) -> f32 {
    if total <= 1 {
        return 1.0;
    }
    1.0 - (rank as f32 / total as f32)
}

/// Blends a vector hit's cosine score with the fact's denormalized
/// importance into a full-row salience `s'` (spec §4.6 step 4).
fn vector_salience(cosine: f32, fact: &Fact) -> f32 {
    0.7 * cosine + 0.3 * fact.importance
}

fn procedure_score(p: &Procedure) -> f32 {
    let total = p.success_count + p.failure_count;
    let usage_weight = if total == 0 { 0.0 } else { (total as f32).ln_1p() / 10.0 };
    let reinforcement = (p.reinforced_count as f32).min(5.0) * 0.02;
    p.confidence + usage_weight + reinforcement
}

fn render_procedure_line(p: &Procedure) -> String {
    let emoji = match p.procedure_type {
        ProcedureType::Positive => "\u{2705}",
        ProcedureType::Negative => "\u{26a0}\u{fe0f}",
    };
    let pct = (p.confidence * 100.0).round() as i32;
    let chain = p
        .recipe
        .iter()
        .map(|s| s.summary.as_str())
        .collect::<Vec<_>>()
        .join(" \u{2192} ");
    format!("{emoji} ({pct}%) {}: {chain}", p.task_pattern)
}

/// The recall pipeline engine. Holds the shared store/vector/LLM handles and
/// the configuration every invocation reads.
pub struct RecallEngine {
    facts: Arc<FactStore>,
    vectors: Arc<VectorStore>,
    embeddings: Arc<EmbeddingClient>,
    chat: Arc<ChatClient>,
    clock: Arc<dyn Clock>,
    scope_defaults: ScopeDefaults,
    config: RecallConfig,
}

impl std::fmt::Debug for RecallEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecallEngine").finish_non_exhaustive()
    }
}

impl RecallEngine {
    /// Builds a recall engine over shared store/vector/LLM handles.
    #[must_use]
    pub fn new(
        facts: Arc<FactStore>,
        vectors: Arc<VectorStore>,
        embeddings: Arc<EmbeddingClient>,
        chat: Arc<ChatClient>,
        clock: Arc<dyn Clock>,
        scope_defaults: ScopeDefaults,
        config: RecallConfig,
    ) -> Self {
        Self {
            facts,
            vectors,
            embeddings,
            chat,
            clock,
            scope_defaults,
            config,
        }
    }

    /// Runs the full ten-stage pipeline for one prompt (spec §4.6).
    pub async fn recall(
        &self,
        request: RecallRequest,
        cancel: &CancelSignal,
        warnings: &mut PendingWarnings,
    ) -> RecallResult {
        if !self.config.enabled {
            return RecallResult::empty(self.config.injection_format);
        }
        let now = self.clock.now();

        // 1. Scope resolve.
        let scope_filter = memnexus_scope::resolve_scope_filter(&request.scope_event, &self.scope_defaults);

        // 2. Hot tier injection.
        let (hot_block, hot_ids) = self.hot_tier_block(scope_filter.as_ref(), now, warnings);

        // 3. Procedure suggestion.
        let procedure_block = self.procedure_suggestion_block(&request.prompt, scope_filter.as_ref(), warnings);

        // 4. Candidate retrieval (lexical + HyDE/vector).
        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        self.lexical_retrieval(&request.prompt, scope_filter.as_ref(), now, warnings, &mut candidates);
        self.vector_retrieval(&request.prompt, scope_filter.as_ref(), cancel, warnings, &mut candidates)
            .await;

        // 5. Entity lookup.
        self.entity_lookup(&request.prompt, scope_filter.as_ref(), now, warnings, &mut candidates);

        // 6. Retrieval directives.
        self.retrieval_directives(&request.prompt, scope_filter.as_ref(), now, warnings, &mut candidates);

        // 7. Global rescore.
        let mut scored: Vec<(f32, Candidate)> = candidates
            .into_values()
            .map(|c| {
                let mut s = rescore::global_rescore(c.base_score, &c.fact, now, &self.config);
                if c.directive_priority {
                    s *= rescore::DIRECTIVE_BOOST;
                }
                (s, c)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| rescore::tie_break_key(&b.1.fact).cmp(&rescore::tie_break_key(&a.1.fact)))
        });

        // 8. Cold filter, then truncate to the configured limit. Directive
        // priority boosts ranking but never bypasses the cold filter.
        let mut ordered: Vec<Fact> = scored
            .into_iter()
            .filter(|(_, c)| !self.config.tiering.enabled || c.fact.tier != memnexus_core::Tier::Cold)
            .map(|(_, c)| c.fact)
            .collect();
        ordered.truncate(self.config.limit);

        // 9. Format.
        let (body, body_ids) = self.format_block(&ordered, cancel, warnings).await;

        let mut context = String::new();
        if !hot_block.is_empty() {
            context.push_str(&hot_block);
            context.push('\n');
        }
        if !procedure_block.is_empty() {
            context.push_str(&procedure_block);
            context.push('\n');
        }
        context.push_str(&body);

        let mut included_ids = hot_ids;
        included_ids.extend(body_ids);

        // 10. Side effects.
        self.apply_side_effects(&included_ids, now, warnings);

        RecallResult {
            context,
            included_ids,
            format: self.config.injection_format,
        }
    }

    fn hot_tier_block(
        &self,
        scope_filter: Option<&memnexus_core::ScopeFilter>,
        now: i64,
        warnings: &mut PendingWarnings,
    ) -> (String, Vec<String>) {
        if !self.config.tiering.enabled {
            return (String::new(), Vec::new());
        }
        let opts = LookupOpts {
            scope_filter: scope_filter.cloned(),
            tier_filter: memnexus_core::TierFilter::All,
            ..Default::default()
        };
        match self.facts.lookup(None, None, None, now, &opts) {
            Ok(facts) => {
                let mut hot: Vec<Fact> =
                    facts.into_iter().filter(|f| f.tier == memnexus_core::Tier::Hot).collect();
                hot.truncate(self.config.tiering.hot_max_facts);
                let (block, ids) = format::render_bulleted(
                    &hot,
                    FormatMode::Full,
                    self.config.tiering.hot_max_tokens,
                    self.config.max_per_memory_chars,
                    None,
                );
                if block.is_empty() {
                    (String::new(), Vec::new())
                } else {
                    (format!("## Active memory\n{block}"), ids)
                }
            }
            Err(e) => {
                warnings.push(Breadcrumb::from_error("hot_tier_lookup", None, &e));
                (String::new(), Vec::new())
            }
        }
    }

    fn procedure_suggestion_block(
        &self,
        prompt: &str,
        scope_filter: Option<&memnexus_core::ScopeFilter>,
        warnings: &mut PendingWarnings,
    ) -> String {
        let opts = ProcedureSearchOpts {
            scope_filter: scope_filter.cloned(),
            ..Default::default()
        };
        let procedures = match self.facts.search_procedures_ranked(prompt, 5, &opts) {
            Ok(p) => p,
            Err(e) => {
                warnings.push(Breadcrumb::from_error("search_procedures_ranked", None, &e));
                return String::new();
            }
        };

        let (positive, negative): (Vec<_>, Vec<_>) =
            procedures.into_iter().partition(|p| procedure_score(p) > 0.4);

        let mut block = String::new();
        if !positive.is_empty() {
            block.push_str("## Suggested procedures\n");
            for p in &positive {
                block.push_str(&render_procedure_line(p));
                block.push('\n');
            }
        }
        if !negative.is_empty() {
            block.push_str("## Procedures to avoid\n");
            for p in &negative {
                block.push_str(&render_procedure_line(p));
                block.push('\n');
            }
        }
        block.trim_end().to_string()
    }

    fn lexical_retrieval(
        &self,
        prompt: &str,
        scope_filter: Option<&memnexus_core::ScopeFilter>,
        now: i64,
        warnings: &mut PendingWarnings,
        candidates: &mut HashMap<String, Candidate>,
    ) {
        let tier_filter = if self.config.tiering.enabled {
            memnexus_core::TierFilter::Warm
        } else {
            memnexus_core::TierFilter::All
        };
        let opts = SearchOpts {
            scope_filter: scope_filter.cloned(),
            tier_filter,
            ..Default::default()
        };
        match self.facts.search(prompt, self.config.search_limit, now, &opts) {
            Ok(hits) => {
                let total = hits.len();
                for (rank, fact) in hits.into_iter().enumerate() {
                    let score = lexical_rank_score(rank, total);
                    upsert_candidate(candidates, fact, score);
                }
            }
            Err(e) => warnings.push(Breadcrumb::from_error("lexical_search", None, &e)),
        }
    }

    async fn hyde_rewrite(&self, prompt: &str, cancel: &CancelSignal, warnings: &mut PendingWarnings) -> String {
        if !self.config.hyde.enabled {
            return prompt.to_string();
        }
        let messages = memnexus_core::oneshot(
            "Write a single 1-2 sentence hypothetical, declarative answer to the user's question. \
             State it as fact; do not hedge or mention that you are guessing.",
            prompt,
        );
        match self
            .chat
            .complete(LlmTier::Nano, &messages, &ChatParams::default(), cancel, warnings)
            .await
        {
            Ok(text) if !text.trim().is_empty() => text,
            _ => prompt.to_string(),
        }
    }

    async fn vector_retrieval(
        &self,
        prompt: &str,
        scope_filter: Option<&memnexus_core::ScopeFilter>,
        cancel: &CancelSignal,
        warnings: &mut PendingWarnings,
        candidates: &mut HashMap<String, Candidate>,
    ) {
        let branch = async {
            let query_text = self.hyde_rewrite(prompt, cancel, warnings).await;
            let vector = self.embeddings.embed(&query_text).await?;
            let k = 2 * self.config.limit;
            self.vectors.search(&vector, k, self.config.min_score)
        };

        match tokio::time::timeout(self.config.hyde.timeout, branch).await {
            Ok(Ok(hits)) => {
                for hit in hits {
                    let opts = GetOpts {
                        scope_filter: scope_filter.cloned(),
                        ..Default::default()
                    };
                    match self.facts.get_by_id(&hit.id, self.clock.now(), &opts) {
                        Ok(Some(fact)) => {
                            let score = vector_salience(hit.score, &fact);
                            upsert_candidate(candidates, fact, score);
                        }
                        Ok(None) => {}
                        Err(e) => warnings.push(Breadcrumb::from_error("vector_rehydrate", Some(hit.id), &e)),
                    }
                }
            }
            Ok(Err(e)) => warnings.push(Breadcrumb::from_error("vector_search", None, &e)),
            Err(_) => {
                cancel.cancel();
                warnings.push(Breadcrumb {
                    subsystem: "recall",
                    operation: "vector_hyde_branch",
                    id: None,
                    message: "vector/HyDE branch exceeded its deadline; continuing lexical-only".into(),
                });
            }
        }
    }

    fn entity_lookup(
        &self,
        prompt: &str,
        scope_filter: Option<&memnexus_core::ScopeFilter>,
        now: i64,
        warnings: &mut PendingWarnings,
        candidates: &mut HashMap<String, Candidate>,
    ) {
        if !self.config.entity_lookup.enabled {
            return;
        }
        for entity in directives::matched_entities(prompt, &self.config.entity_lookup.entities) {
            let opts = LookupOpts {
                scope_filter: scope_filter.cloned(),
                ..Default::default()
            };
            match self.facts.lookup(Some(&entity), None, None, now, &opts) {
                Ok(mut hits) => {
                    hits.truncate(self.config.entity_lookup.max_facts_per_entity);
                    for fact in hits {
                        upsert_candidate(candidates, fact, ENTITY_LOOKUP_BASE_SCORE);
                    }
                }
                Err(e) => warnings.push(Breadcrumb::from_error("entity_lookup", Some(entity), &e)),
            }
        }
    }

    fn retrieval_directives(
        &self,
        prompt: &str,
        scope_filter: Option<&memnexus_core::ScopeFilter>,
        now: i64,
        warnings: &mut PendingWarnings,
        candidates: &mut HashMap<String, Candidate>,
    ) {
        if !self.config.retrieval_directives.enabled {
            return;
        }
        let fired = directives::fired_triggers(
            prompt,
            &self.config.retrieval_directives.triggers,
            self.config.retrieval_directives.max_per_prompt,
        );
        for trigger in fired {
            let opts = SearchOpts {
                scope_filter: scope_filter.cloned(),
                ..Default::default()
            };
            match self.facts.search(prompt, self.config.search_limit, now, &opts) {
                Ok(hits) => {
                    for fact in hits {
                        let id = fact.id.clone();
                        upsert_candidate(candidates, fact, DIRECTIVE_BASE_SCORE);
                        if let Some(c) = candidates.get_mut(&id) {
                            c.directive_priority = true;
                        }
                    }
                }
                Err(e) => {
                    warnings.push(Breadcrumb::from_error("retrieval_directive", Some(trigger.name.clone()), &e));
                }
            }
        }
    }

    async fn format_block(
        &self,
        ordered: &[Fact],
        cancel: &CancelSignal,
        warnings: &mut PendingWarnings,
    ) -> (String, Vec<String>) {
        match self.config.injection_format {
            FormatMode::Progressive => {
                format::render_progressive_index(ordered, self.config.progressive_index_max_tokens)
            }
            FormatMode::ProgressiveHybrid => format::render_progressive_hybrid(ordered, &self.config),
            mode => {
                let (block, included) = format::render_bulleted(
                    ordered,
                    mode,
                    self.config.max_tokens,
                    self.config.max_per_memory_chars,
                    None,
                );
                if included.len() == ordered.len() || !self.config.summarize_when_over_budget {
                    return (block, included);
                }
                let overflow = &ordered[included.len()..];
                match self.summarize_overflow(overflow, cancel, warnings).await {
                    Ok(summary) => format::render_bulleted(
                        ordered,
                        mode,
                        self.config.max_tokens,
                        self.config.max_per_memory_chars,
                        Some(&summary),
                    ),
                    Err(_) => (block, included),
                }
            }
        }
    }

    async fn summarize_overflow(
        &self,
        overflow: &[Fact],
        cancel: &CancelSignal,
        warnings: &mut PendingWarnings,
    ) -> Result<String, memnexus_core::LlmError> {
        let joined = overflow.iter().map(|f| f.text.as_str()).collect::<Vec<_>>().join("\n");
        let messages = memnexus_core::oneshot(
            "Summarize the following memories into one compact sentence, preserving every key fact.",
            joined,
        );
        self.chat
            .complete(LlmTier::Nano, &messages, &ChatParams::default(), cancel, warnings)
            .await
    }

    fn apply_side_effects(&self, ids: &[String], now: i64, warnings: &mut PendingWarnings) {
        if ids.is_empty() {
            return;
        }
        if let Err(e) = self.facts.refresh_accessed_facts(ids, now) {
            warnings.push(Breadcrumb::from_error("refresh_accessed_facts", None, &e));
        }
        if !self.config.graph.enabled || ids.len() < 2 {
            return;
        }
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                if let Err(e) = self.facts.strengthen_link(&ids[i], &ids[j], now) {
                    warnings.push(Breadcrumb::from_error("strengthen_link", None, &e));
                }
            }
        }
    }
}
