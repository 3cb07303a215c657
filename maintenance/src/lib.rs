//! # memnexus-maintenance
//!
//! The background maintenance engine (C8): prune, decay, tier-compaction,
//! find-duplicates/consolidate, reflect, procedure/reinforcement extraction,
//! self-correction, and the job scheduler that ties them together (spec
//! §4.7–4.8). Every operation here is idempotent and degrades gracefully on
//! LLM/embedding failure rather than failing the maintenance pass.

mod config;
mod consolidate;
mod dedupe;
mod reflect;
mod scheduler;
mod self_correction;
mod transcript;

use std::sync::Arc;

use memnexus_core::{CancelSignal, Clock, PendingWarnings, Result, Scope, TierFilter};
use memnexus_llm::{ChatClient, EmbeddingClient};
use memnexus_procedures::{ProcedureEngine, RecordOutcome};
use memnexus_store::{CompactionConfig, FactStore, LookupOpts, ProcedureSearchOpts};
use memnexus_vector::VectorStore;
use memnexus_wal::WriteAheadLog;

pub use config::{DedupeConfig, DistillConfig, MaintenanceConfig, ReflectionConfig, SelfCorrectionConfig};
pub use dedupe::{cluster_pairs, find_duplicate_pairs, DuplicatePair};
pub use reflect::ReflectOutcome;
pub use scheduler::{Job, JobStatus, Scheduler};
pub use self_correction::{AppliedOutcome, DailyCap, Remediation, ToolsRuleWriter};
pub use transcript::{extract_praise_signals, extract_tool_chains, extract_turns, parse_transcript, PraiseSignal, ToolChain, Turn};

/// Outcome of one `prune` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PruneOutcome {
    /// Rows hard-deleted for having passed `expiresAt`.
    pub expired: usize,
    /// Rows whose confidence was decayed (and possibly scheduled for expiry).
    pub decayed: usize,
}

/// The maintenance engine: orchestrates every C8 operation over a shared
/// fact store, vector store, and LLM/embedding clients.
pub struct MaintenanceEngine {
    facts: Arc<FactStore>,
    vectors: Arc<VectorStore>,
    embeddings: Arc<EmbeddingClient>,
    chat: Arc<ChatClient>,
    wal: Arc<WriteAheadLog>,
    procedures: Arc<ProcedureEngine>,
    clock: Arc<dyn Clock>,
    config: MaintenanceConfig,
}

impl std::fmt::Debug for MaintenanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceEngine").field("config", &self.config).finish_non_exhaustive()
    }
}

impl MaintenanceEngine {
    /// Builds an engine over shared component handles.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        facts: Arc<FactStore>,
        vectors: Arc<VectorStore>,
        embeddings: Arc<EmbeddingClient>,
        chat: Arc<ChatClient>,
        wal: Arc<WriteAheadLog>,
        procedures: Arc<ProcedureEngine>,
        clock: Arc<dyn Clock>,
        config: MaintenanceConfig,
    ) -> Self {
        Self { facts, vectors, embeddings, chat, wal, procedures, clock, config }
    }

    /// Runs `pruneExpired` then `decayConfidence` (spec §4.7 Prune).
    pub fn prune(&self, grace_secs: i64, epsilon: f32) -> Result<PruneOutcome> {
        let now = self.clock.now();
        let expired = self.facts.prune_expired(now)?;
        let decayed = self.facts.decay_confidence(now, grace_secs, epsilon)?;
        Ok(PruneOutcome { expired, decayed })
    }

    /// Recomputes every fact's tier (spec §4.7 Tier compaction). Property
    /// P8: changes only `tier`, never adds/removes/otherwise mutates a fact.
    pub fn compact(&self, cfg: &CompactionConfig) -> Result<usize> {
        self.facts.run_compaction(cfg, self.clock.now())
    }

    /// Samples up to `dedupe.sample_limit` active facts and returns candidate
    /// duplicate pairs (spec §4.7 Find-duplicates).
    pub fn find_duplicates(&self) -> Result<Vec<DuplicatePair>> {
        if !self.config.dedupe.enabled {
            return Ok(Vec::new());
        }
        let now = self.clock.now();
        let mut sample = self.facts.lookup(None, None, None, now, &LookupOpts { tier_filter: TierFilter::All, ..LookupOpts::default() })?;
        sample.truncate(self.config.dedupe.sample_limit);
        Ok(find_duplicate_pairs(&sample, &self.vectors, self.config.dedupe.threshold, self.config.dedupe.include_structured))
    }

    /// Runs find-duplicates, clusters the resulting pairs, and consolidates
    /// each cluster of two or more (spec §4.7 Consolidate). Returns the ids
    /// of the newly written canonical facts; a cluster that fails to merge
    /// (LLM/embedding failure, or a race that leaves fewer than two ids
    /// live) contributes nothing and is recorded only as a breadcrumb.
    pub async fn consolidate(&self, cancel: &CancelSignal, warnings: &mut PendingWarnings) -> Result<Vec<String>> {
        let pairs = self.find_duplicates()?;
        let clusters = cluster_pairs(&pairs);
        let mut merged = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            if let Some(new_id) = consolidate::consolidate_cluster(
                &cluster,
                &self.facts,
                &self.vectors,
                &self.embeddings,
                &self.chat,
                &self.wal,
                self.clock.as_ref(),
                cancel,
                warnings,
            )
            .await?
            {
                merged.push(new_id);
            }
        }
        Ok(merged)
    }

    /// Runs the three-stage pattern/rule/meta-pattern extraction (spec §4.7 Reflect).
    pub async fn reflect(&self, cancel: &CancelSignal, warnings: &mut PendingWarnings) -> Result<ReflectOutcome> {
        reflect::run_reflection(&self.facts, &self.chat, self.clock.as_ref(), &self.config.reflection, cancel, warnings).await
    }

    /// Scans a raw transcript for tool-call chains and records each as a
    /// procedure (spec §4.7 Procedure extraction).
    pub fn extract_procedures(&self, raw_transcript: &str, scope: Scope, scope_target: Option<String>) -> Result<Vec<RecordOutcome>> {
        let turns = extract_turns(&parse_transcript(raw_transcript));
        let chains = extract_tool_chains(&turns, self.config.distill.min_procedure_steps);
        chains
            .into_iter()
            .map(|chain| {
                self.procedures.record(
                    uuid::Uuid::new_v4().to_string(),
                    chain.task_pattern,
                    chain.steps,
                    chain.outcome,
                    scope,
                    scope_target.clone(),
                )
            })
            .collect()
    }

    /// Scans a raw transcript for praise signals and reinforces the facts
    /// named in `recalled_ids` (spec §4.7 Reinforcement extraction: "identify
    /// memory ids recalled immediately before the praised response"). This
    /// engine has no recall-history of its own, so the caller — the one
    /// component that does, the recall pipeline — supplies the ids that were
    /// actually injected ahead of the praised reply. When a praise signal's
    /// preceding tool-call chain is length ≥2, the best-matching procedure
    /// (by lexical rank against the chain's tool names) is reinforced too.
    pub fn extract_reinforcement(&self, raw_transcript: &str, recalled_ids: &[String]) -> Result<(usize, usize)> {
        if !self.config.distill.extract_reinforcement {
            return Ok((0, 0));
        }
        let now = self.clock.now();
        let turns = extract_turns(&parse_transcript(raw_transcript));
        let signals = extract_praise_signals(&turns);

        let mut facts_reinforced = 0;
        let mut procedures_reinforced = 0;
        for signal in &signals {
            for id in recalled_ids {
                if self.facts.reinforce_fact(id, &signal.quote, now)? {
                    facts_reinforced += 1;
                }
            }
            if signal.preceding_tool_chain.len() >= 2 {
                let query = signal.preceding_tool_chain.iter().map(|s| s.tool.as_str()).collect::<Vec<_>>().join(" ");
                let candidates = self.facts.search_procedures_ranked(&query, 1, &ProcedureSearchOpts::default())?;
                if let Some(top) = candidates.first() {
                    if self.procedures.validate(&top.id, true, now)? {
                        procedures_reinforced += 1;
                    }
                }
            }
        }
        Ok((facts_reinforced, procedures_reinforced))
    }

    /// Scans parsed turns for correction signals and applies remediations
    /// (spec §4.7 Self-correction).
    pub async fn run_self_correction(
        &self,
        turns: &[Turn],
        tools_writer: &dyn ToolsRuleWriter,
        cap: &mut DailyCap,
        cancel: &CancelSignal,
        warnings: &mut PendingWarnings,
    ) -> Result<Vec<AppliedOutcome>> {
        self_correction::run_self_correction(turns, &self.facts, &self.chat, tools_writer, self.clock.as_ref(), &self.config.self_correction, cap, cancel, warnings).await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use memnexus_core::{llm::LanguageModel, embedding::EmbeddingModel, Category, DecayClass, Fact, FixedClock, LlmError, Message, ChatParams, Tier, VectorRecord};
    use memnexus_llm::{ModelBinding, RetryPolicy, TierChain};
    use memnexus_procedures::{FsSkillWriter, ProcedureConfig};
    use tempfile::tempdir;

    use super::*;

    struct FakeEmbedder;
    #[async_trait]
    impl EmbeddingModel for FakeEmbedder {
        fn dim(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    struct ScriptedLlm {
        response: String,
    }
    #[async_trait]
    impl LanguageModel for ScriptedLlm {
        async fn complete(&self, _model: &str, _messages: &[Message], _params: &ChatParams) -> std::result::Result<String, LlmError> {
            Ok(self.response.clone())
        }
    }

    fn fact(id: &str, text: &str) -> Fact {
        Fact {
            id: id.into(),
            text: text.into(),
            summary: None,
            category: Category::Fact,
            entity: None,
            key: None,
            value: None,
            tags: Default::default(),
            importance: 0.5,
            confidence: 0.8,
            decay_class: DecayClass::Default,
            tier: Tier::Warm,
            scope: Scope::Global,
            scope_target: None,
            source: "test".into(),
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

    fn engine(dir: &tempfile::TempDir, response: &str) -> MaintenanceEngine {
        let facts = Arc::new(FactStore::open_in_memory().unwrap());
        let vectors = memnexus_vector::open(dir.path().join("v.redb"), 2).unwrap();
        let wal = Arc::new(WriteAheadLog::open(dir.path().join("wal")).unwrap());
        let embeddings = Arc::new(EmbeddingClient::new(Arc::new(FakeEmbedder)));
        let binding = ModelBinding::new("stub", Arc::new(ScriptedLlm { response: response.to_string() }) as Arc<dyn LanguageModel>);
        let chain = TierChain::new(binding, Vec::new());
        let chat = Arc::new(ChatClient::new(chain.clone(), chain.clone(), chain, RetryPolicy::default()));
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(2_000));
        let skills_dir = dir.path().join("skills");
        let writer = Arc::new(FsSkillWriter::new(skills_dir));
        let procedures = Arc::new(ProcedureEngine::new(facts.clone(), writer, ProcedureConfig::default()));
        MaintenanceEngine::new(facts, vectors, embeddings, chat, wal, procedures, clock, MaintenanceConfig::default())
    }

    #[test]
    fn prune_reports_expired_and_decayed_counts() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, "unused");
        let mut expiring = fact("f1", "temp fact");
        expiring.expires_at = Some(1_000);
        engine.facts.store(&expiring).unwrap();
        let outcome = engine.prune(0, 0.01).unwrap();
        assert_eq!(outcome.expired, 1);
    }

    #[tokio::test]
    async fn consolidate_merges_duplicate_cluster_end_to_end() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, "canonical merged statement");
        engine.facts.store(&fact("f1", "likes dark mode")).unwrap();
        engine.facts.store(&fact("f2", "prefers dark mode")).unwrap();
        engine.vectors.store(VectorRecord { id: "f1".into(), text: "a".into(), vector: vec![1.0, 0.0], category: Category::Fact, importance: 0.5 }).unwrap();
        engine.vectors.store(VectorRecord { id: "f2".into(), text: "b".into(), vector: vec![0.999, 0.001], category: Category::Fact, importance: 0.5 }).unwrap();

        let mut warnings = PendingWarnings::new();
        let merged = engine.consolidate(&CancelSignal::new(), &mut warnings).await.unwrap();
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn extract_procedures_records_chains_from_transcript() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, "unused");
        let raw = [
            serde_json::json!({"type":"message","message":{"role":"user","content":[{"type":"text","text":"fix the build"}]}}).to_string(),
            serde_json::json!({"type":"message","message":{"role":"assistant","content":[
                {"type":"tool_use","name":"run_tests","input":{}},
                {"type":"tool_use","name":"edit_file","input":{}}
            ]}}).to_string(),
            serde_json::json!({"type":"message","message":{"role":"user","content":[{"type":"text","text":"thanks, perfect"}]}}).to_string(),
        ]
        .join("\n");
        let outcomes = engine.extract_procedures(&raw, Scope::Global, None).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], RecordOutcome::Stored(_)));
    }

    #[test]
    fn extract_reinforcement_reinforces_recalled_ids_on_praise() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, "unused");
        engine.facts.store(&fact("f1", "some fact")).unwrap();
        let raw = [
            serde_json::json!({"type":"message","message":{"role":"assistant","content":[{"type":"text","text":"done"}]}}).to_string(),
            serde_json::json!({"type":"message","message":{"role":"user","content":[{"type":"text","text":"perfect, thanks"}]}}).to_string(),
        ]
        .join("\n");
        let (facts_reinforced, _) = engine.extract_reinforcement(&raw, &["f1".to_string()]).unwrap();
        assert_eq!(facts_reinforced, 1);
        let updated = engine.facts.get_by_id("f1", 2_000, &memnexus_store::GetOpts::default()).unwrap().unwrap();
        assert_eq!(updated.reinforced_count, 1);
    }
}
