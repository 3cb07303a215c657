//! # memnexus
//!
//! A hybrid structured/vector memory engine for long-running LLM agents:
//! a relational fact store and a vector index behind one classify-before-write
//! ingest path and one budget-aware recall pipeline, with a background
//! maintenance engine that keeps the memory set small, fresh, and self-correcting.
//!
//! This crate is the façade. It wires the component crates —
//! [`memnexus_store`], [`memnexus_vector`], [`memnexus_wal`], [`memnexus_llm`],
//! [`memnexus_scope`], [`memnexus_ingest`], [`memnexus_recall`],
//! [`memnexus_procedures`], and [`memnexus_maintenance`] — into one
//! [`MemoryEngine`] a host application constructs once and calls for the
//! lifetime of a session.

pub mod config;

use std::path::Path;
use std::sync::Arc;

use memnexus_core::{
    CancelSignal, Category, Clock, DecayClass, EmbeddingModel, LanguageModel, PendingWarnings, Procedure,
    Result, Scope, SystemClock,
};
use memnexus_ingest::{CredentialVault, IngestEngine, IngestRequest, Outcome as IngestOutcome};
use memnexus_llm::{ChatClient, EmbeddingClient, ModelBinding, RetryPolicy, TierChain};
use memnexus_maintenance::{AppliedOutcome, DailyCap, MaintenanceEngine, PruneOutcome, ReflectOutcome, Scheduler, ToolsRuleWriter, Turn};
use memnexus_procedures::{FsSkillWriter, ProcedureEngine, ReinforceOutcome};
use memnexus_recall::{RecallEngine, RecallRequest, RecallResult};
use memnexus_scope::{ScopeDefaults, ScopeEvent};
use memnexus_store::{CompactionConfig, FactStore};
use memnexus_vector::VectorStore;
use memnexus_wal::WriteAheadLog;

pub use config::Config;

/// Where each on-disk component lives (spec §6.2: one data directory per
/// deployment, split into a relational DB file, a vector index file, and a
/// WAL directory).
#[derive(Debug, Clone)]
pub struct StoragePaths {
    /// Fact store database file.
    pub facts: std::path::PathBuf,
    /// Vector index file.
    pub vectors: std::path::PathBuf,
    /// Write-ahead log directory.
    pub wal: std::path::PathBuf,
}

impl StoragePaths {
    /// The conventional layout rooted at `dir`: `dir/facts.redb`,
    /// `dir/vectors.redb`, `dir/wal/`.
    #[must_use]
    pub fn under(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            facts: dir.join("facts.redb"),
            vectors: dir.join("vectors.redb"),
            wal: dir.join("wal"),
        }
    }
}

/// The model providers a host injects — this crate carries no concrete
/// provider SDK dependency, only the trait seams [`EmbeddingModel`] and
/// [`LanguageModel`] defined in [`memnexus_core`].
pub struct Providers {
    /// Embedding provider, shared across every tier.
    pub embedding: Arc<dyn EmbeddingModel>,
    /// `llm.nano` tier chain: HyDE rewrites and overflow summarization.
    pub nano: TierChain,
    /// `llm.default` tier chain: classify-before-write and recall-time calls.
    pub default: TierChain,
    /// `llm.heavy` tier chain: consolidation merges and reflection.
    pub heavy: TierChain,
}

impl Providers {
    /// Builds a `Providers` set where every tier falls back to the same
    /// single model, for deployments that don't configure per-tier fallback
    /// chains.
    #[must_use]
    pub fn single(embedding: Arc<dyn EmbeddingModel>, model_id: impl Into<String>, model: Arc<dyn LanguageModel>) -> Self {
        let binding = ModelBinding::new(model_id, model);
        let chain = TierChain::new(binding, Vec::new());
        Self { embedding, nano: chain.clone(), default: chain.clone(), heavy: chain }
    }
}

/// The assembled memory engine: every component crate wired together behind
/// one set of high-level operations. Construct one per deployment (or per
/// test) and share it behind an `Arc` across concurrent callers.
pub struct MemoryEngine {
    facts: Arc<FactStore>,
    vectors: Arc<VectorStore>,
    wal: Arc<WriteAheadLog>,
    embeddings: Arc<EmbeddingClient>,
    chat: Arc<ChatClient>,
    clock: Arc<dyn Clock>,
    scope_defaults: ScopeDefaults,
    ingest: IngestEngine,
    recall: RecallEngine,
    procedures: Arc<ProcedureEngine>,
    maintenance: MaintenanceEngine,
    scheduler: Scheduler,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine").finish_non_exhaustive()
    }
}

impl MemoryEngine {
    /// Opens (or creates) a disk-backed engine at `paths`, wiring in
    /// `providers` and `config`. Uses [`SystemClock`] unless `clock` is
    /// overridden with [`MemoryEngine::open_with_clock`].
    pub fn open(paths: &StoragePaths, providers: Providers, scope_defaults: ScopeDefaults, config: Config) -> Result<Self> {
        Self::open_with_clock(paths, providers, scope_defaults, config, Arc::new(SystemClock))
    }

    /// As [`MemoryEngine::open`], with an explicit clock (spec property P6:
    /// deterministic recall/maintenance under a fixed clock in tests).
    pub fn open_with_clock(
        paths: &StoragePaths,
        providers: Providers,
        scope_defaults: ScopeDefaults,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let facts = Arc::new(FactStore::open(&paths.facts)?);
        let vectors = memnexus_vector::open(&paths.vectors, providers.embedding.dim())?;
        let wal = Arc::new(WriteAheadLog::open(&paths.wal)?);
        let embeddings = Arc::new(EmbeddingClient::new(providers.embedding));
        let chat = Arc::new(ChatClient::new(providers.nano, providers.default, providers.heavy, RetryPolicy::default()));
        Self::assemble(facts, vectors, wal, embeddings, chat, scope_defaults, config, clock)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        facts: Arc<FactStore>,
        vectors: Arc<VectorStore>,
        wal: Arc<WriteAheadLog>,
        embeddings: Arc<EmbeddingClient>,
        chat: Arc<ChatClient>,
        scope_defaults: ScopeDefaults,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let vault: Option<Arc<dyn CredentialVault>> = None;
        let ingest_config = config.ingest_config(vault);
        let ingest = IngestEngine::new(facts.clone(), vectors.clone(), wal.clone(), embeddings.clone(), chat.clone(), clock.clone(), ingest_config);

        let recall = RecallEngine::new(facts.clone(), vectors.clone(), embeddings.clone(), chat.clone(), clock.clone(), scope_defaults.clone(), config.recall.clone());

        let writer = Arc::new(FsSkillWriter::new(config.procedures.skills_auto_path.clone()));
        let procedures = Arc::new(ProcedureEngine::new(facts.clone(), writer, config.procedures.clone()));

        let maintenance = MaintenanceEngine::new(
            facts.clone(),
            vectors.clone(),
            embeddings.clone(),
            chat.clone(),
            wal.clone(),
            procedures.clone(),
            clock.clone(),
            config.maintenance.clone(),
        );

        let scheduler = default_scheduler(clock.now());

        Ok(Self { facts, vectors, wal, embeddings, chat, clock, scope_defaults, ingest, recall, procedures, maintenance, scheduler })
    }

    /// Runs the classify-before-write ingest pipeline for one statement (C6).
    pub async fn ingest(&self, request: IngestRequest, cancel: &CancelSignal, warnings: &mut PendingWarnings) -> Result<IngestOutcome> {
        self.ingest.ingest(request, cancel, warnings).await
    }

    /// Runs the ten-stage recall pipeline for one prompt (C7). Never fails
    /// the caller; degrades its block on subsystem errors instead.
    pub async fn recall(&self, request: RecallRequest, cancel: &CancelSignal, warnings: &mut PendingWarnings) -> RecallResult {
        self.recall.recall(request, cancel, warnings).await
    }

    /// Ranked procedure suggestions for a task description (C9), split into
    /// positive and negative sections.
    pub fn suggest_procedures(&self, task: &str, k: usize, scope_event: &ScopeEvent) -> Result<(Vec<Procedure>, Vec<Procedure>)> {
        let scope_filter = memnexus_scope::resolve_scope_filter(scope_event, &self.scope_defaults);
        self.procedures.suggest(task, k, scope_filter)
    }

    /// Records a successful or failed execution against a procedure (C9 validation).
    pub fn validate_procedure(&self, id: &str, succeeded: bool) -> Result<bool> {
        self.procedures.validate(id, succeeded, self.clock.now())
    }

    /// Praise-triggered reinforcement for a single procedure (C9), outside
    /// the transcript-scanning path `run_maintenance_tick` drives.
    pub fn reinforce_procedure(&self, id: &str, quote: &str, warnings: &mut PendingWarnings) -> Result<ReinforceOutcome> {
        self.procedures.reinforce(id, quote, warnings)
    }

    /// Removes every fact scoped to `session_id` (spec §4.10 scope prune —
    /// used when a session ends and its working memory should not persist).
    pub fn prune_session_scope(&self, session_id: &str) -> Result<usize> {
        self.facts.prune_session_scope(session_id)
    }

    /// Runs prune (expire + decay) directly, outside the scheduler (C8).
    pub fn prune(&self, grace_secs: i64, epsilon: f32) -> Result<PruneOutcome> {
        self.maintenance.prune(grace_secs, epsilon)
    }

    /// Runs tier compaction directly, outside the scheduler (C8).
    pub fn compact(&self, cfg: &CompactionConfig) -> Result<usize> {
        self.maintenance.compact(cfg)
    }

    /// Runs find-duplicates + consolidate directly, outside the scheduler (C8).
    pub async fn consolidate(&self, cancel: &CancelSignal, warnings: &mut PendingWarnings) -> Result<Vec<String>> {
        self.maintenance.consolidate(cancel, warnings).await
    }

    /// Runs the reflect pass directly, outside the scheduler (C8).
    pub async fn reflect(&self, cancel: &CancelSignal, warnings: &mut PendingWarnings) -> Result<ReflectOutcome> {
        self.maintenance.reflect(cancel, warnings).await
    }

    /// Scans a raw session transcript for procedure-worthy tool-call chains
    /// and records each one (C8 procedure extraction).
    pub fn extract_procedures(&self, raw_transcript: &str, scope: Scope, scope_target: Option<String>) -> Result<Vec<memnexus_procedures::RecordOutcome>> {
        self.maintenance.extract_procedures(raw_transcript, scope, scope_target)
    }

    /// Scans a raw session transcript for praise signals and reinforces the
    /// facts actually injected ahead of the praised reply. `recalled_ids`
    /// should be the [`RecallResult::included_ids`] from the recall call that
    /// produced the context the praised reply answered against.
    pub fn extract_reinforcement(&self, raw_transcript: &str, recalled_ids: &[String]) -> Result<(usize, usize)> {
        self.maintenance.extract_reinforcement(raw_transcript, recalled_ids)
    }

    /// Scans already-parsed transcript turns for correction signals and
    /// applies (or proposes) remediations (C8 self-correction).
    pub async fn run_self_correction(
        &self,
        turns: &[Turn],
        tools_writer: &dyn ToolsRuleWriter,
        cap: &mut DailyCap,
        cancel: &CancelSignal,
        warnings: &mut PendingWarnings,
    ) -> Result<Vec<AppliedOutcome>> {
        self.maintenance.run_self_correction(turns, tools_writer, cap, cancel, warnings).await
    }

    /// Runs one scheduler tick, dispatching every enabled, ready job onto the
    /// corresponding maintenance operation (spec §4.8). Reflect, consolidate,
    /// and self-correction's remediations need an [`LlmError`]-aware cancel
    /// signal and warnings sink per dispatch; this orchestrates a fresh one
    /// per job rather than sharing state across jobs within a tick.
    pub async fn run_maintenance_tick(&mut self, tools_writer: &dyn ToolsRuleWriter, cap: &mut DailyCap) -> Vec<(String, Result<(), String>)> {
        let now = self.clock.now();
        let mut outcomes = Vec::new();

        let maintenance = &self.maintenance;
        self.scheduler
            .tick(now, move |job| {
                let command = job.command.clone();
                async move {
                    let cancel = CancelSignal::new();
                    let mut warnings = PendingWarnings::new();
                    let result = match command.as_str() {
                        "prune" => maintenance.prune(86_400, 0.05).map(|_| ()).map_err(|e| e.to_string()),
                        "compact" => maintenance.compact(&CompactionConfig::default()).map(|_| ()).map_err(|e| e.to_string()),
                        "consolidate" => maintenance.consolidate(&cancel, &mut warnings).await.map(|_| ()).map_err(|e| e.to_string()),
                        "reflect" => maintenance.reflect(&cancel, &mut warnings).await.map(|_| ()).map_err(|e| e.to_string()),
                        other => Err(format!("unrecognized maintenance command {other}")),
                    };
                    result
                }
            })
            .await;

        for job in self.scheduler.jobs() {
            let status = match &job.last_status {
                Some(memnexus_maintenance::JobStatus::Success) => Ok(()),
                Some(memnexus_maintenance::JobStatus::Error) => Err(job.last_error.clone().unwrap_or_default()),
                None => continue,
            };
            outcomes.push((job.id.clone(), status));
        }
        let _ = (tools_writer, cap);
        outcomes
    }

    /// The underlying fact store, for callers that need direct access beyond
    /// this façade's operations (e.g. an admin CLI's `lookup`/`search`).
    #[must_use]
    pub fn facts(&self) -> &Arc<FactStore> {
        &self.facts
    }

    /// The underlying vector store.
    #[must_use]
    pub fn vectors(&self) -> &Arc<VectorStore> {
        &self.vectors
    }
}

fn default_scheduler(now: i64) -> Scheduler {
    let mut scheduler = Scheduler::new();
    scheduler.add_job(memnexus_maintenance::Job::new("prune", "@hourly", "prune", now));
    scheduler.add_job(memnexus_maintenance::Job::new("compact", "@hourly", "compact", now));
    scheduler.add_job(memnexus_maintenance::Job::new("consolidate", "@daily", "consolidate", now));
    scheduler.add_job(memnexus_maintenance::Job::new("reflect", "@weekly", "reflect", now));
    scheduler
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use memnexus_core::{embedding::EmbeddingModel as _, llm::LanguageModel as _, ChatParams, FixedClock, LlmError, Message};
    use tempfile::tempdir;

    use super::*;

    struct FakeEmbedder;
    #[async_trait]
    impl EmbeddingModel for FakeEmbedder {
        fn dim(&self) -> usize {
            3
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0, 1.0])
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

    struct NoopToolsWriter;
    impl ToolsRuleWriter for NoopToolsWriter {
        fn append_rule(&self, _text: &str) -> std::result::Result<(), String> {
            Ok(())
        }
    }

    fn providers(response: &str) -> Providers {
        Providers::single(Arc::new(FakeEmbedder), "stub", Arc::new(ScriptedLlm { response: response.to_string() }))
    }

    fn engine(dir: &tempfile::TempDir, response: &str) -> MemoryEngine {
        let paths = StoragePaths::under(dir.path());
        MemoryEngine::open_with_clock(&paths, providers(response), ScopeDefaults::default(), Config::default(), Arc::new(FixedClock::new(1_000))).unwrap()
    }

    #[tokio::test]
    async fn ingest_then_recall_round_trips_a_fact() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, r#"{"action":"ADD"}"#);

        let request = IngestRequest::new("the user prefers dark mode", Category::Preference, "test");
        let outcome = engine.ingest(request, &CancelSignal::new(), &mut PendingWarnings::new()).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Stored { .. }));

        let recall_request = RecallRequest::new("what mode does the user prefer");
        let result = engine.recall(recall_request, &CancelSignal::new(), &mut PendingWarnings::new()).await;
        assert!(!result.included_ids.is_empty());
    }

    #[tokio::test]
    async fn maintenance_tick_dispatches_seeded_jobs() {
        let dir = tempdir().unwrap();
        let mut engine = engine(&dir, "merged");
        let writer = NoopToolsWriter;
        let mut cap = DailyCap::default();
        let outcomes = engine.run_maintenance_tick(&writer, &mut cap).await;
        assert!(outcomes.is_empty(), "no job is due yet at the clock's starting instant");
    }

    #[test]
    fn prune_session_scope_removes_only_that_sessions_facts() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, "unused");
        let mut fact = memnexus_core::Fact {
            id: "s1".into(),
            text: "scratch note".into(),
            summary: None,
            category: Category::Fact,
            entity: None,
            key: None,
            value: None,
            tags: Default::default(),
            importance: 0.5,
            confidence: 1.0,
            decay_class: DecayClass::Default,
            tier: memnexus_core::Tier::Warm,
            scope: Scope::Session,
            scope_target: Some("sess-1".into()),
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
        };
        engine.facts.store(&fact).unwrap();
        fact.id = "g1".into();
        fact.scope = Scope::Global;
        fact.scope_target = None;
        engine.facts.store(&fact).unwrap();

        let removed = engine.prune_session_scope("sess-1").unwrap();
        assert_eq!(removed, 1);
        assert!(engine.facts.get_by_id("g1", 1_000, &memnexus_store::GetOpts::default()).unwrap().is_some());
    }
}
