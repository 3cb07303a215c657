//! End-to-end scenarios and cross-cutting properties run against the fully
//! assembled [`memnexus::MemoryEngine`], not against any single component
//! crate. Each component crate carries its own focused unit tests for the
//! mechanics these scenarios exercise together.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use memnexus::{Config, MemoryEngine, Providers, StoragePaths};
use memnexus_core::{
    embedding::EmbeddingModel, llm::LanguageModel, CancelSignal, Category, ChatParams, DecayClass, Fact, FixedClock,
    LlmError, Message, PendingWarnings, Scope, Tier,
};
use memnexus_recall::{DirectiveConfig, EntityLookupConfig, FormatMode, GraphConfig, HydeConfig, RecallConfig, RecallRequest, TieringConfig};
use memnexus_scope::{ScopeDefaults, ScopeEvent};
use memnexus_store::GetOpts;
use tempfile::tempdir;

struct FakeEmbedder;

#[async_trait]
impl EmbeddingModel for FakeEmbedder {
    fn dim(&self) -> usize {
        3
    }
    async fn embed(&self, text: &str) -> memnexus_core::Result<Vec<f32>> {
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

fn providers(response: &str) -> Providers {
    Providers::single(Arc::new(FakeEmbedder), "stub", Arc::new(ScriptedLlm { response: response.to_string() }))
}

/// An engine rooted at a fresh temp directory, a fixed clock at `now`, and
/// `recall` overridden to `recall_config` (everything else at its default).
fn engine_at(dir: &tempfile::TempDir, response: &str, now: i64, recall_config: RecallConfig) -> MemoryEngine {
    let paths = StoragePaths::under(dir.path());
    let config = Config { recall: recall_config, ..Config::default() };
    MemoryEngine::open_with_clock(&paths, providers(response), ScopeDefaults::default(), config, Arc::new(FixedClock::new(now))).unwrap()
}

fn bare_fact(id: &str, text: &str, now: i64) -> Fact {
    Fact {
        id: id.to_string(),
        text: text.to_string(),
        summary: None,
        category: Category::Fact,
        entity: None,
        key: None,
        value: None,
        tags: BTreeSet::new(),
        importance: 0.5,
        confidence: 1.0,
        decay_class: DecayClass::Default,
        tier: Tier::Warm,
        scope: Scope::Global,
        scope_target: None,
        source: "test".to_string(),
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

/// A [`RecallConfig`] with HyDE and hot-tier injection turned off, so a
/// scenario's result is driven purely by lexical/vector ranking and the
/// formatting budget it's actually testing.
fn plain_recall_config(overrides: impl FnOnce(RecallConfig) -> RecallConfig) -> RecallConfig {
    overrides(RecallConfig {
        hyde: HydeConfig { enabled: false, limit_once: true, timeout: std::time::Duration::from_secs(1) },
        tiering: TieringConfig { enabled: false, ..TieringConfig::default() },
        entity_lookup: EntityLookupConfig::default(),
        retrieval_directives: DirectiveConfig::default(),
        graph: GraphConfig::default(),
        ..RecallConfig::default()
    })
}

/// Scenario 1 — ingest-then-update (spec §8.1).
#[tokio::test]
async fn ingest_then_update_supersedes_and_resolves_bitemporally() {
    let dir = tempdir().unwrap();
    let recall_config = plain_recall_config(|c| RecallConfig { injection_format: FormatMode::Full, ..c });
    let engine = engine_at(&dir, r#"{"action":"UPDATE","targetId":"id1","reason":"preference changed"}"#, 1_000, recall_config);

    let mut seed = bare_fact("id1", "the user prefers dark mode", 500);
    seed.entity = Some("user".to_string());
    seed.key = Some("prefers".to_string());
    engine.facts().store(&seed).unwrap();

    let mut request = memnexus_ingest::IngestRequest::new("The user now prefers light mode.", Category::Preference, "test");
    request.entity = Some("user".to_string());
    request.key = Some("prefers".to_string());
    let outcome = engine.ingest(request, &CancelSignal::new(), &mut PendingWarnings::new()).await.unwrap();

    let memnexus_ingest::Outcome::Updated { id: id2, superseded_id, .. } = outcome else {
        panic!("expected Updated outcome, got {outcome:?}");
    };
    assert_eq!(superseded_id, "id1");

    // id1 is hidden from a default (current, active-only) read...
    assert!(engine.facts().get_by_id("id1", 1_000, &GetOpts::default()).unwrap().is_none());
    // ...but visible with includeSuperseded, carrying a non-null supersededAt.
    let superseded = engine
        .facts()
        .get_by_id("id1", 1_000, &GetOpts { include_superseded: true, ..GetOpts::default() })
        .unwrap()
        .unwrap();
    assert!(superseded.superseded_at.is_some());

    // asOf a time before id2 existed still resolves to id1.
    let as_of = engine
        .facts()
        .get_by_id("id1", 1_000, &GetOpts { as_of: Some(700), ..GetOpts::default() })
        .unwrap();
    assert!(as_of.is_some());

    // A recall for the same topic surfaces only the new fact.
    let result = engine
        .recall(RecallRequest::new("user preference"), &CancelSignal::new(), &mut PendingWarnings::new())
        .await;
    assert!(result.included_ids.contains(&id2));
    assert!(!result.included_ids.contains(&"id1".to_string()));
}

/// Scenario 2 — recall budget (spec §8.2): 50 candidates averaging 40 tokens,
/// `maxTokens = 400`, `injectionFormat = full` yields 8-12 bullets, none over
/// `maxPerMemoryChars`.
#[tokio::test]
async fn recall_budget_yields_eight_to_twelve_bullets() {
    let dir = tempdir().unwrap();
    let recall_config = plain_recall_config(|c| RecallConfig {
        injection_format: FormatMode::Full,
        max_tokens: 400,
        max_per_memory_chars: 280,
        limit: 50,
        search_limit: 50,
        ..c
    });
    let engine = engine_at(&dir, "unused", 1_000, recall_config);

    // ~160 chars (incl. the "- " bullet prefix) ≈ 40 tokens at the
    // workspace's 4-chars-per-token estimate.
    let body = "a shared searchable topic about widgets and gadgets used across every candidate memory fact stored in this particular recall test batch today, numbered entry ";
    for i in 0..50 {
        let text = format!("{body}{i}");
        engine.facts().store(&bare_fact(&format!("f{i}"), &text, 1_000)).unwrap();
    }

    let result = engine
        .recall(RecallRequest::new("shared searchable topic about widgets"), &CancelSignal::new(), &mut PendingWarnings::new())
        .await;

    let bullet_count = result.context.lines().filter(|l| l.starts_with("- ")).count();
    assert!((8..=12).contains(&bullet_count), "expected 8-12 bullets, got {bullet_count}: {}", result.context);
    for line in result.context.lines() {
        assert!(line.chars().count() <= 282, "bullet exceeded maxPerMemoryChars: {line}");
    }
}

/// Scenario 3 — progressive index (spec §8.3): 30 candidates, one index line
/// per included candidate, each 1-based-position-prefixed, fitting under
/// `progressiveIndexMaxTokens`.
#[tokio::test]
async fn progressive_index_has_one_positioned_line_per_candidate() {
    let dir = tempdir().unwrap();
    let recall_config = plain_recall_config(|c| RecallConfig {
        injection_format: FormatMode::Progressive,
        limit: 30,
        search_limit: 30,
        progressive_index_max_tokens: 300,
        ..c
    });
    let engine = engine_at(&dir, "unused", 1_000, recall_config);

    for i in 0..30 {
        let text = format!("candidate topic about gizmos, entry number {i}");
        engine.facts().store(&bare_fact(&format!("c{i}"), &text, 1_000)).unwrap();
    }

    let result = engine
        .recall(RecallRequest::new("candidate topic about gizmos"), &CancelSignal::new(), &mut PendingWarnings::new())
        .await;

    let lines: Vec<&str> = result.context.lines().filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), result.included_ids.len());
    for (i, line) in lines.iter().enumerate() {
        assert!(line.starts_with(&format!("{}. ", i + 1)), "line {i} missing 1-based prefix: {line}");
    }
    let total_tokens: usize = lines.iter().map(|l| l.len() / 4).sum();
    assert!(total_tokens <= 300, "index exceeded progressiveIndexMaxTokens: {total_tokens}");
}

/// Scenario 4 — reinforcement loop (spec §8.4): praise immediately following
/// a reply that referenced F1 reinforces only F1, by one, with the quote appended.
#[tokio::test]
async fn reinforcement_loop_reinforces_only_the_referenced_fact() {
    let dir = tempdir().unwrap();
    let engine = engine_at(&dir, "unused", 1_000, RecallConfig::default());

    engine.facts().store(&bare_fact("f1", "the deploy runbook lives in ops/deploy.md", 1_000)).unwrap();
    engine.facts().store(&bare_fact("f2", "the staging cluster is named staging-west", 1_000)).unwrap();

    let transcript = r#"
{"type":"message","message":{"role":"user","content":[{"type":"text","text":"where is the deploy runbook?"}]}}
{"type":"message","message":{"role":"assistant","content":[{"type":"text","text":"it's in ops/deploy.md (f1)"}]}}
{"type":"message","message":{"role":"user","content":[{"type":"text","text":"perfect, thanks!"}]}}
"#;

    let (facts_reinforced, _procedures_reinforced) = engine.extract_reinforcement(transcript, &["f1".to_string()]).unwrap();
    assert_eq!(facts_reinforced, 1);

    let f1 = engine.facts().get_by_id("f1", 1_000, &GetOpts::default()).unwrap().unwrap();
    let f2 = engine.facts().get_by_id("f2", 1_000, &GetOpts::default()).unwrap().unwrap();
    assert_eq!(f1.reinforced_count, 1);
    assert_eq!(f2.reinforced_count, 0);
    assert!(f1.reinforced_quotes.iter().any(|q| q.contains("perfect")));
}

/// Scenario 5 — classify DELETE (spec §8.5): a retraction supersedes with no
/// replacement; a superseded-aware read still finds the tombstoned fact.
#[tokio::test]
async fn classify_delete_retracts_with_no_replacement() {
    let dir = tempdir().unwrap();
    let engine = engine_at(&dir, r#"{"action":"DELETE","targetId":"id1","reason":"decommissioned"}"#, 1_000, RecallConfig::default());

    let mut seed = bare_fact("id1", "the server ip is 10.0.0.1", 500);
    seed.entity = Some("server".to_string());
    seed.key = Some("ip".to_string());
    engine.facts().store(&seed).unwrap();

    let mut request = memnexus_ingest::IngestRequest::new("We decommissioned the server.", Category::Fact, "test");
    request.entity = Some("server".to_string());
    request.key = Some("ip".to_string());
    let outcome = engine.ingest(request, &CancelSignal::new(), &mut PendingWarnings::new()).await.unwrap();

    let memnexus_ingest::Outcome::Retracted { target_id, .. } = outcome else {
        panic!("expected Retracted outcome, got {outcome:?}");
    };
    assert_eq!(target_id, "id1");

    let active = engine
        .facts()
        .lookup(Some("server"), Some("ip"), None, 1_000, &memnexus_store::LookupOpts::default())
        .unwrap();
    assert!(active.is_empty());

    let tombstoned = engine
        .facts()
        .get_by_id("id1", 1_000, &GetOpts { include_superseded: true, ..GetOpts::default() })
        .unwrap()
        .unwrap();
    assert!(tombstoned.superseded_at.is_some());
}

/// Scenario 6 — scope prune (spec §8.6): pruning a session only removes that
/// session's facts; a session-scoped recall still sees global facts.
#[tokio::test]
async fn scope_prune_removes_only_the_named_session() {
    let dir = tempdir().unwrap();
    let recall_config = plain_recall_config(|c| RecallConfig { injection_format: FormatMode::Full, ..c });
    let engine = engine_at(&dir, "unused", 1_000, recall_config);

    let mut global = bare_fact("global1", "a globally visible onboarding note", 1_000);
    global.scope = Scope::Global;
    engine.facts().store(&global).unwrap();

    let mut user = bare_fact("user1", "a user-scoped onboarding preference", 1_000);
    user.scope = Scope::User;
    user.scope_target = Some("U1".to_string());
    engine.facts().store(&user).unwrap();

    let mut agent = bare_fact("agent1", "an agent-scoped onboarding note", 1_000);
    agent.scope = Scope::Agent;
    agent.scope_target = Some("A1".to_string());
    engine.facts().store(&agent).unwrap();

    let mut session = bare_fact("session1", "a session-scoped onboarding note", 1_000);
    session.scope = Scope::Session;
    session.scope_target = Some("S1".to_string());
    engine.facts().store(&session).unwrap();

    let removed = engine.prune_session_scope("S1").unwrap();
    assert_eq!(removed, 1);
    assert!(engine.facts().get_by_id("session1", 1_000, &GetOpts::default()).unwrap().is_none());
    assert!(engine.facts().get_by_id("global1", 1_000, &GetOpts::default()).unwrap().is_some());
    assert!(engine.facts().get_by_id("user1", 1_000, &GetOpts::default()).unwrap().is_some());
    assert!(engine.facts().get_by_id("agent1", 1_000, &GetOpts::default()).unwrap().is_some());

    let mut event = ScopeEvent::default();
    event.session_id = Some("S1".to_string());
    let mut request = RecallRequest::new("onboarding note");
    request.scope_event = event;
    let result = engine.recall(request, &CancelSignal::new(), &mut PendingWarnings::new()).await;
    assert!(result.included_ids.contains(&"global1".to_string()));
    assert!(!result.included_ids.contains(&"user1".to_string()));
    assert!(!result.included_ids.contains(&"agent1".to_string()));
}

/// P6 — recall determinism: a fixed clock, fixed embeddings, and fixed LLM
/// output produce byte-identical recall output across independent runs.
#[tokio::test]
async fn recall_is_byte_identical_across_runs_p6() {
    let run = || async {
        let dir = tempdir().unwrap();
        let engine = engine_at(&dir, "unused", 1_000, plain_recall_config(|c| c));
        for i in 0..5 {
            engine.facts().store(&bare_fact(&format!("f{i}"), "a deterministic repeated phrase", 1_000)).unwrap();
        }
        engine
            .recall(RecallRequest::new("a deterministic repeated phrase"), &CancelSignal::new(), &mut PendingWarnings::new())
            .await
    };

    let first = run().await;
    let second = run().await;
    assert_eq!(first.context, second.context);
    assert_eq!(first.included_ids, second.included_ids);
}

/// P9 — cancellation safety: cancelling between classify and write leaves
/// store counts unchanged and the outcome is an error, not a write.
#[tokio::test]
async fn cancelling_mid_ingest_leaves_store_counts_unchanged_p9() {
    struct CancelDuringClassify {
        signal: CancelSignal,
    }

    #[async_trait]
    impl LanguageModel for CancelDuringClassify {
        async fn complete(&self, _model: &str, _messages: &[Message], _params: &ChatParams) -> std::result::Result<String, LlmError> {
            self.signal.cancel();
            Ok(r#"{"action":"ADD"}"#.to_string())
        }
    }

    let dir = tempdir().unwrap();
    let paths = StoragePaths::under(dir.path());
    let cancel = CancelSignal::new();
    let providers = Providers::single(Arc::new(FakeEmbedder), "stub", Arc::new(CancelDuringClassify { signal: cancel.clone() }));
    let engine = MemoryEngine::open_with_clock(&paths, providers, ScopeDefaults::default(), Config::default(), Arc::new(FixedClock::new(1_000))).unwrap();

    let mut seed = bare_fact("seed1", "the user prefers dark mode", 500);
    seed.entity = Some("user".to_string());
    seed.key = Some("prefers".to_string());
    engine.facts().store(&seed).unwrap();
    let before = engine.facts().stats_breakdown(1_000).unwrap().active;

    let mut request = memnexus_ingest::IngestRequest::new("The user prefers dark mode, for sure", Category::Preference, "test");
    request.entity = Some("user".to_string());
    request.key = Some("prefers".to_string());
    let result = engine.ingest(request, &cancel, &mut PendingWarnings::new()).await;

    assert!(result.is_err());
    assert_eq!(engine.facts().stats_breakdown(1_000).unwrap().active, before);
}
