//! # memnexus-procedures
//!
//! Procedure Engine (C9): storage and ranked retrieval of tool-call recipes,
//! reinforcement, and promotion to standalone skill artifacts once a
//! procedure proves itself reliable (spec §4.9).

mod artifact;
mod config;

pub use artifact::{FsSkillWriter, SkillArtifactWriter, render_skill_markdown};
pub use config::ProcedureConfig;

use std::sync::Arc;

use memnexus_core::{
    Breadcrumb, PendingWarnings, Procedure, ProcedureStep, ProcedureType, Result, Scope, ScopeFilter,
};
use memnexus_store::{FactStore, ProcedureSearchOpts};

/// Score used to rank and to split suggestions into positive/negative
/// sections (spec §4.6 step 3, §4.9): confidence plus a light usage and
/// reinforcement weighting. Intentionally mirrors the private formula
/// `memnexus-store` and `memnexus-recall` each keep for the same reason —
/// a small pure scoring function is cheap to duplicate and each crate needs
/// its own handle on it without a cross-crate coupling for three lines of math.
#[must_use]
pub fn ranking_score(procedure: &Procedure) -> f32 {
    let total = procedure.success_count + procedure.failure_count;
    let usage_weight = if total == 0 { 0.0 } else { (total as f32).ln_1p() / 10.0 };
    let reinforcement = (procedure.reinforced_count as f32).min(5.0) * 0.02;
    procedure.confidence + usage_weight + reinforcement
}

/// Whether a promoted skill has seen no reinforcement activity for
/// `skill_ttl_days`; informational only — nothing in this crate un-promotes
/// a procedure automatically.
#[must_use]
pub fn is_skill_stale(procedure: &Procedure, now: i64, skill_ttl_days: i64) -> bool {
    if !procedure.promoted_to_skill {
        return false;
    }
    let last_activity = procedure.last_validated.unwrap_or(0).max(procedure.last_failed.unwrap_or(0));
    let age_days = (now - last_activity).max(0) / 86_400;
    age_days >= skill_ttl_days
}

/// Outcome of [`ProcedureEngine::record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The recipe was stored under this id.
    Stored(String),
    /// The recipe was shorter than `procedures.minSteps` and was not stored.
    TooShort,
    /// The engine is disabled.
    Disabled,
}

/// Outcome of [`ProcedureEngine::reinforce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReinforceOutcome {
    /// The reinforcement was recorded; promotion did not fire this call.
    Reinforced {
        /// The procedure's `reinforcedCount` after this call.
        count: u32,
    },
    /// The reinforcement count crossed the promotion threshold for the first
    /// time and a skill artifact was written at this path.
    Promoted {
        /// The procedure's `reinforcedCount` after this call.
        count: u32,
        /// Path the skill artifact was written to.
        skill_path: String,
    },
    /// `id` does not exist.
    NotFound,
}

/// Procedure Engine (C9): wraps [`FactStore`]'s procedure table with the
/// config-gated extraction threshold, ranked suggestion, and
/// reinforcement-triggered promotion behavior spec §4.9 describes.
pub struct ProcedureEngine {
    store: Arc<FactStore>,
    writer: Arc<dyn SkillArtifactWriter>,
    config: ProcedureConfig,
}

impl std::fmt::Debug for ProcedureEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureEngine").field("config", &self.config).finish_non_exhaustive()
    }
}

impl ProcedureEngine {
    /// Builds an engine over `store`, writing promoted skill artifacts with `writer`.
    #[must_use]
    pub fn new(store: Arc<FactStore>, writer: Arc<dyn SkillArtifactWriter>, config: ProcedureConfig) -> Self {
        Self { store, writer, config }
    }

    /// Records a tool-call recipe as a new procedure (spec §4.9 procedure
    /// extraction). Recipes shorter than `procedures.minSteps` are rejected
    /// rather than stored, since a one-step "recipe" carries no sequencing
    /// information worth recalling.
    pub fn record(
        &self,
        id: String,
        task_pattern: String,
        recipe: Vec<ProcedureStep>,
        procedure_type: ProcedureType,
        scope: Scope,
        scope_target: Option<String>,
    ) -> Result<RecordOutcome> {
        if !self.config.enabled {
            return Ok(RecordOutcome::Disabled);
        }
        if recipe.len() < self.config.min_steps {
            return Ok(RecordOutcome::TooShort);
        }

        let procedure = Procedure {
            id: id.clone(),
            task_pattern,
            recipe,
            procedure_type,
            success_count: 0,
            failure_count: 0,
            confidence: 0.5,
            last_validated: None,
            last_failed: None,
            promoted_to_skill: false,
            skill_path: None,
            reinforced_count: 0,
            scope,
            scope_target,
        };
        self.store.store_procedure(&procedure)?;
        Ok(RecordOutcome::Stored(id))
    }

    /// Records a successful or failed execution against `id` (spec §4.9
    /// validation), nudging confidence and the success/failure counters.
    pub fn validate(&self, id: &str, succeeded: bool, now: i64) -> Result<bool> {
        if !self.config.enabled {
            return Ok(false);
        }
        self.store.reinforce_procedure(id, succeeded, now)
    }

    /// Praise-triggered reinforcement (spec §4.9 `reinforceProcedure(id,
    /// quote, threshold)`): increments `reinforcedCount`, logs `quote` as a
    /// breadcrumb for operator visibility, and promotes to a skill artifact
    /// the first time `distill.reinforcementPromotionThreshold` is crossed.
    pub fn reinforce(&self, id: &str, quote: &str, warnings: &mut PendingWarnings) -> Result<ReinforceOutcome> {
        if !self.config.enabled {
            return Ok(ReinforceOutcome::NotFound);
        }

        let Some(count) = self.store.reinforce_procedure_praise(id)? else {
            return Ok(ReinforceOutcome::NotFound);
        };
        tracing::debug!(procedure_id = id, quote, reinforced_count = count, "procedure praised");

        let Some(procedure) = self.store.get_procedure(id)? else {
            return Ok(ReinforceOutcome::Reinforced { count });
        };

        let crossed_threshold = count >= self.config.reinforcement_promotion_threshold;
        let meets_confidence = procedure.confidence >= self.config.validation_threshold;
        if procedure.promoted_to_skill || !crossed_threshold || !meets_confidence {
            return Ok(ReinforceOutcome::Reinforced { count });
        }

        match self.writer.write(&procedure) {
            Ok(skill_path) => {
                self.store.mark_promoted(id, &skill_path)?;
                Ok(ReinforceOutcome::Promoted { count, skill_path })
            }
            Err(message) => {
                warnings.push(Breadcrumb {
                    subsystem: "procedures",
                    operation: "promote",
                    id: Some(id.to_string()),
                    message,
                });
                Ok(ReinforceOutcome::Reinforced { count })
            }
        }
    }

    /// Ranked retrieval for a task description (spec §4.9
    /// `searchProceduresRanked`), split into positive (score above `0.4`)
    /// and negative sections the way the recall pipeline's suggestion block
    /// (spec §4.6 step 3) renders them.
    pub fn suggest(&self, task: &str, k: usize, scope_filter: Option<ScopeFilter>) -> Result<(Vec<Procedure>, Vec<Procedure>)> {
        if !self.config.enabled {
            return Ok((Vec::new(), Vec::new()));
        }
        let opts = ProcedureSearchOpts { scope_filter, procedure_type: None, min_confidence: 0.0 };
        let ranked = self.store.search_procedures_ranked(task, k, &opts)?;
        Ok(ranked.into_iter().partition(|p| ranking_score(p) > 0.4))
    }
}

#[cfg(test)]
mod tests {
    use memnexus_core::{ProcedureStep, Scope};

    use super::*;

    struct FailingWriter;
    impl SkillArtifactWriter for FailingWriter {
        fn write(&self, _procedure: &Procedure) -> std::result::Result<String, String> {
            Err("disk full".into())
        }
    }

    fn recipe(n: usize) -> Vec<ProcedureStep> {
        (0..n)
            .map(|i| ProcedureStep { tool: "shell".into(), args: serde_json::Value::Null, summary: format!("step {i}") })
            .collect()
    }

    fn engine(writer: Arc<dyn SkillArtifactWriter>, config: ProcedureConfig) -> ProcedureEngine {
        let store = Arc::new(FactStore::open_in_memory().unwrap());
        ProcedureEngine::new(store, writer, config)
    }

    fn temp_engine(config: ProcedureConfig) -> (ProcedureEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(FsSkillWriter::new(dir.path().join("auto")));
        (engine(writer, config), dir)
    }

    #[test]
    fn record_rejects_recipes_shorter_than_min_steps() {
        let (eng, _dir) = temp_engine(ProcedureConfig::default());
        let outcome = eng
            .record("p1".into(), "restart worker".into(), recipe(1), ProcedureType::Positive, Scope::Global, None)
            .unwrap();
        assert_eq!(outcome, RecordOutcome::TooShort);
    }

    #[test]
    fn record_stores_recipes_meeting_min_steps() {
        let (eng, _dir) = temp_engine(ProcedureConfig::default());
        let outcome = eng
            .record("p1".into(), "restart worker".into(), recipe(2), ProcedureType::Positive, Scope::Global, None)
            .unwrap();
        assert_eq!(outcome, RecordOutcome::Stored("p1".into()));
    }

    #[test]
    fn disabled_engine_records_nothing() {
        let config = ProcedureConfig { enabled: false, ..ProcedureConfig::default() };
        let (eng, _dir) = temp_engine(config);
        let outcome = eng
            .record("p1".into(), "restart worker".into(), recipe(3), ProcedureType::Positive, Scope::Global, None)
            .unwrap();
        assert_eq!(outcome, RecordOutcome::Disabled);
    }

    #[test]
    fn reinforcement_promotes_once_threshold_and_confidence_are_met() {
        let config = ProcedureConfig { reinforcement_promotion_threshold: 2, validation_threshold: 0.4, ..ProcedureConfig::default() };
        let (eng, _dir) = temp_engine(config);
        eng.record("p1".into(), "deploy the service".into(), recipe(3), ProcedureType::Positive, Scope::Global, None).unwrap();
        eng.validate("p1", true, 1_000).unwrap();

        let mut warnings = PendingWarnings::new();
        let first = eng.reinforce("p1", "nice work", &mut warnings).unwrap();
        assert!(matches!(first, ReinforceOutcome::Reinforced { count: 1 }));

        let second = eng.reinforce("p1", "great job again", &mut warnings).unwrap();
        match second {
            ReinforceOutcome::Promoted { count, skill_path } => {
                assert_eq!(count, 2);
                assert!(std::path::Path::new(&skill_path).exists());
            }
            other => panic!("expected promotion, got {other:?}"),
        }
        assert!(warnings.is_empty());
    }

    #[test]
    fn reinforcement_does_not_promote_below_confidence_threshold() {
        let config = ProcedureConfig { reinforcement_promotion_threshold: 1, validation_threshold: 0.9, ..ProcedureConfig::default() };
        let (eng, _dir) = temp_engine(config);
        eng.record("p1".into(), "deploy the service".into(), recipe(2), ProcedureType::Positive, Scope::Global, None).unwrap();

        let mut warnings = PendingWarnings::new();
        let outcome = eng.reinforce("p1", "nice", &mut warnings).unwrap();
        assert!(matches!(outcome, ReinforceOutcome::Reinforced { count: 1 }));
    }

    #[test]
    fn promotion_does_not_fire_twice() {
        let config = ProcedureConfig { reinforcement_promotion_threshold: 1, validation_threshold: 0.0, ..ProcedureConfig::default() };
        let (eng, _dir) = temp_engine(config);
        eng.record("p1".into(), "deploy the service".into(), recipe(2), ProcedureType::Positive, Scope::Global, None).unwrap();

        let mut warnings = PendingWarnings::new();
        let first = eng.reinforce("p1", "nice", &mut warnings).unwrap();
        assert!(matches!(first, ReinforceOutcome::Promoted { .. }));

        let second = eng.reinforce("p1", "again", &mut warnings).unwrap();
        assert!(matches!(second, ReinforceOutcome::Reinforced { count: 2 }));
    }

    #[test]
    fn writer_failure_is_logged_and_does_not_fail_the_call() {
        let config = ProcedureConfig { reinforcement_promotion_threshold: 1, validation_threshold: 0.0, ..ProcedureConfig::default() };
        let eng = engine(Arc::new(FailingWriter), config);
        eng.record("p1".into(), "deploy the service".into(), recipe(2), ProcedureType::Positive, Scope::Global, None).unwrap();

        let mut warnings = PendingWarnings::new();
        let outcome = eng.reinforce("p1", "nice", &mut warnings).unwrap();
        assert!(matches!(outcome, ReinforceOutcome::Reinforced { count: 1 }));
        assert!(!warnings.is_empty());
    }

    #[test]
    fn reinforce_unknown_id_returns_not_found() {
        let (eng, _dir) = temp_engine(ProcedureConfig::default());
        let mut warnings = PendingWarnings::new();
        let outcome = eng.reinforce("missing", "nice", &mut warnings).unwrap();
        assert_eq!(outcome, ReinforceOutcome::NotFound);
    }

    #[test]
    fn suggest_splits_positive_and_negative_by_score() {
        let (eng, _dir) = temp_engine(ProcedureConfig::default());
        eng.record("strong".into(), "restart the worker pool".into(), recipe(2), ProcedureType::Positive, Scope::Global, None).unwrap();
        eng.validate("strong", true, 1_000).unwrap();
        eng.record("weak".into(), "restart the worker pool".into(), recipe(2), ProcedureType::Negative, Scope::Global, None).unwrap();

        let (positive, negative) = eng.suggest("restart the worker pool", 10, None).unwrap();
        assert!(positive.iter().any(|p| p.id == "strong"));
        assert!(negative.iter().any(|p| p.id == "weak"));
    }

    #[test]
    fn is_skill_stale_requires_promotion_and_elapsed_ttl() {
        let mut procedure = Procedure {
            id: "p1".into(),
            task_pattern: "deploy".into(),
            recipe: recipe(2),
            procedure_type: ProcedureType::Positive,
            success_count: 1,
            failure_count: 0,
            confidence: 0.9,
            last_validated: Some(0),
            last_failed: None,
            promoted_to_skill: false,
            skill_path: None,
            reinforced_count: 3,
            scope: Scope::Global,
            scope_target: None,
        };
        assert!(!is_skill_stale(&procedure, 90 * 86_400, 90));

        procedure.promoted_to_skill = true;
        assert!(is_skill_stale(&procedure, 90 * 86_400, 90));
        assert!(!is_skill_stale(&procedure, 10 * 86_400, 90));
    }
}
