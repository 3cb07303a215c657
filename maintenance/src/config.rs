//! `reflection.*` / `distill.*` / dedupe / self-correction configuration
//! surface (spec §6.4) consumed by the maintenance engine.

use std::time::Duration;

/// `reflection.*`.
#[derive(Debug, Clone)]
pub struct ReflectionConfig {
    /// Whether the reflect pass runs at all.
    pub enabled: bool,
    /// Default lookback window for sampling recent facts.
    pub default_window: Duration,
    /// Minimum number of sampled facts required before reflection runs.
    pub min_observations: usize,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_window: Duration::from_secs(7 * 24 * 3600),
            min_observations: 5,
        }
    }
}

/// Find-duplicates / consolidate thresholds (spec §4.7).
#[derive(Debug, Clone)]
pub struct DedupeConfig {
    /// Whether find-duplicates/consolidate runs at all.
    pub enabled: bool,
    /// Sample cap of active facts scanned per pass.
    pub sample_limit: usize,
    /// Minimum cosine similarity to count as a duplicate pair.
    pub threshold: f32,
    /// Whether facts carrying a structured `(entity, key, value)` identifier
    /// are included (spec: "skipping structured identifiers unless requested").
    pub include_structured: bool,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_limit: 200,
            threshold: 0.88,
            include_structured: false,
        }
    }
}

/// `distill.*` (the subset the maintenance engine reads; `reinforcementBoost`
/// and `reinforcementProcedureBoost` are read by recall/procedures instead).
#[derive(Debug, Clone)]
pub struct DistillConfig {
    /// Minimum step count a tool-call chain must reach to be extracted as a procedure.
    pub min_procedure_steps: usize,
    /// Whether retrieval-directive extraction runs (mirrors `distill.extractDirectives`;
    /// directive firing itself lives in `memnexus-recall`, this only gates whether
    /// maintenance scans transcripts for new directive-worthy patterns).
    pub extract_directives: bool,
    /// Whether reinforcement-signal extraction runs over transcripts.
    pub extract_reinforcement: bool,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            min_procedure_steps: 2,
            extract_directives: true,
            extract_reinforcement: true,
        }
    }
}

/// `selfCorrection.*` (subset: semantic-dedup toggle is handled upstream by
/// ingest's classify step, so only the apply-side knobs live here).
#[derive(Debug, Clone)]
pub struct SelfCorrectionConfig {
    /// Whether self-correction scanning runs at all.
    pub enabled: bool,
    /// Minimum confidence a proposed remediation must carry to be auto-applied.
    pub min_confidence: f32,
    /// Maximum number of remediations auto-applied per calendar day.
    pub daily_cap: u32,
}

impl Default for SelfCorrectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: 0.7,
            daily_cap: 5,
        }
    }
}

/// Full maintenance-engine configuration.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceConfig {
    /// Reflection settings.
    pub reflection: ReflectionConfig,
    /// Dedupe/consolidate settings.
    pub dedupe: DedupeConfig,
    /// Distillation (procedure/reinforcement extraction) settings.
    pub distill: DistillConfig,
    /// Self-correction settings.
    pub self_correction: SelfCorrectionConfig,
}
