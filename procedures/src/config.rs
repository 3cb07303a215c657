//! `procedures.*` / `distill.reinforcementProcedureBoost` /
//! `distill.reinforcementPromotionThreshold` configuration surface (spec §6.4).

/// Full `procedures.*` configuration, plus the two `distill.*` keys that
/// govern reinforcement-triggered promotion.
#[derive(Debug, Clone)]
pub struct ProcedureConfig {
    /// Master on/off switch; a disabled engine records nothing and ranks nothing.
    pub enabled: bool,
    /// Minimum recipe length a tool-chain must reach before it is persisted
    /// as a procedure at all (spec §4.9 procedure extraction).
    pub min_steps: usize,
    /// Minimum confidence a procedure must hold before it is eligible for
    /// skill-artifact promotion, independent of the reinforcement count.
    pub validation_threshold: f32,
    /// Days after which a promoted skill with no further reinforcement is
    /// considered stale; purely informational (see [`crate::is_skill_stale`]),
    /// since the spec never un-promotes a procedure automatically.
    pub skill_ttl_days: i64,
    /// Directory promoted skill artifacts are written to.
    pub skills_auto_path: String,
    /// `reinforcedCount` threshold that triggers promotion the first time it
    /// is crossed (`distill.reinforcementPromotionThreshold`).
    pub reinforcement_promotion_threshold: u32,
}

impl Default for ProcedureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_steps: 2,
            validation_threshold: 0.6,
            skill_ttl_days: 90,
            skills_auto_path: "skills/auto".into(),
            reinforcement_promotion_threshold: 3,
        }
    }
}
