//! The full `Config` surface (spec §6.4): a flat TOML key space that fills in
//! each component crate's own typed configuration. Component configs
//! (`RecallConfig`, `IngestConfig`, `MaintenanceConfig`, `ProcedureConfig`)
//! are hand-rolled value types, not serde-mirrored wire schemas, so loading
//! maps the subset of keys this facade recognizes onto them and leaves
//! everything else at each type's own default.

use std::time::Duration;

use memnexus_core::Error;
use memnexus_ingest::IngestConfig;
use memnexus_maintenance::MaintenanceConfig;
use memnexus_procedures::ProcedureConfig;
use memnexus_recall::RecallConfig;
use serde::Deserialize;

/// `embedding.*`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    /// Provider-specific model identifier.
    pub model: String,
    /// API key, if the configured provider needs one (read from the
    /// credential vault/environment in a full deployment; kept as a plain
    /// field here since providers are injected by the caller).
    pub api_key: Option<String>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self { model: "text-embedding-3-small".to_string(), api_key: None }
    }
}

/// One tier's ordered model-id fallback list (`llm.{nano,default,heavy}`).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmTierSection {
    /// Model ids, primary first.
    pub models: Vec<String>,
}

/// `llm.*`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmSection {
    /// `llm.nano`: HyDE rewrites and overflow summarization.
    pub nano: LlmTierSection,
    /// `llm.default`: classify-before-write and recall-time calls.
    pub default: LlmTierSection,
    /// `llm.heavy`: consolidation merges and reflection.
    pub heavy: LlmTierSection,
}

/// `credentials.*`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsSection {
    /// Whether the vault interception step runs at all.
    pub enabled: bool,
    /// Whether ingest auto-detects credential-shaped text.
    pub auto_detect: bool,
    /// Encryption key reference for the vault backend (opaque to this crate).
    pub encryption_key: Option<String>,
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self { enabled: false, auto_detect: true, encryption_key: None }
    }
}

/// `store.*`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Whether classify-before-write runs at all.
    pub classify_before_write: bool,
    /// Model tier used for the classify call (informational; the classify
    /// call itself always runs at `llm.default`, per [`memnexus_llm::Tier`]'s
    /// documented tier assignments).
    pub classify_model: String,
    /// Reserved: fuzzy/semantic duplicate detection threshold. Not
    /// implemented — `hasDuplicate` remains exact-match only (see
    /// `IngestConfig::dedup_threshold`'s doc comment).
    pub fuzzy_dedupe: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self { classify_before_write: true, classify_model: "default".to_string(), fuzzy_dedupe: false }
    }
}

/// The full configuration tree.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// `embedding.*`.
    pub embedding: EmbeddingSection,
    /// `llm.*`.
    pub llm: LlmSection,
    /// `credentials.*`.
    pub credentials: CredentialsSection,
    /// `store.*`.
    pub store: StoreSection,
    /// `autoRecall.*` plus the `memoryTiering.*`/`graph.*` sections recall reads.
    #[serde(skip)]
    pub recall: RecallConfig,
    /// `reflection.*`/`distill.*`/dedupe/`selfCorrection.*`.
    #[serde(skip)]
    pub maintenance: MaintenanceConfig,
    /// `procedures.*`.
    #[serde(skip)]
    pub procedures: ProcedureConfig,
}

/// The raw TOML shape this facade recognizes (spec §6.4 subset). Anything
/// the deployment's TOML file sets under an unrecognized table is ignored by
/// `toml`'s default deserialization rather than rejected, matching a
/// "recognized options (subset)" configuration surface.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawConfig {
    embedding: EmbeddingSection,
    llm: LlmSection,
    credentials: CredentialsSection,
    store: StoreSection,
}

impl Config {
    /// Parses `text` as TOML, filling in every component default for keys
    /// the deployment's file doesn't set.
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        let raw: RawConfig = toml::from_str(text).map_err(|e| Error::ConfigInvalid(e.to_string()))?;
        Ok(Self {
            embedding: raw.embedding,
            llm: raw.llm,
            credentials: raw.credentials,
            store: raw.store,
            recall: RecallConfig::default(),
            maintenance: MaintenanceConfig::default(),
            procedures: ProcedureConfig::default(),
        })
    }

    /// Builds the [`IngestConfig`] this configuration implies, given a
    /// credential vault collaborator (only wired in if `credentials.enabled`).
    #[must_use]
    pub fn ingest_config(&self, vault: Option<std::sync::Arc<dyn memnexus_ingest::CredentialVault>>) -> IngestConfig {
        IngestConfig {
            classify_before_write: self.store.classify_before_write,
            vault: if self.credentials.enabled { vault } else { None },
            ..IngestConfig::default()
        }
    }

    /// The reflection lookback window as a [`Duration`], exposed for callers
    /// that schedule the reflect job themselves.
    #[must_use]
    pub fn reflection_window(&self) -> Duration {
        self.maintenance.reflection.default_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognized_sections_and_defaults_the_rest() {
        let toml = r#"
            [embedding]
            model = "custom-embed"

            [llm.default]
            models = ["gpt-5", "gpt-5-mini"]

            [store]
            classify_before_write = false
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.embedding.model, "custom-embed");
        assert_eq!(config.llm.default.models, vec!["gpt-5".to_string(), "gpt-5-mini".to_string()]);
        assert!(!config.store.classify_before_write);
        assert!(config.credentials.auto_detect);
        assert!(config.recall.enabled);
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert!(!config.credentials.enabled);
    }

    #[test]
    fn malformed_toml_is_rejected() {
        assert!(Config::from_toml("not = [valid toml").is_err());
    }
}
