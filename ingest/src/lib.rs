//! # memnexus-ingest
//!
//! Classify-before-write ingest pipeline (C6): exact-duplicate short-circuit,
//! heuristic field extraction, credential-vault interception, an
//! LLM-decided ADD/UPDATE/DELETE/NOOP classification against similar
//! neighbours, and the WAL-coordinated write itself.

mod heuristics;
mod vault;

use std::collections::BTreeSet;
use std::sync::Arc;

use memnexus_core::{
    CancelSignal, Category, ChatParams, Clock, DecayClass, Error, Fact, LlmError, Message, PendingWarnings, Result,
    Scope, Tier, VectorRecord,
};
use memnexus_llm::{ChatClient, EmbeddingClient, Tier as LlmTier};
use memnexus_store::FactStore;
use memnexus_vector::VectorStore;
use memnexus_wal::WriteAheadLog;

pub use vault::{CredentialFields, CredentialVault, VaultWrite};

/// One of the five outcomes ingest produces (spec §4.5, §6.6).
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// An exact duplicate of an existing active fact; nothing was written.
    Duplicate,
    /// A credential was stored in the vault and a pointer fact was written.
    Credential {
        /// Id of the written pointer fact.
        id: String,
        /// Vault service the credential belongs to.
        service: String,
        /// Vault credential type.
        cred_type: String,
    },
    /// The vault already held an identical credential; nothing was written.
    CredentialSkippedDuplicate {
        /// Vault service the credential belongs to.
        service: String,
        /// Vault credential type.
        cred_type: String,
    },
    /// The text looked credential-like but could not be parsed into fields.
    CredentialParseError,
    /// The vault rejected the write.
    CredentialVaultError(String),
    /// The pointer fact could not be written after a successful vault write;
    /// the vault entry was compensating-deleted.
    CredentialDbError(String),
    /// The LLM classifier decided no write was warranted.
    Noop {
        /// The classifier's stated reason.
        reason: String,
    },
    /// The LLM classifier decided the text retracts an existing fact.
    Retracted {
        /// Id of the fact that was superseded with no replacement.
        target_id: String,
        /// The classifier's stated reason.
        reason: String,
    },
    /// The LLM classifier decided the text updates an existing fact.
    Updated {
        /// Id of the newly written fact.
        id: String,
        /// Id of the fact it supersedes.
        superseded_id: String,
        /// The classifier's stated reason.
        reason: String,
    },
    /// A new fact (and vector) was written.
    Stored {
        /// Id of the newly written fact.
        id: String,
        /// First 120 characters of the stored text.
        text_preview: String,
        /// Id of a fact explicitly superseded by this write, if any.
        superseded_id: Option<String>,
    },
}

/// Caller-supplied fields for one ingest call (spec §4.5 Purpose).
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// The incoming natural-language statement.
    pub text: String,
    /// Structured entity, if already known to the caller.
    pub entity: Option<String>,
    /// Structured key, if already known to the caller.
    pub key: Option<String>,
    /// Structured value, if already known to the caller.
    pub value: Option<String>,
    /// Closed/extensible category for the resulting fact.
    pub category: Category,
    /// Free-text origin of this statement.
    pub source: String,
    /// Real-world date the statement describes, if known.
    pub source_date: Option<i64>,
    /// Access dimension for the resulting fact.
    pub scope: Scope,
    /// Scope identifier; required unless `scope == Global`.
    pub scope_target: Option<String>,
    /// Id of a fact this statement explicitly supersedes, if any.
    pub supersedes_id: Option<String>,
    /// Decay class for the resulting fact.
    pub decay_class: DecayClass,
    /// Importance in `[0, 1]` for the resulting fact.
    pub importance: f32,
}

impl IngestRequest {
    /// Builds a request with every optional field unset, global scope, and
    /// default decay/importance.
    #[must_use]
    pub fn new(text: impl Into<String>, category: Category, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            entity: None,
            key: None,
            value: None,
            category,
            source: source.into(),
            source_date: None,
            scope: Scope::Global,
            scope_target: None,
            supersedes_id: None,
            decay_class: DecayClass::Default,
            importance: 0.5,
        }
    }
}

/// Whether classify-before-write runs at all, and which vault (if any) is
/// wired in (spec §6.4 `store.classifyBeforeWrite`, `credentials.enabled`).
pub struct IngestConfig {
    /// Whether step 4's LLM classification runs at all.
    pub classify_before_write: bool,
    /// The credential vault collaborator, if `credentials.enabled`.
    pub vault: Option<Arc<dyn CredentialVault>>,
    /// Reserved for a future fuzzy/semantic duplicate threshold
    /// (`store.fuzzyDedupe`); `has_duplicate` is exact-match only today.
    pub dedup_threshold: f32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            classify_before_write: true,
            vault: None,
            dedup_threshold: 0.92,
        }
    }
}

/// Wires the Fact Store, Vector Store, WAL, embedding/chat clients, and an
/// optional credential vault into one classify-before-write ingest call
/// (spec §4.5 C6). Callers must serialize ingest calls per `(entity, key)`
/// themselves (spec §4.5 "Ordering and idempotence") — this type performs no
/// internal locking beyond what the stores already provide.
pub struct IngestEngine {
    facts: Arc<FactStore>,
    vectors: Arc<VectorStore>,
    wal: Arc<WriteAheadLog>,
    embeddings: Arc<EmbeddingClient>,
    chat: Arc<ChatClient>,
    clock: Arc<dyn Clock>,
    config: IngestConfig,
}

impl std::fmt::Debug for IngestEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestEngine").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClassifyAction {
    Add,
    Noop { reason: String },
    Delete { target_id: String, reason: String },
    Update { target_id: String, reason: String },
}

impl IngestEngine {
    /// Wires together the components ingest needs.
    #[must_use]
    pub fn new(
        facts: Arc<FactStore>,
        vectors: Arc<VectorStore>,
        wal: Arc<WriteAheadLog>,
        embeddings: Arc<EmbeddingClient>,
        chat: Arc<ChatClient>,
        clock: Arc<dyn Clock>,
        config: IngestConfig,
    ) -> Self {
        Self {
            facts,
            vectors,
            wal,
            embeddings,
            chat,
            clock,
            config,
        }
    }

    /// Runs the full classify-before-write pipeline for one incoming
    /// statement (spec §4.5 Algorithm, steps 1-5).
    pub async fn ingest(
        &self,
        request: IngestRequest,
        cancel: &CancelSignal,
        warnings: &mut PendingWarnings,
    ) -> Result<Outcome> {
        // Step 1: exact duplicate check.
        if self.facts.has_duplicate(&request.text)? {
            return Ok(Outcome::Duplicate);
        }

        // Step 2: heuristic field extraction.
        let extracted = heuristics::extract_fields(
            &request.text,
            request.entity.as_deref(),
            request.key.as_deref(),
            request.value.as_deref(),
        );

        // Step 3: credential interception.
        if let Some(vault) = self.config.vault.clone() {
            if let Some(candidate) = extracted.value.as_deref() {
                if heuristics::looks_like_credential(candidate) {
                    return self.ingest_credential(&request, &extracted, vault, cancel).await;
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Llm(LlmError::Cancelled));
        }

        let now = self.clock.now();

        // Step 4: classify-before-write.
        if self.config.classify_before_write {
            let embedding = self.embeddings.embed(&request.text).await?;
            let neighbors = self.nearest_neighbors(&request, &extracted, &embedding, now).await?;

            if !neighbors.is_empty() {
                let action = self.classify(&request, &neighbors, cancel, warnings).await;

                // P9: cancelling between classify and write must leave store
                // counts unchanged and write no WAL entry.
                if cancel.is_cancelled() {
                    return Err(Error::Llm(LlmError::Cancelled));
                }

                match action {
                    ClassifyAction::Noop { reason } => return Ok(Outcome::Noop { reason }),
                    ClassifyAction::Delete { target_id, reason } => {
                        self.facts.supersede(&target_id, None, now)?;
                        return Ok(Outcome::Retracted { target_id, reason });
                    }
                    ClassifyAction::Update { target_id, reason } => {
                        return self
                            .apply_update(&request, &extracted, &target_id, reason, &embedding, now)
                            .await;
                    }
                    ClassifyAction::Add => {}
                }
            }

            return self.write_new_fact(&request, &extracted, &embedding, request.supersedes_id.clone(), now).await;
        }

        // classify-before-write disabled: embed and write directly.
        let embedding = self.embeddings.embed(&request.text).await?;
        self.write_new_fact(&request, &extracted, &embedding, request.supersedes_id.clone(), now).await
    }

    async fn nearest_neighbors(
        &self,
        request: &IngestRequest,
        extracted: &heuristics::ExtractedFields,
        embedding: &[f32],
        now: i64,
    ) -> Result<Vec<Fact>> {
        let hits = self.vectors.search(embedding, 5, 0.0)?;
        if !hits.is_empty() {
            let mut facts = Vec::with_capacity(hits.len());
            for hit in hits {
                if let Some(fact) = self.facts.get_by_id(&hit.id, now, &memnexus_store::GetOpts::default())? {
                    facts.push(fact);
                }
            }
            return Ok(facts);
        }
        self.facts.find_similar_for_classification(
            &request.text,
            extracted.entity.as_deref(),
            extracted.key.as_deref(),
            5,
            now,
        )
    }

    async fn classify(
        &self,
        request: &IngestRequest,
        neighbors: &[Fact],
        cancel: &CancelSignal,
        warnings: &mut PendingWarnings,
    ) -> ClassifyAction {
        let prompt = classification_prompt(&request.text, neighbors);
        let messages = vec![
            Message::system(
                "You decide how a new statement relates to similar existing facts. \
                 Respond with exactly one JSON object: \
                 {\"action\":\"ADD\"} or {\"action\":\"NOOP\",\"reason\":\"...\"} or \
                 {\"action\":\"DELETE\",\"targetId\":\"...\",\"reason\":\"...\"} or \
                 {\"action\":\"UPDATE\",\"targetId\":\"...\",\"reason\":\"...\"}. No other text.",
            ),
            Message::user(prompt),
        ];

        let response = self
            .chat
            .complete(LlmTier::Default, &messages, &ChatParams::default(), cancel, warnings)
            .await;

        match response {
            Ok(text) => parse_classify_decision(&text).unwrap_or(ClassifyAction::Add),
            Err(_) => ClassifyAction::Add,
        }
    }

    async fn apply_update(
        &self,
        request: &IngestRequest,
        extracted: &heuristics::ExtractedFields,
        target_id: &str,
        reason: String,
        embedding: &[f32],
        now: i64,
    ) -> Result<Outcome> {
        let old = self
            .facts
            .get_by_id(target_id, now, &memnexus_store::GetOpts::default())?
            .ok_or_else(|| Error::not_found(format!("supersession target {target_id} not found")))?;

        let mut new_fact = build_fact(request, extracted, now);
        new_fact.entity = new_fact.entity.or_else(|| old.entity.clone());
        new_fact.key = new_fact.key.or_else(|| old.key.clone());
        new_fact.value = new_fact.value.or_else(|| old.value.clone());
        new_fact.supersedes_id = Some(target_id.to_string());

        let new_id = new_fact.id.clone();
        self.write_through_wal(&new_fact, embedding)?;
        self.facts.supersede(target_id, Some(&new_id), now)?;

        Ok(Outcome::Updated {
            id: new_id,
            superseded_id: target_id.to_string(),
            reason,
        })
    }

    async fn write_new_fact(
        &self,
        request: &IngestRequest,
        extracted: &heuristics::ExtractedFields,
        embedding: &[f32],
        supersedes_id: Option<String>,
        now: i64,
    ) -> Result<Outcome> {
        let mut fact = build_fact(request, extracted, now);
        fact.supersedes_id = supersedes_id.clone();

        let id = fact.id.clone();
        let preview: String = fact.text.chars().take(120).collect();
        self.write_through_wal(&fact, embedding)?;

        if let Some(target_id) = supersedes_id.clone() {
            self.facts.supersede(&target_id, Some(&id), now)?;
        }

        Ok(Outcome::Stored {
            id,
            text_preview: preview,
            superseded_id: supersedes_id,
        })
    }

    /// Writes the fact row then the vector record through the WAL, removing
    /// each WAL entry once its store write lands (spec §4.5 step 5, §9: "use
    /// WAL + idempotent replay and accept brief inconsistency").
    fn write_through_wal(&self, fact: &Fact, embedding: &[f32]) -> Result<()> {
        let now = self.clock.now();
        let fact_wal_id = self.wal.write("fact_write", serde_json::json!({ "id": fact.id }), now)?;
        self.facts.store(fact)?;
        self.wal.remove(&fact_wal_id)?;

        let record = VectorRecord {
            id: fact.id.clone(),
            text: fact.text.clone(),
            vector: embedding.to_vec(),
            category: fact.category,
            importance: fact.importance,
        };
        let vector_wal_id = self.wal.write("vector_write", serde_json::json!({ "id": fact.id }), now)?;
        self.vectors.store(record)?;
        self.wal.remove(&vector_wal_id)?;
        Ok(())
    }

    async fn ingest_credential(
        &self,
        request: &IngestRequest,
        extracted: &heuristics::ExtractedFields,
        vault: Arc<dyn CredentialVault>,
        cancel: &CancelSignal,
    ) -> Result<Outcome> {
        if extracted.value.is_none() {
            return Ok(Outcome::CredentialParseError);
        }
        let fields = heuristics::parse_credential_fields(&request.text);
        if fields.value.trim().is_empty() {
            return Ok(Outcome::CredentialParseError);
        }

        if cancel.is_cancelled() {
            return Err(Error::Llm(LlmError::Cancelled));
        }

        match vault.store_if_new(&fields.service, &fields.cred_type, &fields.value) {
            Ok(VaultWrite::DuplicateSkipped) => {
                return Ok(Outcome::CredentialSkippedDuplicate {
                    service: fields.service,
                    cred_type: fields.cred_type,
                });
            }
            Ok(VaultWrite::Stored) => {}
            Err(e) => return Ok(Outcome::CredentialVaultError(e)),
        }

        let pointer_text = format!("Credential on file for {} ({})", fields.service, fields.cred_type);
        let now = self.clock.now();
        let mut pointer = IngestRequest::new(pointer_text.clone(), request.category, request.source.clone());
        pointer.entity = Some(fields.service.clone());
        pointer.key = Some(fields.cred_type.clone());
        pointer.value = Some(vault::pointer_value(&fields.service, &fields.cred_type));
        pointer.scope = request.scope;
        pointer.scope_target = request.scope_target.clone();
        pointer.decay_class = DecayClass::Stable;

        let pointer_fields = heuristics::ExtractedFields {
            entity: pointer.entity.clone(),
            key: pointer.key.clone(),
            value: pointer.value.clone(),
        };
        let fact = build_fact(&pointer, &pointer_fields, now);
        let id = fact.id.clone();

        let embedding = match self.embeddings.embed(&pointer_text).await {
            Ok(v) => v,
            Err(e) => {
                let _ = vault.delete(&fields.service, &fields.cred_type);
                return Ok(Outcome::CredentialDbError(e.to_string()));
            }
        };

        match self.write_through_wal(&fact, &embedding) {
            Ok(()) => Ok(Outcome::Credential {
                id,
                service: fields.service,
                cred_type: fields.cred_type,
            }),
            Err(e) => {
                let _ = vault.delete(&fields.service, &fields.cred_type);
                Ok(Outcome::CredentialDbError(e.to_string()))
            }
        }
    }
}

fn build_fact(request: &IngestRequest, extracted: &heuristics::ExtractedFields, now: i64) -> Fact {
    Fact {
        id: uuid::Uuid::new_v4().to_string(),
        text: request.text.clone(),
        summary: None,
        category: request.category,
        entity: extracted.entity.clone(),
        key: extracted.key.clone(),
        value: extracted.value.clone(),
        tags: BTreeSet::new(),
        importance: request.importance,
        confidence: 1.0,
        decay_class: request.decay_class,
        tier: Tier::Warm,
        scope: request.scope,
        scope_target: request.scope_target.clone(),
        source: request.source.clone(),
        created_at: now,
        last_confirmed_at: now,
        last_accessed: now,
        source_date: request.source_date,
        valid_from: request.source_date.unwrap_or(now),
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

fn classification_prompt(text: &str, neighbors: &[Fact]) -> String {
    let mut prompt = format!("New statement: \"{text}\"\n\nSimilar existing facts:\n");
    for fact in neighbors {
        prompt.push_str(&format!("- id={} text=\"{}\"\n", fact.id, fact.text));
    }
    prompt
}

fn parse_classify_decision(raw: &str) -> Option<ClassifyAction> {
    let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
    let action = value.get("action")?.as_str()?.to_ascii_uppercase();
    let reason = value
        .get("reason")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("")
        .to_string();
    let target_id = value.get("targetId").and_then(serde_json::Value::as_str).map(str::to_string);

    match action.as_str() {
        "ADD" => Some(ClassifyAction::Add),
        "NOOP" => Some(ClassifyAction::Noop { reason }),
        "DELETE" => Some(ClassifyAction::Delete {
            target_id: target_id?,
            reason,
        }),
        "UPDATE" => Some(ClassifyAction::Update {
            target_id: target_id?,
            reason,
        }),
        _ => None,
    }
}
