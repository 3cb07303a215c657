//! Consolidation (spec §4.7): "for each cluster of ≥2, an LLM merges the
//! texts into a canonical statement; write one new fact, supersede the
//! originals to point to it, delete the replaced vectors."

use memnexus_core::{
    Breadcrumb, CancelSignal, ChatParams, Clock, DecayClass, Error, Fact, Message, PendingWarnings, Result,
    VectorRecord,
};
use memnexus_llm::{ChatClient, EmbeddingClient, Tier as LlmTier};
use memnexus_store::{FactStore, GetOpts};
use memnexus_vector::VectorStore;
use memnexus_wal::WriteAheadLog;

fn merge_prompt(texts: &[String]) -> String {
    let bullets: String = texts.iter().map(|t| format!("- {t}\n")).collect();
    format!("Merge these near-duplicate statements into one canonical statement:\n{bullets}")
}

fn decay_rank(decay_class: DecayClass) -> u8 {
    match decay_class {
        DecayClass::Permanent => 0,
        DecayClass::Stable => 1,
        DecayClass::Default => 2,
        DecayClass::Volatile => 3,
    }
}

fn build_merged_fact(id: String, canonical_text: String, originals: &[Fact], now: i64) -> Fact {
    let template = originals
        .iter()
        .max_by(|a, b| a.importance.total_cmp(&b.importance))
        .expect("caller guarantees at least two originals");
    let importance = originals.iter().map(|f| f.importance).fold(0.0_f32, f32::max);
    let confidence = originals.iter().map(|f| f.confidence).sum::<f32>() / originals.len() as f32;
    let decay_class = originals
        .iter()
        .map(|f| f.decay_class)
        .min_by_key(|d| decay_rank(*d))
        .unwrap_or(template.decay_class);

    Fact {
        id,
        text: canonical_text,
        summary: None,
        category: template.category,
        entity: template.entity.clone(),
        key: template.key.clone(),
        value: template.value.clone(),
        tags: originals.iter().flat_map(|f| f.tags.iter().cloned()).collect(),
        importance,
        confidence,
        decay_class,
        tier: template.tier,
        scope: template.scope,
        scope_target: template.scope_target.clone(),
        source: "consolidation".into(),
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

/// Merges a cluster of near-duplicate fact ids into one canonical fact.
/// Returns `Ok(None)` if fewer than two ids still resolve to active facts
/// (a race with a concurrent prune/supersede) or if the merge call fails —
/// consolidation degrades gracefully rather than failing the maintenance pass.
pub async fn consolidate_cluster(
    ids: &[String],
    facts: &FactStore,
    vectors: &VectorStore,
    embeddings: &EmbeddingClient,
    chat: &ChatClient,
    wal: &WriteAheadLog,
    clock: &dyn Clock,
    cancel: &CancelSignal,
    warnings: &mut PendingWarnings,
) -> Result<Option<String>> {
    let now = clock.now();
    let mut originals = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(fact) = facts.get_by_id(id, now, &GetOpts::default())? {
            originals.push(fact);
        }
    }
    if originals.len() < 2 {
        return Ok(None);
    }

    let texts: Vec<String> = originals.iter().map(|f| f.text.clone()).collect();
    let messages = vec![
        Message::system("You merge near-duplicate memory statements into one concise canonical statement. Respond with the merged statement only, no preamble."),
        Message::user(merge_prompt(&texts)),
    ];

    let canonical = match chat.complete(LlmTier::Heavy, &messages, &ChatParams::default(), cancel, warnings).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => return Ok(None),
        Err(err) => {
            warnings.push(Breadcrumb::from_error("consolidate", None, &Error::Llm(err)));
            return Ok(None);
        }
    };

    let embedding = match embeddings.embed(&canonical).await {
        Ok(vector) => vector,
        Err(err) => {
            warnings.push(Breadcrumb::from_error("consolidate", None, &err));
            return Ok(None);
        }
    };

    let new_id = uuid::Uuid::new_v4().to_string();
    let merged = build_merged_fact(new_id.clone(), canonical, &originals, now);

    let fact_wal_id = wal.write("fact_write", serde_json::json!({ "id": merged.id }), now)?;
    facts.store(&merged)?;
    wal.remove(&fact_wal_id)?;

    let record = VectorRecord {
        id: merged.id.clone(),
        text: merged.text.clone(),
        vector: embedding,
        category: merged.category,
        importance: merged.importance,
    };
    let vector_wal_id = wal.write("vector_write", serde_json::json!({ "id": merged.id }), now)?;
    vectors.store(record)?;
    wal.remove(&vector_wal_id)?;

    for original in &originals {
        facts.supersede(&original.id, Some(&new_id), now)?;
        vectors.remove(&original.id)?;
    }

    Ok(Some(new_id))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use memnexus_core::{embedding::EmbeddingModel, llm::LanguageModel, Category, DecayClass, FixedClock, Scope, Tier as FactTier};
    use memnexus_llm::{ModelBinding, RetryPolicy, TierChain};
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
        async fn complete(&self, _model: &str, _messages: &[Message], _params: &ChatParams) -> std::result::Result<String, memnexus_core::LlmError> {
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
            tier: FactTier::Warm,
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

    #[tokio::test]
    async fn consolidates_cluster_into_one_superseding_fact() {
        let dir = tempdir().unwrap();
        let facts = FactStore::open_in_memory().unwrap();
        let vectors = memnexus_vector::open(dir.path().join("v.redb"), 2).unwrap();
        let wal = WriteAheadLog::open(dir.path().join("wal")).unwrap();
        let embeddings = EmbeddingClient::new(std::sync::Arc::new(FakeEmbedder));
        let binding = ModelBinding::new("stub", std::sync::Arc::new(ScriptedLlm { response: "canonical merged fact".into() }) as std::sync::Arc<dyn LanguageModel>);
        let chain = TierChain::new(binding, Vec::new());
        let chat = ChatClient::new(chain.clone(), chain.clone(), chain, RetryPolicy::default());
        let clock = FixedClock::new(2_000);

        facts.store(&fact("f1", "the user prefers dark mode")).unwrap();
        facts.store(&fact("f2", "user prefers dark theme")).unwrap();
        vectors.store(VectorRecord { id: "f1".into(), text: "a".into(), vector: vec![1.0, 0.0], category: Category::Fact, importance: 0.5 }).unwrap();
        vectors.store(VectorRecord { id: "f2".into(), text: "b".into(), vector: vec![0.99, 0.01], category: Category::Fact, importance: 0.5 }).unwrap();

        let mut warnings = PendingWarnings::new();
        let new_id = consolidate_cluster(
            &["f1".to_string(), "f2".to_string()],
            &facts,
            &vectors,
            &embeddings,
            &chat,
            &wal,
            &clock,
            &CancelSignal::new(),
            &mut warnings,
        )
        .await
        .unwrap()
        .unwrap();

        let merged = facts.get_by_id(&new_id, 2_000, &GetOpts::default()).unwrap().unwrap();
        assert_eq!(merged.text, "canonical merged fact");

        let f1 = facts.get_by_id("f1", 2_000, &GetOpts { include_superseded: true, ..GetOpts::default() }).unwrap().unwrap();
        assert_eq!(f1.superseded_by.as_deref(), Some(new_id.as_str()));
        assert!(vectors.get("f1").is_none());
        assert!(vectors.get("f2").is_none());
    }

    #[tokio::test]
    async fn fewer_than_two_surviving_ids_returns_none() {
        let dir = tempdir().unwrap();
        let facts = FactStore::open_in_memory().unwrap();
        let vectors = memnexus_vector::open(dir.path().join("v.redb"), 2).unwrap();
        let wal = WriteAheadLog::open(dir.path().join("wal")).unwrap();
        let embeddings = EmbeddingClient::new(std::sync::Arc::new(FakeEmbedder));
        let binding = ModelBinding::new("stub", std::sync::Arc::new(ScriptedLlm { response: "x".into() }) as std::sync::Arc<dyn LanguageModel>);
        let chain = TierChain::new(binding, Vec::new());
        let chat = ChatClient::new(chain.clone(), chain.clone(), chain, RetryPolicy::default());
        let clock = FixedClock::new(2_000);

        facts.store(&fact("f1", "only one fact")).unwrap();
        let mut warnings = PendingWarnings::new();
        let result = consolidate_cluster(
            &["f1".to_string(), "missing".to_string()],
            &facts,
            &vectors,
            &embeddings,
            &chat,
            &wal,
            &clock,
            &CancelSignal::new(),
            &mut warnings,
        )
        .await
        .unwrap();
        assert!(result.is_none());
    }
}
