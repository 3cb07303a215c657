//! Procedure table operations (spec C9 backing store): storing recipes,
//! ranked retrieval, reinforcement, and skill-artifact promotion marking.

use rusqlite::params;

use memnexus_core::{Error, Procedure, ProcedureType, Result, Scope, ScopeFilter};

use crate::FactStore;
use crate::convert::{self, to_storage_err};

/// Options for [`FactStore::search_procedures_ranked`].
#[derive(Debug, Clone, Default)]
pub struct ProcedureSearchOpts {
    /// Restrict visibility to this scope.
    pub scope_filter: Option<ScopeFilter>,
    /// Only positive (successful-recipe) or negative (avoid-this) procedures.
    pub procedure_type: Option<ProcedureType>,
    /// Minimum confidence to be considered.
    pub min_confidence: f32,
}

fn ranking_score(p: &Procedure) -> f32 {
    let total = p.success_count + p.failure_count;
    let usage_weight = if total == 0 {
        0.0
    } else {
        (total as f32).ln_1p() / 10.0
    };
    let reinforcement = (p.reinforced_count as f32).min(5.0) * 0.02;
    p.confidence + usage_weight + reinforcement
}

impl FactStore {
    /// Inserts a procedure, returning its id.
    pub fn store_procedure(&self, procedure: &Procedure) -> Result<String> {
        let recipe_json = serde_json::to_string(&procedure.recipe).unwrap_or_else(|_| "[]".into());
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        conn.execute(
            "INSERT INTO procedures (
                id, task_pattern, recipe_json, procedure_type, success_count, failure_count,
                confidence, last_validated, last_failed, promoted_to_skill, skill_path,
                reinforced_count, scope, scope_target
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                procedure.id,
                procedure.task_pattern,
                recipe_json,
                convert::procedure_type_str(procedure.procedure_type),
                procedure.success_count,
                procedure.failure_count,
                procedure.confidence,
                procedure.last_validated,
                procedure.last_failed,
                i64::from(procedure.promoted_to_skill),
                procedure.skill_path,
                procedure.reinforced_count,
                convert::scope_as_str(procedure.scope),
                procedure.scope_target,
            ],
        )
        .map_err(to_storage_err)?;
        Ok(procedure.id.clone())
    }

    /// Reads a single procedure by id.
    pub fn get_procedure(&self, id: &str) -> Result<Option<Procedure>> {
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        Ok(conn
            .query_row(
                "SELECT * FROM procedures WHERE id = ?1",
                [id],
                convert::row_to_procedure,
            )
            .ok())
    }

    /// Lexical match over `taskPattern`, ranked by confidence with light
    /// usage/reinforcement weighting (spec §4.9: surfaced procedures must
    /// favor reliability, not just recency).
    pub fn search_procedures_ranked(
        &self,
        query: &str,
        limit: usize,
        opts: &ProcedureSearchOpts,
    ) -> Result<Vec<Procedure>> {
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let mut stmt = if query.trim().is_empty() {
            conn.prepare_cached("SELECT * FROM procedures LIMIT 500")
                .map_err(to_storage_err)?
        } else {
            conn.prepare_cached(
                "SELECT procedures.* FROM procedures
                 JOIN procedures_fts ON procedures.rowid = procedures_fts.rowid
                 WHERE procedures_fts MATCH ?1
                 LIMIT 500",
            )
            .map_err(to_storage_err)?
        };

        let fts_query = format!("\"{}\"", query.replace('"', "\"\""));
        let rows: Vec<Procedure> = if query.trim().is_empty() {
            stmt.query_map([], convert::row_to_procedure)
        } else {
            stmt.query_map([&fts_query], convert::row_to_procedure)
        }
        .map_err(to_storage_err)?
        .filter_map(std::result::Result::ok)
        .collect();

        let mut filtered: Vec<Procedure> = rows
            .into_iter()
            .filter(|p| p.confidence >= opts.min_confidence)
            .filter(|p| opts.procedure_type.is_none_or(|t| t == p.procedure_type))
            .filter(|p| {
                opts.scope_filter
                    .as_ref()
                    .is_none_or(|f| f.allows(p.scope, p.scope_target.as_deref()))
            })
            .collect();

        filtered.sort_by(|a, b| ranking_score(b).total_cmp(&ranking_score(a)));
        filtered.truncate(limit);
        Ok(filtered)
    }

    /// Records a successful or failed execution of `id`, nudging confidence
    /// (spec §4.9 reinforcement).
    pub fn reinforce_procedure(&self, id: &str, succeeded: bool, now: i64) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let current: Option<f32> = conn
            .query_row("SELECT confidence FROM procedures WHERE id = ?1", [id], |row| row.get(0))
            .ok();
        let Some(confidence) = current else { return Ok(false) };

        let new_confidence = if succeeded {
            (confidence + 0.05).min(1.0)
        } else {
            (confidence - 0.15).max(0.0)
        };

        if succeeded {
            conn.execute(
                "UPDATE procedures SET success_count = success_count + 1,
                    confidence = ?2, last_validated = ?3, reinforced_count = reinforced_count + 1
                 WHERE id = ?1",
                params![id, new_confidence, now],
            )
        } else {
            conn.execute(
                "UPDATE procedures SET failure_count = failure_count + 1,
                    confidence = ?2, last_failed = ?3
                 WHERE id = ?1",
                params![id, new_confidence, now],
            )
        }
        .map_err(to_storage_err)?;
        Ok(true)
    }

    /// Appends a praise-triggered reinforcement (spec §4.9 `reinforceProcedure`):
    /// increments `reinforcedCount` only, distinct from [`Self::reinforce_procedure`]'s
    /// success/failure validation counters. Returns the new count, or `None`
    /// if `id` is unknown.
    pub fn reinforce_procedure_praise(&self, id: &str) -> Result<Option<u32>> {
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let changed = conn
            .execute(
                "UPDATE procedures SET reinforced_count = reinforced_count + 1 WHERE id = ?1",
                params![id],
            )
            .map_err(to_storage_err)?;
        if changed == 0 {
            return Ok(None);
        }
        let count: u32 = conn
            .query_row("SELECT reinforced_count FROM procedures WHERE id = ?1", [id], |row| row.get(0))
            .map_err(to_storage_err)?;
        Ok(Some(count))
    }

    /// Marks a procedure as promoted to a standalone skill artifact, storing
    /// the path it was written to (spec §4.9 promotion).
    pub fn mark_promoted(&self, id: &str, skill_path: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let changed = conn
            .execute(
                "UPDATE procedures SET promoted_to_skill = 1, skill_path = ?2 WHERE id = ?1",
                params![id, skill_path],
            )
            .map_err(to_storage_err)?;
        Ok(changed > 0)
    }

    /// Reassigns a procedure's scope, mirroring [`FactStore::promote_scope`].
    pub fn promote_procedure_scope(&self, id: &str, scope: Scope, target: Option<&str>) -> Result<bool> {
        if matches!(scope, Scope::Global) && target.is_some() {
            return Ok(false);
        }
        if !matches!(scope, Scope::Global) && target.is_none() {
            return Ok(false);
        }
        let conn = self.conn.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let changed = conn
            .execute(
                "UPDATE procedures SET scope = ?2, scope_target = ?3 WHERE id = ?1",
                params![id, convert::scope_as_str(scope), target],
            )
            .map_err(to_storage_err)?;
        Ok(changed > 0)
    }
}
