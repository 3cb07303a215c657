//! # memnexus-store
//!
//! The relational Fact Store (C1): bitemporal, scoped, tiered, decaying, and
//! reinforced facts, plus the sibling Procedure table (C9's backing store).
//! Backed by `rusqlite` (bundled SQLite) with an FTS5 virtual table for
//! lexical search, following the single-`Mutex<Connection>` repository
//! pattern used throughout the reference corpus.

mod convert;
mod facts;
mod procedures;
mod schema;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use memnexus_core::Result;

pub use facts::{CompactionConfig, GetOpts, LookupOpts, SearchOpts, StatsBreakdown};
pub use procedures::ProcedureSearchOpts;

/// The relational fact/procedure store.
///
/// A single `Mutex<Connection>` serializes all writes, matching the
/// process-wide singleton + per-operation synchronous execution model in
/// spec §5 ("Storage operations are synchronous; each runs to completion in
/// a worker").
pub struct FactStore {
    conn: Mutex<Connection>,
    /// Default reinforcement boost applied when `reinforcedCount > 0` and no
    /// per-call override is supplied (spec §4.1, config key
    /// `distill.reinforcementBoost`).
    pub default_reinforcement_boost: f32,
}

impl std::fmt::Debug for FactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactStore").finish_non_exhaustive()
    }
}

impl FactStore {
    /// Opens (creating if necessary) a fact store at `path`, running schema
    /// migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(memnexus_core::Error::storage)?;
            }
        }
        let conn = Connection::open(path).map_err(convert::to_storage_err)?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            default_reinforcement_boost: 0.1,
        })
    }

    /// Opens an in-memory store, primarily for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(convert::to_storage_err)?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            default_reinforcement_boost: 0.1,
        })
    }
}
