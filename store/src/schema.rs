//! DDL for the fact/procedure store (spec §6.1: one table per entity, an
//! FTS-compatible index over `text`, a migration log, and the indexes named
//! in that section).

use rusqlite::Connection;

use memnexus_core::Result;

use crate::convert::to_storage_err;

const SCHEMA_VERSION: i64 = 1;

/// Creates every table, index, and FTS5 virtual table if they do not already
/// exist, and records the schema version in the migration log.
pub(crate) fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS migration_log (
            version     INTEGER PRIMARY KEY,
            applied_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS facts (
            id                  TEXT PRIMARY KEY,
            text                TEXT NOT NULL,
            normalized_text     TEXT NOT NULL,
            summary             TEXT,
            category            TEXT NOT NULL,
            entity              TEXT,
            key                 TEXT,
            value               TEXT,
            tags                TEXT NOT NULL DEFAULT '[]',
            importance          REAL NOT NULL DEFAULT 0.5,
            confidence          REAL NOT NULL DEFAULT 1.0,
            decay_class         TEXT NOT NULL DEFAULT 'default',
            tier                TEXT NOT NULL DEFAULT 'warm',
            scope               TEXT NOT NULL DEFAULT 'global',
            scope_target        TEXT,
            source              TEXT NOT NULL,
            created_at          INTEGER NOT NULL,
            last_confirmed_at   INTEGER NOT NULL,
            last_accessed       INTEGER NOT NULL,
            source_date         INTEGER,
            valid_from          INTEGER NOT NULL,
            valid_until         INTEGER,
            superseded_at       INTEGER,
            superseded_by       TEXT,
            supersedes_id       TEXT,
            expires_at          INTEGER,
            recall_count        INTEGER NOT NULL DEFAULT 0,
            reinforced_count    INTEGER NOT NULL DEFAULT 0,
            last_reinforced_at  INTEGER,
            reinforced_quotes   TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_facts_entity_key ON facts(entity, key);
        CREATE INDEX IF NOT EXISTS idx_facts_scope ON facts(scope, scope_target);
        CREATE INDEX IF NOT EXISTS idx_facts_tier ON facts(tier);
        CREATE INDEX IF NOT EXISTS idx_facts_expires_at ON facts(expires_at);
        CREATE INDEX IF NOT EXISTS idx_facts_reinforced_count ON facts(reinforced_count);
        CREATE INDEX IF NOT EXISTS idx_facts_superseded_at ON facts(superseded_at);
        CREATE INDEX IF NOT EXISTS idx_facts_normalized_text ON facts(normalized_text);

        CREATE VIRTUAL TABLE IF NOT EXISTS facts_fts USING fts5(
            text,
            content = 'facts',
            content_rowid = 'rowid'
        );

        CREATE TRIGGER IF NOT EXISTS facts_ai AFTER INSERT ON facts BEGIN
            INSERT INTO facts_fts(rowid, text) VALUES (new.rowid, new.text);
        END;

        CREATE TRIGGER IF NOT EXISTS facts_ad AFTER DELETE ON facts BEGIN
            INSERT INTO facts_fts(facts_fts, rowid, text) VALUES ('delete', old.rowid, old.text);
        END;

        CREATE TRIGGER IF NOT EXISTS facts_au AFTER UPDATE ON facts BEGIN
            INSERT INTO facts_fts(facts_fts, rowid, text) VALUES ('delete', old.rowid, old.text);
            INSERT INTO facts_fts(rowid, text) VALUES (new.rowid, new.text);
        END;

        CREATE TABLE IF NOT EXISTS procedures (
            id                  TEXT PRIMARY KEY,
            task_pattern        TEXT NOT NULL,
            recipe_json         TEXT NOT NULL,
            procedure_type      TEXT NOT NULL,
            success_count       INTEGER NOT NULL DEFAULT 0,
            failure_count       INTEGER NOT NULL DEFAULT 0,
            confidence          REAL NOT NULL DEFAULT 0.5,
            last_validated      INTEGER,
            last_failed         INTEGER,
            promoted_to_skill   INTEGER NOT NULL DEFAULT 0,
            skill_path          TEXT,
            reinforced_count    INTEGER NOT NULL DEFAULT 0,
            scope               TEXT NOT NULL DEFAULT 'global',
            scope_target        TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_procedures_scope ON procedures(scope, scope_target);

        CREATE VIRTUAL TABLE IF NOT EXISTS procedures_fts USING fts5(
            task_pattern,
            content = 'procedures',
            content_rowid = 'rowid'
        );

        CREATE TRIGGER IF NOT EXISTS procedures_ai AFTER INSERT ON procedures BEGIN
            INSERT INTO procedures_fts(rowid, task_pattern) VALUES (new.rowid, new.task_pattern);
        END;

        CREATE TRIGGER IF NOT EXISTS procedures_ad AFTER DELETE ON procedures BEGIN
            INSERT INTO procedures_fts(procedures_fts, rowid, task_pattern) VALUES ('delete', old.rowid, old.task_pattern);
        END;

        CREATE TRIGGER IF NOT EXISTS procedures_au AFTER UPDATE ON procedures BEGIN
            INSERT INTO procedures_fts(procedures_fts, rowid, task_pattern) VALUES ('delete', old.rowid, old.task_pattern);
            INSERT INTO procedures_fts(rowid, task_pattern) VALUES (new.rowid, new.task_pattern);
        END;

        CREATE TABLE IF NOT EXISTS links (
            from_id     TEXT NOT NULL,
            to_id       TEXT NOT NULL,
            kind        TEXT NOT NULL DEFAULT 'related_to',
            strength    REAL NOT NULL DEFAULT 1.0,
            updated_at  INTEGER NOT NULL,
            PRIMARY KEY (from_id, to_id, kind)
        );
        ",
    )
    .map_err(to_storage_err)?;

    conn.execute(
        "INSERT OR IGNORE INTO migration_log (version, applied_at) VALUES (?1, strftime('%s','now'))",
        [SCHEMA_VERSION],
    )
    .map_err(to_storage_err)?;

    Ok(())
}
