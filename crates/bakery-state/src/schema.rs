//! Schema definition and versioned migration.
//!
//! The schema version lives in `PRAGMA user_version`. Version 0 is a fresh
//! database; version 1 is the legacy layout whose `slices` table carried
//! `repo_path`, `worktree_path` and `branch` columns. The one-shot migration
//! to version 2 re-creates `slices` without them, copies the retained
//! columns forward, and verifies referential integrity before committing.

use sqlx::sqlite::SqliteRow;
use sqlx::{Connection, Row, SqliteConnection, SqlitePool};
use tracing::info;

use crate::error::{StoreError, StoreResult};

/// Current schema version stamped into `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 2;

const CREATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pies (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    slug       TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS slices (
    id         TEXT PRIMARY KEY,
    pie_id     TEXT NOT NULL REFERENCES pies(id) ON DELETE CASCADE,
    ordinal    INTEGER NOT NULL,
    host       TEXT NOT NULL UNIQUE,
    status     TEXT NOT NULL,
    created_at TEXT NOT NULL,
    stopped_at TEXT,
    UNIQUE (pie_id, ordinal)
);

CREATE TABLE IF NOT EXISTS slice_resources (
    id              TEXT PRIMARY KEY,
    slice_id        TEXT NOT NULL REFERENCES slices(id) ON DELETE CASCADE,
    key             TEXT NOT NULL,
    protocol        TEXT NOT NULL,
    expose          TEXT NOT NULL,
    allocated_port  INTEGER NOT NULL UNIQUE,
    route_host      TEXT UNIQUE,
    is_primary_http INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    UNIQUE (slice_id, key)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_slice_resources_primary_http
    ON slice_resources (slice_id) WHERE is_primary_http = 1;

CREATE TABLE IF NOT EXISTS audit_log (
    id         TEXT PRIMARY KEY,
    pie_id     TEXT REFERENCES pies(id) ON DELETE SET NULL,
    slice_id   TEXT REFERENCES slices(id) ON DELETE SET NULL,
    kind       TEXT NOT NULL,
    payload    TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_slices_pie ON slices (pie_id);
CREATE INDEX IF NOT EXISTS idx_slice_resources_slice ON slice_resources (slice_id);
CREATE INDEX IF NOT EXISTS idx_audit_log_pie ON audit_log (pie_id);
"#;

/// Rebuild `slices` without the legacy columns, copying retained data.
const MIGRATE_V1_TO_V2: &str = r#"
CREATE TABLE slices_migrated (
    id         TEXT PRIMARY KEY,
    pie_id     TEXT NOT NULL REFERENCES pies(id) ON DELETE CASCADE,
    ordinal    INTEGER NOT NULL,
    host       TEXT NOT NULL UNIQUE,
    status     TEXT NOT NULL,
    created_at TEXT NOT NULL,
    stopped_at TEXT,
    UNIQUE (pie_id, ordinal)
);

INSERT INTO slices_migrated (id, pie_id, ordinal, host, status, created_at, stopped_at)
    SELECT id, pie_id, ordinal, host, status, created_at, stopped_at FROM slices;

DROP TABLE slices;
ALTER TABLE slices_migrated RENAME TO slices;
CREATE INDEX IF NOT EXISTS idx_slices_pie ON slices (pie_id);
"#;

/// Bring the database up to [`SCHEMA_VERSION`], creating or migrating as
/// needed. Called once at store open.
pub(crate) async fn migrate(pool: &SqlitePool) -> StoreResult<()> {
    let mut conn = pool.acquire().await?;
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(&mut *conn)
        .await?;

    match version {
        0 => {
            let mut tx = conn.begin().await?;
            sqlx::raw_sql(CREATE_SCHEMA).execute(&mut *tx).await?;
            sqlx::raw_sql("PRAGMA user_version = 2")
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            info!(version = SCHEMA_VERSION, "schema created");
            Ok(())
        }
        1 => {
            // Table rebuilds require foreign key enforcement off for the
            // duration; the pragma is per-connection and cannot change
            // inside a transaction.
            sqlx::raw_sql("PRAGMA foreign_keys = OFF")
                .execute(&mut *conn)
                .await?;
            let result = migrate_v1_to_v2(&mut conn).await;
            sqlx::raw_sql("PRAGMA foreign_keys = ON")
                .execute(&mut *conn)
                .await?;
            result?;
            info!(from = 1, to = SCHEMA_VERSION, "schema migrated");
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        v => Err(StoreError::Migration(format!(
            "database schema version {v} is newer than supported version {SCHEMA_VERSION}"
        ))),
    }
}

async fn migrate_v1_to_v2(conn: &mut SqliteConnection) -> StoreResult<()> {
    let mut tx = conn.begin().await?;
    sqlx::raw_sql(MIGRATE_V1_TO_V2).execute(&mut *tx).await?;

    // Integrity gate: any dangling reference aborts the migration.
    let violations: Vec<SqliteRow> = sqlx::query("PRAGMA foreign_key_check")
        .fetch_all(&mut *tx)
        .await?;
    if !violations.is_empty() {
        let table: String = violations[0].try_get(0).unwrap_or_default();
        return Err(StoreError::Migration(format!(
            "foreign key check failed after rebuild ({} violation(s), first in table '{}')",
            violations.len(),
            table
        )));
    }

    sqlx::raw_sql("PRAGMA user_version = 2")
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
