//! Store — SQLite-backed persistence for Bakery.
//!
//! Every public operation is a self-contained transaction. Composite
//! workflows (slice creation with its resource batch, cascading pie
//! deletion) run as one transaction so partial state is never visible.
//! Uniqueness violations surface as [`StoreError::Conflict`].

use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{map_db_err, StoreError, StoreResult};
use crate::schema;
use crate::types::*;

/// Thread-safe store handle backed by a SQLite pool.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) a persistent store at the given path and bring its
    /// schema up to date. Parent directories are created as needed.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Open(format!("create {}: {e}", parent.display())))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Open(e.to_string()))?;

        schema::migrate(&pool).await?;
        debug!(?path, "store opened");
        Ok(Self { pool })
    }

    /// Create an ephemeral in-memory store (for testing). A single pooled
    /// connection keeps the database alive for the store's lifetime.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Open(e.to_string()))?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Open(e.to_string()))?;

        schema::migrate(&pool).await?;
        debug!("in-memory store opened");
        Ok(Self { pool })
    }

    // ── Pies ───────────────────────────────────────────────────────

    /// Insert a pie and its `pie.created` audit row. Fails with `Conflict`
    /// if the slug is taken.
    pub async fn create_pie(&self, name: &str, slug: &str) -> StoreResult<Pie> {
        let pie = Pie {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
            created_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO pies (id, name, slug, created_at) VALUES (?, ?, ?, ?)")
            .bind(&pie.id)
            .bind(&pie.name)
            .bind(&pie.slug)
            .bind(pie.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        insert_audit(
            &mut tx,
            NewAuditEntry {
                kind: AuditKind::PieCreated,
                pie_id: Some(pie.id.clone()),
                slice_id: None,
                payload: json!({ "pieId": pie.id, "name": pie.name, "slug": pie.slug }),
            },
        )
        .await?;
        tx.commit().await?;

        debug!(slug = %pie.slug, "pie created");
        Ok(pie)
    }

    /// List all pies, newest first.
    pub async fn list_pies(&self) -> StoreResult<Vec<Pie>> {
        let rows = sqlx::query("SELECT id, name, slug, created_at FROM pies ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(pie_from_row).collect()
    }

    /// Look a pie up by id or slug.
    pub async fn find_pie_by_id_or_slug(&self, identifier: &str) -> StoreResult<Option<Pie>> {
        let row = sqlx::query("SELECT id, name, slug, created_at FROM pies WHERE id = ?1 OR slug = ?1")
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(pie_from_row).transpose()
    }

    /// Delete a pie and everything under it: non-stopped slices are stopped
    /// (with `slice.stopped` audits), every slice is deleted (with
    /// `slice.deleted` audits that set only the pie column), the pie row is
    /// removed, and a `pie.deleted` audit is appended — all in one
    /// transaction. Audit FK columns referencing the deleted rows are nulled
    /// by the cascade; the payloads keep the identifiers.
    pub async fn delete_pie_cascade(&self, pie_id: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let pie = fetch_pie(&mut tx, pie_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Pie '{pie_id}' not found")))?;

        let slices = fetch_slices_for_pie(&mut tx, &pie.id).await?;

        for slice in &slices {
            if slice.status != SliceStatus::Stopped {
                mark_slice_stopped(&mut tx, &slice.id).await?;
                insert_audit(
                    &mut tx,
                    NewAuditEntry {
                        kind: AuditKind::SliceStopped,
                        pie_id: Some(pie.id.clone()),
                        slice_id: Some(slice.id.clone()),
                        payload: json!({ "sliceId": slice.id, "pieId": pie.id, "host": slice.host }),
                    },
                )
                .await?;
            }
        }

        for slice in &slices {
            insert_audit(
                &mut tx,
                NewAuditEntry {
                    kind: AuditKind::SliceDeleted,
                    pie_id: Some(pie.id.clone()),
                    slice_id: None,
                    payload: json!({ "sliceId": slice.id, "pieId": pie.id, "host": slice.host }),
                },
            )
            .await?;
            sqlx::query("DELETE FROM slices WHERE id = ?")
                .bind(&slice.id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM pies WHERE id = ?")
            .bind(&pie.id)
            .execute(&mut *tx)
            .await?;
        insert_audit(
            &mut tx,
            NewAuditEntry {
                kind: AuditKind::PieDeleted,
                pie_id: None,
                slice_id: None,
                payload: json!({ "pieId": pie.id, "name": pie.name, "slug": pie.slug }),
            },
        )
        .await?;
        tx.commit().await?;

        debug!(slug = %pie.slug, slices = slices.len(), "pie deleted");
        Ok(())
    }

    // ── Slices ─────────────────────────────────────────────────────

    /// Next free ordinal for a pie: `max(ordinal) + 1`, starting at 1.
    pub async fn next_slice_ordinal(&self, pie_id: &str) -> StoreResult<i64> {
        let next: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(ordinal), 0) + 1 FROM slices WHERE pie_id = ?")
                .bind(pie_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(next)
    }

    /// Insert a bare slice row. Fails with `Conflict` on a host or
    /// `(pie_id, ordinal)` collision.
    pub async fn create_slice(&self, new: NewSlice) -> StoreResult<Slice> {
        let mut tx = self.pool.begin().await?;
        let slice = insert_slice(&mut tx, new).await?;
        tx.commit().await?;
        Ok(slice)
    }

    /// Insert a batch of resources for a slice in one transaction. Any
    /// uniqueness violation (`(slice_id, key)`, `allocated_port`,
    /// `route_host`, second primary-http) rolls the whole batch back.
    pub async fn add_slice_resources(
        &self,
        slice_id: &str,
        resources: Vec<NewSliceResource>,
    ) -> StoreResult<Vec<SliceResource>> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_resources(&mut tx, slice_id, resources).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    /// Composite create: slice row, resource batch, and the `slice.created`
    /// audit row in one transaction.
    pub async fn create_slice_with_resources(
        &self,
        new: NewSlice,
        resources: Vec<NewSliceResource>,
    ) -> StoreResult<SliceWithResources> {
        let mut tx = self.pool.begin().await?;
        let slice = insert_slice(&mut tx, new).await?;
        let resources = insert_resources(&mut tx, &slice.id, resources).await?;
        insert_audit(
            &mut tx,
            NewAuditEntry {
                kind: AuditKind::SliceCreated,
                pie_id: Some(slice.pie_id.clone()),
                slice_id: Some(slice.id.clone()),
                payload: json!({
                    "sliceId": slice.id,
                    "pieId": slice.pie_id,
                    "host": slice.host,
                    "ordinal": slice.ordinal,
                }),
            },
        )
        .await?;
        tx.commit().await?;

        debug!(host = %slice.host, resources = resources.len(), "slice created");
        Ok(SliceWithResources { slice, resources })
    }

    /// Set a slice's status. `stopped_at` is set exactly when the status
    /// becomes `stopped`; a stopped slice never leaves that state. Idempotent.
    pub async fn update_slice_status(
        &self,
        slice_id: &str,
        status: SliceStatus,
    ) -> StoreResult<Slice> {
        let mut tx = self.pool.begin().await?;
        let slice = fetch_slice(&mut tx, slice_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Slice '{slice_id}' not found")))?;

        if slice.status != SliceStatus::Stopped && slice.status != status {
            if status == SliceStatus::Stopped {
                mark_slice_stopped(&mut tx, slice_id).await?;
            } else {
                sqlx::query("UPDATE slices SET status = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(slice_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let updated = fetch_slice(&mut tx, slice_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Slice '{slice_id}' not found")))?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Idempotently stop a slice, appending a `slice.stopped` audit row on
    /// the actual transition only.
    pub async fn stop_slice(&self, slice_id: &str) -> StoreResult<Slice> {
        let mut tx = self.pool.begin().await?;
        let slice = fetch_slice(&mut tx, slice_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Slice '{slice_id}' not found")))?;

        if slice.status != SliceStatus::Stopped {
            mark_slice_stopped(&mut tx, slice_id).await?;
            insert_audit(
                &mut tx,
                NewAuditEntry {
                    kind: AuditKind::SliceStopped,
                    pie_id: Some(slice.pie_id.clone()),
                    slice_id: Some(slice.id.clone()),
                    payload: json!({ "sliceId": slice.id, "pieId": slice.pie_id, "host": slice.host }),
                },
            )
            .await?;
        }

        let updated = fetch_slice(&mut tx, slice_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Slice '{slice_id}' not found")))?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Delete a slice (resources cascade) and append its `slice.deleted`
    /// audit row. The audit sets only the pie column so the row survives
    /// the slice cascade.
    pub async fn delete_slice(&self, slice_id: &str) -> StoreResult<Slice> {
        let mut tx = self.pool.begin().await?;
        let slice = fetch_slice(&mut tx, slice_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Slice '{slice_id}' not found")))?;

        insert_audit(
            &mut tx,
            NewAuditEntry {
                kind: AuditKind::SliceDeleted,
                pie_id: Some(slice.pie_id.clone()),
                slice_id: None,
                payload: json!({ "sliceId": slice.id, "pieId": slice.pie_id, "host": slice.host }),
            },
        )
        .await?;
        sqlx::query("DELETE FROM slices WHERE id = ?")
            .bind(slice_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(host = %slice.host, "slice deleted");
        Ok(slice)
    }

    /// Get a slice by id.
    pub async fn get_slice_by_id(&self, slice_id: &str) -> StoreResult<Option<Slice>> {
        let row = sqlx::query(SELECT_SLICE_WHERE_ID)
            .bind(slice_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(slice_from_row).transpose()
    }

    /// Get a slice by its unique hostname.
    pub async fn get_slice_by_host(&self, host: &str) -> StoreResult<Option<Slice>> {
        let row = sqlx::query(
            "SELECT id, pie_id, ordinal, host, status, created_at, stopped_at
             FROM slices WHERE host = ?",
        )
        .bind(host)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(slice_from_row).transpose()
    }

    /// List slices (with their resources) matching the filter.
    pub async fn list_slices(&self, filter: SliceFilter) -> StoreResult<Vec<SliceWithResources>> {
        let rows = match &filter {
            SliceFilter::NonStopped => {
                sqlx::query(
                    "SELECT id, pie_id, ordinal, host, status, created_at, stopped_at
                     FROM slices WHERE status != 'stopped' ORDER BY created_at DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
            SliceFilter::All => {
                sqlx::query(
                    "SELECT id, pie_id, ordinal, host, status, created_at, stopped_at
                     FROM slices ORDER BY created_at DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
            SliceFilter::Pie(pie_id) => {
                sqlx::query(
                    "SELECT id, pie_id, ordinal, host, status, created_at, stopped_at
                     FROM slices WHERE pie_id = ? ORDER BY ordinal ASC",
                )
                .bind(pie_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let slice = slice_from_row(row)?;
            let resources = self.resources_for_slice(&slice.id).await?;
            result.push(SliceWithResources { slice, resources });
        }
        Ok(result)
    }

    /// All resources of a slice, in insertion order.
    pub async fn resources_for_slice(&self, slice_id: &str) -> StoreResult<Vec<SliceResource>> {
        let rows = sqlx::query(
            "SELECT id, slice_id, key, protocol, expose, allocated_port, route_host,
                    is_primary_http, created_at
             FROM slice_resources WHERE slice_id = ? ORDER BY rowid",
        )
        .bind(slice_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(resource_from_row).collect()
    }

    // ── Routes & ports ─────────────────────────────────────────────

    /// Every currently persisted port, ascending. This is the allocator's
    /// reserved set.
    pub async fn allocated_ports(&self) -> StoreResult<Vec<u16>> {
        let ports: Vec<i64> =
            sqlx::query_scalar("SELECT allocated_port FROM slice_resources ORDER BY allocated_port")
                .fetch_all(&self.pool)
                .await?;
        Ok(ports.into_iter().map(|p| p as u16).collect())
    }

    /// Single-row lookup joining a route host to its upstream port and
    /// owning slice. Used by the router proxy on every request.
    pub async fn get_host_route(&self, host: &str) -> StoreResult<Option<HostRoute>> {
        let row = sqlx::query(
            "SELECT r.route_host, r.allocated_port, s.id AS slice_id, s.pie_id, s.status
             FROM slice_resources r
             JOIN slices s ON s.id = r.slice_id
             WHERE r.route_host = ?",
        )
        .bind(host)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let status_raw: String = row.try_get("status")?;
                let slice_status = SliceStatus::parse(&status_raw)
                    .ok_or_else(|| StoreError::Decode(format!("unknown slice status '{status_raw}'")))?;
                Ok(Some(HostRoute {
                    route_host: row.try_get("route_host")?,
                    allocated_port: row.try_get::<i64, _>("allocated_port")? as u16,
                    slice_id: row.try_get("slice_id")?,
                    pie_id: row.try_get("pie_id")?,
                    slice_status,
                }))
            }
            None => Ok(None),
        }
    }

    // ── Audit log ──────────────────────────────────────────────────

    /// Append a standalone audit row.
    pub async fn append_audit_log(&self, entry: NewAuditEntry) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_audit(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Read audit rows in append order. Consumed by dashboards and tests;
    /// the core never interprets payloads.
    pub async fn list_audit_log(&self) -> StoreResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, pie_id, slice_id, kind, payload, created_at FROM audit_log ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(audit_from_row).collect()
    }

    // ── Status snapshot ────────────────────────────────────────────

    /// Aggregate counts for `GET /v1/status`, read in one transaction.
    pub async fn status_snapshot(&self) -> StoreResult<StatusSnapshot> {
        let mut tx = self.pool.begin().await?;

        let pies: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pies")
            .fetch_one(&mut *tx)
            .await?;

        let mut by_status = SliceStatusCounts::default();
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM slices GROUP BY status")
            .fetch_all(&mut *tx)
            .await?;
        for row in &rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            match SliceStatus::parse(&status) {
                Some(SliceStatus::Creating) => by_status.creating = n,
                Some(SliceStatus::Running) => by_status.running = n,
                Some(SliceStatus::Stopped) => by_status.stopped = n,
                Some(SliceStatus::Error) => by_status.error = n,
                None => return Err(StoreError::Decode(format!("unknown slice status '{status}'"))),
            }
        }

        let rows = sqlx::query(
            "SELECT p.id, p.name, p.slug,
                    COUNT(s.id) AS total,
                    COALESCE(SUM(CASE WHEN s.status = 'running' THEN 1 ELSE 0 END), 0) AS running
             FROM pies p
             LEFT JOIN slices s ON s.pie_id = p.id
             GROUP BY p.id
             ORDER BY p.created_at DESC",
        )
        .fetch_all(&mut *tx)
        .await?;
        let by_pie = rows
            .iter()
            .map(|row| {
                Ok(PieSliceCounts {
                    pie_id: row.try_get("id")?,
                    pie_name: row.try_get("name")?,
                    pie_slug: row.try_get("slug")?,
                    total: row.try_get("total")?,
                    running: row.try_get("running")?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        tx.commit().await?;
        Ok(StatusSnapshot { pies, by_status, by_pie })
    }
}

const SELECT_SLICE_WHERE_ID: &str =
    "SELECT id, pie_id, ordinal, host, status, created_at, stopped_at FROM slices WHERE id = ?";

// ── Row mapping ────────────────────────────────────────────────────

fn pie_from_row(row: &SqliteRow) -> StoreResult<Pie> {
    Ok(Pie {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        created_at: row.try_get("created_at")?,
    })
}

fn slice_from_row(row: &SqliteRow) -> StoreResult<Slice> {
    let status_raw: String = row.try_get("status")?;
    let status = SliceStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown slice status '{status_raw}'")))?;
    Ok(Slice {
        id: row.try_get("id")?,
        pie_id: row.try_get("pie_id")?,
        ordinal: row.try_get("ordinal")?,
        host: row.try_get("host")?,
        status,
        created_at: row.try_get("created_at")?,
        stopped_at: row.try_get("stopped_at")?,
    })
}

fn resource_from_row(row: &SqliteRow) -> StoreResult<SliceResource> {
    let protocol_raw: String = row.try_get("protocol")?;
    let protocol = Protocol::parse(&protocol_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown protocol '{protocol_raw}'")))?;
    let expose_raw: String = row.try_get("expose")?;
    let expose = Expose::parse(&expose_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown expose mode '{expose_raw}'")))?;
    Ok(SliceResource {
        id: row.try_get("id")?,
        slice_id: row.try_get("slice_id")?,
        key: row.try_get("key")?,
        protocol,
        expose,
        allocated_port: row.try_get::<i64, _>("allocated_port")? as u16,
        route_host: row.try_get("route_host")?,
        is_primary_http: row.try_get("is_primary_http")?,
        created_at: row.try_get("created_at")?,
    })
}

fn audit_from_row(row: &SqliteRow) -> StoreResult<AuditEntry> {
    let payload_raw: String = row.try_get("payload")?;
    let payload = serde_json::from_str(&payload_raw)
        .map_err(|e| StoreError::Decode(format!("audit payload: {e}")))?;
    Ok(AuditEntry {
        id: row.try_get("id")?,
        pie_id: row.try_get("pie_id")?,
        slice_id: row.try_get("slice_id")?,
        kind: row.try_get("kind")?,
        payload,
        created_at: row.try_get("created_at")?,
    })
}

// ── Transaction helpers ────────────────────────────────────────────

async fn fetch_pie(conn: &mut SqliteConnection, identifier: &str) -> StoreResult<Option<Pie>> {
    let row = sqlx::query("SELECT id, name, slug, created_at FROM pies WHERE id = ?1 OR slug = ?1")
        .bind(identifier)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(pie_from_row).transpose()
}

async fn fetch_slice(conn: &mut SqliteConnection, slice_id: &str) -> StoreResult<Option<Slice>> {
    let row = sqlx::query(SELECT_SLICE_WHERE_ID)
        .bind(slice_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(slice_from_row).transpose()
}

async fn fetch_slices_for_pie(conn: &mut SqliteConnection, pie_id: &str) -> StoreResult<Vec<Slice>> {
    let rows = sqlx::query(
        "SELECT id, pie_id, ordinal, host, status, created_at, stopped_at
         FROM slices WHERE pie_id = ? ORDER BY ordinal ASC",
    )
    .bind(pie_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(slice_from_row).collect()
}

async fn mark_slice_stopped(conn: &mut SqliteConnection, slice_id: &str) -> StoreResult<()> {
    sqlx::query("UPDATE slices SET status = 'stopped', stopped_at = ? WHERE id = ? AND status != 'stopped'")
        .bind(Utc::now())
        .bind(slice_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_slice(conn: &mut SqliteConnection, new: NewSlice) -> StoreResult<Slice> {
    let slice = Slice {
        id: Uuid::new_v4().to_string(),
        pie_id: new.pie_id,
        ordinal: new.ordinal,
        host: new.host,
        status: new.status,
        created_at: Utc::now(),
        stopped_at: None,
    };
    sqlx::query(
        "INSERT INTO slices (id, pie_id, ordinal, host, status, created_at, stopped_at)
         VALUES (?, ?, ?, ?, ?, ?, NULL)",
    )
    .bind(&slice.id)
    .bind(&slice.pie_id)
    .bind(slice.ordinal)
    .bind(&slice.host)
    .bind(slice.status.as_str())
    .bind(slice.created_at)
    .execute(&mut *conn)
    .await
    .map_err(map_db_err)?;
    Ok(slice)
}

async fn insert_resources(
    conn: &mut SqliteConnection,
    slice_id: &str,
    resources: Vec<NewSliceResource>,
) -> StoreResult<Vec<SliceResource>> {
    let mut inserted = Vec::with_capacity(resources.len());
    for new in resources {
        let resource = SliceResource {
            id: Uuid::new_v4().to_string(),
            slice_id: slice_id.to_string(),
            is_primary_http: new.is_primary_http(),
            key: new.key,
            protocol: new.protocol,
            expose: new.expose,
            allocated_port: new.allocated_port,
            route_host: new.route_host,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO slice_resources
                 (id, slice_id, key, protocol, expose, allocated_port, route_host,
                  is_primary_http, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&resource.id)
        .bind(&resource.slice_id)
        .bind(&resource.key)
        .bind(resource.protocol.as_str())
        .bind(resource.expose.as_str())
        .bind(resource.allocated_port as i64)
        .bind(&resource.route_host)
        .bind(resource.is_primary_http)
        .bind(resource.created_at)
        .execute(&mut *conn)
        .await
        .map_err(map_db_err)?;
        inserted.push(resource);
    }
    Ok(inserted)
}

async fn insert_audit(conn: &mut SqliteConnection, entry: NewAuditEntry) -> StoreResult<()> {
    let payload = serde_json::to_string(&entry.payload)
        .map_err(|e| StoreError::Decode(format!("audit payload: {e}")))?;
    sqlx::query(
        "INSERT INTO audit_log (id, pie_id, slice_id, kind, payload, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&entry.pie_id)
    .bind(&entry.slice_id)
    .bind(entry.kind.as_str())
    .bind(payload)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}
