//! SQLite-backed [`Backend`].
//!
//! Runtime defaults follow the projection database conventions:
//! - `journal_mode = WAL` so readers do not block the appender
//! - `busy_timeout = 5s` to ride out transient lock contention
//! - `foreign_keys = ON`
//!
//! The connection is synchronous; every call hops onto the blocking pool via
//! `spawn_blocking`, so a slow disk never stalls the async runtime.

pub mod migrations;
pub mod schema;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter};

use super::{Backend, IngestOutcome};
use crate::error::{Result, StoreError};
use crate::model::{
    ArchiveId, ArchiveRecord, EventId, NewStatusEvent, Report, ReportId, Status, StatusEvent,
};

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on bound parameters per batched `IN (...)` query.
const BATCH_CHUNK: usize = 500;

const REPORT_COLUMNS: &str = "report_id, title, description, attachments_json, location, \
     submitter, created_at_us, status, official_response, status_sequence, restored_from";

const EVENT_COLUMNS: &str =
    "sequence, event_id, report_id, status, official_response, updated_by, location, updated_at_us";

const ARCHIVE_COLUMNS: &str = "archive_id, report_id, title, description, status, \
     attachments_json, official_response, location, submitter, created_at_us, archived_at_us";

/// Backend persisting to a single SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open (or create) the database, apply pragmas and migrate the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if opening/configuring/migrating the database fails.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create database directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("open database {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database. Mostly useful in tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory().context("open in-memory database")?)
    }

    fn from_connection(mut conn: Connection) -> anyhow::Result<Self> {
        configure_connection(&conn).context("configure sqlite pragmas")?;
        let version = migrations::migrate(&mut conn).context("apply store migrations")?;
        tracing::debug!(schema_version = version, "sqlite store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::unavailable("sqlite connection lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|err| StoreError::Internal(format!("sqlite task failed: {err}")))?
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

fn conversion_error(idx: usize, ty: Type, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let us: i64 = row.get(idx)?;
    DateTime::<Utc>::from_timestamp_micros(us).ok_or_else(|| {
        conversion_error(
            idx,
            Type::Integer,
            StoreError::invalid("timestamp", format!("{us} is out of range")),
        )
    })
}

fn status_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Status> {
    let raw: String = row.get(idx)?;
    raw.parse::<Status>()
        .map_err(|err| conversion_error(idx, Type::Text, err))
}

fn attachments_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|err| conversion_error(idx, Type::Text, err))
}

fn sequence_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|err| conversion_error(idx, Type::Integer, err))
}

fn to_sql_sequence(sequence: u64) -> Result<i64> {
    i64::try_from(sequence)
        .map_err(|_| StoreError::invalid("sequence", format!("{sequence} exceeds storage range")))
}

fn encode_attachments(attachments: &[String]) -> Result<String> {
    serde_json::to_string(attachments)
        .map_err(|err| StoreError::Internal(format!("encode attachments: {err}")))
}

fn row_to_report(row: &Row<'_>) -> rusqlite::Result<Report> {
    Ok(Report {
        id: ReportId::new_unchecked(row.get::<_, String>(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        attachments: attachments_at(row, 3)?,
        location: row.get(4)?,
        submitter: row.get(5)?,
        created_at: time_at(row, 6)?,
        status: status_at(row, 7)?,
        official_response: row.get(8)?,
        status_sequence: sequence_at(row, 9)?,
        restored_from: row.get::<_, Option<String>>(10)?.map(ReportId::new_unchecked),
    })
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<StatusEvent> {
    Ok(StatusEvent {
        sequence: sequence_at(row, 0)?,
        id: EventId::new_unchecked(row.get::<_, String>(1)?),
        report_id: ReportId::new_unchecked(row.get::<_, String>(2)?),
        status: status_at(row, 3)?,
        official_response: row.get(4)?,
        updated_by: row.get(5)?,
        location: row.get(6)?,
        updated_at: time_at(row, 7)?,
    })
}

fn row_to_archive(row: &Row<'_>) -> rusqlite::Result<ArchiveRecord> {
    Ok(ArchiveRecord {
        id: ArchiveId::new_unchecked(row.get::<_, String>(0)?),
        report_id: ReportId::new_unchecked(row.get::<_, String>(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        status: status_at(row, 4)?,
        attachments: attachments_at(row, 5)?,
        official_response: row.get(6)?,
        location: row.get(7)?,
        submitter: row.get(8)?,
        created_at: time_at(row, 9)?,
        archived_at: time_at(row, 10)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn report_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM reports WHERE report_id = ?1)",
        [id],
        |row| row.get(0),
    )
}

fn insert_event_row(conn: &Connection, event: &StatusEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO status_events (sequence, event_id, report_id, status, official_response, \
         updated_by, location, updated_at_us) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            to_sql_sequence(event.sequence)?,
            event.id.as_str(),
            event.report_id.as_str(),
            event.status.as_str(),
            event.official_response,
            event.updated_by,
            event.location,
            micros(event.updated_at),
        ],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Backend impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Backend for SqliteBackend {
    async fn insert_report(&self, report: &Report) -> Result<()> {
        let report = report.clone();
        let attachments = encode_attachments(&report.attachments)?;
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT INTO reports ({REPORT_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    report.id.as_str(),
                    report.title,
                    report.description,
                    attachments,
                    report.location,
                    report.submitter,
                    micros(report.created_at),
                    report.status.as_str(),
                    report.official_response,
                    to_sql_sequence(report.status_sequence)?,
                    report.restored_from.as_ref().map(ReportId::as_str),
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(err) if is_constraint_violation(&err) => Err(StoreError::invalid(
                    "report",
                    format!("{} rejected by store constraints: {err}", report.id),
                )),
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    async fn get_report(&self, id: &ReportId) -> Result<Option<Report>> {
        let id = id.clone();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {REPORT_COLUMNS} FROM reports WHERE report_id = ?1"),
                    [id.as_str()],
                    row_to_report,
                )
                .optional()?)
        })
        .await
    }

    async fn list_reports(&self) -> Result<Vec<Report>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REPORT_COLUMNS} FROM reports ORDER BY created_at_us DESC, report_id ASC"
            ))?;
            let rows = stmt.query_map([], row_to_report)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn delete_report(&self, id: &ReportId) -> Result<bool> {
        let id = id.clone();
        self.with_conn(move |conn| {
            Ok(conn.execute("DELETE FROM reports WHERE report_id = ?1", [id.as_str()])? > 0)
        })
        .await
    }

    async fn refresh_cached_status(&self, event: &StatusEvent) -> Result<bool> {
        let event = event.clone();
        self.with_conn(move |conn| {
            let sequence = to_sql_sequence(event.sequence)?;
            let changed = conn.execute(
                "UPDATE reports SET status = ?1, official_response = ?2, status_sequence = ?3 \
                 WHERE report_id = ?4 AND status_sequence < ?3",
                params![
                    event.status.as_str(),
                    event.official_response,
                    sequence,
                    event.report_id.as_str(),
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn append_event(&self, event: NewStatusEvent) -> Result<StatusEvent> {
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if !report_exists(&tx, event.report_id.as_str())? {
                return Err(StoreError::report_not_found(&event.report_id));
            }

            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(sequence), 0) + 1 FROM status_events",
                [],
                |row| row.get(0),
            )?;
            let sequence = u64::try_from(next)
                .map_err(|_| StoreError::Internal(format!("negative sequence {next}")))?;

            let event = event.assign(EventId::generate(), sequence);
            insert_event_row(&tx, &event)?;
            tx.commit()?;
            Ok(event)
        })
        .await
    }

    async fn ingest_event(&self, event: &StatusEvent) -> Result<IngestOutcome> {
        let event = event.clone().at_store_precision();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if !report_exists(&tx, event.report_id.as_str())? {
                return Err(StoreError::report_not_found(&event.report_id));
            }

            let existing = tx
                .query_row(
                    &format!("SELECT {EVENT_COLUMNS} FROM status_events WHERE sequence = ?1"),
                    [to_sql_sequence(event.sequence)?],
                    row_to_event,
                )
                .optional()?;
            if let Some(existing) = existing {
                return if existing == event {
                    Ok(IngestOutcome::Duplicate)
                } else {
                    Err(StoreError::invalid(
                        "sequence",
                        format!("{} is already taken by another event", event.sequence),
                    ))
                };
            }

            let id_taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM status_events WHERE event_id = ?1)",
                [event.id.as_str()],
                |row| row.get(0),
            )?;
            if id_taken {
                return Err(StoreError::invalid(
                    "event id",
                    format!("{} already exists with a different sequence", event.id),
                ));
            }

            insert_event_row(&tx, &event)?;
            tx.commit()?;
            Ok(IngestOutcome::Inserted)
        })
        .await
    }

    async fn events_for(&self, id: &ReportId) -> Result<Vec<StatusEvent>> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM status_events WHERE report_id = ?1 ORDER BY sequence ASC"
            ))?;
            let rows = stmt.query_map([id.as_str()], row_to_event)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn latest_event(&self, id: &ReportId) -> Result<Option<StatusEvent>> {
        let id = id.clone();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {EVENT_COLUMNS} FROM status_events WHERE report_id = ?1 \
                         ORDER BY sequence DESC LIMIT 1"
                    ),
                    [id.as_str()],
                    row_to_event,
                )
                .optional()?)
        })
        .await
    }

    async fn latest_events(&self, ids: &[ReportId]) -> Result<HashMap<ReportId, StatusEvent>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        self.with_conn(move |conn| {
            let mut latest = HashMap::with_capacity(ids.len());
            for chunk in ids.chunks(BATCH_CHUNK) {
                let placeholders = vec!["?"; chunk.len()].join(", ");
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM status_events WHERE sequence IN ( \
                         SELECT MAX(sequence) FROM status_events \
                         WHERE report_id IN ({placeholders}) GROUP BY report_id)"
                ))?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), row_to_event)?;
                for event in rows {
                    let event = event?;
                    latest.insert(event.report_id.clone(), event);
                }
            }
            Ok(latest)
        })
        .await
    }

    async fn insert_archive(&self, record: &ArchiveRecord) -> Result<()> {
        let record = record.clone();
        let attachments = encode_attachments(&record.attachments)?;
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT INTO archive ({ARCHIVE_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    record.id.as_str(),
                    record.report_id.as_str(),
                    record.title,
                    record.description,
                    record.status.as_str(),
                    attachments,
                    record.official_response,
                    record.location,
                    record.submitter,
                    micros(record.created_at),
                    micros(record.archived_at),
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(err) if is_constraint_violation(&err) => Err(StoreError::invalid(
                    "archive record",
                    format!("{} rejected by store constraints: {err}", record.id),
                )),
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    async fn get_archive(&self, id: &ArchiveId) -> Result<Option<ArchiveRecord>> {
        let id = id.clone();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {ARCHIVE_COLUMNS} FROM archive WHERE archive_id = ?1"),
                    [id.as_str()],
                    row_to_archive,
                )
                .optional()?)
        })
        .await
    }

    async fn list_archives(&self) -> Result<Vec<ArchiveRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ARCHIVE_COLUMNS} FROM archive ORDER BY archived_at_us DESC, archive_id ASC"
            ))?;
            let rows = stmt.query_map([], row_to_archive)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn delete_archive(&self, id: &ArchiveId) -> Result<bool> {
        let id = id.clone();
        self.with_conn(move |conn| {
            Ok(conn.execute("DELETE FROM archive WHERE archive_id = ?1", [id.as_str()])? > 0)
        })
        .await
    }
}
