//! Canonical SQLite schema for purok.
//!
//! - `reports` holds the active set plus the cached status fields
//! - `status_events` is the append-only log; triggers refuse UPDATE/DELETE
//! - `archive` holds snapshots of archived reports
//! - `store_meta` tracks the schema version alongside `PRAGMA user_version`
//!
//! `status_events.report_id` deliberately has no foreign key: history must
//! outlive the report it belongs to.

/// Migration v1: reports, append-only status log, archive.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS reports (
    report_id TEXT PRIMARY KEY,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    description TEXT NOT NULL CHECK (length(trim(description)) > 0),
    attachments_json TEXT NOT NULL DEFAULT '[]',
    location TEXT,
    submitter TEXT NOT NULL,
    created_at_us INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'in_progress', 'resolved')),
    official_response TEXT,
    status_sequence INTEGER NOT NULL DEFAULT 0,
    restored_from TEXT,
    CHECK (report_id LIKE 'rp-%')
);

CREATE TABLE IF NOT EXISTS status_events (
    sequence INTEGER PRIMARY KEY,
    event_id TEXT NOT NULL UNIQUE,
    report_id TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('pending', 'in_progress', 'resolved')),
    official_response TEXT,
    updated_by TEXT,
    location TEXT,
    updated_at_us INTEGER NOT NULL,
    CHECK (sequence > 0)
);

CREATE TRIGGER IF NOT EXISTS status_events_no_update
BEFORE UPDATE ON status_events
BEGIN
    SELECT RAISE(ABORT, 'status_events is append-only');
END;

CREATE TRIGGER IF NOT EXISTS status_events_no_delete
BEFORE DELETE ON status_events
BEGIN
    SELECT RAISE(ABORT, 'status_events is append-only');
END;

CREATE TABLE IF NOT EXISTS archive (
    archive_id TEXT PRIMARY KEY,
    report_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('pending', 'in_progress', 'resolved')),
    attachments_json TEXT NOT NULL DEFAULT '[]',
    official_response TEXT,
    location TEXT,
    submitter TEXT NOT NULL,
    created_at_us INTEGER NOT NULL,
    archived_at_us INTEGER NOT NULL,
    CHECK (archive_id LIKE 'ar-%')
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 0);

CREATE INDEX IF NOT EXISTS idx_reports_created ON reports(created_at_us DESC, report_id);
CREATE INDEX IF NOT EXISTS idx_reports_submitter ON reports(submitter);
CREATE INDEX IF NOT EXISTS idx_status_events_report ON status_events(report_id, sequence DESC);
CREATE INDEX IF NOT EXISTS idx_archive_archived ON archive(archived_at_us DESC, archive_id);
CREATE INDEX IF NOT EXISTS idx_archive_report ON archive(report_id);
";

/// Indexes every migrated database must have.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_reports_created",
    "idx_reports_submitter",
    "idx_status_events_report",
    "idx_archive_archived",
    "idx_archive_report",
];
