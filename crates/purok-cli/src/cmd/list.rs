//! `purok list` and `purok archived`.

use std::io::{self, Write};

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use purok_core::reconcile::{ReconciledStatus, StatusSource};
use purok_core::{ArchiveRecord, Report, ReportId, Status, Tracker};
use serde::Serialize;

use super::CmdContext;
use crate::output::{Renderable, local_time, pretty_kv, pretty_rule, render_list};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show reports with this status (pending, in progress, resolved).
    #[arg(short, long)]
    pub status: Option<Status>,

    /// Only show reports filed by this submitter.
    #[arg(long)]
    pub submitter: Option<String>,

    /// Maximum reports to show.
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct ArchivedArgs {
    /// Maximum records to show.
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: usize,
}

/// An active report as shown to operators, with its reconciled status.
#[derive(Debug, Serialize)]
pub struct ReportRow {
    pub id: ReportId,
    pub title: String,
    pub description: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub official_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub attachments: Vec<String>,
    pub submitter: String,
    pub created_at: DateTime<Utc>,
    /// Log sequence the status came from; absent when it fell back to the cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_from: Option<ReportId>,
}

impl ReportRow {
    fn build(report: Report, status: Status, response: Option<String>, sequence: Option<u64>) -> Self {
        Self {
            id: report.id,
            title: report.title,
            description: report.description,
            status,
            official_response: response,
            location: report.location,
            attachments: report.attachments,
            submitter: report.submitter,
            created_at: report.created_at,
            sequence,
            restored_from: report.restored_from,
        }
    }

    fn reconciled(report: Report, reconciled: ReconciledStatus) -> Self {
        let sequence = match reconciled.source {
            StatusSource::Log { sequence } => Some(sequence),
            StatusSource::Cache => None,
        };
        Self::build(report, reconciled.status, reconciled.official_response, sequence)
    }

    /// Reconcile one report against its log.
    pub async fn from_report(tracker: &Tracker, report: Report) -> Self {
        let reconciled = tracker.reconciler().reconcile(&report).await;
        Self::reconciled(report, reconciled)
    }
}

impl Renderable for ReportRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}  [{}]  {}", self.id, self.status.label(), self.title)?;
        if let Some(ref location) = self.location {
            pretty_kv(w, "  Location", location)?;
        }
        if let Some(ref response) = self.official_response {
            pretty_kv(w, "  Response", response)?;
        }
        pretty_kv(w, "  Filed", format!("{} by {}", local_time(self.created_at), self.submitter))?;
        pretty_rule(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            self.id,
            self.status.as_str(),
            self.location.as_deref().unwrap_or("-"),
            self.title
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "status", "location", "title"]
    }
}

/// Newtype so archive records render through [`Renderable`].
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ArchivedRow(pub ArchiveRecord);

impl Renderable for ArchivedRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let record = &self.0;
        writeln!(w, "{}  [{}]  {}", record.id, record.status.label(), record.title)?;
        pretty_kv(w, "  Report", record.report_id.as_str())?;
        pretty_kv(w, "  Location", record.location.as_deref().unwrap_or("-"))?;
        pretty_kv(w, "  Archived", local_time(record.archived_at))?;
        pretty_rule(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let record = &self.0;
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            record.id,
            record.report_id,
            record.status.as_str(),
            record.title
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "report", "status", "title"]
    }
}

/// Execute `purok list`. Statuses come from one batched log read.
pub async fn run_list(args: &ListArgs, ctx: &CmdContext) -> Result<()> {
    let tracker = ctx.open_tracker()?;
    let reports = tracker.reports().get_active().await?;
    let mut reconciled = tracker.reconciler().reconcile_all(&reports).await;

    let rows: Vec<ReportRow> = reports
        .into_iter()
        .filter(|report| {
            args.submitter
                .as_deref()
                .is_none_or(|submitter| report.submitter == submitter)
        })
        .filter_map(|report| {
            let status = reconciled.remove(&report.id)?;
            Some(ReportRow::reconciled(report, status))
        })
        .filter(|row| args.status.is_none_or(|wanted| row.status == wanted))
        .take(args.limit)
        .collect();

    tracing::debug!(count = rows.len(), "listing active reports");
    render_list(&rows, ctx.output)
}

/// Execute `purok archived`.
pub async fn run_archived(args: &ArchivedArgs, ctx: &CmdContext) -> Result<()> {
    let tracker = ctx.open_tracker()?;
    let rows: Vec<ArchivedRow> = tracker
        .archive()
        .list()
        .await?
        .into_iter()
        .take(args.limit)
        .map(ArchivedRow)
        .collect();
    render_list(&rows, ctx.output)
}
