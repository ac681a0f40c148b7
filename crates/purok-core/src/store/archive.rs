//! Archive store: moves reports in and out of cold storage.
//!
//! Archival and restoration each touch two tables without a shared
//! transaction, so both follow the same shape:
//!
//! 1. write the new record (snapshot or restored report)
//! 2. delete the old one, retrying transient failures
//! 3. if step 2 fails or finds nothing to delete, delete the record from
//!    step 1 again
//!
//! Only when step 3 also fails does the caller see
//! [`StoreError::PartialFailure`], and `purok verify` will report the overlap.

use std::sync::Arc;

use super::{StoreContext, run_to_completion};
use crate::error::{Entity, Result, StoreError};
use crate::model::{self, Actor, ArchiveId, ArchiveRecord, Report, ReportId};
use crate::notify::Topic;
use crate::reconcile::Reconciler;

#[derive(Debug, Clone)]
pub struct ArchiveStore {
    ctx: Arc<StoreContext>,
    reconciler: Reconciler,
}

impl ArchiveStore {
    pub(crate) const fn new(ctx: Arc<StoreContext>, reconciler: Reconciler) -> Self {
        Self { ctx, reconciler }
    }

    /// Snapshot an active report into the archive and remove it from the
    /// active set. The snapshot records the reconciled status.
    ///
    /// # Errors
    ///
    /// - [`StoreError::PermissionDenied`] unless `actor` is an official
    /// - [`StoreError::NotFound`] if the report is not active, including when
    ///   a concurrent archive removed it first
    /// - [`StoreError::StoreUnavailable`] if a step failed and was undone
    /// - [`StoreError::PartialFailure`] if undoing the snapshot also failed
    pub async fn archive(&self, actor: &Actor, report_id: &ReportId) -> Result<ArchiveRecord> {
        actor.require_official("archive reports")?;

        let ctx = Arc::clone(&self.ctx);
        let reconciler = self.reconciler.clone();
        let report_id = report_id.clone();
        let actor = actor.id.clone();
        run_to_completion("archive", async move {
            let report = ctx
                .bounded("get report", ctx.backend.get_report(&report_id))
                .await?
                .ok_or_else(|| StoreError::report_not_found(&report_id))?;
            let reconciled = reconciler.reconcile(&report).await;
            let record = ArchiveRecord::snapshot(
                &report,
                reconciled.status,
                reconciled.official_response,
                model::now(),
            );

            ctx.bounded("insert archive", ctx.backend.insert_archive(&record))
                .await?;

            let removed = ctx
                .bounded_retry("delete report", || ctx.backend.delete_report(&report.id))
                .await;
            let failure = match removed {
                Ok(true) => None,
                Ok(false) => Some(StoreError::report_not_found(&report.id)),
                Err(err) => Some(err),
            };
            if let Some(err) = failure {
                tracing::warn!(report = %report.id, archive = %record.id, error = %err, "archive step failed, dropping snapshot");
                let undone = ctx
                    .bounded_retry("delete archive", || ctx.backend.delete_archive(&record.id))
                    .await;
                return Err(compensated("archive", err, undone, || {
                    format!("report {} and archive record {} may both be live", report.id, record.id)
                }));
            }

            tracing::info!(report = %report.id, archive = %record.id, status = %record.status, %actor, "report archived");
            ctx.notifier.publish(Topic::Reports);
            ctx.notifier.publish(Topic::Archive);
            Ok(record)
        })
        .await
    }

    /// Bring an archived report back as a brand-new pending report.
    ///
    /// The restored report gets a fresh id; `restored_from` points at the
    /// archived report id. History recorded under the old id stays there.
    ///
    /// # Errors
    ///
    /// - [`StoreError::PermissionDenied`] unless `actor` is an official
    /// - [`StoreError::NotFound`] if the archive record does not exist,
    ///   including when a concurrent restore consumed it first
    /// - [`StoreError::StoreUnavailable`] if a step failed and was undone
    /// - [`StoreError::PartialFailure`] if undoing the new report also failed
    pub async fn restore(&self, actor: &Actor, archive_id: &ArchiveId) -> Result<Report> {
        actor.require_official("restore reports")?;

        let ctx = Arc::clone(&self.ctx);
        let archive_id = archive_id.clone();
        let actor = actor.id.clone();
        run_to_completion("restore", async move {
            let record = ctx
                .bounded("get archive", ctx.backend.get_archive(&archive_id))
                .await?
                .ok_or_else(|| archive_not_found(&archive_id))?;
            let report = record.to_restored_report(model::now());

            ctx.bounded("insert report", ctx.backend.insert_report(&report))
                .await?;

            let removed = ctx
                .bounded_retry("delete archive", || ctx.backend.delete_archive(&record.id))
                .await;
            let failure = match removed {
                Ok(true) => None,
                Ok(false) => Some(archive_not_found(&record.id)),
                Err(err) => Some(err),
            };
            if let Some(err) = failure {
                tracing::warn!(archive = %record.id, report = %report.id, error = %err, "restore step failed, dropping restored report");
                let undone = ctx
                    .bounded_retry("delete report", || ctx.backend.delete_report(&report.id))
                    .await;
                return Err(compensated("restore", err, undone, || {
                    format!("archive record {} and report {} may both be live", record.id, report.id)
                }));
            }

            tracing::info!(archive = %record.id, report = %report.id, restored_from = %record.report_id, %actor, "report restored");
            ctx.notifier.publish(Topic::Reports);
            ctx.notifier.publish(Topic::Archive);
            Ok(report)
        })
        .await
    }

    /// Every archive record, most recently archived first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreUnavailable`] if the backend cannot be reached.
    pub async fn list(&self) -> Result<Vec<ArchiveRecord>> {
        self.ctx
            .bounded("list archives", self.ctx.backend.list_archives())
            .await
    }

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record does not exist.
    pub async fn get(&self, id: &ArchiveId) -> Result<ArchiveRecord> {
        self.ctx
            .bounded("get archive", self.ctx.backend.get_archive(id))
            .await?
            .ok_or_else(|| archive_not_found(id))
    }
}

fn archive_not_found(id: &ArchiveId) -> StoreError {
    StoreError::NotFound {
        entity: Entity::Archive,
        id: id.to_string(),
    }
}

/// Pick the error to surface after a compensation attempt.
fn compensated(
    operation: &'static str,
    original: StoreError,
    undone: Result<bool>,
    detail: impl FnOnce() -> String,
) -> StoreError {
    match undone {
        Ok(_) => original,
        Err(undo_err) => {
            let detail = format!("{}; step failed: {original}; undo failed: {undo_err}", detail());
            tracing::error!(operation, %detail, "compensation failed");
            StoreError::PartialFailure { operation, detail }
        }
    }
}
