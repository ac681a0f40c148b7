use std::sync::Arc;

use super::{StoreContext, run_to_completion};
use crate::error::{Result, StoreError};
use crate::model::{self, Actor, Report, ReportDraft, ReportId};
use crate::notify::Topic;

/// Durable record of active reports.
#[derive(Debug, Clone)]
pub struct ReportStore {
    ctx: Arc<StoreContext>,
}

impl ReportStore {
    pub(crate) const fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }

    /// Validate `draft` and store it as a new pending report owned by `actor`.
    ///
    /// Any role may submit.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidInput`] for a blank title/description, a
    ///   malformed attachment URI or an anonymous actor
    /// - [`StoreError::StoreUnavailable`] if the backend cannot be reached
    pub async fn submit(&self, actor: &Actor, draft: ReportDraft) -> Result<ReportId> {
        if actor.id.trim().is_empty() {
            return Err(StoreError::invalid("submitter", "must not be empty"));
        }
        let report = draft.into_report(ReportId::generate(), actor.id.trim(), model::now())?;

        let ctx = Arc::clone(&self.ctx);
        run_to_completion("submit", async move {
            ctx.bounded("insert report", ctx.backend.insert_report(&report))
                .await?;
            tracing::info!(report = %report.id, submitter = %report.submitter, "report submitted");
            ctx.notifier.publish(Topic::Reports);
            Ok(report.id)
        })
        .await
    }

    /// Every active report, newest first.
    ///
    /// The cached `status` fields are returned as stored; use the
    /// [`Reconciler`](crate::reconcile::Reconciler) for the effective status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreUnavailable`] if the backend cannot be reached.
    pub async fn get_active(&self) -> Result<Vec<Report>> {
        self.ctx
            .bounded("list reports", self.ctx.backend.list_reports())
            .await
    }

    /// One active report.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `id` is not active.
    pub async fn get(&self, id: &ReportId) -> Result<Report> {
        self.ctx
            .bounded("get report", self.ctx.backend.get_report(id))
            .await?
            .ok_or_else(|| StoreError::report_not_found(id))
    }

    /// Delete an active report without archiving it. Its history is kept.
    ///
    /// # Errors
    ///
    /// - [`StoreError::PermissionDenied`] unless `actor` is an official
    /// - [`StoreError::NotFound`] if `id` is not active
    pub async fn remove(&self, actor: &Actor, id: &ReportId) -> Result<()> {
        actor.require_official("remove reports")?;

        let ctx = Arc::clone(&self.ctx);
        let id = id.clone();
        let actor = actor.id.clone();
        run_to_completion("remove", async move {
            let removed = ctx
                .bounded("delete report", ctx.backend.delete_report(&id))
                .await?;
            if !removed {
                return Err(StoreError::report_not_found(&id));
            }
            tracing::info!(report = %id, %actor, "report removed");
            ctx.notifier.publish(Topic::Reports);
            Ok(())
        })
        .await
    }
}
