//! purok-core library.
//!
//! Citizen issue reports move through `pending -> in progress -> resolved`
//! via an append-only status log, can be archived and restored, and every
//! mutation signals connected viewers so they resync.
//!
//! # Conventions
//!
//! - **Errors**: store operations return [`error::Result`] with a
//!   [`error::StoreError`]; config loading and opening a project use
//!   `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).
//! - **Status**: read it through [`reconcile::Reconciler`], never from the
//!   cached fields on [`model::Report`].

pub mod backend;
pub mod config;
pub mod error;
pub mod model;
pub mod notify;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod sync;
pub mod tracker;
pub mod verify;

pub use error::{ErrorCode, Result, StoreError};
pub use model::{
    Actor, AppendRequest, ArchiveId, ArchiveRecord, AttachmentInput, EventId, Report,
    ReportDraft, ReportId, Role, Status, StatusEvent,
};
pub use notify::{Notifier, Subscription, Topic};
pub use session::Session;
pub use sync::{SyncClient, SyncSnapshot};
pub use tracker::Tracker;
