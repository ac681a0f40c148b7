//! Viewer-side sync: a cached snapshot rebuilt from the stores whenever the
//! notifier signals a change.

mod client;
mod snapshot;

pub use client::SyncClient;
pub use snapshot::{ReportView, SyncSnapshot, SyncSource};
