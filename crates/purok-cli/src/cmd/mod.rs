pub mod archive;
pub mod completions;
pub mod history;
pub mod init;
pub mod list;
pub mod respond;
pub mod status;
pub mod submit;
pub mod verify;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::Result;
use purok_core::config::{DATABASE_ENV, PUROK_DIR};
use purok_core::{Role, Session, Tracker};

use crate::actor;
use crate::output::OutputMode;

/// Everything a command needs from the command line besides its own args.
#[derive(Debug)]
pub struct CmdContext {
    project_root: PathBuf,
    pub output: OutputMode,
    actor: Option<String>,
    role: Option<Role>,
}

impl CmdContext {
    pub const fn new(
        project_root: PathBuf,
        output: OutputMode,
        actor: Option<String>,
        role: Option<Role>,
    ) -> Self {
        Self {
            project_root,
            output,
            actor,
            role,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Open the project's store. Requires `purok init` unless `PUROK_DB`
    /// points somewhere explicit.
    pub fn open_tracker(&self) -> Result<Tracker> {
        if !self.project_root.join(PUROK_DIR).is_dir() && std::env::var_os(DATABASE_ENV).is_none() {
            anyhow::bail!(
                "no {PUROK_DIR}/ project in {}; run `purok init` first",
                self.project_root.display()
            );
        }
        Tracker::open_project(&self.project_root)
    }

    /// Open a session for the resolved actor.
    pub fn session(&self, tracker: &Tracker) -> Result<Session> {
        let actor = actor::require_actor(self.actor.as_deref(), self.role)?;
        tracing::debug!(actor = %actor.id, role = %actor.role, "resolved actor");
        Ok(tracker.session(actor))
    }
}
