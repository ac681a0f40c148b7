use anyhow::{Context as _, Result};
use clap::Args;
use purok_core::Tracker;
use purok_core::config::PUROK_DIR;
use serde::Serialize;

use super::CmdContext;
use crate::output::{pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite the default config even if `.purok/` already exists.
    #[arg(long)]
    pub force: bool,
}

const CONFIG_TOML: &str = "[policy]\n\
    allow_post_resolution_edits = false\n\
    require_progress_response = true\n\
    \n\
    [sync]\n\
    coalesce_window_ms = 100\n\
    max_retries = 3\n\
    backoff_base_ms = 50\n\
    backoff_max_ms = 2000\n\
    channel_capacity = 64\n\
    \n\
    [store]\n\
    op_timeout_ms = 5000\n\
    mutation_retries = 2\n\
    # database = \"purok.sqlite3\"\n";

const GITIGNORE: &str = "purok.sqlite3\npurok.sqlite3-wal\npurok.sqlite3-shm\n";

#[derive(Debug, Serialize)]
struct InitOutput {
    project: String,
    config: String,
    database: String,
}

/// Execute `purok init`. Creates:
///
/// ```text
/// .purok/
///   config.toml     (default policy, sync and store settings)
///   .gitignore      (the database and its WAL files)
///   purok.sqlite3   (migrated, empty)
/// ```
///
/// # Errors
///
/// Returns an error if `.purok/` already exists and `--force` is not set, or
/// if any filesystem or database step fails.
pub fn run_init(args: &InitArgs, ctx: &CmdContext) -> Result<()> {
    let root = ctx.project_root();
    let purok_dir = root.join(PUROK_DIR);

    if purok_dir.exists() && !args.force {
        anyhow::bail!("{PUROK_DIR}/ already exists. Use `purok init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&purok_dir)
        .with_context(|| format!("Failed to create {}", purok_dir.display()))?;

    let config_path = purok_dir.join("config.toml");
    std::fs::write(&config_path, CONFIG_TOML)
        .with_context(|| format!("Failed to write config: {}", config_path.display()))?;

    let gitignore_path = purok_dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;

    let config = purok_core::config::load_config(root)?;
    let db_path = purok_core::config::database_path(root, &config);
    Tracker::open_sqlite(&db_path, config)?;
    tracing::info!(db = %db_path.display(), "initialized project");

    let out = InitOutput {
        project: purok_dir.display().to_string(),
        config: config_path.display().to_string(),
        database: db_path.display().to_string(),
    };
    render_mode(
        ctx.output,
        &out,
        |o, w| writeln!(w, "{}", o.database),
        |o, w| {
            writeln!(w, "✓ Initialized {PUROK_DIR}/ project structure.")?;
            writeln!(w)?;
            pretty_kv(w, "Config", &o.config)?;
            pretty_kv(w, "Database", &o.database)?;
            writeln!(w)?;
            writeln!(w, "Next steps:")?;
            writeln!(w, "  Set your identity (required for mutations):")?;
            writeln!(w, "    export PUROK_ACTOR=your-name PUROK_ROLE=resident")?;
            writeln!(w, "  Submit a report:")?;
            writeln!(
                w,
                "    purok submit --title \"Overflowing bin\" --description \"...\""
            )
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use purok_core::config::TrackerConfig;

    #[test]
    fn default_config_template_parses_to_defaults() {
        let parsed: TrackerConfig = toml::from_str(CONFIG_TOML).expect("template parses");
        assert_eq!(parsed, TrackerConfig::default());
    }
}
