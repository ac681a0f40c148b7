#![forbid(unsafe_code)]

mod actor;
mod cmd;
mod output;

use std::env;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode};
use purok_core::Role;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "purok: citizen issue-report tracker",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format (defaults to pretty on a TTY, text when piped).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Act as this identity instead of the one in the environment.
    #[arg(long, global = true)]
    actor: Option<String>,

    /// Role of the acting identity: resident, official or collector.
    #[arg(long, global = true)]
    role: Option<Role>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Project",
        about = "Initialize a purok project",
        long_about = "Create .purok/ with a default config and an empty report database.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    purok init\n\n    # Rewrite the default config\n    purok init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Residents",
        about = "Submit a new report",
        long_about = "Submit a report as the current actor. It starts out pending.",
        after_help = "EXAMPLES:\n    # Report an overflowing bin\n    purok submit --title \"Overflowing bin\" --description \"Not emptied since Monday\" --location \"Purok 3\"\n\n    # Attach photos by URI\n    purok submit --title Pothole --description \"Near the chapel\" --attachment https://blobs.example/p1.jpg"
    )]
    Submit(cmd::submit::SubmitArgs),

    #[command(
        next_help_heading = "Officials",
        about = "Respond to a report and mark it in progress",
        after_help = "EXAMPLES:\n    purok --role official respond rp-abc123 \"Scheduled for Tuesday\""
    )]
    Respond(cmd::respond::RespondArgs),

    #[command(
        next_help_heading = "Officials",
        about = "Mark a report resolved",
        after_help = "EXAMPLES:\n    purok --role official resolve rp-abc123 --response \"Collected\""
    )]
    Resolve(cmd::respond::ResolveArgs),

    #[command(
        next_help_heading = "Officials",
        about = "Delete an active report without archiving it",
        long_about = "Delete an active report. Its status history is kept."
    )]
    Remove(cmd::archive::RemoveArgs),

    #[command(
        next_help_heading = "Officials",
        about = "Move a report to the archive",
        after_help = "EXAMPLES:\n    purok --role official archive rp-abc123"
    )]
    Archive(cmd::archive::ArchiveArgs),

    #[command(
        next_help_heading = "Officials",
        about = "Restore an archived report as a new pending report",
        after_help = "EXAMPLES:\n    purok --role official restore ar-def456"
    )]
    Restore(cmd::archive::RestoreArgs),

    #[command(
        next_help_heading = "Read",
        about = "List active reports",
        after_help = "EXAMPLES:\n    # Everything active\n    purok list\n\n    # Only reports being worked on\n    purok list --status in_progress --json"
    )]
    List(cmd::list::ListArgs),

    #[command(next_help_heading = "Read", about = "List archived reports")]
    Archived(cmd::list::ArchivedArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show the status history of a report",
        long_about = "Show every status event recorded for a report id, oldest first. Works for archived and removed ids too."
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show a report's current status",
        long_about = "Show one report with its reconciled status. Without an id, show the current actor's most recently resolved report."
    )]
    Status(cmd::status::StatusArgs),

    #[command(
        next_help_heading = "Project",
        about = "Check store invariants",
        long_about = "Check that no report is both active and archived, that cached statuses agree with the log, and that every history is ordered."
    )]
    Verify,

    #[command(
        next_help_heading = "Read",
        about = "Follow the store and print a summary on every change",
        after_help = "EXAMPLES:\n    # Poll every second until interrupted\n    purok watch\n\n    # Print one snapshot and exit\n    purok watch --count 1 --json"
    )]
    Watch(cmd::watch::WatchArgs),

    #[command(
        next_help_heading = "Project",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    purok completions bash > ~/.local/share/bash-completion/completions/purok"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PUROK_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "purok=debug,info"
        } else {
            "purok=info,warn"
        })
    });

    let format = env::var("PUROK_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Map a command failure to the structured error shown to the user.
fn cli_error(err: &anyhow::Error) -> CliError {
    if let Some(actor_err) = err.downcast_ref::<actor::ActorResolutionError>() {
        return CliError::with_details(
            &actor_err.message,
            "Set --actor and --role, or PUROK_ACTOR and PUROK_ROLE",
            actor_err.code,
        );
    }
    CliError::from(err)
}

fn run(cli: Cli, output: OutputMode) -> anyhow::Result<()> {
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    if let Commands::Completions(ref args) = cli.command {
        let mut command = Cli::command();
        return cmd::completions::run_completions(args.shell, &mut command);
    }

    let ctx = cmd::CmdContext::new(env::current_dir()?, output, cli.actor, cli.role);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Init(args) => cmd::init::run_init(&args, &ctx),
            Commands::Submit(args) => cmd::submit::run_submit(&args, &ctx).await,
            Commands::Respond(args) => cmd::respond::run_respond(&args, &ctx).await,
            Commands::Resolve(args) => cmd::respond::run_resolve(&args, &ctx).await,
            Commands::Remove(args) => cmd::archive::run_remove(&args, &ctx).await,
            Commands::Archive(args) => cmd::archive::run_archive(&args, &ctx).await,
            Commands::Restore(args) => cmd::archive::run_restore(&args, &ctx).await,
            Commands::List(args) => cmd::list::run_list(&args, &ctx).await,
            Commands::Archived(args) => cmd::list::run_archived(&args, &ctx).await,
            Commands::History(args) => cmd::history::run_history(&args, &ctx).await,
            Commands::Status(args) => cmd::status::run_status(&args, &ctx).await,
            Commands::Verify => cmd::verify::run_verify(&ctx).await,
            Commands::Watch(args) => cmd::watch::run_watch(&args, &ctx).await,
            Commands::Completions(_) => Ok(()),
        }
    })
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let output = cli.output_mode();

    match run(cli, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            if let Err(render_err) = output::render_error(output, &cli_error(&err)) {
                eprintln!("error: {err:#} ({render_err})");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_parses_before_and_after_subcommand() {
        let cli = Cli::parse_from(["purok", "--json", "list"]);
        assert!(cli.json);
        let cli = Cli::parse_from(["purok", "list", "--json"]);
        assert!(cli.json);
        assert!(cli.output_mode().is_json());
    }

    #[test]
    fn format_flag_parses() {
        let cli = Cli::parse_from(["purok", "--format", "text", "list"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
    }

    #[test]
    fn actor_and_role_flags_parse() {
        let cli = Cli::parse_from([
            "purok", "--actor", "kagawad-lito", "--role", "official", "archive", "rp-abc",
        ]);
        assert_eq!(cli.actor.as_deref(), Some("kagawad-lito"));
        assert_eq!(cli.role, Some(Role::Official));
        assert!(matches!(cli.command, Commands::Archive(_)));
    }

    #[test]
    fn unknown_role_is_rejected_by_parser() {
        assert!(Cli::try_parse_from(["purok", "--role", "mayor", "list"]).is_err());
    }

    #[test]
    fn read_only_commands_work_without_actor() {
        let cli = Cli::parse_from(["purok", "list"]);
        assert!(cli.actor.is_none());
        let cli = Cli::parse_from(["purok", "history", "rp-abc"]);
        assert!(cli.actor.is_none());
    }

    #[test]
    fn completions_subcommand_parses() {
        let cli = Cli::parse_from(["purok", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Commands::Completions(cmd::completions::CompletionsArgs {
                shell: clap_complete::Shell::Bash,
            })
        ));
    }

    #[test]
    fn all_subcommands_listed() {
        let subcommands = [
            vec!["purok", "init"],
            vec!["purok", "submit", "--title", "t", "--description", "d"],
            vec!["purok", "respond", "rp-x", "on it"],
            vec!["purok", "resolve", "rp-x"],
            vec!["purok", "remove", "rp-x"],
            vec!["purok", "archive", "rp-x"],
            vec!["purok", "restore", "ar-x"],
            vec!["purok", "list"],
            vec!["purok", "archived"],
            vec!["purok", "history", "rp-x"],
            vec!["purok", "status"],
            vec!["purok", "verify"],
            vec!["purok", "watch", "--count", "1"],
            vec!["purok", "completions", "zsh"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "failed to parse {args:?}: {:?}", result.err());
        }
    }

    #[test]
    fn cli_error_maps_actor_errors() {
        let err = anyhow::Error::new(actor::ActorResolutionError {
            message: "missing".into(),
            code: "missing_actor",
        });
        let cli = cli_error(&err);
        assert_eq!(cli.error_code.as_deref(), Some("missing_actor"));
        assert!(cli.suggestion.is_some());
    }

    #[test]
    fn clap_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
