use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;

use commands::{checkpoint, log, preview, record, rollback, serve, MethodArg, ScopeArgs, SourceArg};

#[derive(Parser)]
#[command(name = "rewind")]
#[command(version, about = "Safe rollback and checkpoints for AI-driven code changes", long_about = None)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short = 'C', long, global = true, default_value = ".")]
    cwd: PathBuf,

    /// Timeout in seconds for a single git invocation
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port for the API server
        #[arg(short, long, default_value = "3030")]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Record a commit in the ledger
    Record {
        /// Issue the commit belongs to
        #[arg(long)]
        issue: u64,

        /// Phase of the issue
        #[arg(long)]
        phase: Option<u32>,

        /// Commit to record (defaults to HEAD)
        #[arg(long)]
        commit: Option<String>,

        /// Who created the commit
        #[arg(long, value_enum, default_value = "self")]
        source: SourceArg,
    },

    /// Show tracked commits
    Log {
        /// Only show this issue
        #[arg(long)]
        issue: Option<u64>,

        /// Only show this phase (requires --issue)
        #[arg(long, requires = "issue")]
        phase: Option<u32>,
    },

    /// Show what a rollback would do
    Preview {
        #[command(flatten)]
        scope: ScopeArgs,

        #[arg(long, value_enum, default_value = "revert")]
        method: MethodArg,

        /// Show the diff of one affected file
        #[arg(long)]
        file: Option<String>,
    },

    /// Roll back a phase, an issue or a checkpoint
    Rollback {
        #[command(flatten)]
        scope: ScopeArgs,

        #[arg(long, value_enum, default_value = "revert")]
        method: MethodArg,

        /// Push after a revert
        #[arg(long)]
        push: bool,

        /// Run the configured issue status hook afterwards
        #[arg(long)]
        update_status: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage checkpoints
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
}

#[derive(Subcommand)]
enum CheckpointCommands {
    /// Pin the current HEAD under a name
    Create {
        name: String,

        #[arg(long)]
        issue: Option<u64>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// List checkpoints, newest first
    List,

    /// Delete a checkpoint and its pinning ref
    Delete { id: String },

    /// Roll back to a checkpoint
    Restore {
        id: String,

        #[arg(long, value_enum, default_value = "revert")]
        method: MethodArg,

        /// Push after a revert
        #[arg(long)]
        push: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cwd = commands::project_dir(&cli.cwd)?;
    let engine = commands::load_engine(&cwd, cli.timeout)?;
    tracing::debug!(
        "project {} (metadata in {})",
        cwd.display(),
        engine.config().metadata_dir
    );

    match cli.command {
        Commands::Serve { port, host } => {
            serve::run(engine, &host, port).await?;
        }
        Commands::Record {
            issue,
            phase,
            commit,
            source,
        } => {
            record::run(&engine, &cwd, issue, phase, commit, source.into()).await?;
        }
        Commands::Log { issue, phase } => {
            log::run(&engine, &cwd, issue, phase).await?;
        }
        Commands::Preview {
            scope,
            method,
            file,
        } => {
            preview::run(&engine, &cwd, &scope, method.into(), file).await?;
        }
        Commands::Rollback {
            scope,
            method,
            push,
            update_status,
            yes,
        } => {
            let (scope, target) = scope.resolve()?;
            let flags = rollback::Flags {
                method: method.into(),
                push,
                update_status,
                yes,
            };
            rollback::run(&engine, &cwd, scope, target, flags).await?;
        }
        Commands::Checkpoint { command } => match command {
            CheckpointCommands::Create {
                name,
                issue,
                description,
            } => {
                checkpoint::create(&engine, &cwd, &name, issue, description).await?;
            }
            CheckpointCommands::List => {
                checkpoint::list(&engine, &cwd).await?;
            }
            CheckpointCommands::Delete { id } => {
                checkpoint::delete(&engine, &cwd, &id).await?;
            }
            CheckpointCommands::Restore {
                id,
                method,
                push,
                yes,
            } => {
                let flags = rollback::Flags {
                    method: method.into(),
                    push,
                    update_status: false,
                    yes,
                };
                checkpoint::restore(&engine, &cwd, &id, flags).await?;
            }
        },
    }

    Ok(())
}
