use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use paramsync::settings::{LogFormat, Settings};

mod commands;
mod context;
mod output;
mod prompt;

use context::CommandContext;
use output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "paramsync",
    version,
    about = "Reconciles a parameter store against service manifests"
)]
struct Cli {
    /// Settings file (default: ~/.paramsync/settings.yaml)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Environment to operate on
    #[arg(long, global = true, env = "PARAMSYNC_ENV")]
    env: Option<String>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Never prompt; every question gets its conservative answer
    #[arg(long, global = true)]
    no_input: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Converge the namespace towards its manifest
    Sync {
        /// Only apply a replication file
        #[arg(long)]
        replication_only: bool,
        #[arg(long, default_value = "paramsync.json")]
        config: PathBuf,
    },
    /// Offer stray parameters and mappings for deletion
    Prune {
        #[arg(long, default_value = "paramsync.json")]
        config: PathBuf,
    },
    /// Check that every declared parameter exists
    Validate {
        #[arg(long, default_value = "paramsync.json")]
        config: PathBuf,
    },
    /// Restore parameters from history
    Restore {
        /// Restore everything under a prefix to its state at --time
        #[arg(long)]
        point_in_time: bool,
        #[arg(long)]
        prefix: Option<String>,
        /// Epoch seconds, epoch milliseconds or RFC 3339
        #[arg(long)]
        time: Option<String>,
        /// Parameter to restore to a chosen version
        #[arg(long)]
        name: Option<String>,
    },
    /// Copy parameters into another environment
    Promote {
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    /// Share a parameter into a service namespace
    Share {
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        destination: Option<String>,
    },
    /// Delete parameters, refusing active replication sources
    Delete {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Refresh the parameter name cache of every environment
    BuildCache {
        /// Drop existing snapshots first
        #[arg(long)]
        wipe: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether the command succeeded.
fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut settings = Settings::load(cli.settings.as_deref())?;
    if cli.output == OutputFormat::Json {
        settings.logging.format = LogFormat::Json;
    }
    paramsync::logging::init_logging(&settings.logging)?;

    let ctx = CommandContext::new(settings, cli.env)?;
    let mut decision = commands::decision_for(&ctx, cli.no_input);
    let format = cli.output;

    tracing::debug!(env = %ctx.env, user = %ctx.user, "Running command");
    match cli.command {
        Commands::Sync {
            replication_only,
            config,
        } => commands::sync(&ctx, &config, replication_only, decision.as_mut(), format),
        Commands::Prune { config } => commands::prune(&ctx, &config, decision.as_mut(), format),
        Commands::Validate { config } => commands::validate(&ctx, &config, format),
        Commands::Restore {
            point_in_time,
            prefix,
            time,
            name,
        } => {
            if point_in_time {
                commands::restore_point_in_time(&ctx, prefix, time, decision.as_mut(), format)
            } else {
                commands::restore_version(&ctx, name, decision.as_mut(), format)
            }
        }
        Commands::Promote { prefix, to } => {
            commands::promote(&ctx, prefix, to, decision.as_mut(), format)
        }
        Commands::Share {
            source,
            destination,
        } => commands::share(&ctx, source, destination, cli.no_input, format),
        Commands::Delete { names } => commands::delete(&ctx, &names, decision.as_mut(), format),
        Commands::BuildCache { wipe } => commands::build_cache(&ctx, wipe, format),
    }
}
