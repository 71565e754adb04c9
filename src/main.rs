//! linkany CLI
//!
//! Command-line interface for the linkany symlink manifest engine.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use is_terminal::IsTerminal;
use linkany::MappingKind;
use std::env;
use std::path::PathBuf;

use commands::CommandContext;
use commands::ops::{AddArgs, run_add, run_install, run_link, run_remove, run_uninstall};
use commands::status::run_status;

#[derive(Parser)]
#[command(name = "linkany")]
#[command(
    author,
    version,
    about = "Link files from a managed repository into projects, tracked by a manifest"
)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the manifest file
    #[arg(short, long, global = true, env = "LINKANY_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the audit log (default: <manifest>.log.jsonl)
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    /// Output machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Show detailed output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start managing a symlink (adopting an existing target if needed)
    Add {
        /// Source path inside the managed repository
        source: PathBuf,

        /// Where the symlink should live
        target: PathBuf,

        /// Stable identifier for this mapping
        #[arg(long)]
        id: Option<String>,

        /// Mapping kind: file or dir (detected when omitted)
        #[arg(long)]
        kind: Option<MappingKind>,

        /// Create the symlink directly instead of via temp path + rename
        #[arg(long)]
        no_atomic: bool,

        /// Show what would be done without making changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Stop managing a symlink and remove it
    Remove {
        /// Mapping id or target path
        key: String,

        /// Keep the symlink on disk, only forget the mapping
        #[arg(long)]
        keep_link: bool,

        /// Show what would be done without making changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Create every symlink recorded in the manifest
    Install {
        /// Show what would be done without making changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove every symlink recorded in the manifest (the manifest is kept)
    Uninstall {
        /// Show what would be done without making changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Resolve a name through a configured tool and add it
    Link {
        /// Tool name from the [tools] section of linkany.toml
        tool: String,

        /// File or directory name within the tool's source directory
        name: String,

        /// Show what would be done without making changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Show how the filesystem compares to the manifest
    Status,
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
    init_tracing(cli.verbose);

    let cwd = env::current_dir()?;
    let ctx = CommandContext::resolve(
        cli.manifest,
        cli.config,
        cli.audit_log,
        cli.json,
        cli.verbose,
        &cwd,
    )?;

    let ok = match cli.command {
        Commands::Add {
            source,
            target,
            id,
            kind,
            no_atomic,
            dry_run,
        } => run_add(
            &ctx,
            AddArgs {
                source,
                target,
                id,
                kind,
                no_atomic,
                dry_run,
            },
            &cwd,
        )?,
        Commands::Remove {
            key,
            keep_link,
            dry_run,
        } => run_remove(&ctx, &key, keep_link, dry_run, &cwd)?,
        Commands::Install { dry_run } => run_install(&ctx, dry_run)?,
        Commands::Uninstall { dry_run } => run_uninstall(&ctx, dry_run)?,
        Commands::Link {
            tool,
            name,
            dry_run,
        } => run_link(&ctx, &tool, &name, dry_run)?,
        Commands::Status => {
            let problems = run_status(&ctx)?;
            problems == 0
        }
    };

    if !ok {
        if !ctx.json {
            eprintln!("{}", "Run with --verbose for step details.".dimmed());
        }
        std::process::exit(1);
    }

    Ok(())
}
