use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use ferry::config::{self, FerryConfig};
use ferry::dest::{DestRepo as _, GitDest};
use ferry::error::FerryError;
use ferry::model::SyncRange;
use ferry::pathmap::PathMapper;
use ferry::reverse::ReverseReconciler;
use ferry::source::P4Source;
use ferry::sync::SyncEngine;
use ferry::{doctor, telemetry};

/// Directional sync of Perforce changelists into a git commit history
///
/// ferry replays submitted changelists as git commits, one commit per
/// changelist, preserving each changelist's description and submit time.
/// Mappings from depot patterns to repository directories live in
/// ferry.toml, alongside ignore patterns for generated files.
///
/// QUICK START:
///
///   # ferry.toml, in the destination repository root:
///   #   [source]
///   #   root = "/home/you/p4ws"
///   #   [paths]
///   #   "//depot/proj/..." = "proj"
///
///   ferry sync -r 4200,4300     # replay changelists 4200..=4300
///   ferry sync -r 4301,4400 -n  # preview the next batch
///   ferry reverse -n            # see what drifted back
///
/// The reverse flow opens pending source-side actions (add, edit,
/// delete) for files changed directly in the repository; nothing is
/// ever submitted automatically.
#[derive(Parser)]
#[command(name = "ferry")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'ferry <command> --help' for more information on a specific command.")]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = config::DEFAULT_PATH)]
    config: PathBuf,

    /// Debug-level logging (each file operation and spawned command)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a range of submitted changelists as commits
    Sync(SyncArgs),

    /// Open pending source-side actions for destination edits
    ///
    /// Compares every mapped repository directory against the live
    /// source workspace and opens add/edit/delete actions so the
    /// source catches up. Review and submit the pending changelist
    /// yourself.
    Reverse {
        /// Report the plan without copying or opening anything
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Check system requirements and configuration
    ///
    /// Verifies that p4 and git are installed, the config loads and
    /// validates, the source root is bound to a client workspace, and
    /// the current directory is a git repository.
    Doctor,
}

#[derive(Args)]
struct SyncArgs {
    /// Inclusive changelist range, as `first,last`
    #[arg(short, long)]
    range: String,

    /// Preview without exporting, writing, or committing
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Omit the trailing `[CL <n>]` reference from commit messages
    #[arg(long)]
    no_cl: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    match cli.command {
        Commands::Sync(args) => run_sync(&cli.config, &args),
        Commands::Reverse { dry_run } => run_reverse(&cli.config, dry_run),
        Commands::Doctor => {
            if doctor::run(&cli.config) {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }
    }
}

fn run_sync(config_path: &Path, args: &SyncArgs) -> Result<()> {
    let range: SyncRange = args.range.parse().map_err(FerryError::from)?;
    let (mapper, source, dest) = setup(config_path, args.dry_run)?;

    let engine = SyncEngine::new(&mapper, args.dry_run, args.no_cl);
    let summary = engine.sync(&source, &dest, range)?;
    println!("{summary}");
    Ok(())
}

fn run_reverse(config_path: &Path, dry_run: bool) -> Result<()> {
    let (mapper, source, dest) = setup(config_path, dry_run)?;

    let engine = ReverseReconciler::new(&mapper, dest.root(), dry_run);
    let plan = engine.reconcile(&source)?;
    if plan.is_empty() {
        println!("source and destination are in sync");
    } else if !dry_run {
        println!("opened {plan}; review and submit the pending changelist with p4");
    }
    Ok(())
}

/// Load the config and open both ends. The destination is the current
/// directory; the source root comes from the config.
fn setup(config_path: &Path, dry_run: bool) -> Result<(PathMapper, P4Source, GitDest)> {
    let config = FerryConfig::load(config_path).map_err(FerryError::from)?;
    let mapper = config.mapper().map_err(FerryError::from)?;
    let dest = GitDest::open(Path::new(".")).map_err(FerryError::from)?;
    let source = P4Source::connect(&config.source.root, &mapper, dry_run)?;
    Ok((mapper, source, dest))
}
