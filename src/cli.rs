use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::logging;
use crate::reseed::migrate::MigrationMode;

#[derive(Parser)]
#[command(name = "reseed")]
#[command(version)]
#[command(about = "Match local music folders to tracker releases and hand them to a torrent client", long_about = None)]
struct Cli {
    /// Print the command report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging unless RESEED_LOG or RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reseed every matching folder under the configured source path
    Run {
        /// Migration mode; defaults to `[matching] mode`
        #[arg(long, value_enum)]
        mode: Option<MigrationMode>,

        /// Log every filesystem operation and registration without performing it
        #[arg(long)]
        dry_run: bool,

        /// Allow size-tolerant matching by track number and extension
        #[arg(long)]
        fuzzy: bool,
    },

    /// Reconcile one folder against a saved file list, without the tracker
    Match {
        /// Local folder to check
        #[arg(long)]
        dir: PathBuf,

        /// File holding the raw `name{{{size}}}|||...` list
        #[arg(long)]
        manifest: PathBuf,

        /// Migrate into this folder on a match
        #[arg(long)]
        target: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = MigrationMode::Move)]
        mode: MigrationMode,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        fuzzy: bool,
    },

    /// Print a folder's files as a raw `name{{{size}}}|||...` list
    List {
        #[arg(long)]
        dir: PathBuf,
    },

    /// Show the search queries a folder's tags produce
    Queries {
        #[arg(long)]
        dir: PathBuf,
    },

    /// Write a template config file
    InitConfig {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Show resolved paths and check the config
    Status,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "{}: {}",
        report.command,
        if report.ok { "ok" } else { "issues found" }
    );
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  ! {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let report = match cli.command {
        Command::Run {
            mode,
            dry_run,
            fuzzy,
        } => commands::run::run(&commands::run::RunOptions {
            mode,
            dry_run,
            fuzzy,
        })?,
        Command::Match {
            dir,
            manifest,
            target,
            mode,
            dry_run,
            fuzzy,
        } => commands::match_dir::run(&commands::match_dir::MatchDirOptions {
            dir,
            manifest,
            target,
            mode,
            dry_run,
            fuzzy,
        })?,
        Command::List { dir } => commands::list_dir::run(&dir)?,
        Command::Queries { dir } => commands::queries::run(&dir)?,
        Command::InitConfig { force } => commands::init_config::run(force)?,
        Command::Status => commands::status::run()?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        std::process::exit(2);
    }
    Ok(())
}
