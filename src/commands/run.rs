use anyhow::{Context, Result};

use crate::commands::CommandReport;
use crate::error::ReseedErrorCode;
use crate::reseed::audit;
use crate::reseed::catalog::{CatalogClient, GazelleClient};
use crate::reseed::config::load_config;
use crate::reseed::lock::RunLock;
use crate::reseed::metadata::LoftyMetadataReader;
use crate::reseed::migrate::MigrationMode;
use crate::reseed::paths::resolve_paths;
use crate::reseed::pipeline::{self, DirectoryOutcome, DirectoryReport, PipelineOptions};
use crate::reseed::reconcile::MatchOptions;
use crate::reseed::registration::CommandSink;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides `[matching] mode` when set.
    pub mode: Option<MigrationMode>,
    pub dry_run: bool,
    /// Enables fuzzy matching on top of `[matching] fuzzy`.
    pub fuzzy: bool,
}

fn describe(outcome: &DirectoryOutcome) -> String {
    match outcome {
        DirectoryOutcome::Reseeded {
            descriptor_id,
            target,
            renamed_files,
            registered,
        } => format!(
            "torrent={descriptor_id} target={} renamed={renamed_files} registered={registered}",
            target.display()
        ),
        DirectoryOutcome::NoMatch {
            queries,
            candidates,
        } => format!("queries={queries} candidates={candidates}"),
        DirectoryOutcome::Failed { reason } => reason.clone(),
    }
}

fn record(report: &mut CommandReport, entry: &DirectoryReport, dry_run: bool) {
    let dir = entry.dir.display();
    let summary = describe(&entry.outcome);
    match &entry.outcome {
        DirectoryOutcome::Reseeded { registered, .. } => {
            report.detail(format!("reseeded dir={dir} {summary}"));
            if !registered && !dry_run {
                report.issue(format!("registration failed for {dir}; files already migrated"));
            }
        }
        DirectoryOutcome::NoMatch { .. } => {
            report.detail(format!("no-match dir={dir} {summary}"));
        }
        DirectoryOutcome::Failed { reason } => {
            report.issue(format!("failed dir={dir}: {reason}"));
        }
    }
}

pub fn run(opts: &RunOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("run");

    let Some(_lock) = RunLock::try_acquire(&paths.lock_file)? else {
        report.issue(format!(
            "{}: another reseed run holds {}",
            ReseedErrorCode::E001Locked.as_str(),
            paths.lock_file.display()
        ));
        return Ok(report);
    };

    if !paths.config_file.exists() {
        report.issue(format!(
            "{}: no config at {}; run `reseed init-config` and fill it in",
            ReseedErrorCode::E002ConfigMissing.as_str(),
            paths.config_file.display()
        ));
        return Ok(report);
    }

    let cfg = match load_config(&paths) {
        Ok(cfg) => cfg,
        Err(err) => {
            report.issue(format!(
                "{}: {err:#}",
                ReseedErrorCode::E003ConfigInvalid.as_str()
            ));
            return Ok(report);
        }
    };

    let source_root = cfg.source_root();
    if !source_root.is_dir() {
        report.issue(format!(
            "{}: source path {} is not a directory",
            ReseedErrorCode::E004SourceMissing.as_str(),
            source_root.display()
        ));
        return Ok(report);
    }
    let target_root = cfg.target_root();

    let dirs = pipeline::find_source_dirs(&source_root, &cfg.source.name_filter)?;
    report.detail(format!(
        "source={} filter={} folders={}",
        source_root.display(),
        cfg.source.name_filter,
        dirs.len()
    ));
    if dirs.is_empty() {
        return Ok(report);
    }

    let pipeline_opts = PipelineOptions {
        mode: opts.mode.unwrap_or(cfg.matching.mode),
        matching: MatchOptions {
            fuzzy: opts.fuzzy || cfg.matching.fuzzy,
        },
        dry_run: opts.dry_run,
    };
    report.detail(format!(
        "mode={} fuzzy={} dry_run={}",
        pipeline_opts.mode, pipeline_opts.matching.fuzzy, pipeline_opts.dry_run
    ));

    let template = cfg.registration_template()?;
    let catalog = GazelleClient::connect(&cfg.target)
        .with_context(|| format!("failed to open a session with {}", cfg.target.url))?;
    let sink = CommandSink::new(template, &target_root, opts.dry_run);

    let entries = pipeline::run(
        &dirs,
        &target_root,
        &catalog,
        &LoftyMetadataReader,
        &sink,
        &pipeline_opts,
        |entry| {
            let dir = entry.dir.display().to_string();
            if let Err(err) = audit::append_event(
                &paths,
                "reseed",
                entry.outcome.status(),
                &dir,
                &describe(&entry.outcome),
            ) {
                tracing::warn!(dir = %dir, "failed to write audit event: {err:#}");
            }
        },
    );

    if let Err(err) = catalog.close() {
        tracing::warn!("catalog logout failed: {err:#}");
    }

    for entry in &entries {
        record(&mut report, entry, opts.dry_run);
    }

    let count = |status: &str| {
        entries
            .iter()
            .filter(|e| e.outcome.status() == status)
            .count()
    };
    report.detail(format!(
        "summary reseeded={} no_match={} failed={}",
        count("reseeded"),
        count("no-match"),
        count("failed")
    ));

    Ok(report)
}
