use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::reseed::manifest;
use crate::reseed::migrate::{self, MigrationMode};
use crate::reseed::reconcile::{MatchOptions, reconcile};

/// Offline reconciliation of one folder against a saved file list.
#[derive(Debug, Clone)]
pub struct MatchDirOptions {
    pub dir: PathBuf,
    /// File holding a raw `name{{{size}}}|||...` list.
    pub manifest: PathBuf,
    /// Migrate into this folder when the match succeeds.
    pub target: Option<PathBuf>,
    pub mode: MigrationMode,
    pub dry_run: bool,
    pub fuzzy: bool,
}

pub fn run(opts: &MatchDirOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("match");

    let raw = fs::read_to_string(&opts.manifest)
        .with_context(|| format!("failed to read {}", opts.manifest.display()))?;
    let expected = match manifest::parse(raw.trim_end()) {
        Ok(expected) => expected,
        Err(err) => {
            report.issue(err.to_string());
            return Ok(report);
        }
    };
    report.detail(format!(
        "dir={} expected_files={}",
        opts.dir.display(),
        expected.len()
    ));

    let match_opts = MatchOptions { fuzzy: opts.fuzzy };
    let Some(map) = reconcile(&opts.dir, &expected, &match_opts)?.into_rename_map() else {
        report.issue(format!("{} does not satisfy the file list", opts.dir.display()));
        return Ok(report);
    };
    report.detail(format!("matched_files={}", map.len()));

    for (expected_path, actual) in map.iter() {
        if expected_path == actual {
            report.detail(format!("keep {expected_path}"));
        } else {
            report.detail(format!("rename {actual} -> {expected_path}"));
        }
    }

    let Some(target) = &opts.target else {
        return Ok(report);
    };
    match migrate::migrate(opts.mode, &opts.dir, target, &map, opts.dry_run) {
        Ok(outcome) => {
            report.detail(format!(
                "{}migrated mode={} operations={}",
                if outcome.dry_run { "dry-run " } else { "" },
                outcome.mode,
                outcome.operations.len()
            ));
            for op in &outcome.operations {
                report.detail(op.to_string());
            }
        }
        Err(err) => report.issue(err.to_string()),
    }

    Ok(report)
}
